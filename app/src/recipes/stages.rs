use std::collections::BTreeMap;

use serde::Serialize;

use infra::untyped_ids::UntypedId;

use super::models::{RecipeStage, RecipeStep};

/// Stage totals as they should be stored, plus time that belongs to no stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRollup {
    pub stages: Vec<RecipeStage>,
    pub unstaged_time: u32,
    /// Whether any stage total differs from what was stored.
    pub changed: bool,
}

/// Sums step times into their stages. Steps without a stage, or whose stage
/// no longer exists, are counted as unstaged. Missing times count as zero.
pub fn roll_up_stage_times(steps: &[RecipeStep], stages: &[RecipeStage]) -> StageRollup {
    let mut totals: BTreeMap<UntypedId, u32> = stages.iter().map(|s| (s.id, 0)).collect();
    let mut unstaged_time = 0u32;

    for step in steps {
        let minutes = step.time_in_minutes.unwrap_or(0);
        match step.stage_id.and_then(|id| totals.get_mut(&id)) {
            Some(total) => *total = total.saturating_add(minutes),
            None => unstaged_time = unstaged_time.saturating_add(minutes),
        }
    }

    let mut changed = false;
    let stages = stages
        .iter()
        .map(|stage| {
            let total_time = totals.get(&stage.id).cloned().unwrap_or(0);
            changed |= total_time != stage.total_time;
            RecipeStage {
                total_time,
                ..stage.clone()
            }
        })
        .collect();

    StageRollup {
        stages,
        unstaged_time,
        changed,
    }
}
