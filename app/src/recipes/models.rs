use std::fmt;

use chrono::{DateTime, Utc};
use err_derive::Error;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};
use infra::untyped_ids::UntypedId;

use crate::allergens::AllergenInfo;
use crate::catalog::MasterIngredient;
use crate::costing::{self, CostLine, RecipeCost};
use crate::lenient;
use crate::organization::Organization;

use super::stages::{self, StageRollup};
use super::versions::RecipeVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecipeType {
    /// A component used by other recipes.
    Prepared,
    /// A plated dish.
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecipeStatus {
    Draft,
    Review,
    Approved,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(display = "cannot move a recipe from {} to {}", _0, _1)]
pub struct InvalidTransition(pub RecipeStatus, pub RecipeStatus);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(display = "no stage {} in this recipe", _0)]
pub struct UnknownStage(pub UntypedId);

/// What a recipe line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IngredientRef {
    #[serde(rename_all = "camelCase")]
    Purchased {
        master_ingredient_id: Id<MasterIngredient>,
    },
    #[serde(rename_all = "camelCase")]
    SubRecipe { recipe_id: Id<Recipe> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    pub id: UntypedId,
    pub ingredient: IngredientRef,
    /// As typed by the cook; read with `lenient::quantity`.
    #[serde(default, deserialize_with = "lenient::text")]
    pub quantity: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub prep_notes: String,
    #[serde(default)]
    pub common_measure: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarningLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Temperature {
    pub value: Decimal,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeStep {
    pub id: UntypedId,
    pub instruction: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, deserialize_with = "lenient::optional_minutes")]
    pub time_in_minutes: Option<u32>,
    #[serde(default, deserialize_with = "lenient::reference")]
    pub stage_id: Option<UntypedId>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_quality_control_point: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_critical_control_point: bool,
    #[serde(default)]
    pub warning_level: WarningLevel,
    #[serde(default)]
    pub temperature: Option<Temperature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeStage {
    pub id: UntypedId,
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_prep_list: bool,
    /// Sum of the times of the steps in this stage.
    #[serde(default, deserialize_with = "lenient::minutes")]
    pub total_time: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Yield {
    #[serde(default, deserialize_with = "lenient::text")]
    pub amount: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityStandards {
    #[serde(default)]
    pub appearance: String,
    #[serde(default)]
    pub texture: String,
    #[serde(default)]
    pub taste: String,
    #[serde(default)]
    pub serving_temperature: Option<Temperature>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Training {
    #[serde(default)]
    pub skill_level: String,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub common_errors: Vec<String>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInstructions {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub container: String,
    #[serde(default)]
    pub temperature: Option<Temperature>,
    #[serde(default)]
    pub shelf_life: String,
}

/// Everything about a recipe that a version captures and a revert restores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeContent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub recipe_type: RecipeType,
    #[serde(default)]
    pub major_group: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, deserialize_with = "lenient::minutes")]
    pub prep_time: u32,
    #[serde(default, deserialize_with = "lenient::minutes")]
    pub cook_time: u32,
    #[serde(default, deserialize_with = "lenient::minutes")]
    pub rest_time: u32,
    #[serde(default, deserialize_with = "lenient::minutes")]
    pub total_time: u32,
    #[serde(default, rename = "yield")]
    pub recipe_yield: Yield,
    #[serde(default)]
    pub recipe_unit_ratio: Option<Decimal>,
    #[serde(default)]
    pub unit_type: String,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub steps: Vec<RecipeStep>,
    #[serde(default)]
    pub stages: Vec<RecipeStage>,
    #[serde(default)]
    pub quality_standards: QualityStandards,
    #[serde(default)]
    pub training: Training,
    #[serde(default)]
    pub storage: StorageInstructions,
    #[serde(default)]
    pub media: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<Recipe>,
    pub organization: Id<Organization>,
    #[serde(default)]
    pub status: RecipeStatus,
    #[serde(flatten)]
    pub content: RecipeContent,
    #[serde(default)]
    pub allergen_info: AllergenInfo,
    #[serde(default)]
    cost_per_unit: Decimal,
    #[serde(default)]
    total_cost: Decimal,
    #[serde(default)]
    labor_cost: Decimal,
    #[serde(default)]
    pub(super) versions: Vec<RecipeVersion>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_by: String,
}

/// The outcome of recomputing a recipe's derived costs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recosting {
    pub cost: RecipeCost,
    pub labor_cost: Decimal,
    /// Lines whose reference resolved to nothing; they were costed at zero.
    pub unresolved: Vec<IngredientRef>,
    pub changed: bool,
}

impl Default for RecipeStatus {
    fn default() -> Self {
        RecipeStatus::Draft
    }
}

impl RecipeStatus {
    pub fn can_become(self, next: RecipeStatus) -> bool {
        use self::RecipeStatus::*;
        match (self, next) {
            (Draft, Review) => true,
            (Review, Draft) | (Review, Approved) => true,
            (Approved, Archived) => true,
            (Archived, Draft) => true,
            _ => false,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            RecipeStatus::Draft => "draft",
            RecipeStatus::Review => "review",
            RecipeStatus::Approved => "approved",
            RecipeStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for RecipeStatus {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.key())
    }
}

impl std::str::FromStr for RecipeStatus {
    type Err = anyhow::Error;
    fn from_str(src: &str) -> Result<Self, Self::Err> {
        [
            RecipeStatus::Draft,
            RecipeStatus::Review,
            RecipeStatus::Approved,
            RecipeStatus::Archived,
        ]
        .iter()
        .cloned()
        .find(|s| s.key().eq_ignore_ascii_case(src.trim()))
        .ok_or_else(|| anyhow::anyhow!("unknown recipe status {:?}", src))
    }
}

impl Default for WarningLevel {
    fn default() -> Self {
        WarningLevel::Low
    }
}

impl IngredientRef {
    pub fn purchased(id: Id<MasterIngredient>) -> Self {
        IngredientRef::Purchased {
            master_ingredient_id: id,
        }
    }

    pub fn sub_recipe(id: Id<Recipe>) -> Self {
        IngredientRef::SubRecipe { recipe_id: id }
    }
}

impl fmt::Display for IngredientRef {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IngredientRef::Purchased {
                master_ingredient_id,
            } => write!(fmt, "{}", master_ingredient_id),
            IngredientRef::SubRecipe { recipe_id } => write!(fmt, "{}", recipe_id),
        }
    }
}

impl RecipeIngredient {
    pub fn new(id: UntypedId, ingredient: IngredientRef, quantity: &str) -> Self {
        RecipeIngredient {
            id,
            ingredient,
            quantity: quantity.to_string(),
            unit: String::new(),
            prep_notes: String::new(),
            common_measure: String::new(),
        }
    }
}

impl RecipeStep {
    pub fn new(id: UntypedId, instruction: &str) -> Self {
        RecipeStep {
            id,
            instruction: instruction.to_string(),
            notes: String::new(),
            time_in_minutes: None,
            stage_id: None,
            is_quality_control_point: false,
            is_critical_control_point: false,
            warning_level: WarningLevel::default(),
            temperature: None,
        }
    }
}

impl RecipeStage {
    pub fn new(id: UntypedId, name: &str) -> Self {
        RecipeStage {
            id,
            name: name.to_string(),
            color: String::new(),
            is_prep_list: false,
            total_time: 0,
        }
    }
}

impl RecipeContent {
    pub fn new(name: &str, recipe_type: RecipeType) -> Self {
        RecipeContent {
            name: name.to_string(),
            description: String::new(),
            recipe_type,
            major_group: String::new(),
            category: String::new(),
            prep_time: 0,
            cook_time: 0,
            rest_time: 0,
            total_time: 0,
            recipe_yield: Yield::default(),
            recipe_unit_ratio: None,
            unit_type: String::new(),
            ingredients: Vec::new(),
            steps: Vec::new(),
            stages: Vec::new(),
            quality_standards: QualityStandards::default(),
            training: Training::default(),
            storage: StorageInstructions::default(),
            media: Vec::new(),
        }
    }
}

impl Recipe {
    pub fn new(
        id: Id<Recipe>,
        organization: Id<Organization>,
        name: &str,
        recipe_type: RecipeType,
    ) -> Self {
        Recipe {
            meta: DocMeta::new_with_id(id),
            organization,
            status: RecipeStatus::default(),
            content: RecipeContent::new(name, recipe_type),
            allergen_info: AllergenInfo::default(),
            cost_per_unit: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            labor_cost: Decimal::ZERO,
            versions: Vec::new(),
            modified_at: None,
            modified_by: String::new(),
        }
    }

    pub fn id(&self) -> Id<Recipe> {
        self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.content.name
    }

    pub fn cost_per_unit(&self) -> Decimal {
        self.cost_per_unit
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    pub fn labor_cost(&self) -> Decimal {
        self.labor_cost
    }

    pub fn versions(&self) -> &[RecipeVersion] {
        &self.versions
    }

    pub fn latest_version(&self) -> Option<&RecipeVersion> {
        self.versions.last()
    }

    /// Sub-recipes this recipe uses directly.
    pub fn sub_recipes(&self) -> impl Iterator<Item = Id<Recipe>> + '_ {
        self.content
            .ingredients
            .iter()
            .filter_map(|line| match line.ingredient {
                IngredientRef::SubRecipe { recipe_id } => Some(recipe_id),
                IngredientRef::Purchased { .. } => None,
            })
    }

    pub fn ingredient_refs(&self) -> impl Iterator<Item = &IngredientRef> + '_ {
        self.content.ingredients.iter().map(|line| &line.ingredient)
    }

    /// Recomputes ingredient and labor costs. `line_cost` gives the cost of
    /// one recipe unit of whatever a line refers to.
    pub fn recost<F>(&mut self, line_cost: F, labor_rate: Option<Decimal>) -> Recosting
    where
        F: Fn(&IngredientRef) -> Option<Decimal>,
    {
        let mut unresolved = Vec::new();
        let lines = self
            .content
            .ingredients
            .iter()
            .map(|line| {
                let cost_per_unit = line_cost(&line.ingredient).unwrap_or_else(|| {
                    unresolved.push(line.ingredient);
                    Decimal::ZERO
                });
                CostLine {
                    quantity: &line.quantity,
                    cost_per_unit,
                }
            })
            .collect::<Vec<_>>();
        let cost = costing::compute_recipe_cost(lines, self.content.recipe_unit_ratio);
        let labor_cost = costing::compute_labor_cost(
            Some(self.content.prep_time),
            Some(self.content.cook_time),
            labor_rate,
        );

        let changed = cost.cost_per_unit != self.cost_per_unit
            || cost.recipe_total != self.total_cost
            || labor_cost != self.labor_cost;
        self.cost_per_unit = cost.cost_per_unit;
        self.total_cost = cost.recipe_total;
        self.labor_cost = labor_cost;

        Recosting {
            cost,
            labor_cost,
            unresolved,
            changed,
        }
    }

    pub fn update_total_time(&mut self) -> u32 {
        let c = &mut self.content;
        c.total_time = c.prep_time.saturating_add(c.cook_time).saturating_add(c.rest_time);
        c.total_time
    }

    /// Stores fresh stage totals and reports unstaged time.
    pub fn roll_up_stages(&mut self) -> StageRollup {
        let rollup = stages::roll_up_stage_times(&self.content.steps, &self.content.stages);
        if rollup.changed {
            self.content.stages = rollup.stages.clone();
        }
        rollup
    }

    /// Removes a stage. Its steps stay in the recipe without a stage. Returns
    /// how many steps were released.
    pub fn delete_stage(&mut self, stage_id: UntypedId) -> Result<usize, UnknownStage> {
        let before = self.content.stages.len();
        self.content.stages.retain(|s| s.id != stage_id);
        if self.content.stages.len() == before {
            return Err(UnknownStage(stage_id));
        }

        let mut released = 0;
        for step in self.content.steps.iter_mut() {
            if step.stage_id == Some(stage_id) {
                step.stage_id = None;
                released += 1;
            }
        }
        self.roll_up_stages();
        Ok(released)
    }

    pub fn change_status(&mut self, next: RecipeStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_become(next) {
            return Err(InvalidTransition(self.status, next));
        }
        self.status = next;
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>, by: &str) {
        self.modified_at = Some(now);
        if !by.trim().is_empty() {
            self.modified_by = by.trim().to_string();
        }
    }
}

impl Entity for Recipe {
    const PREFIX: &'static str = "recipe";
}

impl HasMeta for Recipe {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}
