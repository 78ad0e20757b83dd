use std::collections::BTreeMap;

use super::models::{ScheduleEmployee, TeamMember};

fn same(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

fn initial(name: &str) -> Option<String> {
    name.trim()
        .chars()
        .next()
        .map(|c| c.to_lowercase().collect())
}

fn full_name_match<'a>(
    employee: &ScheduleEmployee,
    team: &'a [TeamMember],
) -> Option<&'a TeamMember> {
    let wanted = employee.full_name();
    team.iter().find(|m| same(&m.full_name(), &wanted))
}

fn initial_match<'a>(
    employee: &ScheduleEmployee,
    team: &'a [TeamMember],
) -> Option<&'a TeamMember> {
    let first = employee.first_name();
    let last_initial = initial(employee.last_name())?;
    team.iter().find(|m| {
        same(&m.first_name, first) && initial(&m.last_name).as_ref() == Some(&last_initial)
    })
}

fn unique_first_name<'a>(
    employee: &ScheduleEmployee,
    team: &'a [TeamMember],
) -> Option<&'a TeamMember> {
    let first = employee.first_name();
    if first.is_empty() {
        return None;
    }
    let mut candidates = team.iter().filter(|m| same(&m.first_name, first));
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

/// Pairs schedule names with team members. Each employee is tried against,
/// in order: the full name, the first name with the last initial, and the
/// first name alone when exactly one member has it. The first rule that
/// finds someone wins; employees no rule matches are left out.
pub fn auto_match(
    employees: &[ScheduleEmployee],
    team: &[TeamMember],
) -> BTreeMap<String, TeamMember> {
    employees
        .iter()
        .filter_map(|employee| {
            full_name_match(employee, team)
                .or_else(|| initial_match(employee, team))
                .or_else(|| unique_first_name(employee, team))
                .map(|member| (employee.name.clone(), member.clone()))
        })
        .collect()
}
