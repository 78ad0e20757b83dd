//! Cost derivations. Every function here is total: malformed input is
//! coerced by `lenient` rather than reported.

use log::*;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::lenient;

/// Decimal places kept on persisted cost fields.
pub const STORAGE_PLACES: u32 = 4;

const MINUTES_PER_HOUR: u32 = 60;

pub fn default_labor_rate() -> Decimal {
    Decimal::new(20, 0)
}

pub fn round_for_storage(value: Decimal) -> Decimal {
    round_to(value, STORAGE_PLACES)
}

pub fn round_to(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
}

/// Cost of one recipe unit of a purchased ingredient:
/// `(price / units per case) * (1 / yield)`, to four places.
pub fn compute_ingredient_cost_per_unit(
    current_price: Decimal,
    recipe_units_per_case: Option<Decimal>,
    yield_fraction: Option<Decimal>,
) -> Decimal {
    let units = lenient::divisor(recipe_units_per_case);
    let usable = lenient::divisor(yield_fraction);
    let cost = current_price
        .checked_div(units)
        .and_then(|per_unit| {
            Decimal::ONE
                .checked_div(usable)
                .and_then(|waste| per_unit.checked_mul(waste))
        });
    match cost {
        Some(cost) => round_for_storage(cost),
        None => {
            warn!(
                "Cost overflow for price {} over {} units at yield {}",
                current_price, units, usable
            );
            Decimal::ZERO
        }
    }
}

/// One ingredient line as entered: a free-text quantity and the cost of one
/// recipe unit of whatever it refers to.
#[derive(Debug, Clone, Copy)]
pub struct CostLine<'a> {
    pub quantity: &'a str,
    pub cost_per_unit: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeCost {
    pub recipe_total: Decimal,
    pub cost_per_unit: Decimal,
}

pub fn compute_recipe_cost<'a, I>(lines: I, recipe_unit_ratio: Option<Decimal>) -> RecipeCost
where
    I: IntoIterator<Item = CostLine<'a>>,
{
    let recipe_total = lines.into_iter().fold(Decimal::ZERO, |total, line| {
        let quantity = lenient::quantity(line.quantity);
        quantity
            .checked_mul(line.cost_per_unit)
            .and_then(|cost| total.checked_add(cost))
            .unwrap_or(total)
    });
    let ratio = recipe_unit_ratio
        .filter(|r| *r > Decimal::ONE)
        .unwrap_or(Decimal::ONE);
    let cost_per_unit = recipe_total.checked_div(ratio).unwrap_or(recipe_total);

    RecipeCost {
        recipe_total: round_for_storage(recipe_total),
        cost_per_unit: round_for_storage(cost_per_unit),
    }
}

/// `((prep + cook) / 60) * rate`, with the default hourly rate when none is
/// given.
pub fn compute_labor_cost(
    prep_minutes: Option<u32>,
    cook_minutes: Option<u32>,
    rate_per_hour: Option<Decimal>,
) -> Decimal {
    let minutes = u64::from(prep_minutes.unwrap_or(0)) + u64::from(cook_minutes.unwrap_or(0));
    let rate = rate_per_hour.unwrap_or_else(default_labor_rate);
    let hours = Decimal::from(minutes) / Decimal::from(MINUTES_PER_HOUR);
    hours
        .checked_mul(rate)
        .map(round_for_storage)
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod test {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("decimal")
    }

    #[test]
    fn case_of_twelve_at_ninety_five_percent_yield() {
        let cost = compute_ingredient_cost_per_unit(dec("48.00"), Some(dec("12")), Some(dec("0.95")));
        assert_eq!(cost, dec("4.2105"));
    }

    #[test]
    fn matches_the_formula_across_a_grid() {
        let prices = ["0.01", "1", "19.99", "48.00", "1250.5"];
        let units = ["1", "3", "12", "0.5", "250"];
        let yields = ["1", "0.95", "0.5", "0.333", "0.01"];
        for p in prices.iter() {
            for u in units.iter() {
                for y in yields.iter() {
                    let (p, u, y) = (dec(p), dec(u), dec(y));
                    let expected = round_for_storage((p / u) * (Decimal::ONE / y));
                    assert_eq!(
                        compute_ingredient_cost_per_unit(p, Some(u), Some(y)),
                        expected,
                        "price {} units {} yield {}",
                        p,
                        u,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn missing_or_zero_divisors_count_as_one() {
        assert_eq!(compute_ingredient_cost_per_unit(dec("10"), None, None), dec("10"));
        assert_eq!(
            compute_ingredient_cost_per_unit(dec("10"), Some(Decimal::ZERO), Some(Decimal::ZERO)),
            dec("10")
        );
    }

    #[test]
    fn full_yield_does_not_change_cost() {
        assert_eq!(
            compute_ingredient_cost_per_unit(dec("9"), Some(dec("4")), Some(Decimal::ONE)),
            dec("2.25")
        );
    }

    #[test]
    fn unreadable_quantities_cost_nothing() {
        let lines = vec![
            CostLine { quantity: "2", cost_per_unit: dec("1.50") },
            CostLine { quantity: "bad", cost_per_unit: dec("3.00") },
        ];

        let cost = compute_recipe_cost(lines, Some(dec("4")));

        assert_eq!(cost.recipe_total, dec("3.00"));
        assert_eq!(cost.cost_per_unit, dec("0.75"));
    }

    #[test]
    fn garbage_quantity_behaves_like_zero() {
        for garbage in &["", "bad", "n/a", "lots"] {
            let with_garbage = compute_recipe_cost(
                vec![
                    CostLine { quantity: "3", cost_per_unit: dec("2") },
                    CostLine { quantity: garbage, cost_per_unit: dec("7.25") },
                ],
                None,
            );
            let with_zero = compute_recipe_cost(
                vec![
                    CostLine { quantity: "3", cost_per_unit: dec("2") },
                    CostLine { quantity: "0", cost_per_unit: dec("7.25") },
                ],
                None,
            );
            assert_eq!(with_garbage, with_zero, "{:?}", garbage);
        }
    }

    #[test]
    fn ratio_below_one_is_clamped() {
        let lines = vec![CostLine { quantity: "1", cost_per_unit: dec("5") }];
        assert_eq!(compute_recipe_cost(lines.clone(), Some(dec("0.5"))).cost_per_unit, dec("5"));
        assert_eq!(compute_recipe_cost(lines.clone(), Some(Decimal::ZERO)).cost_per_unit, dec("5"));
        assert_eq!(compute_recipe_cost(lines, None).cost_per_unit, dec("5"));
    }

    #[test]
    fn empty_recipe_costs_nothing() {
        let cost = compute_recipe_cost(Vec::<CostLine>::new(), Some(dec("10")));
        assert_eq!(cost.recipe_total, Decimal::ZERO);
        assert_eq!(cost.cost_per_unit, Decimal::ZERO);
    }

    #[test]
    fn labor_uses_prep_and_cook_time() {
        assert_eq!(compute_labor_cost(Some(30), Some(30), Some(dec("18"))), dec("18"));
        assert_eq!(compute_labor_cost(Some(15), None, None), dec("5"));
        assert_eq!(compute_labor_cost(None, None, None), Decimal::ZERO);
    }

    #[test]
    fn labor_is_rounded_for_storage() {
        assert_eq!(compute_labor_cost(Some(10), Some(15), None), dec("8.3333"));
    }
}
