use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};

use crate::allergens::AllergenFlags;
use crate::costing;
use crate::organization::Organization;

const PERCENT: u32 = 100;

/// A purchasable item in an organization's catalog.
///
/// `cost_per_recipe_unit` is derived from the three pricing inputs and is
/// recomputed by every method that changes one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterIngredient {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<MasterIngredient>,
    pub organization: Id<Organization>,
    pub product: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub item_code: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub case_size: String,
    #[serde(default)]
    pub units_per_case: Option<Decimal>,
    #[serde(default)]
    pub recipe_unit_type: String,
    #[serde(default)]
    current_price: Decimal,
    #[serde(default)]
    recipe_unit_per_purchase_unit: Option<Decimal>,
    #[serde(default = "full_yield", deserialize_with = "yield_fraction")]
    yield_percent: Decimal,
    #[serde(default)]
    cost_per_recipe_unit: Decimal,
    #[serde(default)]
    pub allergens: AllergenFlags,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The inputs to an ingredient's recipe-unit cost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    pub current_price: Decimal,
    #[serde(default)]
    pub recipe_unit_per_purchase_unit: Option<Decimal>,
    /// Usable fraction after trim and waste; missing means all of it.
    #[serde(default)]
    pub yield_percent: Option<Decimal>,
}

fn full_yield() -> Decimal {
    Decimal::ONE
}

/// Yields above one were written as percentages; read them as fractions.
fn normalize_yield(value: Decimal) -> Decimal {
    if value > Decimal::ONE {
        value / Decimal::from(PERCENT)
    } else {
        value
    }
}

fn yield_fraction<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    let stored = Option::<Decimal>::deserialize(deserializer)?;
    Ok(stored.map(normalize_yield).unwrap_or_else(full_yield))
}

impl MasterIngredient {
    pub fn new(
        id: Id<MasterIngredient>,
        organization: Id<Organization>,
        product: &str,
        pricing: Pricing,
    ) -> Self {
        let mut item = MasterIngredient {
            meta: DocMeta::new_with_id(id),
            organization,
            product: product.to_string(),
            vendor: String::new(),
            item_code: String::new(),
            category: String::new(),
            case_size: String::new(),
            units_per_case: None,
            recipe_unit_type: String::new(),
            current_price: Decimal::ZERO,
            recipe_unit_per_purchase_unit: None,
            yield_percent: Decimal::ONE,
            cost_per_recipe_unit: Decimal::ZERO,
            allergens: AllergenFlags::default(),
            updated_at: None,
        };
        item.reprice(pricing);
        item
    }

    pub fn id(&self) -> Id<MasterIngredient> {
        self.meta.id
    }

    pub fn current_price(&self) -> Decimal {
        self.current_price
    }

    pub fn recipe_unit_per_purchase_unit(&self) -> Option<Decimal> {
        self.recipe_unit_per_purchase_unit
    }

    pub fn yield_fraction(&self) -> Decimal {
        self.yield_percent
    }

    pub fn cost_per_recipe_unit(&self) -> Decimal {
        self.cost_per_recipe_unit
    }

    pub fn pricing(&self) -> Pricing {
        Pricing {
            current_price: self.current_price,
            recipe_unit_per_purchase_unit: self.recipe_unit_per_purchase_unit,
            yield_percent: Some(self.yield_percent),
        }
    }

    /// Replaces all pricing inputs and returns the new recipe-unit cost.
    pub fn reprice(&mut self, pricing: Pricing) -> Decimal {
        self.current_price = pricing.current_price;
        self.recipe_unit_per_purchase_unit = pricing.recipe_unit_per_purchase_unit;
        self.yield_percent = pricing
            .yield_percent
            .map(normalize_yield)
            .unwrap_or_else(full_yield);
        self.recompute_cost()
    }

    pub fn set_current_price(&mut self, price: Decimal) -> Decimal {
        self.current_price = price;
        self.recompute_cost()
    }

    pub fn set_recipe_unit_per_purchase_unit(&mut self, units: Option<Decimal>) -> Decimal {
        self.recipe_unit_per_purchase_unit = units;
        self.recompute_cost()
    }

    pub fn set_yield_fraction(&mut self, fraction: Option<Decimal>) -> Decimal {
        self.yield_percent = fraction.map(normalize_yield).unwrap_or_else(full_yield);
        self.recompute_cost()
    }

    /// Whether the stored cost agrees with the pricing inputs. Documents
    /// written by older editors may disagree.
    pub fn cost_is_current(&self) -> bool {
        self.cost_per_recipe_unit == self.derived_cost()
    }

    pub(crate) fn recompute_cost(&mut self) -> Decimal {
        self.cost_per_recipe_unit = self.derived_cost();
        self.cost_per_recipe_unit
    }

    fn derived_cost(&self) -> Decimal {
        costing::compute_ingredient_cost_per_unit(
            self.current_price,
            self.recipe_unit_per_purchase_unit,
            Some(self.yield_percent),
        )
    }
}

impl Entity for MasterIngredient {
    const PREFIX: &'static str = "ingredient";
}

impl HasMeta for MasterIngredient {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}
