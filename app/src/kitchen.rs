//! An in-memory view of one organization's catalog and recipe book. It is
//! loaded explicitly and only changes when refreshed or told about a save.

use std::collections::BTreeMap;

use anyhow::Result;
use log::*;
use rust_decimal::Decimal;

use infra::ids::Id;
use infra::persistence::Storage;

use crate::allergens::{self, AllergenSuggestion};
use crate::catalog::MasterIngredient;
use crate::organization::Organization;
use crate::recipes::{IngredientRef, Recipe};

#[derive(Debug, Clone)]
pub struct KitchenIndex {
    organization: Id<Organization>,
    ingredients: BTreeMap<Id<MasterIngredient>, MasterIngredient>,
    recipes: BTreeMap<Id<Recipe>, Recipe>,
}

impl KitchenIndex {
    pub fn load<S: Storage>(storage: &mut S, organization: Id<Organization>) -> Result<Self> {
        let mut index = KitchenIndex::from_parts(organization, Vec::new(), Vec::new());
        index.refresh(storage)?;
        Ok(index)
    }

    /// Builds an index from documents already in hand. Documents that belong
    /// to other organizations are ignored. An ingredient whose stored cost
    /// disagrees with its pricing inputs is indexed with the recomputed cost.
    pub fn from_parts<I, R>(organization: Id<Organization>, ingredients: I, recipes: R) -> Self
    where
        I: IntoIterator<Item = MasterIngredient>,
        R: IntoIterator<Item = Recipe>,
    {
        let ingredients = ingredients
            .into_iter()
            .filter(|i| i.organization == organization)
            .map(|mut i| {
                if !i.cost_is_current() {
                    let stored = i.cost_per_recipe_unit();
                    let cost = i.recompute_cost();
                    warn!("Stored cost of {} was {}; using {}", i.id(), stored, cost);
                }
                (i.id(), i)
            })
            .collect();
        let recipes = recipes
            .into_iter()
            .filter(|r| r.organization == organization)
            .map(|r| (r.id(), r))
            .collect();
        KitchenIndex {
            organization,
            ingredients,
            recipes,
        }
    }

    /// Re-reads every ingredient and recipe of the organization.
    pub fn refresh<S: Storage>(&mut self, storage: &mut S) -> Result<()> {
        let ingredients = storage.list::<MasterIngredient>()?;
        let recipes = storage.list::<Recipe>()?;
        *self = KitchenIndex::from_parts(self.organization, ingredients, recipes);
        debug!(
            "Indexed {} ingredients and {} recipes for {}",
            self.ingredients.len(),
            self.recipes.len(),
            self.organization
        );
        Ok(())
    }

    pub fn organization(&self) -> Id<Organization> {
        self.organization
    }

    pub fn ingredient(&self, id: &Id<MasterIngredient>) -> Option<&MasterIngredient> {
        self.ingredients.get(id)
    }

    pub fn recipe(&self, id: &Id<Recipe>) -> Option<&Recipe> {
        self.recipes.get(id)
    }

    pub fn recipes(&self) -> impl Iterator<Item = &Recipe> + '_ {
        self.recipes.values()
    }

    /// Replaces the indexed copy of a recipe after it has been saved.
    pub fn update_recipe(&mut self, recipe: Recipe) {
        if recipe.organization == self.organization {
            self.recipes.insert(recipe.id(), recipe);
        }
    }

    /// Cost of one recipe unit of whatever `reference` points at.
    pub fn line_cost(&self, reference: &IngredientRef) -> Option<Decimal> {
        match reference {
            IngredientRef::Purchased {
                master_ingredient_id,
            } => self
                .ingredient(master_ingredient_id)
                .map(|i| i.cost_per_recipe_unit()),
            IngredientRef::SubRecipe { recipe_id } => {
                self.recipe(recipe_id).map(|r| r.cost_per_unit())
            }
        }
    }

    pub fn suggest_allergens(&self, recipe: &Recipe) -> AllergenSuggestion {
        allergens::derive_contains_set(recipe.ingredient_refs(), &self.ingredients, &self.recipes)
    }
}
