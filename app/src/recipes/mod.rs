use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use chrono::Utc;
use log::*;
use r2d2::{self, Pool};
use rust_decimal::Decimal;
use serde::Serialize;

use infra::ids::{Id, IdGen};
use infra::persistence::Storage;
use infra::untyped_ids::UntypedId;

use crate::allergens::{Allergen, AllergenSuggestion, Tier};
use crate::kitchen::KitchenIndex;
use crate::organization::Organization;
use crate::services::{Commandable, NotFound, Queryable, Request};

mod models;
mod stages;
mod versions;

pub use self::models::{
    IngredientRef, InvalidTransition, QualityStandards, Recipe, RecipeContent, RecipeIngredient,
    RecipeStage, RecipeStatus, RecipeStep, RecipeType, Recosting, StorageInstructions,
    Temperature, Training, UnknownStage, WarningLevel, Yield,
};
pub use self::stages::{roll_up_stage_times, StageRollup};
pub use self::versions::{
    Approval, Bump, RecipeSnapshot, RecipeVersion, UnknownVersion, VersionLabel,
};

#[derive(Debug)]
pub struct RecipeBook<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: IdGen,
    labor_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRecipe {
    pub organization: Id<Organization>,
    pub name: String,
    pub recipe_type: RecipeType,
    pub description: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowRecipe {
    pub id: Id<Recipe>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListRecipes {
    pub organization: Id<Organization>,
    pub status: Option<RecipeStatus>,
    pub recipe_type: Option<RecipeType>,
}

/// Replaces the ingredient list, and the unit ratio when one is given.
#[derive(Debug, Clone, PartialEq)]
pub struct EditIngredients {
    pub id: Id<Recipe>,
    pub ingredients: Vec<RecipeIngredient>,
    pub recipe_unit_ratio: Option<Decimal>,
    pub edited_by: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditTiming {
    pub id: Id<Recipe>,
    pub prep_time: u32,
    pub cook_time: u32,
    pub rest_time: u32,
    pub edited_by: String,
}

/// Replaces the steps, and the stages when they are given.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSteps {
    pub id: Id<Recipe>,
    pub steps: Vec<RecipeStep>,
    pub stages: Option<Vec<RecipeStage>>,
    pub edited_by: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStage {
    pub id: Id<Recipe>,
    pub stage_id: UntypedId,
    pub edited_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recost {
    pub id: Id<Recipe>,
}

/// Recosts every recipe of an organization, sub-recipes before the recipes
/// that use them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecostAll {
    pub organization: Id<Organization>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuggestAllergens {
    pub id: Id<Recipe>,
}

/// Sets the tier of one allergen, or clears it when `tier` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclareAllergen {
    pub id: Id<Recipe>,
    pub allergen: Allergen,
    pub tier: Option<Tier>,
    pub edited_by: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmAllergens {
    pub id: Id<Recipe>,
    pub allergens: Vec<Allergen>,
    pub edited_by: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateVersion {
    pub id: Id<Recipe>,
    pub bump: Bump,
    pub author: String,
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RevertToVersion {
    pub id: Id<Recipe>,
    pub version: VersionLabel,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeStatus {
    pub id: Id<Recipe>,
    pub status: RecipeStatus,
    pub actor: String,
    pub notes: String,
}

/// What the ingredients suggest, and which of those the recipe does not yet
/// declare as contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllergenReview {
    pub suggestion: AllergenSuggestion,
    pub unconfirmed: BTreeSet<Allergen>,
}

impl Request for CreateRecipe {
    type Resp = Id<Recipe>;
}

impl Request for ShowRecipe {
    type Resp = Option<Recipe>;
}

impl Request for ListRecipes {
    type Resp = Vec<Recipe>;
}

impl Request for EditIngredients {
    type Resp = Recosting;
}

impl Request for EditTiming {
    type Resp = Recosting;
}

impl Request for EditSteps {
    type Resp = StageRollup;
}

impl Request for DeleteStage {
    type Resp = usize;
}

impl Request for Recost {
    type Resp = Recosting;
}

impl Request for RecostAll {
    type Resp = BTreeMap<Id<Recipe>, Recosting>;
}

impl Request for SuggestAllergens {
    type Resp = AllergenReview;
}

impl Request for DeclareAllergen {
    type Resp = ();
}

impl Request for ConfirmAllergens {
    type Resp = Vec<Allergen>;
}

impl Request for CreateVersion {
    type Resp = VersionLabel;
}

impl Request for RevertToVersion {
    type Resp = VersionLabel;
}

impl Request for ChangeStatus {
    type Resp = ();
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> RecipeBook<M> {
    pub fn new(db: Pool<M>, labor_rate: Decimal) -> Result<Self> {
        let idgen = IdGen::new();
        Ok(RecipeBook {
            db,
            idgen,
            labor_rate,
        })
    }

    fn load_existing(&self, id: Id<Recipe>) -> Result<Recipe> {
        let recipe = self
            .db
            .get()?
            .load(&id)?
            .ok_or_else(|| NotFound(id.to_string()))?;
        Ok(recipe)
    }

    fn index_for(&self, recipe: &Recipe) -> Result<KitchenIndex> {
        let mut conn = self.db.get()?;
        KitchenIndex::load(&mut *conn, recipe.organization)
    }

    fn store(&self, recipe: &mut Recipe, what: &str) -> Result<()> {
        self.db
            .get()?
            .save(recipe)
            .with_context(|| format!("{} {}", what, recipe.id()))?;
        debug!("Saved {} after {}: {}", recipe.id(), what, recipe.meta.version);
        Ok(())
    }

    /// Loads, applies `edit`, and saves. Nothing is saved if `edit` fails.
    fn modify<T, F>(&self, id: Id<Recipe>, by: &str, what: &str, edit: F) -> Result<T>
    where
        F: FnOnce(&mut Recipe) -> Result<T>,
    {
        let mut recipe = self.load_existing(id)?;
        let out = edit(&mut recipe).with_context(|| format!("{} {}", what, id))?;
        recipe.touch(Utc::now(), by);
        self.store(&mut recipe, what)?;
        Ok(out)
    }

    fn recost_with(&self, recipe: &mut Recipe, index: &KitchenIndex) -> Recosting {
        let recosting = recipe.recost(|r| index.line_cost(r), Some(self.labor_rate));
        if !recosting.unresolved.is_empty() {
            warn!(
                "Recipe {} has {} unresolved ingredient lines: {:?}",
                recipe.id(),
                recosting.unresolved.len(),
                recosting.unresolved
            );
        }
        recosting
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CreateRecipe> for RecipeBook<M>
{
    fn execute(&self, req: CreateRecipe) -> Result<Id<Recipe>> {
        let mut recipe = Recipe::new(
            self.idgen.generate(),
            req.organization,
            &req.name,
            req.recipe_type,
        );
        recipe.content.description = req.description;
        recipe.touch(Utc::now(), &req.created_by);

        self.store(&mut recipe, "create")?;
        info!("Created {:?} recipe {} {:?}", req.recipe_type, recipe.id(), req.name);
        Ok(recipe.id())
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ShowRecipe> for RecipeBook<M>
{
    fn query(&self, req: ShowRecipe) -> Result<Option<Recipe>> {
        let recipe = self.db.get()?.load(&req.id)?;
        Ok(recipe)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ListRecipes> for RecipeBook<M>
{
    fn query(&self, req: ListRecipes) -> Result<Vec<Recipe>> {
        let mut recipes = self
            .db
            .get()?
            .list::<Recipe>()?
            .into_iter()
            .filter(|r| r.organization == req.organization)
            .filter(|r| req.status.map(|s| s == r.status).unwrap_or(true))
            .filter(|r| {
                req.recipe_type
                    .map(|t| t == r.content.recipe_type)
                    .unwrap_or(true)
            })
            .collect::<Vec<_>>();
        recipes.sort_by(|a, b| {
            a.name()
                .to_lowercase()
                .cmp(&b.name().to_lowercase())
                .then(a.id().cmp(&b.id()))
        });
        Ok(recipes)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<EditIngredients> for RecipeBook<M>
{
    fn execute(&self, req: EditIngredients) -> Result<Recosting> {
        let EditIngredients {
            id,
            ingredients,
            recipe_unit_ratio,
            edited_by,
        } = req;
        let mut recipe = self.load_existing(id)?;
        let index = self.index_for(&recipe)?;

        recipe.content.ingredients = ingredients;
        if recipe_unit_ratio.is_some() {
            recipe.content.recipe_unit_ratio = recipe_unit_ratio;
        }
        let recosting = self.recost_with(&mut recipe, &index);
        recipe.touch(Utc::now(), &edited_by);

        self.store(&mut recipe, "edit ingredients of")?;
        info!(
            "Recipe {} now has {} lines at {} per unit",
            id,
            recipe.content.ingredients.len(),
            recipe.cost_per_unit()
        );
        Ok(recosting)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<EditTiming> for RecipeBook<M>
{
    fn execute(&self, req: EditTiming) -> Result<Recosting> {
        let mut recipe = self.load_existing(req.id)?;
        let index = self.index_for(&recipe)?;

        recipe.content.prep_time = req.prep_time;
        recipe.content.cook_time = req.cook_time;
        recipe.content.rest_time = req.rest_time;
        recipe.update_total_time();
        let recosting = self.recost_with(&mut recipe, &index);
        recipe.touch(Utc::now(), &req.edited_by);

        self.store(&mut recipe, "edit timing of")?;
        Ok(recosting)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<EditSteps> for RecipeBook<M>
{
    fn execute(&self, req: EditSteps) -> Result<StageRollup> {
        let EditSteps {
            id,
            steps,
            stages,
            edited_by,
        } = req;
        self.modify(id, &edited_by, "edit steps of", |recipe| {
            recipe.content.steps = steps;
            if let Some(stages) = stages {
                recipe.content.stages = stages;
            }
            let rollup = recipe.roll_up_stages();
            debug!(
                "Stage totals of {}: {:?}, unstaged {}",
                id,
                rollup
                    .stages
                    .iter()
                    .map(|s| (&s.name, s.total_time))
                    .collect::<Vec<_>>(),
                rollup.unstaged_time
            );
            Ok(rollup)
        })
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeleteStage> for RecipeBook<M>
{
    fn execute(&self, req: DeleteStage) -> Result<usize> {
        let stage_id = req.stage_id;
        let released = self.modify(req.id, &req.edited_by, "delete stage of", |recipe| {
            Ok(recipe.delete_stage(stage_id)?)
        })?;
        info!(
            "Deleted stage {} of {}; {} steps are now unstaged",
            stage_id, req.id, released
        );
        Ok(released)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<Recost> for RecipeBook<M>
{
    fn execute(&self, req: Recost) -> Result<Recosting> {
        let mut recipe = self.load_existing(req.id)?;
        let index = self.index_for(&recipe)?;
        let recosting = self.recost_with(&mut recipe, &index);

        if recosting.changed {
            recipe.touch(Utc::now(), "");
            self.store(&mut recipe, "recost")?;
            info!("Recosted {}: {} per unit", req.id, recipe.cost_per_unit());
        } else {
            debug!("Cost of {} unchanged", req.id);
        }
        Ok(recosting)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<RecostAll> for RecipeBook<M>
{
    fn execute(&self, req: RecostAll) -> Result<BTreeMap<Id<Recipe>, Recosting>> {
        let mut conn = self.db.get()?;
        let mut index = KitchenIndex::load(&mut *conn, req.organization)?;

        let mut results = BTreeMap::new();
        for id in dependency_order(&index) {
            let mut recipe = match index.recipe(&id) {
                Some(r) => r.clone(),
                None => continue,
            };
            let recosting = self.recost_with(&mut recipe, &index);
            if recosting.changed {
                recipe.touch(Utc::now(), "");
                conn.save(&mut recipe)
                    .with_context(|| format!("recost {}", id))?;
                index.update_recipe(recipe);
            }
            results.insert(id, recosting);
        }
        info!(
            "Recosted {} recipes of {}; {} changed",
            results.len(),
            req.organization,
            results.values().filter(|r| r.changed).count()
        );
        Ok(results)
    }
}

/// Orders recipes so every sub-recipe comes before the recipes using it.
/// Cycles are broken where they are found.
fn dependency_order(index: &KitchenIndex) -> Vec<Id<Recipe>> {
    fn visit(
        id: Id<Recipe>,
        index: &KitchenIndex,
        visiting: &mut BTreeSet<Id<Recipe>>,
        done: &mut BTreeSet<Id<Recipe>>,
        order: &mut Vec<Id<Recipe>>,
    ) {
        if done.contains(&id) {
            return;
        }
        if !visiting.insert(id) {
            warn!("Recipe {} is its own sub-recipe; breaking the cycle", id);
            return;
        }
        if let Some(recipe) = index.recipe(&id) {
            for sub in recipe.sub_recipes() {
                visit(sub, index, visiting, done, order);
            }
            order.push(id);
        }
        visiting.remove(&id);
        done.insert(id);
    }

    let mut visiting = BTreeSet::new();
    let mut done = BTreeSet::new();
    let mut order = Vec::new();
    for recipe in index.recipes() {
        visit(recipe.id(), index, &mut visiting, &mut done, &mut order);
    }
    order
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<SuggestAllergens> for RecipeBook<M>
{
    fn query(&self, req: SuggestAllergens) -> Result<AllergenReview> {
        let recipe = self.load_existing(req.id)?;
        let index = self.index_for(&recipe)?;
        let suggestion = index.suggest_allergens(&recipe);
        let unconfirmed = recipe.allergen_info.unconfirmed(&suggestion);
        if !suggestion.unresolved.is_empty() {
            warn!(
                "Allergen suggestion for {} skipped {} unresolved lines",
                req.id,
                suggestion.unresolved.len()
            );
        }
        Ok(AllergenReview {
            suggestion,
            unconfirmed,
        })
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeclareAllergen> for RecipeBook<M>
{
    fn execute(&self, req: DeclareAllergen) -> Result<()> {
        let DeclareAllergen {
            id,
            allergen,
            tier,
            edited_by,
        } = req;
        self.modify(id, &edited_by, "declare allergen on", |recipe| {
            match tier {
                Some(tier) => recipe.allergen_info.declare(allergen.clone(), tier),
                None => {
                    recipe.allergen_info.clear(&allergen);
                }
            }
            Ok(())
        })?;
        info!("Allergen {} on {} is now {:?}", allergen, id, tier);
        Ok(())
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<ConfirmAllergens> for RecipeBook<M>
{
    fn execute(&self, req: ConfirmAllergens) -> Result<Vec<Allergen>> {
        let ConfirmAllergens {
            id,
            allergens,
            edited_by,
        } = req;
        let added = self.modify(id, &edited_by, "confirm allergens on", |recipe| {
            Ok(recipe.allergen_info.confirm(allergens))
        })?;
        info!("Confirmed {:?} on {}", added, id);
        Ok(added)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CreateVersion> for RecipeBook<M>
{
    fn execute(&self, req: CreateVersion) -> Result<VersionLabel> {
        let CreateVersion {
            id,
            bump,
            author,
            changes,
        } = req;
        let label = self.modify(id, &author, "version", |recipe| {
            Ok(recipe
                .create_version(bump, &author, changes, Utc::now())
                .version())
        })?;
        info!("Recipe {} is now at version {}", id, label);
        Ok(label)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<RevertToVersion> for RecipeBook<M>
{
    fn execute(&self, req: RevertToVersion) -> Result<VersionLabel> {
        let RevertToVersion {
            id,
            version,
            author,
        } = req;
        let mut recipe = self.load_existing(id)?;
        let index = self.index_for(&recipe)?;

        let label = recipe
            .revert_to(version, &author, Utc::now())
            .with_context(|| format!("revert {}", id))?
            .version();
        recipe.update_total_time();
        recipe.roll_up_stages();
        self.recost_with(&mut recipe, &index);
        recipe.touch(Utc::now(), &author);

        self.store(&mut recipe, "revert")?;
        info!("Reverted {} to {} as {}", id, version, label);
        Ok(label)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<ChangeStatus> for RecipeBook<M>
{
    fn execute(&self, req: ChangeStatus) -> Result<()> {
        let ChangeStatus {
            id,
            status,
            actor,
            notes,
        } = req;
        self.modify(id, &actor, "change status of", |recipe| {
            recipe.change_status(status)?;
            if status == RecipeStatus::Approved {
                let approval = Approval {
                    approved_by: actor.clone(),
                    approved_at: Utc::now(),
                    notes,
                };
                let label = recipe.attach_approval(approval);
                debug!("Approval recorded on version {}", label);
            }
            Ok(())
        })?;
        info!("Recipe {} is now {}", id, status);
        Ok(())
    }
}
