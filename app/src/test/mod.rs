//! Guarded with `#[cfg(test)]` from `lib.rs`

use anyhow::Result;
use maplit::btreeset;
use rust_decimal::Decimal;

use infra::ids::Id;
use infra::persistence::{ConcurrencyError, Storage};

use crate::allergens::{Allergen, AllergenFlags, AllergenType, Tier};
use crate::catalog::{
    AddIngredient, MasterIngredient, Pricing, RemoveIngredient, ShowCatalog, ShowIngredient,
    UpdateAllergens, UpdatePricing,
};
use crate::organization::Organization;
use crate::recipes::{
    Bump, ChangeStatus, ConfirmAllergens, CreateRecipe, CreateVersion, DeclareAllergen,
    DeleteStage, EditIngredients, EditSteps, EditTiming, IngredientRef, ListRecipes, Recipe,
    RecipeIngredient, RecipeStage, RecipeStatus, RecipeStep, RecipeType, Recost, RecostAll,
    RevertToVersion, ShowRecipe, SuggestAllergens, VersionLabel,
};
use crate::schedule::{AddTeamMember, MatchSchedule, ScheduleEmployee, ShowTeam};
use crate::services::{Commandable, NotFound, Queryable};
use crate::Brigade;


fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal")
}

fn add_ingredient<M, D>(
    brigade: &Brigade<M>,
    org: Id<Organization>,
    product: &str,
    price: &str,
    units: &str,
    flags: &[AllergenType],
) -> Result<Id<MasterIngredient>>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Storage + Send + 'static,
{
    let mut allergens = AllergenFlags::default();
    for f in flags {
        allergens.set(*f, true);
    }
    brigade.catalog()?.execute(AddIngredient {
        organization: org,
        product: product.into(),
        recipe_unit_type: "each".into(),
        pricing: Pricing {
            current_price: dec(price),
            recipe_unit_per_purchase_unit: Some(dec(units)),
            yield_percent: None,
        },
        allergens,
        ..AddIngredient::default()
    })
}

fn create_recipe<M, D>(
    brigade: &Brigade<M>,
    org: Id<Organization>,
    name: &str,
    recipe_type: RecipeType,
) -> Result<Id<Recipe>>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Storage + Send + 'static,
{
    brigade.recipes()?.execute(CreateRecipe {
        organization: org,
        name: name.into(),
        recipe_type,
        description: String::new(),
        created_by: "chef".into(),
    })
}

fn lines(items: &[(IngredientRef, &str)]) -> Vec<RecipeIngredient> {
    let idgen = infra::ids::IdGen::new();
    items
        .iter()
        .map(|(r, q)| RecipeIngredient::new(idgen.untyped(), *r, q))
        .collect()
}

fn show<M, D>(brigade: &Brigade<M>, id: Id<Recipe>) -> Result<Recipe>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Storage + Send + 'static,
{
    let recipe = brigade
        .recipes()?
        .query(ShowRecipe { id })?
        .ok_or_else(|| NotFound(id.to_string()))?;
    Ok(recipe)
}

fn costing_workflow<M, D>(brigade: Brigade<M>) -> Result<()>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Storage + Send + 'static,
{
    let org = brigade.create_organization("Test Kitchen")?;
    let oil = add_ingredient(&brigade, org, "Olive oil", "48.00", "12", &[])?;
    brigade.catalog()?.execute(UpdatePricing {
        id: oil,
        pricing: Pricing {
            current_price: dec("48.00"),
            recipe_unit_per_purchase_unit: Some(dec("12")),
            yield_percent: Some(dec("0.95")),
        },
    })?;
    let item = brigade
        .catalog()?
        .query(ShowIngredient { id: oil })?
        .expect("oil");
    assert_eq!(item.cost_per_recipe_unit(), dec("4.2105"));

    let butter = add_ingredient(&brigade, org, "Butter", "6", "4", &[AllergenType::Milk])?;
    let shallot = add_ingredient(&brigade, org, "Shallot", "9", "3", &[])?;

    let sauce = create_recipe(&brigade, org, "Beurre blanc", RecipeType::Prepared)?;
    let recosting = brigade.recipes()?.execute(EditIngredients {
        id: sauce,
        ingredients: lines(&[
            (IngredientRef::purchased(butter), "2"),
            (IngredientRef::purchased(shallot), "a handful"),
        ]),
        recipe_unit_ratio: Some(dec("4")),
        edited_by: "chef".into(),
    })?;
    assert_eq!(recosting.cost.recipe_total, dec("3.00"));
    assert_eq!(recosting.cost.cost_per_unit, dec("0.75"));

    let fish = create_recipe(&brigade, org, "Fish with beurre blanc", RecipeType::Final)?;
    brigade.recipes()?.execute(EditIngredients {
        id: fish,
        ingredients: lines(&[(IngredientRef::sub_recipe(sauce), "2")]),
        recipe_unit_ratio: None,
        edited_by: "chef".into(),
    })?;
    assert_eq!(show(&brigade, fish)?.cost_per_unit(), dec("1.50"));

    brigade.catalog()?.execute(UpdatePricing {
        id: butter,
        pricing: Pricing {
            current_price: dec("12"),
            recipe_unit_per_purchase_unit: Some(dec("4")),
            yield_percent: None,
        },
    })?;
    assert_eq!(show(&brigade, fish)?.cost_per_unit(), dec("1.50"));

    let all = brigade.recipes()?.execute(RecostAll { organization: org })?;
    assert_eq!(all.len(), 2);
    assert_eq!(show(&brigade, sauce)?.cost_per_unit(), dec("1.50"));
    assert_eq!(show(&brigade, fish)?.cost_per_unit(), dec("3.00"));

    let again = brigade.recipes()?.execute(Recost { id: fish })?;
    assert!(!again.changed);

    let timing = brigade.recipes()?.execute(EditTiming {
        id: fish,
        prep_time: 20,
        cook_time: 10,
        rest_time: 5,
        edited_by: "sous".into(),
    })?;
    assert_eq!(timing.labor_cost, dec("10"));
    let fish_doc = show(&brigade, fish)?;
    assert_eq!(fish_doc.content.total_time, 35);
    assert_eq!(fish_doc.modified_by, "sous");
    Ok(())
}

#[test]
fn costing_workflow_in_memory() -> Result<()> {
    costing_workflow(junk_drawer::memory()?)
}

#[test]
#[ignore = "needs $POSTGRES_URL"]
fn costing_workflow_in_postgres() -> Result<()> {
    costing_workflow(junk_drawer::postgres("costing_workflow_in_postgres")?)
}

#[test]
fn recost_all_survives_sub_recipe_cycles() -> Result<()> {
    let brigade = junk_drawer::memory()?;
    let org = brigade.create_organization("Test Kitchen")?;
    let butter = add_ingredient(&brigade, org, "Butter", "6", "4", &[AllergenType::Milk])?;
    let a = create_recipe(&brigade, org, "Mother sauce", RecipeType::Prepared)?;
    let b = create_recipe(&brigade, org, "Daughter sauce", RecipeType::Prepared)?;
    let looped = create_recipe(&brigade, org, "Reduction", RecipeType::Prepared)?;

    brigade.recipes()?.execute(EditIngredients {
        id: a,
        ingredients: lines(&[
            (IngredientRef::purchased(butter), "1"),
            (IngredientRef::sub_recipe(b), "1"),
        ]),
        recipe_unit_ratio: None,
        edited_by: "chef".into(),
    })?;
    brigade.recipes()?.execute(EditIngredients {
        id: b,
        ingredients: lines(&[(IngredientRef::sub_recipe(a), "1")]),
        recipe_unit_ratio: None,
        edited_by: "chef".into(),
    })?;
    brigade.recipes()?.execute(EditIngredients {
        id: looped,
        ingredients: lines(&[
            (IngredientRef::purchased(butter), "2"),
            (IngredientRef::sub_recipe(looped), "1"),
        ]),
        recipe_unit_ratio: None,
        edited_by: "chef".into(),
    })?;

    let all = brigade.recipes()?.execute(RecostAll { organization: org })?;

    assert_eq!(all.len(), 3);
    // butter 1.5, plus one pass of B at 1.5 whichever of the two went first
    assert_eq!(show(&brigade, a)?.cost_per_unit(), dec("3.00"));
    assert!(show(&brigade, b)?.cost_per_unit() >= dec("1.50"));
    assert_eq!(show(&brigade, looped)?.cost_per_unit(), dec("6.00"));

    let review = brigade.recipes()?.query(SuggestAllergens { id: b })?;
    assert_eq!(review.suggestion.contains, btreeset! { Allergen::Known(AllergenType::Milk) });
    Ok(())
}

#[test]
fn allergen_suggestions_need_confirmation() -> Result<()> {
    let brigade = junk_drawer::memory()?;
    let org = brigade.create_organization("Test Kitchen")?;
    let flour = add_ingredient(
        &brigade,
        org,
        "Flour",
        "20",
        "25",
        &[AllergenType::Wheat, AllergenType::Gluten],
    )?;
    let eggs = add_ingredient(&brigade, org, "Eggs", "36", "180", &[AllergenType::Egg])?;
    let pasta = create_recipe(&brigade, org, "Fresh pasta", RecipeType::Prepared)?;
    brigade.recipes()?.execute(EditIngredients {
        id: pasta,
        ingredients: lines(&[
            (IngredientRef::purchased(flour), "0.5"),
            (IngredientRef::purchased(eggs), "5"),
            (IngredientRef::purchased(Id::hashed("long gone")), "1"),
        ]),
        recipe_unit_ratio: None,
        edited_by: "chef".into(),
    })?;
    brigade.recipes()?.execute(DeclareAllergen {
        id: pasta,
        allergen: Allergen::named("egg"),
        tier: Some(Tier::MayContain),
        edited_by: "chef".into(),
    })?;

    let review = brigade.recipes()?.query(SuggestAllergens { id: pasta })?;
    let expected = btreeset! {
        Allergen::Known(AllergenType::Wheat),
        Allergen::Known(AllergenType::Gluten),
        Allergen::Known(AllergenType::Egg),
    };
    assert_eq!(review.suggestion.contains, expected);
    assert_eq!(review.unconfirmed, expected);
    assert_eq!(review.suggestion.unresolved.len(), 1);
    assert!(show(&brigade, pasta)?.allergen_info.contains().is_empty());

    let added = brigade.recipes()?.execute(ConfirmAllergens {
        id: pasta,
        allergens: vec![Allergen::Known(AllergenType::Egg), Allergen::Known(AllergenType::Wheat)],
        edited_by: "chef".into(),
    })?;
    assert_eq!(added.len(), 2);
    let recipe = show(&brigade, pasta)?;
    assert_eq!(
        recipe.allergen_info.tier_of(&Allergen::Known(AllergenType::Egg)),
        Some(Tier::Contains)
    );
    assert!(recipe.allergen_info.may_contain().is_empty());

    brigade.catalog()?.execute(UpdateAllergens {
        id: flour,
        allergens: AllergenFlags::default(),
    })?;
    let review = brigade.recipes()?.query(SuggestAllergens { id: pasta })?;
    assert_eq!(review.suggestion.contains, btreeset! { Allergen::Known(AllergenType::Egg) });
    assert!(
        show(&brigade, pasta)?
            .allergen_info
            .contains()
            .contains(&Allergen::Known(AllergenType::Wheat)),
        "declarations survive changes to ingredient flags"
    );
    Ok(())
}

#[test]
fn stages_roll_up_and_survive_deletion() -> Result<()> {
    let brigade = junk_drawer::memory()?;
    let org = brigade.create_organization("Test Kitchen")?;
    let bread = create_recipe(&brigade, org, "Focaccia", RecipeType::Final)?;
    let idgen = infra::ids::IdGen::new();
    let prep = RecipeStage::new(idgen.untyped(), "Prep");
    let step = |minutes: u32, stage: Option<&RecipeStage>| {
        let mut s = RecipeStep::new(idgen.untyped(), "work");
        s.time_in_minutes = Some(minutes);
        s.stage_id = stage.map(|st| st.id);
        s
    };

    let rollup = brigade.recipes()?.execute(EditSteps {
        id: bread,
        steps: vec![step(5, Some(&prep)), step(10, Some(&prep)), step(3, None)],
        stages: Some(vec![prep.clone()]),
        edited_by: "baker".into(),
    })?;
    assert_eq!(rollup.stages[0].total_time, 15);
    assert_eq!(rollup.unstaged_time, 3);
    assert_eq!(show(&brigade, bread)?.content.stages[0].total_time, 15);

    let released = brigade.recipes()?.execute(DeleteStage {
        id: bread,
        stage_id: prep.id,
        edited_by: "baker".into(),
    })?;
    assert_eq!(released, 2);
    let recipe = show(&brigade, bread)?;
    assert!(recipe.content.stages.is_empty());
    assert_eq!(recipe.content.steps.len(), 3);
    assert!(recipe.content.steps.iter().all(|s| s.stage_id.is_none()));

    let err = brigade
        .recipes()?
        .execute(DeleteStage {
            id: bread,
            stage_id: prep.id,
            edited_by: "baker".into(),
        })
        .expect_err("stage is gone");
    assert!(err.downcast_ref::<crate::recipes::UnknownStage>().is_some(), "{:?}", err);
    Ok(())
}

#[test]
fn versions_and_status() -> Result<()> {
    let brigade = junk_drawer::memory()?;
    let org = brigade.create_organization("Test Kitchen")?;
    let soup = create_recipe(&brigade, org, "Soup", RecipeType::Final)?;
    let book = brigade.recipes()?;

    let first = book.execute(CreateVersion {
        id: soup,
        bump: Bump::Minor,
        author: "chef".into(),
        changes: vec!["Initial".into()],
    })?;
    assert_eq!(first, VersionLabel::FIRST);

    book.execute(EditTiming {
        id: soup,
        prep_time: 15,
        cook_time: 45,
        rest_time: 0,
        edited_by: "chef".into(),
    })?;
    let second = book.execute(CreateVersion {
        id: soup,
        bump: Bump::Major,
        author: "chef".into(),
        changes: vec!["Longer simmer".into()],
    })?;
    assert_eq!(second.to_string(), "2.0");

    let reverted = book.execute(RevertToVersion {
        id: soup,
        version: first,
        author: "sous".into(),
    })?;
    assert_eq!(reverted.to_string(), "2.1");
    let recipe = show(&brigade, soup)?;
    assert_eq!(recipe.content.cook_time, 0);
    assert_eq!(recipe.labor_cost(), Decimal::ZERO);
    assert_eq!(recipe.versions().len(), 3);

    let bad = book.execute(ChangeStatus {
        id: soup,
        status: RecipeStatus::Approved,
        actor: "chef".into(),
        notes: String::new(),
    });
    assert!(bad.is_err());
    assert_eq!(show(&brigade, soup)?.status, RecipeStatus::Draft);

    for status in &[RecipeStatus::Review, RecipeStatus::Approved] {
        book.execute(ChangeStatus {
            id: soup,
            status: *status,
            actor: "exec chef".into(),
            notes: "good to go".into(),
        })?;
    }
    let recipe = show(&brigade, soup)?;
    assert_eq!(recipe.status, RecipeStatus::Approved);
    let approval = recipe
        .latest_version()
        .and_then(|v| v.approval())
        .expect("approval");
    assert_eq!(approval.approved_by, "exec chef");

    let approved = book.query(ListRecipes {
        organization: org,
        status: Some(RecipeStatus::Approved),
        recipe_type: None,
    })?;
    assert_eq!(approved.len(), 1);
    Ok(())
}

#[test]
fn stale_copies_are_rejected() -> Result<()> {
    let brigade = junk_drawer::memory()?;
    let org = brigade.create_organization("Test Kitchen")?;
    let id = create_recipe(&brigade, org, "Stock", RecipeType::Prepared)?;

    let mut ours = show(&brigade, id)?;
    brigade.recipes()?.execute(EditTiming {
        id,
        prep_time: 5,
        cook_time: 240,
        rest_time: 0,
        edited_by: "someone else".into(),
    })?;

    ours.content.description = "Brown".into();
    let before = ours.clone();
    let err = brigade
        .db
        .get()?
        .save(&mut ours)
        .expect_err("stale save");
    assert!(err.downcast_ref::<ConcurrencyError>().is_some(), "{:?}", err);
    assert_eq!(ours, before);
    Ok(())
}

#[test]
fn catalog_is_scoped_to_its_organization() -> Result<()> {
    let brigade = junk_drawer::memory()?;
    let ours = brigade.create_organization("Ours")?;
    let theirs = brigade.create_organization("Theirs")?;
    let salt = add_ingredient(&brigade, ours, "Salt", "2", "1000", &[])?;
    add_ingredient(&brigade, ours, "anchovy", "10", "50", &[AllergenType::Fish])?;
    add_ingredient(&brigade, theirs, "Pepper", "8", "500", &[])?;

    let items = brigade.catalog()?.query(ShowCatalog { organization: ours })?;
    let names = items.iter().map(|i| i.product.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["anchovy", "Salt"]);

    brigade.catalog()?.execute(RemoveIngredient { id: salt })?;
    assert!(brigade.catalog()?.query(ShowIngredient { id: salt })?.is_none());
    assert!(brigade
        .catalog()?
        .execute(RemoveIngredient { id: salt })
        .is_err());
    assert_eq!(brigade.organizations()?.len(), 2);
    Ok(())
}

#[test]
fn schedule_names_match_team_members() -> Result<()> {
    let brigade = junk_drawer::memory()?;
    let org = brigade.create_organization("Test Kitchen")?;
    let roster = brigade.roster()?;
    for (first, last) in &[("John", "Smithson"), ("Sam", "Lee"), ("Sam", "Park")] {
        roster.execute(AddTeamMember {
            organization: org,
            first_name: first.to_string(),
            last_name: last.to_string(),
            roles: vec!["line".into()],
            ..AddTeamMember::default()
        })?;
    }
    assert_eq!(roster.query(ShowTeam { organization: org })?.len(), 3);

    let result = roster.query(MatchSchedule {
        organization: org,
        employees: vec![
            ScheduleEmployee::named("John Smith"),
            ScheduleEmployee::named("Sam"),
            ScheduleEmployee::named("sam park"),
        ],
    })?;

    assert_eq!(result.matched["John Smith"].last_name, "Smithson");
    assert_eq!(result.matched["sam park"].last_name, "Park");
    assert_eq!(result.unmatched, vec!["Sam".to_string()]);
    Ok(())
}
