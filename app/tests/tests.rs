use anyhow::Result;
use lazy_static::lazy_static;
use rust_decimal::Decimal;

use brigade::allergens::{Allergen, AllergenFlags, AllergenType};
use brigade::catalog::{AddIngredient, Pricing, ShowCatalog};
use brigade::recipes::{
    Bump, ChangeStatus, ConfirmAllergens, CreateRecipe, CreateVersion, EditIngredients,
    IngredientRef, RecipeIngredient, RecipeStatus, RecipeType, ShowRecipe, SuggestAllergens,
};
use brigade::schedule::{AddTeamMember, MatchSchedule, ScheduleEmployee};
use brigade::services::{Commandable, Queryable};
use brigade::Brigade;
use infra::ids::IdGen;

const SCHEDULE: &str = r#"[
    { "name": "Maria Gonzalez" },
    { "name": "Tom K." },
    { "name": "Dee", "firstName": "Deirdre", "lastName": "O'Neill" },
    { "name": "Agency Temp" }
]"#;

lazy_static! {
    static ref EMPLOYEES: Vec<ScheduleEmployee> =
        serde_json::from_str(SCHEDULE).expect("schedule fixture");
}

fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal")
}

struct Kitchen {
    brigade: Brigade<infra::memory::MemoryConnectionManager>,
    idgen: IdGen,
}

impl Kitchen {
    fn open() -> Result<Self> {
        env_logger::try_init().unwrap_or_default();
        let brigade = Brigade::in_memory()?.with_labor_rate(dec("24"));
        brigade.setup()?;
        Ok(Kitchen {
            brigade,
            idgen: IdGen::new(),
        })
    }

    fn line(&self, reference: IngredientRef, quantity: &str) -> RecipeIngredient {
        RecipeIngredient::new(self.idgen.untyped(), reference, quantity)
    }
}

#[test]
fn a_new_dish_from_catalog_to_approval() -> Result<()> {
    let kitchen = Kitchen::open()?;
    let brigade = &kitchen.brigade;
    let org = brigade.create_organization("Bistro")?;
    let catalog = brigade.catalog()?;
    let book = brigade.recipes()?;

    let mut cream_flags = AllergenFlags::default();
    cream_flags.set(AllergenType::Milk, true);
    let cream = catalog.execute(AddIngredient {
        organization: org,
        product: "Double cream".into(),
        vendor: "Dairy Co".into(),
        case_size: "6 x 1L".into(),
        recipe_unit_type: "L".into(),
        pricing: Pricing {
            current_price: dec("18.00"),
            recipe_unit_per_purchase_unit: Some(dec("6")),
            yield_percent: Some(dec("0.9")),
        },
        allergens: cream_flags,
        ..AddIngredient::default()
    })?;
    let mut mushroom_flags = AllergenFlags::default();
    mushroom_flags.set(AllergenType::Mushroom, true);
    let mushrooms = catalog.execute(AddIngredient {
        organization: org,
        product: "Chestnut mushrooms".into(),
        recipe_unit_type: "kg".into(),
        pricing: Pricing {
            current_price: dec("12.00"),
            recipe_unit_per_purchase_unit: Some(dec("2.5")),
            yield_percent: Some(dec("0.8")),
        },
        allergens: mushroom_flags,
        ..AddIngredient::default()
    })?;
    let listed = catalog.query(ShowCatalog { organization: org })?;
    assert_eq!(listed.len(), 2);

    let sauce = book.execute(CreateRecipe {
        organization: org,
        name: "Mushroom cream".into(),
        recipe_type: RecipeType::Prepared,
        description: "Base for the pasta".into(),
        created_by: "chef".into(),
    })?;
    let sauce_cost = book.execute(EditIngredients {
        id: sauce,
        ingredients: vec![
            kitchen.line(IngredientRef::purchased(cream), "1/2"),
            kitchen.line(IngredientRef::purchased(mushrooms), "1 1/2"),
        ],
        recipe_unit_ratio: Some(dec("10")),
        edited_by: "chef".into(),
    })?;
    // cream 3.3333 x 0.5 + mushrooms 6.0 x 1.5
    assert_eq!(sauce_cost.cost.recipe_total, dec("10.6667"));
    assert_eq!(sauce_cost.cost.cost_per_unit, dec("1.0667"));

    let dish = book.execute(CreateRecipe {
        organization: org,
        name: "Tagliatelle ai funghi".into(),
        recipe_type: RecipeType::Final,
        description: String::new(),
        created_by: "chef".into(),
    })?;
    book.execute(EditIngredients {
        id: dish,
        ingredients: vec![kitchen.line(IngredientRef::sub_recipe(sauce), "2")],
        recipe_unit_ratio: None,
        edited_by: "chef".into(),
    })?;

    let expected = vec![Allergen::Known(AllergenType::Milk), Allergen::Known(AllergenType::Mushroom)];
    let review = book.query(SuggestAllergens { id: dish })?;
    assert_eq!(
        review.unconfirmed.into_iter().collect::<Vec<_>>(),
        expected,
        "the sauce's ingredients reach the dish before the sauce declares anything"
    );

    book.execute(ConfirmAllergens {
        id: sauce,
        allergens: book.query(SuggestAllergens { id: sauce })?.unconfirmed.into_iter().collect(),
        edited_by: "chef".into(),
    })?;
    let review = book.query(SuggestAllergens { id: dish })?;
    assert_eq!(review.unconfirmed.into_iter().collect::<Vec<_>>(), expected);

    book.execute(CreateVersion {
        id: dish,
        bump: Bump::Minor,
        author: "chef".into(),
        changes: vec!["First plating".into()],
    })?;
    for status in &[RecipeStatus::Review, RecipeStatus::Approved] {
        book.execute(ChangeStatus {
            id: dish,
            status: *status,
            actor: "head chef".into(),
            notes: String::new(),
        })?;
    }

    let dish = book.query(ShowRecipe { id: dish })?.expect("dish");
    assert_eq!(dish.status, RecipeStatus::Approved);
    assert_eq!(dish.cost_per_unit(), dec("2.1334"));
    assert_eq!(dish.versions().len(), 1);
    Ok(())
}

#[test]
fn the_weekly_schedule_finds_its_cooks() -> Result<()> {
    let kitchen = Kitchen::open()?;
    let brigade = &kitchen.brigade;
    let org = brigade.create_organization("Bistro")?;
    let roster = brigade.roster()?;
    for (first, last) in &[("Maria", "Gonzalez"), ("Tom", "Kowalski"), ("Deirdre", "O'Neill")] {
        roster.execute(AddTeamMember {
            organization: org,
            first_name: first.to_string(),
            last_name: last.to_string(),
            ..AddTeamMember::default()
        })?;
    }

    let result = roster.query(MatchSchedule {
        organization: org,
        employees: EMPLOYEES.clone(),
    })?;

    assert_eq!(result.matched.len(), 3);
    assert_eq!(result.matched["Tom K."].last_name, "Kowalski");
    assert_eq!(result.matched["Dee"].first_name, "Deirdre");
    assert_eq!(result.unmatched, vec!["Agency Temp".to_string()]);
    Ok(())
}
