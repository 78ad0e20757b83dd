use anyhow::{Context, Result};
use chrono::Utc;
use log::*;
use r2d2::{self, Pool};
use rust_decimal::Decimal;

use infra::ids::{Id, IdGen};
use infra::persistence::Storage;

use crate::allergens::AllergenFlags;
use crate::organization::Organization;
use crate::services::{Commandable, NotFound, Queryable, Request};

mod models;

pub use self::models::{MasterIngredient, Pricing};

#[derive(Debug)]
pub struct Catalog<M: r2d2::ManageConnection> {
    db: Pool<M>,
    idgen: IdGen,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddIngredient {
    pub organization: Id<Organization>,
    pub product: String,
    pub vendor: String,
    pub item_code: String,
    pub category: String,
    pub case_size: String,
    pub units_per_case: Option<Decimal>,
    pub recipe_unit_type: String,
    pub pricing: Pricing,
    pub allergens: AllergenFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePricing {
    pub id: Id<MasterIngredient>,
    pub pricing: Pricing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAllergens {
    pub id: Id<MasterIngredient>,
    pub allergens: AllergenFlags,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoveIngredient {
    pub id: Id<MasterIngredient>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowCatalog {
    pub organization: Id<Organization>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowIngredient {
    pub id: Id<MasterIngredient>,
}

impl Request for AddIngredient {
    type Resp = Id<MasterIngredient>;
}

impl Request for UpdatePricing {
    type Resp = Decimal;
}

impl Request for UpdateAllergens {
    type Resp = ();
}

impl Request for RemoveIngredient {
    type Resp = ();
}

impl Request for ShowCatalog {
    type Resp = Vec<MasterIngredient>;
}

impl Request for ShowIngredient {
    type Resp = Option<MasterIngredient>;
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Catalog<M> {
    pub fn new(db: Pool<M>) -> Result<Self> {
        let idgen = IdGen::new();
        Ok(Catalog { db, idgen })
    }

    fn load_existing(&self, id: Id<MasterIngredient>) -> Result<MasterIngredient> {
        let item = self
            .db
            .get()?
            .load(&id)?
            .ok_or_else(|| NotFound(id.to_string()))?;
        Ok(item)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<AddIngredient> for Catalog<M>
{
    fn execute(&self, req: AddIngredient) -> Result<Id<MasterIngredient>> {
        let AddIngredient {
            organization,
            product,
            vendor,
            item_code,
            category,
            case_size,
            units_per_case,
            recipe_unit_type,
            pricing,
            allergens,
        } = req;

        let mut item =
            MasterIngredient::new(self.idgen.generate(), organization, &product, pricing);
        item.vendor = vendor;
        item.item_code = item_code;
        item.category = category;
        item.case_size = case_size;
        item.units_per_case = units_per_case;
        item.recipe_unit_type = recipe_unit_type;
        item.allergens = allergens;
        item.updated_at = Some(Utc::now());

        self.db
            .get()?
            .save(&mut item)
            .with_context(|| format!("add ingredient {:?}", product))?;
        info!(
            "Added {} {:?} at {} per {}",
            item.id(),
            item.product,
            item.cost_per_recipe_unit(),
            item.recipe_unit_type
        );
        Ok(item.id())
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdatePricing> for Catalog<M>
{
    fn execute(&self, req: UpdatePricing) -> Result<Decimal> {
        let UpdatePricing { id, pricing } = req;
        let mut item = self.load_existing(id)?;
        let before = item.cost_per_recipe_unit();
        let cost = item.reprice(pricing);
        item.updated_at = Some(Utc::now());

        self.db
            .get()?
            .save(&mut item)
            .with_context(|| format!("reprice {}", id))?;
        debug!("Repriced {}: {} -> {}", id, before, cost);
        Ok(cost)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateAllergens> for Catalog<M>
{
    fn execute(&self, req: UpdateAllergens) -> Result<()> {
        let UpdateAllergens { id, allergens } = req;
        let mut item = self.load_existing(id)?;
        item.allergens = allergens;
        item.updated_at = Some(Utc::now());

        self.db
            .get()?
            .save(&mut item)
            .with_context(|| format!("update allergens of {}", id))?;
        debug!("Allergens of {} now {:?}", id, item.allergens.active());
        Ok(())
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<RemoveIngredient> for Catalog<M>
{
    fn execute(&self, req: RemoveIngredient) -> Result<()> {
        let item = self.load_existing(req.id)?;
        self.db
            .get()?
            .delete(&item)
            .with_context(|| format!("remove {}", req.id))?;
        info!("Removed {} {:?}", req.id, item.product);
        Ok(())
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ShowCatalog> for Catalog<M>
{
    fn query(&self, req: ShowCatalog) -> Result<Vec<MasterIngredient>> {
        let mut items = self
            .db
            .get()?
            .list::<MasterIngredient>()?
            .into_iter()
            .filter(|i| i.organization == req.organization)
            .collect::<Vec<_>>();
        items.sort_by(|a, b| {
            a.product
                .to_lowercase()
                .cmp(&b.product.to_lowercase())
                .then(a.id().cmp(&b.id()))
        });
        Ok(items)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ShowIngredient> for Catalog<M>
{
    fn query(&self, req: ShowIngredient) -> Result<Option<MasterIngredient>> {
        let item = self.db.get()?.load(&req.id)?;
        Ok(item)
    }
}
