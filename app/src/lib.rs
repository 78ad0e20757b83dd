use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;
use rust_decimal::Decimal;

use infra::ids::{Id, IdGen};
use infra::memory::{MemoryConnectionManager, MemoryStore};
use infra::persistence::{DocumentConnectionManager, Storage};

pub mod allergens;
pub mod catalog;
pub mod config;
pub mod costing;
pub mod kitchen;
pub mod lenient;
pub mod organization;
pub mod recipes;
pub mod schedule;
pub mod services;

#[cfg(test)]
mod test;

use crate::organization::Organization;

/// Entry point to the services, all sharing one connection pool.
#[derive(Debug)]
pub struct Brigade<M: r2d2::ManageConnection> {
    db: Pool<M>,
    labor_rate: Decimal,
}

impl Brigade<DocumentConnectionManager> {
    pub fn postgres(config: &config::Config) -> Result<Self> {
        let db = config.postgres.build()?;
        Ok(Brigade {
            db,
            labor_rate: config.costing.labor_rate_per_hour,
        })
    }
}

impl Brigade<MemoryConnectionManager> {
    /// A process-local store, mostly for tests and demonstrations.
    pub fn in_memory() -> Result<Self> {
        let manager = MemoryConnectionManager::new(MemoryStore::new());
        let db = r2d2::Pool::builder()
            .max_size(2)
            .build(manager)
            .context("build memory pool")?;
        Ok(Brigade {
            db,
            labor_rate: costing::default_labor_rate(),
        })
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Brigade<M> {
    pub fn from_pool(db: Pool<M>) -> Self {
        let labor_rate = costing::default_labor_rate();
        Brigade { db, labor_rate }
    }

    pub fn with_labor_rate(mut self, labor_rate: Decimal) -> Self {
        self.labor_rate = labor_rate;
        self
    }

    pub fn setup(&self) -> Result<()> {
        debug!("Init schema");
        self.db.get()?.setup().context("setup persistence")?;
        Ok(())
    }

    pub fn catalog(&self) -> Result<catalog::Catalog<M>> {
        catalog::Catalog::new(self.db.clone())
    }

    pub fn recipes(&self) -> Result<recipes::RecipeBook<M>> {
        recipes::RecipeBook::new(self.db.clone(), self.labor_rate)
    }

    pub fn roster(&self) -> Result<schedule::Roster<M>> {
        schedule::Roster::new(self.db.clone())
    }

    pub fn create_organization(&self, name: &str) -> Result<Id<Organization>> {
        let mut org = Organization::new(IdGen::new().generate(), name);
        self.db
            .get()?
            .save(&mut org)
            .with_context(|| format!("create organization {:?}", name))?;
        info!("Created organization {} {:?}", org.id(), org.name);
        Ok(org.id())
    }

    pub fn organizations(&self) -> Result<Vec<Organization>> {
        let mut orgs = self.db.get()?.list::<Organization>()?;
        orgs.sort_by(|a, b| a.name.cmp(&b.name).then(a.id().cmp(&b.id())));
        Ok(orgs)
    }

    pub fn organization(&self, id: Id<Organization>) -> Result<Option<Organization>> {
        let org = self.db.get()?.load(&id)?;
        Ok(org)
    }

    /// Opens a kitchen index on a pooled connection.
    pub fn kitchen(&self, organization: Id<Organization>) -> Result<kitchen::KitchenIndex> {
        let mut conn = self.db.get()?;
        kitchen::KitchenIndex::load(&mut *conn, organization)
    }
}
