use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use log::*;
use serde::{de::DeserializeOwned, Serialize};

use crate::documents::{HasMeta, Version};
use crate::ids::{Entity, Id};
use crate::persistence::{ConcurrencyError, Storage};

const VERSION_FIELD: &str = "_version";

/// An in-process document store with the same versioning rules as the
/// PostgreSQL one. Clones share the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shelf: Arc<Mutex<Shelf>>,
}

#[derive(Debug, Default)]
struct Shelf {
    docs: BTreeMap<String, serde_json::Value>,
    clock: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionManager {
    store: MemoryStore,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn shelf(&self) -> Result<MutexGuard<Shelf>> {
        self.shelf
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

fn belongs_to<D: Entity>(key: &str) -> bool {
    key.strip_prefix(D::PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
        .map(|rest| !rest.is_empty() && !rest.contains('-'))
        .unwrap_or(false)
}

impl Storage for MemoryStore {
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn load<D: DeserializeOwned + Entity>(&mut self, id: &Id<D>) -> Result<Option<D>> {
        let shelf = self.shelf()?;
        match shelf.docs.get(&id.to_string()) {
            Some(json) => {
                let doc = serde_json::from_value(json.clone())
                    .with_context(|| format!("decode {}", id))?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    fn save<D: Serialize + HasMeta>(&mut self, document: &mut D) -> Result<()> {
        let mut json = serde_json::to_value(&*document)?;
        let key = document.meta().id.to_string();
        let mut shelf = self.shelf()?;

        let current = shelf.docs.get(&key).map(|stored| &stored[VERSION_FIELD]);
        let expected = &json[VERSION_FIELD];
        let fresh = match current {
            None => document.meta().is_new(),
            Some(stored) => !document.meta().is_new() && stored == expected,
        };
        if !fresh {
            warn!("Rejecting save of {} at {:?}", key, expected);
            return Err(ConcurrencyError.into());
        }

        shelf.clock += 1;
        let version = format!("{:x}", shelf.clock);
        json[VERSION_FIELD] = serde_json::Value::String(version.clone());
        shelf.docs.insert(key, json);
        debug!("Saved {} at version {}", document.meta().id, version);

        document.meta_mut().version = Version::from(version);
        Ok(())
    }

    fn delete<D: HasMeta>(&mut self, document: &D) -> Result<()> {
        let meta = document.meta();
        let key = meta.id.to_string();
        let mut shelf = self.shelf()?;
        let matches = shelf
            .docs
            .get(&key)
            .map(|stored| stored[VERSION_FIELD].as_str() == Some(meta.version.as_str()))
            .unwrap_or(false);
        if !matches {
            warn!("Rejecting delete of {} at {:?}", key, meta.version);
            return Err(ConcurrencyError.into());
        }
        shelf.docs.remove(&key);
        Ok(())
    }

    fn list<D: DeserializeOwned + Entity>(&mut self) -> Result<Vec<D>> {
        let shelf = self.shelf()?;
        shelf
            .docs
            .iter()
            .filter(|(key, _)| belongs_to::<D>(key))
            .map(|(key, json)| {
                serde_json::from_value(json.clone()).with_context(|| format!("decode {}", key))
            })
            .collect()
    }
}

impl MemoryConnectionManager {
    pub fn new(store: MemoryStore) -> Self {
        MemoryConnectionManager { store }
    }
}

impl r2d2::ManageConnection for MemoryConnectionManager {
    type Connection = MemoryStore;
    type Error = Infallible;

    fn connect(&self) -> Result<MemoryStore, Infallible> {
        Ok(self.store.clone())
    }

    fn is_valid(&self, _conn: &mut MemoryStore) -> Result<(), Infallible> {
        Ok(())
    }

    fn has_broken(&self, _conn: &mut MemoryStore) -> bool {
        false
    }
}
