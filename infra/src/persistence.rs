use std::fmt;

use anyhow::{Context, Result};
use err_derive::Error;
use log::*;
use postgres::{Client, NoTls};
use r2d2_postgres::PostgresConnectionManager;
use serde::{de::DeserializeOwned, Serialize};

use crate::documents::{HasMeta, Version};
use crate::ids::{Entity, Id};

#[derive(Debug, PartialEq, Eq, Error)]
#[error(display = "stale version")]
pub struct ConcurrencyError;

/// Whole-document persistence. Documents of one `Entity` type form a table;
/// callers apply their own row filters to the result of `list`.
pub trait Storage {
    fn setup(&mut self) -> Result<()>;
    fn load<D: DeserializeOwned + Entity>(&mut self, id: &Id<D>) -> Result<Option<D>>;
    /// Inserts documents that have never been saved, and otherwise replaces
    /// the stored copy only if its version still matches. On success the
    /// document carries its new version.
    fn save<D: Serialize + HasMeta>(&mut self, document: &mut D) -> Result<()>;
    fn delete<D: HasMeta>(&mut self, document: &D) -> Result<()>;
    fn list<D: DeserializeOwned + Entity>(&mut self) -> Result<Vec<D>>;
}

pub struct Documents {
    client: Client,
}

pub struct DocumentConnectionManager {
    inner: PostgresConnectionManager<NoTls>,
}

const SETUP_SQL: &str = include_str!("persistence.sql");
const LOAD_SQL: &str = "SELECT body FROM documents WHERE id = $1";
const LIST_SQL: &str = "SELECT body FROM documents WHERE id ~ $1 ORDER BY id";
const DELETE_SQL: &str = "DELETE FROM documents WHERE id = $1 AND body ->> '_version' = $2";
const INSERT_SQL: &str = "WITH a as (
                            SELECT $1::jsonb as body
                            )
                            INSERT INTO documents (id, body)
                            SELECT a.body ->> '_id', jsonb_set(a.body, '{_version}', to_jsonb(to_hex(txid_current())))
                            FROM a
                            WHERE NOT EXISTS (
                                SELECT 1 FROM documents d where d.id = a.body ->> '_id'
                            )";
const UPDATE_SQL: &str = "WITH a as (
                            SELECT $1::jsonb as body
                            )
                            UPDATE documents AS d
                                SET body = jsonb_set(a.body, '{_version}', to_jsonb(to_hex(txid_current())))
                                FROM a
                                WHERE id = a.body ->> '_id'
                                AND d.body -> '_version' = a.body -> '_version'";

pub(crate) fn table_pattern<D: Entity>() -> String {
    format!("^{}-[0-9a-v]+$", D::PREFIX)
}

impl Documents {
    pub fn wrap(client: Client) -> Self {
        Documents { client }
    }

    pub fn get_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl Storage for Documents {
    fn setup(&mut self) -> Result<()> {
        self.client
            .batch_execute(SETUP_SQL)
            .context("create documents table")?;
        Ok(())
    }

    fn load<D: DeserializeOwned + Entity>(&mut self, id: &Id<D>) -> Result<Option<D>> {
        let row = self.client.query_opt(LOAD_SQL, &[&id.to_string()])?;

        if let Some(row) = row {
            let json: serde_json::Value = row.try_get(0)?;
            let doc = serde_json::from_value(json).with_context(|| format!("decode {}", id))?;
            Ok(Some(doc))
        } else {
            Ok(None)
        }
    }

    fn save<D: Serialize + HasMeta>(&mut self, document: &mut D) -> Result<()> {
        let json = serde_json::to_value(&*document)?;
        let sql = if document.meta().is_new() {
            INSERT_SQL
        } else {
            UPDATE_SQL
        };
        let mut t = self.client.transaction()?;
        let nrows = t.execute(sql, &[&json])?;
        debug!("Save of {} modified {} rows", document.meta().id, nrows);
        if nrows != 1 {
            warn!("Save impacted {} rows not 1", nrows);
            return Err(ConcurrencyError.into());
        }
        let row = t.query_one("SELECT to_hex(txid_current())", &[])?;
        let version: String = row.try_get(0)?;
        t.commit()?;
        document.meta_mut().version = Version::from(version);
        Ok(())
    }

    fn delete<D: HasMeta>(&mut self, document: &D) -> Result<()> {
        let meta = document.meta();
        let nrows = self
            .client
            .execute(DELETE_SQL, &[&meta.id.to_string(), &meta.version.as_str()])?;
        if nrows != 1 {
            warn!("Delete of {} impacted {} rows not 1", meta.id, nrows);
            return Err(ConcurrencyError.into());
        }
        Ok(())
    }

    fn list<D: DeserializeOwned + Entity>(&mut self) -> Result<Vec<D>> {
        let rows = self.client.query(LIST_SQL, &[&table_pattern::<D>()])?;
        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let json: serde_json::Value = row.try_get(0)?;
            docs.push(serde_json::from_value(json).with_context(|| format!("decode {}", D::PREFIX))?);
        }
        debug!("Listed {} {} documents", docs.len(), D::PREFIX);
        Ok(docs)
    }
}

impl DocumentConnectionManager {
    pub fn new(inner: PostgresConnectionManager<NoTls>) -> Self {
        DocumentConnectionManager { inner }
    }
}

impl r2d2::ManageConnection for DocumentConnectionManager {
    type Connection = Documents;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Documents, postgres::Error> {
        self.inner.connect().map(Documents::wrap)
    }

    fn is_valid(&self, conn: &mut Documents) -> Result<(), postgres::Error> {
        self.inner.is_valid(&mut conn.client)
    }

    fn has_broken(&self, conn: &mut Documents) -> bool {
        self.inner.has_broken(&mut conn.client)
    }
}

impl fmt::Debug for DocumentConnectionManager {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("DocumentConnectionManager").finish()
    }
}

impl fmt::Debug for Documents {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Documents")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}
