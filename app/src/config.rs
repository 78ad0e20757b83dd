use std::collections::HashMap;

use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

use infra::persistence::DocumentConnectionManager;

use crate::costing;

const ENV_PREFIX: &str = "BRIGADE_";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub costing: CostingConfig,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PostgresConfig {
    pub url: Url,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CostingConfig {
    #[serde(default = "costing::default_labor_rate")]
    pub labor_rate_per_hour: Decimal,
}

/// Settings that may be overridden from `BRIGADE_`-prefixed environment
/// variables.
#[derive(Deserialize, Debug, Default, PartialEq)]
struct EnvOverrides {
    postgres_url: Option<Url>,
    labor_rate: Option<Decimal>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Deserialize, Debug, Default)]
pub struct EnvLogger {
    level: Option<LogLevel>,
    #[serde(default)]
    modules: HashMap<String, LogLevel>,
    #[serde(default)]
    timestamp_nanos: bool,
}

fn default_pool_size() -> u32 {
    4
}

impl Default for CostingConfig {
    fn default() -> Self {
        CostingConfig {
            labor_rate_per_hour: costing::default_labor_rate(),
        }
    }
}

impl Config {
    pub fn apply_env(&mut self) -> Result<()> {
        let overrides = envy::prefixed(ENV_PREFIX)
            .from_env::<EnvOverrides>()
            .context("read BRIGADE_ environment")?;
        self.apply(overrides);
        Ok(())
    }

    fn apply(&mut self, overrides: EnvOverrides) {
        if let Some(url) = overrides.postgres_url {
            debug!("Postgres url from environment");
            self.postgres.url = url;
        }
        if let Some(rate) = overrides.labor_rate {
            debug!("Labor rate from environment: {}", rate);
            self.costing.labor_rate_per_hour = rate;
        }
    }
}

impl PostgresConfig {
    pub(crate) fn build(&self) -> Result<Pool<DocumentConnectionManager>> {
        debug!("Build pool for {}:{:?}", self.url.host_str().unwrap_or(""), self.url.path());
        let pg_config = self
            .url
            .as_str()
            .parse::<postgres::Config>()
            .context("parse postgres url")?;
        let manager = DocumentConnectionManager::new(PostgresConnectionManager::new(
            pg_config,
            postgres::NoTls,
        ));

        let builder = r2d2::Pool::builder().max_size(self.pool_size);
        debug!("Pool builder: {:?}", builder);
        let pool = builder.build(manager).context("build pool")?;

        Ok(pool)
    }
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl EnvLogger {
    pub fn builder(&self) -> env_logger::Builder {
        let mut b = env_logger::Builder::from_default_env();
        if let Some(level) = self.level {
            b.filter_level(level.to_filter());
        }

        for (module, level) in self.modules.iter() {
            b.filter_module(module, level.to_filter());
        }

        if self.timestamp_nanos {
            b.format_timestamp_nanos();
        }

        b
    }
}
