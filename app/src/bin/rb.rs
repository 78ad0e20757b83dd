use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::*;
use serde::Deserialize;
use structopt::StructOpt;

use brigade::catalog::ShowCatalog;
use brigade::organization::Organization;
use brigade::recipes::{Recipe, Recost, ShowRecipe, SuggestAllergens};
use brigade::schedule::{MatchSchedule, ScheduleEmployee};
use brigade::services::{Commandable, Queryable};
use infra::ids::Id;

#[derive(Debug, StructOpt)]
#[structopt(name = "rb", about = "Brigade kitchen CLI")]
struct Opt {
    /// Configuration file
    #[structopt(parse(from_os_str))]
    config: PathBuf,
    #[structopt(subcommand)]
    command: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "setup", about = "Create the document table")]
    Setup,
    #[structopt(name = "show-catalog", about = "List an organization's ingredients")]
    ShowCatalog { organization: Id<Organization> },
    #[structopt(name = "show-recipe", about = "Show a recipe with its costs")]
    ShowRecipe { recipe: Id<Recipe> },
    #[structopt(name = "recost", about = "Recompute a recipe's costs from current prices")]
    Recost { recipe: Id<Recipe> },
    #[structopt(
        name = "suggest-allergens",
        about = "Show what a recipe's ingredients suggest"
    )]
    SuggestAllergens { recipe: Id<Recipe> },
    #[structopt(
        name = "match-schedule",
        about = "Match names in a schedule file to team members"
    )]
    MatchSchedule {
        organization: Id<Organization>,
        #[structopt(parse(from_os_str))]
        schedule: PathBuf,
    },
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(flatten)]
    brigade: brigade::config::Config,
    #[serde(default)]
    env_logger: brigade::config::EnvLogger,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut config_buf = String::new();
    File::open(&opt.config)
        .and_then(|mut f| f.read_to_string(&mut config_buf))
        .with_context(|| format!("read {:?}", opt.config))?;
    let mut config: Config = toml::from_str(&config_buf).context("parse config")?;
    config.brigade.apply_env()?;

    config.env_logger.builder().init();
    debug!("Options: {:?}", opt);

    let rb = brigade::Brigade::postgres(&config.brigade)?;

    match opt.command {
        Commands::Setup => {
            rb.setup()?;
            info!("Schema ready");
        }
        Commands::ShowCatalog { organization } => {
            let items = rb.catalog()?.query(ShowCatalog { organization })?;
            for item in items {
                println!(
                    "{}\t{}\t{}\t{} per {}",
                    item.id(),
                    item.product,
                    item.vendor,
                    item.cost_per_recipe_unit(),
                    item.recipe_unit_type
                );
            }
        }
        Commands::ShowRecipe { recipe } => {
            let found = rb
                .recipes()?
                .query(ShowRecipe { id: recipe })?
                .ok_or_else(|| brigade::services::NotFound(recipe.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        Commands::Recost { recipe } => {
            let recosting = rb.recipes()?.execute(Recost { id: recipe })?;
            println!("{}", serde_json::to_string_pretty(&recosting)?);
        }
        Commands::SuggestAllergens { recipe } => {
            let review = rb.recipes()?.query(SuggestAllergens { id: recipe })?;
            println!("{}", serde_json::to_string_pretty(&review)?);
        }
        Commands::MatchSchedule {
            organization,
            schedule,
        } => {
            let file = File::open(&schedule).with_context(|| format!("open {:?}", schedule))?;
            let employees: Vec<ScheduleEmployee> =
                serde_json::from_reader(file).with_context(|| format!("parse {:?}", schedule))?;
            let matched = rb.roster()?.query(MatchSchedule {
                organization,
                employees,
            })?;
            for (name, member) in matched.matched.iter() {
                println!("{}\t{}\t{}", name, member.id(), member.full_name());
            }
            for name in matched.unmatched.iter() {
                println!("{}\t-", name);
            }
        }
    }

    Ok(())
}
