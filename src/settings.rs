//! Runtime settings, layered from defaults, an optional `dynaquery.toml` and
//! `DYNAQUERY_*` environment variables (later layers win).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::Result;
use crate::persist::PersistenceMode;

/// Names the settings file when set; otherwise `dynaquery.toml` in the working directory is tried.
pub const CONFIG_PATH_VAR: &str = "DYNAQUERY_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// `":memory:"` or a path to a SQLite file.
    pub database: String,
    pub bind: String,
    pub log_level: String,
    /// Install the example customer fragments and rules on startup.
    pub seed: bool,
    pub preview_limit: u64,
    pub default_page_size: u64,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("database", ":memory:")?
        .set_default("bind", "127.0.0.1:8080")?
        .set_default("log_level", "info")?
        .set_default("seed", true)?
        .set_default("preview_limit", crate::preview::PREVIEW_LIMIT as i64)?
        .set_default("default_page_size", crate::customer::DEFAULT_PAGE_SIZE as i64)?)
}

impl Settings {
    pub fn load() -> Result<Self> {
        let file = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => File::with_name(&path).required(true),
            Err(_) => File::with_name("dynaquery").required(false),
        };
        let settings = defaults()?
            .add_source(file)
            .add_source(Environment::with_prefix("DYNAQUERY").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Defaults overlaid with the given TOML, ignoring files and the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Ok(defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }

    pub fn persistence_mode(&self) -> PersistenceMode {
        PersistenceMode::from_location(&self.database)
    }
}
