pub mod config_cmd;
pub mod doctor;
pub mod navigate_cmd;
pub mod run_cmd;

use std::path::PathBuf;
use tabcast_core::{Config, Paths, Result};

/// Load config from the override path or the default location.
pub fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load(&p),
        None => Config::load_or_default(&Paths::new()),
    }
}
