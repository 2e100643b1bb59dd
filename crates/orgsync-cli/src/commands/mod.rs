pub mod auth;
pub mod lists;
pub mod sync;

use std::path::PathBuf;

use orgsync_core::Config;

/// Load the config file (given or default) with environment overlays.
pub fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config)
}
