//! Configuration file resolution and loading
//!
//! Bootstrap configuration is a single TOML file. It is located in this
//! priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. `<user config dir>/<app>/config.toml`, if it exists
//! 4. None: the caller runs on built-in defaults
//!
//! A missing file is never fatal. It is logged and the defaults are used.
//! A file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Name of the configuration file inside the per-application config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Locate the configuration file for `app_name`
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: per-user config directory
    user_config_path(app_name).filter(|p| p.exists())
}

/// `<config dir>/<app_name>/config.toml` for the current platform
pub fn user_config_path(app_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(app_name).join(CONFIG_FILE_NAME))
}

/// Load a TOML file into `T`, falling back to `T::default()` when there is no file
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No configuration file found, using built-in defaults");
        return Ok(T::default());
    };

    match std::fs::read_to_string(path) {
        Ok(content) => {
            let parsed = toml::from_str::<T>(&content)?;
            info!("Loaded configuration from {}", path.display());
            Ok(parsed)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Configuration file {} not found, using built-in defaults",
                path.display()
            );
            Ok(T::default())
        }
        Err(e) => Err(Error::Io(e)),
    }
}
