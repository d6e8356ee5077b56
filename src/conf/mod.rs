//! Provides application configuration options.
//!
//! Configuration options can be parsed from config files in TOML format.

pub mod devices;
pub mod log;

use std::{collections::HashMap, env};

use config::{
    Config, ConfigError, Environment, File, FileFormat, Source, Value,
};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[doc(inline)]
pub use self::{devices::Devices, log::Log};

/// CLI argument that is responsible for holding application configuration
/// file path.
static APP_CONF_PATH_CMD_ARG_NAME: &str = "--conf";

/// Environment variable that is responsible for holding application
/// configuration file path.
static APP_CONF_PATH_ENV_VAR_NAME: &str = "MEDEA_SYNC_CONF";

/// Prefix of environment variables overriding configuration options.
static APP_CONF_ENV_PREFIX: &str = "MEDEA_SYNC";

/// Holds application config.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Conf {
    /// Logging settings.
    pub log: Log,

    /// Device discovery settings.
    pub devices: Devices,
}

impl Conf {
    /// Creates new [`Conf`] and applies values from the following sources
    /// (in the following order):
    /// - default values;
    /// - configuration file, the name of which is given as a command line
    ///   parameter or environment variable;
    /// - environment variables.
    ///
    /// # Errors
    ///
    /// Errors if parsing fails.
    pub fn parse() -> Result<Self, ConfigError> {
        let mut cfg = Config::new();

        cfg.merge(Self::default())?;

        if let Some(path) =
            get_conf_file_name(env::var(APP_CONF_PATH_ENV_VAR_NAME), env::args())
        {
            cfg.merge(File::with_name(&path))?;
        }

        cfg.merge(
            Environment::with_prefix(APP_CONF_ENV_PREFIX).separator("__"),
        )?;

        cfg.try_into()
    }
}

impl Source for Conf {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<HashMap<String, Value>, ConfigError> {
        let serialized = toml::to_string(self)
            .map_err(|e| ConfigError::Foreign(Box::new(e)))?;
        File::from_str(&serialized, FileFormat::Toml).collect()
    }
}

/// Returns the path to a configuration file, if it's set via CLI `args`
/// or environment variable.
fn get_conf_file_name<T>(
    env_var: Result<String, env::VarError>,
    args: T,
) -> Option<String>
where
    T: IntoIterator<Item = String>,
{
    // First, check CLI arguments as they have the highest priority.
    let mut args = args
        .into_iter()
        .skip_while(|arg| arg != APP_CONF_PATH_CMD_ARG_NAME);
    if args.next().is_some() {
        return args.next().filter(|path| !path.is_empty());
    }

    // Then check env var.
    env_var.ok().filter(|path| !path.is_empty())
}

/// Parses [`Conf`] with the given environment variables set, removing them
/// afterwards.
#[cfg(test)]
#[macro_export]
macro_rules! overrided_by_env_conf {
    ($($env:expr => $value:expr),+ $(,)?) => {{
        $(std::env::set_var($env, $value);)+
        let conf = $crate::conf::Conf::parse().unwrap();
        $(std::env::remove_var($env);)+
        conf
    }};
}
