//! Tool configuration
//!
//! Values come from the built-in defaults, then an optional TOML file, then
//! `UBOOTENV_*` environment variables, each layer overriding the one before.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Read when no `--config` is given and the file exists
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ubootenv.toml";

const ENV_PREFIX: &str = "UBOOTENV_";

/// The keys taken from `UBOOTENV_*` variables. Other variables with that prefix are ignored.
const ENV_KEYS: &[&str] = &["sysfs_root", "dev_root", "max_regions", "block_size"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the kernel lists MTD devices
    pub sysfs_root: PathBuf,
    /// Where the `mtdblockN` device nodes live
    pub dev_root: PathBuf,
    /// Only regions with an index below this are searched
    pub max_regions: u32,
    /// Size of the environment block and stride of the search
    pub block_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/mtd"),
            dev_root: PathBuf::from("/dev"),
            max_regions: 2,
            block_size: envstore::BLOCK_SIZE,
        }
    }
}

impl Config {
    /// Loads the layered configuration. An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file {} does not exist", path.display());
                }
                figment = figment.merge(Toml::file(path));
            }
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                figment = figment.merge(Toml::file(DEFAULT_CONFIG_PATH));
            }
            None => {}
        }

        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX).only(ENV_KEYS)))
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment.extract().context("invalid configuration")?;

        if config.block_size <= envstore::CRC_SIZE {
            bail!(
                "block_size {:#x} leaves no room for records",
                config.block_size
            );
        }

        tracing::debug!("Using {:?}", config);
        Ok(config)
    }
}
