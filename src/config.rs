use std::path::{Path, PathBuf};

use facet::Facet;

use crate::error::ProvisionError;

pub const DEFAULT_CONFIG_FILE: &str = "provision.toml";

/// Host-side settings. Everything has a sensible default, so the config
/// file is optional; CLI flags override whatever is loaded.
#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct Config {
    /// Connection URI for the virtualization daemon.
    #[facet(default = "qemu:///system".to_string())]
    pub libvirt_uri: String,
    /// Directory where cloned disk images are placed.
    #[facet(default = "/var/lib/libvirt/images".to_string())]
    pub storage_pool: String,
    /// Template image used by `provision clone` when `--base` is not given.
    pub base_image: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            libvirt_uri: "qemu:///system".into(),
            storage_pool: "/var/lib/libvirt/images".into(),
            base_image: None,
        }
    }
}

/// Load config from `explicit` if given (must exist), otherwise from
/// `provision.toml` in the working directory if present, otherwise
/// defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ProvisionError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !p.exists() {
                return Ok(Config::default());
            }
            p
        }
    };

    let raw = std::fs::read_to_string(&path).map_err(|e| ProvisionError::ConfigLoad {
        path: path.display().to_string(),
        source: e,
    })?;

    facet_toml::from_str(&raw).map_err(|e| ProvisionError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
