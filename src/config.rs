use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const CONFIG_FILENAME: &str = "padrelay_config.json";
const CONFIG_ENV: &str = "PADRELAY_CONFIG";
const LISTEN_ADDR_ENV: &str = "PADRELAY_LISTEN_ADDR";

/// How a new session picks its controller id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerIdPolicy {
    /// Every session gets the same id
    Fixed(u8),
    /// Lowest id not held by a live session
    LowestFree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// ViGEmBus on Windows, uinput on Linux
    Native,
    /// Log reports instead of driving a device
    #[serde(alias = "log")]
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    /// Upper bound on simultaneous controllers
    pub max_controllers: u8,
    pub controller_ids: ControllerIdPolicy,
    pub backend: BackendKind,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_controllers: 4,
            controller_ids: ControllerIdPolicy::LowestFree,
            backend: BackendKind::Native,
        }
    }
}

impl RelayConfig {
    /// Load from the config file, falling back to defaults, then apply env overrides
    pub fn load() -> Self {
        let mut config = Self::load_or_create(&Self::config_path());

        if let Ok(addr) = std::env::var(LISTEN_ADDR_ENV) {
            match addr.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => log::error!("Ignoring {}={:?}: {}", LISTEN_ADDR_ENV, addr, e),
            }
        }

        config
    }

    /// Load `path`, writing the defaults there first if no file exists yet.
    ///
    /// An unreadable or unparsable file is left alone and defaults are used.
    pub fn load_or_create(path: &Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                log::warn!("Failed to write default config to {:?}: {}", path, e);
            }
            return config;
        }
        Self::load_from(path).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {:?}", path);
                        return Some(config);
                    }
                    Err(e) => {
                        log::error!("Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    log::error!("Failed to read config file: {}", e);
                }
            }
        }
        None
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        log::info!("Saved config to {:?}", path);
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILENAME)
    }
}
