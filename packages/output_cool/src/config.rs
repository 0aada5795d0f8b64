use serde::{Deserialize, Serialize};
use session_mux::{MuxConfig, PreAttachPolicy};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Unified config (figment-deserialized from defaults / output-cool.toml / env vars)
// =============================================================================
//
//   output-cool.toml:  [server]
//                      port = 7000
//
//   env var:           OUTPUTCOOL_SERVER__PORT=7000   (double underscore = nesting)

pub const CONFIG_FILE_NAME: &str = "output-cool.toml";
pub const ENV_PREFIX: &str = "OUTPUTCOOL_";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub surface: SurfaceFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Session behaviour (lives under `[session]`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// `buffer` or `drop`: events arriving before the panel is up
    #[serde(default)]
    pub pre_attach: PreAttachPolicy,
}

/// Console panel tunables (lives under `[surface]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SurfaceFileConfig {
    #[serde(default = "default_title")]
    pub title: String,
    /// How long a panel takes to settle after each update
    #[serde(default)]
    pub settle_ms: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_padding")]
    pub padding: usize,
}

impl Default for SurfaceFileConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            settle_ms: 0,
            max_entries: default_max_entries(),
            padding: default_padding(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    6000
}
fn default_title() -> String {
    "New input source".to_string()
}
fn default_max_entries() -> usize {
    200
}
fn default_padding() -> usize {
    10
}

/// Default directory searched for `output-cool.toml`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("output-cool")
}

/// Build a figment that layers: defaults → output-cool.toml → OUTPUTCOOL_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `OUTPUTCOOL_SURFACE__SETTLE_MS=50`  →  `surface.settle_ms = 50`
pub fn load_config(config_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join(CONFIG_FILE_NAME)))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

/// Settings handed to each console panel.
#[derive(Clone, Debug)]
pub struct SurfaceSettings {
    pub title: String,
    pub settle: Duration,
    pub max_entries: usize,
    pub padding: usize,
}

impl SurfaceSettings {
    pub fn from_file(fc: &SurfaceFileConfig) -> Self {
        Self {
            title: fc.title.clone(),
            settle: Duration::from_millis(fc.settle_ms),
            // a panel always shows at least the newest entry
            max_entries: fc.max_entries.max(1),
            padding: fc.padding,
        }
    }
}

impl FileConfig {
    pub fn mux_config(&self) -> MuxConfig {
        MuxConfig {
            pre_attach: self.session.pre_attach,
        }
    }

    pub fn surface_settings(&self) -> SurfaceSettings {
        SurfaceSettings::from_file(&self.surface)
    }
}
