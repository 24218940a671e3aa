use std::sync::OnceLock;
use tracing::debug;

/// Environment variable that switches array-function dispatch on or off.
pub const ARRAY_FUNCTION_ENV: &str = "FIELDWISE_ARRAY_FUNCTION";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// When false, public entry points call their implementation directly.
    pub array_function_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            array_function_enabled: true,
        }
    }
}

impl Config {
    /// `0`, `false` and `off` (case-insensitive) disable dispatch; any other
    /// value, or none at all, leaves it enabled.
    pub fn from_env_value(value: Option<&str>) -> Config {
        let disabled = value.map_or(false, |v| {
            matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "off")
        });

        Config {
            array_function_enabled: !disabled,
        }
    }

    pub fn from_env() -> Config {
        Config::from_env_value(std::env::var(ARRAY_FUNCTION_ENV).ok().as_deref())
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// The process-wide configuration, read from the environment on first use.
pub fn config() -> Config {
    *CONFIG.get_or_init(|| {
        let config = Config::from_env();
        debug!(?config, "loaded configuration");
        config
    })
}
