use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Bridge runtime configuration. Loaded from an optional
/// `.unityctl/bridge.toml` under the project root, then overridden by
/// `UNITYCTL_*` env vars. All timeouts are in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Listen port; 0 means OS-assigned. The live port is published in the
    /// descriptor either way.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub timeout_default: u64,
    #[serde(default = "default_timeout_refresh")]
    pub timeout_refresh: u64,
    #[serde(default = "default_timeout_test")]
    pub timeout_test: u64,
    #[serde(default = "default_timeout_build")]
    pub timeout_build: u64,
    #[serde(default = "default_reload_grace")]
    pub domain_reload_grace: u64,
}

fn default_port() -> u16 {
    0
}
fn default_timeout() -> u64 {
    30
}
fn default_timeout_refresh() -> u64 {
    120
}
fn default_timeout_test() -> u64 {
    600
}
fn default_timeout_build() -> u64 {
    600
}
fn default_reload_grace() -> u64 {
    60
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            timeout_default: default_timeout(),
            timeout_refresh: default_timeout_refresh(),
            timeout_test: default_timeout_test(),
            timeout_build: default_timeout_build(),
            domain_reload_grace: default_reload_grace(),
        }
    }
}

impl BridgeConfig {
    /// Load config for a project: TOML file first, env vars win.
    pub fn load(project_root: &Path) -> Self {
        let mut config = Self::load_from_file(project_root);
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    fn load_from_file(project_root: &Path) -> Self {
        let path = unityctl_protocol::unityctl_dir(project_root).join("bridge.toml");
        if let Ok(contents) = std::fs::read_to_string(&path) {
            match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}", path.display(), e);
                }
            }
        }
        Self::default()
    }

    /// Apply `UNITYCTL_*` overrides via a lookup function (injectable so
    /// tests don't mutate process env). Unparseable values are ignored
    /// with a warning.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(name: &str, raw: String) -> Option<T> {
            match raw.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring unparseable {}={}", name, raw);
                    None
                }
            }
        }

        macro_rules! env_override {
            ($field:ident, $name:expr) => {
                if let Some(parsed) = get($name).and_then(|raw| parse($name, raw)) {
                    self.$field = parsed;
                }
            };
        }

        env_override!(port, "UNITYCTL_PORT");
        env_override!(timeout_default, "UNITYCTL_TIMEOUT_DEFAULT");
        env_override!(timeout_refresh, "UNITYCTL_TIMEOUT_REFRESH");
        env_override!(timeout_test, "UNITYCTL_TIMEOUT_TEST");
        env_override!(timeout_build, "UNITYCTL_TIMEOUT_BUILD");
        env_override!(domain_reload_grace, "UNITYCTL_DOMAIN_RELOAD_GRACE");
    }

    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.domain_reload_grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = BridgeConfig::default();
        assert_eq!(config.port, 0);
        assert_eq!(config.timeout_default, 30);
        assert_eq!(config.timeout_refresh, 120);
        assert_eq!(config.timeout_test, 600);
        assert_eq!(config.timeout_build, 600);
        assert_eq!(config.domain_reload_grace, 60);
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
port = 52100
timeout_default = 10
timeout_refresh = 240
timeout_test = 900
timeout_build = 1200
domain_reload_grace = 30
"#;
        let config: BridgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port, 52100);
        assert_eq!(config.timeout_default, 10);
        assert_eq!(config.timeout_refresh, 240);
        assert_eq!(config.timeout_test, 900);
        assert_eq!(config.timeout_build, 1200);
        assert_eq!(config.domain_reload_grace, 30);
    }

    #[test]
    fn parse_partial_toml_uses_defaults() {
        let config: BridgeConfig = toml::from_str("timeout_default = 5").unwrap();
        assert_eq!(config.timeout_default, 5);
        assert_eq!(config.timeout_refresh, 120);
        assert_eq!(config.port, 0);
    }

    #[test]
    fn parse_empty_toml() {
        let config: BridgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.timeout_default, 30);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: BridgeConfig = toml::from_str("timeout_default = 5").unwrap();
        config.apply_env(|name| match name {
            "UNITYCTL_TIMEOUT_DEFAULT" => Some("2".to_string()),
            "UNITYCTL_DOMAIN_RELOAD_GRACE" => Some("15".to_string()),
            _ => None,
        });
        assert_eq!(config.timeout_default, 2);
        assert_eq!(config.domain_reload_grace, 15);
        // Untouched fields keep their file/default values
        assert_eq!(config.timeout_test, 600);
    }

    #[test]
    fn unparseable_env_value_is_ignored() {
        let mut config = BridgeConfig::default();
        config.apply_env(|name| match name {
            "UNITYCTL_TIMEOUT_DEFAULT" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(config.timeout_default, 30);
    }
}
