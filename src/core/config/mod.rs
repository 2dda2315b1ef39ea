use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "slotserver.toml";
pub const CONFIG_PATH_ENV: &str = "SLOTSERVER_CONFIG";
pub const ENV_PREFIX: &str = "SLOTSERVER_";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduling: SchedulingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL; without one the server runs on the in-memory store.
    pub url: Option<String>,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 10,
        }
    }
}

/// Capacity defaults handed to the allocator and booking service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    pub default_max_leads_per_slot: u32,
    pub default_meeting_minutes: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_max_leads_per_slot: 4,
            default_meeting_minutes: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Booking originators whose attendees count. Empty means every source counts.
    pub authorized_booking_sources: Vec<String>,
    /// Team-wide lead target per day.
    pub team_daily_meta: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            authorized_booking_sources: Vec::new(),
            team_daily_meta: 18,
        }
    }
}

impl MetricsConfig {
    pub fn is_authorized_source(&self, source: Option<&str>) -> bool {
        if self.authorized_booking_sources.is_empty() {
            return true;
        }
        source.is_some_and(|s| {
            self.authorized_booking_sources
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(s.trim()))
        })
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `SLOTSERVER_*` variables, then `DATABASE_URL`.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(
                Env::raw()
                    .only(&["DATABASE_URL"])
                    .map(|_| "database.url".into()),
            )
    }

    pub fn from_path(path: &Path) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    pub fn from_env() -> Result<Self, figment::Error> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::from_path(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::from_path(Path::new("/nonexistent/slotserver.toml"))
            .expect("defaults should extract");
        assert_eq!(config.scheduling.default_max_leads_per_slot, 4);
        assert_eq!(config.metrics.team_daily_meta, 18);
        assert!(config.metrics.authorized_booking_sources.is_empty());
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[scheduling]\ndefault_max_leads_per_slot = 2\ndefault_meeting_minutes = 45\n\n\
             [metrics]\nauthorized_booking_sources = [\"sdr\", \"inbound\"]\nteam_daily_meta = 20"
        )
        .expect("write config");

        let config = AppConfig::figment(file.path())
            .extract::<AppConfig>()
            .expect("config should parse");
        assert_eq!(config.scheduling.default_max_leads_per_slot, 2);
        assert_eq!(config.scheduling.default_meeting_minutes, 45);
        assert_eq!(config.metrics.team_daily_meta, 20);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_authorized_source_filter() {
        let open = MetricsConfig::default();
        assert!(open.is_authorized_source(None));

        let restricted = MetricsConfig {
            authorized_booking_sources: vec!["SDR".to_string()],
            ..MetricsConfig::default()
        };
        assert!(restricted.is_authorized_source(Some("sdr")));
        assert!(!restricted.is_authorized_source(Some("partner-site")));
        assert!(!restricted.is_authorized_source(None));
    }
}
