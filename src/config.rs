use bigdecimal::BigDecimal;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
    pub discrepancy: DiscrepancyConfig,
    pub extraction: ExtractionConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
}

/// Scoring constants of the matcher. Defaults are the empirically tuned values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub identifier_exact_score: u32,
    pub identifier_partial_score: u32,
    pub brand_bonus: u32,
    pub multi_word_score: u32,
    pub single_word_short_score: u32,
    pub single_word_long_score: u32,
    pub short_name_token_limit: usize,
    pub min_token_len: usize,
    pub identifier_threshold: u32,
    pub name_threshold: u32,
    pub matched_threshold: u32,
    pub suggestion_cap: u32,
    pub max_suggestions: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            identifier_exact_score: 70,
            identifier_partial_score: 50,
            brand_bonus: 15,
            multi_word_score: 50,
            single_word_short_score: 40,
            single_word_long_score: 25,
            short_name_token_limit: 3,
            min_token_len: 3,
            identifier_threshold: 25,
            name_threshold: 35,
            matched_threshold: 50,
            suggestion_cap: 60,
            max_suggestions: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyConfig {
    /// Currency tolerance for declared vs computed totals, written as a decimal string ("1.00")
    pub total_tolerance: BigDecimal,
}

impl DiscrepancyConfig {
    pub fn tolerance(&self) -> &BigDecimal {
        &self.total_tolerance
    }
}

impl Default for DiscrepancyConfig {
    fn default() -> Self {
        Self {
            total_tolerance: BigDecimal::from(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub webhook_urls: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/quote_reconcile".to_string(),
                max_connections: 20,
                acquire_timeout_secs: 10,
                run_migrations: true,
            },
            matching: MatchingConfig::default(),
            discrepancy: DiscrepancyConfig::default(),
            extraction: ExtractionConfig {
                url: "http://127.0.0.1:8090/extract".to_string(),
                timeout_secs: 120,
            },
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置: defaults, then config/quote-reconcile.toml, then QUOTE_RECONCILE__* env,
    /// then the plain DATABASE_URL / SERVER_HOST / SERVER_PORT overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let port_override = std::env::var("SERVER_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .map(i64::from);

        Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/quote-reconcile").required(false))
            .add_source(
                Environment::with_prefix("QUOTE_RECONCILE")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("notifications.webhook_urls")
                    .try_parsing(true),
            )
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", port_override)?
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_defaults_are_tuned_constants() {
        let m = MatchingConfig::default();
        assert_eq!(m.identifier_exact_score, 70);
        assert_eq!(m.identifier_partial_score, 50);
        assert_eq!(m.identifier_threshold, 25);
        assert_eq!(m.name_threshold, 35);
        assert_eq!(m.max_suggestions, 5);
    }

    #[test]
    fn tolerance_is_one_currency_unit() {
        assert_eq!(DiscrepancyConfig::default().tolerance(), &BigDecimal::from(1));
    }

    #[test]
    fn tolerance_keeps_every_configured_digit() {
        let cfg: DiscrepancyConfig = Config::builder()
            .add_source(config::File::from_str(
                r#"total_tolerance = "0.005""#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.tolerance(), &"0.005".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn defaults_round_trip_through_config_builder() {
        let cfg: AppConfig = Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).unwrap())
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.matching, MatchingConfig::default());
        assert_eq!(cfg.discrepancy, DiscrepancyConfig::default());
        assert!(cfg.notifications.webhook_urls.is_empty());
    }
}
