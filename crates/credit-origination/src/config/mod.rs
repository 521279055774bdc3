use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::workflows::origination::{BureauTimeouts, PurchasePolicy, UnderwritingConfig};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub origination: OriginationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            origination: OriginationConfig::from_env()?,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Bureau deadlines, underwriting thresholds and purchase bounds.
#[derive(Debug, Clone)]
pub struct OriginationConfig {
    pub bureau_timeouts: BureauTimeouts,
    pub underwriting: UnderwritingConfig,
    pub purchases: PurchasePolicy,
    /// Age after which a pending initial application is expired.
    pub application_expiry: chrono::Duration,
}

impl Default for OriginationConfig {
    fn default() -> Self {
        Self {
            bureau_timeouts: BureauTimeouts::default(),
            underwriting: UnderwritingConfig::default(),
            purchases: PurchasePolicy::default(),
            application_expiry: chrono::Duration::days(30),
        }
    }
}

impl OriginationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bureau_timeouts = BureauTimeouts {
            profile: Duration::from_millis(number(
                "BUREAU_A_TIMEOUT_MS",
                defaults.bureau_timeouts.profile.as_millis() as u64,
            )?),
            situation: Duration::from_millis(number(
                "BUREAU_B_TIMEOUT_MS",
                defaults.bureau_timeouts.situation.as_millis() as u64,
            )?),
        };

        let base = defaults.underwriting;
        let underwriting = UnderwritingConfig {
            approved_situations: list("UNDERWRITING_APPROVED_SITUATIONS", base.approved_situations),
            rejected_situations: list("UNDERWRITING_REJECTED_SITUATIONS", base.rejected_situations),
            max_situation2_entities: number(
                "UNDERWRITING_MAX_SITUATION2_ENTITIES",
                base.max_situation2_entities,
            )?,
            max_debt_entities: number("UNDERWRITING_MAX_DEBT_ENTITIES", base.max_debt_entities)?,
            minimum_score: optional_number("UNDERWRITING_MINIMUM_SCORE", base.minimum_score)?,
            min_valid_references: number(
                "UNDERWRITING_MIN_VALID_REFERENCES",
                base.min_valid_references,
            )?,
            max_valid_references: number(
                "UNDERWRITING_MAX_VALID_REFERENCES",
                base.max_valid_references,
            )?,
            exclude_self_employed: flag(
                "UNDERWRITING_EXCLUDE_SELF_EMPLOYED",
                base.exclude_self_employed,
            )?,
            exclude_retired: flag("UNDERWRITING_EXCLUDE_RETIRED", base.exclude_retired)?,
        };

        let policy = defaults.purchases;
        let purchases = PurchasePolicy {
            min_installments: number("PURCHASE_MIN_INSTALLMENTS", policy.min_installments)?,
            max_installments: number("PURCHASE_MAX_INSTALLMENTS", policy.max_installments)?,
            min_reason_len: number("PURCHASE_MIN_REASON_LEN", policy.min_reason_len)?,
        };
        if purchases.min_installments > purchases.max_installments {
            return Err(ConfigError::InstallmentRange {
                min: purchases.min_installments,
                max: purchases.max_installments,
            });
        }

        let expiry_days: u32 = number("APPLICATION_EXPIRY_DAYS", 30)?;

        Ok(Self {
            bureau_timeouts,
            underwriting,
            purchases,
            application_expiry: chrono::Duration::days(i64::from(expiry_days)),
        })
    }
}

fn number<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        _ => Ok(default),
    }
}

/// `none` or `off` disables the threshold.
fn optional_number<T: FromStr>(
    key: &'static str,
    default: Option<T>,
) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) if matches!(raw.trim().to_ascii_lowercase().as_str(), "none" | "off") => Ok(None),
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        _ => Ok(default),
    }
}

fn flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

fn list(key: &'static str, default: Vec<String>) -> Vec<String> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect(),
        _ => default,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber { key: &'static str, value: String },
    InvalidFlag { key: &'static str, value: String },
    InstallmentRange { min: u8, max: u8 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative number, got '{value}'")
            }
            ConfigError::InvalidFlag { key, value } => {
                write!(f, "{key} must be true or false, got '{value}'")
            }
            ConfigError::InstallmentRange { min, max } => write!(
                f,
                "PURCHASE_MIN_INSTALLMENTS ({min}) exceeds PURCHASE_MAX_INSTALLMENTS ({max})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    const KEYS: &[&str] = &[
        "APP_ENV",
        "APP_LOG_LEVEL",
        "BUREAU_A_TIMEOUT_MS",
        "BUREAU_B_TIMEOUT_MS",
        "APPLICATION_EXPIRY_DAYS",
        "UNDERWRITING_APPROVED_SITUATIONS",
        "UNDERWRITING_REJECTED_SITUATIONS",
        "UNDERWRITING_MAX_SITUATION2_ENTITIES",
        "UNDERWRITING_MAX_DEBT_ENTITIES",
        "UNDERWRITING_MINIMUM_SCORE",
        "UNDERWRITING_MIN_VALID_REFERENCES",
        "UNDERWRITING_MAX_VALID_REFERENCES",
        "UNDERWRITING_EXCLUDE_SELF_EMPLOYED",
        "UNDERWRITING_EXCLUDE_RETIRED",
        "PURCHASE_MIN_INSTALLMENTS",
        "PURCHASE_MAX_INSTALLMENTS",
        "PURCHASE_MIN_REASON_LEN",
    ];

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(
            config.origination.bureau_timeouts.profile,
            Duration::from_secs(10)
        );
        assert_eq!(config.origination.purchases, PurchasePolicy::default());
        assert_eq!(config.origination.underwriting.max_valid_references, 2);
        assert_eq!(
            config.origination.application_expiry,
            chrono::Duration::days(30)
        );
    }

    #[test]
    fn reads_thresholds_and_timeouts_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        env::set_var("BUREAU_B_TIMEOUT_MS", "2500");
        env::set_var("UNDERWRITING_MINIMUM_SCORE", "none");
        env::set_var("UNDERWRITING_MAX_DEBT_ENTITIES", "4");
        env::set_var("UNDERWRITING_EXCLUDE_RETIRED", "yes");
        env::set_var("UNDERWRITING_REJECTED_SITUATIONS", "rechazado, moroso");
        env::set_var("APPLICATION_EXPIRY_DAYS", "7");

        let config = AppConfig::load().expect("config loads");
        reset_env();

        let origination = config.origination;
        assert_eq!(config.environment, AppEnvironment::Production);
        assert_eq!(
            origination.bureau_timeouts.situation,
            Duration::from_millis(2500)
        );
        assert_eq!(origination.underwriting.minimum_score, None);
        assert_eq!(origination.underwriting.max_debt_entities, 4);
        assert!(origination.underwriting.exclude_retired);
        assert_eq!(
            origination.underwriting.rejected_situations,
            vec!["rechazado".to_string(), "moroso".to_string()]
        );
        assert_eq!(origination.application_expiry, chrono::Duration::days(7));
    }

    #[test]
    fn rejects_malformed_numbers_and_ranges() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("BUREAU_A_TIMEOUT_MS", "soon");
        let error = AppConfig::load().expect_err("timeout must be numeric");
        assert!(matches!(
            error,
            ConfigError::InvalidNumber {
                key: "BUREAU_A_TIMEOUT_MS",
                ..
            }
        ));

        reset_env();
        env::set_var("PURCHASE_MIN_INSTALLMENTS", "12");
        env::set_var("PURCHASE_MAX_INSTALLMENTS", "6");
        let error = AppConfig::load().expect_err("inverted range rejected");
        reset_env();
        assert!(matches!(
            error,
            ConfigError::InstallmentRange { min: 12, max: 6 }
        ));
    }
}
