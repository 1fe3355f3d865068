use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::db::TransactionKind;
use crate::ledger::FeeSchedule;
use crate::reputation::ReputationPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub max_connection_pooling: u32,
    pub port: u16,
    pub log_file: String,
    pub default_currency: String,
    pub fees: FeeSchedule,
    pub reputation_policy: ReputationPolicy,
    pub review_edit_window_hours: i64,
}

impl Config {
    /// Reads the process environment, `.env` included.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| dotenv::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let rate: Decimal = parse("FEE_RATE", get("FEE_RATE", "0"))?;
        let minimum: Decimal = parse("FEE_MINIMUM", get("FEE_MINIMUM", "0"))?;
        if rate < Decimal::ZERO || minimum < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                name: "FEE_RATE",
                value: format!("{rate} / {minimum}"),
                reason: "fee rate and minimum must not be negative".to_string(),
            });
        }
        if minimum.normalize().scale() > 2 {
            return Err(ConfigError::Invalid {
                name: "FEE_MINIMUM",
                value: minimum.to_string(),
                reason: "must have at most two decimal places".to_string(),
            });
        }
        let kinds = parse_kinds(&get("FEE_KINDS", "withdrawal"))?;

        let review_edit_window_hours: i64 = parse("REVIEW_EDIT_WINDOW_HOURS", get("REVIEW_EDIT_WINDOW_HOURS", "24"))?;
        if review_edit_window_hours < 0 {
            return Err(ConfigError::Invalid {
                name: "REVIEW_EDIT_WINDOW_HOURS",
                value: review_edit_window_hours.to_string(),
                reason: "must not be negative".to_string(),
            });
        }

        Ok(Self {
            database_url,
            jwt_secret: get("JWT_SECRET", "your-jwt-secret"),
            max_connection_pooling: parse("MAX_CONNECTION_POOLING", get("MAX_CONNECTION_POOLING", "5"))?,
            port: parse("PORT", get("PORT", "3000"))?,
            log_file: get("LOG_FILE", "app.log"),
            default_currency: get("DEFAULT_CURRENCY", "CNY").trim().to_uppercase(),
            fees: FeeSchedule::new(rate, minimum, kinds),
            reputation_policy: parse("REPUTATION_POLICY", get("REPUTATION_POLICY", "A"))?,
            review_edit_window_hours,
        })
    }

    pub fn review_edit_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.review_edit_window_hours)
    }
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
        value,
    })
}

fn parse_kinds(value: &str) -> Result<Vec<TransactionKind>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .map(|kind| parse("FEE_KINDS", kind.to_string()))
        .collect()
}
