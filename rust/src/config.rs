//! Application configuration
//!
//! Settings are read from the process environment (a `.env` file is honoured
//! through `dotenvy`). Parsing goes through a lookup closure so tests can feed
//! values without touching the real environment.

use chrono::FixedOffset;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

const TESTING_BASE_URL: &str = "https://testri.ssn.gob.ar/api";
const PRODUCTION_BASE_URL: &str = "https://ri.ssn.gob.ar/api";

const DEFAULT_MOCK_TOKEN: &str = "mock-ssn-token";
const DEFAULT_MOCK_EXPIRATION: &str = "31 dic 2099 23:59:59";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_UTC_OFFSET_HOURS: i32 = -3;
const DEFAULT_SERVER_PORT: u16 = 3000;

/// Regulator environment the application talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorityEnvironment {
    #[default]
    Testing,
    Production,
}

impl AuthorityEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            AuthorityEnvironment::Testing => TESTING_BASE_URL,
            AuthorityEnvironment::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl FromStr for AuthorityEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "testing" | "test" => Ok(AuthorityEnvironment::Testing),
            "production" | "prod" => Ok(AuthorityEnvironment::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for AuthorityEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorityEnvironment::Testing => write!(f, "testing"),
            AuthorityEnvironment::Production => write!(f, "production"),
        }
    }
}

/// Application-level regulator credentials.
///
/// These identify the insurer to the SSN and are unrelated to the staff
/// member who is logged in.
#[derive(Clone, Default)]
pub struct AuthorityCredentials {
    pub username: String,
    pub company_id: String,
    pub password: String,
}

impl fmt::Debug for AuthorityCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorityCredentials")
            .field("username", &self.username)
            .field("company_id", &self.company_id)
            .field("password", &"***")
            .finish()
    }
}

/// Everything the regulator integration needs
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub environment: AuthorityEnvironment,
    pub base_url: Url,
    pub auth_endpoint: String,
    pub monthly_endpoint: String,
    pub weekly_endpoint: String,
    pub mock_enabled: bool,
    pub mock_token: String,
    pub mock_expiration: String,
    pub credentials: AuthorityCredentials,
    pub timeout: Duration,
    /// Offset of the wall-clock timestamps the regulator returns
    pub utc_offset: FixedOffset,
}

impl AuthorityConfig {
    /// Absolute URL for an endpoint path relative to the base URL
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Mock configuration used by tests and local development
    pub fn mock() -> Self {
        Self {
            environment: AuthorityEnvironment::Testing,
            base_url: Url::parse(TESTING_BASE_URL).expect("testing base url is valid"),
            auth_endpoint: "login".to_string(),
            monthly_endpoint: "inv/entregaMensual".to_string(),
            weekly_endpoint: "inv/entregaSemanal".to_string(),
            mock_enabled: true,
            mock_token: DEFAULT_MOCK_TOKEN.to_string(),
            mock_expiration: DEFAULT_MOCK_EXPIRATION.to_string(),
            credentials: AuthorityCredentials {
                username: "mock".to_string(),
                company_id: "0000".to_string(),
                password: String::new(),
            },
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            utc_offset: argentina_offset(),
        }
    }

    fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("SSN_ENVIRONMENT") {
            Some(value) => value.parse()?,
            None => AuthorityEnvironment::default(),
        };

        let raw_base = lookup("SSN_BASE_URL").unwrap_or_else(|| environment.base_url().to_string());
        let base_url = Url::parse(&raw_base).map_err(|e| ConfigError::InvalidUrl {
            url: raw_base.clone(),
            reason: e.to_string(),
        })?;

        let mock_enabled = match lookup("SSN_MOCK_ENABLED") {
            Some(value) => parse_bool("SSN_MOCK_ENABLED", &value)?,
            None => false,
        };

        let credentials = AuthorityCredentials {
            username: required_unless(lookup, "SSN_USERNAME", mock_enabled)?,
            company_id: required_unless(lookup, "SSN_COMPANY_ID", mock_enabled)?,
            password: required_unless(lookup, "SSN_PASSWORD", mock_enabled)?,
        };

        let timeout_secs = match lookup("SSN_TIMEOUT_SECS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: "SSN_TIMEOUT_SECS",
                    value,
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let utc_offset = match lookup("SSN_UTC_OFFSET_HOURS") {
            Some(value) => value
                .trim()
                .parse::<i32>()
                .ok()
                .and_then(|hours| FixedOffset::east_opt(hours * 3600))
                .ok_or(ConfigError::InvalidValue {
                    key: "SSN_UTC_OFFSET_HOURS",
                    value,
                })?,
            None => argentina_offset(),
        };

        Ok(Self {
            environment,
            base_url,
            auth_endpoint: lookup("SSN_AUTH_ENDPOINT").unwrap_or_else(|| "login".to_string()),
            monthly_endpoint: lookup("SSN_MONTHLY_ENDPOINT")
                .unwrap_or_else(|| "inv/entregaMensual".to_string()),
            weekly_endpoint: lookup("SSN_WEEKLY_ENDPOINT")
                .unwrap_or_else(|| "inv/entregaSemanal".to_string()),
            mock_enabled,
            mock_token: lookup("SSN_MOCK_TOKEN").unwrap_or_else(|| DEFAULT_MOCK_TOKEN.to_string()),
            mock_expiration: lookup("SSN_MOCK_EXPIRATION")
                .unwrap_or_else(|| DEFAULT_MOCK_EXPIRATION.to_string()),
            credentials,
            timeout: Duration::from_secs(timeout_secs),
            utc_offset,
        })
    }
}

/// A staff account for the static credential verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub username: String,
    /// Lowercase hex SHA-256 of the password
    pub password_sha256: String,
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub authority: AuthorityConfig,
    pub database_url: Option<String>,
    pub server_port: u16,
    pub users: Vec<UserEntry>,
}

impl AppConfig {
    /// Load from the process environment, reading `.env` first when present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let authority = AuthorityConfig::from_lookup(&lookup)?;

        let server_port = match lookup("SERVER_PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|port| *port > 0)
                .ok_or(ConfigError::InvalidValue {
                    key: "SERVER_PORT",
                    value,
                })?,
            None => DEFAULT_SERVER_PORT,
        };

        let users = match lookup("APP_USERS") {
            Some(value) => parse_users(&value)?,
            None => Vec::new(),
        };

        Ok(Self {
            authority,
            database_url: lookup("DATABASE_URL"),
            server_port,
            users,
        })
    }
}

fn argentina_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600).expect("-03:00 is a valid offset")
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

fn required_unless<F>(lookup: &F, key: &'static str, optional: bool) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => Ok(value),
        None if optional => Ok(String::new()),
        None => Err(ConfigError::Missing(key)),
    }
}

/// Parse `user:sha256hex` pairs separated by commas
fn parse_users(value: &str) -> Result<Vec<UserEntry>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (username, digest) = entry.split_once(':').ok_or(ConfigError::InvalidValue {
                key: "APP_USERS",
                value: entry.to_string(),
            })?;
            let digest = digest.trim().to_lowercase();
            if username.trim().is_empty()
                || digest.len() != 64
                || !digest.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(ConfigError::InvalidValue {
                    key: "APP_USERS",
                    value: entry.to_string(),
                });
            }
            Ok(UserEntry {
                username: username.trim().to_string(),
                password_sha256: digest,
            })
        })
        .collect()
}
