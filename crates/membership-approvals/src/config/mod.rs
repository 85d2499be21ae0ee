use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::workflows::approvals::{
    ApprovalSettings, AutoApprovalPolicy, EntityType, ReviewPolicy, ReviewerId,
};

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
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub approvals: ApprovalSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            approvals: load_approval_settings()?,
        })
    }
}

fn load_approval_settings() -> Result<ApprovalSettings, ConfigError> {
    let defaults = AutoApprovalPolicy::default();

    let enabled = env_flag("APPROVALS_AUTO_APPROVE", defaults.enabled)?;
    let require_gateway_confirmation = env_flag(
        "APPROVALS_AUTO_APPROVE_REQUIRE_GATEWAY",
        defaults.require_gateway_confirmation,
    )?;
    let allow_self_approval = env_flag("APPROVALS_ALLOW_SELF_APPROVAL", false)?;

    let max_amount = match env::var("APPROVALS_AUTO_APPROVE_MAX_AMOUNT") {
        Ok(raw) => Decimal::from_str(raw.trim())
            .ok()
            .filter(|amount| *amount >= Decimal::ZERO)
            .ok_or(ConfigError::InvalidAmount { value: raw })?,
        Err(_) => defaults.max_amount,
    };

    let system_reviewer = match env::var("APPROVALS_SYSTEM_REVIEWER_ID") {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(ReviewerId)
            .map_err(|_| ConfigError::InvalidReviewerId { value: raw })?,
        Err(_) => defaults.system_reviewer,
    };

    let entity_types = match env::var("APPROVALS_AUTO_APPROVE_ENTITY_TYPES") {
        Ok(raw) => parse_entity_types(&raw)?,
        Err(_) => defaults.entity_types,
    };

    Ok(ApprovalSettings {
        auto_approval: AutoApprovalPolicy {
            enabled,
            max_amount,
            require_gateway_confirmation,
            entity_types,
            system_reviewer,
        },
        review: ReviewPolicy {
            allow_self_approval,
        },
    })
}

fn env_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

fn parse_entity_types(raw: &str) -> Result<Vec<EntityType>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| match value.to_ascii_lowercase().as_str() {
            "application" => Ok(EntityType::Application),
            "renewal" => Ok(EntityType::Renewal),
            _ => Err(ConfigError::InvalidEntityType {
                value: value.to_string(),
            }),
        })
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidFlag { name: &'static str, value: String },
    InvalidAmount { value: String },
    InvalidReviewerId { value: String },
    InvalidEntityType { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidFlag { name, value } => {
                write!(f, "{name} must be true or false (got '{value}')")
            }
            ConfigError::InvalidAmount { value } => write!(
                f,
                "APPROVALS_AUTO_APPROVE_MAX_AMOUNT must be a non-negative decimal (got '{value}')"
            ),
            ConfigError::InvalidReviewerId { value } => write!(
                f,
                "APPROVALS_SYSTEM_REVIEWER_ID must be a valid u64 (got '{value}')"
            ),
            ConfigError::InvalidEntityType { value } => write!(
                f,
                "APPROVALS_AUTO_APPROVE_ENTITY_TYPES accepts application, renewal (got '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
