use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

use crate::error::ConfigError;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BUCKET_NAME")]
    pub bucket_name: String,

    #[envconfig(from = "WAIT_INTERVAL_SECS", default = "60")]
    pub wait_interval_secs: u64,

    #[envconfig(from = "LOKI_URL")]
    pub loki_url: String,

    #[envconfig(from = "LOKI_USER", default = "")]
    pub loki_user: String,

    // Only ever read from the environment
    #[envconfig(from = "LOKI_PASSWORD")]
    pub loki_password: Option<String>,

    #[envconfig(from = "FORMAT", default = "raw")]
    pub format: OutputFormat,

    #[envconfig(from = "PARSER", default = "scan")]
    pub parser: ParserStrategy,

    // When set, a single unparseable line fails the whole object instead of being skipped
    #[envconfig(from = "STRICT_PARSING", default = "false")]
    pub strict_parsing: bool,

    #[envconfig(from = "LABELS", default = "")]
    pub labels: StaticLabels, // "<key>=<value>,<key>=<value>..."

    #[envconfig(from = "ROLE_ARNS", default = "")]
    pub role_arns: RoleMap, // "<arn>,<arn>..."

    #[envconfig(from = "WORKERS", default = "4")]
    pub workers: usize,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, anyhow::Error> {
        let config = Self::init_from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(())
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.wait_interval_secs)
    }

    /// Ten slots per worker keeps discovery ahead of the pool without listing too far ahead.
    pub fn queue_capacity(&self) -> usize {
        self.workers * 10
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Raw,
    Logfmt,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "logfmt" => Ok(OutputFormat::Logfmt),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::InvalidFormat(s.to_owned())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Raw => write!(f, "raw"),
            OutputFormat::Logfmt => write!(f, "logfmt"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserStrategy {
    #[default]
    Scan,
    Pattern,
}

impl FromStr for ParserStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scan" => Ok(ParserStrategy::Scan),
            "pattern" => Ok(ParserStrategy::Pattern),
            _ => Err(ConfigError::InvalidParser(s.to_owned())),
        }
    }
}

/// Operator supplied labels added to every stream. They win over the labels derived from tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticLabels(pub BTreeMap<String, String>);

impl FromStr for StaticLabels {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut labels = BTreeMap::new();
        for label in s.split(',').map(str::trim).filter(|l| !l.is_empty()) {
            let Some((key, value)) = label.split_once('=') else {
                return Err(ConfigError::InvalidLabel(label.to_owned()));
            };
            if key.is_empty() || value.is_empty() {
                return Err(ConfigError::InvalidLabel(label.to_owned()));
            }
            labels.insert(key.to_owned(), value.to_owned());
        }
        Ok(StaticLabels(labels))
    }
}

/// Account id -> ARN of the role to assume when looking up load balancers owned by that account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMap(pub HashMap<String, String>);

impl RoleMap {
    pub fn get(&self, account_id: &str) -> Option<&str> {
        self.0.get(account_id).map(String::as_str)
    }
}

impl FromStr for RoleMap {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut roles = HashMap::new();
        for arn in s.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            // arn:aws:iam::123456789012:role/name
            let parts: Vec<&str> = arn.split(':').collect();
            if parts.len() != 6 || parts[4].is_empty() {
                return Err(ConfigError::InvalidRoleArn(arn.to_owned()));
            }
            roles.insert(parts[4].to_owned(), arn.to_owned());
        }
        Ok(RoleMap(roles))
    }
}
