use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub api_rps: u32,
    pub answer_window_minutes: i64,
    pub notification_webhook_url: Option<String>,
    pub blob: BlobConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Only urls on this host are considered hosted images eligible for destroy.
    pub host: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env_or("SERVER_ADDRESS", "0.0.0.0:8080"),
            database_url: env::var("DATABASE_URL").ok(),
            jwt_secret: get_env("JWT_SECRET")?,
            api_rps: get_env_parse_or("API_RPS", 100)?,
            answer_window_minutes: get_env_parse_or("ANSWER_WINDOW_MINUTES", 120)?,
            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL").ok(),
            blob: BlobConfig {
                api_url: env::var("BLOB_API_URL").ok(),
                api_key: env::var("BLOB_API_KEY").ok(),
                api_secret: env::var("BLOB_API_SECRET").ok(),
                host: get_env_or("BLOB_HOST", "cloudinary.com"),
            },
            log_format: match get_env_or("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            },
        })
    }

    /// Defaults used by tests and local runs: in-memory storage, no collaborators.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            server_address: "127.0.0.1:0".to_string(),
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            api_rps: 1000,
            answer_window_minutes: 120,
            notification_webhook_url: None,
            blob: BlobConfig {
                api_url: None,
                api_key: None,
                api_secret: None,
                host: "cloudinary.com".to_string(),
            },
            log_format: LogFormat::Text,
        }
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
