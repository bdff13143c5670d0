use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub photos: PhotoConfig,
    pub estimator: EstimatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Object storage addressing. When `endpoint` is set (local development,
/// MinIO-style) photo URLs point straight at it; otherwise retrieval URLs are
/// relative paths served by the fronting CDN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    pub endpoint: Option<String>,
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/brewlog.db".to_string()),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            photos: PhotoConfig {
                endpoint: env::var("PHOTOS_ENDPOINT").ok(),
                bucket: env::var("PHOTOS_BUCKET")
                    .unwrap_or_else(|_| "brewlog-photos".to_string()),
            },
            estimator: EstimatorConfig {
                api_key: env::var("OPENAI_API_KEY").ok(),
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
