use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// S3-compatible bucket holding recipe images.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// Listen address of the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| lookup(key).with_context(|| format!("{} is not set", key));
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let minutes = |key: &str, default: i64| -> anyhow::Result<i64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a whole number of minutes", key)),
                None => Ok(default),
            }
        };

        let port = match lookup("APP_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("APP_PORT {:?} is not a port number", raw))?,
            None => 8080,
        };

        Ok(Self {
            server: ServerConfig {
                host: or("APP_HOST", "0.0.0.0"),
                port,
            },
            database_url: required("DATABASE_URL")?,
            jwt: JwtConfig {
                secret: required("JWT_SECRET")?,
                issuer: or("JWT_ISSUER", "recipebox"),
                audience: or("JWT_AUDIENCE", "recipebox-users"),
                ttl_minutes: minutes("JWT_TTL_MINUTES", 60)?,
                refresh_ttl_minutes: minutes("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14)?,
            },
            storage: StorageConfig {
                endpoint: or("MINIO_ENDPOINT", "http://localhost:9000"),
                bucket: or("MINIO_BUCKET", "recipebox"),
                access_key: required("MINIO_ACCESS_KEY")?,
                secret_key: required("MINIO_SECRET_KEY")?,
                region: or("MINIO_REGION", "us-east-1"),
            },
        })
    }
}
