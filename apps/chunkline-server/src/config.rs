//! Configuration management for the Chunkline server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Largest segment size a client may register (16MB)
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Lifetime of presigned retrieval URLs, in seconds
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL used when building retrieval links for locally stored objects
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    /// Root directory for chunk files and locally stored objects
    pub data_dir: PathBuf,
    pub s3: Option<S3Config>,
    pub url_expiry_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    Minio,
    R2,
    S3,
    B2,
}

impl StorageProvider {
    /// Whether assembled objects go to an S3-compatible bucket
    pub fn is_object_store(&self) -> bool {
        !matches!(self, StorageProvider::Local)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_segment_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                public_base_url: "http://localhost:3000".to_string(),
            },
            storage: StorageConfig {
                provider: StorageProvider::Local,
                data_dir: PathBuf::from("./data"),
                s3: None,
                url_expiry_secs: DEFAULT_URL_EXPIRY_SECS,
            },
            database: DatabaseConfig {
                url: "sqlite:./chunkline.db".to_string(),
            },
            upload: UploadConfig {
                max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let provider = match env::var("STORAGE_PROVIDER")
            .unwrap_or_else(|_| "local".to_string())
            .as_str()
        {
            "minio" => StorageProvider::Minio,
            "r2" => StorageProvider::R2,
            "s3" => StorageProvider::S3,
            "b2" => StorageProvider::B2,
            _ => StorageProvider::Local,
        };

        let s3 = if provider.is_object_store() {
            Some(S3Config {
                endpoint: env::var("S3_ENDPOINT")?,
                bucket: env::var("S3_BUCKET")?,
                access_key: env::var("S3_ACCESS_KEY")?,
                secret_key: env::var("S3_SECRET_KEY")?,
                region: env::var("S3_REGION").ok(),
            })
        } else {
            None
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
                public_base_url: env::var("PUBLIC_BASE_URL")
                    .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            },
            storage: StorageConfig {
                provider,
                data_dir: env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data")),
                s3,
                url_expiry_secs: env::var("URL_EXPIRY_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_URL_EXPIRY_SECS),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:./chunkline.db".to_string()),
            },
            upload: UploadConfig {
                max_segment_size: env::var("MAX_SEGMENT_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(DEFAULT_MAX_SEGMENT_SIZE),
            },
        })
    }

    /// Configuration rooted at a scratch directory, used by tests and local runs
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.into();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_local() {
        let config = Config::default();
        assert_eq!(config.storage.provider, StorageProvider::Local);
        assert!(config.storage.s3.is_none());
        assert_eq!(config.upload.max_segment_size, DEFAULT_MAX_SEGMENT_SIZE);
    }

    #[test]
    fn test_object_store_providers() {
        assert!(!StorageProvider::Local.is_object_store());
        assert!(StorageProvider::Minio.is_object_store());
        assert!(StorageProvider::S3.is_object_store());
    }

    #[test]
    fn test_object_store_without_credentials_is_an_error() {
        // No other test in this crate touches these variables
        env::set_var("STORAGE_PROVIDER", "minio");
        env::remove_var("S3_ENDPOINT");
        let result = Config::from_env();
        env::remove_var("STORAGE_PROVIDER");

        assert!(matches!(result, Err(env::VarError::NotPresent)));
    }
}
