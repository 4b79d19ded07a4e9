use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_BUCKET: &str = "postdeck-uploads";
pub const DEFAULT_UPLOAD_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

/// Credential file granting access to the document and object stores.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceAccount {
    pub database_url: Option<String>,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl ServiceAccount {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("cannot read service account '{}': {e}", path.display()))?;
        serde_json::from_slice(&raw)
            .map_err(|e| anyhow::anyhow!("invalid service account '{}': {e}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub public_base_url: String,
    pub database_url: Option<String>,
    pub storage: StorageConfig,
    pub upload_limit: usize,
}

impl AppConfig {
    /// Environment wins over the service-account file, which wins over defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let account_path = std::env::var("SERVICE_ACCOUNT_FILE")
            .unwrap_or_else(|_| "service-account.json".to_string());
        let account_path = Path::new(&account_path);
        let account = if account_path.exists() {
            ServiceAccount::from_file(account_path)?
        } else {
            log::warn!("service account '{}' not found; relying on environment", account_path.display());
            ServiceAccount::default()
        };
        Self::from_sources(|name| std::env::var(name).ok(), account)
    }

    pub fn from_sources<F>(env: F, account: ServiceAccount) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match env("PORT") {
            Some(p) => p.parse::<u16>().map_err(|e| anyhow::anyhow!("PORT '{p}' is not a valid port: {e}"))?,
            None => DEFAULT_PORT,
        };
        let upload_limit = match env("UPLOAD_LIMIT_BYTES") {
            Some(v) => v.parse::<usize>().map_err(|e| anyhow::anyhow!("UPLOAD_LIMIT_BYTES '{v}': {e}"))?,
            None => DEFAULT_UPLOAD_LIMIT,
        };
        let storage = StorageConfig {
            bucket: env("S3_BUCKET").or(account.bucket).unwrap_or_else(|| DEFAULT_BUCKET.into()),
            endpoint: env("S3_ENDPOINT").or(account.endpoint),
            region: env("S3_REGION").or(account.region).unwrap_or_else(|| "us-east-1".into()),
            access_key_id: env("S3_ACCESS_KEY").or(account.access_key_id),
            secret_access_key: env("S3_SECRET_KEY").or(account.secret_access_key),
        };
        Ok(Self {
            bind_addr: env("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            public_base_url: env("PUBLIC_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}")),
            database_url: env("DATABASE_URL").or(account.database_url),
            storage,
            upload_limit,
        })
    }
}
