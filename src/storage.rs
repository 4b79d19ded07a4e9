use async_trait::async_trait;
use log::{error, info, warn};
use std::collections::HashMap;
use std::io::{Read, Write};
use thiserror::Error;

use crate::settings::StorageConfig;

/// Metadata key carrying the token that makes a download reference stable.
pub const DOWNLOAD_TOKEN_KEY: &str = "download-token";
pub const LONG_LIVED_CACHE: &str = "public, max-age=31536000";

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("not_found")]
    NotFound,
    #[error("write failed: {0}")]
    Write(String),
    #[error("other: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    pub content_type: String,
    pub cache_control: String,
    pub gzip: bool,
    pub metadata: HashMap<String, String>,
}

impl WriteOptions {
    /// Options used for post attachments: long-lived cache, gzip, fresh download token.
    pub fn for_upload(content_type: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(DOWNLOAD_TOKEN_KEY.to_string(), uuid::Uuid::new_v4().to_string());
        Self {
            content_type: content_type.to_string(),
            cache_control: LONG_LIVED_CACHE.to_string(),
            gzip: true,
            metadata,
        }
    }

    pub fn download_token(&self) -> Option<&str> {
        self.metadata.get(DOWNLOAD_TOKEN_KEY).map(String::as_str)
    }
}

/// A stored object as read back from the store, body already decoded.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub cache_control: Option<String>,
    pub download_token: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, name: &str, bytes: &[u8], opts: &WriteOptions) -> Result<(), ObjectStoreError>;
    async fn load(&self, name: &str) -> Result<StoredObject, ObjectStoreError>;
    async fn delete(&self, name: &str) -> Result<(), ObjectStoreError>;
    /// Resolves the public reference of a written object from its stored token.
    async fn download_url(&self, name: &str) -> Result<String, ObjectStoreError>;
}

/// `{base}/files/{name}?token={token}`, served back by the `/files/{name}` route.
pub fn download_reference(public_base_url: &str, name: &str, token: &str) -> String {
    format!(
        "{}/files/{}?token={}",
        public_base_url.trim_end_matches('/'),
        urlencoding::encode(name),
        urlencoding::encode(token)
    )
}

pub fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

pub fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

pub const GZIP_ENCODING: &str = "gzip";

/// Body as written to the store, plus the `Content-Encoding` to record with it.
pub fn encode_body(bytes: &[u8], opts: &WriteOptions) -> std::io::Result<(Vec<u8>, Option<&'static str>)> {
    if opts.gzip {
        Ok((gzip(bytes)?, Some(GZIP_ENCODING)))
    } else {
        Ok((bytes.to_vec(), None))
    }
}

/// Inverse of [`encode_body`] given the stored `Content-Encoding`.
pub fn decode_body(raw: &[u8], content_encoding: Option<&str>) -> std::io::Result<Vec<u8>> {
    match content_encoding {
        Some(GZIP_ENCODING) => gunzip(raw),
        _ => Ok(raw.to_vec()),
    }
}

// ---------------- S3 Implementation (MinIO compatible) ----------------
pub struct S3ObjectStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
    public_base_url: String,
}

impl S3ObjectStore {
    pub async fn new(cfg: &StorageConfig, public_base_url: &str) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()));
        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access), Some(secret)) = (&cfg.access_key_id, &cfg.secret_access_key) {
            let creds = Credentials::new(access, secret, None, None, "service-account");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing for MinIO/local endpoints without wildcard DNS
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(cfg.endpoint.is_some())
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("initialized object store client bucket={}", cfg.bucket);

        let bucket = cfg.bucket.clone();
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 5;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) if attempt >= max_attempts => {
                        error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                        return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                    }
                    Err(e2) => {
                        let backoff_ms = 200 * attempt.pow(2);
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    }
                }
            }
        }

        Ok(Self {
            bucket,
            client,
            prefix: "uploads".into(),
            public_base_url: public_base_url.to_string(),
        })
    }

    fn key_for(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, name: &str, bytes: &[u8], opts: &WriteOptions) -> Result<(), ObjectStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let key = self.key_for(name);
        let (body, encoding) = encode_body(bytes, opts).map_err(|e| ObjectStoreError::Write(e.to_string()))?;
        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(&opts.content_type)
            .cache_control(&opts.cache_control);
        if let Some(encoding) = encoding {
            put = put.content_encoding(encoding);
        }
        for (k, v) in &opts.metadata {
            put = put.metadata(k, v);
        }
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            let hint = if e.to_string().contains("NoSuchBucket") {
                " (bucket missing or not yet propagated)"
            } else if e.to_string().contains("AccessDenied") {
                " (check service-account access key permissions)"
            } else {
                ""
            };
            return Err(ObjectStoreError::Write(format!("{e}{hint}")));
        }
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<StoredObject, ObjectStoreError> {
        let key = self.key_for(name);
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|_| ObjectStoreError::NotFound)?;
        let encoding = obj.content_encoding().map(str::to_string);
        let content_type = obj.content_type().map(str::to_string);
        let cache_control = obj.cache_control().map(str::to_string);
        let download_token = obj
            .metadata()
            .and_then(|m| m.get(DOWNLOAD_TOKEN_KEY))
            .cloned();
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| ObjectStoreError::Other(e.to_string()))?;
        let raw = data.into_bytes();
        let bytes = decode_body(&raw, encoding.as_deref()).map_err(|e| ObjectStoreError::Other(e.to_string()))?;
        // ContentType may be missing on objects written by other tools; fall back to sniffing
        let content_type = content_type.unwrap_or_else(|| {
            infer::get(&bytes)
                .map(|t| t.mime_type().to_string())
                .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
        });
        Ok(StoredObject { bytes, content_type, cache_control, download_token })
    }

    async fn delete(&self, name: &str) -> Result<(), ObjectStoreError> {
        let key = self.key_for(name);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Other(e.to_string()))?;
        Ok(())
    }

    async fn download_url(&self, name: &str) -> Result<String, ObjectStoreError> {
        let key = self.key_for(name);
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|_| ObjectStoreError::NotFound)?;
        let token = head
            .metadata()
            .and_then(|m| m.get(DOWNLOAD_TOKEN_KEY))
            .ok_or_else(|| ObjectStoreError::Other(format!("object '{name}' has no download token")))?;
        Ok(download_reference(&self.public_base_url, name, token))
    }
}
