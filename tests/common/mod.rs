#![allow(dead_code)]

use postdeck::storage::{decode_body, download_reference, encode_body, ObjectStore, ObjectStoreError, StoredObject, WriteOptions};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const BASE_URL: &str = "http://test.local";

// ---------------- In-memory Mock ObjectStore (tests only) ----------------
#[derive(Default)]
pub struct MockObjectStore {
    // stored body as the S3 store would hold it, its encoding, and the write options
    inner: Mutex<HashMap<String, (Vec<u8>, Option<&'static str>, WriteOptions)>>,
    fail_writes: AtomicBool,
}

impl MockObjectStore {
    pub fn failing() -> Self {
        let s = Self::default();
        s.set_fail_writes(true);
        s
    }
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
    pub fn object_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
    pub fn options_of(&self, name: &str) -> Option<WriteOptions> {
        self.inner.lock().unwrap().get(name).map(|(_, _, o)| o.clone())
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockObjectStore {
    async fn put(&self, name: &str, bytes: &[u8], opts: &WriteOptions) -> Result<(), ObjectStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Write("injected failure".into()));
        }
        let (body, encoding) = encode_body(bytes, opts).map_err(|e| ObjectStoreError::Write(e.to_string()))?;
        self.inner.lock().unwrap().insert(name.to_string(), (body, encoding, opts.clone()));
        Ok(())
    }
    async fn load(&self, name: &str) -> Result<StoredObject, ObjectStoreError> {
        let map = self.inner.lock().unwrap();
        let (body, encoding, opts) = map.get(name).ok_or(ObjectStoreError::NotFound)?;
        Ok(StoredObject {
            bytes: decode_body(body, *encoding).map_err(|e| ObjectStoreError::Other(e.to_string()))?,
            content_type: opts.content_type.clone(),
            cache_control: Some(opts.cache_control.clone()),
            download_token: opts.download_token().map(str::to_string),
        })
    }
    async fn delete(&self, name: &str) -> Result<(), ObjectStoreError> {
        self.inner.lock().unwrap().remove(name);
        Ok(())
    }
    async fn download_url(&self, name: &str) -> Result<String, ObjectStoreError> {
        let map = self.inner.lock().unwrap();
        let (_, _, opts) = map.get(name).ok_or(ObjectStoreError::NotFound)?;
        let token = opts.download_token().ok_or_else(|| ObjectStoreError::Other("no token".into()))?;
        Ok(download_reference(BASE_URL, name, token))
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File { name: &'a str, filename: &'a str, content_type: &'a str, bytes: &'a [u8] },
}

// Helper to build a multipart body from text fields and files
pub fn build_multipart(parts: &[Part], boundary: &str) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    for part in parts {
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
                );
            }
            Part::File { name, filename, content_type, bytes } => {
                body.extend_from_slice(
                    format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

/// Path part of a download reference, e.g. `/files/123-cat.png?token=...`.
pub fn local_path(download_url: &str) -> &str {
    download_url.strip_prefix(BASE_URL).expect("reference under test base url")
}

/// Object name encoded in a download reference.
pub fn object_name(download_url: &str) -> String {
    let path = local_path(download_url);
    let encoded = path
        .trim_start_matches("/files/")
        .split('?')
        .next()
        .unwrap();
    urlencoding::decode(encoded).unwrap().into_owned()
}

// 10 bytes, PNG signature plus padding
pub fn cat_png() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00]
}
