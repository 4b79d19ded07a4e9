use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Caller-supplied record fields. No schema is enforced.
pub type FieldMap = Map<String, Value>;

/// Field holding the download reference of an attached file.
pub const DOWNLOAD_URL_FIELD: &str = "downloadURL";
/// Field overwritten by edits.
pub const CONTENT_FIELD: &str = "content";
/// Heading shown in the list.
pub const TITLE_FIELD: &str = "title";

/// Opaque, store-generated record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    pub fn generate() -> Self {
        PostId(uuid::Uuid::new_v4().simple().to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PostId {
    fn from(s: String) -> Self {
        PostId(s)
    }
}

impl From<&str> for PostId {
    fn from(s: &str) -> Self {
        PostId(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub data: FieldMap,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }
    pub fn download_url(&self) -> Option<&str> {
        self.field(DOWNLOAD_URL_FIELD)
    }
    pub fn content(&self) -> Option<&str> {
        self.field(CONTENT_FIELD)
    }
    pub fn title(&self) -> Option<&str> {
        self.field(TITLE_FIELD)
    }
}

/// One uploaded file, alive for the duration of a single object-store write.
#[derive(Debug, Clone)]
pub struct UploadDescriptor {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub original_name: String,
    pub object_name: String,
}

impl UploadDescriptor {
    /// Names the object `<millis>-<original name>`; collisions are not checked.
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>, original_name: impl Into<String>) -> Self {
        let original_name = original_name.into();
        let object_name = object_name_at(Utc::now(), &original_name);
        Self { bytes, mime: mime.into(), original_name, object_name }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub fn object_name_at(now: DateTime<Utc>, original_name: &str) -> String {
    format!("{}-{}", now.timestamp_millis(), original_name)
}
