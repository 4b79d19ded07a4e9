//! Upload-then-persist coordination.
//!
//! A file is written to the object store first; only once the write has
//! completed and a download reference has been resolved is the post record
//! created or merged. A failed write never touches the document store.

use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::models::{FieldMap, Post, PostId, UploadDescriptor, CONTENT_FIELD, DOWNLOAD_URL_FIELD};
use crate::repo::{PostRepo, RepoError};
use crate::storage::{ObjectStore, ObjectStoreError, WriteOptions};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file uploaded")]
    NoFile,
    #[error("object store write failed: {0}")]
    StorageWrite(#[from] ObjectStoreError),
    #[error("record write failed: {0}")]
    Record(#[from] RepoError),
}

#[derive(Clone)]
pub struct UploadCoordinator {
    repo: Arc<dyn PostRepo>,
    store: Arc<dyn ObjectStore>,
}

impl UploadCoordinator {
    pub fn new(repo: Arc<dyn PostRepo>, store: Arc<dyn ObjectStore>) -> Self {
        Self { repo, store }
    }

    /// Writes the file, then adds one record holding `fields` plus its `downloadURL`.
    pub async fn create_from_upload(&self, upload: UploadDescriptor, mut fields: FieldMap) -> Result<Post, UploadError> {
        if upload.is_empty() {
            return Err(UploadError::NoFile);
        }
        let reference = self.store_upload(&upload).await?;
        fields.insert(DOWNLOAD_URL_FIELD.into(), Value::String(reference));
        match self.repo.add_post(fields).await {
            Ok(post) => {
                info!("created post {} with object {}", post.id, upload.object_name);
                Ok(post)
            }
            Err(e) => {
                self.discard_orphan(&upload.object_name).await;
                Err(e.into())
            }
        }
    }

    /// Merges `content` and, when a file is given, a fresh `downloadURL` into an existing record.
    ///
    /// Without a file the previous `downloadURL` is left untouched. A `None` content
    /// leaves the stored content as is.
    pub async fn update_from_upload(
        &self,
        id: &PostId,
        upload: Option<UploadDescriptor>,
        new_content: Option<String>,
    ) -> Result<Post, UploadError> {
        let mut fields = FieldMap::new();
        if let Some(content) = new_content {
            fields.insert(CONTENT_FIELD.into(), Value::String(content));
        }
        let upload = upload.filter(|u| !u.is_empty());
        if let Some(upload) = &upload {
            let reference = self.store_upload(upload).await?;
            fields.insert(DOWNLOAD_URL_FIELD.into(), Value::String(reference));
        }
        match self.repo.merge_post(id, fields).await {
            Ok(post) => {
                info!("updated post {id}");
                Ok(post)
            }
            Err(e) => {
                if let Some(upload) = &upload {
                    self.discard_orphan(&upload.object_name).await;
                }
                Err(e.into())
            }
        }
    }

    async fn store_upload(&self, upload: &UploadDescriptor) -> Result<String, ObjectStoreError> {
        let opts = WriteOptions::for_upload(&upload.mime);
        debug!("streaming {} bytes to {}", upload.bytes.len(), upload.object_name);
        if let Err(e) = self.store.put(&upload.object_name, &upload.bytes, &opts).await {
            error!("error uploading {} to object store: {e}", upload.object_name);
            return Err(e);
        }
        self.store.download_url(&upload.object_name).await.map_err(|e| {
            error!("cannot resolve download url for {}: {e}", upload.object_name);
            e
        })
    }

    // Best effort; a failure here leaves an unreferenced object behind.
    async fn discard_orphan(&self, object_name: &str) {
        match self.store.delete(object_name).await {
            Ok(()) => warn!("record write failed; removed object {object_name}"),
            Err(e) => warn!("record write failed; object {object_name} left orphaned: {e}"),
        }
    }
}
