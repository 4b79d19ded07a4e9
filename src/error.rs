use actix_web::{HttpResponse, ResponseError};

use crate::repo::RepoError;
use crate::upload::UploadError;

/// Route-level errors. Bodies are plain text; there is no JSON envelope.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("No file uploaded.")] NoFile,
    #[error("Malformed form submission")] BadForm,
    #[error("File too large")] PayloadTooLarge,
    #[error("Error uploading file.")] StorageWrite,
    #[error("Post not found")] RecordNotFound,
    #[error("File not found")] FileNotFound,
    #[error("{0}")] StoreOperation(&'static str),
    #[error("Error rendering page")] Render,
}

impl AppError {
    /// Maps a repository failure, using `context` as the body for anything but a missing record.
    pub fn from_repo(e: RepoError, context: &'static str) -> Self {
        match e {
            RepoError::NotFound => AppError::RecordNotFound,
            RepoError::Internal(msg) => {
                log::error!("{context}: {msg}");
                AppError::StoreOperation(context)
            }
        }
    }

    pub fn from_upload(e: UploadError, context: &'static str) -> Self {
        match e {
            UploadError::NoFile => AppError::NoFile,
            UploadError::StorageWrite(e) => {
                log::error!("{context}: {e}");
                AppError::StorageWrite
            }
            UploadError::Record(e) => AppError::from_repo(e, context),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::NoFile | AppError::BadForm => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RecordNotFound | AppError::FileNotFound => StatusCode::NOT_FOUND,
            AppError::StorageWrite | AppError::StoreOperation(_) | AppError::Render => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type(mime::TEXT_PLAIN_UTF_8)
            .body(self.to_string())
    }
}
