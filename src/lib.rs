pub mod error;
pub mod method_override; // `_method` support for HTML forms
pub mod models;
pub mod repo;
pub mod routes;
pub mod settings;
pub mod storage;
pub mod upload;
pub mod views;

// Re-export commonly used items for tests / external users
pub use method_override::MethodOverride;
pub use routes::{config, AppState};
pub use upload::{UploadCoordinator, UploadError};
