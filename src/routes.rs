use std::collections::HashMap;
use std::sync::Arc;
use actix_web::{web, FromRequest, HttpMessage, HttpRequest, HttpResponse};
use actix_web::http::header;
use actix_multipart::Multipart;
use futures_util::TryStreamExt as _;
use serde_json::Value;

use crate::settings::DEFAULT_UPLOAD_LIMIT;
use crate::error::AppError;
use crate::models::*;
use crate::repo::PostRepo;
use crate::storage::{ObjectStore, ObjectStoreError};
use crate::upload::UploadCoordinator;
use crate::views::{ViewError, Views};

/// Multipart field carrying the attached file.
pub const FILE_FIELD: &str = "avatar";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/post", web::get().to(list_posts))
        .route("/posts/new", web::get().to(new_post_form))
        .route("/posts", web::post().to(create_post))
        .route("/posts/{id}/edit", web::get().to(edit_post_form))
        .service(
            web::resource("/posts/{id}")
                .route(web::patch().to(update_post))
                .route(web::delete().to(delete_post)),
        )
        // download references resolve here
        .route("/files/{name}", web::get().to(get_file));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn PostRepo>,
    pub store: Arc<dyn ObjectStore>,
    pub uploads: UploadCoordinator,
    pub views: Arc<Views>,
    pub upload_limit: usize,
}

impl AppState {
    pub fn new(repo: Arc<dyn PostRepo>, store: Arc<dyn ObjectStore>, views: Arc<Views>) -> Self {
        Self {
            uploads: UploadCoordinator::new(repo.clone(), store.clone()),
            repo,
            store,
            views,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
        }
    }

    pub fn with_upload_limit(mut self, limit: usize) -> Self {
        self.upload_limit = limit;
        self
    }
}

fn redirect_to_list() -> HttpResponse {
    HttpResponse::Found().insert_header((header::LOCATION, "/post")).finish()
}

fn html(rendered: Result<String, ViewError>) -> Result<HttpResponse, AppError> {
    match rendered {
        Ok(body) => Ok(HttpResponse::Ok().content_type(mime::TEXT_HTML_UTF_8).body(body)),
        Err(e) => {
            log::error!("render error: {e}");
            Err(AppError::Render)
        }
    }
}

pub async fn index() -> HttpResponse {
    redirect_to_list()
}

pub async fn list_posts(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let posts = data.repo.list_posts().await
        .map_err(|e| AppError::from_repo(e, "Error retrieving posts"))?;
    html(data.views.render_list(&posts))
}

pub async fn new_post_form(data: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    html(data.views.render_new())
}

pub async fn create_post(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Payload,
) -> Result<HttpResponse, AppError> {
    let form = read_post_form(&req, payload, data.upload_limit).await?;
    let upload = form.upload.ok_or(AppError::NoFile)?;
    data.uploads
        .create_from_upload(upload, form.fields)
        .await
        .map_err(|e| AppError::from_upload(e, "Error creating post"))?;
    Ok(redirect_to_list())
}

pub async fn edit_post_form(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, AppError> {
    let id = PostId(path.into_inner());
    let post = data.repo.get_post(&id).await
        .map_err(|e| AppError::from_repo(e, "Error fetching post"))?;
    html(data.views.render_edit(&post))
}

pub async fn update_post(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Payload,
) -> Result<HttpResponse, AppError> {
    let id = PostId(path.into_inner());
    let mut form = read_post_form(&req, payload, data.upload_limit).await?;
    let content = match form.fields.remove(CONTENT_FIELD) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };
    data.uploads
        .update_from_upload(&id, form.upload, content)
        .await
        .map_err(|e| AppError::from_upload(e, "Error updating post"))?;
    Ok(redirect_to_list())
}

pub async fn delete_post(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, AppError> {
    let id = PostId(path.into_inner());
    data.repo.delete_post(&id).await
        .map_err(|e| AppError::from_repo(e, "Error deleting post"))?;
    log::info!("deleted post {id}");
    Ok(redirect_to_list())
}

#[derive(serde::Deserialize)]
pub struct FileQuery {
    token: Option<String>,
}

pub async fn get_file(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<FileQuery>,
) -> Result<HttpResponse, AppError> {
    let name = path.into_inner();
    let obj = match data.store.load(&name).await {
        Ok(obj) => obj,
        Err(ObjectStoreError::NotFound) => return Err(AppError::FileNotFound),
        Err(e) => {
            log::error!("object store load error for {name}: {e}");
            return Err(AppError::StoreOperation("Error fetching file"));
        }
    };
    let authorized = match (&obj.download_token, &query.token) {
        (Some(stored), Some(given)) => stored == given,
        _ => false,
    };
    if !authorized {
        return Err(AppError::FileNotFound);
    }
    let mut resp = HttpResponse::Ok();
    resp.insert_header((header::CONTENT_TYPE, obj.content_type));
    if let Some(cache) = obj.cache_control {
        resp.insert_header((header::CACHE_CONTROL, cache));
    }
    Ok(resp.body(obj.bytes))
}

/// Text fields and the optional attached file of one form submission.
#[derive(Debug, Default)]
pub struct PostForm {
    pub fields: FieldMap,
    pub upload: Option<UploadDescriptor>,
}

async fn read_post_form(req: &HttpRequest, payload: web::Payload, limit: usize) -> Result<PostForm, AppError> {
    let urlencoded = req
        .mime_type()
        .ok()
        .flatten()
        .map(|m| m.type_() == mime::APPLICATION && m.subtype() == mime::WWW_FORM_URLENCODED)
        .unwrap_or(false);
    if urlencoded {
        let mut payload = payload.into_inner();
        let form = web::Form::<HashMap<String, String>>::from_request(req, &mut payload)
            .await
            .map_err(|e| {
                log::warn!("urlencoded form error: {e}");
                AppError::BadForm
            })?;
        let fields = form
            .into_inner()
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        return Ok(PostForm { fields, upload: None });
    }
    read_multipart(Multipart::new(req.headers(), payload), limit).await
}

async fn read_multipart(mut payload: Multipart, limit: usize) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::warn!("multipart error: {e}");
        AppError::BadForm
    })? {
        let disposition = field.content_disposition();
        let Some(name) = disposition.get_name().map(str::to_string) else { continue };
        let filename = disposition.get_filename().map(str::to_string);
        let declared = field.content_type().map(|m| m.essence_str().to_string());

        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::warn!("multipart stream read error: {e}");
            AppError::BadForm
        })? {
            if bytes.len() + chunk.len() > limit {
                return Err(AppError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }

        match filename {
            Some(filename) if name == FILE_FIELD => {
                // browsers submit an empty part when no file was chosen
                if bytes.is_empty() || form.upload.is_some() {
                    continue;
                }
                let mime = declared.unwrap_or_else(|| {
                    infer::get(&bytes)
                        .map(|t| t.mime_type().to_string())
                        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
                });
                form.upload = Some(UploadDescriptor::new(bytes, mime, filename));
            }
            Some(filename) => {
                log::debug!("ignoring unexpected file part '{name}' ({filename})");
            }
            None => {
                let text = String::from_utf8(bytes).map_err(|_| AppError::BadForm)?;
                form.fields.insert(name, Value::String(text));
            }
        }
    }
    Ok(form)
}
