use actix_web::{web, App, HttpServer, middleware::Compress};
use actix_cors::Cors;

use postdeck::repo::PostRepo;
use postdeck::settings::AppConfig;
use postdeck::storage::{ObjectStore, S3ObjectStore};
use postdeck::views::Views;
use postdeck::{config, AppState, MethodOverride};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping postdeck server");

    let cfg = AppConfig::from_env()?;
    info!("Object store bucket: {}", cfg.storage.bucket);
    info!("Download references under: {}", cfg.public_base_url);

    let repo = build_repo(&cfg).await?;
    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&cfg.storage, &cfg.public_base_url).await?);
    let views = Arc::new(Views::new()?);
    let state = AppState::new(repo, store, views).with_upload_limit(cfg.upload_limit);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(MethodOverride::default())
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(Cors::permissive())
            .app_data(web::Data::new(state.clone()))
            .configure(config)
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);

    server.run().await?;
    Ok(())
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn PostRepo>> {
    info!("Using in-memory document store");
    Ok(Arc::new(postdeck::repo::inmem::InMemRepo::new()))
}

#[cfg(feature = "postgres-store")]
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn PostRepo>> {
    use sqlx::postgres::PgPoolOptions;
    let db_url = cfg
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL (or service account database_url) must be set for postgres-store"))?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_lazy(db_url)?;
    let repo = postdeck::repo::pg::PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres document store");
    Ok(Arc::new(repo))
}

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
async fn build_repo(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn PostRepo>> {
    anyhow::bail!("no document store compiled in; enable the inmem-store or postgres-store feature")
}
