use actix_web::{web, App, HttpServer};
use crypto_core::jwt as core_jwt;
use realtime_chat_service::{
    config::{self, MediaBackend, StorageBackend},
    db, error, logging, routes,
    services::{
        BlobStore, ChatRepository, MemoryBlobStore, MemoryChatRepository, MemoryUserDirectory,
        PgChatRepository, PgUserDirectory, S3BlobStore, UserDirectory,
    },
    state::AppState,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    let cfg = Arc::new(config::Config::from_env()?);
    logging::init_tracing(cfg.log_json);

    match &cfg.jwt_private_key_pem {
        Some(private_key) => core_jwt::initialize_jwt_keys(private_key, &cfg.jwt_public_key_pem),
        None => core_jwt::initialize_jwt_validation_only(&cfg.jwt_public_key_pem),
    }
    .map_err(|e| error::AppError::StartServer(format!("Failed to initialize JWT keys: {e}")))?;

    let (repo, directory): (Arc<dyn ChatRepository>, Arc<dyn UserDirectory>) = match cfg.storage {
        StorageBackend::Postgres => {
            let database_url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| error::AppError::Config("DATABASE_URL missing".into()))?;
            let pool = db::init_pool(database_url)
                .await
                .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
            (
                Arc::new(PgChatRepository::new(pool.clone())),
                Arc::new(PgUserDirectory::new(pool)),
            )
        }
        StorageBackend::Memory => {
            tracing::warn!("STORAGE_BACKEND=memory: conversations are lost on restart");
            (
                Arc::new(MemoryChatRepository::new()),
                Arc::new(MemoryUserDirectory::new()),
            )
        }
    };

    let blobs: Arc<dyn BlobStore> = match cfg.media {
        MediaBackend::S3 => Arc::new(S3BlobStore::from_config(&cfg.s3).await),
        MediaBackend::Memory => Arc::new(MemoryBlobStore::new(cfg.s3.public_base_url.clone())),
    };

    let state = AppState::build(cfg.clone(), repo, directory, blobs)?;

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, storage = ?cfg.storage, media = ?cfg.media, "starting realtime-chat-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(actix_middleware::Logging)
            .wrap(actix_middleware::RequestId::new())
            .app_data(web::Data::new(state.clone()))
            .app_data(web::JsonConfig::default().limit(64 * 1024))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind REST: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("REST server: {e}")))
}
