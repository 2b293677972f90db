use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use bookreview::auth::TokenIssuer;
use bookreview::config::{log_filter, Config};
use bookreview::db::Database;
use tracing::{error, info};
use tracing_subscriber::fmt;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .init();

    let config = Config::load().map_err(|e| {
        error!("Configuration error: {e}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    // Initialize the database
    let db = Database::new(&config.database_path).map_err(|e| {
        error!("Database connection error: {e}");
        std::io::Error::other(e)
    })?;
    db.create_schema().await.map_err(|e| {
        error!("Failed to create schema: {e}");
        std::io::Error::other(e)
    })?;
    info!("Database ready at {}", config.database_path);

    let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl_secs);
    let addr = config.address();

    let db = web::Data::new(db);
    let tokens = web::Data::new(tokens);
    let config = web::Data::new(config);

    info!("Server running on {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(db.clone())
            .app_data(tokens.clone())
            .app_data(config.clone())
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .configure(bookreview::configure)
    })
    .bind(&addr)?
    .run()
    .await
}
