use mesh_auth::api::start_webserver;
use mesh_auth::config::load_config;
use mesh_auth::services::AuthServices;
use mesh_auth::ticket::spawn_sweeper;
use sea_orm::{ConnectOptions, Database};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "mesh_auth=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    initialize_tracing();

    let config = load_config()?;

    let mut options = ConnectOptions::new(config.database_url.clone());
    options
        .connect_timeout(config.store_timeout())
        .acquire_timeout(config.store_timeout())
        .sqlx_logging(false);
    let db = Arc::new(Database::connect(options).await?);

    let services = AuthServices::new(db, &config)?;
    let _sweeper = spawn_sweeper(
        services.claims.clone(),
        services.correlations.clone(),
        config.tickets.sweep_interval(),
    );
    tracing::info!(
        allowed_services = ?config.allowed_services,
        ticket_ttl_secs = config.tickets.ttl_secs,
        "identity services ready"
    );

    start_webserver(services, &config.listen_addr).await
}
