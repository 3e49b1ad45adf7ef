use orgscan::config::AppConfig;
use orgscan::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging before the rest of the config so its warnings are visible
    tracing_subscriber::fmt()
        .with_max_level(AppConfig::log_level_from_env())
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Org scanner starting...");

    server::run(config).await
}
