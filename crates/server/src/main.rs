use music_mcp_server::AppResources;
use music_mcp_server::api::start_webserver;
use music_mcp_server::config::load_config_or_panic;
use tokio::time::{Duration, interval};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "music_mcp_server=info,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    initialize_tracing();

    let config = load_config_or_panic();
    let sweep_every = Duration::from_secs(config.sessions.sweep_interval_secs.max(1));
    tracing::info!(
        public_url = %config.public_url,
        bind_addr = %config.bind_addr,
        "starting music MCP server"
    );

    let resources = AppResources::new(config)?;

    // Periodic eviction of expired codes, tokens and sessions
    {
        let resources = resources.clone();
        tokio::spawn(async move {
            let mut interval = interval(sweep_every);
            loop {
                interval.tick().await;
                resources.sweep_expired();
            }
        });
    }

    start_webserver(resources).await?;
    Ok(())
}
