use kuvert::{Config, Server};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let mut config = Config::default();
    if let Ok(hostname) = std::env::var("KUVERT_HOSTNAME") {
        config.hostname = hostname;
    }
    if let Ok(port) = std::env::var("KUVERT_PORT") {
        config.port = port.parse()?;
    }
    if let Ok(domain) = std::env::var("KUVERT_DOMAIN") {
        config.domain = domain;
    }
    config.port_fallback = std::env::var("KUVERT_PORT_FALLBACK")
        .map_or(false, |v| v == "1" || v.eq_ignore_ascii_case("true"));

    let server = Server::start(config).await?;

    signal::ctrl_c().await?;
    info!("shutting down");
    server.stop().await;

    Ok(())
}
