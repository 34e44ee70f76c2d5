use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use watermap_server::{ServerConfig, start_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cfg = ServerConfig::from_env();
    let handle = start_server(cfg).await?;
    // Park forever
    handle.await.ok();
    Ok(())
}
