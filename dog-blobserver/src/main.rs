use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = dog_blobserver::load_config();
    let ax = dog_blobserver::build(&config)?;
    let addr = dog_blobserver::listen_addr(&config);

    tracing::info!(%addr, "starting blob server");

    ax.listen(addr).await?;

    Ok(())
}
