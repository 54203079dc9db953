use readiness_core::Config;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize the application (telemetry, CPU sampler, raw data poller, routes)
    let (state, router) = readiness_api::setup::initialize_app(config.clone()).await?;

    // Start the server
    readiness_api::setup::server::start_server(&config, router, state).await?;

    Ok(())
}
