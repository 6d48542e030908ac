use padrelay::{start_server, virtual_controller, RelayConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = RelayConfig::load();
    let backend = virtual_controller::connect(config.backend)?;

    let server = start_server(&config, backend)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to listen on {}: {}", config.bind_addr, e))?;

    Err(server.run_until_stopped().await)
}
