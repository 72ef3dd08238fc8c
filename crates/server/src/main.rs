use verifid_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    verifid_server::telemetry::init(config.log_format, "info")?;

    verifid_server::serve(config).await
}
