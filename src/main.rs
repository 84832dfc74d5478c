use anyhow::{Context, Result};
use clap::Parser;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use std::path::PathBuf;
use pypipo::config::Config;
use pypipo::proxy::MirrorProxy;

/// pypipo - caching PyPI mirror proxy built with Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "pypipo")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Upgrade workers gracefully
    #[arg(long)]
    upgrade: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    pypipo::logging::init_subscriber(config.logging.format)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to initialize logging subsystem")?;

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        default_origin = %config.upstream.default_origin,
        allowed_hosts = ?config.upstream.allowed_hosts,
        cache_dir = %config.cache.dir,
        "Configuration loaded successfully"
    );

    if args.test {
        println!("Configuration {} is valid", args.config.display());
        return Ok(());
    }

    let opt = Opt {
        daemon: args.daemon,
        upgrade: args.upgrade,
        ..Default::default()
    };

    let mut server = Server::new(Some(opt)).context("Failed to create Pingora server")?;
    server.bootstrap();

    let proxy = MirrorProxy::from_config(&config).context("Failed to build proxy")?;

    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, proxy);
    let listen_addr = config.server.listen_addr();
    proxy_service.add_tcp(&listen_addr);
    proxy_service.threads = Some(config.server.threads);

    tracing::info!(address = %listen_addr, "Starting pypipo mirror proxy");

    server.add_service(proxy_service);
    server.run_forever();
}
