use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "linehook")]
#[command(about = "linehook CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the webhook gateway. Requires a channel secret and access token (config or LINE_CHANNEL_SECRET / LINE_CHANNEL_ACCESS_TOKEN).
    Serve {
        /// Config file path (default: LINEHOOK_CONFIG_PATH or ~/.linehook/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from PORT, config, or 5000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the x-line-signature value for a request body, for testing deliveries with curl.
    Sign {
        /// Config file path (default: LINEHOOK_CONFIG_PATH or ~/.linehook/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// File containing the body; reads stdin when omitted.
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("linehook {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Sign { config, file }) => {
            if let Err(e) = run_sign(config, file) {
                log::error!("sign failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = linehook::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    linehook::config::apply_env_overrides(&mut config);
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    linehook::gateway::run_gateway(config).await
}

fn run_sign(config_path: Option<PathBuf>, file: Option<PathBuf>) -> anyhow::Result<()> {
    use anyhow::Context;

    let (config, _) = linehook::config::load_config(config_path)?;
    let secret = linehook::config::resolve_channel_secret(&config)
        .ok_or(linehook::config::CredentialsError::MissingChannelSecret)?;
    let body = match file {
        Some(path) => {
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading body from stdin")?;
            buf
        }
    };
    println!("{}", linehook::signature::sign(&body, secret.as_bytes()));
    Ok(())
}
