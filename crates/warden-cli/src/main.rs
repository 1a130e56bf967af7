//! Warden CLI
//!
//! Issues and renews gateway certificates and inspects DNS provider state.

mod commands;

use clap::{Parser, Subcommand};
use commands::{CertificateCommand, DnsCommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "WARDEN_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "WARDEN_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    /// ACME settings file (JSON)
    #[arg(long, env = "WARDEN_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue, update or renew ACME certificates
    Certificate(CertificateCommand),
    /// Inspect or change DNS records through a provider
    Dns(DnsCommand),
}

fn init_tracing(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // RUST_LOG takes full control when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "warden={level},\
             warden_cli={level},\
             warden_dns={level},\
             warden_acme={level},\
             warden_certificates={level},\
             h2=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn,\
             hickory_proto=warn,\
             hickory_resolver=warn",
            level = log_level
        ))
    };

    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format)?;

    match cli.command {
        Commands::Certificate(cmd) => cmd.execute(cli.settings.as_deref()),
        Commands::Dns(cmd) => cmd.execute(cli.settings.as_deref()),
    }
}
