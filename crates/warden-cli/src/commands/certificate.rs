use anyhow::Context;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use warden_certificates::{
    AcmeService, AcmeServiceBuilder, AcmeSettings, AcmeType, Certificate,
    CertificateRepository, HickoryTxtLookup, JsonFileRepository, JsonFileSecretStore,
};

#[derive(Args)]
pub struct CertificateCommand {
    #[command(subcommand)]
    pub action: CertificateAction,
}

/// Certificates validated through HTTP-01 need the gateway to answer
/// `/.well-known/acme-challenge/` from its own challenge store, so the CLI
/// only drives DNS-01 certificates.
#[derive(Subcommand)]
pub enum CertificateAction {
    /// Issue a new certificate regardless of its current state (DNS-01 only)
    Issue(TargetArgs),
    /// Reissue when domains or account changed since the last issuance (DNS-01 only)
    Update(TargetArgs),
    /// Renew one DNS-01 certificate, or every ACME certificate when no id is given
    Renew(RenewArgs),
}

#[derive(Args)]
pub struct StoreArgs {
    /// Certificate store (JSON array of certificates)
    #[arg(long, env = "WARDEN_CERTIFICATES")]
    pub file: PathBuf,

    /// DNS provider secrets (JSON object keyed by secret id)
    #[arg(long, env = "WARDEN_SECRETS")]
    pub secrets: Option<PathBuf>,
}

#[derive(Args)]
pub struct TargetArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Certificate id
    #[arg(long)]
    pub id: String,
}

#[derive(Args)]
pub struct RenewArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Certificate id
    #[arg(long)]
    pub id: Option<String>,

    /// Renew even when the certificate is not close to expiring
    #[arg(long)]
    pub force: bool,
}

fn build_service(store: &StoreArgs, settings: Option<&Path>) -> anyhow::Result<AcmeService> {
    let settings = AcmeSettings::load(settings).context("Failed to load ACME settings")?;
    let secrets = match &store.secrets {
        Some(path) => JsonFileSecretStore::load(path)
            .with_context(|| format!("Failed to read secrets from {}", path.display()))?,
        None => JsonFileSecretStore::default(),
    };
    debug!("Using ACME directory {}", settings.url);

    let service = AcmeServiceBuilder::new()
        .with_repository(Arc::new(JsonFileRepository::new(&store.file)))
        .with_secret_store(Arc::new(secrets))
        .with_txt_lookup(Arc::new(HickoryTxtLookup::new()))
        .with_settings(settings)
        .build()?;
    Ok(service)
}

async fn load(store: &StoreArgs, id: &str) -> anyhow::Result<Certificate> {
    JsonFileRepository::new(&store.file)
        .find(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Certificate '{}' not found", id))
}

/// Nothing in this process serves HTTP-01 tokens to the CA
fn require_dns_mode(cert: &Certificate) -> anyhow::Result<()> {
    if cert.acme_type == AcmeType::Http {
        anyhow::bail!(
            "Certificate '{}' uses HTTP-01 validation, which the gateway must run because it \
             serves /.well-known/acme-challenge/. Switch it to dns to manage it from the CLI",
            cert.id
        );
    }
    Ok(())
}

fn print_certificate(cert: &Certificate) {
    println!();
    println!(
        "{} {}",
        "Certificate:".bright_white().bold(),
        cert.name.bright_cyan()
    );
    match &cert.info {
        Some(info) => {
            println!(
                "{} {}",
                "Domains:".bright_white().bold(),
                info.dns_names.join(", ")
            );
            println!(
                "{} {}",
                "Expires:".bright_white().bold(),
                info.expires_on.format("%Y-%m-%d %H:%M UTC").to_string().bright_yellow()
            );
        }
        None => println!("{}", "No certificate issued yet".bright_yellow()),
    }
    println!();
}

impl CertificateCommand {
    pub fn execute(self, settings: Option<&Path>) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run(settings))
    }

    async fn run(self, settings: Option<&Path>) -> anyhow::Result<()> {
        match self.action {
            CertificateAction::Issue(args) => {
                let service = build_service(&args.store, settings)?;
                let mut cert = load(&args.store, &args.id).await?;
                require_dns_mode(&cert)?;
                info!("Issuing certificate {}", cert.name);
                service
                    .generate(&mut cert)
                    .await
                    .with_context(|| format!("Failed to issue certificate {}", cert.name))?;
                println!("{}", "✅ Certificate issued".bright_green());
                print_certificate(&cert);
            }
            CertificateAction::Update(args) => {
                let service = build_service(&args.store, settings)?;
                let mut cert = load(&args.store, &args.id).await?;
                require_dns_mode(&cert)?;
                if service.update(&mut cert).await? {
                    println!("{}", "✅ Certificate reissued".bright_green());
                } else {
                    println!("{}", "Certificate is up to date".bright_white());
                }
                print_certificate(&cert);
            }
            CertificateAction::Renew(args) => {
                let service = build_service(&args.store, settings)?;
                match args.id {
                    Some(id) => {
                        let mut cert = load(&args.store, &id).await?;
                        require_dns_mode(&cert)?;
                        if service.renew(&mut cert, args.force).await? {
                            println!("{}", "✅ Certificate renewed".bright_green());
                        } else {
                            println!("{}", "Certificate does not need renewal".bright_white());
                        }
                        print_certificate(&cert);
                    }
                    None => {
                        let renewed = service.renew_all().await?;
                        println!(
                            "{} {}",
                            "Certificates renewed:".bright_white().bold(),
                            renewed.to_string().bright_green()
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
