use anyhow::Context;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;
use warden_certificates::{AcmeSettings, JsonFileSecretStore, SecretStore};
use warden_dns::{CommitMode, DnsProvider, Operation, RecordType};

#[derive(Args)]
pub struct DnsCommand {
    #[command(subcommand)]
    pub action: DnsAction,
}

#[derive(Subcommand)]
pub enum DnsAction {
    /// List the live values of a record set
    Find(FindArgs),
    /// Converge a record set towards the given operations
    Commit(CommitArgs),
}

#[derive(Args)]
pub struct ProviderArgs {
    /// DNS provider secrets (JSON object keyed by secret id)
    #[arg(long, env = "WARDEN_SECRETS")]
    pub secrets: PathBuf,

    /// Secret id of the provider to use
    #[arg(long)]
    pub secret: String,

    /// Fully qualified record name
    #[arg(long)]
    pub domain: String,

    /// Record type (A, AAAA, CNAME, TXT)
    #[arg(long = "type", default_value = "TXT")]
    pub record_type: RecordType,
}

#[derive(Args)]
pub struct FindArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Args)]
pub struct CommitArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Values that must exist afterwards
    #[arg(long)]
    pub upsert: Vec<String>,

    /// Values kept only if already present
    #[arg(long)]
    pub retain: Vec<String>,

    /// Values that must be absent afterwards
    #[arg(long)]
    pub delete: Vec<String>,

    /// Remove existing values no operation mentions
    #[arg(long)]
    pub authoritative: bool,
}

impl CommitArgs {
    fn operations(&self) -> Vec<Operation> {
        let upserts = self.upsert.iter().map(Operation::upsert);
        let retains = self.retain.iter().map(Operation::retain);
        let deletes = self.delete.iter().map(Operation::delete);
        upserts.chain(retains).chain(deletes).collect()
    }

    fn mode(&self) -> CommitMode {
        if self.authoritative {
            CommitMode::Authoritative
        } else {
            CommitMode::Merge
        }
    }
}

async fn connect(
    args: &ProviderArgs,
    settings: Option<&Path>,
) -> anyhow::Result<Box<dyn DnsProvider>> {
    let settings = AcmeSettings::load(settings).context("Failed to load ACME settings")?;
    let secrets = JsonFileSecretStore::load(&args.secrets)
        .with_context(|| format!("Failed to read secrets from {}", args.secrets.display()))?;
    let credentials = secrets
        .get(&args.secret)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Secret '{}' not found", args.secret))?;

    let kind = credentials.provider_type();
    info!("Connecting to {} DNS", kind);
    let provider = warden_dns::connect(kind, credentials, settings.ttls())
        .await
        .with_context(|| format!("Failed to connect to {}", kind))?;
    Ok(provider)
}

impl DnsCommand {
    pub fn execute(self, settings: Option<&Path>) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run(settings))
    }

    async fn run(self, settings: Option<&Path>) -> anyhow::Result<()> {
        match self.action {
            DnsAction::Find(args) => {
                let args = args.provider;
                let provider = connect(&args, settings).await?;
                let values = provider.dns_find(&args.domain, args.record_type).await?;
                println!(
                    "{} {} {}",
                    args.domain.bright_cyan(),
                    args.record_type.as_str().bright_white().bold(),
                    if values.is_empty() {
                        "(none)".to_string()
                    } else {
                        values.join(" ")
                    }
                );
            }
            DnsAction::Commit(args) => {
                let ops = args.operations();
                if ops.is_empty() {
                    anyhow::bail!("At least one --upsert, --retain or --delete value is required");
                }
                let provider = connect(&args.provider, settings).await?;
                let outcome = provider
                    .dns_commit(
                        &args.provider.domain,
                        args.provider.record_type,
                        &ops,
                        args.mode(),
                    )
                    .await?;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_dns::OperationKind;

    fn commit_args(authoritative: bool) -> CommitArgs {
        CommitArgs {
            provider: ProviderArgs {
                secrets: PathBuf::from("secrets.json"),
                secret: "cf".to_string(),
                domain: "_acme-challenge.example.com".to_string(),
                record_type: RecordType::TXT,
            },
            upsert: vec!["a".to_string()],
            retain: vec!["b".to_string()],
            delete: vec!["c".to_string(), "d".to_string()],
            authoritative,
        }
    }

    #[test]
    fn test_operations_from_flags() {
        let ops = commit_args(false).operations();
        let kinds: Vec<OperationKind> = ops.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Upsert,
                OperationKind::Retain,
                OperationKind::Delete,
                OperationKind::Delete
            ]
        );
        assert_eq!(ops[3].value, "d");
    }

    #[test]
    fn test_commit_mode_flag() {
        assert_eq!(commit_args(false).mode(), CommitMode::Merge);
        assert_eq!(commit_args(true).mode(), CommitMode::Authoritative);
    }

    #[tokio::test]
    async fn test_connect_unknown_secret() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"cf": {"type": "cloudflare", "api_token": "t"}}"#,
        )
        .unwrap();

        let mut args = commit_args(false).provider;
        args.secrets = file.path().to_path_buf();
        args.secret = "other".to_string();

        let err = connect(&args, None).await.err().unwrap();
        assert!(err.to_string().contains("other"));
    }
}
