// secretsync/src/main.rs
//
// Thin CLI: parses arguments, wires concrete adapters behind the engine's
// ports, and translates a PipelineOutcome into the exit codes (0 = no
// changes, 1 = changes applied, 2 = error). All actual logic lives in
// secretsync-core; this binary only constructs clients and prints output.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use aws_credential_types::provider::SharedCredentialsProvider;
use clap::{Parser, Subcommand, ValueEnum};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};

use secretsync_core::application::{rollback_one_path, run_pipeline, PipelineContext};
use secretsync_core::domain::diff::{DiffFormat, Formatter};
use secretsync_core::domain::graph::DependencyGraph;
use secretsync_core::domain::secret::{SecretPath, Version};
use secretsync_core::domain::target::DiscoverySource;
use secretsync_core::infrastructure::aws::{AwsIdentityCenterDiscovery, AwsOrganizationsDiscovery, S3MergeStore};
use secretsync_core::infrastructure::config::{load_pipeline_config, MergeStoreBackend, PipelineConfig, SourceConfig};
use secretsync_core::infrastructure::resilience::CircuitBreaker;
use secretsync_core::infrastructure::vault::{VaultKvMergeStore, VaultSourceReader};
use secretsync_core::infrastructure::{DefaultTargetStoreFactory, LayeredVersionStore};
use secretsync_core::metrics::MetricsRegistry;
use secretsync_core::ports::{
    CredentialProvider, EnvCredentialProvider, IdentityCenterDiscovery, MergeStore, OrganizationsDiscovery,
    SourceReader, TargetStoreFactory, VersionStore,
};

const DEFAULT_CONFIG_PATH: &str = "secretsync.yaml";
const VAULT_ADDR_ENV_VAR: &str = "VAULT_ADDR";
const DEFAULT_VAULT_ADDR: &str = "http://127.0.0.1:8200";
const BREAKER_FAILURE_THRESHOLD: u32 = 5;
const BREAKER_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "secretsync")]
#[command(about = "Cross-account secret synchronization pipeline: Vault KV -> AWS Secrets Manager / Vault KV", long_about = None)]
#[command(version)]
struct Cli {
    /// tracing `EnvFilter` directive, e.g. "info" or "secretsync=debug"
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value = "human")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

#[derive(Copy, Clone, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Github,
    Compact,
    SideBySide,
}

impl From<OutputFormat> for DiffFormat {
    fn from(value: OutputFormat) -> Self {
        match value {
            OutputFormat::Human => DiffFormat::Human,
            OutputFormat::Json => DiffFormat::Json,
            OutputFormat::Github => DiffFormat::GithubActions,
            OutputFormat::Compact => DiffFormat::Compact,
            OutputFormat::SideBySide => DiffFormat::SideBySide,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Runs Phase M (merge) and/or Phase S (sync) across the target graph
    Pipeline {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Compute diffs without writing to any target
        #[arg(long)]
        dry_run: bool,

        /// Run Phase M only
        #[arg(long)]
        merge_only: bool,

        /// Run Phase S only, reusing the MergeStore's current contents
        #[arg(long)]
        sync_only: bool,

        /// Restrict Phase S to these target names
        #[arg(long, value_delimiter = ',')]
        targets: Option<Vec<String>>,

        /// Print a diff for every synced target
        #[arg(long)]
        diff: bool,

        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Render masked values unmasked in diff output
        #[arg(long)]
        show_values: bool,

        /// No metrics exporter is wired up in this build; logged, not served.
        #[arg(long)]
        metrics_port: Option<u16>,

        #[arg(long, default_value = "127.0.0.1")]
        metrics_addr: String,
    },

    /// Loads and validates a pipeline configuration without running it
    Validate {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Prints the static target dependency graph as topological waves
    Graph {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Inspects or rolls back a target's synced secret history
    Versions {
        #[command(subcommand)]
        action: VersionsAction,
    },
}

#[derive(Subcommand)]
enum VersionsAction {
    /// Lists every recorded version for one target/path
    List {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        #[arg(long)]
        target: String,
        #[arg(long)]
        path: String,
    },
    /// Re-applies a prior version as the target's current value
    Rollback {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        #[arg(long)]
        target: String,
        #[arg(long)]
        path: String,
        #[arg(long)]
        version: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let result = match cli.command {
        Commands::Pipeline {
            config,
            dry_run,
            merge_only,
            sync_only,
            targets,
            diff,
            format,
            show_values,
            metrics_port,
            metrics_addr,
        } => {
            if let Some(port) = metrics_port {
                tracing::info!(addr = %metrics_addr, port, "metrics endpoint requested; no exporter is wired up in this build");
            }
            cmd_pipeline(config, dry_run, merge_only, sync_only, targets, diff, format, show_values).await
        }
        Commands::Validate { config } => cmd_validate(config).await,
        Commands::Graph { config } => cmd_graph(config).await,
        Commands::Versions { action } => match action {
            VersionsAction::List { config, target, path } => cmd_versions_list(config, target, path).await,
            VersionsAction::Rollback { config, target, path, version } => {
                cmd_versions_rollback(config, target, path, version).await
            }
        },
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Human => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().json().with_env_filter(filter).init();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_pipeline(
    config_path: PathBuf,
    dry_run: bool,
    merge_only: bool,
    sync_only: bool,
    targets: Option<Vec<String>>,
    diff: bool,
    format: OutputFormat,
    show_values: bool,
) -> anyhow::Result<i32> {
    if merge_only && sync_only {
        anyhow::bail!("--merge-only and --sync-only are mutually exclusive");
    }

    let config = load_pipeline_config(&config_path)?;
    let metrics = Arc::new(MetricsRegistry::new());
    let credentials = build_credential_provider().await?;

    let sources = build_source_readers(&config, &credentials, &metrics).await?;
    let merge_store = build_merge_store(&config, &credentials, &metrics).await?;
    let target_store_factory = DefaultTargetStoreFactory::new(credentials.clone(), metrics.clone(), vault_addr());
    let organizations_discovery = build_organizations_discovery(&config, &credentials, &metrics).await?;
    let identity_center_discovery = build_identity_center_discovery(&config, &credentials, &metrics).await?;

    let actor = actor_name();
    let ctx = PipelineContext {
        config: &config,
        sources: &sources,
        merge_store: merge_store.as_ref(),
        target_store_factory: &target_store_factory,
        organizations_discovery: organizations_discovery.as_deref(),
        identity_center_discovery: identity_center_discovery.as_deref(),
        metrics: &metrics,
        actor: &actor,
    };

    let outcome = run_pipeline(&ctx, merge_only, sync_only, targets.as_deref(), dry_run).await?;

    if diff {
        for target_diff in &outcome.diffs {
            println!("{}", Formatter::render(target_diff, format.into(), show_values));
        }
    }

    for failure in &outcome.failures {
        eprintln!("target '{}' failed: {}", failure.target, failure.message);
    }

    Ok(outcome.exit_code())
}

async fn cmd_validate(config_path: PathBuf) -> anyhow::Result<i32> {
    match load_pipeline_config(&config_path) {
        Ok(config) => {
            println!(
                "configuration valid: {} source(s), {} static target(s), {} dynamic generator(s)",
                config.sources.len(),
                config.targets.len(),
                config.dynamic_targets.len()
            );
            Ok(0)
        }
        Err(err) => {
            eprintln!("configuration invalid: {err}");
            Ok(2)
        }
    }
}

/// Only the statically-declared targets participate; a dynamic generator's
/// expansion depends on a live discovery snapshot, which this read-only
/// command has no reason to fetch.
async fn cmd_graph(config_path: PathBuf) -> anyhow::Result<i32> {
    let config = load_pipeline_config(&config_path)?;
    let graph = DependencyGraph::build(config.targets.clone())?;
    let levels = graph.topological_levels()?;
    for (i, level) in levels.iter().enumerate() {
        println!("wave {i}: {}", level.join(", "));
    }
    Ok(0)
}

async fn cmd_versions_list(config_path: PathBuf, target: String, path: String) -> anyhow::Result<i32> {
    let config = load_pipeline_config(&config_path)?;
    let metrics = Arc::new(MetricsRegistry::new());
    let credentials = build_credential_provider().await?;
    let merge_store = build_merge_store(&config, &credentials, &metrics).await?;
    let version_store = LayeredVersionStore::new(merge_store);

    let secret_path = SecretPath::new(&path)?;
    let history = version_store.history(&target, &secret_path).await?;

    if history.is_empty() {
        println!("no recorded versions for {target}:{path}");
        return Ok(0);
    }
    for record in &history {
        println!("{} {} actor={}", record.version, record.timestamp.to_rfc3339(), record.actor);
    }
    Ok(0)
}

async fn cmd_versions_rollback(config_path: PathBuf, target: String, path: String, version: u64) -> anyhow::Result<i32> {
    let config = load_pipeline_config(&config_path)?;
    let metrics = Arc::new(MetricsRegistry::new());
    let credentials = build_credential_provider().await?;
    let merge_store = build_merge_store(&config, &credentials, &metrics).await?;
    let version_store = LayeredVersionStore::new(merge_store);

    let target_spec = config
        .targets
        .iter()
        .find(|t| t.name == target)
        .with_context(|| format!("target '{target}' is not declared in {}", config_path.display()))?
        .clone();

    let target_store_factory = DefaultTargetStoreFactory::new(credentials.clone(), metrics.clone(), vault_addr());
    let target_store = target_store_factory.build(&target_spec).await?;

    let secret_path = SecretPath::new(&path)?;
    let requested_version = Version::new(version).context("--version must be at least 1")?;

    let applied = rollback_one_path(&version_store, target_store.as_ref(), &target, &secret_path, requested_version).await?;
    println!("rolled back {target}:{path} to {applied}");
    Ok(1)
}

fn actor_name() -> String {
    std::env::var("SECRETSYNC_ACTOR").unwrap_or_else(|_| std::env::var("USER").unwrap_or_else(|_| "secretsync".to_string()))
}

fn vault_addr() -> String {
    std::env::var(VAULT_ADDR_ENV_VAR).unwrap_or_else(|_| DEFAULT_VAULT_ADDR.to_string())
}

async fn build_credential_provider() -> anyhow::Result<Arc<dyn CredentialProvider>> {
    let provider = EnvCredentialProvider::from_env().await?;
    Ok(Arc::new(provider))
}

async fn vault_client(credentials: &Arc<dyn CredentialProvider>) -> anyhow::Result<VaultClient> {
    let token = credentials.vault_token().await?;
    let settings = VaultClientSettingsBuilder::default()
        .address(vault_addr())
        .token(token)
        .build()
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    VaultClient::new(settings).map_err(|e| anyhow::anyhow!(e.to_string()))
}

async fn build_source_readers(
    config: &PipelineConfig,
    credentials: &Arc<dyn CredentialProvider>,
    metrics: &Arc<MetricsRegistry>,
) -> anyhow::Result<Vec<(SourceConfig, Arc<dyn SourceReader>)>> {
    let mut readers = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let client = vault_client(credentials).await?;
        let breaker = Arc::new(CircuitBreaker::new(
            format!("vault-source:{}", source.spec.mount),
            BREAKER_FAILURE_THRESHOLD,
            BREAKER_OPEN_TIMEOUT,
            metrics.clone(),
        ));
        let reader: Arc<dyn SourceReader> = Arc::new(VaultSourceReader::new(client, source.spec.clone(), breaker, metrics.clone()));
        readers.push((source.clone(), reader));
    }
    Ok(readers)
}

async fn build_merge_store(
    config: &PipelineConfig,
    credentials: &Arc<dyn CredentialProvider>,
    metrics: &Arc<MetricsRegistry>,
) -> anyhow::Result<Arc<dyn MergeStore>> {
    match config.merge_store.backend {
        MergeStoreBackend::S3 => {
            let bucket = config
                .merge_store
                .bucket
                .clone()
                .context("merge_store.backend = s3 requires merge_store.bucket")?;
            let aws_creds = credentials.aws_credentials(None).await?;
            let aws_cfg = aws_config::from_env()
                .credentials_provider(SharedCredentialsProvider::new(aws_creds))
                .load()
                .await;
            let client = aws_sdk_s3::Client::new(&aws_cfg);
            let breaker = Arc::new(CircuitBreaker::new(
                format!("s3:{bucket}"),
                BREAKER_FAILURE_THRESHOLD,
                BREAKER_OPEN_TIMEOUT,
                metrics.clone(),
            ));
            Ok(Arc::new(S3MergeStore::new(client, bucket, config.merge_store.prefix.clone(), breaker, metrics.clone())))
        }
        MergeStoreBackend::VaultKv => {
            let mount = config
                .merge_store
                .mount
                .clone()
                .context("merge_store.backend = vault_kv requires merge_store.mount")?;
            let client = vault_client(credentials).await?;
            let breaker = Arc::new(CircuitBreaker::new(
                format!("vault-kv-merge:{mount}"),
                BREAKER_FAILURE_THRESHOLD,
                BREAKER_OPEN_TIMEOUT,
                metrics.clone(),
            ));
            Ok(Arc::new(VaultKvMergeStore::new(client, mount, breaker)))
        }
    }
}

/// Organizations discovery is only constructed when some dynamic target
/// generator actually references it, so a run with purely static targets
/// never touches the Organizations API.
async fn build_organizations_discovery(
    config: &PipelineConfig,
    credentials: &Arc<dyn CredentialProvider>,
    metrics: &Arc<MetricsRegistry>,
) -> anyhow::Result<Option<Arc<dyn OrganizationsDiscovery>>> {
    let needed = config
        .dynamic_targets
        .iter()
        .any(|g| matches!(g.discovery, DiscoverySource::Organizations { .. }));
    if !needed {
        return Ok(None);
    }

    let aws_creds = credentials.aws_credentials(None).await?;
    let aws_cfg = aws_config::from_env()
        .credentials_provider(SharedCredentialsProvider::new(aws_creds))
        .load()
        .await;
    let client = aws_sdk_organizations::Client::new(&aws_cfg);
    let breaker = Arc::new(CircuitBreaker::new(
        "aws-organizations",
        BREAKER_FAILURE_THRESHOLD,
        BREAKER_OPEN_TIMEOUT,
        metrics.clone(),
    ));
    Ok(Some(Arc::new(AwsOrganizationsDiscovery::new(client, breaker, metrics.clone()))))
}

async fn build_identity_center_discovery(
    config: &PipelineConfig,
    credentials: &Arc<dyn CredentialProvider>,
    metrics: &Arc<MetricsRegistry>,
) -> anyhow::Result<Option<Arc<dyn IdentityCenterDiscovery>>> {
    let needed = config
        .dynamic_targets
        .iter()
        .any(|g| matches!(g.discovery, DiscoverySource::IdentityCenter { .. }));
    if !needed {
        return Ok(None);
    }

    let aws_creds = credentials.aws_credentials(None).await?;
    let aws_cfg = aws_config::from_env()
        .credentials_provider(SharedCredentialsProvider::new(aws_creds))
        .load()
        .await;
    let sso = aws_sdk_ssoadmin::Client::new(&aws_cfg);
    let identitystore = aws_sdk_identitystore::Client::new(&aws_cfg);
    let breaker = Arc::new(CircuitBreaker::new(
        "aws-identity-center",
        BREAKER_FAILURE_THRESHOLD,
        BREAKER_OPEN_TIMEOUT,
        metrics.clone(),
    ));
    Ok(Some(Arc::new(AwsIdentityCenterDiscovery::new(sso, identitystore, breaker, metrics.clone()))))
}
