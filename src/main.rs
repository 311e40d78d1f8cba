use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use a3s_cdr::{
    adapter_for, parse_payload, Backend, CdrConfig, CdrError, FsObjectStore, HttpCdrClient,
    ObjectStore, ProtectPipeline, Result,
};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "a3s-cdr",
    about = "Protect newly stored files through a CDR service",
    version
)]
struct Cli {
    /// JSON config file (defaults to CDR_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one delivered event payload through the pipeline
    Process {
        /// Event payload file, or '-' for stdin
        #[arg(short, long, default_value = "-")]
        event: PathBuf,
        /// Directory holding one sub-directory per bucket/container
        #[arg(short, long)]
        root: PathBuf,
        /// Separate directory for protected output (required for azure)
        #[arg(short, long)]
        destination_root: Option<PathBuf>,
        /// Override the configured backend
        #[arg(short, long, value_parser = parse_backend)]
        backend: Option<Backend>,
    },
    /// Validate configuration without processing anything
    CheckConfig,
}

fn parse_backend(raw: &str) -> std::result::Result<Backend, String> {
    raw.parse().map_err(|e: CdrError| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "a3s-cdr failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>, backend: Option<Backend>) -> Result<CdrConfig> {
    let mut config = match path {
        Some(path) => CdrConfig::from_file(path)?,
        None => CdrConfig::from_env()?,
    };
    if let Some(backend) = backend {
        config.backend = backend;
        config.validate()?;
    }
    Ok(config)
}

async fn read_payload(event: &Path) -> Result<Vec<u8>> {
    if event == Path::new("-") {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        Ok(buf)
    } else {
        Ok(tokio::fs::read(event).await?)
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::CheckConfig => {
            let config = load_config(cli.config.as_deref(), None)?;
            println!("{}", serde_json::to_string_pretty(&summary(&config)?)?);
            Ok(())
        }
        Commands::Process {
            event,
            root,
            destination_root,
            backend,
        } => {
            let config = load_config(cli.config.as_deref(), backend)?;
            let payload = parse_payload(&read_payload(&event).await?)?;

            // The same directory given twice is one store
            let destination_root = destination_root.filter(|dir| *dir != root);
            let source: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(root));
            let destination: Arc<dyn ObjectStore> = match destination_root {
                Some(dir) => Arc::new(FsObjectStore::new(dir)),
                None => source.clone(),
            };
            let client = Arc::new(HttpCdrClient::new(&config)?);
            let pipeline = ProtectPipeline::from_config(&config, source, destination, client)
                .map_err(|e| match e {
                    CdrError::Config(msg) if matches!(config.backend, Backend::Azure) => {
                        CdrError::Config(format!("{} (pass --destination-root)", msg))
                    }
                    other => other,
                })?;
            let adapter = adapter_for(config.backend);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, cancelling");
                    on_signal.cancel();
                }
            });

            let reports = pipeline.handle(adapter.as_ref(), &payload, &cancel).await?;
            if reports.is_empty() {
                tracing::info!("No supported events in payload");
            }
            for report in reports {
                println!("{}", serde_json::to_string(&report)?);
            }
            Ok(())
        }
    }
}

/// Non-secret view of the effective configuration
fn summary(config: &CdrConfig) -> Result<serde_json::Value> {
    let options = config.request_options();
    Ok(serde_json::json!({
        "backend": config.backend,
        "endpoint": HttpCdrClient::new(config)?.endpoint().as_str(),
        "username": config.endpoint.username,
        "sendPolicy": options.send_policy,
        "destination": config.destination_policy()?,
        "transportFailure": config.transport_failure,
        "maxRetries": config.max_retries,
        "fallbackDelaySecs": config.fallback_delay_secs,
    }))
}
