mod config;
use clap::{Parser, Subcommand};
use config::{Config, parse_override};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod server;
use anyhow::Context;
use omics_quilt_core::ResourceLocator;
use omics_quilt_core::operations::{
    RenderManifestOperation, RenderManifestOperationRequest, SubmitRunOperationResult,
};
use server::{AppState, run_server};

#[derive(Parser)]
#[command(name = "omics-quilt")]
#[command(about = "Submits genomics workflow runs for sample manifests dropped into storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one storage event read from a JSON file
    Handle {
        /// Path to the event JSON
        #[arg(short, long)]
        event: String,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,

        /// Context override, KEY=VALUE (repeatable)
        #[arg(long = "set", value_parser = parse_override)]
        overrides: Vec<(String, String)>,
    },
    /// Accept storage events over HTTP
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: String,

        /// Context override, KEY=VALUE (repeatable)
        #[arg(long = "set", value_parser = parse_override)]
        overrides: Vec<(String, String)>,
    },
    /// Render a region-specific sample manifest from a template
    RenderManifest {
        /// Template manifest (local path or s3:// URI)
        #[arg(short, long)]
        template: String,

        #[arg(short, long)]
        region: String,

        /// Defaults to the current time
        #[arg(long)]
        timestamp: Option<String>,

        /// Defaults to the template's directory
        #[arg(short, long)]
        out_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omics_quilt=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Handle {
            event,
            config,
            overrides,
        } => handle(&event, config.as_deref(), &overrides).await,
        Commands::Serve { config, overrides } => serve(&config, &overrides).await,
        Commands::RenderManifest {
            template,
            region,
            timestamp,
            out_dir,
        } => render_manifest(template, region, timestamp, out_dir).await,
    };

    if let Err(error) = outcome {
        tracing::error!("{:#}", error);
        std::process::exit(1);
    }
}

async fn handle(
    event_path: &str,
    config_path: Option<&str>,
    overrides: &[(String, String)],
) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).context("failed to load config")?;

    let raw = tokio::fs::read(event_path)
        .await
        .with_context(|| format!("failed to read event {}", event_path))?;
    let event: serde_json::Value = serde_json::from_slice(&raw)
        .with_context(|| format!("event {} is not valid JSON", event_path))?;

    let state = AppState::from_config(&cfg, overrides).await?;
    let result = state.invoke(event).await?;
    tracing::info!(
        "Submitted {} run(s) for {}",
        result.runs.len(),
        result.manifest_uri
    );

    println!("{}", SubmitRunOperationResult::success_marker());
    Ok(())
}

async fn serve(config_path: &str, overrides: &[(String, String)]) -> anyhow::Result<()> {
    tracing::info!("Starting Omics Quilt intake with config: {}", config_path);
    let cfg = Config::from_file(config_path).context("failed to load config")?;

    tracing::info!(
        "Bind: {}, runner: {}, notify: {}",
        cfg.bind_addr,
        cfg.runner_endpoint().unwrap_or("disabled"),
        cfg.notify_endpoint().unwrap_or("disabled")
    );

    run_server(cfg, overrides).await?;
    Ok(())
}

async fn render_manifest(
    template: String,
    region: String,
    timestamp: Option<String>,
    out_dir: Option<String>,
) -> anyhow::Result<()> {
    let locator = ResourceLocator::new().with_region(region.clone());
    let result = RenderManifestOperation::new(locator)
        .run(RenderManifestOperationRequest {
            template,
            region,
            timestamp,
            out_dir,
        })
        .await?;

    println!("{}", result.destination);
    Ok(())
}
