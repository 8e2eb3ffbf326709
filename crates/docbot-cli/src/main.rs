use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docbot_core::{AppConfig, Answerer};
use docbot_server::state::AppState;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod wiring;

use wiring::Components;

#[derive(Parser)]
#[command(name = "docbot", version, about = "Telegram document question-answering bot")]
struct Cli {
    #[arg(long, short = 'c', help = "Optional YAML config file; environment variables override it")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the webhook HTTP server")]
    Serve {
        #[arg(long, help = "Listen address, overrides BIND_ADDR")]
        bind: Option<String>,
    },
    #[command(about = "Extract documents, embed them and publish the index")]
    BuildIndex,
    #[command(about = "Make sure the document and index buckets exist")]
    InitBuckets,
    #[command(about = "Buckets, index build and a smoke query in one go")]
    Initialize,
    #[command(about = "Answer one question from the command line")]
    Ask {
        #[arg(help = "Question text")]
        question: String,
    },
    #[command(about = "Print the normalized form of a text file (stdin when omitted)")]
    Normalize {
        #[arg(help = "Input file")]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let log_dir = config.index.cache_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "docbot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            let addr = config.server.socket_addr()?.to_string();
            let components = Components::from_config(config);
            let state = AppState::new(components.dispatcher()?);
            docbot_server::serve(state, &addr).await?;
        }
        Commands::BuildIndex => {
            let components = Components::from_config(config);
            let report = components.index_builder().build().await;
            print_json(&report)?;
            anyhow::ensure!(report.status, "index build failed: {}", report.message);
        }
        Commands::InitBuckets => {
            let components = Components::from_config(config);
            let status = components.bootstrap().ensure_buckets().await;
            print_json(&status)?;
            anyhow::ensure!(status.values().all(|ok| *ok), "some buckets are unavailable");
        }
        Commands::Initialize => {
            let components = Components::from_config(config);
            let report = components.bootstrap().run().await;
            print_json(&report)?;
            anyhow::ensure!(report.success, "{}", report.message);
        }
        Commands::Ask { question } => {
            let components = Components::from_config(config);
            let result = components.rag_pipeline().answer(&question).await;
            print_json(&result)?;
            anyhow::ensure!(
                result.is_success(),
                "query failed with status {}",
                result.status_code
            );
        }
        Commands::Normalize { path } => {
            let raw = match path {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            println!("{}", docbot_index::normalize(&raw));
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
