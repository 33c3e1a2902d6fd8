use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use confab::context::SystemPolicy;
use confab::engine::{SendOptions, DEFAULT_USER};
use confab::llm::stream::StreamEnd;
use confab::{ChatEngine, Config, Sessions, Store};

#[derive(Parser)]
#[command(name = "confab", version)]
#[command(about = "Self-hosted AI chat backend with conversation history and document-grounded answers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen address, overriding CONFAB_ADDR
        #[arg(long)]
        addr: Option<String>,
    },

    /// Ask one question from the terminal, streaming the reply to stdout
    Ask {
        message: String,

        #[arg(long, default_value = DEFAULT_USER)]
        user: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Files to ingest as retrieval context before asking
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Keep answers short
        #[arg(long)]
        concise: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("confab=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("configuration error")?;

    let store = Arc::new(Store::open(&config.db_path).context("failed to open database")?);
    let sessions = Arc::new(Sessions::new());
    let addr = config.addr.clone();
    let engine = Arc::new(ChatEngine::new(store, sessions, config));

    match cli.command {
        Commands::Serve { addr: override_addr } => {
            confab::server::serve(engine, &override_addr.unwrap_or(addr)).await
        }
        Commands::Ask {
            message,
            user,
            conversation,
            files,
            concise,
        } => ask(engine, message, user, conversation, files, concise).await,
    }
}

async fn ask(
    engine: Arc<ChatEngine>,
    message: String,
    user: String,
    conversation: Option<String>,
    files: Vec<PathBuf>,
    concise: bool,
) -> Result<()> {
    if !files.is_empty() {
        let mut uploads = Vec::with_capacity(files.len());
        for path in &files {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            uploads.push((name, bytes));
        }
        let summary = engine.sessions().ingest(&user, &uploads);
        eprintln!(
            "ingested {} file(s) into {} chunk(s)",
            summary.documents.len(),
            summary.chunks
        );
    }

    let opts = SendOptions {
        user,
        conversation_id: conversation,
        message,
        policy: SystemPolicy {
            concise,
            ..SystemPolicy::default()
        },
        ..SendOptions::default()
    };

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(delta) = rx.recv().await {
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        }
    });

    let result = engine.send_message(opts, tx).await?;
    let _ = printer.await;
    println!();

    match &result.end {
        StreamEnd::Completed => {}
        StreamEnd::Interrupted(reason) => {
            eprintln!("stream interrupted ({reason}); partial reply was saved");
        }
        StreamEnd::Superseded => eprintln!("stream was superseded"),
    }
    eprintln!("conversation: {}", result.conversation_id);
    Ok(())
}
