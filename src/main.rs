use std::{
    io::{self, Write},
    net::SocketAddr,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use nerd_research_agent::{
    config::{NotesConfig, ProviderConfig, ServerConfig},
    documents::extract_pdf_text,
    notes::save_notes,
    prompts::{summary_prompt, Depth, RESEARCH_SYSTEM_PROMPT},
    provider::Dispatcher,
    report::{echo_fragment, run_research},
    session::ResearchSession,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nerd", version, about = "Multi-provider research assistant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research a topic and stream the answer
    Research {
        topic: String,
        #[arg(long, value_enum, default_value_t = Depth::Standard)]
        depth: Depth,
        /// Shorthand for --depth deep
        #[arg(long)]
        deep: bool,
        /// Save the answer as JSON notes
        #[arg(long)]
        save: bool,
    },
    /// Interactive multi-turn research session
    Chat,
    /// Extract a PDF and ask for a structured summary
    Summarize {
        path: PathBuf,
        #[arg(long, default_value = "document")]
        doc_type: String,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Show the resolved provider configuration
    Provider,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nerd_research_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Research {
            topic,
            depth,
            deep,
            save,
        } => {
            let depth = if deep { Depth::Deep } else { depth };
            research(&topic, depth, save).await
        }
        Command::Chat => chat().await,
        Command::Summarize { path, doc_type } => summarize(&path, &doc_type).await,
        Command::Serve { addr } => serve(addr).await,
        Command::Provider => {
            print!("{}", ProviderConfig::from_env().describe());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn research(topic: &str, depth: Depth, save: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = ProviderConfig::from_env();
    let dispatcher = Dispatcher::from_env();
    let mut stdout = io::stdout();
    let outcome = run_research(&dispatcher, &config, topic, depth, &mut stdout).await?;

    if !outcome.succeeded() {
        return Ok(ExitCode::FAILURE);
    }
    if save {
        let notes = NotesConfig::from_env();
        let path = save_notes(&notes.output_dir, topic, &outcome.text, &[])?;
        println!("Saved to: {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

async fn chat() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = ProviderConfig::from_env();
    print!("{}", config.describe());
    println!("Ask a question, prefix with /discover for Big Discovery Mode, /quit to exit.");

    let mut session = ResearchSession::new(config, Dispatcher::from_env());
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }

        let print_fragment = |fragment: &str| echo_fragment(&mut io::stdout(), fragment);
        let result = match line.strip_prefix("/discover ") {
            Some(question) => session.discover(question.trim(), print_fragment).await,
            None => session.ask(line, print_fragment).await,
        };
        match result {
            Ok(_) => println!("\n"),
            Err(error) => println!("\nError: {error}\n"),
        }
    }

    info!(turns = session.history().len(), "research session closed");
    Ok(ExitCode::SUCCESS)
}

async fn summarize(path: &Path, doc_type: &str) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let text = extract_pdf_text(path)?;
    if text.is_empty() {
        println!("No extractable text in {}", path.display());
        return Ok(ExitCode::FAILURE);
    }

    let config = ProviderConfig::from_env();
    let dispatcher = Dispatcher::from_env();
    let prompt = summary_prompt(&text, doc_type);
    let mut fragments = match dispatcher.stream(&prompt, RESEARCH_SYSTEM_PROMPT, &config).await {
        Ok(fragments) => fragments,
        Err(error) => {
            println!("Error: {error}");
            return Ok(ExitCode::FAILURE);
        }
    };

    while let Some(next) = fragments.next().await {
        match next {
            Ok(fragment) => {
                print!("{fragment}");
                io::stdout().flush()?;
            }
            Err(error) => {
                println!("\nError: {error}");
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    println!();
    Ok(ExitCode::SUCCESS)
}

async fn serve(addr: Option<SocketAddr>) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let addr = addr.unwrap_or(ServerConfig::from_env().addr);
    let state = nerd_research_agent::build_state();
    let app = nerd_research_agent::build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "research agent listening");

    axum::serve(listener, app).await?;
    Ok(ExitCode::SUCCESS)
}
