use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::StreamExt;
use indian_tax_advisor::api::{self, AppState};
use indian_tax_advisor::commands::{print_sources, CommandHandler, Flow};
use indian_tax_advisor::config::AppConfig;
use indian_tax_advisor::database::connect_vector_store;
use indian_tax_advisor::document::generate_library;
use indian_tax_advisor::llm::{build_embedder, ChatEngine, Retriever};
use indian_tax_advisor::pipeline::{wipe_database, Pipeline, PipelineError, WipeOutcome, WIPE_CONFIRMATION};
use indian_tax_advisor::providers::FallbackProvider;
use indian_tax_advisor::web_crawler::{default_sources, load_sources};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Ask questions about Indian tax law", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive chat (default)
    Chat {
        #[arg(long)]
        no_stream: bool,
        #[arg(long)]
        show_sources: bool,
    },
    /// Answer a single question and exit
    Ask {
        question: String,
        #[arg(long)]
        show_sources: bool,
    },
    /// Scrape the tax sites and index what was fetched
    Scrape {
        /// JSON file with [{"title": ..., "url": ...}]
        #[arg(long)]
        sources: Option<PathBuf>,
    },
    /// Index every .txt/.md file in a directory
    Index {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Write the built-in library of tax sections to disk
    Seed {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Delete every vector in the collection
    Reset {
        #[arg(long)]
        yes: bool,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "3000")]
        port: u16,
    },
    /// Show what is in the knowledge base
    Stats,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        eprintln!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::from_env()?;

    let command = args.command.unwrap_or(Command::Chat { no_stream: false, show_sources: false });
    match command {
        Command::Seed { dir } => {
            let dir = dir.unwrap_or_else(|| config.data_dir.clone());
            let written = generate_library(&dir)?;
            println!("{} {} files written to {}", "✅".green(), written.len(), dir.display());
            Ok(())
        }
        Command::Chat { no_stream, show_sources } => {
            let (provider, retriever) = prepare_chat(&config).await?;
            let engine = ChatEngine::from_config(Box::new(provider), retriever.clone(), &config);
            run_repl(CommandHandler::new(engine, retriever, !no_stream, show_sources)).await
        }
        Command::Ask { question, show_sources } => {
            let (provider, retriever) = prepare_chat(&config).await?;
            let mut engine = ChatEngine::from_config(Box::new(provider), retriever, &config);
            let streaming = engine.stream_chat(&question).await?;
            let mut tokens = streaming.tokens;
            while let Some(token) = tokens.next().await {
                print!("{}", token?);
                let _ = std::io::stdout().flush();
            }
            println!();
            if show_sources {
                print_sources(&streaming.source_nodes);
            }
            Ok(())
        }
        Command::Scrape { sources } => {
            let sources = match sources {
                Some(path) => load_sources(&path)?,
                None => default_sources(),
            };
            let pipeline = Pipeline::new(build_retriever(&config).await?, &config)?;
            match pipeline.run_pipeline(&sources).await {
                Ok(report) => {
                    println!(
                        "{} Scraped {} of {} pages, stored {} chunks in '{}'",
                        "✅".green(),
                        report.scraped,
                        sources.len(),
                        report.chunks,
                        config.collection_name
                    );
                    Ok(())
                }
                Err(PipelineError::NoData) => {
                    println!("{}", "❌ No data scraped.".red());
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Index { dir } => {
            let dir = dir.unwrap_or_else(|| config.data_dir.clone());
            let pipeline = Pipeline::new(build_retriever(&config).await?, &config)?;
            let stored = pipeline.index_directory(&dir).await?;
            println!("{} Stored {} chunks from {}", "✅".green(), stored, dir.display());
            Ok(())
        }
        Command::Reset { yes } => reset(&config, yes).await,
        Command::Serve { port } => {
            let (provider, retriever) = prepare_chat(&config).await?;
            let state = AppState::new(
                Box::new(provider),
                retriever,
                config.memory_token_limit,
                config.similarity_top_k,
            );
            api::serve(state, port).await
        }
        Command::Stats => {
            let retriever = build_retriever(&config).await?;
            println!("Backend:    {}", retriever.store().backend().cyan());
            println!("Collection: {}", retriever.collection().cyan());
            println!("Vectors:    {}", retriever.count().await?.to_string().cyan());
            println!("Embeddings: {}", retriever.model_id().cyan());
            Ok(())
        }
    }
}

async fn build_retriever(config: &AppConfig) -> anyhow::Result<Retriever> {
    let embedder = build_embedder(config)?;
    let store = connect_vector_store(config).await?;
    log::info!(
        "Using {} store, collection '{}', {}-dim embeddings",
        store.backend(),
        config.collection_name,
        embedder.dimension()
    );
    Ok(Retriever::new(store, embedder, &config.collection_name))
}

/// Providers and retriever for answering questions. An empty knowledge base
/// is filled from the data directory first; without one there is nothing to
/// answer from.
async fn prepare_chat(config: &AppConfig) -> anyhow::Result<(FallbackProvider, Retriever)> {
    config.require_google_key()?;
    let retriever = build_retriever(config).await?;

    let pipeline = Pipeline::new(retriever.clone(), config)?;
    if let Some(stored) = pipeline.ensure_indexed(&config.data_dir).await? {
        println!(
            "{} Knowledge base was empty; indexed {} chunks from {}",
            "✅".green(),
            stored,
            config.data_dir.display()
        );
    }

    let provider = FallbackProvider::from_config(config).await?;
    log::info!("Providers: {}", provider.provider_names().join(" -> "));
    Ok((provider, retriever))
}

async fn reset(config: &AppConfig, yes: bool) -> anyhow::Result<()> {
    let store = connect_vector_store(config).await?;

    let confirm = if yes {
        WIPE_CONFIRMATION.to_string()
    } else {
        println!(
            "{}",
            format!(
                "⚠️  This deletes every vector in '{}'. Type {} to confirm:",
                config.collection_name, WIPE_CONFIRMATION
            )
            .yellow()
        );
        let mut rl = Editor::<(), DefaultHistory>::new()?;
        typed_confirmation(rl.readline("> "))?
    };

    match wipe_database(store.as_ref(), &config.collection_name, &confirm).await? {
        WipeOutcome::Aborted => println!("Aborted. Nothing was deleted."),
        WipeOutcome::NotFound => println!("Index not found. Nothing to delete."),
        WipeOutcome::Wiped { remaining } => {
            println!("{} Database wiped. Vectors remaining: {}", "✅".green(), remaining)
        }
    }
    Ok(())
}

/// What was typed at the wipe prompt. Ctrl-C and Ctrl-D count as "no".
fn typed_confirmation(input: Result<String, ReadlineError>) -> Result<String, ReadlineError> {
    match input {
        Ok(line) => Ok(line.trim().to_string()),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(String::new()),
        Err(err) => Err(err),
    }
}

async fn run_repl(mut handler: CommandHandler) -> anyhow::Result<()> {
    handler.greet();
    println!("{}", "Type 'help' for commands.".dimmed());

    let mut rl = Editor::<(), DefaultHistory>::new()?;

    loop {
        match rl.readline("👤 ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);

                match handler.handle_command(input).await {
                    Ok(Flow::Exit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("{}", e.red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}
