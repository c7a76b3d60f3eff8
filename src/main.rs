use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_sql_assistant::assistant::{Assistant, ExecutionOutcome};
use ledger_sql_assistant::config::AssistantConfig;
use ledger_sql_assistant::web;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ledger-sql")]
#[command(about = "Ask questions about the sales, expense and dimension warehouse in plain English")]
#[command(version)]
struct Args {
    /// JSON config file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question and print the SQL and its rows
    Ask {
        /// The question in natural language
        question: String,

        /// Also write the rows to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Stop after SQL validation
        #[arg(long)]
        no_execute: bool,
    },
    /// Serve the web form and JSON API
    Serve {
        /// Port (default: from config or PORT, else 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AssistantConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Commands::Ask {
            question,
            csv,
            no_execute,
        } => run_ask(&config, &question, csv, !no_execute).await,
        Commands::Serve { port } => {
            let assistant = Assistant::from_config(&config)?;
            let port = port.unwrap_or(config.server.port);
            web::start_server(assistant, &config.server.host, port).await?;
            Ok(())
        }
    }
}

async fn run_ask(config: &AssistantConfig, question: &str, csv: Option<PathBuf>, execute: bool) -> Result<()> {
    let assistant = Assistant::from_config(config)?;
    let answer = assistant.ask(question, execute).await?;

    let routed: Vec<&str> = answer.routed.iter().map(|d| d.as_str()).collect();
    println!("Agents: {}", if routed.is_empty() { "none".to_string() } else { routed.join(", ") });
    println!("\nDraft SQL:\n{}", answer.draft_sql.trim());
    println!("\nValidated SQL:\n{}", answer.sql);
    println!();

    match &answer.outcome {
        ExecutionOutcome::Rows {
            result,
            execution_time_ms,
        } => {
            println!("{}", result.render_table(50));
            println!("{} ({:.1} ms)", result.summary(), execution_time_ms);
            if let Some(path) = csv {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                result.write_csv(file)?;
                println!("Rows written to {}", path.display());
            }
        }
        ExecutionOutcome::Failed { error } => println!("{}", error),
        ExecutionOutcome::NoQuery { reason } => println!("{}", reason),
        ExecutionOutcome::Skipped => {
            if execute {
                println!("Query not executed: no database configured");
            }
        }
    }
    Ok(())
}
