//! sqlscribe — the CLI.
//!
//! # Usage
//!
//! ```bash
//! # Generate the receiving-report SQL and print it
//! sqlscribe
//!
//! # Also run the generated query and print the rows
//! sqlscribe --execute
//!
//! # Show what the model would be asked, without calling it
//! sqlscribe prompt
//!
//! # Dump the introspected schema text
//! sqlscribe schema
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;
use serde_json::Value;

use sqlscribe::config::{Config, Overrides};
use sqlscribe::db::Record;
use sqlscribe::llm::OpenAiClient;
use sqlscribe::report;

#[derive(Parser)]
#[command(name = "sqlscribe")]
#[command(version)]
#[command(about = "Ask the model to write your report SQL", long_about = None)]
#[command(after_help = "ENVIRONMENT:
    Every flag below falls back to the environment variable named next to
    it; a .env file in the working directory is loaded first.")]
struct Cli {
    /// SSH jump host
    #[arg(long, env = "SQLSCRIBE_SSH_HOST")]
    ssh_host: Option<String>,

    /// SSH port
    #[arg(long, env = "SQLSCRIBE_SSH_PORT")]
    ssh_port: Option<u16>,

    /// SSH username
    #[arg(long, env = "SQLSCRIBE_SSH_USERNAME")]
    ssh_username: Option<String>,

    /// Path to the SSH private key
    #[arg(long, env = "SQLSCRIBE_SSH_KEY_PATH")]
    ssh_key_path: Option<PathBuf>,

    /// Database host as seen from the jump host
    #[arg(long, env = "SQLSCRIBE_DB_HOST")]
    db_host: Option<String>,

    /// Database port as seen from the jump host
    #[arg(long, env = "SQLSCRIBE_DB_PORT")]
    db_port: Option<u16>,

    /// Database username
    #[arg(long, env = "SQLSCRIBE_DB_USERNAME")]
    db_username: Option<String>,

    /// Database password
    #[arg(long, env = "SQLSCRIBE_DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// Database name (defaults to the database username)
    #[arg(long, env = "SQLSCRIBE_DB_NAME")]
    db_name: Option<String>,

    /// Model API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model to use
    #[arg(long, env = "SQLSCRIBE_MODEL")]
    model: Option<String>,

    /// Chat-completions base URL
    #[arg(long, env = "SQLSCRIBE_OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Config file path (default: ~/.config/sqlscribe/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Execute the generated SQL and print the rows
    #[arg(long)]
    execute: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the introspected schema text for the allow-listed tables
    Schema,
    /// Print the fully rendered prompt without calling the model
    Prompt,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "sqlscribe=info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        ssh_host: cli.ssh_host,
        ssh_port: cli.ssh_port,
        ssh_username: cli.ssh_username,
        ssh_key_path: cli.ssh_key_path,
        db_host: cli.db_host,
        db_port: cli.db_port,
        db_username: cli.db_username,
        db_password: cli.db_password,
        db_name: cli.db_name,
        api_key: cli.api_key,
        model: cli.model,
        base_url: cli.base_url,
        ..Default::default()
    };
    let config = Config::load(cli.config.as_deref(), overrides)?;

    match cli.command {
        Some(Commands::Schema) => {
            let schema = report::introspect(&config).await?;
            println!("{}", schema);
        }
        Some(Commands::Prompt) => {
            let prompt = report::rendered_prompt(&config).await?;
            println!("{}", prompt);
        }
        None => {
            let client = OpenAiClient::new(config.model.clone())?;
            if cli.verbose {
                println!(
                    "{} {}",
                    "Model:".dimmed(),
                    client.model().yellow()
                );
            }

            let output = report::run(&config, &client, cli.execute).await?;

            println!("{}", "Generated SQL:".green().bold());
            println!("{}", output.sql);

            if let Some(rows) = output.rows {
                println!();
                print_table(&rows);
            }
        }
    }

    Ok(())
}

fn print_table(rows: &[Record]) {
    if rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    let columns: Vec<&String> = rows[0].iter().map(|(name, _)| name).collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in rows {
        for (i, (_, value)) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(val_to_string(value).len());
            }
        }
    }

    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, (_, value))| format!("{:width$}", val_to_string(value), width = widths[i]))
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", rows.len().to_string().cyan());
}

fn val_to_string(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}
