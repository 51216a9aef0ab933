mod config;
mod error;

use std::io::{self, Write};
use std::path::PathBuf;
use std::pin::pin;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use runtime::{Chunk, Client, ConversationHistory, ModelBackend, QueryError};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::{Config, DEFAULT_CONFIG};
use error::{Error, Result};

type Input = Lines<BufReader<Stdin>>;

#[derive(Parser)]
#[command(name = "mcpclient")]
#[command(about = "Chat with a language model that can use the tools of an MCP server", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Server to connect to
    #[arg(short, long)]
    server: Option<String>,

    /// Model provider (openai, anthropic, gemini)
    #[arg(long)]
    provider: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Model calls allowed per query
    #[arg(long)]
    max_turns: Option<usize>,

    /// Wait for whole responses instead of streaming
    #[arg(long)]
    no_stream: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// Run a single query and exit
    Ask {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// List configured servers
    Servers,
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    tracing::debug!(path = %cli.config.display(), "loaded config");

    if let Some(Commands::Servers) = cli.command {
        for name in config.server_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let settings = config.backend_settings(cli.provider.as_deref(), cli.model.as_deref())?;
    let mut orchestrator = config.orchestrator_config();
    if let Some(max_turns) = cli.max_turns {
        orchestrator.max_turns = max_turns;
    }
    if cli.no_stream {
        orchestrator.streaming = false;
    }

    let mut client = Client::new(ModelBackend::new(settings), config.servers()?)
        .with_session_options(config.session_options())
        .with_config(orchestrator);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let server = match cli.server {
        Some(name) => name,
        None => select_server(&client.server_names(), &mut input).await?,
    };
    println!("Connecting to server: {server}");
    client.connect(&server).await?;

    let result = match cli.command {
        Some(Commands::Ask { query }) => match run_query(&client, &query.join(" ")).await? {
            Some(e) => Err(e.into()),
            None => Ok(()),
        },
        _ => chat(&mut client, &mut input).await,
    };

    client.disconnect().await;
    result
}

async fn prompt(text: &str, input: &mut Input) -> Result<Option<String>> {
    print!("{text}");
    io::stdout().flush()?;
    Ok(input.next_line().await?)
}

/// Pick a server: the only one, or the user's choice by number or name.
async fn select_server(servers: &[&str], input: &mut Input) -> Result<String> {
    if let [only] = servers {
        println!("Only one server available, selecting: {only}");
        return Ok(only.to_string());
    }

    println!("\nAvailable servers:");
    for (i, name) in servers.iter().enumerate() {
        println!("{}. {name}", i + 1);
    }

    loop {
        let Some(line) = prompt("\nSelect a server (number or name): ", input).await? else {
            return Err(Error::NoServerSelected);
        };
        let choice = line.trim();
        if let Ok(n) = choice.parse::<usize>() {
            match n.checked_sub(1).and_then(|i| servers.get(i)) {
                Some(name) => return Ok(name.to_string()),
                None => println!("Invalid selection. Please choose a valid number."),
            }
        } else if servers.contains(&choice) {
            return Ok(choice.to_string());
        } else {
            println!("Server not found. Please enter a valid server name or number.");
        }
    }
}

async fn chat(client: &mut Client<ModelBackend>, input: &mut Input) -> Result<()> {
    println!("mcpclient v{}", env!("CARGO_PKG_VERSION"));
    println!("Connected to server: {}", client.active_server().unwrap_or("-"));
    println!("Model: {}", client.model());
    println!("Commands: servers, connect <name>, tools, debug, quit.");
    println!("Ctrl+C cancels a running query; Ctrl+D exits.");

    loop {
        let line = tokio::select! {
            line = prompt("\n> ", input) => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let query = line.trim();
        match query {
            "" => continue,
            "quit" | "exit" => break,
            "servers" => {
                let active = client.active_server();
                for (i, name) in client.server_names().into_iter().enumerate() {
                    let marker = if Some(name) == active { " (active)" } else { "" };
                    println!("{}. {name}{marker}", i + 1);
                }
            }
            "tools" => match client.tools() {
                Ok(catalog) => {
                    for tool in catalog.iter() {
                        println!("- {}: {}", tool.name, tool.description);
                    }
                }
                Err(e) => eprintln!("Error: {e}"),
            },
            "debug" => print_debug(client),
            _ => {
                if let Some(name) = query.strip_prefix("connect ") {
                    let name = name.trim();
                    println!("Connecting to server '{name}'...");
                    match client.connect(name).await {
                        Ok(catalog) => println!("Connected to '{name}' ({} tools)", catalog.len()),
                        Err(e) => eprintln!("Error: {e}"),
                    }
                    continue;
                }

                if let Some(e) = run_query(client, query).await? {
                    eprintln!("\nError: {e}");
                }
            }
        }
    }

    println!("\nGoodbye.");
    Ok(())
}

fn print_debug(client: &Client<ModelBackend>) {
    let session = client.session();
    println!("Server: {}", client.active_server().unwrap_or("-"));
    println!("Session: {}", session.state());
    if let Some(info) = session.server_info() {
        println!(
            "Server info: {} {}",
            info.name,
            info.version.as_deref().unwrap_or("")
        );
    }
    println!("Model: {}", client.model());
    let config = client.config();
    println!(
        "Max turns: {}, streaming: {}",
        config.max_turns, config.streaming
    );
    if let Ok(catalog) = client.tools() {
        println!("Tools: {}", catalog.names().join(", "));
    }
}

/// Stream one query to stdout. Returns the error that ended it, if any.
async fn run_query(client: &Client<ModelBackend>, query: &str) -> Result<Option<QueryError>> {
    let mut history = ConversationHistory::new(query);
    let cancel = CancellationToken::new();
    let mut chunks = pin!(client.query(&mut history, cancel.clone()));
    let mut stdout = io::stdout();
    let mut failure = None;

    loop {
        let chunk = tokio::select! {
            chunk = chunks.next() => chunk,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                continue;
            }
        };
        match chunk {
            Some(Chunk::Error(e)) => failure = Some(e),
            Some(chunk) => {
                print!("{chunk}");
                stdout.flush()?;
            }
            None => break,
        }
    }

    println!();
    Ok(failure)
}
