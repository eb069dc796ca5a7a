//! FloatChat CLI
//!
//! Ask natural-language questions about Argo float data:
//! - `ask`: answer one question and print the JSON outcome
//! - `plan`: parse raw planning-model output into a typed plan
//! - `serve`: run the HTTP API

use std::io::{self, Read};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use floatchat_cli::app::build_engine;
use floatchat_cli::server::{serve, ServerState};
use floatchat_cli::settings::Settings;
use floatchat_query::plan::parse_plan_report;
use floatchat_query::{error_body, QueryRequest};

#[derive(Parser)]
#[command(name = "floatchat")]
#[command(author, version, about = "FloatChat: natural-language queries over Argo float data")]
struct Cli {
    /// Default log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question
    Ask {
        /// The question
        prompt: String,
        /// Where the user is asking from
        #[arg(long)]
        location: Option<String>,
        /// Pretty-print the JSON outcome
        #[arg(long)]
        pretty: bool,
    },
    /// Parse raw planning output (use `-` for stdin)
    Plan {
        text: String,
    },
    /// Run the HTTP API
    Serve {
        /// Address to bind (overrides FLOATCHAT_LISTEN)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    floatchat_cli::init_tracing(&cli.log_level);

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Ask {
            prompt,
            location,
            pretty,
        } => cmd_ask(prompt, location, pretty).await,
        Commands::Plan { text } => cmd_plan(&text),
        Commands::Serve { listen } => cmd_serve(listen).await,
    }
}

async fn cmd_ask(prompt: String, location: Option<String>, pretty: bool) -> Result<ExitCode> {
    let settings = Settings::from_env()?;
    let engine = build_engine(&settings).await?;
    let request = QueryRequest {
        user_prompt: prompt,
        location,
    };

    let (value, ok) = match engine.answer_request(&request).await {
        Ok(outcome) => (serde_json::to_value(&outcome)?, !outcome.is_error()),
        Err(e) => (error_body(&e), false),
    };
    let text = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{text}");
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn cmd_plan(text: &str) -> Result<ExitCode> {
    let raw = if text == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| anyhow!("failed to read stdin: {e}"))?;
        buf
    } else {
        text.to_string()
    };

    match parse_plan_report(&raw) {
        Ok(report) => {
            for name in &report.dropped {
                eprintln!("{} unsupported call `{name}`", "dropped:".yellow());
            }
            if report.plan.is_empty() {
                eprintln!("{}", "plan is empty; execution would report no data".yellow());
            }
            println!("{}", serde_json::to_string_pretty(&report.plan)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{} {e}", "plan error:".red().bold());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_serve(listen: Option<SocketAddr>) -> Result<ExitCode> {
    let settings = Settings::from_env()?;
    let listen = listen.unwrap_or(settings.listen);
    let engine = build_engine(&settings).await?;
    let state = Arc::new(ServerState {
        engine,
        cors: settings.cors.clone(),
    });
    serve(listen, state).await?;
    Ok(ExitCode::SUCCESS)
}
