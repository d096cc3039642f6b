//! procedex: command-line front-end
//!
//! Resolves procedures against the eRegulations API and prints JSON.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use procedex::{Config, EntityKind, ProcedexBuilder};
use serde::Serialize;

static VERSION: LazyLock<String> = LazyLock::new(procedex::version::version_string);

/// Procedure index & cache resolution engine
#[derive(Parser)]
#[command(name = "procedex")]
#[command(version = VERSION.as_str())]
#[command(about = "Query eRegulations procedures through a cached keyword index")]
struct Args {
    /// Config file (default: ~/.procedex/config.toml, then /etc/procedex/config.toml)
    #[arg(short, long, env = "PROCEDEX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one entity by kind and id
    Lookup {
        /// procedure, steps, requirements, costs or institution
        kind: EntityKind,
        id: u64,
    },

    /// Resolve the procedure a page link points at
    Url { url: String },

    /// Show one step of a procedure
    Step { id: u64, step_id: u64 },

    /// Index procedures, then search them by keyword
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
        /// Procedure ids to index before searching
        #[arg(short, long, value_delimiter = ',')]
        index: Vec<u64>,
    },

    /// Build the keyword index and print the build summary
    Index {
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Answer a question about one procedure
    Ask {
        id: u64,
        /// Question (or omit to read from stdin)
        question: Option<String>,
    },

    /// Route and answer a free-form request
    Query {
        /// Request text (or omit to read from stdin)
        text: Option<String>,
        /// Procedure ids to index first, for keyword requests
        #[arg(short, long, value_delimiter = ',')]
        index: Vec<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr (default: warn; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    config.validate()?;
    let engine = ProcedexBuilder::from_config(&config).build()?;
    let resolver = engine.resolver();

    match args.command {
        Command::Lookup { kind, id } => {
            print_json(&resolver.lookup_by_id(kind, id).await?)?;
        }

        Command::Url { url } => {
            print_json(&resolver.lookup_by_url(&url).await?)?;
        }

        Command::Step { id, step_id } => match resolver.step_details(id, step_id).await? {
            Some(detail) => print_json(&detail)?,
            None => {
                return Err(
                    format!("step {step_id} not found for procedure with ID {id}").into(),
                );
            }
        },

        Command::Search {
            query,
            limit,
            index,
        } => {
            if !index.is_empty() {
                engine.index_builder().build_all(&index).await;
            }
            print_json(&resolver.search_by_keyword(&query, limit).await?)?;
        }

        Command::Index { ids } => {
            let summary = engine.index_builder().build_all(&ids).await;
            print_json(&summary)?;
        }

        Command::Ask { id, question } => {
            let question = resolve_text(question, "ask")?;
            print_json(&resolver.answer_about_procedure(id, &question).await?)?;
        }

        Command::Query { text, index } => {
            let text = resolve_text(text, "query")?;
            if !index.is_empty() {
                engine.index_builder().build_all(&index).await;
            }
            print_json(&resolver.handle_query(&text).await?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
