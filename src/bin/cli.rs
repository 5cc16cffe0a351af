//! FormHelper CLI
//!
//! Ask billing-form questions from the terminal and inspect how they are
//! classified and routed.

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use formhelper::error::Result;
use formhelper::{AssistantConfig, AssistantReply, FormAssistant, FormContext, QueryRequest};

#[derive(Parser)]
#[command(name = "formhelper")]
#[command(about = "Medical-billing form assistant CLI")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, env = "FORMHELPER_CONFIG")]
    config: Option<String>,

    /// SQLite memory database; omit to keep memory in-process
    #[arg(long, env = "FORMHELPER_DB_PATH")]
    db_path: Option<String>,

    /// API key for the remote reasoning service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Default)]
struct Position {
    /// User id (enables memory)
    #[arg(short, long)]
    user: Option<String>,
    /// Session id
    #[arg(short, long)]
    session: Option<String>,
    /// Form being filled
    #[arg(long)]
    form: Option<String>,
    /// Active field
    #[arg(long)]
    field: Option<String>,
    /// Wizard step
    #[arg(long)]
    step: Option<String>,
}

impl Position {
    fn request(&self, text: &str) -> QueryRequest {
        QueryRequest {
            text: text.to_string(),
            user_id: self.user.clone(),
            session_id: self.session.clone(),
            context: FormContext {
                form_type: self.form.clone(),
                active_field: self.field.clone(),
                step: self.step.clone(),
                ..Default::default()
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ask one question
    Ask {
        /// Question text
        text: String,
        #[command(flatten)]
        position: Position,
        /// Print the full reply as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show intent, entities and routing for a question without answering it
    Classify {
        /// Question text
        text: String,
    },
    /// Show memory statistics
    Stats {
        /// Restrict to one user
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Delete everything remembered about a user
    Clear {
        #[arg(short, long)]
        user: String,
    },
    /// Interactive mode
    Interactive {
        #[command(flatten)]
        position: Position,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AssistantConfig::load(cli.config.as_deref())?;
    if cli.openai_key.is_some() {
        config.remote.api_key = cli.openai_key;
    }
    if let Some(path) = cli.db_path {
        config.memory.db_path = Some(path);
    }
    let assistant = FormAssistant::open(config)?;

    match cli.command {
        Commands::Ask {
            text,
            position,
            json,
        } => {
            let reply = assistant.process_query(position.request(&text)).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&reply)?);
            } else {
                print_reply(&reply);
            }
        }

        Commands::Classify { text } => {
            let diagnostics = assistant.classify(&text);
            println!("{}", serde_json::to_string_pretty(&diagnostics)?);
        }

        Commands::Stats { user } => {
            let stats = assistant.memory_stats(user.as_deref()).await?;
            println!("Backend: {}", stats.backend);
            println!("Entries: {}", stats.total_entries);
            let mut by_type: Vec<_> = stats.entries_by_type.iter().collect();
            by_type.sort();
            for (memory_type, count) in by_type {
                println!("  {}: {}", memory_type, count);
            }
            println!("Conversations: {}", stats.conversations);
            println!(
                "Terms: {} distinct, {} lookups",
                stats.distinct_terms, stats.total_term_usages
            );
        }

        Commands::Clear { user } => {
            let removed = assistant.clear_user(&user).await?;
            println!("Removed {} records for {}", removed, user);
        }

        Commands::Interactive { mut position } => {
            println!("FormHelper Interactive Mode");
            println!("Type 'help' for commands, 'quit' to exit\n");

            if position.session.is_none() {
                position.session = Some(uuid::Uuid::new_v4().to_string());
            }

            let stdin = io::stdin();
            let mut stdout = io::stdout();

            loop {
                print!("formhelper> ");
                stdout.flush()?;

                let mut line = String::new();
                if stdin.read_line(&mut line)? == 0 {
                    break;
                }
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                match line {
                    "quit" | "exit" => break,
                    "help" => {
                        println!("Commands:");
                        println!("  <question>         - Ask a question");
                        println!("  classify <text>    - Show how a question is understood");
                        println!("  form <name>        - Set the current form");
                        println!("  field <name>       - Set the active field");
                        println!("  step <name>        - Set the current step");
                        println!("  stats              - Show interaction statistics");
                        println!("  quit               - Exit");
                    }
                    "stats" => {
                        let stats = assistant.interaction_stats();
                        println!(
                            "Interactions: {}/{} ({:.0}% answered)",
                            stats.entries,
                            stats.capacity,
                            stats.success_rate * 100.0
                        );
                    }
                    _ if line.starts_with("classify ") => {
                        let diagnostics = assistant.classify(line[9..].trim());
                        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
                    }
                    _ if line.starts_with("form ") => {
                        position.form = Some(line[5..].trim().to_string());
                    }
                    _ if line.starts_with("field ") => {
                        position.field = Some(line[6..].trim().to_string());
                    }
                    _ if line.starts_with("step ") => {
                        position.step = Some(line[5..].trim().to_string());
                    }
                    question => {
                        let reply = assistant.process_query(position.request(question)).await;
                        print_reply(&reply);
                    }
                }
            }

            println!("Goodbye!");
        }
    }

    Ok(())
}

fn print_reply(reply: &AssistantReply) {
    println!("{}", reply.text);
    let mut meta = format!(
        "\n[{} · confidence {} · {:?}",
        reply.intent, reply.confidence, reply.served_by
    );
    if let Some(handler) = reply.handler {
        meta.push_str(&format!(" · {}", handler));
    }
    meta.push(']');
    println!("{}", meta.to_lowercase());
    if !reply.hints.is_empty() {
        println!("You often ask about: {}", reply.hints.join(", "));
    }
}
