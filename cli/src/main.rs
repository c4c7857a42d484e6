//! # Recipe RAG CLI
//!
//! Ask cooking questions against a recipe knowledge graph and vector index.
//! Each question is routed to graph traversal, vector search or both, and
//! the answer is streamed from the configured LLM.
//!
//! ## Usage
//!
//! ```bash
//! # Build the vector index from the recipe graph
//! recipe-rag index
//!
//! # See how a question would be routed
//! recipe-rag route "What pairs well with chicken?"
//!
//! # Ask
//! recipe-rag ask "How do I make mapo tofu less spicy?"
//! ```

use std::time::Duration;

use clap::{Parser, Subcommand};
use recipe_rag_cli::commands;
use recipe_rag_cli::exit_codes::*;

/// Initialize logger based on verbose flag
fn init_logger(verbose: bool) {
    let mut log_builder = env_logger::Builder::from_default_env();
    if verbose {
        log_builder.filter_level(log::LevelFilter::Debug);
    } else {
        log_builder.filter_level(log::LevelFilter::Info);
    }
    log_builder.init();
}

/// Main CLI structure
#[derive(Parser)]
#[command(name = "recipe-rag")]
#[command(about = "Adaptive graph and vector retrieval over a recipe knowledge base", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Route a question, show the evidence and stream an answer
    Ask {
        /// Natural language question
        #[arg(value_name = "QUERY")]
        query: String,
        /// Number of evidence documents (defaults to router.top_k)
        #[arg(long, short = 'k', value_name = "N")]
        top_k: Option<usize>,
        /// Give up after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Skip the LLM and show the evidence only
        #[arg(long)]
        no_llm: bool,
        /// Show the full routing explanation
        #[arg(long)]
        explain: bool,
        /// Enable verbose output
        #[arg(long, short = 'v')]
        verbose: bool,
    },
    /// Show how a question would be routed without retrieving anything
    Route {
        #[arg(value_name = "QUERY")]
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Embed the recipe catalogue into the vector index
    Index {
        /// Only index the first N recipes
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
        /// Drop the existing index before building
        #[arg(long)]
        rebuild: bool,
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
        /// Enable verbose output
        #[arg(long, short = 'v')]
        verbose: bool,
    },
    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Config subcommands
#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Show full secrets instead of masked values
        #[arg(long)]
        show_secrets: bool,
    },
    /// Manage the LLM used for answers
    Llm {
        #[command(subcommand)]
        command: LlmCommands,
    },
}

/// LLM subcommands
#[derive(Subcommand)]
enum LlmCommands {
    /// Configure OpenAI as LLM provider
    Openai {
        #[arg(long, short = 'm', default_value = "gpt-4o-mini")]
        model: String,
        /// API key (optional, prefers OPENAI_API_KEY env var)
        #[arg(long, short = 'k')]
        api_key: Option<String>,
    },
    /// Configure Anthropic as LLM provider
    Anthropic {
        #[arg(long, short = 'm', default_value = "claude-3-5-haiku-latest")]
        model: String,
        /// API key (optional, prefers ANTHROPIC_API_KEY env var)
        #[arg(long, short = 'k')]
        api_key: Option<String>,
    },
    /// Configure local Ollama as LLM provider
    Ollama {
        #[arg(long, short = 'e', default_value = "http://localhost:11434")]
        endpoint: String,
        #[arg(long, short = 'm', default_value = "llama3.2")]
        model: String,
    },
    /// Configure custom OpenAI-compatible endpoint
    Custom {
        #[arg(long, short = 'e')]
        endpoint: String,
        #[arg(long, short = 'm')]
        model: String,
        #[arg(long, short = 'k')]
        api_key: Option<String>,
    },
    /// Show current LLM configuration
    Show {
        #[arg(long)]
        show_secrets: bool,
    },
    /// Remove LLM configuration
    Remove,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = run_command(cli.command).await;
    std::process::exit(exit_code);
}

async fn run_command(command: Commands) -> i32 {
    match command {
        Commands::Ask {
            query,
            top_k,
            timeout,
            json,
            no_llm,
            explain,
            verbose,
        } => {
            init_logger(verbose);
            let args = commands::ask::AskArgs {
                query,
                top_k,
                timeout: timeout.map(Duration::from_secs),
                json,
                no_llm,
                explain,
                verbose,
            };
            match commands::ask::execute(args).await {
                Ok(exit_code) => exit_code,
                Err(e) => {
                    eprintln!("Ask error: {:#}", e);
                    EXIT_ERROR
                }
            }
        }
        Commands::Route { query, json } => {
            init_logger(false);
            let args = commands::route::RouteArgs { query, json };
            match commands::route::execute(args) {
                Ok(exit_code) => exit_code,
                Err(e) => {
                    eprintln!("Route error: {:#}", e);
                    EXIT_CONFIG_ERROR
                }
            }
        }
        Commands::Index {
            limit,
            rebuild,
            json,
            verbose,
        } => {
            init_logger(verbose);
            let args = commands::index::IndexArgs {
                limit,
                rebuild,
                json,
            };
            match commands::index::execute(args).await {
                Ok(exit_code) => exit_code,
                Err(e) => {
                    eprintln!("Index error: {:#}", e);
                    EXIT_ERROR
                }
            }
        }
        Commands::Config { command } => {
            init_logger(false);
            run_config_command(command)
        }
    }
}

fn run_config_command(command: ConfigCommands) -> i32 {
    use commands::config::{ConfigLlmArgs, ConfigShowArgs, LlmProvider};

    let result = match command {
        ConfigCommands::Show { show_secrets } => {
            commands::config::execute_show(ConfigShowArgs { show_secrets })
        }
        ConfigCommands::Llm { command } => {
            let args = match command {
                LlmCommands::Openai { model, api_key } => {
                    ConfigLlmArgs::Set(LlmProvider::OpenAI { model, api_key })
                }
                LlmCommands::Anthropic { model, api_key } => {
                    ConfigLlmArgs::Set(LlmProvider::Anthropic { model, api_key })
                }
                LlmCommands::Ollama { endpoint, model } => {
                    ConfigLlmArgs::Set(LlmProvider::Ollama { endpoint, model })
                }
                LlmCommands::Custom {
                    endpoint,
                    model,
                    api_key,
                } => ConfigLlmArgs::Set(LlmProvider::Custom {
                    endpoint,
                    model,
                    api_key,
                }),
                LlmCommands::Show { show_secrets } => ConfigLlmArgs::Show { show_secrets },
                LlmCommands::Remove => ConfigLlmArgs::Remove,
            };
            commands::config::execute_llm(args)
        }
    };

    match result {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Config error: {:#}", e);
            EXIT_CONFIG_ERROR
        }
    }
}
