//! # Config Command
//!
//! Shows the effective configuration and manages the LLM used by `ask`.
//!
//! ## Usage
//!
//! ```bash
//! # Show current configuration
//! recipe-rag config show
//!
//! # Configure OpenAI
//! recipe-rag config llm openai --model gpt-4o-mini
//!
//! # Configure local Ollama
//! recipe-rag config llm ollama --endpoint http://localhost:11434 --model llama3.2
//!
//! # Remove LLM configuration
//! recipe-rag config llm remove
//! ```

use anyhow::Result;
use colored::Colorize;
use recipe_rag::LlmConfig;

use crate::config::{Config, config_path};
use crate::errors::display_config_error;
use crate::exit_codes::*;

/// LLM provider types for configuration
#[derive(Debug, Clone)]
pub enum LlmProvider {
    OpenAI {
        model: String,
        api_key: Option<String>,
    },
    Anthropic {
        model: String,
        api_key: Option<String>,
    },
    /// Local Ollama instance
    Ollama { endpoint: String, model: String },
    /// Custom OpenAI-compatible endpoint
    Custom {
        endpoint: String,
        model: String,
        api_key: Option<String>,
    },
}

impl LlmProvider {
    fn into_config(self) -> LlmConfig {
        match self {
            LlmProvider::OpenAI { model, api_key } => LlmConfig {
                api_key,
                ..LlmConfig::openai(&model)
            },
            LlmProvider::Anthropic { model, api_key } => LlmConfig {
                api_key,
                ..LlmConfig::anthropic(&model)
            },
            LlmProvider::Ollama { endpoint, model } => LlmConfig::ollama(&endpoint, &model),
            LlmProvider::Custom {
                endpoint,
                model,
                api_key,
            } => LlmConfig {
                api_key,
                ..LlmConfig::custom(&endpoint, &model)
            },
        }
    }
}

/// Arguments for the config show command
#[derive(Debug)]
pub struct ConfigShowArgs {
    /// Show full secrets (default: masked)
    pub show_secrets: bool,
}

/// Arguments for the config llm command
#[derive(Debug)]
pub enum ConfigLlmArgs {
    Set(LlmProvider),
    Show { show_secrets: bool },
    Remove,
}

fn load_or_report() -> Option<Config> {
    match Config::load() {
        Ok(config) => Some(config),
        Err(e) => {
            display_config_error(&format!("{e:#}"));
            None
        }
    }
}

/// Print every section of the effective configuration.
pub fn execute_show(args: ConfigShowArgs) -> Result<i32> {
    let Some(config) = load_or_report() else {
        return Ok(EXIT_CONFIG_ERROR);
    };

    println!();
    println!("{}", "Recipe RAG Configuration".bold().underline());
    if let Ok(path) = config_path() {
        let origin = if path.exists() { "" } else { " (not created, defaults)" };
        println!("  {} {}{}", "File:".dimmed(), path.display(), origin);
    }
    println!();

    let router = &config.router;
    println!("{}", "Router".cyan().bold());
    println!("  {} {}", "Complexity threshold:".dimmed(), router.complexity_threshold);
    println!("  {} {}", "Relationship threshold:".dimmed(), router.relationship_threshold);
    println!("  {} {}", "Top k:".dimmed(), router.top_k);
    println!(
        "  {} graph {} / vector {} (agreement bonus {})",
        "Fusion:".dimmed(),
        router.graph_weight,
        router.vector_weight,
        router.agreement_bonus
    );
    println!(
        "  {} {} retries, {}ms base delay",
        "Retry:".dimmed(),
        router.retry.max_retries,
        router.retry.base_delay_ms
    );
    println!();

    println!("{}", "Graph source".cyan().bold());
    match &config.catalog {
        Some(path) => println!("  {} {}", "Catalogue:".dimmed(), path.display()),
        None => {
            let neo4j = config.neo4j();
            println!("  {} {}", "Neo4j:".dimmed(), neo4j.uri);
            println!("  {} {}", "User:".dimmed(), neo4j.user);
            println!("  {} {}", "Database:".dimmed(), neo4j.database);
            if let Some(env_var) = &neo4j.password_env {
                println!("  {} {} ({})", "Password Env:".dimmed(), env_var, env_status(env_var));
            }
            if let Some(password) = &neo4j.password {
                println!("  {} {}", "Password:".dimmed(), secret(password, args.show_secrets));
            }
        }
    }
    println!();

    println!("{}", "Vector index".cyan().bold());
    println!("  {} {}", "LanceDB:".dimmed(), config.lance.path);
    println!(
        "  {} {:?} / {}",
        "Embedding:".dimmed(),
        config.embedding.provider,
        config.embedding.model
    );
    println!();

    println!("{}", "LLM".cyan().bold());
    print_llm(config.llm.as_ref(), args.show_secrets);
    println!();

    Ok(EXIT_SUCCESS)
}

/// Configure, show, or remove the LLM settings.
pub fn execute_llm(args: ConfigLlmArgs) -> Result<i32> {
    match args {
        ConfigLlmArgs::Set(provider) => set_llm_config(provider),
        ConfigLlmArgs::Show { show_secrets } => {
            let Some(config) = load_or_report() else {
                return Ok(EXIT_CONFIG_ERROR);
            };
            println!();
            println!("{}", "LLM Configuration".bold().underline());
            println!();
            print_llm(config.llm.as_ref(), show_secrets);
            println!();
            Ok(EXIT_SUCCESS)
        }
        ConfigLlmArgs::Remove => remove_llm_config(),
    }
}

fn set_llm_config(provider: LlmProvider) -> Result<i32> {
    let Some(config) = load_or_report() else {
        return Ok(EXIT_CONFIG_ERROR);
    };

    let llm_config = provider.into_config();
    let config = config.with_llm(llm_config.clone());
    let path = config.save()?;
    log::debug!("Saved configuration to {}", path.display());

    println!();
    println!("{} LLM configured successfully!", "✓".green().bold());
    println!();
    println!("  {} {}", "Provider:".dimmed(), llm_config.provider);
    println!("  {} {}", "Model:".dimmed(), llm_config.model);
    println!("  {} {}", "Endpoint:".dimmed(), llm_config.endpoint);

    println!();
    if llm_config.is_ready() {
        println!("  {} Ready to use with `recipe-rag ask`", "→".cyan());
    } else {
        eprintln!(
            "{} API key not found. Set the {} environment variable.",
            "⚠".yellow().bold(),
            llm_config.api_key_env.as_deref().unwrap_or("API_KEY")
        );
    }
    println!();

    Ok(EXIT_SUCCESS)
}

fn remove_llm_config() -> Result<i32> {
    let Some(mut config) = load_or_report() else {
        return Ok(EXIT_CONFIG_ERROR);
    };

    if config.llm.is_none() {
        println!("{} LLM configuration is not set.", "ℹ".blue());
        return Ok(EXIT_SUCCESS);
    }

    config.remove_llm();
    config.save()?;
    println!("{} LLM configuration removed.", "✓".green().bold());
    Ok(EXIT_SUCCESS)
}

fn print_llm(llm: Option<&LlmConfig>, show_secrets: bool) {
    let Some(llm) = llm else {
        println!("  {}", "Not configured (ask shows evidence only)".dimmed());
        println!();
        println!("  {} Configure with:", "→".cyan());
        println!("    recipe-rag config llm openai --model gpt-4o-mini");
        println!("    recipe-rag config llm ollama --endpoint http://localhost:11434 --model llama3.2");
        return;
    };

    println!("  {} {}", "Provider:".dimmed(), llm.provider);
    println!("  {} {}", "Endpoint:".dimmed(), llm.endpoint);
    println!("  {} {}", "Model:".dimmed(), llm.model);
    if let Some(env_var) = &llm.api_key_env {
        println!("  {} {} ({})", "API Key Env:".dimmed(), env_var, env_status(env_var));
    }
    if let Some(key) = &llm.api_key {
        println!("  {} {}", "API Key:".dimmed(), secret(key, show_secrets));
    }
    let ready = if llm.is_ready() {
        "✓ ready".green()
    } else {
        "✗ not ready (API key missing)".red()
    };
    println!("  {} {}", "Status:".dimmed(), ready);
}

fn env_status(var: &str) -> String {
    if std::env::var(var).is_ok() {
        "✓ set".green().to_string()
    } else {
        "✗ not set".red().to_string()
    }
}

fn secret(value: &str, show: bool) -> String {
    if show {
        value.to_string()
    } else {
        mask_key(value)
    }
}

/// Mask a secret for display
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}
