//! # Error Handling
//!
//! User-facing error display for the CLI.

use colored::Colorize;
use recipe_rag::error::{GenerationFault, RetrievalFault};
use recipe_rag::{RagError, ServiceError};

/// Display a configuration error with helpful suggestions
pub fn display_config_error(message: &str) {
    eprintln!("{} Configuration error: {}", "✗".red().bold(), message);
    eprintln!();
    eprintln!(
        "{} Run `recipe-rag config show` to inspect the effective settings.",
        "Tip:".cyan().bold()
    );
}

/// Display a retrieval failure, one line per failed source
pub fn display_retrieval_error(fault: &RetrievalFault) {
    eprintln!(
        "{} No evidence could be retrieved ({} strategy)",
        "✗".red().bold(),
        fault.strategy
    );
    for failure in &fault.failures {
        eprintln!("  • {}", failure);
    }
    eprintln!();
    eprintln!(
        "{} Check that the graph database and embedding service are running.",
        "Tip:".cyan().bold()
    );
}

/// Display a generation failure
pub fn display_generation_error(fault: &GenerationFault) {
    eprintln!("{} Answer generation failed: {}", "✗".red().bold(), fault);
    if fault.cause.is_transient() {
        eprintln!();
        eprintln!(
            "{} The language model may be overloaded; try again shortly.",
            "Tip:".cyan().bold()
        );
    }
}

/// Display a service error with helpful suggestions
pub fn display_service_error(err: &ServiceError) {
    eprintln!("{} Service error: {}", "✗".red().bold(), err);
    if err.is_transient() {
        eprintln!();
        eprintln!("{}", "Possible causes:".yellow());
        eprintln!("  • The service is not running");
        eprintln!("  • The configured endpoint is wrong");
    }
}

/// Display any library error with the most specific presentation
pub fn display_rag_error(err: &RagError) {
    match err {
        RagError::Config(message) => display_config_error(message),
        RagError::Retrieval(fault) => display_retrieval_error(fault),
        RagError::Generation(fault) => display_generation_error(fault),
        RagError::Service(service) => display_service_error(service),
        other => display_error(&other.to_string()),
    }
}

/// Display a generic error
pub fn display_error(message: &str) {
    eprintln!("{} Error: {}", "✗".red().bold(), message);
}

/// Display a warning
pub fn display_warning(message: &str) {
    eprintln!("{} Warning: {}", "⚠".yellow().bold(), message);
}

/// Display a success message
pub fn display_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}
