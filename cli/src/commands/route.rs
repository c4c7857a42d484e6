//! # Route Command
//!
//! Shows how a question would be routed: the analyzer's scores, detected
//! entities and the selected strategy. Nothing is retrieved.

use anyhow::Result;
use recipe_rag::{QueryAnalyzer, RouteDecision, StrategySelector};

use crate::config::Config;
use crate::exit_codes::*;
use crate::output;

/// Arguments for the route command
#[derive(Debug)]
pub struct RouteArgs {
    pub query: String,
    pub json: bool,
}

/// Analyze and route with the built-in lexicon.
pub fn plan(config: &Config, query: &str) -> RouteDecision {
    let analyzer = QueryAnalyzer::default();
    StrategySelector::from_config(&config.router).decide(analyzer.analyze(query))
}

pub fn execute(args: RouteArgs) -> Result<i32> {
    if args.query.trim().is_empty() {
        crate::errors::display_error("Query must not be empty");
        return Ok(EXIT_INVALID_INPUT);
    }

    let config = Config::load()?;
    let decision = plan(&config, &args.query);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        output::print_decision(&decision, true);
    }
    Ok(EXIT_SUCCESS)
}
