//! # Index Command
//!
//! Embeds one chunk per recipe from the graph source into the LanceDB
//! vector index. Unchanged recipes are skipped unless `--rebuild` is given.

use anyhow::Result;
use colored::Colorize;
use recipe_rag::{IndexReport, RecipeIndexer};

use crate::config::Config;
use crate::errors::{display_config_error, display_rag_error, display_success};
use crate::exit_codes::*;

/// Arguments for the index command
#[derive(Debug)]
pub struct IndexArgs {
    /// Only index the first N recipes (by id)
    pub limit: Option<usize>,
    /// Drop the existing index first
    pub rebuild: bool,
    pub json: bool,
}

pub async fn execute(args: IndexArgs) -> Result<i32> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            display_config_error(&format!("{e:#}"));
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    let indexer = match open_indexer(&config).await {
        Ok(indexer) => indexer,
        Err(e) => {
            display_config_error(&format!("{e:#}"));
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    if !args.json {
        println!(
            "{} Indexing recipes into {}",
            "→".cyan(),
            config.lance.path.dimmed()
        );
    }

    let report = if args.rebuild {
        indexer.rebuild(args.limit).await
    } else {
        indexer.build(args.limit).await
    };
    let report = match report {
        Ok(report) => report,
        Err(e) => {
            display_rag_error(&e);
            return Ok(for_error(&e));
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_success(&summary(&report));
    }
    Ok(EXIT_SUCCESS)
}

async fn open_indexer(config: &Config) -> Result<RecipeIndexer> {
    let graph = super::open_graph(config)?;
    let embedder = super::open_embedder(config)?;
    let index = super::open_index(config, embedder.dimensions()).await?;
    Ok(RecipeIndexer::new(graph, embedder, index))
}

fn summary(report: &IndexReport) -> String {
    format!(
        "Indexed {} of {} recipe(s), {} unchanged",
        report.indexed, report.recipes, report.unchanged
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let report = IndexReport {
            recipes: 12,
            indexed: 3,
            unchanged: 9,
        };
        assert_eq!(summary(&report), "Indexed 3 of 12 recipe(s), 9 unchanged");
    }
}
