//! # Ask Command
//!
//! Routes a question, prints the evidence it was grounded in, then streams
//! the answer from the configured LLM. Ctrl-C during streaming cancels the
//! LLM request.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use futures::StreamExt;
use recipe_rag::{AnswerEvent, AnswerStream, GenerationFault, RecipeRag, RoutedQuery};
use tokio::time::Instant;

use crate::config::Config;
use crate::errors::{display_config_error, display_generation_error, display_rag_error, display_warning};
use crate::exit_codes::*;
use crate::output::{self, LineWrapper};

/// Arguments for the ask command
#[derive(Debug)]
pub struct AskArgs {
    /// The natural language query
    pub query: String,
    /// Evidence set size (router default when unset)
    pub top_k: Option<usize>,
    /// Give up on retrieval and generation after this long
    pub timeout: Option<Duration>,
    /// Output JSON instead of formatted text
    pub json: bool,
    /// Skip the LLM and show the evidence only
    pub no_llm: bool,
    /// Show the full routing explanation
    pub explain: bool,
    pub verbose: bool,
}

/// How a streamed answer ended.
#[derive(Debug, PartialEq)]
pub enum StreamEnd {
    Finished,
    Failed(GenerationFault),
    /// The user interrupted; the LLM request was dropped
    Interrupted,
}

pub async fn execute(args: AskArgs) -> Result<i32> {
    if args.query.trim().is_empty() {
        crate::errors::display_error("Query must not be empty");
        return Ok(EXIT_INVALID_INPUT);
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            display_config_error(&format!("{e:#}"));
            return Ok(EXIT_CONFIG_ERROR);
        }
    };
    let rag = match super::open_rag(&config).await {
        Ok(rag) => rag,
        Err(e) => {
            display_config_error(&format!("{e:#}"));
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    let top_k = args.top_k.unwrap_or(config.router.top_k);
    let deadline = args.timeout.map(|t| Instant::now() + t);
    if args.verbose {
        eprintln!("{} Querying: {}", "→".cyan(), args.query);
    }

    let routed = match args.timeout {
        Some(timeout) => rag.route_query_with_deadline(&args.query, top_k, timeout).await,
        None => rag.route_query(&args.query, top_k).await,
    };
    let routed = match routed {
        Ok(routed) => routed,
        Err(e) => {
            display_rag_error(&e);
            return Ok(for_error(&e));
        }
    };

    let generate = !args.no_llm && config.llm_ready();
    if !args.no_llm && !generate {
        display_warning("No LLM configured; showing evidence only. Run `recipe-rag config llm --help`.");
    }

    if args.json {
        return output_json(&rag, &args.query, routed, generate, deadline).await;
    }

    output::print_decision(&routed.decision, args.explain);
    println!();
    output::print_evidence(&routed.evidence);
    if !generate {
        return Ok(EXIT_SUCCESS);
    }

    if let Some(llm) = &config.llm {
        println!();
        println!(
            "{} {} {}",
            "🤖".green(),
            "Answer".bold().underline(),
            format!("({})", llm.model).dimmed()
        );
        println!();
    }

    let mut answer = rag.generate_answer_stream(&args.query, &routed.evidence);
    if let Some(deadline) = deadline {
        answer = answer.with_deadline(deadline);
    }
    let (_, end) = stream_to(answer, LineWrapper::stdout(), ctrl_c()).await?;

    match end {
        StreamEnd::Finished => Ok(EXIT_SUCCESS),
        StreamEnd::Failed(fault) => {
            display_generation_error(&fault);
            Ok(EXIT_GENERATION_FAILED)
        }
        StreamEnd::Interrupted => {
            display_warning("Interrupted; answer is incomplete");
            Ok(EXIT_ERROR)
        }
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves,
/// so the answer streams to completion.
async fn ctrl_c() {
    interrupt_on(tokio::signal::ctrl_c()).await
}

async fn interrupt_on(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        log::warn!("Could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

/// Write fragments through `wrapper` until the stream ends or `interrupt`
/// resolves. The answer stream is dropped before returning either way.
pub async fn stream_to<W: Write>(
    mut answer: AnswerStream,
    mut wrapper: LineWrapper<W>,
    interrupt: impl Future<Output = ()>,
) -> Result<(W, StreamEnd)> {
    tokio::pin!(interrupt);

    let end = loop {
        tokio::select! {
            event = answer.next() => match event {
                Some(AnswerEvent::Fragment(text)) => wrapper.write(&text)?,
                Some(AnswerEvent::Done) | None => break StreamEnd::Finished,
                Some(AnswerEvent::Error(fault)) => break StreamEnd::Failed(fault),
            },
            _ = &mut interrupt => break StreamEnd::Interrupted,
        }
    };
    drop(answer);

    let out = wrapper.finish()?;
    Ok((out, end))
}

async fn output_json(
    rag: &RecipeRag,
    query: &str,
    routed: RoutedQuery,
    generate: bool,
    deadline: Option<Instant>,
) -> Result<i32> {
    let mut exit_code = EXIT_SUCCESS;
    let mut answer = serde_json::Value::Null;
    let mut error = serde_json::Value::Null;

    if generate {
        let mut stream = rag.generate_answer_stream(query, &routed.evidence);
        if let Some(deadline) = deadline {
            stream = stream.with_deadline(deadline);
        }
        match stream.collect_text().await {
            Ok(text) => answer = text.into(),
            Err(fault) => {
                error = fault.to_string().into();
                exit_code = EXIT_GENERATION_FAILED;
            }
        }
    }

    let output = serde_json::json!({
        "query": query,
        "decision": routed.decision,
        "evidence": routed.evidence,
        "answer": answer,
        "error": error,
        "route_statistics": rag.route_statistics(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(exit_code)
}
