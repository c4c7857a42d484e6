//! Terminal rendering of evidence and streamed answers.

use std::io::{self, Write};

use colored::Colorize;
use recipe_rag::types::{Document, RouteDecision};

/// Maximum width for streamed answer text
pub const MAX_LINE_WIDTH: usize = 80;

/// Buffers streamed fragments (which may split words) and writes them with
/// word wrapping.
pub struct LineWrapper<W: Write> {
    out: W,
    width: usize,
    /// Current column position (0-indexed)
    column: usize,
    /// Characters of the word still being received
    word: String,
}

impl LineWrapper<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), MAX_LINE_WIDTH)
    }
}

impl<W: Write> LineWrapper<W> {
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            width,
            column: 0,
            word: String::new(),
        }
    }

    pub fn write(&mut self, text: &str) -> io::Result<()> {
        for ch in text.chars() {
            if ch == '\n' {
                self.flush_word()?;
                writeln!(self.out)?;
                self.column = 0;
            } else if ch.is_whitespace() {
                self.flush_word()?;
                if self.column > 0 && self.column < self.width {
                    write!(self.out, " ")?;
                    self.column += 1;
                }
            } else {
                self.word.push(ch);
            }
        }
        self.out.flush()
    }

    fn flush_word(&mut self) -> io::Result<()> {
        if self.word.is_empty() {
            return Ok(());
        }
        let len = self.word.chars().count();
        if self.column > 0 && self.column + len > self.width {
            writeln!(self.out)?;
            self.column = 0;
        }
        write!(self.out, "{}", self.word)?;
        self.column += len;
        self.word.clear();
        Ok(())
    }

    /// Flush the last word and end the line.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush_word()?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Print how the query was routed.
pub fn print_decision(decision: &RouteDecision, explain: bool) {
    println!(
        "{} {} {}",
        "→".cyan(),
        "Strategy:".bold(),
        decision.strategy.to_string().green().bold()
    );
    if explain {
        for line in decision.explain().lines().skip(1) {
            println!("  {}", line.dimmed());
        }
    } else {
        println!("  {}", decision.rationale.dimmed());
    }
}

/// Print the evidence set, best first.
pub fn print_evidence(evidence: &[Document]) {
    if evidence.is_empty() {
        println!("{} No matching recipes found", "⚠".yellow());
        return;
    }
    println!("{} {}", "📚".cyan(), "Evidence".bold().underline());
    for (i, doc) in evidence.iter().enumerate() {
        let summary = doc.summary();
        println!(
            "  {}. {} {}",
            i + 1,
            summary.name.bold(),
            format!(
                "({:?}, score {:.2})",
                summary.search_type, summary.score
            )
            .dimmed()
        );
    }
}
