// Terminal rendering for answers, progress and errors


use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use std::time::Duration;

use crate::RagError;
use crate::pipeline::{Answer, IngestReport, RetrievedChunk};

/// Characters of each retrieved chunk shown under an answer
pub const SOURCE_PREVIEW_CHARS: usize = 500;

/// Busy indicator shown while a query runs, cleared when dropped
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    #[inline]
    pub fn start(message: &str) -> Self {
        let bar = if console::user_attended_stderr() {
            let bar = ProgressBar::new_spinner();
            if let Ok(spinner_style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
                bar.set_style(spinner_style);
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(message.to_string());

        Self { bar }
    }

    /// Clear the spinner early, e.g. before streamed tokens are printed
    #[inline]
    pub fn stop(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl Drop for Spinner {
    #[inline]
    fn drop(&mut self) {
        self.stop();
    }
}

/// Progress bar for embedding during ingestion
#[inline]
pub fn ingest_progress() -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(0);
    if let Ok(bar_style) =
        ProgressStyle::with_template("{spinner} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(bar_style.progress_chars("=> "));
    }
    bar
}

#[inline]
pub fn render_answer(answer: &Answer, show_sources: bool) {
    println!("{}", format_answer(answer, show_sources));
}

/// Answer text, followed by the retrieved passages when `show_sources` is set
#[inline]
pub fn format_answer(answer: &Answer, show_sources: bool) -> String {
    let mut output = format!("{} {}", style("Answer:").bold().green(), answer.text.trim());

    if show_sources {
        output.push_str("\n\n");
        output.push_str(&format_sources(&answer.context));
    }

    output
}

#[inline]
pub fn format_sources(context: &[RetrievedChunk]) -> String {
    if context.is_empty() {
        return style("No passages were retrieved.").dim().to_string();
    }

    let mut output = style("Sources:").bold().yellow().to_string();
    for (i, chunk) in context.iter().enumerate() {
        let _ = write!(
            output,
            "\n{} {}\n   {}",
            style(format!("{}.", i + 1)).bold(),
            preview(&chunk.content),
            style(format!(
                "Source: {}, Page: {} (distance {:.4})",
                chunk.source, chunk.page, chunk.distance
            ))
            .dim()
        );
    }

    output
}

fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(SOURCE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[inline]
pub fn render_ingest_report(report: &IngestReport, store: &std::path::Path) {
    println!(
        "{} Ingested {}",
        style("✓").green(),
        style(report.source.display()).cyan()
    );
    println!("  Pages: {}", style(report.pages).cyan());
    println!("  Chunks: {}", style(report.chunks).cyan());
    println!("  Stored embeddings: {}", style(report.stored).cyan());
    println!("  Vector store: {}", style(store.display()).cyan());
}

#[inline]
pub fn render_error(error: &RagError) {
    eprintln!("{}", format_error(error));
}

/// The error plus, when there is one, the hint for fixing it
#[inline]
pub fn format_error(error: &RagError) -> String {
    let mut output = format!("{} {}", style("Error:").bold().red(), error);
    if let Some(hint) = error.remediation() {
        let _ = write!(output, "\n{} {}", style("Hint:").bold().yellow(), hint);
    }
    output
}
