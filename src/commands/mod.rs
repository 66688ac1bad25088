mod answer;
mod cache;
mod host;
mod scan;
mod status;
mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::detect::types::Mcq;
use crate::relay::types::Answer;
use crate::state::{AppState, Settings};

/// Detect multiple-choice questions in HTML pages and relay them to a model
#[derive(Parser)]
#[command(name = "mcq-relay", version, long_about = None)]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Keep cached answers in memory only
    #[arg(long, global = true)]
    pub memory_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Detect MCQs in a page and print them as JSON lines
    Scan {
        /// File path or http(s) URL
        page: String,
    },
    /// Detect MCQs in a page and print a suggested answer for each
    Answer {
        /// File path or http(s) URL
        page: String,
        /// Print `mcq_answer` messages as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Watch an HTML file and answer questions as they appear
    Watch {
        page: PathBuf,
    },
    /// Run as a native-messaging host on stdin/stdout
    Host,
    /// Show the active configuration
    Status,
    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Remove every cached answer
    Clear,
}

/// Commands that don't touch the relay skip building it.
pub fn needs_state(command: &Command) -> bool {
    !matches!(command, Command::Scan { .. } | Command::Status)
}

pub async fn run(command: Command, state: Option<AppState>, settings: &Settings) -> Result<()> {
    let app = || state.as_ref().context("application state not initialized");
    match command {
        Command::Scan { page } => scan::scan(&page).await,
        Command::Status => status::status(settings),
        Command::Answer { page, json } => answer::answer(app()?, &page, json).await,
        Command::Watch { page } => watch::watch(app()?, page).await,
        Command::Host => host::host(app()?).await,
        Command::Cache {
            action: CacheAction::Clear,
        } => cache::clear(app()?).await,
    }
}

/// Read a page from disk, or fetch it when given an http(s) URL.
pub async fn read_page(target: &str) -> Result<String> {
    if target.starts_with("http://") || target.starts_with("https://") {
        let resp = reqwest::get(target).await.context("Failed to fetch URL")?;
        let status = resp.status();
        let body = resp.text().await.context("Failed to read response body")?;
        info!(url = target, %status, size = body.len(), "page fetched");
        Ok(body)
    } else {
        tokio::fs::read_to_string(target)
            .await
            .with_context(|| format!("Failed to read {}", target))
    }
}

/// Text shown next to a question once its answer arrives.
pub fn render_overlay(mcq: &Mcq, answer: &Answer) -> String {
    format!("Q: {}\nAnswer suggestion: {}", mcq.question, answer.display())
}
