//! SCPI macro files: one command per line, `#` starts a comment.

use crate::instrument::Keithley2220;
use crate::transport::Transport;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

/// Pause before every line, comments included.
pub const LINE_DELAY: Duration = Duration::from_millis(100);
/// Extra pause before a query is sent.
pub const QUERY_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroLine<'a> {
    Comment,
    Blank,
    Write(&'a str),
    Query(&'a str),
}

impl<'a> MacroLine<'a> {
    pub fn parse(line: &'a str) -> Self {
        if line.starts_with('#') {
            return MacroLine::Comment;
        }
        let command = line.split('#').next().unwrap_or_default().trim();
        if command.is_empty() {
            MacroLine::Blank
        } else if command.contains('?') {
            MacroLine::Query(command)
        } else {
            MacroLine::Write(command)
        }
    }
}

pub async fn run_macro<T: Transport>(inst: &mut Keithley2220<T>, path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read macro file {}", path.display()))?;
    info!("running macro {}", path.display());
    run_script(inst, &text).await
}

/// Execute every line of `text` in order, echoing commands and indented
/// replies to stdout. Returns the number of commands sent.
pub async fn run_script<T: Transport>(inst: &mut Keithley2220<T>, text: &str) -> Result<usize> {
    let mut sent = 0;
    for (number, line) in text.lines().enumerate() {
        sleep(LINE_DELAY).await;
        match MacroLine::parse(line) {
            MacroLine::Comment | MacroLine::Blank => continue,
            MacroLine::Write(command) => {
                println!("{command}");
                inst.send_raw(command)
                    .await
                    .with_context(|| format!("macro line {}", number + 1))?;
            }
            MacroLine::Query(command) => {
                println!("{command}");
                sleep(QUERY_SETTLE).await;
                let reply = inst
                    .send_raw(command)
                    .await
                    .with_context(|| format!("macro line {}", number + 1))?;
                println!("   {}", reply.unwrap_or_default());
            }
        }
        sent += 1;
    }
    info!("macro finished, {sent} commands sent");
    Ok(sent)
}
