// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console chat transport: reads slash-commands from stdin and prints
//! replies to stdout.
//!
//! The chat-platform wire protocol itself is out of scope; this transport
//! exercises the identical `ChatTransport` seam a platform adapter would
//! plug into, which keeps the whole pipeline runnable from a terminal.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use dripmail_core::error::DripmailError;
use dripmail_core::traits::ChatTransport;
use dripmail_core::types::{CommandRequest, HealthStatus, UserId};

/// All console input is attributed to this single user.
const CONSOLE_USER: &str = "console";

/// Parses one input line into a command request.
///
/// Lines must start with `/`; everything after the command name is split on
/// whitespace into arguments.
fn parse_line(line: &str) -> Option<CommandRequest> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let command = parts.next()?.to_ascii_lowercase();
    Some(CommandRequest {
        user_id: UserId(CONSOLE_USER.to_string()),
        command,
        args: parts.map(str::to_string).collect(),
    })
}

pub struct ConsoleTransport {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for ConsoleTransport {
    async fn next_command(&self) -> Result<CommandRequest, DripmailError> {
        let mut lines = self.lines.lock().await;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(request) = parse_line(&line) {
                        return Ok(request);
                    }
                    if !line.trim().is_empty() {
                        println!("(commands start with '/', try /help)");
                    }
                }
                // stdin closed (e.g. running detached): stay idle rather
                // than failing in a tight loop.
                Ok(None) => std::future::pending().await,
                Err(e) => {
                    return Err(DripmailError::Transport {
                        message: format!("stdin read failed: {e}"),
                        source: Some(Box::new(e)),
                    });
                }
            }
        }
    }

    async fn send_message(&self, user: &UserId, text: &str) -> Result<(), DripmailError> {
        println!("[{user}] {text}\n");
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, DripmailError> {
        Ok(HealthStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_splits_command_and_args() {
        let request = parse_line("/forward me@example.com").unwrap();
        assert_eq!(request.user_id.0, "console");
        assert_eq!(request.command, "forward");
        assert_eq!(request.args, vec!["me@example.com"]);
    }

    #[test]
    fn parse_line_normalizes_case_and_whitespace() {
        let request = parse_line("  /NewMail  ").unwrap();
        assert_eq!(request.command, "newmail");
        assert!(request.args.is_empty());
    }

    #[test]
    fn parse_line_rejects_non_commands() {
        assert!(parse_line("hello there").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line("/").is_none());
    }
}
