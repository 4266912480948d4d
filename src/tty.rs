//! Terminal I/O utilities for CLI.
//!
//! Provides user prompting and the interactive deploy confirmation.

use std::io::{self, BufRead, IsTerminal, Write};

use launchpad::confirm::{ConfirmationPrompt, Confirmer};

pub fn prompt(message: &str) -> launchpad::Result<String> {
    eprint!("{}", message);
    io::stderr().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line).map_err(|e| {
        launchpad::Error::new(
            launchpad::ErrorCode::InternalIoError,
            format!("Failed to read input: {}", e),
            serde_json::Value::Null,
        )
    })?;

    Ok(line.trim().to_string())
}

/// Print status message to stderr if running in a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Asks the operator on stderr/stdin. Anything but `y`/`yes` declines.
pub struct TtyConfirmer;

impl Confirmer for TtyConfirmer {
    fn confirm(&self, prompt: &ConfirmationPrompt) -> bool {
        for warning in &prompt.warnings {
            eprintln!("Warning: {}", warning);
        }
        match self::prompt(&format!("{} [y/N] ", prompt.question())) {
            Ok(answer) => is_yes(&answer),
            Err(_) => false,
        }
    }
}
