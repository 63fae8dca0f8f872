//! Terminal implementations of the user facing collaborators

use std::io::Write;

use colored::Colorize;
use tracing::{error, info, warn};

use crate::errors::ControllerError;
use crate::office::backend::{ConnectionOpener, MessagingService, Severity};

/// Prints messages to stderr and mirrors them in the logs
#[derive(Debug, Default)]
pub struct TerminalMessenger;

impl MessagingService for TerminalMessenger {
    fn display_message(&self, text: &str, severity: Severity) {
        let line = match severity {
            Severity::Info => text.normal(),
            Severity::Success => text.green(),
            Severity::Warning => text.yellow(),
            Severity::Error => text.red().bold(),
        };
        eprintln!("{}", line);

        match severity {
            Severity::Error => error!("{}", text),
            Severity::Warning => warn!("{}", text),
            Severity::Info | Severity::Success => info!("{}", text),
        }
    }
}

/// "Opens" an office by printing its connection link on stdout
#[derive(Debug, Default)]
pub struct PrintOpener;

impl ConnectionOpener for PrintOpener {
    fn open(&self, url: &str) -> Result<(), ControllerError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", url)?;
        stdout.flush()?;
        Ok(())
    }
}
