//! Prompt rendering on a terminal

use std::io::{self, Write};

use super::{DismissReason, PageHost};

/// Renders the update prompt as lines on a writer (stdout by default)
pub struct TerminalHost<W = io::Stdout> {
    out: W,
    reloads: usize,
}

impl TerminalHost {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalHost<W> {
    pub fn new(out: W) -> Self {
        Self { out, reloads: 0 }
    }

    /// Number of reloads requested through this host
    pub fn reloads(&self) -> usize {
        self.reloads
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // A closed terminal must not take the notifier down
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> PageHost for TerminalHost<W> {
    fn show_prompt(&mut self, waiting: Option<&str>) {
        let detail = match waiting {
            Some(version) => format!(" ({version})"),
            None => String::new(),
        };
        self.line(&format!(
            "New version available{detail}. Press [r] + Enter to reload, [d] + Enter to dismiss."
        ));
    }

    fn hide_prompt(&mut self, reason: DismissReason) {
        match reason {
            DismissReason::Dismissed => self.line("Update prompt dismissed."),
            DismissReason::TimedOut => self.line("Update prompt closed."),
        }
    }

    fn reload(&mut self) {
        self.reloads += 1;
        self.line("Reloading...");
    }
}
