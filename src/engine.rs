//! Processing thread - the pipeline stage that owns the matcher.
//!
//! Parsing and matching run on the same thread, so commands are applied
//! in exactly the order the receiver enqueued them and the matcher needs
//! no locks.

use crossbeam_channel::Receiver;

use crate::config::Config;
use crate::matching::MatchingEngine;
use crate::output::Tape;
use crate::parser::{self, ParseError};

pub struct Engine {
    matcher: MatchingEngine,
    tape: Tape,
    diagnostics: bool,
}

impl Engine {
    pub fn new(config: Config, tape: Tape) -> Self {
        Self {
            diagnostics: config.diagnostics,
            matcher: MatchingEngine::new(config, tape.clone()),
            tape,
        }
    }

    /// Parse one raw payload and apply it. Malformed lines are dropped
    /// without output; the drop reason goes to stderr when diagnostics
    /// are enabled.
    pub fn process_line(&mut self, raw: &[u8]) {
        match parser::parse_line(raw) {
            Ok(cmd) => self.matcher.process(cmd),
            Err(ParseError::Empty) => {}
            Err(err) => {
                tracing::debug!(%err, "dropped malformed line");
                if self.diagnostics {
                    self.tape.diag(format_args!("dropped line: {err}"));
                }
            }
        }
    }

    /// Blocking loop over the input channel. Returns when every producer
    /// has been dropped and the backlog is drained; in-flight commands
    /// always complete. Dropping the engine (and with it the tape) is the
    /// termination signal for the output thread.
    pub fn run(mut self, rx: Receiver<Vec<u8>>) {
        while let Ok(raw) = rx.recv() {
            self.process_line(&raw);
        }
        tracing::debug!("input channel drained; processing thread exiting");
    }

    pub fn matcher(&self) -> &MatchingEngine {
        &self.matcher
    }
}
