//! Per-run logging context.
//!
//! A [`RunContext`] is created once per invocation and passed explicitly to every pass.
//! It carries the run id and the root tracing span; each pass opens a child span of it.

use tracing::{info_span, Span};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    span: Span,
}

impl RunContext {
    pub fn new() -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        Self { run_id, span }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Child span for one pass (`reconcile`, `cleanup`, `publish`).
    pub fn pass_span(&self, pass: &'static str) -> Span {
        info_span!(parent: &self.span, "pass", pass)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
