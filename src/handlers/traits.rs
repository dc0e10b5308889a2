use thiserror::Error;

use crate::domain::{BatchRequestLine, BatchResultLine};

/// Errors raised while parsing, validating, or rendering one line of a
/// batch input/output file (spec §9 "capability-set per endpoint").
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed JSONL line: {0}")]
    Malformed(String),
    #[error("validation failed: {0}")]
    Invalid(String),
}

/// The per-endpoint capability set the Admission Controller and Scheduler
/// delegate to instead of hard-coding `/v1/chat/completions` parsing
/// throughout. Every endpoint the server exposes for batch execution
/// implements this trait; today that's exactly one, but the seam exists so
/// a second endpoint (e.g. embeddings) plugs in without touching the
/// admission or execution pipeline.
pub trait EndpointHandler: Send + Sync {
    /// Parse one raw JSONL line into a typed request line. Does not
    /// validate cross-line invariants (uniqueness, counts) — that is the
    /// Admission Controller's job once every line has been parsed.
    fn parse_line(&self, raw: &str) -> Result<BatchRequestLine, HandlerError>;

    /// Per-line structural validation beyond what `serde` already
    /// enforces: the things a malformed-but-well-typed line could still
    /// get wrong (unsupported method, empty message list).
    fn validate(&self, line: &BatchRequestLine) -> Result<(), HandlerError>;

    /// Render a completed or failed request back into the canonical JSONL
    /// line shape written to the output/error file.
    fn default_render(&self, line: &BatchResultLine) -> Result<String, HandlerError>;
}
