//! Per-endpoint capability sets: parsing, validating, and rendering the
//! JSONL lines of a batch input/output file (spec §9). The Admission
//! Controller and Scheduler go through [`HandlerRegistry`] rather than
//! hard-coding `/v1/chat/completions` handling, so a second endpoint is a
//! new [`EndpointHandler`] impl, not a fork of the pipeline.

mod chat_completions;
mod registry;
mod traits;

pub use chat_completions::ChatCompletionsHandler;
pub use registry::{HandlerRegistry, RegistryError};
pub use traits::{EndpointHandler, HandlerError};
