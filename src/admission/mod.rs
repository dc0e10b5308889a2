//! Admission Controller (spec §4.1): pre-submission validator and
//! backpressure gate, protecting both the queue and the GPU.

mod controller;
mod error;

pub use controller::{AdmissionController, SubmitRequest};
pub use error::{AdmissionError, Result};
