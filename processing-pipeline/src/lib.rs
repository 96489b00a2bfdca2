#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod functions;
pub mod pipeline;

pub use functions::FunctionRegistries;
pub use pipeline::{
    DocumentReport, PipelineVariant, ProcessingRequest, Processor, VariantOutcome,
};
