//! The ingestion pipeline: extraction, redaction, standardization, embedding
//! and persistence, driven per job by the [`orchestrator::Orchestrator`].

pub mod cancel;
pub mod embedder;
pub mod extractor;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod redactor;
pub mod standardizer;
pub mod writer;

#[cfg(test)]
pub mod testing;
