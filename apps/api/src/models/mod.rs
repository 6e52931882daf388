pub mod document;
pub mod embedding;
pub mod job;
pub mod record;
