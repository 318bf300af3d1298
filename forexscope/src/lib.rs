// Library interface for forexscope modules
// This allows tests and other binaries to import modules

pub mod error;
pub mod feed;
pub mod ingestion;
pub mod llm;
pub mod pipeline;
pub mod server;
