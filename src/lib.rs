//! Chunking, multi-strategy vector indexing, and retrieval for RAG pipelines.
//!
//! The library is built around [`services::Retriever`], which chunks documents,
//! embeds them through an [`services::EmbeddingProvider`], and stores the
//! vectors in one of several [`services::IndexKind`] variants.

pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::AppError;
pub use models::{Config, OutputFormat};
pub use services::{Retriever, RetrieverOptions, TextChunker};
