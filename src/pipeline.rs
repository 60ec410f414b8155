// src/pipeline.rs - Ingestion side: configuration, records, and the parser instance
pub mod config;
pub mod context;
pub mod stream;
