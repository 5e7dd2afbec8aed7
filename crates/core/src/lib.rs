//! Core library: risk classification, compliance scoring, retrieval, reporting.

pub mod analyzer;
pub mod classifier;
pub mod config;
pub mod corpus;
pub mod error;
pub mod extractor;
pub mod models;
pub mod narrative;
pub mod pipeline;
pub mod prompts;
pub mod recommendations;
pub mod report;
pub mod rules;
pub mod sink;
pub mod vectorstore;
