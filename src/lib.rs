pub mod batch;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod container;
pub mod document;
pub mod executor;
pub mod host;
pub mod llm;
pub mod plan;
pub mod report;
pub mod util;
