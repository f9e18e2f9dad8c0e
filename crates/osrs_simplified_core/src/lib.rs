pub mod catalog;
pub mod clean;
pub mod config;
pub mod error;
pub mod export;
pub mod jobs;
pub mod llm;
pub mod pipeline;
pub mod query;
pub mod server;
pub mod store;
pub mod summarize;
#[cfg(test)]
mod test_support;
pub mod wiki;
