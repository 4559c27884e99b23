pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod report;
pub mod scanner;
pub mod scoring_mode;
