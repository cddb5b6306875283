pub mod backend;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod filename;
pub mod format;
pub mod format_xlsx;
pub mod gateway;
pub mod generator;
pub mod masking;
pub mod output;
pub mod output_mode;
pub mod projection;
pub mod rewrite;
pub mod validation;
pub mod verbose;
