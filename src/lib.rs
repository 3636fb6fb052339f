pub mod artifact;
pub mod cleaning;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod mirror;
pub mod run_context;
pub mod sample;
pub mod table;
