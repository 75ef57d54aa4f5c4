pub mod common;
pub mod completions;
pub mod config;
pub mod delete;
pub mod edit;
pub mod list;
pub mod queue;
pub mod register;
pub mod sync;
pub mod units;
