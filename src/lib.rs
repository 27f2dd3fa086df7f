pub mod cli;
pub mod config;
pub mod engine;
pub mod execution;
pub mod host;
pub mod mapping;
pub mod operations;
pub mod pipeline;
pub mod registry;
pub mod reports;
pub mod sandbox;
pub mod session;
pub mod shared;
pub mod units;

pub use engine::{Engine, EngineError};
