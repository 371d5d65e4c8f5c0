pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod scheduler;
pub mod state;
pub mod timer;

pub use error::{GovernError, Result};
