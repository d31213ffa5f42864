pub mod approval;
pub mod audit;
pub mod claim;
pub mod config;
pub mod dashboard;
pub mod document;
pub mod error;
pub mod executor;
pub mod generator;
pub mod io;
pub mod item;
pub mod layout;
pub mod plan;
pub mod processor;
pub mod runtime;
pub mod watcher;

pub use error::{AideError, Result};
