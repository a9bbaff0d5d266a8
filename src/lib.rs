pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;
pub use config::EngineConfig;

pub use adapters::{CoordinateStore, GeminiClient, LocalStorage};
pub use core::{engine::CycleEngine, pipeline::AlertPipeline, resolver::Resolver};
pub use utils::error::{EngineError, Result};
