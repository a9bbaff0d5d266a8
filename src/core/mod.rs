pub mod dedup;
pub mod engine;
pub mod geo_validator;
pub mod normalizer;
pub mod pipeline;
pub mod report_parser;
pub mod resolver;

pub use crate::domain::ports::{CoordinateService, Pipeline, Storage};
pub use crate::utils::error::Result;
