//! Marquee core: keyword lookup, label mapping and the asynchronous label
//! update pipeline that writes labels back to a Plex catalog.

pub mod catalog;
pub mod error;
pub mod http;
pub mod ingest;
pub mod labels;
pub mod orchestration;
pub mod providers;
pub mod rate_limit;
pub mod types;

pub use error::{LabelError, MappingError, Result, ValidationError};
