//! Geometry substrate for the Scrawl stroke engine.

pub mod path;
pub mod transform;
pub mod types;
