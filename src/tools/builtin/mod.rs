//! Built-in tools for querying and controlling workers.

pub mod workers;
