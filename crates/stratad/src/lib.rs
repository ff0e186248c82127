//! stratad library surface, shared between the binary and its tests.

pub mod api;
