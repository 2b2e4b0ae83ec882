//! Shared utilities for the nagare packages.

pub mod logger;
pub mod time;
