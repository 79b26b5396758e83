//! File-system storage.

pub mod config;
