//! Shared infrastructure-free helpers: configuration, text normalization,
//! deterministic date-phrase parsing.

pub mod config;
pub mod datephrase;
pub mod text;
