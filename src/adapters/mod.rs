//! Infrastructure adapters. Implement outbound ports.
//!
//! Model backend and persistence. Map errors to DomainError.

pub mod ai;
pub mod persistence;
