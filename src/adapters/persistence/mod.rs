//! Persistence adapters implementing the repository port.

pub mod sqlite_repo;

pub use sqlite_repo::SqliteQueryRepository;
