//! Application use cases. Orchestrate domain logic via ports.

pub mod activity_resolution;
pub mod alias_resolver;
pub mod event_ranking;
pub mod query_execution;
pub mod summary_service;
pub mod time_window;
pub mod understanding_service;

pub use activity_resolution::ActivityResolutionService;
pub use alias_resolver::AliasResolver;
pub use event_ranking::EventRankingService;
pub use query_execution::{PipelineConfig, QueryExecutionService};
pub use summary_service::SummaryService;
pub use time_window::TimeWindowResolver;
pub use understanding_service::UnderstandingService;
