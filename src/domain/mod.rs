//! Core domain layer. No external I/O dependencies.
//!
//! Entities and business rules live here. Dependencies flow inward.

pub mod entities;
pub mod errors;

pub use entities::{
    ActivityRef, AliasMappingRow, ActivityRow, CandidateEvent, CandidateReport, DefaultsResolution,
    DurationModifier, DurationUnit, EventWindowQuery, MatchMeta, MatchSource, QueryResponse,
    RankedEvent, RankingDiagnostics, ResolutionOutcome, ResolutionReport, ResponsePayload,
    ScopeCategory, ScoredEvent, SummaryResult, SummarySignals, TermResolution, TimeRangeType,
    TimeWindow, Understanding, WindowStrategy,
};
pub use errors::DomainError;
