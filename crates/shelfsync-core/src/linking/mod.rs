//! Linking local records to remote items
//!
//! - [`AutoLinker`]: unattended linking by unique ISBN/ASIN coincidence
//! - [`InteractiveMatcher`]: candidate ranking for human-assisted linking

pub mod auto;
pub mod interactive;

pub use auto::{Ambiguity, AutoLinker, LinkDecision, MatchedBy};
pub use interactive::{Candidate, CandidateSummary, InteractiveMatcher, MatchSelection};
