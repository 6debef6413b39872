//! Hybrid retrieval (spec §4.4): cheap keyword-stage scoring against
//! structured spec facts first, falling back to an embedded ANN search
//! over knowledge chunks only when keyword confidence is low, then
//! ranked and grouped for display.

mod cache;
mod intent;
mod keywords;
mod scoring;
mod router;

pub use cache::{SemanticCache, DEFAULT_TTL};
pub use intent::{classify, Intent};
pub use keywords::extract_keywords;
pub use scoring::{score_rows, KeywordMatch, ScoredRow};
pub use router::{
    RetrievalRouter, RetrieveRequest, RetrieveResponse, SemanticChunk, SemanticGroup,
    KEYWORD_CONFIDENCE_THRESHOLD,
};
