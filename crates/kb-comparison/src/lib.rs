//! Cross-product comparison materializer (spec §4.6): per-dimension
//! deltas between a primary and a secondary product, gated by
//! shareability (invariant I6) before a row is ever computed.

mod materializer;

pub use materializer::Materializer;
