//! Campaign-variant state machine (spec §4.3): `draft -> published ->
//! archived`, with publish/rollback serialized per `(product, locale,
//! trim, market)` through [`kb_storage::Repositories::campaigns`]'s
//! advisory-lock guard.

mod publisher;

pub use publisher::{PublishOutcome, Publisher, RollbackOutcome};
