//! `VectorAdapter` abstraction (spec §4.5): one interface, two ANN
//! backends — an in-memory flat index for dev/tests and a pgvector-backed
//! index for production. Both enforce invariant I4: all vectors held or
//! queried by one adapter share `(model, version, dimension)`.

pub mod adapter;
pub mod memory;
pub mod pg;

pub use adapter::{l2_normalize, VectorAdapter, VectorEntry, VectorFilter, VectorMatch};
pub use memory::InMemoryVectorAdapter;
pub use pg::PgVectorAdapter;
