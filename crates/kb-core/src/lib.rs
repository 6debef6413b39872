pub mod entities;
pub mod error;
pub mod ids;
pub mod metadata;

pub use entities::*;
pub use error::{ErrorEnvelope, KbError, KbResult};
pub use ids::*;
pub use metadata::{ChunkMetadata, ExtraFields, SpecRowMetadata, MAX_EXTRA_FIELDS};
