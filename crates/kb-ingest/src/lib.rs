//! Brochure ingestion (spec §4.2): Markdown → front matter + pages →
//! row-level chunks, deduped by content hash, normalized into spec
//! values, embedded, and persisted under a draft campaign variant.

mod chunking;
mod front_matter;
mod markdown;
mod normalize;
mod pipeline;

pub use chunking::{canonical_text, content_hash};
pub use front_matter::{split_front_matter, FrontMatter};
pub use markdown::{parse_pages, Page, TableRow};
pub use normalize::{parse_spec, ParsedSpec};
pub use pipeline::{IngestOutcome, IngestRequest, IngestionPipeline};
