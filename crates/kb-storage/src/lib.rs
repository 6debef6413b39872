//! Tenant-scoped persistence for the brochure knowledge engine.
//!
//! Two backends share one trait surface ([`traits::Repositories`]):
//! Postgres for production, SQLite for the zero-dependency development
//! mode named in the embedded-dev-backend design note. Callers depend on
//! `Arc<dyn Repositories>` and never see which one is wired up.

pub mod error_map;
pub mod postgres;
pub mod sqlite;
pub mod traits;

pub use postgres::PgRepositories;
pub use sqlite::SqliteRepositories;
pub use traits::Repositories;
