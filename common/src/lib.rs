//! Anatomy Meta Common Library
//!
//! カタログ整備ツールで共有される型とユーティリティ

pub mod error;
pub mod group;
pub mod rules;
pub mod table;
pub mod text;
pub mod types;

pub use error::{Error, Result};
pub use group::Group;
pub use rules::{ForcedPhrase, RuleSet, Weights};
pub use table::{Record, Table};
pub use text::{build_search_text, normalize_text, SearchText};
pub use types::{Catalog, CatalogEntry};
