pub mod article;
pub mod dom;

pub use article::{ArticleLink, ArticleRecord, Field, FieldValues, ListingEntry, UNKNOWN_AUTHOR};
pub use dom::Snapshot;
