//! The five pipeline steps as graph nodes.

pub mod aggregate;
pub mod clean;
pub mod fetch;
pub mod merge;
pub mod validate;

pub use aggregate::AggregateNode;
pub use clean::CleanNode;
pub use fetch::FetchNode;
pub use merge::{merge_key, MergeNode};
pub use validate::ValidateNode;
