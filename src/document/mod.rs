//! Document index tasks.

pub mod batch_query;

pub use batch_query::DocumentBatchQueryTask;
