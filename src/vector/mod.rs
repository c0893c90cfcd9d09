//! Vector tasks: search across every partition of an index, and upsert.

pub mod merge;
pub mod params;
pub mod search;
pub mod upsert;

pub use params::{FilterSource, FilterType, SearchExtraParamType, SearchParam, VectorSearchParameter};
pub use search::{PartPhase, VectorSearchPartTask, VectorSearchTask};
pub use upsert::VectorUpsertTask;
