pub mod batch;
pub mod errors;
pub mod generation;
pub mod session;

pub use generation::{
    BatchGenerateRequest, BatchItem, BatchSummary, GenerationService, ReadResultsRequest,
    SingleGenerateRequest, SingleGeneration,
};
pub use session::{CachePolicy, ModelSessionCache, SessionStatus};
