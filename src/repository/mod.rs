use std::num::NonZeroU32;

use crate::repository::{
    errors::Result,
    models::{GenerationRecord, NewGenerationRecord},
};

pub mod errors;
pub mod models;
pub mod sqlite;

/// Append-only storage for generation results.
pub trait GenerationRepository: Send + Sync {
    /// Creates the schema if it does not exist. Safe to call on every start.
    fn initialize(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn insert(
        &self,
        record: NewGenerationRecord,
    ) -> impl Future<Output = Result<GenerationRecord>> + Send;

    /// Writes every record or none of them.
    fn insert_batch(
        &self,
        records: Vec<NewGenerationRecord>,
    ) -> impl Future<Output = Result<Vec<GenerationRecord>>> + Send;

    /// Records of one batch ordered by `prompt_index`.
    fn query_by_batch(
        &self,
        batch_id: &str,
    ) -> impl Future<Output = Result<Vec<GenerationRecord>>> + Send;

    /// Most recent records first.
    fn query_recent(
        &self,
        limit: NonZeroU32,
    ) -> impl Future<Output = Result<Vec<GenerationRecord>>> + Send;

    /// Most recent records of one model first. The name match is case-sensitive.
    fn query_by_model(
        &self,
        model_name: &str,
        limit: NonZeroU32,
    ) -> impl Future<Output = Result<Vec<GenerationRecord>>> + Send;
}
