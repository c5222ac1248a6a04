use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::errors::{RepositoryError, Result};

/// Where a record sits inside a batch call.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct BatchSlot {
    pub batch_id: String,
    pub prompt_index: i64,
}

/// A generation result that has not been written yet.
///
/// Records produced outside the batch pathway carry no [`BatchSlot`], which is
/// what keeps `batch_id` and `is_batch` in lockstep once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGenerationRecord {
    pub model_name: String,
    pub prompt: String,
    pub response: String,
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub batch: Option<BatchSlot>,
}

impl NewGenerationRecord {
    pub fn new(
        model_name: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            prompt: prompt.into(),
            response: response.into(),
            max_tokens: None,
            temperature: None,
            batch: None,
        }
    }

    pub fn with_parameters(mut self, max_tokens: Option<i64>, temperature: Option<f64>) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn in_batch(mut self, batch_id: impl Into<String>, prompt_index: i64) -> Self {
        self.batch = Some(BatchSlot {
            batch_id: batch_id.into(),
            prompt_index,
        });
        self
    }

    pub fn is_batch(&self) -> bool {
        self.batch.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(RepositoryError::InvalidRecord(
                "model_name is required".to_string(),
            ));
        }
        if let Some(slot) = &self.batch {
            if slot.batch_id.is_empty() {
                return Err(RepositoryError::InvalidRecord(
                    "batch_id must not be empty".to_string(),
                ));
            }
            if slot.prompt_index < 0 {
                return Err(RepositoryError::InvalidRecord(format!(
                    "prompt_index must not be negative, got {}",
                    slot.prompt_index
                )));
            }
        }
        Ok(())
    }
}

/// One stored prompt/response pair. Rows are never updated after insert.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerationRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub model_name: String,
    pub prompt: String,
    pub response: String,
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub prompt_index: Option<i64>,
    pub batch_id: Option<String>,
    pub is_batch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_record_has_no_batch() {
        let r = NewGenerationRecord::new("m1", "Hi", "Hello").with_parameters(Some(5), Some(0.7));
        assert!(!r.is_batch());
        assert_eq!(r.max_tokens, Some(5));
        assert_eq!(r.temperature, Some(0.7));
        assert!(r.validate().is_ok());
    }

    #[test]
    fn test_batch_record_carries_slot() {
        let r = NewGenerationRecord::new("m1", "Hi", "Hello").in_batch("batch_x", 3);
        assert!(r.is_batch());
        assert_eq!(
            r.batch,
            Some(BatchSlot {
                batch_id: "batch_x".to_string(),
                prompt_index: 3
            })
        );
    }

    #[test]
    fn test_validate_rejects_blank_model_name() {
        let r = NewGenerationRecord::new("  ", "Hi", "Hello");
        assert!(matches!(r.validate(), Err(RepositoryError::InvalidRecord(_))));
    }

    #[test]
    fn test_validate_rejects_negative_index() {
        let r = NewGenerationRecord::new("m1", "Hi", "Hello").in_batch("batch_x", -1);
        assert!(matches!(r.validate(), Err(RepositoryError::InvalidRecord(_))));
    }
}
