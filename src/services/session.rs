use std::{fmt, str::FromStr};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    inference::{InferenceProvider, errors::InferenceError},
    services::errors::{Result, ServiceError},
    utils::get_env,
};

const MODEL_CACHE_POLICY_VAR: &str = "MODEL_CACHE_POLICY";

/// Whether a loaded model is kept between calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Keep the last model and reuse it while requests name the same model.
    #[default]
    Reuse,
    /// Load the model again on every call.
    Reload,
}

impl CachePolicy {
    pub fn from_env() -> Self {
        let raw = get_env(MODEL_CACHE_POLICY_VAR, "reuse");
        raw.parse().unwrap_or_else(|_| {
            warn!(
                "Unknown {} '{}', using 'reuse'",
                MODEL_CACHE_POLICY_VAR, raw
            );
            CachePolicy::Reuse
        })
    }
}

impl FromStr for CachePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reuse" => Ok(CachePolicy::Reuse),
            "reload" => Ok(CachePolicy::Reload),
            other => Err(format!("unknown cache policy '{}'", other)),
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CachePolicy::Reuse => write!(f, "reuse"),
            CachePolicy::Reload => write!(f, "reload"),
        }
    }
}

struct ModelSession<M, T> {
    model_name: String,
    model: M,
    tokenizer: T,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub loaded: bool,
    pub model_name: Option<String>,
}

/// Handles of a ready session, borrowed from the cache for one call.
pub struct LoadedSession<'a, P: InferenceProvider> {
    pub provider: &'a P,
    pub model: &'a mut P::Model,
    pub tokenizer: &'a P::Tokenizer,
}

/// The single slot holding the currently loaded model and tokenizer.
pub struct ModelSessionCache<P: InferenceProvider> {
    provider: P,
    policy: CachePolicy,
    session: Option<ModelSession<P::Model, P::Tokenizer>>,
}

impl<P: InferenceProvider> ModelSessionCache<P> {
    pub fn new(provider: P, policy: CachePolicy) -> Self {
        Self {
            provider,
            policy,
            session: None,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Returns a session for `model_name`, loading it through the provider
    /// when the cached one cannot be reused. A failed load leaves the previous
    /// session in place.
    pub fn ensure_loaded(&mut self, model_name: &str) -> Result<LoadedSession<'_, P>> {
        let reuse = self.policy == CachePolicy::Reuse
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.model_name == model_name);

        if reuse {
            debug!("Reusing loaded model: {}", model_name);
        } else {
            info!("Loading model: {}", model_name);
            let (model, tokenizer) =
                self.provider
                    .load(model_name)
                    .map_err(|source| ServiceError::ModelLoad {
                        model_name: model_name.to_string(),
                        source,
                    })?;
            info!("Model loaded successfully: {}", model_name);
            self.session = Some(ModelSession {
                model_name: model_name.to_string(),
                model,
                tokenizer,
            });
        }

        let session = self.session.as_mut().ok_or_else(|| ServiceError::ModelLoad {
            model_name: model_name.to_string(),
            source: InferenceError::ModelLoading("no session after load".to_string()),
        })?;
        Ok(LoadedSession {
            provider: &self.provider,
            model: &mut session.model,
            tokenizer: &session.tokenizer,
        })
    }

    /// Reports the cached session without loading anything.
    pub fn current_status(&self) -> SessionStatus {
        SessionStatus {
            loaded: self.session.is_some(),
            model_name: self.session.as_ref().map(|s| s.model_name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeProvider;

    #[test]
    fn test_status_before_any_load() {
        let cache = ModelSessionCache::new(FakeProvider::default(), CachePolicy::Reuse);
        assert_eq!(
            cache.current_status(),
            SessionStatus {
                loaded: false,
                model_name: None
            }
        );
    }

    #[test]
    fn test_same_model_loads_once() {
        let provider = FakeProvider::default();
        let mut cache = ModelSessionCache::new(provider.clone(), CachePolicy::Reuse);
        cache.ensure_loaded("A").unwrap();
        cache.ensure_loaded("A").unwrap();
        assert_eq!(provider.load_count(), 1);
        assert_eq!(cache.current_status().model_name.as_deref(), Some("A"));
    }

    #[test]
    fn test_different_model_replaces_session() {
        let provider = FakeProvider::default();
        let mut cache = ModelSessionCache::new(provider.clone(), CachePolicy::Reuse);
        cache.ensure_loaded("A").unwrap();
        cache.ensure_loaded("B").unwrap();
        assert_eq!(provider.load_count(), 2);
        assert_eq!(provider.loaded_models(), vec!["A", "B"]);
        assert_eq!(
            cache.current_status(),
            SessionStatus {
                loaded: true,
                model_name: Some("B".to_string())
            }
        );
    }

    #[test]
    fn test_reload_policy_loads_every_call() {
        let provider = FakeProvider::default();
        let mut cache = ModelSessionCache::new(provider.clone(), CachePolicy::Reload);
        cache.ensure_loaded("A").unwrap();
        cache.ensure_loaded("A").unwrap();
        assert_eq!(provider.load_count(), 2);
    }

    #[test]
    fn test_failed_load_keeps_previous_session() {
        let provider = FakeProvider::default();
        let mut cache = ModelSessionCache::new(provider.clone(), CachePolicy::Reuse);
        cache.ensure_loaded("A").unwrap();

        let err = cache.ensure_loaded("missing").err().unwrap();
        assert!(matches!(err, ServiceError::ModelLoad { ref model_name, .. } if model_name == "missing"));
        assert_eq!(cache.current_status().model_name.as_deref(), Some("A"));

        // The failed attempt counts as a load; the surviving session is reused.
        assert_eq!(provider.load_count(), 2);
        cache.ensure_loaded("A").unwrap();
        assert_eq!(provider.load_count(), 2);
        assert_eq!(provider.loaded_models(), vec!["A", "missing"]);
    }

    #[test]
    fn test_session_handles_reach_the_provider() {
        let provider = FakeProvider::default();
        let mut cache = ModelSessionCache::new(provider, CachePolicy::Reuse);
        let session = cache.ensure_loaded("A").unwrap();
        assert_eq!(session.model.name, "A");
        assert_eq!(session.tokenizer.model_name, "A");
    }

    #[test]
    fn test_switching_back_hands_out_the_new_session() {
        let provider = FakeProvider::default();
        let mut cache = ModelSessionCache::new(provider.clone(), CachePolicy::Reuse);
        assert_eq!(cache.ensure_loaded("A").unwrap().model.name, "A");
        assert_eq!(cache.ensure_loaded("B").unwrap().model.name, "B");
        assert_eq!(cache.ensure_loaded("B").unwrap().tokenizer.model_name, "B");
        assert_eq!(cache.ensure_loaded("A").unwrap().model.name, "A");
        assert_eq!(provider.loaded_models(), vec!["A", "B", "A"]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("reuse".parse::<CachePolicy>().unwrap(), CachePolicy::Reuse);
        assert_eq!(" Reload ".parse::<CachePolicy>().unwrap(), CachePolicy::Reload);
        assert!("sometimes".parse::<CachePolicy>().is_err());
        assert_eq!(CachePolicy::Reload.to_string(), "reload");
    }
}
