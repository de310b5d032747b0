//! In-memory registry of trained models, one per location key.
//!
//! Bounded: inserting a new location into a full registry evicts the model
//! that was trained longest ago.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::sequence::SequenceModel;
use crate::geo::LocationKey;

#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub id: Uuid,
    pub model: Arc<SequenceModel>,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn new(model: SequenceModel, trained_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: Arc::new(model),
            trained_at,
        }
    }
}

pub struct ModelRegistry {
    capacity: usize,
    models: RwLock<HashMap<LocationKey, TrainedModel>>,
}

impl ModelRegistry {
    // ---
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            models: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &LocationKey) -> Option<TrainedModel> {
        self.models.read().await.get(key).cloned()
    }

    /// Store `model` under `key`, returning the key evicted to make room.
    pub async fn insert(&self, key: LocationKey, model: TrainedModel) -> Option<LocationKey> {
        // ---
        let mut models = self.models.write().await;
        let mut evicted = None;

        if !models.contains_key(&key) && models.len() >= self.capacity {
            let oldest = models
                .iter()
                .min_by_key(|(_, m)| m.trained_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                models.remove(&oldest);
                tracing::info!("model registry full, evicted model for {}", oldest);
                evicted = Some(oldest);
            }
        }

        tracing::debug!("registered model {} for {}", model.id, key);
        models.insert(key, model);
        evicted
    }

    pub async fn len(&self) -> usize {
        self.models.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.models.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::forecast::sequence::TrainingConfig;
    use crate::models::{HistoricalPoint, HistoricalSource, PollutantLevels};
    use chrono::{Duration, NaiveDate, TimeZone};

    fn tiny_model() -> SequenceModel {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let points: Vec<HistoricalPoint> = start
            .iter_days()
            .take(12)
            .enumerate()
            .map(|(i, d)| {
                HistoricalPoint::new(d, 40.0 + i as f64, PollutantLevels::default(), HistoricalSource::Ground, 1.0)
            })
            .collect();
        let config = TrainingConfig {
            epochs: 2,
            ..TrainingConfig::default()
        };
        SequenceModel::train(&points, &config, &mut |_| {}).unwrap()
    }

    #[tokio::test]
    async fn test_insert_evicts_least_recently_trained() {
        // ---
        let registry = ModelRegistry::new(2);
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let model = tiny_model();

        let delhi = LocationKey::new(28.61, 77.21);
        let paris = LocationKey::new(48.86, 2.35);
        let lima = LocationKey::new(-12.05, -77.04);

        registry.insert(delhi.clone(), TrainedModel::new(model.clone(), t0)).await;
        registry
            .insert(paris.clone(), TrainedModel::new(model.clone(), t0 + Duration::hours(1)))
            .await;

        let evicted = registry
            .insert(lima.clone(), TrainedModel::new(model, t0 + Duration::hours(2)))
            .await;

        assert_eq!(evicted, Some(delhi.clone()));
        assert_eq!(registry.len().await, 2);
        assert!(registry.get(&delhi).await.is_none());
        assert!(registry.get(&lima).await.is_some());
    }

    #[test]
    fn test_replacing_same_key_does_not_evict() {
        // ---
        tokio_test::block_on(async {
            let registry = ModelRegistry::new(1);
            let key = LocationKey::new(1.0, 2.0);
            let now = Utc::now();

            assert!(registry.is_empty().await);
            registry.insert(key.clone(), TrainedModel::new(tiny_model(), now)).await;
            let evicted = registry.insert(key.clone(), TrainedModel::new(tiny_model(), now)).await;

            assert_eq!(evicted, None);
            assert_eq!(registry.len().await, 1);
        });
    }
}
