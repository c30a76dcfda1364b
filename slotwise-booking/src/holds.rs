use chrono::{DateTime, Duration, Utc};
use slotwise_core::repository::HoldStore;
use slotwise_core::{BookingError, BookingResult, Hold};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_HOLD_TTL_SECONDS: i64 = 300;

/// Creates, looks up and reclaims slot holds.
///
/// Conflicts are not checked here: two sessions may hold the same interval and the
/// confirm transaction decides the winner.
pub struct HoldManager {
    store: Arc<dyn HoldStore>,
    ttl: Duration,
}

impl HoldManager {
    pub fn new(store: Arc<dyn HoldStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn create_hold(
        &self,
        tenant_id: Uuid,
        session_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> BookingResult<Hold> {
        if start_time >= end_time {
            return Err(BookingError::InvalidRequest(
                "hold must end after it starts".to_string(),
            ));
        }
        if session_id.trim().is_empty() {
            return Err(BookingError::InvalidRequest("session id is required".to_string()));
        }

        let hold = Hold::new(tenant_id, session_id, start_time, end_time, self.ttl);
        self.store.insert_hold(&hold).await?;
        debug!(
            tenant_id = %tenant_id,
            hold_id = %hold.id,
            expires_at = %hold.expires_at,
            "Hold created"
        );
        Ok(hold)
    }

    pub async fn find_valid_hold(&self, id: Uuid, tenant_id: Uuid) -> BookingResult<Option<Hold>> {
        Ok(self.store.find_valid_hold(id, tenant_id, Utc::now()).await?)
    }

    pub async fn delete_hold(&self, id: Uuid) -> BookingResult<()> {
        Ok(self.store.delete_hold(id).await?)
    }

    pub async fn reclaim_expired(&self) -> BookingResult<Vec<Hold>> {
        let reclaimed = self.store.delete_expired(Utc::now()).await?;
        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "Reclaimed expired holds");
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use slotwise_core::repository::StoreResult;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MapHoldStore {
        holds: Mutex<HashMap<Uuid, Hold>>,
    }

    #[async_trait]
    impl HoldStore for MapHoldStore {
        async fn insert_hold(&self, hold: &Hold) -> StoreResult<()> {
            self.holds.lock().await.insert(hold.id, hold.clone());
            Ok(())
        }

        async fn find_valid_hold(&self, id: Uuid, tenant_id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<Hold>> {
            Ok(self
                .holds
                .lock()
                .await
                .get(&id)
                .filter(|h| h.tenant_id == tenant_id && h.is_valid_at(now))
                .cloned())
        }

        async fn delete_hold(&self, id: Uuid) -> StoreResult<()> {
            self.holds.lock().await.remove(&id);
            Ok(())
        }

        async fn delete_expired(&self, now: DateTime<Utc>) -> StoreResult<Vec<Hold>> {
            let mut holds = self.holds.lock().await;
            let expired: Vec<Hold> = holds.values().filter(|h| !h.is_valid_at(now)).cloned().collect();
            for hold in &expired {
                holds.remove(&hold.id);
            }
            Ok(expired)
        }
    }

    fn manager(ttl: Duration) -> HoldManager {
        HoldManager::new(Arc::new(MapHoldStore::default()), ttl)
    }

    #[tokio::test]
    async fn test_hold_uses_configured_ttl() {
        let manager = manager(Duration::seconds(DEFAULT_HOLD_TTL_SECONDS));
        let start = Utc::now() + Duration::days(1);
        let hold = manager
            .create_hold(Uuid::new_v4(), "session-1", start, start + Duration::minutes(30))
            .await
            .unwrap();

        assert_eq!(hold.expires_at - hold.created_at, Duration::minutes(5));
        let found = manager.find_valid_hold(hold.id, hold.tenant_id).await.unwrap();
        assert_eq!(found, Some(hold.clone()));
        // Wrong tenant never sees it
        assert!(manager.find_valid_hold(hold.id, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let manager = manager(Duration::minutes(5));
        let start = Utc::now();
        let err = manager
            .create_hold(Uuid::new_v4(), "session-1", start, start)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn test_expired_hold_is_invisible_and_reclaimed() {
        let manager = manager(Duration::seconds(-1));
        let start = Utc::now() + Duration::hours(1);
        let hold = manager
            .create_hold(Uuid::new_v4(), "session-1", start, start + Duration::minutes(30))
            .await
            .unwrap();

        assert!(manager.find_valid_hold(hold.id, hold.tenant_id).await.unwrap().is_none());
        let reclaimed = manager.reclaim_expired().await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert!(manager.reclaim_expired().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let manager = manager(Duration::minutes(5));
        let id = Uuid::new_v4();
        manager.delete_hold(id).await.unwrap();
        manager.delete_hold(id).await.unwrap();
    }
}
