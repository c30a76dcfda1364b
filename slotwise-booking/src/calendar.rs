use async_trait::async_trait;
use slotwise_core::calendar::{CalendarError, CalendarEventRequest, CalendarProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Used when no calendar integration is configured. Tenants without credentials are
/// never synced against it.
pub struct NoopCalendarProvider;

#[async_trait]
impl CalendarProvider for NoopCalendarProvider {
    async fn create_event(&self, request: &CalendarEventRequest) -> Result<String, CalendarError> {
        Ok(format!("local-{}", request.appointment_id.simple()))
    }

    async fn delete_event(
        &self,
        _tenant_id: Uuid,
        _calendar_id: Option<&str>,
        _external_event_id: &str,
    ) -> Result<(), CalendarError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing fast
    HalfOpen, // Letting a probe through
}

pub struct CircuitBreaker {
    pub name: String,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    failure_threshold: usize,
    reset_timeout: Duration,
    last_failure: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            failure_threshold: threshold.max(1),
            reset_timeout,
            last_failure: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    /// Returns false while the circuit is open and the reset timeout has not elapsed.
    pub async fn check(&self) -> bool {
        let state = *self.state.read().await;
        match state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let last_failure = *self.last_failure.read().await;
                match last_failure {
                    Some(instant) if instant.elapsed() >= self.reset_timeout => {
                        *self.state.write().await = CircuitState::HalfOpen;
                        tracing::info!("Circuit breaker [{}] moving to half-open", self.name);
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            tracing::info!("Circuit breaker [{}] recovered to closed", self.name);
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::SeqCst);
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().await;

        if count >= self.failure_threshold || *state == CircuitState::HalfOpen {
            *state = CircuitState::Open;
            *self.last_failure.write().await = Some(Instant::now());
            tracing::error!("Circuit breaker [{}] tripped to open after {} failures", self.name, count);
        }
    }
}

/// Wraps a calendar provider with a per-call timeout and a circuit breaker.
///
/// An open circuit fails fast with `CalendarError::CircuitOpen`, which callers treat
/// like any other sync failure.
pub struct ResilientCalendar {
    inner: Arc<dyn CalendarProvider>,
    breaker: CircuitBreaker,
    request_timeout: Duration,
}

impl ResilientCalendar {
    pub fn new(
        inner: Arc<dyn CalendarProvider>,
        failure_threshold: usize,
        reset_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new("calendar", failure_threshold, reset_timeout),
            request_timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guarded<T, F>(&self, call: F) -> Result<T, CalendarError>
    where
        F: std::future::Future<Output = Result<T, CalendarError>> + Send,
    {
        if !self.breaker.check().await {
            return Err(CalendarError::CircuitOpen(self.breaker.name.clone()));
        }

        let result = match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CalendarError::Timeout),
        };

        match &result {
            Ok(_) => self.breaker.record_success().await,
            // The provider answered, so the circuit stays healthy.
            Err(CalendarError::Rejected(_)) => self.breaker.record_success().await,
            Err(_) => self.breaker.record_failure().await,
        }
        result
    }
}

#[async_trait]
impl CalendarProvider for ResilientCalendar {
    async fn create_event(&self, request: &CalendarEventRequest) -> Result<String, CalendarError> {
        self.guarded(self.inner.create_event(request)).await
    }

    async fn delete_event(
        &self,
        tenant_id: Uuid,
        calendar_id: Option<&str>,
        external_event_id: &str,
    ) -> Result<(), CalendarError> {
        self.guarded(self.inner.delete_event(tenant_id, calendar_id, external_event_id))
            .await
    }

    fn is_passthrough(&self) -> bool {
        self.inner.is_passthrough()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Unreachable {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CalendarProvider for Unreachable {
        async fn create_event(&self, _request: &CalendarEventRequest) -> Result<String, CalendarError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CalendarError::Unavailable("connection refused".to_string()))
        }

        async fn delete_event(&self, _: Uuid, _: Option<&str>, _: &str) -> Result<(), CalendarError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CalendarError::Unavailable("connection refused".to_string()))
        }
    }

    struct Slow;

    #[async_trait]
    impl CalendarProvider for Slow {
        async fn create_event(&self, _request: &CalendarEventRequest) -> Result<String, CalendarError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }

        async fn delete_event(&self, _: Uuid, _: Option<&str>, _: &str) -> Result<(), CalendarError> {
            Ok(())
        }
    }

    fn event() -> CalendarEventRequest {
        let start = Utc::now();
        CalendarEventRequest {
            tenant_id: Uuid::new_v4(),
            calendar_id: Some("primary".to_string()),
            appointment_id: Uuid::new_v4(),
            title: "Haircut - Ana".to_string(),
            description: None,
            start_time: start,
            end_time: start + chrono::Duration::minutes(30),
            timezone: "UTC".to_string(),
        }
    }

    #[tokio::test]
    async fn test_breaker_opens_and_fails_fast() {
        let inner = Arc::new(Unreachable { calls: AtomicUsize::new(0) });
        let calendar = ResilientCalendar::new(
            inner.clone(),
            2,
            Duration::from_secs(60),
            Duration::from_secs(1),
        );

        for _ in 0..2 {
            assert!(matches!(calendar.create_event(&event()).await, Err(CalendarError::Unavailable(_))));
        }
        assert_eq!(calendar.breaker().state().await, CircuitState::Open);

        let err = calendar.create_event(&event()).await.unwrap_err();
        assert_eq!(err, CalendarError::CircuitOpen("calendar".to_string()));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_half_open_probe_recloses_on_success() {
        let breaker = CircuitBreaker::new("calendar", 1, Duration::from_millis(0));
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        assert!(breaker.check().await);
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let calendar = ResilientCalendar::new(
            Arc::new(Slow),
            5,
            Duration::from_secs(30),
            Duration::from_millis(20),
        );
        assert_eq!(calendar.create_event(&event()).await, Err(CalendarError::Timeout));
    }

    #[tokio::test]
    async fn test_noop_provider_is_not_passthrough() {
        let noop = NoopCalendarProvider;
        assert!(!noop.is_passthrough());
        let request = event();
        let id = noop.create_event(&request).await.unwrap();
        assert!(id.starts_with("local-"));
    }
}
