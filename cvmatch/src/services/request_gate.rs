//! Shared request gate for an external service
//!
//! Enforces a minimum interval between outbound calls with a one-request
//! burst (governor GCRA limiter). One gate instance is shared through `Arc`
//! by every caller of a service, so W workers together never exceed the
//! configured rate. A zero interval disables gating.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct RequestGate {
    limiter: Option<DirectLimiter>,
    min_interval: Duration,
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

impl RequestGate {
    pub fn new(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval)
            .map(|quota| quota.allow_burst(NonZeroU32::MIN))
            .map(RateLimiter::direct);

        Self {
            limiter,
            min_interval,
        }
    }

    pub fn shared(min_interval: Duration) -> Arc<Self> {
        Arc::new(Self::new(min_interval))
    }

    /// Gate that never waits
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next request may be sent
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_first_request_is_immediate_then_spaced() {
        let gate = RequestGate::new(Duration::from_millis(200));

        let start = Instant::now();
        gate.wait().await;
        let first_elapsed = start.elapsed();
        assert!(
            first_elapsed.as_millis() < 100,
            "First request should be immediate, took {:?}",
            first_elapsed
        );

        gate.wait().await;
        let second_elapsed = start.elapsed();
        assert!(
            second_elapsed.as_millis() >= 180,
            "Second request should wait ~200ms, took {:?}",
            second_elapsed
        );
    }

    #[tokio::test]
    async fn test_shared_gate_spaces_concurrent_callers() {
        let gate = RequestGate::shared(Duration::from_millis(100));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.wait().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let elapsed = start.elapsed();
        assert!(
            elapsed.as_millis() >= 280,
            "Four callers through one gate need ~300ms, took {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_separate_gates_do_not_interfere() {
        let gate1 = RequestGate::new(Duration::from_secs(1));
        let gate2 = RequestGate::new(Duration::from_secs(1));

        let start = Instant::now();
        gate1.wait().await;
        gate2.wait().await;
        assert!(start.elapsed().as_millis() < 100);
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let gate = RequestGate::unlimited();
        let start = Instant::now();
        for _ in 0..50 {
            gate.wait().await;
        }
        assert!(start.elapsed().as_millis() < 100);
        assert_eq!(gate.min_interval(), Duration::ZERO);
    }
}
