use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Sliding-window limiter keyed by an arbitrary identifier (the user id).
#[derive(Debug)]
pub struct RateLimiter {
    requests: RwLock<HashMap<String, Vec<Instant>>>,
    max_requests: usize,
    window_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_duration: Duration) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            max_requests,
            window_duration,
        }
    }

    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub async fn allow(&self, identifier: &str) -> bool {
        let now = Instant::now();

        let mut requests = self.requests.write().await;
        let request_times = requests.entry(identifier.to_string()).or_default();

        request_times.retain(|&time| now.duration_since(time) < self.window_duration);

        if request_times.len() < self.max_requests {
            request_times.push(now);
            true
        } else {
            false
        }
    }

    pub async fn remaining(&self, identifier: &str) -> usize {
        let now = Instant::now();

        let requests = self.requests.read().await;
        match requests.get(identifier) {
            Some(request_times) => {
                let recent = request_times
                    .iter()
                    .filter(|&&time| now.duration_since(time) < self.window_duration)
                    .count();
                self.max_requests.saturating_sub(recent)
            }
            None => self.max_requests,
        }
    }

    pub async fn reset(&self, identifier: &str) {
        let mut requests = self.requests.write().await;
        requests.remove(identifier);
    }

    pub async fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        for request_times in requests.values_mut() {
            request_times.retain(|&time| now.duration_since(time) < self.window_duration);
        }

        requests.retain(|_, times| !times.is_empty());
    }

    pub async fn tracked(&self) -> usize {
        self.requests.read().await.len()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));

        assert!(limiter.allow("alice").await);
        assert!(limiter.allow("alice").await);
        assert!(limiter.allow("alice").await);
        assert!(!limiter.allow("alice").await);

        // Other users have their own window.
        assert!(limiter.allow("bob").await);
    }

    #[tokio::test]
    async fn test_rate_limiter_window() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100));

        assert!(limiter.allow("alice").await);
        assert!(limiter.allow("alice").await);
        assert!(!limiter.allow("alice").await);

        sleep(Duration::from_millis(150)).await;

        assert!(limiter.allow("alice").await);
    }

    #[tokio::test]
    async fn test_remaining_and_reset() {
        let limiter = RateLimiter::per_minute(5);
        assert_eq!(limiter.remaining("alice").await, 5);

        limiter.allow("alice").await;
        limiter.allow("alice").await;
        assert_eq!(limiter.remaining("alice").await, 3);

        limiter.reset("alice").await;
        assert_eq!(limiter.remaining("alice").await, 5);
    }

    #[tokio::test]
    async fn test_cleanup() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        limiter.allow("alice").await;
        limiter.allow("bob").await;

        sleep(Duration::from_millis(100)).await;
        limiter.cleanup_expired().await;

        assert_eq!(limiter.tracked().await, 0);
    }
}
