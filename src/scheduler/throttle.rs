use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window limiter keyed by user id.
///
/// At most `limit` acquisitions per user fall within any `period`; callers
/// beyond that wait until the oldest acquisition leaves the window.
#[derive(Debug, Clone)]
pub struct UserThrottle {
    limit: usize,
    period: Duration,
    windows: Arc<Mutex<HashMap<i32, VecDeque<Instant>>>>,
}

impl UserThrottle {
    pub fn new(limit: usize, period: Duration) -> Self {
        Self {
            limit: limit.max(1),
            period,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Waits until `user_id` may proceed and records the acquisition.
    pub async fn acquire(&self, user_id: i32) {
        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                let now = Instant::now();
                // Users with no acquisition left in their window are dropped.
                windows.retain(|_, window| {
                    while window
                        .front()
                        .is_some_and(|&oldest| now.duration_since(oldest) >= self.period)
                    {
                        window.pop_front();
                    }
                    !window.is_empty()
                });
                let window = windows.entry(user_id).or_default();

                if window.len() < self.limit {
                    window.push_back(now);
                    return;
                }
                match window.front() {
                    Some(&oldest) => (oldest + self.period).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!("User {} is throttled for {:?}", user_id, wait);
            tokio::time::sleep(wait).await;
        }
    }

    #[cfg(test)]
    async fn tracked_users(&self) -> usize {
        self.windows.lock().await.len()
    }
}
