//! Request pacing
//!
//! Hosts are paced by reservation: a caller books the next free slot on its
//! host and sleeps outside the lock, so concurrent callers for one host end
//! up `interval` apart and other hosts are never held up. A governor token
//! bucket caps the overall request rate.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

struct Schedule {
    next_free: Option<Instant>,
    interval: Duration,
}

/// Minimum spacing between requests to one host
#[derive(Clone)]
pub struct HostPacer {
    schedule: Arc<Mutex<Schedule>>,
}

impl HostPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            schedule: Arc::new(Mutex::new(Schedule {
                next_free: None,
                interval,
            })),
        }
    }

    fn schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Widen the spacing (robots.txt `Crawl-delay`); a smaller value is ignored
    pub fn raise_interval(&self, interval: Duration) {
        let mut schedule = self.schedule();
        schedule.interval = schedule.interval.max(interval);
    }

    pub fn interval(&self) -> Duration {
        self.schedule().interval
    }

    /// Book the next slot on this host and sleep until it comes up
    pub async fn wait(&self) {
        let slot = {
            let mut schedule = self.schedule();
            let now = Instant::now();
            let slot = schedule.next_free.filter(|t| *t > now).unwrap_or(now);
            schedule.next_free = Some(slot + schedule.interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            trace!("Pacing host: waiting {:?}", slot - now);
            sleep_until(slot).await;
        }
    }
}

/// Pacers keyed by `host[:port]`
#[derive(Clone, Default)]
pub struct HostPacers {
    pacers: Arc<Mutex<HashMap<String, HostPacer>>>,
}

impl HostPacers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pacer for `host`; `interval` only applies when the host is first seen
    pub fn for_host(&self, host: &str, interval: Duration) -> HostPacer {
        self.pacers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(host.to_string())
            .or_insert_with(|| HostPacer::new(interval))
            .clone()
    }
}

/// Requests-per-second cap across all hosts
pub struct GlobalRateLimiter {
    bucket: DefaultDirectRateLimiter,
}

impl GlobalRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));
        Self {
            bucket: RateLimiter::direct(Quota::per_second(rps)),
        }
    }

    pub async fn wait(&self) {
        self.bucket.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_requests_are_spaced() {
        let pacer = HostPacer::new(Duration::from_millis(100));

        let start = std::time::Instant::now();
        pacer.wait().await;
        pacer.wait().await;
        pacer.wait().await;

        // Two intervals between three requests
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_concurrent_callers_get_distinct_slots() {
        let pacer = HostPacer::new(Duration::from_millis(60));
        let start = std::time::Instant::now();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let pacer = pacer.clone();
                tokio::spawn(async move {
                    pacer.wait().await;
                    start.elapsed()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for waiter in waiters {
            finished.push(waiter.await.unwrap());
        }
        finished.sort();
        assert!(finished[2] >= Duration::from_millis(110));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let pacers = HostPacers::new();
        let slow = pacers.for_host("slow.example", Duration::from_millis(500));
        let fast = pacers.for_host("fast.example", Duration::ZERO);

        slow.wait().await;
        let waiting_on_slow = tokio::spawn({
            let slow = slow.clone();
            async move { slow.wait().await }
        });

        let start = std::time::Instant::now();
        fast.wait().await;
        fast.wait().await;
        assert!(start.elapsed() < Duration::from_millis(200));
        waiting_on_slow.abort();
    }

    #[test]
    fn test_registry_reuses_pacer_and_only_raises() {
        let pacers = HostPacers::new();
        let a = pacers.for_host("a.example", Duration::from_millis(10));
        a.raise_interval(Duration::from_millis(300));

        let again = pacers.for_host("a.example", Duration::from_millis(10));
        assert_eq!(again.interval(), Duration::from_millis(300));

        again.raise_interval(Duration::from_millis(50));
        assert_eq!(a.interval(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_global_rate_limiter() {
        let limiter = GlobalRateLimiter::new(100);
        for _ in 0..10 {
            limiter.wait().await;
        }
    }
}
