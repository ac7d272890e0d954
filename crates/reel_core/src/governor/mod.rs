//! Per-capability rate governor.
//!
//! Each class holds K tokens per period. A granted token returns to its
//! bucket exactly one period after it was taken, so no window of one period
//! ever sees more than K grants. Classes without a configured rate (or with
//! a rate of zero) are unlimited.
//!
//! Admission is not FIFO; waiters poll the earliest return time and race.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitSettings;
use crate::models::CapabilityClass;

/// Token-bucket gate shared by all producers of one runner.
pub struct RateGovernor {
    period: Duration,
    limits: HashMap<CapabilityClass, usize>,
    /// Grant times still inside the period, oldest first.
    grants: Mutex<HashMap<CapabilityClass, VecDeque<Instant>>>,
}

impl RateGovernor {
    /// Build a governor with explicit per-class limits.
    pub fn new(period: Duration, limits: impl IntoIterator<Item = (CapabilityClass, u32)>) -> Self {
        let limits = limits
            .into_iter()
            .filter(|(_, k)| *k > 0)
            .map(|(class, k)| (class, k as usize))
            .collect();
        Self {
            period,
            limits,
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let classes = [
            CapabilityClass::Speech,
            CapabilityClass::Image,
            CapabilityClass::TalkingClip,
        ];
        Self::new(
            Duration::from_secs(settings.period_secs),
            classes.map(|class| (class, settings.rate_for(class))),
        )
    }

    /// A governor that never blocks.
    pub fn unlimited() -> Self {
        Self::new(Duration::from_secs(60), [])
    }

    /// Configured limit for a class, None when unlimited.
    pub fn limit(&self, class: CapabilityClass) -> Option<usize> {
        self.limits.get(&class).copied()
    }

    /// Wait until a token for `class` is available and take it.
    pub async fn acquire(&self, class: CapabilityClass) {
        let Some(limit) = self.limit(class) else {
            return;
        };

        loop {
            // The lock is released before any await.
            let wake_at = {
                let now = Instant::now();
                let mut grants = self.grants.lock();
                let log = grants.entry(class).or_default();
                while log
                    .front()
                    .is_some_and(|taken| now.duration_since(*taken) >= self.period)
                {
                    log.pop_front();
                }

                if log.len() < limit {
                    log.push_back(now);
                    return;
                }
                match log.front() {
                    Some(oldest) => *oldest + self.period,
                    None => now,
                }
            };

            tracing::trace!(%class, "rate limited, waiting for a token");
            tokio::time::sleep_until(wake_at).await;
        }
    }

    /// Tokens currently available for a class.
    pub fn available(&self, class: CapabilityClass) -> Option<usize> {
        let limit = self.limit(class)?;
        let now = Instant::now();
        let grants = self.grants.lock();
        let in_window = grants
            .get(&class)
            .map(|log| {
                log.iter()
                    .filter(|taken| now.duration_since(**taken) < self.period)
                    .count()
            })
            .unwrap_or(0);
        Some(limit.saturating_sub(in_window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn paused_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_class_never_blocks() {
        let governor = RateGovernor::new(Duration::from_secs(60), [(CapabilityClass::Image, 1)]);
        let start = Instant::now();
        for _ in 0..50 {
            governor.acquire(CapabilityClass::Speech).await;
        }
        assert_eq!(Instant::now(), start);
        assert_eq!(governor.available(CapabilityClass::Speech), None);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rate_is_unlimited() {
        let governor =
            RateGovernor::new(Duration::from_secs(60), [(CapabilityClass::TalkingClip, 0)]);
        assert_eq!(governor.limit(CapabilityClass::TalkingClip), None);
        governor.acquire(CapabilityClass::TalkingClip).await;
    }

    #[tokio::test(start_paused = true)]
    async fn token_returns_one_period_after_grant() {
        let period = Duration::from_secs(60);
        let governor = RateGovernor::new(period, [(CapabilityClass::Image, 2)]);
        let start = Instant::now();

        governor.acquire(CapabilityClass::Image).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        governor.acquire(CapabilityClass::Image).await;
        assert_eq!(governor.available(CapabilityClass::Image), Some(0));

        // Third grant waits for the first token to come back at t=60
        governor.acquire(CapabilityClass::Image).await;
        assert_eq!(Instant::now() - start, period);
    }

    #[derive(Debug, Clone)]
    struct Case {
        workers: usize,
        calls_per_worker: usize,
        limit: u32,
        period_secs: u64,
        work_ms: Vec<u64>,
    }

    fn case() -> impl Strategy<Value = Case> {
        (1usize..8, 1usize..5, 1u32..5, 1u64..30).prop_flat_map(
            |(workers, calls_per_worker, limit, period_secs)| {
                proptest::collection::vec(0u64..3_000, workers * calls_per_worker).prop_map(
                    move |work_ms| Case {
                        workers,
                        calls_per_worker,
                        limit,
                        period_secs,
                        work_ms,
                    },
                )
            },
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn never_more_than_limit_in_any_window(case in case()) {
            let period = Duration::from_secs(case.period_secs);
            let grants = paused_runtime().block_on(async {
                let governor = Arc::new(RateGovernor::new(
                    period,
                    [(CapabilityClass::Image, case.limit)],
                ));
                let log = Arc::new(Mutex::new(Vec::new()));
                let mut handles = Vec::new();

                for worker in 0..case.workers {
                    let governor = governor.clone();
                    let log = log.clone();
                    let work: Vec<u64> = case.work_ms
                        [worker * case.calls_per_worker..(worker + 1) * case.calls_per_worker]
                        .to_vec();
                    handles.push(tokio::spawn(async move {
                        for ms in work {
                            governor.acquire(CapabilityClass::Image).await;
                            log.lock().push(Instant::now());
                            tokio::time::sleep(Duration::from_millis(ms)).await;
                        }
                    }));
                }
                for handle in handles {
                    handle.await.unwrap();
                }
                let mut grants = log.lock().clone();
                grants.sort();
                grants
            });

            prop_assert_eq!(grants.len(), case.workers * case.calls_per_worker);
            let k = case.limit as usize;
            // Any K+1 consecutive grants must span at least one full period.
            for window in grants.windows(k + 1) {
                prop_assert!(window[k] - window[0] >= period);
            }
        }
    }
}
