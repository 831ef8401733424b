//! Cost Tracker: the one piece of mutable shared state touched by
//! concurrently-executing plan steps.
//!
//! Keyed by session id so a long-lived Orchestrator can track many
//! concurrent conversations against independent caps, with `total_cost`
//! available as the all-sessions-ever figure.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `cost = input_tokens / 1000 * price_in_per_1k + output_tokens / 1000 * price_out_per_1k`.
///
/// Deliberately distinct from any per-million-token pricing convention used
/// elsewhere for general-purpose agent-loop usage metering.
pub fn calculate_cost(
    input_tokens: u64,
    output_tokens: u64,
    price_in_per_1k: f64,
    price_out_per_1k: f64,
) -> f64 {
    (input_tokens as f64 / 1000.0) * price_in_per_1k
        + (output_tokens as f64 / 1000.0) * price_out_per_1k
}

/// Per-1k-token pricing for a single connector role, used to estimate a call's
/// cost for [`CostTracker::can_proceed`] before the call is made.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectorPricing {
    pub price_in_per_1k: f64,
    pub price_out_per_1k: f64,
}

/// A single priced external call, retained for `summary()` reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub query_id: String,
    pub session_id: String,
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

/// Soft/hard spend limits, shared across all sessions in a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostLimit {
    pub soft_cap_usd: f64,
    pub hard_cap_usd: f64,
}

impl Default for CostLimit {
    fn default() -> Self {
        Self {
            soft_cap_usd: 0.50,
            hard_cap_usd: 1.00,
        }
    }
}

/// Verdict from [`CostTracker::can_proceed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProceedReason {
    Ok,
    SoftCapWarning,
    HardCapExceeded,
    ManualOverride,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProceedVerdict {
    pub allowed: bool,
    pub reason: ProceedReason,
}

/// Totals as of a point in time, for presenting to a user or caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub session_cost_usd: f64,
    pub total_cost_usd: f64,
    pub call_count: u64,
    pub soft_cap_reached: bool,
    pub hard_cap_reached: bool,
}

#[derive(Default)]
struct TrackerState {
    session_totals: HashMap<String, f64>,
    records: Vec<CostRecord>,
    total_cost_usd: f64,
    manual_override: bool,
}

/// Tracks cumulative spend per session against a shared [`CostLimit`].
///
/// `Mutex`-guarded rather than lock-free: `track` and `can_proceed` must
/// observe and update the running total atomically with respect to each
/// other. Calls happen at LLM-round-trip cadence, not hot-loop cadence, so
/// lock contention is not a concern.
pub struct CostTracker {
    limit: CostLimit,
    state: Mutex<TrackerState>,
}

impl CostTracker {
    pub fn new(limit: CostLimit) -> Self {
        Self {
            limit,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Would adding `estimated_cost_usd` to `session`'s running total be
    /// allowed, and why?
    ///
    /// Hard cap is checked first: denied unless the call is critical and a
    /// manual override is active. Soft cap is checked second: always
    /// allowed, but flagged. Anything else is a plain `ok`.
    pub fn can_proceed(
        &self,
        session: &str,
        estimated_cost_usd: f64,
        is_critical: bool,
    ) -> ProceedVerdict {
        let state = self.lock();
        let current = state.session_totals.get(session).copied().unwrap_or(0.0);
        let projected = current + estimated_cost_usd;

        if projected >= self.limit.hard_cap_usd {
            if is_critical && state.manual_override {
                return ProceedVerdict {
                    allowed: true,
                    reason: ProceedReason::ManualOverride,
                };
            }
            return ProceedVerdict {
                allowed: false,
                reason: ProceedReason::HardCapExceeded,
            };
        }

        if projected >= self.limit.soft_cap_usd {
            return ProceedVerdict {
                allowed: true,
                reason: ProceedReason::SoftCapWarning,
            };
        }

        ProceedVerdict {
            allowed: true,
            reason: ProceedReason::Ok,
        }
    }

    /// Append a completed, already-priced call and update its session total.
    pub fn track(&self, record: CostRecord) {
        let mut state = self.lock();
        *state.session_totals.entry(record.session_id.clone()).or_insert(0.0) += record.cost_usd;
        state.total_cost_usd += record.cost_usd;
        state.records.push(record);
    }

    /// Enable the hard-cap override for subsequent critical calls, across
    /// all sessions. There is no corresponding disable: an override is
    /// scoped to this tracker's lifetime, by design.
    pub fn enable_manual_override(&self) {
        self.lock().manual_override = true;
    }

    pub fn session_cost(&self, session: &str) -> f64 {
        self.lock().session_totals.get(session).copied().unwrap_or(0.0)
    }

    pub fn total_cost(&self) -> f64 {
        self.lock().total_cost_usd
    }

    pub fn soft_cap_reached(&self, session: &str) -> bool {
        self.session_cost(session) >= self.limit.soft_cap_usd
    }

    pub fn hard_cap_reached(&self, session: &str) -> bool {
        self.session_cost(session) >= self.limit.hard_cap_usd
    }

    pub fn summary(&self, session: &str) -> CostSummary {
        let state = self.lock();
        let session_cost_usd = state.session_totals.get(session).copied().unwrap_or(0.0);
        let call_count = state
            .records
            .iter()
            .filter(|r| r.session_id == session)
            .count() as u64;
        CostSummary {
            session_cost_usd,
            total_cost_usd: state.total_cost_usd,
            call_count,
            soft_cap_reached: session_cost_usd >= self.limit.soft_cap_usd,
            hard_cap_reached: session_cost_usd >= self.limit.hard_cap_usd,
        }
    }
}

fn record(session: &str, model: &str, input_tokens: u64, output_tokens: u64, cost_usd: f64) -> CostRecord {
    CostRecord {
        query_id: uuid::Uuid::new_v4().to_string(),
        session_id: session.to_string(),
        model_id: model.to_string(),
        input_tokens,
        output_tokens,
        cost_usd,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculate_cost_is_per_1k_not_per_million() {
        assert_eq!(calculate_cost(1000, 1000, 1.0, 2.0), 3.0);
    }

    #[test]
    fn can_proceed_ok_below_soft_cap() {
        let tracker = CostTracker::new(CostLimit {
            soft_cap_usd: 0.5,
            hard_cap_usd: 1.0,
        });
        let verdict = tracker.can_proceed("s1", 0.01, false);
        assert!(verdict.allowed);
        assert_eq!(verdict.reason, ProceedReason::Ok);
    }

    #[test]
    fn can_proceed_warns_at_soft_cap() {
        let tracker = CostTracker::new(CostLimit {
            soft_cap_usd: 0.10,
            hard_cap_usd: 1.0,
        });
        tracker.track(record("s1", "fast", 1000, 1000, 0.10));
        let verdict = tracker.can_proceed("s1", 0.001, false);
        assert!(verdict.allowed);
        assert_eq!(verdict.reason, ProceedReason::SoftCapWarning);
    }

    #[test]
    fn can_proceed_denies_at_hard_cap_without_override() {
        let tracker = CostTracker::new(CostLimit {
            soft_cap_usd: 0.5,
            hard_cap_usd: 1.0,
        });
        tracker.track(record("s1", "strong", 1000, 1000, 1.0));
        let verdict = tracker.can_proceed("s1", 0.01, false);
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, ProceedReason::HardCapExceeded);
    }

    #[test]
    fn can_proceed_allows_critical_with_manual_override() {
        let tracker = CostTracker::new(CostLimit {
            soft_cap_usd: 0.5,
            hard_cap_usd: 1.0,
        });
        tracker.track(record("s1", "strong", 1000, 1000, 1.0));
        tracker.enable_manual_override();
        let verdict = tracker.can_proceed("s1", 0.01, true);
        assert!(verdict.allowed);
        assert_eq!(verdict.reason, ProceedReason::ManualOverride);
    }

    #[test]
    fn can_proceed_denies_critical_without_override_even_at_hard_cap() {
        let tracker = CostTracker::new(CostLimit {
            soft_cap_usd: 0.5,
            hard_cap_usd: 1.0,
        });
        tracker.track(record("s1", "strong", 1000, 1000, 1.0));
        let verdict = tracker.can_proceed("s1", 0.01, true);
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, ProceedReason::HardCapExceeded);
    }

    #[test]
    fn sessions_are_tracked_independently() {
        let tracker = CostTracker::new(CostLimit::default());
        tracker.track(record("s1", "fast", 1000, 1000, 0.4));
        assert_eq!(tracker.session_cost("s1"), 0.4);
        assert_eq!(tracker.session_cost("s2"), 0.0);
        assert_eq!(tracker.total_cost(), 0.4);
    }

    #[test]
    fn cost_cap_scenario_soft_then_hard() {
        let tracker = CostTracker::new(CostLimit {
            soft_cap_usd: 0.08,
            hard_cap_usd: 0.10,
        });
        tracker.track(record("s1", "fast", 1000, 1000, 0.08));
        assert!(tracker.soft_cap_reached("s1"));
        assert!(!tracker.hard_cap_reached("s1"));

        tracker.track(record("s1", "fast", 1000, 1000, 0.02));
        assert!(tracker.hard_cap_reached("s1"));
        let verdict = tracker.can_proceed("s1", 0.001, false);
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason, ProceedReason::HardCapExceeded);
    }

    #[test]
    fn track_conserves_cost_across_calls() {
        let tracker = CostTracker::new(CostLimit::default());
        tracker.track(record("s1", "fast", 100, 100, 0.01));
        tracker.track(record("s1", "fast", 200, 50, 0.02));
        let summary = tracker.summary("s1");
        assert!((summary.session_cost_usd - 0.03).abs() < 1e-9);
        assert_eq!(summary.call_count, 2);
    }

    #[test]
    fn concurrent_track_calls_conserve_total_cost() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(CostTracker::new(CostLimit {
            soft_cap_usd: 1000.0,
            hard_cap_usd: 2000.0,
        }));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    tracker.track(record("s1", "fast", 1, 1, 0.001));
                }
            }));
        }
        for h in handles {
            let _ = h.join();
        }
        let summary = tracker.summary("s1");
        assert_eq!(summary.call_count, 800);
        assert!((summary.session_cost_usd - 0.8).abs() < 1e-6);
    }
}
