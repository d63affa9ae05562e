//! Per-session spend tracking
//!
//! Every completed call is recorded against its session under one mutex, so
//! `spent_so_far` always equals the sum of the recorded call costs. A cap of
//! zero means unlimited.
//!
//! Parallel roles reserve their estimated cost before calling and release it
//! when the call ends ([`Reservation`] releases on drop). Reservations count
//! against the cap but never against `spent_so_far`.

use crate::registry::ModelId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Budget bookkeeping errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("Unknown budget session: {0}")]
    UnknownSession(String),

    #[error("Budget session already open: {0}")]
    SessionAlreadyOpen(String),
}

/// One completed, billed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub role: String,
    pub model: ModelId,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub cost: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Spend of one collaboration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBudget {
    pub session_id: String,

    /// Spending limit; zero means unlimited
    pub cap: Decimal,

    pub spent_so_far: Decimal,
    pub per_call_records: Vec<CallRecord>,
}

impl SessionBudget {
    pub fn new(session_id: impl Into<String>, cap: Decimal) -> Self {
        Self {
            session_id: session_id.into(),
            cap,
            spent_so_far: Decimal::ZERO,
            per_call_records: Vec::new(),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.cap.is_zero()
    }

    /// Money left under the cap, `None` when unlimited
    pub fn remaining(&self) -> Option<Decimal> {
        if self.is_unlimited() {
            None
        } else {
            Some((self.cap - self.spent_so_far).max(Decimal::ZERO))
        }
    }
}

#[derive(Debug)]
struct SessionState {
    budget: SessionBudget,
    reserved: Decimal,
}

impl SessionState {
    fn fits(&self, estimated_cost: Decimal) -> bool {
        self.budget.is_unlimited()
            || self.budget.spent_so_far + self.reserved + estimated_cost <= self.budget.cap
    }
}

/// Thread-safe budget ledger for all open sessions
#[derive(Debug, Default)]
pub struct BudgetTracker {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl BudgetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionState>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a session; an id that is still open is refused
    pub fn open_session(&self, session_id: &str, cap: Decimal) -> Result<SessionBudget, BudgetError> {
        let budget = SessionBudget::new(session_id, cap);
        match self.lock().entry(session_id.to_string()) {
            Entry::Occupied(_) => {
                warn!("Budget session {} is already open", session_id);
                Err(BudgetError::SessionAlreadyOpen(session_id.to_string()))
            },
            Entry::Vacant(slot) => {
                slot.insert(SessionState {
                    budget: budget.clone(),
                    reserved: Decimal::ZERO,
                });
                Ok(budget)
            },
        }
    }

    /// Stop tracking a session and return its final state
    pub fn close_session(&self, session_id: &str) -> Option<SessionBudget> {
        self.lock().remove(session_id).map(|state| state.budget)
    }

    /// Whether a call estimated at `estimated_cost` fits under the cap.
    /// Unknown sessions cannot afford anything.
    pub fn can_afford(&self, session_id: &str, estimated_cost: Decimal) -> bool {
        self.lock()
            .get(session_id)
            .is_some_and(|state| state.fits(estimated_cost))
    }

    /// Check and hold `estimated_cost` in one step
    pub fn try_reserve(&self, session_id: &str, estimated_cost: Decimal) -> Option<Reservation<'_>> {
        let mut sessions = self.lock();
        let state = sessions.get_mut(session_id)?;
        if !state.fits(estimated_cost) {
            debug!(
                "Budget session {} refused {} (spent {}, reserved {}, cap {})",
                session_id, estimated_cost, state.budget.spent_so_far, state.reserved, state.budget.cap
            );
            return None;
        }
        state.reserved += estimated_cost;
        Some(Reservation {
            tracker: self,
            session_id: session_id.to_string(),
            amount: estimated_cost,
        })
    }

    fn release(&self, session_id: &str, amount: Decimal) {
        if let Some(state) = self.lock().get_mut(session_id) {
            state.reserved = (state.reserved - amount).max(Decimal::ZERO);
        }
    }

    /// Record a completed call and return the updated session
    pub fn record(
        &self,
        session_id: &str,
        role: &str,
        model: &ModelId,
        input_tokens: usize,
        output_tokens: usize,
        actual_cost: Decimal,
    ) -> Result<SessionBudget, BudgetError> {
        let mut sessions = self.lock();
        let state = sessions
            .get_mut(session_id)
            .ok_or_else(|| BudgetError::UnknownSession(session_id.to_string()))?;

        state.budget.per_call_records.push(CallRecord {
            role: role.to_string(),
            model: model.clone(),
            input_tokens,
            output_tokens,
            cost: actual_cost,
            timestamp: Utc::now(),
        });
        state.budget.spent_so_far += actual_cost;

        if !state.budget.is_unlimited() && state.budget.spent_so_far > state.budget.cap {
            warn!(
                "Budget session {} overspent: {} of {}",
                session_id, state.budget.spent_so_far, state.budget.cap
            );
        }

        Ok(state.budget.clone())
    }

    /// Money left under the cap; `None` when unlimited or unknown
    pub fn remaining(&self, session_id: &str) -> Option<Decimal> {
        self.lock().get(session_id).and_then(|s| s.budget.remaining())
    }

    /// Clear recorded spend and reservations, keeping the cap
    pub fn reset(&self, session_id: &str) -> Result<(), BudgetError> {
        let mut sessions = self.lock();
        let state = sessions
            .get_mut(session_id)
            .ok_or_else(|| BudgetError::UnknownSession(session_id.to_string()))?;
        state.budget.spent_so_far = Decimal::ZERO;
        state.budget.per_call_records.clear();
        state.reserved = Decimal::ZERO;
        Ok(())
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionBudget> {
        self.lock().get(session_id).map(|s| s.budget.clone())
    }
}

/// Estimated cost held against a session until dropped
#[derive(Debug)]
pub struct Reservation<'a> {
    tracker: &'a BudgetTracker,
    session_id: String,
    amount: Decimal,
}

impl Reservation<'_> {
    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.tracker.release(&self.session_id, self.amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn model() -> ModelId {
        ModelId::new("deepseek", "deepseek-chat")
    }

    #[test]
    fn test_record_accumulates() {
        let tracker = BudgetTracker::new();
        tracker.open_session("s1", dec!(1.0)).unwrap();

        tracker.record("s1", "news_hunter", &model(), 1000, 500, dec!(0.25)).unwrap();
        let budget = tracker
            .record("s1", "risk_manager", &model(), 800, 200, dec!(0.10))
            .unwrap();

        assert_eq!(budget.spent_so_far, dec!(0.35));
        assert_eq!(budget.per_call_records.len(), 2);
        assert_eq!(budget.per_call_records[1].role, "risk_manager");
        assert_eq!(tracker.remaining("s1"), Some(dec!(0.65)));
    }

    #[test]
    fn test_can_afford_boundary() {
        let tracker = BudgetTracker::new();
        tracker.open_session("s1", dec!(1.0)).unwrap();
        tracker.record("s1", "a", &model(), 0, 0, dec!(0.5)).unwrap();

        assert!(tracker.can_afford("s1", dec!(0.5)));
        tracker.record("s1", "b", &model(), 0, 0, dec!(0.5)).unwrap();
        assert!(!tracker.can_afford("s1", dec!(0.5)));
        assert!(tracker.can_afford("s1", Decimal::ZERO));
        assert_eq!(tracker.remaining("s1"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_zero_cap_is_unlimited() {
        let tracker = BudgetTracker::new();
        tracker.open_session("s1", Decimal::ZERO).unwrap();
        tracker.record("s1", "a", &model(), 0, 0, dec!(1000)).unwrap();

        assert!(tracker.can_afford("s1", dec!(1000000)));
        assert_eq!(tracker.remaining("s1"), None);
    }

    #[test]
    fn test_unknown_session() {
        let tracker = BudgetTracker::new();
        assert!(!tracker.can_afford("missing", dec!(0.01)));
        assert!(tracker.try_reserve("missing", dec!(0.01)).is_none());
        assert!(matches!(
            tracker.record("missing", "a", &model(), 1, 1, dec!(0.01)),
            Err(BudgetError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_open_session_refuses_open_id() {
        let tracker = BudgetTracker::new();
        tracker.open_session("s1", Decimal::ZERO).unwrap();
        tracker.record("s1", "a", &model(), 10, 10, dec!(0.2)).unwrap();

        assert!(matches!(
            tracker.open_session("s1", dec!(5)),
            Err(BudgetError::SessionAlreadyOpen(id)) if id == "s1"
        ));
        // the open ledger is untouched
        let snapshot = tracker.snapshot("s1").unwrap();
        assert_eq!(snapshot.spent_so_far, dec!(0.2));
        assert!(snapshot.is_unlimited());

        tracker.close_session("s1").unwrap();
        assert!(tracker.open_session("s1", dec!(5)).is_ok());
    }

    #[test]
    fn test_reservation_counts_against_cap() {
        let tracker = BudgetTracker::new();
        tracker.open_session("s1", dec!(1.0)).unwrap();

        let first = tracker.try_reserve("s1", dec!(0.6)).unwrap();
        assert_eq!(first.amount(), dec!(0.6));
        assert!(tracker.try_reserve("s1", dec!(0.6)).is_none());

        drop(first);
        assert!(tracker.try_reserve("s1", dec!(0.6)).is_some());
        assert_eq!(tracker.snapshot("s1").unwrap().spent_so_far, Decimal::ZERO);
    }

    #[test]
    fn test_reset_and_close() {
        let tracker = BudgetTracker::new();
        tracker.open_session("s1", dec!(2.0)).unwrap();
        tracker.record("s1", "a", &model(), 10, 10, dec!(1.5)).unwrap();

        tracker.reset("s1").unwrap();
        let snapshot = tracker.snapshot("s1").unwrap();
        assert_eq!(snapshot.spent_so_far, Decimal::ZERO);
        assert!(snapshot.per_call_records.is_empty());
        assert_eq!(snapshot.cap, dec!(2.0));

        assert!(tracker.close_session("s1").is_some());
        assert!(tracker.snapshot("s1").is_none());
    }

    #[test]
    fn test_concurrent_records_keep_invariant() {
        let tracker = Arc::new(BudgetTracker::new());
        tracker.open_session("s1", Decimal::ZERO).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let role = format!("role-{worker}");
                        let cost = Decimal::new(i64::from(i % 7) + 1, 3);
                        tracker.record("s1", &role, &model(), 100, 50, cost).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let budget = tracker.snapshot("s1").unwrap();
        let sum: Decimal = budget.per_call_records.iter().map(|r| r.cost).sum();
        assert_eq!(budget.per_call_records.len(), 400);
        assert_eq!(budget.spent_so_far, sum);
    }
}
