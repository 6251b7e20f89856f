//! Correlation table: request id -> single-assignment result slot.
//!
//! Flow:
//! 1. Engine generates a `RequestId`
//! 2. Engine calls `begin()` to get a oneshot receiver (the slot)
//! 3. Engine sends the request over the peer's connection
//! 4. Inbound routing decodes a reply and calls `resolve()`
//! 5. Engine awaits the receiver; on timeout or cancellation it calls `reclaim()`
//!
//! Every operation that finishes a call removes the entry from the map first,
//! so a resolve racing a reclaim has exactly one winner and the loser finds
//! nothing to do.

use crate::domain::error::CorrelationError;
use crate::domain::ids::RequestId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

/// What a resolved slot carries.
///
/// Being resolved is signalled by the value arriving at all, so a peer
/// returning `null` is still a successful reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerReply {
    pub status: i32,
    pub result: serde_json::Value,
}

/// Receiving half of a slot
pub type Slot = oneshot::Receiver<PeerReply>;

/// Why a slot was reclaimed without a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimReason {
    Timeout,
    Cancelled,
    SendFailed,
}

/// A call waiting for its reply
struct PendingCall {
    sender: oneshot::Sender<PeerReply>,
    created_at: Instant,
    action: String,
}

/// Counters for the correlation table
#[derive(Debug, Default)]
pub struct CorrelationStats {
    pub total_begun: AtomicU64,
    pub total_resolved: AtomicU64,
    pub total_timeouts: AtomicU64,
    pub total_cancelled: AtomicU64,
    pub total_send_failures: AtomicU64,
    /// Replies that matched no pending call
    pub total_unmatched: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub pending: usize,
    pub begun: u64,
    pub resolved: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub send_failures: u64,
    pub unmatched_replies: u64,
}

/// Maps outstanding request ids to the slot that will receive the reply.
#[derive(Default)]
pub struct CorrelationTable {
    pending: DashMap<RequestId, PendingCall>,
    stats: CorrelationStats,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh slot for `request_id`.
    pub fn begin(&self, request_id: RequestId, action: &str) -> Result<Slot, CorrelationError> {
        match self.pending.entry(request_id) {
            Entry::Occupied(entry) => Err(CorrelationError::DuplicateRequestId(entry.key().clone())),
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel();
                debug!(request_id = %entry.key(), action = action, "Registered pending call");
                entry.insert(PendingCall {
                    sender: tx,
                    created_at: Instant::now(),
                    action: action.to_string(),
                });
                self.stats.total_begun.fetch_add(1, Ordering::Relaxed);
                Ok(rx)
            }
        }
    }

    /// Deliver a reply to whoever waits on `request_id`.
    ///
    /// Returns false when nothing is pending under that id (late or unmatched
    /// reply) or the waiter already went away; the reply is then discarded.
    pub fn resolve(&self, request_id: &RequestId, reply: PeerReply) -> bool {
        let Some((_, call)) = self.pending.remove(request_id) else {
            self.stats.total_unmatched.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %request_id, "Reply for unknown or expired request id");
            return false;
        };

        let elapsed = call.created_at.elapsed();
        match call.sender.send(reply) {
            Ok(()) => {
                self.stats.total_resolved.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = %request_id,
                    action = call.action,
                    response_time_ms = elapsed.as_millis(),
                    "Resolved pending call"
                );
                true
            }
            Err(_) => {
                // Waiter dropped between removal and delivery
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(request_id = %request_id, action = call.action, "Pending call receiver dropped");
                false
            }
        }
    }

    /// Remove the slot without delivering anything. Idempotent.
    pub fn reclaim(&self, request_id: &RequestId, reason: ReclaimReason) -> bool {
        let Some((_, call)) = self.pending.remove(request_id) else {
            return false;
        };

        let counter = match reason {
            ReclaimReason::Timeout => &self.stats.total_timeouts,
            ReclaimReason::Cancelled => &self.stats.total_cancelled,
            ReclaimReason::SendFailed => &self.stats.total_send_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        debug!(
            request_id = %request_id,
            action = call.action,
            reason = ?reason,
            elapsed_ms = call.created_at.elapsed().as_millis(),
            "Reclaimed pending call"
        );
        true
    }

    /// Drop every slot; their waiters observe a closed channel.
    pub fn drain(&self) -> usize {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.reclaim(id, ReclaimReason::Cancelled))
            .count()
    }

    /// Number of currently pending calls
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.contains_key(request_id)
    }

    pub fn stats(&self) -> &CorrelationStats {
        &self.stats
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pending: self.pending_count(),
            begun: self.stats.total_begun.load(Ordering::Relaxed),
            resolved: self.stats.total_resolved.load(Ordering::Relaxed),
            timeouts: self.stats.total_timeouts.load(Ordering::Relaxed),
            cancelled: self.stats.total_cancelled.load(Ordering::Relaxed),
            send_failures: self.stats.total_send_failures.load(Ordering::Relaxed),
            unmatched_replies: self.stats.total_unmatched.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn reply(v: serde_json::Value) -> PeerReply {
        PeerReply {
            status: 200,
            result: v,
        }
    }

    #[tokio::test]
    async fn test_begin_and_resolve() {
        let table = CorrelationTable::new();
        let id = RequestId::from("req-1");

        let slot = table.begin(id.clone(), "echo").unwrap();
        assert!(table.is_pending(&id));
        assert_eq!(table.pending_count(), 1);

        assert!(table.resolve(&id, reply(serde_json::json!("hi"))));
        assert_eq!(slot.await.unwrap().result, serde_json::json!("hi"));
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_null_result_is_still_resolved() {
        let table = CorrelationTable::new();
        let id = RequestId::from("req-null");
        let slot = table.begin(id.clone(), "noop").unwrap();

        assert!(table.resolve(&id, reply(serde_json::Value::Null)));
        let delivered = slot.await.unwrap();
        assert_eq!(delivered.result, serde_json::Value::Null);
    }

    #[test]
    fn test_duplicate_begin_rejected() {
        let table = CorrelationTable::new();
        let id = RequestId::from("dup");
        let _slot = table.begin(id.clone(), "a").unwrap();
        assert!(matches!(
            table.begin(id, "b"),
            Err(CorrelationError::DuplicateRequestId(_))
        ));
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn test_resolve_unknown_id() {
        let table = CorrelationTable::new();
        assert!(!table.resolve(&RequestId::from("nope"), reply(serde_json::Value::Null)));
        assert_eq!(table.snapshot().unmatched_replies, 1);
    }

    #[tokio::test]
    async fn test_reclaim_then_late_reply_discarded() {
        let table = CorrelationTable::new();
        let id = RequestId::from("late");
        let slot = table.begin(id.clone(), "slow").unwrap();

        assert!(table.reclaim(&id, ReclaimReason::Timeout));
        assert!(!table.reclaim(&id, ReclaimReason::Timeout));
        assert!(!table.resolve(&id, reply(serde_json::json!(1))));

        // sender dropped with the entry, nothing delivered
        assert!(slot.await.is_err());
        let stats = table.snapshot();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.resolved, 0);
    }

    #[tokio::test]
    async fn test_drain_closes_all_slots() {
        let table = CorrelationTable::new();
        let a = table.begin(RequestId::from("a"), "x").unwrap();
        let b = table.begin(RequestId::from("b"), "y").unwrap();

        assert_eq!(table.drain(), 2);
        assert_eq!(table.pending_count(), 0);
        assert!(a.await.is_err());
        assert!(b.await.is_err());
        assert_eq!(table.snapshot().cancelled, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolve_and_reclaim_single_winner() {
        let table = Arc::new(CorrelationTable::new());

        for i in 0..200 {
            let id = RequestId::from(format!("race-{}", i));
            let slot = table.begin(id.clone(), "race").unwrap();

            let t1 = Arc::clone(&table);
            let id1 = id.clone();
            let resolver =
                tokio::spawn(async move { t1.resolve(&id1, reply(serde_json::json!(i))) });

            let t2 = Arc::clone(&table);
            let id2 = id.clone();
            let reclaimer =
                tokio::spawn(async move { t2.reclaim(&id2, ReclaimReason::Timeout) });

            let resolved = resolver.await.unwrap();
            let reclaimed = reclaimer.await.unwrap();
            assert!(resolved ^ reclaimed, "exactly one winner for {}", id);
            assert_eq!(slot.await.is_ok(), resolved);
            assert!(!table.is_pending(&id));
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Resolve,
        Reclaim,
    }

    proptest! {
        #[test]
        fn prop_exactly_one_outcome(ops in prop::collection::vec(
            prop_oneof![Just(Op::Resolve), Just(Op::Reclaim)], 1..8)
        ) {
            let table = CorrelationTable::new();
            let id = RequestId::from("prop");
            let mut slot = table.begin(id.clone(), "prop").unwrap();

            let wins: Vec<bool> = ops
                .iter()
                .map(|op| match op {
                    Op::Resolve => table.resolve(&id, reply(serde_json::json!("v"))),
                    Op::Reclaim => table.reclaim(&id, ReclaimReason::Timeout),
                })
                .collect();

            prop_assert_eq!(wins.iter().filter(|w| **w).count(), 1);
            prop_assert!(wins[0]);
            let delivered = slot.try_recv().is_ok();
            prop_assert_eq!(delivered, matches!(ops[0], Op::Resolve));
            prop_assert_eq!(table.pending_count(), 0);
        }
    }
}
