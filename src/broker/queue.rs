//! The three bounded priority FIFOs and the backpressure/circuit-breaker
//! policy that guards them (SPEC_FULL §4.1).

// Layer 1: Standard library imports
use std::collections::VecDeque;
use std::time::Duration;

// Layer 2: Third-party crate imports
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{error, warn};

// Layer 3: Internal module imports
use super::metrics::BrokerMetrics;
use crate::message::{Message, MessagePriority};

/// Result of attempting to enqueue a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The message was accepted onto its target queue.
    Enqueued,
    /// The message was dropped by the backpressure policy.
    Dropped,
}

/// Three bounded FIFOs (`high`, `normal`, `low`) sharing one capacity and
/// one circuit-breaker flag, implementing SPEC_FULL §4.1's eviction
/// policy.
///
/// Each tier is a `parking_lot::Mutex<VecDeque<Message>>` rather than a
/// `tokio::sync::mpsc` channel: the backpressure policy needs to evict
/// specific low-priority entries to make room for high-priority ones,
/// which an mpsc channel does not expose. A `tokio::sync::Notify` wakes
/// waiting workers without polling.
pub struct PriorityQueues {
    high: Mutex<VecDeque<Message>>,
    normal: Mutex<VecDeque<Message>>,
    low: Mutex<VecDeque<Message>>,
    capacity: usize,
    notify: Notify,
    metrics: std::sync::Arc<BrokerMetrics>,
}

fn threshold_b(capacity: usize) -> usize {
    (capacity as f64 * 0.8).ceil() as usize
}

fn threshold_c(capacity: usize) -> usize {
    (capacity as f64 * 0.95).ceil() as usize
}

impl PriorityQueues {
    /// Build a new queue set. `capacity` is the per-tier maximum, default
    /// 1000 per SPEC_FULL §4.1.
    pub fn new(capacity: usize, metrics: std::sync::Arc<BrokerMetrics>) -> Self {
        Self {
            high: Mutex::new(VecDeque::new()),
            normal: Mutex::new(VecDeque::new()),
            low: Mutex::new(VecDeque::new()),
            capacity,
            notify: Notify::new(),
            metrics,
        }
    }

    fn tier(&self, priority: MessagePriority) -> &Mutex<VecDeque<Message>> {
        match priority {
            MessagePriority::High => &self.high,
            MessagePriority::Normal => &self.normal,
            MessagePriority::Low => &self.low,
        }
    }

    /// Current depth of each tier, in `(high, normal, low)` order.
    pub fn depths(&self) -> (usize, usize, usize) {
        (self.high.lock().len(), self.normal.lock().len(), self.low.lock().len())
    }

    fn recompute_circuit_breaker(&self) {
        let (h, n, l) = self.depths();
        let b = threshold_b(self.capacity);
        let tripped = h >= b || n >= b || l >= b;
        self.metrics.set_circuit_breaker(tripped);
    }

    /// Enqueue `message` onto the tier for `priority`, applying the
    /// threshold_b / threshold_c backpressure policy.
    pub fn enqueue(&self, message: Message, priority: MessagePriority) -> EnqueueOutcome {
        let b = threshold_b(self.capacity);
        let c = threshold_c(self.capacity);
        let tier = self.tier(priority);

        {
            let len = tier.lock().len();
            if len >= c && priority != MessagePriority::High {
                self.metrics.record_dropped();
                self.metrics.record_backpressure_event();
                self.metrics.set_circuit_breaker(true);
                warn!(message_type = %message.message_type, %len, "dropping message: queue at or above 95% capacity");
                return EnqueueOutcome::Dropped;
            }

            if priority == MessagePriority::High && len >= b {
                let mut low = self.low.lock();
                for _ in 0..3 {
                    if low.pop_front().is_some() {
                        self.metrics.record_dropped();
                        self.metrics.record_backpressure_event();
                    } else {
                        break;
                    }
                }
            }
        }

        let mut guard = tier.lock();
        if guard.len() < self.capacity {
            guard.push_back(message);
            drop(guard);
            self.notify.notify_one();
            self.recompute_circuit_breaker();
            return EnqueueOutcome::Enqueued;
        }
        drop(guard);

        if priority == MessagePriority::High {
            let popped = self.low.lock().pop_front().is_some();
            if popped {
                self.metrics.record_dropped();
                self.metrics.record_backpressure_event();
            }
            let mut guard = tier.lock();
            if guard.len() < self.capacity {
                guard.push_back(message);
                drop(guard);
                self.notify.notify_one();
                self.recompute_circuit_breaker();
                return EnqueueOutcome::Enqueued;
            }
            error!(message_type = %message.message_type, "dropping high-priority message: queue still full after eviction retry");
        }

        self.metrics.record_dropped();
        self.metrics.record_backpressure_event();
        EnqueueOutcome::Dropped
    }

    /// Non-blocking pop across all three tiers, high first.
    pub fn try_dequeue(&self) -> Option<Message> {
        let result = self
            .high
            .lock()
            .pop_front()
            .or_else(|| self.normal.lock().pop_front())
            .or_else(|| self.low.lock().pop_front());
        if result.is_some() {
            self.recompute_circuit_breaker();
        }
        result
    }

    /// Pop across all three tiers, waiting up to `timeout` for a new
    /// arrival if all three are currently empty.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Message> {
        if let Some(msg) = self.try_dequeue() {
            return Some(msg);
        }
        let wait = self.notify.notified();
        tokio::select! {
            _ = wait => self.try_dequeue(),
            _ = tokio::time::sleep(timeout) => self.try_dequeue(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn queues(capacity: usize) -> PriorityQueues {
        PriorityQueues::new(capacity, Arc::new(BrokerMetrics::new()))
    }

    fn msg(kind: &str) -> Message {
        Message::new("sender", None, kind)
    }

    #[test]
    fn drains_high_before_normal_before_low() {
        let q = queues(10);
        q.enqueue(msg("low_a"), MessagePriority::Low);
        q.enqueue(msg("normal_a"), MessagePriority::Normal);
        q.enqueue(msg("high_a"), MessagePriority::High);

        assert_eq!(q.try_dequeue().unwrap().message_type, "high_a");
        assert_eq!(q.try_dequeue().unwrap().message_type, "normal_a");
        assert_eq!(q.try_dequeue().unwrap().message_type, "low_a");
        assert!(q.try_dequeue().is_none());
    }

    #[test]
    fn fifo_within_a_tier() {
        let q = queues(10);
        q.enqueue(msg("first"), MessagePriority::Normal);
        q.enqueue(msg("second"), MessagePriority::Normal);

        assert_eq!(q.try_dequeue().unwrap().message_type, "first");
        assert_eq!(q.try_dequeue().unwrap().message_type, "second");
    }

    #[test]
    fn drops_low_priority_at_threshold_c() {
        let q = queues(10);
        for _ in 0..9 {
            q.enqueue(msg("filler"), MessagePriority::Low);
        }
        // threshold_c(10) = ceil(9.5) = 10, so at 9 items (>= 95% rounds to 10)
        // push one more to actually cross the computed boundary deterministically
        for _ in 0..1 {
            q.enqueue(msg("filler"), MessagePriority::Low);
        }
        let outcome = q.enqueue(msg("overflow"), MessagePriority::Low);
        assert_eq!(outcome, EnqueueOutcome::Dropped);
    }

    #[test]
    fn high_priority_evicts_low_priority_to_make_room() {
        let q = queues(10);
        for _ in 0..8 {
            q.enqueue(msg("low_filler"), MessagePriority::High);
        }
        // High tier now at threshold_b(8); next high send should evict from low.
        q.enqueue(msg("low_victim"), MessagePriority::Low);
        let outcome = q.enqueue(msg("urgent"), MessagePriority::High);
        assert_eq!(outcome, EnqueueOutcome::Enqueued);
    }

    #[tokio::test]
    async fn dequeue_waits_for_arrival() {
        let q = Arc::new(queues(10));
        let q2 = Arc::clone(&q);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            q2.enqueue(msg("late"), MessagePriority::Normal);
        });

        let received = q.dequeue(Duration::from_secs(1)).await;
        assert_eq!(received.unwrap().message_type, "late");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn dequeue_times_out_when_empty() {
        let q = queues(10);
        let received = q.dequeue(Duration::from_millis(10)).await;
        assert!(received.is_none());
    }
}
