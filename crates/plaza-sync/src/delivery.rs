//! Outbound delivery tracking.
//!
//! Each direct message walks Composed -> Sent -> Persisted -> Delivered ->
//! Seen; group messages stop at Persisted. State only moves forward, so a
//! late or duplicate receipt can never regress a message.

use std::collections::HashMap;
use std::time::Duration;

use plaza_net::ReconnectPolicy;
use plaza_shared::{ChatId, MessageId, WireMessage};

/// Delivery progress of one outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeliveryState {
    /// Built and stored locally, not yet handed to the network.
    Composed,
    /// Pushed to the relay; the remote log append is still pending.
    Sent,
    /// The remote log accepted the append. From here the message survives
    /// this device going offline.
    Persisted,
    /// The receiving device acked ingestion.
    Delivered,
    /// The receiver read past this message.
    Seen,
}

/// What to do after a failed append attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    /// Attempts exhausted. The message stays tracked and is re-driven on
    /// the next reconnect.
    Park,
}

#[derive(Debug)]
struct TrackedSend {
    wire: WireMessage,
    chat_id: ChatId,
    state: DeliveryState,
    attempts: u32,
    in_flight: bool,
}

/// Book-keeping for messages this device sent during the session.
///
/// Only the `delivered`/`seen` flags are persisted (on the message rows);
/// the tracker itself is in-memory, scoped to one session.
pub struct DeliveryTracker {
    retry: ReconnectPolicy,
    max_attempts: u32,
    tracked: HashMap<MessageId, TrackedSend>,
}

impl DeliveryTracker {
    pub fn new(retry: ReconnectPolicy, max_attempts: u32) -> Self {
        Self {
            retry,
            max_attempts: max_attempts.max(1),
            tracked: HashMap::new(),
        }
    }

    /// Start tracking an outbound message in state [`DeliveryState::Sent`].
    pub fn track(&mut self, wire: &WireMessage) {
        self.tracked.insert(
            MessageId(wire.id.clone()),
            TrackedSend {
                chat_id: ChatId(wire.chat_id.clone()),
                wire: wire.clone(),
                state: DeliveryState::Sent,
                attempts: 0,
                in_flight: false,
            },
        );
    }

    /// Claim a message for an append attempt. Returns the wire form to
    /// push, or `None` when the message is already persisted or another
    /// attempt is running.
    pub fn begin_attempt(&mut self, id: &MessageId) -> Option<WireMessage> {
        let entry = self.tracked.get_mut(id)?;
        if entry.state != DeliveryState::Sent || entry.in_flight {
            return None;
        }
        entry.in_flight = true;
        Some(entry.wire.clone())
    }

    /// Record a failed append attempt and decide the follow-up.
    pub fn record_failure(&mut self, id: &MessageId) -> RetryDecision {
        let Some(entry) = self.tracked.get_mut(id) else {
            return RetryDecision::Park;
        };
        entry.attempts += 1;
        if entry.attempts >= self.max_attempts {
            entry.in_flight = false;
            RetryDecision::Park
        } else {
            RetryDecision::RetryAfter(self.retry.delay_for(entry.attempts - 1))
        }
    }

    /// The remote log accepted the append.
    pub fn mark_persisted(&mut self, id: &MessageId) -> bool {
        if let Some(entry) = self.tracked.get_mut(id) {
            entry.in_flight = false;
        }
        self.advance(id, DeliveryState::Persisted)
    }

    /// Move a message forward. Returns false when the message is unknown
    /// or already at (or past) `to`.
    pub fn advance(&mut self, id: &MessageId, to: DeliveryState) -> bool {
        match self.tracked.get_mut(id) {
            Some(entry) if entry.state < to => {
                entry.state = to;
                true
            }
            _ => false,
        }
    }

    /// Apply a seen receipt: everything in `chat` up to `seen_up_to` is
    /// done. Returns the ids that finished, already removed from tracking.
    pub fn seen_up_to(&mut self, chat: &ChatId, seen_up_to: i64) -> Vec<MessageId> {
        let finished: Vec<MessageId> = self
            .tracked
            .iter()
            .filter(|(_, entry)| entry.chat_id == *chat && entry.wire.timestamp <= seen_up_to)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &finished {
            self.tracked.remove(id);
        }
        finished
    }

    /// Stop tracking a message (seen, deleted, or group-persisted).
    pub fn remove(&mut self, id: &MessageId) {
        self.tracked.remove(id);
    }

    /// Messages still waiting for a successful append, oldest first.
    /// Their attempt budget is reset so a reconnect re-drive starts fresh.
    pub fn take_pending(&mut self) -> Vec<MessageId> {
        let mut pending: Vec<(i64, MessageId)> = self
            .tracked
            .iter_mut()
            .filter(|(_, entry)| entry.state == DeliveryState::Sent && !entry.in_flight)
            .map(|(id, entry)| {
                entry.attempts = 0;
                (entry.wire.timestamp, id.clone())
            })
            .collect();
        pending.sort();
        pending.into_iter().map(|(_, id)| id).collect()
    }

    pub fn state(&self, id: &MessageId) -> Option<DeliveryState> {
        self.tracked.get(id).map(|entry| entry.state)
    }
}
