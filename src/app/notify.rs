//! Outbound notification scheduling.
//!
//! Everything the module says goes through one [`Notifier`]:
//!
//! - Events and replies wait in a bounded outbox. When it is full the
//!   oldest record is dropped.
//! - Periodic records (status, test samples) do not queue. Each stream has
//!   one slot, the newest offer replaces the old one, and the slot is sent
//!   at most once per interval.
//! - Sequence numbers are assigned per stream when a record is actually
//!   sent, so consumers see strictly increasing `seq` with no gaps.
//! - A failed send is retried on later iterations up to the configured
//!   limit, then dropped. At most [`MAX_SENDS_PER_TICK`] sends are attempted
//!   per iteration, so a slow channel never stalls the control loop.

use heapless::Deque;
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

use crate::error::TransportError;

use super::events::{Notification, Stream};
use super::ports::NotificationSink;

/// Outbox capacity.
pub const OUTBOX_DEPTH: usize = 32;

/// Send attempts per control-loop iteration.
pub const MAX_SENDS_PER_TICK: usize = 4;

struct Pending {
    record: Value,
    stream: Option<Stream>,
    attempts: u8,
}

/// Fixed-interval gate for periodic records.
#[derive(Debug, Default, Clone, Copy)]
struct IntervalLimiter {
    last_ms: Option<u64>,
}

impl IntervalLimiter {
    fn due(&self, now_ms: u64, interval_ms: u32) -> bool {
        self.last_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= u64::from(interval_ms))
    }

    fn mark(&mut self, now_ms: u64) {
        self.last_ms = Some(now_ms);
    }
}

#[derive(Default)]
struct Periodic {
    latest: Option<Value>,
    limiter: IntervalLimiter,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyStats {
    pub sent: u32,
    /// Dropped because the outbox was full.
    pub overflowed: u32,
    /// Dropped after exhausting retries.
    pub failed: u32,
    /// Periodic offers replaced before they were sent.
    pub coalesced: u32,
}

pub struct Notifier {
    outbox: Deque<Pending, OUTBOX_DEPTH>,
    periodic: [Periodic; 2],
    /// Last sequence number sent per stream.
    seq: [u32; 2],
    stats: NotifyStats,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            outbox: Deque::new(),
            periodic: [Periodic::default(), Periodic::default()],
            seq: [0; 2],
            stats: NotifyStats::default(),
        }
    }

    /// Queue an event or reply. Its stream decides whether it is numbered.
    pub fn push(&mut self, record: &impl Notification) {
        let stream = record.stream();
        let Some(record) = to_object(record) else {
            return;
        };
        if self.outbox.is_full() {
            self.outbox.pop_front();
            self.stats.overflowed = self.stats.overflowed.saturating_add(1);
            warn!("notify: outbox full, dropped oldest record");
        }
        // Cannot fail: a slot was freed above if needed.
        let _ = self.outbox.push_back(Pending {
            record,
            stream,
            attempts: 0,
        });
    }

    /// Offer the latest periodic record for `stream`, replacing any unsent
    /// one.
    pub fn offer(&mut self, stream: Stream, record: &impl Serialize) {
        let Some(record) = to_object(record) else {
            return;
        };
        let slot = &mut self.periodic[stream.index()];
        if slot.latest.replace(record).is_some() {
            self.stats.coalesced = self.stats.coalesced.saturating_add(1);
        }
    }

    /// Drop any unsent periodic record for `stream`.
    pub fn discard(&mut self, stream: Stream) {
        self.periodic[stream.index()].latest = None;
    }

    /// Push what the channel will take this iteration.
    pub fn flush(
        &mut self,
        now_ms: u64,
        interval_ms: u32,
        retry_limit: u8,
        sink: &mut impl NotificationSink,
    ) {
        if !sink.is_connected() {
            return;
        }
        let mut budget = MAX_SENDS_PER_TICK;

        while budget > 0 {
            let Some(front) = self.outbox.front_mut() else {
                break;
            };
            budget -= 1;
            let (stream, result) = (front.stream, send(&mut self.seq, front.stream, &mut front.record, sink));
            match result {
                Ok(()) => {
                    self.outbox.pop_front();
                    self.stats.sent = self.stats.sent.saturating_add(1);
                }
                Err(e) => {
                    front.attempts = front.attempts.saturating_add(1);
                    warn!("notify: send failed ({}), attempt {}/{}", e, front.attempts, retry_limit);
                    if front.attempts >= retry_limit {
                        debug!("notify: giving up on {:?} record", stream);
                        self.outbox.pop_front();
                        self.stats.failed = self.stats.failed.saturating_add(1);
                    }
                    // Channel is struggling: leave the rest for the next iteration.
                    return;
                }
            }
        }

        for stream in [Stream::Status, Stream::Test] {
            if budget == 0 {
                break;
            }
            let slot = &mut self.periodic[stream.index()];
            if slot.latest.is_none() || !slot.limiter.due(now_ms, interval_ms) {
                continue;
            }
            budget -= 1;
            slot.limiter.mark(now_ms);
            let Some(mut record) = slot.latest.take() else {
                continue;
            };
            match send(&mut self.seq, Some(stream), &mut record, sink) {
                Ok(()) => self.stats.sent = self.stats.sent.saturating_add(1),
                Err(e) => {
                    warn!("notify: periodic {:?} send failed ({})", stream, e);
                    // Keep it unless a newer offer arrived meanwhile.
                    let slot = &mut self.periodic[stream.index()];
                    if slot.latest.is_none() {
                        slot.latest = Some(record);
                    }
                }
            }
        }
    }

    /// Last `seq` sent on `stream` (0 before the first).
    pub fn seq(&self, stream: Stream) -> u32 {
        self.seq[stream.index()]
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    pub fn stats(&self) -> NotifyStats {
        self.stats
    }
}

fn to_object(record: &impl Serialize) -> Option<Value> {
    match serde_json::to_value(record) {
        Ok(v @ Value::Object(_)) => Some(v),
        Ok(_) => {
            warn!("notify: record is not a JSON object, dropped");
            None
        }
        Err(e) => {
            warn!("notify: serialization failed: {}", e);
            None
        }
    }
}

/// Stamp `seq` (if sequenced) and hand one record to the sink. The
/// counter only advances on success.
fn send(
    seq: &mut [u32; 2],
    stream: Option<Stream>,
    record: &mut Value,
    sink: &mut impl NotificationSink,
) -> Result<(), TransportError> {
    let next = stream.map(|s| (s.index(), seq[s.index()].wrapping_add(1)));
    if let (Some((_, n)), Value::Object(map)) = (next, &mut *record) {
        map.insert("seq".into(), Value::from(n));
    }
    let text = serde_json::to_string(record).map_err(|_| TransportError::Io)?;
    sink.send(&text)?;
    if let Some((i, n)) = next {
        seq[i] = n;
    }
    Ok(())
}
