use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use crate::error::ProgressError;
use crate::events::{ProgressEvent, ProgressKind};

/// Soft cap on display entries before old non-terminal lines compress.
const DISPLAY_SOFT_CAP: usize = 12;
/// How many of the newest entries survive a compression pass untouched.
const DISPLAY_KEEP_RECENT: usize = 8;

/// One delivery to the subscriber: the triggering event plus the full
/// rendered transcript to show. The subscriber is not trusted to keep
/// state — it can always just replace its placeholder with `display`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub event: ProgressEvent,
    pub display: String,
}

struct DisplayEntry {
    line: String,
    terminal: bool,
}

struct ChannelState {
    seq: u64,
    entries: Vec<DisplayEntry>,
    compressed_count: usize,
    history: Vec<ProgressEvent>,
}

/// Value carried by the watch: distinguishes "nothing yet" from "closed" so
/// a waiting subscriber can tell the difference.
#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Event(Delivery),
    Closed,
}

/// Per-request progress event bus.
///
/// At most one subscriber; delivery is latest-wins (a slow subscriber sees
/// coalesced updates, never reordered ones); emission after `close` is a
/// no-op.
pub struct ProgressChannel {
    state: Mutex<ChannelState>,
    tx: watch::Sender<Slot>,
    // Keeps the watch alive while no subscriber is attached.
    _keepalive: watch::Receiver<Slot>,
    subscribed: AtomicBool,
    closed: AtomicBool,
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(Slot::Empty);
        Self {
            state: Mutex::new(ChannelState {
                seq: 0,
                entries: Vec::new(),
                compressed_count: 0,
                history: Vec::new(),
            }),
            tx,
            _keepalive: rx,
            subscribed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Attach the single subscriber. A second call fails.
    pub fn subscribe(&self) -> Result<ProgressSubscriber, ProgressError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProgressError::Closed);
        }
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(ProgressError::AlreadySubscribed);
        }
        Ok(ProgressSubscriber {
            rx: self.tx.subscribe(),
            last_seq: 0,
        })
    }

    /// Emit an event. Ordered per request; silently dropped after close.
    pub fn emit(&self, kind: ProgressKind, action: &str, details: &str) {
        self.emit_with_snippet(kind, action, details, None);
    }

    pub fn emit_with_snippet(
        &self,
        kind: ProgressKind,
        action: &str,
        details: &str,
        reasoning_snippet: Option<String>,
    ) {
        if self.closed.load(Ordering::SeqCst) {
            debug!(%kind, action, "progress emit after close dropped");
            return;
        }

        let delivery = {
            let mut state = self.state.lock().unwrap();
            state.seq += 1;
            let event = ProgressEvent {
                kind,
                action: action.to_string(),
                details: details.to_string(),
                reasoning_snippet,
                seq: state.seq,
                at: Utc::now(),
            };

            state.entries.push(DisplayEntry {
                line: event.display_line(),
                terminal: kind.is_terminal(),
            });
            compress_if_needed(&mut state);

            state.history.push(event.clone());
            Delivery {
                event,
                display: render(&state),
            }
        };

        // send_replace never fails and implements latest-wins coalescing:
        // a subscriber that polls slowly only observes the newest delivery.
        self.tx.send_replace(Slot::Event(delivery));
    }

    /// Stop the channel: subsequent emits are dropped and the subscriber's
    /// stream ends after the current value.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.tx.send_replace(Slot::Closed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Full event history for this request, in emission order.
    pub fn history(&self) -> Vec<ProgressEvent> {
        self.state.lock().unwrap().history.clone()
    }

    /// Current rendered transcript.
    pub fn display(&self) -> String {
        render(&self.state.lock().unwrap())
    }
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn compress_if_needed(state: &mut ChannelState) {
    if state.entries.len() <= DISPLAY_SOFT_CAP {
        return;
    }
    let cutoff = state.entries.len() - DISPLAY_KEEP_RECENT;
    let mut kept = Vec::with_capacity(DISPLAY_KEEP_RECENT + 2);
    for (i, entry) in state.entries.drain(..).enumerate() {
        if i >= cutoff || entry.terminal {
            kept.push(entry);
        } else {
            state.compressed_count += 1;
        }
    }
    state.entries = kept;
}

fn render(state: &ChannelState) -> String {
    let mut lines = Vec::with_capacity(state.entries.len() + 1);
    if state.compressed_count > 0 {
        lines.push(format!("… {} earlier steps", state.compressed_count));
    }
    for entry in &state.entries {
        lines.push(entry.line.clone());
    }
    lines.join("\n")
}

/// The receiving half: await `next()` for the latest delivery.
pub struct ProgressSubscriber {
    rx: watch::Receiver<Slot>,
    last_seq: u64,
}

impl ProgressSubscriber {
    /// Wait for the next (possibly coalesced) delivery. Returns `None` once
    /// the channel is closed.
    pub async fn next(&mut self) -> Option<Delivery> {
        loop {
            let fresh = {
                let current = self.rx.borrow_and_update();
                match &*current {
                    Slot::Closed => return None,
                    Slot::Event(delivery) if delivery.event.seq > self.last_seq => {
                        Some(delivery.clone())
                    }
                    _ => None,
                }
            };
            if let Some(delivery) = fresh {
                self.last_seq = delivery.event.seq;
                return Some(delivery);
            }
            self.rx.changed().await.ok()?;
        }
    }
}
