//! Notification events and sinks
//!
//! The manager publishes every step delta, status change, warning and error
//! as a [`SimulationEvent`] to one [`NotificationSink`]. Publishing never
//! blocks the stepping thread. Transports (WebSocket hubs and the like) plug
//! in by implementing the trait or by draining one of the channel sinks here.

use crate::error::FireSpreadError;
use crate::simulation::fire_simulation::SimulationId;
use crate::simulation::lifecycle::StatusChange;
use crate::solver::StepDelta;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Outbound notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationEvent {
    pub simulation_id: SimulationId,
    /// Manager-wide, strictly increasing
    pub sequence: u64,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    StepDelta(StepDelta),
    StatusChanged(StatusChange),
    Warning(FireSpreadError),
    Error(FireSpreadError),
}

impl SimulationEvent {
    /// Everything except step deltas; these must never be dropped
    pub fn is_control(&self) -> bool {
        !matches!(self.payload, EventPayload::StepDelta(_))
    }
}

/// Receives every event the manager publishes
///
/// Called from stepping threads after the simulation lock is released, and
/// from lifecycle calls while the simulation's worker handle is held.
/// Implementations must not block for long or call back into the manager.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: SimulationEvent);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    #[inline]
    fn publish(&self, _event: SimulationEvent) {}
}

/// Keeps every event in memory, in publish order
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SimulationEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far
    pub fn events(&self) -> Vec<SimulationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, event: SimulationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// How many times a full delta lane is drained before giving up on a delta
const EVICTION_ATTEMPTS: usize = 4;

/// Two-lane channel sink
///
/// Deltas go through a bounded lane; when it is full the oldest queued delta
/// is evicted so the newest always gets in. Control events use an unbounded
/// lane and are never dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    deltas: Sender<SimulationEvent>,
    /// Held so the sink can evict from its own lane
    evict: Receiver<SimulationEvent>,
    control: Sender<SimulationEvent>,
    /// Dead once every clone of the stream is dropped
    stream: Weak<()>,
}

/// Consumer side of a [`ChannelSink`]
#[derive(Debug, Clone)]
pub struct EventStream {
    deltas: Receiver<SimulationEvent>,
    control: Receiver<SimulationEvent>,
    _alive: Arc<()>,
}

impl ChannelSink {
    /// `delta_capacity` bounds the delta lane (at least 1)
    pub fn new(delta_capacity: usize) -> (ChannelSink, EventStream) {
        let (delta_tx, delta_rx) = crossbeam_channel::bounded(delta_capacity.max(1));
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let alive = Arc::new(());
        (
            ChannelSink {
                deltas: delta_tx,
                evict: delta_rx.clone(),
                control: control_tx,
                stream: Arc::downgrade(&alive),
            },
            EventStream {
                deltas: delta_rx,
                control: control_rx,
                _alive: alive,
            },
        )
    }

    /// Whether every [`EventStream`] for this sink has been dropped
    pub fn is_closed(&self) -> bool {
        self.stream.strong_count() == 0
    }
}

impl NotificationSink for ChannelSink {
    fn publish(&self, event: SimulationEvent) {
        if self.is_closed() {
            return;
        }
        if event.is_control() {
            if self.control.send(event).is_err() {
                trace!("Control event dropped: stream closed");
            }
            return;
        }

        let mut event = event;
        for _ in 0..EVICTION_ATTEMPTS {
            match self.deltas.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(evicted) = self.evict.try_recv() {
                        trace!(
                            "Evicted delta {} of {}",
                            evicted.sequence,
                            evicted.simulation_id
                        );
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
        warn!(
            "Dropped delta {} of {} after {} eviction attempts",
            event.sequence, event.simulation_id, EVICTION_ATTEMPTS
        );
    }
}

impl EventStream {
    /// Everything currently queued on both lanes, ordered by sequence
    pub fn drain(&self) -> Vec<SimulationEvent> {
        let mut events: Vec<SimulationEvent> = self.control.try_iter().collect();
        events.extend(self.deltas.try_iter());
        events.sort_by_key(|event| event.sequence);
        events
    }

    /// Next event from either lane, control first when both are ready
    pub fn try_recv(&self) -> Option<SimulationEvent> {
        match self.control.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => self.deltas.try_recv().ok(),
        }
    }

    /// Wait up to `timeout` for the next event from either lane
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SimulationEvent> {
        if let Some(event) = self.try_recv() {
            return Some(event);
        }
        let deadline = Instant::now() + timeout;
        crossbeam_channel::select! {
            recv(self.control) -> event => event.ok(),
            recv(self.deltas) -> event => event.ok(),
            recv(crossbeam_channel::at(deadline)) -> _ => None,
        }
    }

    /// Wait for the next control event only, skipping queued deltas
    pub fn recv_control_timeout(
        &self,
        timeout: Duration,
    ) -> Result<SimulationEvent, RecvTimeoutError> {
        self.control.recv_timeout(timeout)
    }
}

struct Subscriber {
    filter: Option<SimulationId>,
    sink: ChannelSink,
}

/// Forwards events to any number of subscribers
///
/// Each subscriber gets its own two-lane [`ChannelSink`], so a stalled
/// subscriber loses its oldest deltas but never control events, and never
/// holds up the others. A subscriber may restrict itself to one simulation.
/// Subscribers whose stream has been dropped are removed on the next publish.
#[derive(Default)]
pub struct FanoutSink {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; `None` receives every simulation's events
    ///
    /// `delta_capacity` bounds the subscriber's delta lane as in [`ChannelSink::new`].
    pub fn subscribe(&self, filter: Option<SimulationId>, delta_capacity: usize) -> EventStream {
        let (sink, stream) = ChannelSink::new(delta_capacity);
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(Subscriber { filter, sink }),
            Err(_) => warn!("Subscriber list poisoned; subscription is inert"),
        }
        stream
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map_or(0, |subscribers| subscribers.len())
    }
}

impl NotificationSink for FanoutSink {
    fn publish(&self, event: SimulationEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|subscriber| {
            if subscriber.sink.is_closed() {
                return false;
            }
            let wanted = subscriber
                .filter
                .as_ref()
                .is_none_or(|id| *id == event.simulation_id);
            if wanted {
                subscriber.sink.publish(event.clone());
            }
            true
        });
    }
}
