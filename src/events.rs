//! Event channel: a single-subscriber stream fed by a periodic generator.
//!
//! ## State Machine
//!
//! - Idle: no subscription, no task
//! - Listening: one sink plus one periodic task
//!
//! `listen` always tears down the previous subscription before starting a new
//! one, so at most one emission task exists per controller. Every tick checks
//! under the state lock that its subscription is still current; together with
//! aborting the task handle this keeps a torn-down subscription from ever
//! receiving another event.

use crate::error::BridgeError;
use crate::models::{Event, EventType};
use crate::platform::{Clock, RandomSource};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub type SubscriptionId = u64;

/// Delivery target supplied by a subscriber when it starts listening.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: Event) -> Result<(), BridgeError>;
}

impl EventSink for mpsc::Sender<Event> {
    fn deliver(&self, event: Event) -> Result<(), BridgeError> {
        self.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => BridgeError::Delivery("subscriber is not keeping up".into()),
            TrySendError::Closed(_) => BridgeError::Delivery("subscriber disconnected".into()),
        })
    }
}

/// Produces synthetic events from the clock and random collaborators.
pub struct EventGenerator {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl EventGenerator {
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>) -> Self {
        Self { clock, random }
    }

    pub fn next_event(&self) -> Event {
        let pick = self.random.next_below(EventType::ALL.len() as u32) as usize;
        let event_type = EventType::ALL
            .get(pick)
            .copied()
            .unwrap_or(EventType::SensorData);
        let value = self.random.next_below(101).min(100) as u8;

        Event {
            event_type,
            value,
            timestamp: self.clock.now_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    Idle,
    Listening,
}

struct Subscription {
    id: SubscriptionId,
    sink: Arc<dyn EventSink>,
    task: JoinHandle<()>,
    failures: u32,
}

#[derive(Default)]
struct StreamState {
    last_id: SubscriptionId,
    current: Option<Subscription>,
}

impl StreamState {
    fn teardown(&mut self) -> Option<SubscriptionId> {
        let subscription = self.current.take()?;
        subscription.task.abort();
        Some(subscription.id)
    }

    /// Deliver one event to subscription `id`. Returns false once that
    /// subscription is no longer current.
    fn emit(&mut self, id: SubscriptionId, generator: &EventGenerator, max_failures: u32) -> bool {
        let Some(subscription) = self.current.as_mut().filter(|s| s.id == id) else {
            tracing::trace!("Dropping event for inactive subscription {}", id);
            return false;
        };

        let event = generator.next_event();
        tracing::trace!(
            "Delivering {} ({}) to subscription {}",
            event.event_type.as_str(),
            event.value,
            id
        );
        match subscription.sink.deliver(event) {
            Ok(()) => {
                subscription.failures = 0;
                true
            }
            Err(e) => {
                subscription.failures += 1;
                let failures = subscription.failures;
                tracing::warn!("Subscription {}: {} ({} in a row)", id, e, failures);

                if max_failures > 0 && failures >= max_failures {
                    tracing::info!(
                        "EventChannel: subscription {} dropped after {} failed deliveries",
                        id,
                        failures
                    );
                    self.teardown();
                    return false;
                }
                true
            }
        }
    }
}

fn lock(state: &Mutex<StreamState>) -> MutexGuard<'_, StreamState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct EventStreamController {
    state: Arc<Mutex<StreamState>>,
    generator: Arc<EventGenerator>,
    interval: Duration,
    max_failures: u32,
}

impl EventStreamController {
    pub fn new(generator: EventGenerator, interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(StreamState::default())),
            generator: Arc::new(generator),
            interval,
            max_failures: 0,
        }
    }

    /// Drop the subscription after this many consecutive failed deliveries.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Start streaming to `sink`, replacing any current subscriber.
    ///
    /// The first event is delivered before this returns; later ones follow
    /// every interval. Must be called from within a Tokio runtime.
    pub fn listen(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        let mut state = lock(&self.state);
        if let Some(previous) = state.teardown() {
            tracing::info!("EventChannel: replacing subscription {}", previous);
        }

        state.last_id += 1;
        let id = state.last_id;
        let first_tick = Instant::now() + self.interval;
        let task = tokio::spawn(run_periodic(
            Arc::downgrade(&self.state),
            id,
            first_tick,
            self.generator.clone(),
            self.interval,
            self.max_failures,
        ));
        state.current = Some(Subscription {
            id,
            sink,
            task,
            failures: 0,
        });
        tracing::info!("EventChannel: started listening (subscription {})", id);

        state.emit(id, &self.generator, self.max_failures);
        id
    }

    /// Stop streaming. Cancelling while idle is a no-op.
    pub fn cancel(&self) {
        match lock(&self.state).teardown() {
            Some(id) => tracing::info!("EventChannel: stopped listening (subscription {})", id),
            None => tracing::debug!("EventChannel: cancel while idle"),
        }
    }

    /// Cancel only if `id` is still the current subscription.
    pub fn cancel_subscription(&self, id: SubscriptionId) -> bool {
        let mut state = lock(&self.state);
        if state.current.as_ref().map(|s| s.id) != Some(id) {
            return false;
        }
        state.teardown();
        tracing::info!("EventChannel: stopped listening (subscription {})", id);
        true
    }

    pub fn status(&self) -> StreamStatus {
        match lock(&self.state).current {
            Some(_) => StreamStatus::Listening,
            None => StreamStatus::Idle,
        }
    }
}

impl Drop for EventStreamController {
    fn drop(&mut self) {
        lock(&self.state).teardown();
    }
}

async fn run_periodic(
    state: Weak<Mutex<StreamState>>,
    id: SubscriptionId,
    first_tick: Instant,
    generator: Arc<EventGenerator>,
    period: Duration,
    max_failures: u32,
) {
    // The immediate emission happens in `listen`; `first_tick` is one period after it.
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let keep_going = match state.upgrade() {
            Some(state) => {
                let mut guard = lock(&state);
                guard.emit(id, &generator, max_failures)
            }
            None => false,
        };
        if !keep_going {
            break;
        }
    }
}
