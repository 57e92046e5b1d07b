//! Events posted upwards to whatever presents the run to the operator.
//!
//! The sequencer never formats UI; it posts [`PanoEvent`] values to an
//! [`EventSink`]. [`SharedEventLog`] is the stock sink: it timestamps every
//! event and keeps the most recent ones in a fixed-size ring.

use core::cell::RefCell;
use core::fmt::{self, Write as _};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::{HistoryBuf, OldestOrdered, String};

use crate::actuator::Attitude;
use crate::clock::{Clock, MonotonicInstant};

/// Longest user-facing message kept in an event.
pub const MESSAGE_CAPACITY: usize = 96;

/// Number of events retained by [`EventRecorder`] by default.
pub const EVENT_RING_CAPACITY: usize = 128;

/// Monotonically increasing event identifier.
pub type EventId = u32;

pub type Message = String<MESSAGE_CAPACITY>;

/// Formats `args` into a [`Message`], cutting it off at capacity.
#[must_use]
pub fn message(args: fmt::Arguments<'_>) -> Message {
    struct Truncating(Message);

    impl fmt::Write for Truncating {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for ch in s.chars() {
                if self.0.push(ch).is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    let mut out = Truncating(Message::new());
    let _ = out.write_fmt(args);
    out.0
}

/// Everything the core reports upwards.
#[derive(Clone, Debug, PartialEq)]
pub enum PanoEvent {
    UserMessage(Message),
    UserWarning(Message),
    PanoStarting,
    PanoStopping,
    CountChanged { count: u16, total: u16 },
    /// Whether a run can currently be started.
    PanoAvailable(bool),
    /// Gimbal attitude in the absolute frame.
    GimbalAttitude(Attitude),
    AircraftYaw(f32),
    AircraftAltitude(f32),
    AircraftSatellites(u8),
    /// Horizontal distance from the home point, metres.
    AircraftDistance(f32),
}

impl PanoEvent {
    pub fn user_message(text: &str) -> Self {
        PanoEvent::UserMessage(message(format_args!("{text}")))
    }

    pub fn user_warning(text: &str) -> Self {
        PanoEvent::UserWarning(message(format_args!("{text}")))
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            PanoEvent::UserMessage(_) => "message",
            PanoEvent::UserWarning(_) => "warning",
            PanoEvent::PanoStarting => "pano-starting",
            PanoEvent::PanoStopping => "pano-stopping",
            PanoEvent::CountChanged { .. } => "count",
            PanoEvent::PanoAvailable(_) => "available",
            PanoEvent::GimbalAttitude(_) => "gimbal-attitude",
            PanoEvent::AircraftYaw(_) => "aircraft-yaw",
            PanoEvent::AircraftAltitude(_) => "aircraft-altitude",
            PanoEvent::AircraftSatellites(_) => "aircraft-satellites",
            PanoEvent::AircraftDistance(_) => "aircraft-distance",
        }
    }

    /// Operator-facing text for message and warning events.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            PanoEvent::UserMessage(text) | PanoEvent::UserWarning(text) => Some(text.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for PanoEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanoEvent::UserMessage(text) | PanoEvent::UserWarning(text) => {
                write!(f, "{} {}", self.kind(), text)
            }
            PanoEvent::CountChanged { count, total } => write!(f, "count {count}/{total}"),
            PanoEvent::PanoAvailable(available) => write!(f, "available {available}"),
            PanoEvent::GimbalAttitude(attitude) => write!(
                f,
                "gimbal-attitude pitch {:.1} yaw {:.1} roll {:.1}",
                attitude.pitch, attitude.yaw, attitude.roll
            ),
            PanoEvent::AircraftYaw(value)
            | PanoEvent::AircraftAltitude(value)
            | PanoEvent::AircraftDistance(value) => write!(f, "{} {value:.1}", self.kind()),
            PanoEvent::AircraftSatellites(count) => write!(f, "aircraft-satellites {count}"),
            PanoEvent::PanoStarting | PanoEvent::PanoStopping => f.write_str(self.kind()),
        }
    }
}

/// Receiver of [`PanoEvent`]s. Called from the sequencer and hardware callbacks.
pub trait EventSink {
    fn post(&self, event: PanoEvent);
}

/// Event stored in the history ring.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord<TInstant> {
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: PanoEvent,
}

/// Fixed-size event history.
pub struct EventRecorder<TInstant, const CAPACITY: usize = EVENT_RING_CAPACITY> {
    ring: HistoryBuf<EventRecord<TInstant>, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> EventRecorder<TInstant, CAPACITY>
where
    TInstant: MonotonicInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Stores `event`, evicting the oldest record when full.
    pub fn record(&mut self, event: PanoEvent, timestamp: TInstant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(EventRecord {
            id,
            timestamp,
            event,
        });
        id
    }

    pub fn oldest_first(&self) -> OldestOrdered<'_, EventRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&EventRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<TInstant, const CAPACITY: usize> Default for EventRecorder<TInstant, CAPACITY>
where
    TInstant: MonotonicInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Timestamping [`EventSink`] over an [`EventRecorder`].
pub struct SharedEventLog<'a, M, C, const CAPACITY: usize = EVENT_RING_CAPACITY>
where
    M: RawMutex,
    C: Clock,
{
    clock: &'a C,
    recorder: Mutex<M, RefCell<EventRecorder<C::Instant, CAPACITY>>>,
}

impl<'a, M, C, const CAPACITY: usize> SharedEventLog<'a, M, C, CAPACITY>
where
    M: RawMutex,
    C: Clock,
{
    pub const fn new(clock: &'a C) -> Self {
        Self {
            clock,
            recorder: Mutex::new(RefCell::new(EventRecorder::new())),
        }
    }

    /// Runs `f` with the recorder borrowed.
    pub fn with<R>(&self, f: impl FnOnce(&EventRecorder<C::Instant, CAPACITY>) -> R) -> R {
        self.recorder.lock(|recorder| f(&recorder.borrow()))
    }

    pub fn len(&self) -> usize {
        self.with(EventRecorder::len)
    }

    pub fn is_empty(&self) -> bool {
        self.with(EventRecorder::is_empty)
    }
}

impl<M, C, const CAPACITY: usize> EventSink for SharedEventLog<'_, M, C, CAPACITY>
where
    M: RawMutex,
    C: Clock,
{
    fn post(&self, event: PanoEvent) {
        if let Some(text) = event.text() {
            log_info!("{}: {}", event.kind(), text);
        }
        let now = self.clock.now();
        self.recorder
            .lock(|recorder| recorder.borrow_mut().record(event, now));
    }
}
