//! Simulated hardware rig shared by the end-to-end tests.
//!
//! Every driver answers through the sequencer's callback hub, the same path
//! real hardware callbacks take.

#![allow(dead_code)]

use core::cell::{Cell, RefCell};
use core::future::Future;
use core::time::Duration;

use embassy_futures::block_on;
use embassy_futures::join::join3;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;

use pano_core::actuator::aircraft::{AircraftYawActuator, FlightDriver, FlightLink};
use pano_core::actuator::camera::{
    CameraActuator, CameraDriver, CameraLink, CameraMode, CameraSystemState, SdCardState,
    ShootMode,
};
use pano_core::actuator::gimbal::{GimbalActuator, GimbalDriver, GimbalLink};
use pano_core::actuator::{Attitude, AxisCapability, GimbalCapabilities};
use pano_core::clock::{Clock, MonotonicInstant};
use pano_core::events::{PanoEvent, SharedEventLog};
use pano_core::sequencer::{Connection, Links, PanoramaSequencer, PreflightError, RunReport};
use pano_core::settings::{AircraftModel, FlightMode, ModelSettings};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimInstant(pub u64);

impl MonotonicInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Virtual time: sleeping jumps the clock forward and yields once.
#[derive(Default)]
pub struct SimClock {
    now_us: Cell<u64>,
}

impl SimClock {
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.now_us.get())
    }
}

impl Clock for SimClock {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.now_us.get())
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        let micros = u64::try_from(duration.as_micros()).expect("duration fits");
        self.now_us.set(self.now_us.get() + micros);
        embassy_futures::yield_now()
    }
}

pub type Log<'a> = SharedEventLog<'a, NoopRawMutex, SimClock, 512>;
pub type Sequencer<'a> = PanoramaSequencer<'a, NoopRawMutex, SimClock, Log<'a>>;

/// Faults injected into a run.
#[derive(Copy, Clone, Debug, Default)]
pub struct Script {
    /// Request a stop right after this shot lands.
    pub stop_after: Option<u16>,
    /// This shot fills the card instead of producing an image.
    pub card_full_at: Option<u16>,
    /// Stop is requested while this shot is being written; the file still lands.
    pub stop_during: Option<u16>,
    /// Stop is requested, then this shot fills the card.
    pub stop_then_card_full_at: Option<u16>,
    /// This shot reports a full card that is healthy again straight after.
    pub card_blip_at: Option<u16>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GimbalCall {
    Rotate(Attitude),
    Reset,
}

/// Links, clock and everything the drivers observed.
pub struct Rig {
    pub model: AircraftModel,
    pub gimbal: GimbalLink<NoopRawMutex>,
    pub camera: CameraLink<NoopRawMutex>,
    pub flight: FlightLink<NoopRawMutex>,
    pub clock: SimClock,
    pub gimbal_calls: RefCell<Vec<GimbalCall>>,
    pub shots: Cell<u16>,
    pub yaw_commands: Cell<u32>,
}

impl Rig {
    pub fn new(model: AircraftModel) -> Self {
        Self {
            model,
            gimbal: GimbalLink::new(model.relative_gimbal_yaw()),
            camera: CameraLink::new(),
            flight: FlightLink::new(),
            clock: SimClock::default(),
            gimbal_calls: RefCell::new(Vec::new()),
            shots: Cell::new(0),
            yaw_commands: Cell::new(0),
        }
    }

    pub fn sequencer<'a>(&'a self, log: &'a Log<'a>) -> Sequencer<'a> {
        let links = Links {
            gimbal: &self.gimbal,
            camera: &self.camera,
            flight: &self.flight,
        };
        let sequencer = PanoramaSequencer::new(links, &self.clock, log);
        sequencer.set_connection(Connection::complete(self.model));
        sequencer.on_remote_flight_mode(FlightMode::F);
        sequencer.on_sd_card_state(SdCardState::ready(500));
        sequencer
    }

    /// Pitch of every rotate command, in order.
    pub fn pitches(&self) -> Vec<f32> {
        self.gimbal_calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                GimbalCall::Rotate(attitude) => Some(attitude.pitch),
                GimbalCall::Reset => None,
            })
            .collect()
    }

    /// Runs one panorama against the simulated hardware.
    pub fn run<'a>(
        &'a self,
        sequencer: &'a Sequencer<'a>,
        settings: &ModelSettings,
        script: Script,
    ) -> Result<RunReport<SimInstant>, PreflightError> {
        let mut gimbal = GimbalActuator::new(
            &self.gimbal,
            SimGimbal {
                rig: self,
                hub: sequencer,
            },
            &self.clock,
        );
        let mut camera = CameraActuator::new(
            &self.camera,
            SimCamera {
                rig: self,
                hub: sequencer,
                script,
            },
            &self.clock,
        );
        let mut flight = AircraftYawActuator::new(
            &self.flight,
            SimFlight {
                rig: self,
                hub: sequencer,
            },
            &self.clock,
        );

        block_on(async {
            match select(
                sequencer.start(settings),
                join3(gimbal.run(), camera.run(), flight.run()),
            )
            .await
            {
                Either::First(result) => result,
                Either::Second(_) => unreachable!("actuator tasks never return"),
            }
        })
    }
}

/// Every user-facing message and warning posted so far.
pub fn texts(log: &Log<'_>) -> Vec<String> {
    log.with(|recorder| {
        recorder
            .oldest_first()
            .filter_map(|record| record.event.text().map(str::to_owned))
            .collect()
    })
}

pub fn events(log: &Log<'_>) -> Vec<PanoEvent> {
    log.with(|recorder| {
        recorder
            .oldest_first()
            .map(|record| record.event.clone())
            .collect()
    })
}

struct SimGimbal<'a> {
    rig: &'a Rig,
    hub: &'a Sequencer<'a>,
}

impl GimbalDriver for SimGimbal<'_> {
    type Error = ();

    fn capabilities(&self) -> GimbalCapabilities {
        GimbalCapabilities {
            pitch: AxisCapability::range(-90, 30),
            yaw: AxisCapability::range(-320, 320),
            roll: AxisCapability::fixed(),
        }
    }

    fn completion_time(&self) -> Duration {
        Duration::from_millis(500)
    }

    async fn rotate(&mut self, attitude: Attitude) -> Result<(), ()> {
        self.rig.gimbal_calls.borrow_mut().push(GimbalCall::Rotate(attitude));
        self.hub.on_gimbal_attitude(attitude);
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), ()> {
        self.rig.gimbal_calls.borrow_mut().push(GimbalCall::Reset);
        self.hub.on_gimbal_attitude(Attitude::ZERO);
        Ok(())
    }
}

struct SimCamera<'a> {
    rig: &'a Rig,
    hub: &'a Sequencer<'a>,
    script: Script,
}

impl CameraDriver for SimCamera<'_> {
    type Error = ();

    async fn set_camera_mode(&mut self, mode: CameraMode) -> Result<(), ()> {
        self.hub.on_camera_system_state(CameraSystemState::idle(mode));
        Ok(())
    }

    async fn start_shoot_photo(&mut self, _mode: ShootMode) -> Result<(), ()> {
        let shot = self.rig.shots.get() + 1;
        self.rig.shots.set(shot);

        let mut full = SdCardState::ready(0);
        full.full = true;
        if self.script.stop_then_card_full_at == Some(shot) {
            self.hub.stop();
            self.hub.on_sd_card_state(full);
            return Ok(());
        }
        if self.script.card_full_at == Some(shot) {
            self.hub.on_sd_card_state(full);
            return Ok(());
        }
        if self.script.card_blip_at == Some(shot) {
            self.hub.on_sd_card_state(full);
            self.hub.on_sd_card_state(SdCardState::ready(500));
            return Ok(());
        }

        if self.script.stop_during == Some(shot) {
            self.hub.stop();
        }
        self.hub.on_new_media(&format!("DJI_{shot:04}.JPG"));
        if self.script.stop_after == Some(shot) {
            self.hub.stop();
        }
        Ok(())
    }
}

/// Airframe that covers the commanded rate's worth of a full second per sample.
struct SimFlight<'a> {
    rig: &'a Rig,
    hub: &'a Sequencer<'a>,
}

impl FlightDriver for SimFlight<'_> {
    type Error = ();

    async fn send_yaw_velocity(&mut self, speed: f32) -> Result<(), ()> {
        self.rig.yaw_commands.set(self.rig.yaw_commands.get() + 1);
        let heading = self.rig.flight.heading() + speed;
        self.hub.on_aircraft_heading(heading);
        Ok(())
    }
}
