//! Simulated gimbal, camera and airframe on a virtual clock.
//!
//! Drivers answer through the sequencer's callback hub, so a run in the
//! emulator takes the same path as one on real hardware. Time only moves when
//! something sleeps, which lets a full panorama finish instantly.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::time::Duration;

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
use pano_core::events::{EventSink, PanoEvent};
use pano_core::sequencer::{Connection, Links, PanoramaSequencer, PreflightError, RunReport};
use pano_core::settings::{AircraftModel, FlightMode, ModelSettings};

use crate::session::{Response, Tone};

pub const GIMBAL_COMPLETION: Duration = Duration::from_millis(500);

/// Simulated card capacity at startup.
pub const DEFAULT_CARD_CAPTURES: u32 = 500;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimInstant(u64);

impl MonotonicInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

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
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.now_us.set(self.now_us.get().saturating_add(micros));
        embassy_futures::yield_now()
    }
}

/// Faults injected into the next run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Script {
    pub stop_after: Option<u16>,
    pub sd_fault_after: Option<u16>,
    pub overheat_after: Option<u16>,
    pub gimbal_stuck: bool,
}

impl Script {
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(shot) = self.stop_after {
            parts.push(format!("stop-after={shot}"));
        }
        if let Some(shot) = self.sd_fault_after {
            parts.push(format!("sd-fault-after={shot}"));
        }
        if let Some(shot) = self.overheat_after {
            parts.push(format!("overheat-after={shot}"));
        }
        if self.gimbal_stuck {
            parts.push("gimbal-stuck".to_string());
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Product settings the hub is rebuilt from for every command.
#[derive(Copy, Clone, Debug)]
pub struct Environment {
    pub model: AircraftModel,
    pub rc_mode: FlightMode,
}

pub type Hub<'a> = PanoramaSequencer<'a, NoopRawMutex, SimClock, ConsoleSink<'a>>;

/// Links and simulated hardware state that persist between runs.
pub struct Hardware {
    pub gimbal: GimbalLink<NoopRawMutex>,
    pub camera: CameraLink<NoopRawMutex>,
    pub flight: FlightLink<NoopRawMutex>,
    pub clock: SimClock,
    card_captures: Cell<u32>,
    shots: Cell<u16>,
}

impl Hardware {
    pub fn new(model: AircraftModel) -> Self {
        let hardware = Self {
            gimbal: GimbalLink::new(model.relative_gimbal_yaw()),
            camera: CameraLink::new(),
            flight: FlightLink::new(),
            clock: SimClock::default(),
            card_captures: Cell::new(DEFAULT_CARD_CAPTURES),
            shots: Cell::new(0),
        };
        hardware
            .camera
            .on_sd_card_state(SdCardState::ready(DEFAULT_CARD_CAPTURES));
        hardware
    }

    pub fn card_captures(&self) -> u32 {
        self.card_captures.get()
    }

    pub fn set_card_captures(&self, captures: u32) {
        self.card_captures.set(captures);
    }

    /// Callback hub for `environment`, posting into `sink`.
    pub fn hub<'a>(&'a self, environment: Environment, sink: &'a ConsoleSink<'a>) -> Hub<'a> {
        let links = Links {
            gimbal: &self.gimbal,
            camera: &self.camera,
            flight: &self.flight,
        };
        let hub = PanoramaSequencer::new(links, &self.clock, sink);
        hub.set_connection(Connection::complete(environment.model));
        hub.on_remote_flight_mode(environment.rc_mode);
        hub
    }

    /// Runs one panorama with the actuator tasks alongside.
    pub fn run<'a>(
        &'a self,
        hub: &'a Hub<'a>,
        settings: &ModelSettings,
        script: Script,
    ) -> Result<RunReport<SimInstant>, PreflightError> {
        self.shots.set(0);
        let mut gimbal = GimbalActuator::new(
            &self.gimbal,
            SimGimbal {
                hub,
                stuck: script.gimbal_stuck,
            },
            &self.clock,
        );
        let mut camera = CameraActuator::new(
            &self.camera,
            SimCamera {
                hardware: self,
                hub,
                script,
            },
            &self.clock,
        );
        let mut flight = AircraftYawActuator::new(
            &self.flight,
            SimFlight {
                hardware: self,
                hub,
            },
            &self.clock,
        );

        block_on(async {
            match select(
                hub.start(settings),
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

/// Collects events as console responses stamped with virtual time.
pub struct ConsoleSink<'a> {
    clock: &'a SimClock,
    telemetry: bool,
    responses: RefCell<Vec<Response>>,
}

impl<'a> ConsoleSink<'a> {
    pub fn new(clock: &'a SimClock, telemetry: bool) -> Self {
        Self {
            clock,
            telemetry,
            responses: RefCell::new(Vec::new()),
        }
    }

    pub fn take(&self) -> Vec<Response> {
        self.responses.take()
    }
}

impl EventSink for ConsoleSink<'_> {
    fn post(&self, event: PanoEvent) {
        let tone = match &event {
            PanoEvent::UserMessage(_) => Tone::Message,
            PanoEvent::UserWarning(_) => Tone::Warning,
            PanoEvent::PanoStarting
            | PanoEvent::PanoStopping
            | PanoEvent::CountChanged { .. }
            | PanoEvent::PanoAvailable(_) => Tone::Status,
            PanoEvent::GimbalAttitude(_)
            | PanoEvent::AircraftYaw(_)
            | PanoEvent::AircraftAltitude(_)
            | PanoEvent::AircraftSatellites(_)
            | PanoEvent::AircraftDistance(_) => {
                if !self.telemetry {
                    return;
                }
                Tone::Telemetry
            }
        };
        let stamp = self.clock.elapsed();
        let text = match event.text() {
            Some(text) => text.to_string(),
            None => event.to_string(),
        };
        self.responses.borrow_mut().push(Response::new(
            tone,
            format!("[{:>8.3}s] {text}", stamp.as_secs_f64()),
        ));
    }
}

struct SimGimbal<'a> {
    hub: &'a Hub<'a>,
    stuck: bool,
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
        GIMBAL_COMPLETION
    }

    async fn rotate(&mut self, attitude: Attitude) -> Result<(), ()> {
        // A stuck gimbal accepts commands but never reports reaching them.
        if !self.stuck {
            self.hub.on_gimbal_attitude(attitude);
        }
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), ()> {
        self.hub.on_gimbal_attitude(Attitude::ZERO);
        Ok(())
    }
}

struct SimCamera<'a> {
    hardware: &'a Hardware,
    hub: &'a Hub<'a>,
    script: Script,
}

impl CameraDriver for SimCamera<'_> {
    type Error = ();

    async fn set_camera_mode(&mut self, mode: CameraMode) -> Result<(), ()> {
        self.hub.on_camera_system_state(CameraSystemState::idle(mode));
        Ok(())
    }

    async fn start_shoot_photo(&mut self, _mode: ShootMode) -> Result<(), ()> {
        let shot = self.hardware.shots.get() + 1;
        self.hardware.shots.set(shot);

        if self.script.overheat_after == Some(shot) {
            let mut state = CameraSystemState::idle(CameraMode::ShootPhoto);
            state.overheated = true;
            self.hub.on_camera_system_state(state);
            return Ok(());
        }

        let remaining = self.hardware.card_captures.get();
        if self.script.sd_fault_after == Some(shot) || remaining == 0 {
            let mut card = SdCardState::ready(0);
            card.full = true;
            self.hardware.card_captures.set(0);
            self.hub.on_sd_card_state(card);
            return Ok(());
        }

        self.hardware.card_captures.set(remaining - 1);
        self.hub.on_new_media(&format!("DJI_{shot:04}.JPG"));
        self.hub.on_sd_card_state(SdCardState::ready(remaining - 1));
        if self.script.stop_after == Some(shot) {
            self.hub.stop();
        }
        Ok(())
    }
}

/// Airframe that turns the commanded rate's worth of degrees per sample.
struct SimFlight<'a> {
    hardware: &'a Hardware,
    hub: &'a Hub<'a>,
}

impl FlightDriver for SimFlight<'_> {
    type Error = ();

    async fn send_yaw_velocity(&mut self, speed: f32) -> Result<(), ()> {
        let heading = self.hardware.flight.heading() + speed;
        self.hub.on_aircraft_heading(heading);
        Ok(())
    }
}
