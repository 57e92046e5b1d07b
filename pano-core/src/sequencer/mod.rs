//! Panorama sequencer and hardware callback hub.
//!
//! [`PanoramaSequencer::start`] is the run: it checks the preconditions,
//! builds a [`PanoramaPlan`] and then walks it, handing one request at a time
//! to the gimbal, camera and aircraft links and waiting for each outcome.
//! Every other method takes `&self` and may be called while a run is in
//! progress; that is how stop requests and hardware callbacks reach it.

pub mod preflight;

use core::cell::RefCell;
use core::fmt;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

pub use preflight::{Connection, PreflightError, Product};

use crate::actuator::aircraft::{FlightLink, YawFault, YawOutcome};
use crate::actuator::camera::{
    CameraFault, CameraLink, CameraOutcome, CameraRequest, CameraSystemState, HealthChange,
    HealthFault, SdCardState, media_name,
};
use crate::actuator::gimbal::{GimbalFault, GimbalLink, GimbalOutcome, GimbalRequest, OutOfRange};
use crate::actuator::Attitude;
use crate::clock::Clock;
use crate::events::{EventSink, PanoEvent, message};
use crate::plan::{PanoramaPlan, YawMode};
use crate::session::PanoramaSession;
use crate::settings::{FlightMode, ModelSettings};
use crate::sync::SharedCell;

/// Remote controller battery level below which the operator is warned.
pub const REMOTE_BATTERY_WARNING_PERCENT: u8 = 10;

/// Run flag: `state` while a run is active, `ok` false once it aborted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PanoRunning {
    pub state: bool,
    pub ok: bool,
}

impl PanoRunning {
    pub const IDLE: Self = Self {
        state: false,
        ok: true,
    };
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequencerState {
    Idle,
    Starting,
    Running,
    Finishing,
}

impl SequencerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SequencerState::Idle => "idle",
            SequencerState::Starting => "starting",
            SequencerState::Running => "running",
            SequencerState::Finishing => "finishing",
        }
    }
}

/// Images captured so far out of the planned total.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Progress {
    pub count: u16,
    pub total: u16,
}

/// Why a run ended early.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AbortReason {
    Gimbal(GimbalFault),
    OutOfRange(OutOfRange),
    Camera(CameraFault),
    Health(HealthFault),
    Yaw(YawFault),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Gimbal(fault) => fault.fmt(f),
            AbortReason::OutOfRange(rejected) => rejected.fmt(f),
            AbortReason::Camera(fault) => fault.fmt(f),
            AbortReason::Health(fault) => fault.fmt(f),
            AbortReason::Yaw(fault) => fault.fmt(f),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed,
    Stopped,
    Aborted(AbortReason),
}

/// Summary returned by a run that got past the preconditions.
#[derive(Clone, Debug)]
pub struct RunReport<TInstant> {
    pub outcome: RunOutcome,
    pub yaw_mode: YawMode,
    pub planned: u16,
    pub session: PanoramaSession<TInstant>,
}

/// The actuator links a sequencer drives.
pub struct Links<'a, M>
where
    M: RawMutex,
{
    pub gimbal: &'a GimbalLink<M>,
    pub camera: &'a CameraLink<M>,
    pub flight: &'a FlightLink<M>,
}

// Let `Links` be copied regardless of `M`.
impl<M: RawMutex> Clone for Links<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex> Copy for Links<'_, M> {}

/// How a run left the capture loop early.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Halt {
    Stopped,
    /// Already reported through the hub.
    Faulted(HealthFault),
    Aborted(AbortReason),
}

pub struct PanoramaSequencer<'a, M, C, S>
where
    M: RawMutex,
    C: Clock,
    S: EventSink,
{
    links: Links<'a, M>,
    clock: &'a C,
    sink: &'a S,
    connection: SharedCell<M, Connection>,
    rc_mode: SharedCell<M, Option<FlightMode>>,
    running: SharedCell<M, PanoRunning>,
    /// Camera fault the hub surfaced during the current run.
    run_fault: SharedCell<M, Option<HealthFault>>,
    state: SharedCell<M, SequencerState>,
    progress: SharedCell<M, Progress>,
    session: Mutex<M, RefCell<Option<PanoramaSession<C::Instant>>>>,
}

impl<'a, M, C, S> PanoramaSequencer<'a, M, C, S>
where
    M: RawMutex,
    C: Clock,
    S: EventSink,
{
    pub const fn new(links: Links<'a, M>, clock: &'a C, sink: &'a S) -> Self {
        Self {
            links,
            clock,
            sink,
            connection: SharedCell::new(Connection {
                product: None,
                camera: false,
                gimbal: false,
                flight_controller: false,
                remote: false,
            }),
            rc_mode: SharedCell::new(None),
            running: SharedCell::new(PanoRunning::IDLE),
            run_fault: SharedCell::new(None),
            state: SharedCell::new(SequencerState::Idle),
            progress: SharedCell::new(Progress { count: 0, total: 0 }),
            session: Mutex::new(RefCell::new(None)),
        }
    }

    /// Run flag as seen by the operator interface.
    pub fn running(&self) -> PanoRunning {
        self.running.get()
    }

    /// Current phase of the run state machine.
    pub fn state(&self) -> SequencerState {
        self.state.get()
    }

    /// Images captured so far in the current (or last) run.
    pub fn progress(&self) -> Progress {
        self.progress.get()
    }

    /// Last connection snapshot passed to [`Self::set_connection`].
    pub fn connection(&self) -> Connection {
        self.connection.get()
    }

    /// Runs one panorama to completion, stop or abort.
    ///
    /// Precondition failures post their message and leave the sequencer idle.
    pub async fn start(
        &self,
        settings: &ModelSettings,
    ) -> Result<RunReport<C::Instant>, PreflightError> {
        let plan = match self.prepare(settings) {
            Ok(plan) => plan,
            Err(error) => {
                let text = message(format_args!("{error}"));
                log_warn!("panorama preflight failed: {}", text.as_str());
                self.sink.post(PanoEvent::UserMessage(text));
                return Err(error);
            }
        };

        log_info!(
            "panorama starting: {} rows, {} columns, {} yaw",
            plan.pitches.len(),
            plan.columns.len(),
            plan.yaw_mode.as_str()
        );
        self.run_fault.set(None);
        self.running.set(PanoRunning {
            state: true,
            ok: true,
        });
        self.sink.post(PanoEvent::user_message("Panorama starting"));
        self.sink.post(PanoEvent::PanoStarting);
        let planned = plan.image_count();
        self.set_progress(Progress {
            count: 0,
            total: planned,
        });
        self.session
            .lock(|slot| *slot.borrow_mut() = Some(PanoramaSession::begin(self.clock.now())));
        self.state.set(SequencerState::Running);

        let halted = match self.capture(&plan).await {
            // A fault on the last step leaves no later check to notice it.
            Ok(()) => self.run_fault.get().map_or(Ok(()), |fault| Err(Halt::Faulted(fault))),
            halted => halted,
        };

        self.state.set(SequencerState::Finishing);
        match self.links.gimbal.command(GimbalRequest::Reset).await {
            GimbalOutcome::Completed => {}
            other => log_warn!("final gimbal reset failed: {}", outcome_label(&other)),
        }

        let outcome = match halted {
            Ok(()) => {
                self.sink.post(PanoEvent::user_message("Panorama complete"));
                self.running.set(PanoRunning::IDLE);
                RunOutcome::Completed
            }
            Err(Halt::Stopped) => {
                self.running.set(PanoRunning::IDLE);
                RunOutcome::Stopped
            }
            Err(Halt::Faulted(fault)) => {
                self.abort_flag();
                RunOutcome::Aborted(AbortReason::Health(fault))
            }
            Err(Halt::Aborted(reason)) => {
                let text = message(format_args!("{reason}"));
                log_warn!("panorama aborted: {}", text.as_str());
                self.sink.post(PanoEvent::UserMessage(text));
                self.abort_flag();
                RunOutcome::Aborted(reason)
            }
        };

        let now = self.clock.now();
        let session = self
            .session
            .lock(|slot| slot.borrow_mut().take())
            .map(|mut session| {
                session.finish(now);
                session
            })
            .unwrap_or_else(|| {
                let mut session = PanoramaSession::begin(now);
                session.finish(now);
                session
            });
        self.state.set(SequencerState::Idle);
        log_info!("panorama finished with {} images", session.image_count());

        Ok(RunReport {
            outcome,
            yaw_mode: plan.yaw_mode,
            planned,
            session,
        })
    }

    /// Requests the active run to stop after the command in flight.
    pub fn stop(&self) {
        if !self.running.get().state {
            log_debug!("stop ignored, no panorama running");
            return;
        }
        log_info!("panorama stop requested");
        self.sink
            .post(PanoEvent::user_message("Panorama stopping. Please wait ..."));
        self.sink.post(PanoEvent::PanoStopping);
        self.running.set(PanoRunning {
            state: false,
            ok: true,
        });
        self.links.gimbal.request_stop();
        self.links.camera.request_stop();
        self.links.flight.request_stop();
    }

    fn prepare(&self, settings: &ModelSettings) -> Result<PanoramaPlan, PreflightError> {
        if self.running.get().state || self.state.get() != SequencerState::Idle {
            return Err(PreflightError::AlreadyRunning);
        }
        let connection = self.connection.get();
        let camera = self.links.camera;
        let product = preflight::check(
            &connection,
            settings,
            |images| camera.has_space_for_pano(images),
            self.rc_mode.get(),
        )?;
        self.state.set(SequencerState::Starting);

        let (yaw_mode, heading) = if settings.uses_gimbal_yaw(product.product_type, product.model)
        {
            let home = self.links.gimbal.to_absolute(Attitude::ZERO);
            (YawMode::Gimbal, home.yaw)
        } else {
            (YawMode::Aircraft, self.links.flight.heading())
        };
        PanoramaPlan::build(settings, product.product_type, yaw_mode, heading).map_err(|error| {
            self.state.set(SequencerState::Idle);
            PreflightError::Plan(error)
        })
    }

    async fn capture(&self, plan: &PanoramaPlan) -> Result<(), Halt> {
        if !plan.start_delay.is_zero() {
            log_info!("waiting {} s before first shot", plan.start_delay.as_secs());
            self.clock.sleep(plan.start_delay).await;
        }
        self.gimbal_step(GimbalRequest::Reset).await?;
        self.camera_step(CameraRequest::SetPhotoMode).await?;

        let snap = CameraRequest::TakeSnap {
            mode: plan.shoot_mode,
            delay: plan.photo_delay,
        };
        for (column, &heading) in plan.columns.iter().enumerate() {
            log_debug!("column {} of {}", column + 1, plan.columns.len());
            for &pitch in &plan.pitches {
                self.gimbal_step(GimbalRequest::pitch(pitch)).await?;
                self.camera_step(snap).await?;
            }
            self.yaw_step(plan.yaw_mode, heading).await?;
        }

        if plan.nadir_count > 0 {
            self.gimbal_step(GimbalRequest::pitch(plan.nadir_pitch)).await?;
            self.camera_step(snap).await?;
            for &heading in &plan.nadir_yaws {
                self.yaw_step(plan.yaw_mode, heading).await?;
                self.camera_step(snap).await?;
            }
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), Halt> {
        if let Some(fault) = self.run_fault.get() {
            return Err(Halt::Faulted(fault));
        }
        if self.running.get().state {
            Ok(())
        } else {
            Err(Halt::Stopped)
        }
    }

    async fn gimbal_step(&self, request: GimbalRequest) -> Result<(), Halt> {
        self.checkpoint()?;
        match self.links.gimbal.command(request).await {
            GimbalOutcome::Completed => Ok(()),
            GimbalOutcome::Stopped => Err(Halt::Stopped),
            GimbalOutcome::Aborted(fault) => Err(Halt::Aborted(AbortReason::Gimbal(fault))),
            GimbalOutcome::OutOfRange(rejected) => {
                Err(Halt::Aborted(AbortReason::OutOfRange(rejected)))
            }
        }
    }

    async fn camera_step(&self, request: CameraRequest) -> Result<(), Halt> {
        self.checkpoint()?;
        match self.links.camera.command(request).await {
            CameraOutcome::Completed { media } => {
                if let Some(name) = media {
                    log_debug!("captured {}", name.as_str());
                }
                Ok(())
            }
            CameraOutcome::Stopped => Err(Halt::Stopped),
            CameraOutcome::Aborted(fault) => Err(Halt::Aborted(AbortReason::Camera(fault))),
            // The hub reports faults that arrive during a run; a camera that
            // was already broken when the run began is reported here.
            CameraOutcome::Fault(fault) => match self.run_fault.get() {
                Some(reported) => Err(Halt::Faulted(reported)),
                None => Err(Halt::Aborted(AbortReason::Health(fault))),
            },
        }
    }

    async fn yaw_step(&self, mode: YawMode, heading: f32) -> Result<(), Halt> {
        match mode {
            YawMode::Gimbal => self.gimbal_step(GimbalRequest::yaw(heading)).await,
            YawMode::Aircraft => {
                self.checkpoint()?;
                match self.links.flight.yaw_to(heading).await {
                    YawOutcome::Completed => {}
                    YawOutcome::TimedOut => {
                        self.sink.post(PanoEvent::user_warning("Yaw did not complete"));
                    }
                    YawOutcome::Stopped => return Err(Halt::Stopped),
                    YawOutcome::Aborted(fault) => {
                        return Err(Halt::Aborted(AbortReason::Yaw(fault)));
                    }
                }
                if self.links.gimbal.relative_yaw() {
                    // A nose-relative gimbal keeps its yaw target in the
                    // absolute frame; follow the airframe to the new heading.
                    let heading = self.links.flight.heading();
                    self.gimbal_step(GimbalRequest::yaw(heading)).await?;
                }
                Ok(())
            }
        }
    }

    fn abort_flag(&self) {
        self.running.set(PanoRunning {
            state: false,
            ok: false,
        });
    }

    fn set_progress(&self, progress: Progress) {
        self.progress.set(progress);
        self.sink.post(PanoEvent::CountChanged {
            count: progress.count,
            total: progress.total,
        });
    }

    fn camera_fault(&self, fault: HealthFault) {
        log_warn!("camera fault: {}", fault.message());
        self.sink.post(PanoEvent::user_message(fault.message()));
        if self.state.get() != SequencerState::Idle {
            // Keep the first fault; later ones are reported but do not
            // change how the run ends.
            if self.run_fault.get().is_none() {
                self.run_fault.set(Some(fault));
            }
            self.abort_flag();
        }
        self.sink.post(PanoEvent::PanoAvailable(false));
    }
}

/// Hardware callbacks. Each one updates the owning link and reports upwards.
impl<M, C, S> PanoramaSequencer<'_, M, C, S>
where
    M: RawMutex,
    C: Clock,
    S: EventSink,
{
    /// A product (or one of its components) connected or went away.
    pub fn set_connection(&self, connection: Connection) {
        if let Some(product) = connection.product {
            log_info!(
                "connected {} ({})",
                product.model.as_str(),
                product.product_type.as_str()
            );
            self.links
                .gimbal
                .set_relative_yaw(product.model.relative_gimbal_yaw());
        } else {
            log_info!("product disconnected");
        }
        self.connection.set(connection);
    }

    /// Gimbal attitude in the hardware frame.
    pub fn on_gimbal_attitude(&self, raw: Attitude) {
        let absolute = self.links.gimbal.on_attitude_changed(raw);
        self.sink.post(PanoEvent::GimbalAttitude(absolute));
    }

    /// Compass heading; also moves the gimbal's absolute frame.
    pub fn on_aircraft_heading(&self, heading: f32) {
        self.links.flight.on_heading_changed(heading);
        let compass = self.links.flight.heading();
        self.links.gimbal.set_aircraft_heading(compass);
        self.sink.post(PanoEvent::AircraftYaw(compass));
    }

    pub fn on_aircraft_altitude(&self, altitude: f32) {
        self.sink.post(PanoEvent::AircraftAltitude(altitude));
    }

    pub fn on_aircraft_satellites(&self, count: u8) {
        self.sink.post(PanoEvent::AircraftSatellites(count));
    }

    pub fn on_aircraft_distance(&self, metres: f32) {
        self.sink.post(PanoEvent::AircraftDistance(metres));
    }

    /// Camera mode and health; a new fault aborts the active run.
    pub fn on_camera_system_state(&self, state: CameraSystemState) {
        if let Some(fault) = self.links.camera.on_system_state(state) {
            self.camera_fault(fault);
        }
    }

    /// SD card health and capacity; a new fault aborts the active run.
    pub fn on_sd_card_state(&self, state: SdCardState) {
        match self.links.camera.on_sd_card_state(state) {
            Some(HealthChange::Fault(fault)) => self.camera_fault(fault),
            Some(HealthChange::Recovered) => {
                self.sink.post(PanoEvent::user_message("Camera is ready"));
                self.sink.post(PanoEvent::PanoAvailable(true));
            }
            None => {}
        }
    }

    /// Records the file in the session while a run is capturing or
    /// finishing, including shots that land after a stop request.
    pub fn on_new_media(&self, name: &str) {
        self.links.camera.on_new_media(name);
        if matches!(
            self.state.get(),
            SequencerState::Running | SequencerState::Finishing
        ) {
            self.session.lock(|slot| {
                if let Some(session) = slot.borrow_mut().as_mut() {
                    session.record(media_name(name));
                }
            });
            let mut progress = self.progress.get();
            progress.count = progress.count.saturating_add(1);
            self.set_progress(progress);
        }
    }

    /// Warns below [`REMOTE_BATTERY_WARNING_PERCENT`].
    pub fn on_remote_battery(&self, percent: u8) {
        if percent < REMOTE_BATTERY_WARNING_PERCENT {
            self.post_warning(format_args!("Remote Controller Battery Low: {percent}%"));
        }
    }

    pub fn on_remote_flight_mode(&self, mode: FlightMode) {
        log_debug!("remote flight mode {}", mode.as_str());
        self.rc_mode.set(Some(mode));
    }

    fn post_warning(&self, args: fmt::Arguments<'_>) {
        self.sink.post(PanoEvent::UserWarning(message(args)));
    }
}

fn outcome_label(outcome: &GimbalOutcome) -> &'static str {
    match outcome {
        GimbalOutcome::Completed => "completed",
        GimbalOutcome::Aborted(fault) => fault.message(),
        GimbalOutcome::OutOfRange(_) => "out of range",
        GimbalOutcome::Stopped => "stopped",
    }
}
