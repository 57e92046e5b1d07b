//! Camera actuator: photo mode, shutter, and camera/SD-card health.
//!
//! Shutter verification is indirect. The shot counts once the hardware
//! reports a new media file; while the camera still reports shooting or
//! storing the actuator keeps checking, otherwise it fires again.
//!
//! Health callbacks (system state, SD card state) may arrive at any time. A
//! fault flips the status to [`ControllerStatus::Error`] and releases the
//! outcome barrier if a command is waiting, so the sequencer never blocks on
//! a camera that can no longer answer.

use core::cell::RefCell;
use core::fmt;
use core::future::Future;
use core::time::Duration;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use heapless::String;

use super::{ControllerStatus, Interruption, RetryBudget, interruption};
use crate::clock::Clock;
use crate::sync::{SharedCell, SyncBarrier};

/// Delay between a camera command and its verification.
pub const CAMERA_CHECK_DELAY: Duration = Duration::from_secs(2);

/// Maximum stored length of a media file name.
pub const MEDIA_NAME_CAPACITY: usize = 32;

/// File name reported for a captured image.
pub type MediaName = String<MEDIA_NAME_CAPACITY>;

/// Copies `name` into a [`MediaName`], truncating on a character boundary.
#[must_use]
pub fn media_name(name: &str) -> MediaName {
    let mut stored = MediaName::new();
    for ch in name.chars() {
        if stored.push(ch).is_err() {
            break;
        }
    }
    stored
}

/// Operating mode reported by the camera.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CameraMode {
    ShootPhoto,
    RecordVideo,
    Playback,
    Unknown,
}

/// Shutter mode used for every capture of a run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ShootMode {
    #[default]
    Single,
    /// Auto exposure bracketing.
    Aeb,
}

/// System state snapshot from the hardware callback.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CameraSystemState {
    pub mode: CameraMode,
    pub shooting: bool,
    pub storing: bool,
    pub overheated: bool,
    pub error: bool,
}

impl CameraSystemState {
    #[must_use]
    pub const fn idle(mode: CameraMode) -> Self {
        Self {
            mode,
            shooting: false,
            storing: false,
            overheated: false,
            error: false,
        }
    }
}

/// SD card report from the hardware callback.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct SdCardState {
    pub has_error: bool,
    pub read_only: bool,
    pub invalid_format: bool,
    pub full: bool,
    pub inserted: bool,
    pub formatted: bool,
    pub formatting: bool,
    pub initializing: bool,
    /// Remaining capacity in images; `0` when unknown.
    pub available_captures: u32,
}

impl SdCardState {
    /// A healthy, inserted and formatted card.
    #[must_use]
    pub const fn ready(available_captures: u32) -> Self {
        Self {
            has_error: false,
            read_only: false,
            invalid_format: false,
            full: false,
            inserted: true,
            formatted: true,
            formatting: false,
            initializing: false,
            available_captures,
        }
    }

    /// First fault in priority order, if any.
    #[must_use]
    pub const fn fault(&self) -> Option<HealthFault> {
        if self.has_error {
            Some(HealthFault::SdCardError)
        } else if self.read_only {
            Some(HealthFault::SdCardReadOnly)
        } else if self.invalid_format {
            Some(HealthFault::SdCardInvalidFormat)
        } else if self.full {
            Some(HealthFault::SdCardFull)
        } else if !self.inserted {
            Some(HealthFault::SdCardMissing)
        } else if !self.formatted {
            Some(HealthFault::SdCardUnformatted)
        } else if self.formatting {
            Some(HealthFault::SdCardFormatting)
        } else if self.initializing {
            Some(HealthFault::SdCardInitializing)
        } else {
            None
        }
    }
}

/// Hardware conditions that take the camera out of service.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HealthFault {
    Overheated,
    CameraError,
    SdCardError,
    SdCardReadOnly,
    SdCardInvalidFormat,
    SdCardFull,
    SdCardMissing,
    SdCardUnformatted,
    SdCardFormatting,
    SdCardInitializing,
}

impl HealthFault {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            HealthFault::Overheated => "Camera overheated",
            HealthFault::CameraError => "Camera in error state",
            HealthFault::SdCardError => "SD Card in error state",
            HealthFault::SdCardReadOnly => "SD Card is read only",
            HealthFault::SdCardInvalidFormat => "SD Card has invalid format",
            HealthFault::SdCardFull => "SD Card full",
            HealthFault::SdCardMissing => "SD Card missing",
            HealthFault::SdCardUnformatted => "SD Card requires formatting",
            HealthFault::SdCardFormatting => "SD Card is currently formatting",
            HealthFault::SdCardInitializing => "SD Card is currently initializing",
        }
    }
}

impl fmt::Display for HealthFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Status transition produced by a health callback.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HealthChange {
    /// The camera entered the error state.
    Fault(HealthFault),
    /// Every fault condition cleared while the camera was in error.
    Recovered,
}

/// Retry exhaustion reasons.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CameraFault {
    SetModeFailed,
    ShootFailed,
    CheckFailed,
}

impl CameraFault {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            CameraFault::SetModeFailed => "Failed to set mode",
            CameraFault::ShootFailed => "Failed to take a photo",
            CameraFault::CheckFailed => "Failed to check photo",
        }
    }
}

impl fmt::Display for CameraFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Work the sequencer can hand to the camera.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CameraRequest {
    SetPhotoMode,
    TakeSnap { mode: ShootMode, delay: Duration },
}

/// Result of one camera request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CameraOutcome {
    /// Command verified. Captures carry the reported media name.
    Completed { media: Option<MediaName> },
    Aborted(CameraFault),
    /// A hardware fault ended the command; it is reported separately.
    Fault(HealthFault),
    Stopped,
}

/// Hardware seam for camera control.
pub trait CameraDriver {
    type Error;

    fn set_camera_mode(&mut self, mode: CameraMode)
    -> impl Future<Output = Result<(), Self::Error>>;

    fn start_shoot_photo(&mut self, mode: ShootMode)
    -> impl Future<Output = Result<(), Self::Error>>;
}

/// State shared between the camera task, its hardware callbacks and the sequencer.
pub struct CameraLink<M>
where
    M: RawMutex,
{
    status: SharedCell<M, ControllerStatus>,
    fault: SharedCell<M, Option<HealthFault>>,
    mode: SharedCell<M, CameraMode>,
    shooting: SharedCell<M, bool>,
    storing: SharedCell<M, bool>,
    took_shot: SharedCell<M, bool>,
    available_captures: SharedCell<M, u32>,
    /// Bumped on every entry into the error state.
    fault_epoch: SharedCell<M, u32>,
    last_media: Mutex<M, RefCell<Option<MediaName>>>,
    requests: Channel<M, CameraRequest, 1>,
    outcome: SyncBarrier<M, CameraOutcome>,
}

impl<M> CameraLink<M>
where
    M: RawMutex,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: SharedCell::new(ControllerStatus::Normal),
            fault: SharedCell::new(None),
            mode: SharedCell::new(CameraMode::Unknown),
            shooting: SharedCell::new(false),
            storing: SharedCell::new(false),
            took_shot: SharedCell::new(false),
            available_captures: SharedCell::new(0),
            fault_epoch: SharedCell::new(0),
            last_media: Mutex::new(RefCell::new(None)),
            requests: Channel::new(),
            outcome: SyncBarrier::new("camera"),
        }
    }

    /// Current controller status.
    pub fn status(&self) -> ControllerStatus {
        self.status.get()
    }

    /// Mode from the latest system state report.
    pub fn mode(&self) -> CameraMode {
        self.mode.get()
    }

    /// Fault currently holding the camera in the error state.
    pub fn active_fault(&self) -> Option<HealthFault> {
        match self.status.get() {
            ControllerStatus::Error => self.fault.get(),
            _ => None,
        }
    }

    /// Remaining card capacity from the latest SD card report.
    pub fn available_captures(&self) -> u32 {
        self.available_captures.get()
    }

    /// Returns `true` when the card can hold `shot_count` more images.
    /// An unknown capacity (`0`) never blocks a run.
    pub fn has_space_for_pano(&self, shot_count: u16) -> bool {
        let available = self.available_captures.get();
        log_debug!(
            "camera comparing shot count {} with available {}",
            shot_count,
            available
        );
        available == 0 || u32::from(shot_count) <= available
    }

    /// Flags the in-flight command (if any) to stop at its next check.
    pub fn request_stop(&self) {
        self.status.update(ControllerStatus::stop_requested);
    }

    /// Returns `true` while a request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.outcome.is_active()
    }

    /// Hardware callback for the camera system state.
    ///
    /// Returns the fault when this report moves the camera into the error state.
    pub fn on_system_state(&self, state: CameraSystemState) -> Option<HealthFault> {
        self.mode.set(state.mode);
        self.shooting.set(state.shooting);
        self.storing.set(state.storing);

        let fault = if state.overheated {
            Some(HealthFault::Overheated)
        } else if state.error {
            Some(HealthFault::CameraError)
        } else {
            None
        };
        fault.and_then(|fault| self.enter_error(fault).then_some(fault))
    }

    /// Hardware callback for the SD card state.
    pub fn on_sd_card_state(&self, state: SdCardState) -> Option<HealthChange> {
        self.available_captures.set(state.available_captures);

        match state.fault() {
            Some(fault) => self
                .enter_error(fault)
                .then_some(HealthChange::Fault(fault)),
            None => {
                if self.status.get() != ControllerStatus::Error {
                    return None;
                }
                log_info!("camera recovered from error");
                self.fault.set(None);
                self.status.set(ControllerStatus::Normal);
                Some(HealthChange::Recovered)
            }
        }
    }

    /// Hardware callback for a newly written media file.
    pub fn on_new_media(&self, name: &str) {
        log_debug!("camera new media {}", name);
        let stored = media_name(name);
        self.last_media
            .lock(|slot| *slot.borrow_mut() = Some(stored));
        self.took_shot.set(true);
    }

    /// Sequencer side: submits `request` and waits for its outcome.
    ///
    /// A camera already in the error state answers immediately with its fault.
    pub async fn command(&self, request: CameraRequest) -> CameraOutcome {
        if let Some(fault) = self.active_fault() {
            log_warn!("camera command refused: {}", fault.message());
            return CameraOutcome::Fault(fault);
        }
        self.status.set(ControllerStatus::Normal);
        if matches!(request, CameraRequest::TakeSnap { .. }) {
            self.took_shot.set(false);
            self.last_media.lock(|slot| slot.borrow_mut().take());
        }
        self.outcome.arm();
        self.requests.send(request).await;
        self.outcome.wait().await
    }

    fn enter_error(&self, fault: HealthFault) -> bool {
        let previous = self.status.replace(ControllerStatus::Error);
        if previous == ControllerStatus::Error {
            return false;
        }
        log_warn!("camera entering error state: {}", fault.message());
        self.fault.set(Some(fault));
        self.fault_epoch.update(|epoch| epoch.wrapping_add(1));
        self.outcome.release_if_active(CameraOutcome::Fault(fault));
        true
    }

    fn take_media(&self) -> Option<MediaName> {
        self.last_media.lock(|slot| slot.borrow_mut().take())
    }
}

impl<M> Default for CameraLink<M>
where
    M: RawMutex,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Camera task state. Drive it with [`CameraActuator::run`].
pub struct CameraActuator<'a, M, D, C>
where
    M: RawMutex,
{
    link: &'a CameraLink<M>,
    driver: D,
    clock: &'a C,
    /// Fault epoch seen when the current request started.
    epoch: u32,
}

enum CheckResult {
    Captured,
    Reshoot,
    StillBusy,
}

impl<'a, M, D, C> CameraActuator<'a, M, D, C>
where
    M: RawMutex,
    D: CameraDriver,
    C: Clock,
{
    pub const fn new(link: &'a CameraLink<M>, driver: D, clock: &'a C) -> Self {
        Self {
            link,
            driver,
            clock,
            epoch: 0,
        }
    }

    /// The hardware driver this task commands.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Serves requests from the link forever.
    pub async fn run(&mut self) {
        loop {
            let request = self.link.requests.receive().await;
            if !self.link.outcome.is_active() {
                log_debug!("camera request dropped, already answered by a fault");
                continue;
            }
            if let Some(outcome) = self.execute(request).await {
                // A fault callback may already have answered this command.
                self.link.outcome.release_if_active(outcome);
            }
        }
    }

    /// Executes one request. `None` means a fault already answered it.
    ///
    /// A fault reported after the request started abandons it at the next
    /// check, even when the camera has recovered since.
    pub async fn execute(&mut self, request: CameraRequest) -> Option<CameraOutcome> {
        self.epoch = self.link.fault_epoch.get();
        let result = match request {
            CameraRequest::SetPhotoMode => self.set_photo_mode().await,
            CameraRequest::TakeSnap { mode, delay } => self.take_snap(mode, delay).await,
        };
        match result {
            Ok(outcome) => Some(outcome),
            Err(Interruption::Stopped) => {
                log_info!("camera command stopped");
                Some(CameraOutcome::Stopped)
            }
            Err(Interruption::Silent) => {
                log_debug!("camera command abandoned after fault");
                None
            }
        }
    }

    fn checkpoint(&self) -> Result<(), Interruption> {
        if self.link.fault_epoch.get() != self.epoch {
            return Err(Interruption::Silent);
        }
        interruption(self.link.status()).map_or(Ok(()), Err)
    }

    async fn set_photo_mode(&mut self) -> Result<CameraOutcome, Interruption> {
        log_info!("camera set photo mode");
        let mut budget = RetryBudget::default();
        loop {
            self.checkpoint()?;
            if self
                .driver
                .set_camera_mode(CameraMode::ShootPhoto)
                .await
                .is_ok()
            {
                self.clock.sleep(CAMERA_CHECK_DELAY).await;
                self.checkpoint()?;
                if self.link.mode() == CameraMode::ShootPhoto {
                    log_debug!("camera photo mode confirmed");
                    return Ok(CameraOutcome::Completed { media: None });
                }
                log_warn!("camera mode not set yet, attempt {}", budget.retries());
            } else {
                log_warn!("camera rejected mode change, attempt {}", budget.retries());
            }
            if !budget.try_retry() {
                return Ok(CameraOutcome::Aborted(CameraFault::SetModeFailed));
            }
        }
    }

    async fn take_snap(
        &mut self,
        mode: ShootMode,
        delay: Duration,
    ) -> Result<CameraOutcome, Interruption> {
        log_info!("camera take snap");
        let mut budget = RetryBudget::default();
        let mut first_attempt = true;
        loop {
            self.checkpoint()?;
            if first_attempt && delay > Duration::ZERO {
                log_debug!("camera waiting {} ms before shot", delay.as_millis());
                self.clock.sleep(delay).await;
                self.checkpoint()?;
            }
            first_attempt = false;

            if self.driver.start_shoot_photo(mode).await.is_ok() {
                match self.check_snap().await? {
                    CheckResult::Captured => {
                        return Ok(CameraOutcome::Completed {
                            media: self.link.take_media(),
                        });
                    }
                    CheckResult::Reshoot => {
                        log_warn!("camera shot not confirmed, attempt {}", budget.retries());
                    }
                    CheckResult::StillBusy => {
                        return Ok(CameraOutcome::Aborted(CameraFault::CheckFailed));
                    }
                }
            } else {
                log_warn!("camera rejected shutter, attempt {}", budget.retries());
            }

            if !budget.try_retry() {
                return Ok(CameraOutcome::Aborted(CameraFault::ShootFailed));
            }
        }
    }

    async fn check_snap(&mut self) -> Result<CheckResult, Interruption> {
        let mut checks = RetryBudget::default();
        loop {
            self.checkpoint()?;
            self.clock.sleep(CAMERA_CHECK_DELAY).await;
            self.checkpoint()?;

            if self.link.took_shot.get() {
                log_debug!("camera shot confirmed");
                return Ok(CheckResult::Captured);
            }
            if !(self.link.shooting.get() || self.link.storing.get()) {
                return Ok(CheckResult::Reshoot);
            }
            log_debug!("camera busy, check {}", checks.retries());
            if !checks.try_retry() {
                return Ok(CheckResult::StillBusy);
            }
        }
    }
}
