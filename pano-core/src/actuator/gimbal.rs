//! Gimbal actuator: absolute attitude commands with convergence checks.
//!
//! Requests arrive over [`GimbalLink`] one at a time. Each accepted request
//! becomes a combined attitude command (the untouched axes keep their last
//! targets), followed by a settle delay and a comparison against the attitude
//! reported by the hardware callback. Misses and driver errors are retried
//! until the [`RetryBudget`] runs out.

use core::fmt;
use core::future::Future;
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

use super::{
    Attitude, Axis, ControllerStatus, GimbalCapabilities, Interruption, RetryBudget,
    SETTLE_MARGIN, interruption,
};
use crate::angles::normalize_angle;
use crate::clock::Clock;
use crate::sync::{SharedCell, SyncBarrier};

/// Allowed offset between commanded and observed angles, in degrees.
pub const GIMBAL_TOLERANCE: f32 = 5.0;

/// Work the sequencer can hand to the gimbal.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GimbalRequest {
    /// Return every axis to zero.
    Reset,
    /// Move one axis to an absolute angle.
    Move { axis: Axis, value: f32 },
}

impl GimbalRequest {
    #[must_use]
    pub const fn pitch(value: f32) -> Self {
        Self::Move {
            axis: Axis::Pitch,
            value,
        }
    }

    #[must_use]
    pub const fn yaw(value: f32) -> Self {
        Self::Move {
            axis: Axis::Yaw,
            value,
        }
    }

    #[must_use]
    pub const fn roll(value: f32) -> Self {
        Self::Move {
            axis: Axis::Roll,
            value,
        }
    }
}

/// Retry exhaustion reasons.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GimbalFault {
    ResetFailed,
    AttitudeFailed,
}

impl GimbalFault {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            GimbalFault::ResetFailed => "Unable to reset gimbal",
            GimbalFault::AttitudeFailed => "Unable to set gimbal attitude",
        }
    }
}

impl fmt::Display for GimbalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A move rejected before reaching the hardware.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OutOfRange {
    pub axis: Axis,
    pub value: f32,
}

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} was out of range", self.axis.label(), self.value)
    }
}

/// Result of one gimbal request.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GimbalOutcome {
    Completed,
    Aborted(GimbalFault),
    OutOfRange(OutOfRange),
    Stopped,
}

/// Hardware seam for gimbal control.
pub trait GimbalDriver {
    type Error;

    /// Axis ranges reported by the hardware.
    fn capabilities(&self) -> GimbalCapabilities;

    /// Time the hardware needs to finish an angle command.
    fn completion_time(&self) -> Duration;

    /// Commands an absolute attitude in the hardware frame.
    fn rotate(&mut self, attitude: Attitude) -> impl Future<Output = Result<(), Self::Error>>;

    /// Returns every axis to its zero position.
    fn reset(&mut self) -> impl Future<Output = Result<(), Self::Error>>;
}

/// State shared between the gimbal task, its hardware callbacks and the sequencer.
pub struct GimbalLink<M>
where
    M: RawMutex,
{
    relative_yaw: SharedCell<M, bool>,
    status: SharedCell<M, ControllerStatus>,
    observed: SharedCell<M, Attitude>,
    aircraft_heading: SharedCell<M, f32>,
    requests: Channel<M, GimbalRequest, 1>,
    outcome: SyncBarrier<M, GimbalOutcome>,
}

impl<M> GimbalLink<M>
where
    M: RawMutex,
{
    /// Creates a link. With `relative_yaw` the hardware reports and accepts
    /// yaw relative to the aircraft nose instead of north.
    #[must_use]
    pub const fn new(relative_yaw: bool) -> Self {
        Self {
            relative_yaw: SharedCell::new(relative_yaw),
            status: SharedCell::new(ControllerStatus::Normal),
            observed: SharedCell::new(Attitude::ZERO),
            aircraft_heading: SharedCell::new(0.0),
            requests: Channel::new(),
            outcome: SyncBarrier::new("gimbal"),
        }
    }

    /// Returns `true` when yaw is exchanged relative to the aircraft nose.
    pub fn relative_yaw(&self) -> bool {
        self.relative_yaw.get()
    }

    /// Switches the yaw frame, e.g. when a different product connects.
    pub fn set_relative_yaw(&self, relative_yaw: bool) {
        self.relative_yaw.set(relative_yaw);
    }

    /// Current controller status.
    pub fn status(&self) -> ControllerStatus {
        self.status.get()
    }

    /// Flags the in-flight command (if any) to stop at its next check.
    pub fn request_stop(&self) {
        self.status.update(ControllerStatus::stop_requested);
    }

    /// Returns `true` while a request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.outcome.is_active()
    }

    /// Last attitude reported by the hardware, in the hardware frame.
    pub fn observed(&self) -> Attitude {
        self.observed.get()
    }

    /// Hardware callback: stores the raw attitude and returns it in the
    /// absolute frame.
    pub fn on_attitude_changed(&self, raw: Attitude) -> Attitude {
        self.observed.set(raw);
        self.to_absolute(raw)
    }

    /// Aircraft compass heading in `[0, 360)`.
    pub fn set_aircraft_heading(&self, heading: f32) {
        self.aircraft_heading.set(heading);
    }

    /// Converts a hardware-frame attitude into the absolute frame.
    pub fn to_absolute(&self, raw: Attitude) -> Attitude {
        if !self.relative_yaw.get() {
            return raw;
        }
        let heading = self.aircraft_heading.get();
        raw.with_axis(Axis::Yaw, normalize_angle(raw.yaw + heading))
    }

    /// Converts an absolute attitude into the hardware frame.
    pub fn to_hardware(&self, absolute: Attitude) -> Attitude {
        if !self.relative_yaw.get() {
            return absolute;
        }
        let heading = self.aircraft_heading.get();
        absolute.with_axis(Axis::Yaw, normalize_angle(absolute.yaw - heading))
    }

    /// Sequencer side: submits `request` and waits for its outcome.
    pub async fn command(&self, request: GimbalRequest) -> GimbalOutcome {
        self.status.set(ControllerStatus::Normal);
        self.outcome.arm();
        self.requests.send(request).await;
        self.outcome.wait().await
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum DriveMode {
    Reset,
    Rotate,
}

impl DriveMode {
    const fn fault(self) -> GimbalFault {
        match self {
            DriveMode::Reset => GimbalFault::ResetFailed,
            DriveMode::Rotate => GimbalFault::AttitudeFailed,
        }
    }
}

/// Gimbal task state. Drive it with [`GimbalActuator::run`].
pub struct GimbalActuator<'a, M, D, C>
where
    M: RawMutex,
{
    link: &'a GimbalLink<M>,
    driver: D,
    clock: &'a C,
    capabilities: GimbalCapabilities,
    target: Attitude,
}

impl<'a, M, D, C> GimbalActuator<'a, M, D, C>
where
    M: RawMutex,
    D: GimbalDriver,
    C: Clock,
{
    pub fn new(link: &'a GimbalLink<M>, driver: D, clock: &'a C) -> Self {
        let capabilities = driver.capabilities();
        Self {
            link,
            driver,
            clock,
            capabilities,
            target: Attitude::ZERO,
        }
    }

    /// Last accepted target, in the absolute frame.
    #[must_use]
    pub const fn target(&self) -> Attitude {
        self.target
    }

    #[must_use]
    pub const fn capabilities(&self) -> GimbalCapabilities {
        self.capabilities
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Serves requests from the link forever.
    pub async fn run(&mut self) {
        loop {
            let request = self.link.requests.receive().await;
            if let Some(outcome) = self.execute(request).await {
                self.link.outcome.release(outcome);
            }
        }
    }

    /// Executes one request. `None` means the command ended silently because
    /// a hardware fault was already reported.
    pub async fn execute(&mut self, request: GimbalRequest) -> Option<GimbalOutcome> {
        match request {
            GimbalRequest::Reset => {
                log_info!("gimbal reset");
                self.target = self.link.to_absolute(Attitude::ZERO);
                self.drive(Attitude::ZERO, DriveMode::Reset).await
            }
            GimbalRequest::Move { axis, value } => {
                let normalized = normalize_angle(value);
                if !self.capabilities.axis(axis).contains(normalized) {
                    log_warn!("gimbal {} {} out of range", axis.label(), normalized);
                    return Some(GimbalOutcome::OutOfRange(OutOfRange {
                        axis,
                        value: normalized,
                    }));
                }
                let target = self.target.with_axis(axis, normalized);
                self.target = target;
                self.drive(target, DriveMode::Rotate).await
            }
        }
    }

    async fn drive(&mut self, target: Attitude, mode: DriveMode) -> Option<GimbalOutcome> {
        let mut budget = RetryBudget::default();
        let settle = self.driver.completion_time() + SETTLE_MARGIN;

        loop {
            if let Some(reason) = interruption(self.link.status()) {
                return Self::interrupted(reason);
            }

            log_debug!(
                "gimbal attempt {} pitch {} yaw {} roll {}",
                budget.retries(),
                target.pitch,
                target.yaw,
                target.roll
            );
            let sent = match mode {
                DriveMode::Reset => self.driver.reset().await,
                DriveMode::Rotate => {
                    let command = self.link.to_hardware(target);
                    self.driver.rotate(command).await
                }
            };

            if sent.is_ok() {
                self.clock.sleep(settle).await;
                if let Some(reason) = interruption(self.link.status()) {
                    return Self::interrupted(reason);
                }
                if self.converged(target, mode) {
                    log_debug!("gimbal settled after {} retries", budget.retries());
                    return Some(GimbalOutcome::Completed);
                }
                log_debug!("gimbal not settled, attempt {}", budget.retries());
            } else {
                log_warn!("gimbal driver rejected attempt {}", budget.retries());
            }

            if !budget.try_retry() {
                let fault = mode.fault();
                log_warn!("gimbal giving up: {}", fault.message());
                return Some(GimbalOutcome::Aborted(fault));
            }
        }
    }

    fn converged(&self, target: Attitude, mode: DriveMode) -> bool {
        let raw = self.link.observed();
        let observed = match mode {
            DriveMode::Reset => raw,
            DriveMode::Rotate => self.link.to_absolute(raw),
        };
        [Axis::Pitch, Axis::Yaw, Axis::Roll].into_iter().all(|axis| {
            self.capabilities.axis(axis).converged(
                target.axis(axis),
                observed.axis(axis),
                GIMBAL_TOLERANCE,
            )
        })
    }

    fn interrupted(reason: Interruption) -> Option<GimbalOutcome> {
        match reason {
            Interruption::Stopped => {
                log_info!("gimbal command stopped");
                Some(GimbalOutcome::Stopped)
            }
            Interruption::Silent => {
                log_debug!("gimbal command abandoned after fault");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::AxisCapability;
    use crate::clock::mock::MockClock;
    use core::cell::RefCell;
    use embassy_futures::block_on;
    use embassy_futures::select::{Either, select};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    type Link = GimbalLink<NoopRawMutex>;

    #[derive(Copy, Clone, Debug, PartialEq)]
    enum Call {
        Rotate(Attitude),
        Reset,
    }

    /// Driver that mirrors commands into the link, optionally with faults.
    struct MockGimbal<'a> {
        link: &'a Link,
        calls: RefCell<Vec<Call>>,
        rejections: u8,
        stuck: bool,
        stop_on_first_call: bool,
    }

    impl<'a> MockGimbal<'a> {
        fn new(link: &'a Link) -> Self {
            Self {
                link,
                calls: RefCell::new(Vec::new()),
                rejections: 0,
                stuck: false,
                stop_on_first_call: false,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn respond(&mut self, call: Call, attitude: Attitude) -> Result<(), ()> {
            let first = self.calls.borrow().is_empty();
            self.calls.borrow_mut().push(call);
            if first && self.stop_on_first_call {
                self.link.request_stop();
            }
            if self.rejections > 0 {
                self.rejections -= 1;
                return Err(());
            }
            if !self.stuck {
                self.link.on_attitude_changed(attitude);
            }
            Ok(())
        }
    }

    impl GimbalDriver for MockGimbal<'_> {
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
            self.respond(Call::Rotate(attitude), attitude)
        }

        async fn reset(&mut self) -> Result<(), ()> {
            self.respond(Call::Reset, Attitude::ZERO)
        }
    }

    #[test]
    fn out_of_range_pitch_never_reaches_hardware() {
        let link = Link::new(false);
        let clock = MockClock::default();
        let mut actuator = GimbalActuator::new(&link, MockGimbal::new(&link), &clock);

        let outcome = block_on(actuator.execute(GimbalRequest::pitch(95.0)));

        match outcome {
            Some(GimbalOutcome::OutOfRange(rejected)) => {
                assert_eq!(rejected.axis, Axis::Pitch);
                assert_eq!(format!("{rejected}"), "Pitch 95 was out of range");
            }
            other => panic!("expected out of range, got {other:?}"),
        }
        assert!(actuator.driver().calls().is_empty());
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn pitch_converges_on_first_attempt() {
        let link = Link::new(false);
        let clock = MockClock::default();
        let mut actuator = GimbalActuator::new(&link, MockGimbal::new(&link), &clock);

        let outcome = block_on(actuator.execute(GimbalRequest::pitch(-30.0)));

        assert_eq!(outcome, Some(GimbalOutcome::Completed));
        assert_eq!(
            actuator.driver().calls(),
            vec![Call::Rotate(Attitude::new(-30.0, 0.0, 0.0))]
        );
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn combined_attitude_keeps_previous_targets() {
        let link = Link::new(false);
        let clock = MockClock::default();
        let mut actuator = GimbalActuator::new(&link, MockGimbal::new(&link), &clock);

        block_on(actuator.execute(GimbalRequest::pitch(-30.0)));
        block_on(actuator.execute(GimbalRequest::yaw(190.0)));

        assert_eq!(
            actuator.driver().calls().last(),
            Some(&Call::Rotate(Attitude::new(-30.0, -170.0, 0.0)))
        );
        assert_eq!(actuator.target(), Attitude::new(-30.0, -170.0, 0.0));
    }

    #[test]
    fn stuck_gimbal_aborts_after_budget() {
        let link = Link::new(false);
        let clock = MockClock::default();
        let mut driver = MockGimbal::new(&link);
        driver.stuck = true;
        let mut actuator = GimbalActuator::new(&link, driver, &clock);

        let outcome = block_on(actuator.execute(GimbalRequest::pitch(-60.0)));

        assert_eq!(
            outcome,
            Some(GimbalOutcome::Aborted(GimbalFault::AttitudeFailed))
        );
        assert_eq!(
            actuator.driver().calls().len(),
            usize::from(crate::actuator::MAX_RETRIES) + 1
        );
    }

    #[test]
    fn driver_errors_are_retried() {
        let link = Link::new(false);
        let clock = MockClock::default();
        let mut driver = MockGimbal::new(&link);
        driver.rejections = 2;
        let mut actuator = GimbalActuator::new(&link, driver, &clock);

        let outcome = block_on(actuator.execute(GimbalRequest::Reset));

        assert_eq!(outcome, Some(GimbalOutcome::Completed));
        assert_eq!(actuator.driver().calls(), vec![Call::Reset; 3]);
        // Rejected attempts skip the settle delay.
        assert_eq!(clock.sleeps(), 1);
    }

    #[test]
    fn stuck_reset_reports_reset_failure() {
        let link = Link::new(false);
        let clock = MockClock::default();
        let mut driver = MockGimbal::new(&link);
        driver.rejections = u8::MAX;
        let mut actuator = GimbalActuator::new(&link, driver, &clock);

        let outcome = block_on(actuator.execute(GimbalRequest::Reset));

        assert_eq!(
            outcome,
            Some(GimbalOutcome::Aborted(GimbalFault::ResetFailed))
        );
    }

    #[test]
    fn stop_during_settle_reports_stopped() {
        let link = Link::new(false);
        let clock = MockClock::default();
        let mut driver = MockGimbal::new(&link);
        driver.stuck = true;
        driver.stop_on_first_call = true;
        let mut actuator = GimbalActuator::new(&link, driver, &clock);

        let outcome = block_on(actuator.execute(GimbalRequest::pitch(-60.0)));

        assert_eq!(outcome, Some(GimbalOutcome::Stopped));
        assert_eq!(actuator.driver().calls().len(), 1);
    }

    #[test]
    fn error_status_exits_silently() {
        let link = Link::new(false);
        let clock = MockClock::default();
        let mut actuator = GimbalActuator::new(&link, MockGimbal::new(&link), &clock);
        link.status.set(ControllerStatus::Error);

        let outcome = block_on(actuator.execute(GimbalRequest::pitch(-10.0)));

        assert_eq!(outcome, None);
        assert!(actuator.driver().calls().is_empty());
    }

    #[test]
    fn relative_yaw_is_transformed_on_command_and_verify() {
        let link = Link::new(true);
        link.set_aircraft_heading(90.0);
        let clock = MockClock::default();
        let mut actuator = GimbalActuator::new(&link, MockGimbal::new(&link), &clock);

        let outcome = block_on(actuator.execute(GimbalRequest::yaw(120.0)));

        assert_eq!(outcome, Some(GimbalOutcome::Completed));
        assert_eq!(
            actuator.driver().calls(),
            vec![Call::Rotate(Attitude::new(0.0, 30.0, 0.0))]
        );
        assert_eq!(link.to_absolute(link.observed()).yaw, 120.0);
    }

    #[test]
    fn command_round_trips_through_task() {
        let link = Link::new(false);
        let clock = MockClock::default();
        let mut actuator = GimbalActuator::new(&link, MockGimbal::new(&link), &clock);

        let outcome = block_on(async {
            match select(
                async {
                    let first = link.command(GimbalRequest::pitch(-45.0)).await;
                    let second = link.command(GimbalRequest::Reset).await;
                    (first, second)
                },
                actuator.run(),
            )
            .await
            {
                Either::First(outcomes) => outcomes,
                Either::Second(()) => unreachable!("gimbal task never returns"),
            }
        });

        assert_eq!(outcome, (GimbalOutcome::Completed, GimbalOutcome::Completed));
        assert!(!link.is_busy());
        assert_eq!(link.observed(), Attitude::ZERO);
    }
}
