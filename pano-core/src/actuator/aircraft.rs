//! Aircraft yaw control for models whose gimbal cannot yaw on its own.
//!
//! The flight controller has no "turn to heading" command, so the actuator
//! closes the loop itself: every sampling tick it commands a yaw velocity
//! proportional to the remaining angular distance until the heading is close
//! enough or the time cap runs out.

use core::fmt;
use core::future::Future;
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;

use super::{ControllerStatus, Interruption, interruption};
use crate::angles::{shortest_angular_distance, wrap_heading};
use crate::clock::Clock;
use crate::sync::{SharedCell, SyncBarrier};

/// Interval between velocity updates.
pub const YAW_SAMPLE_PERIOD: Duration = Duration::from_millis(100);
/// Time after which an unfinished yaw gives up.
pub const YAW_TIME_CAP: Duration = Duration::from_secs(5);
/// Velocity (deg/s) per degree of remaining distance.
pub const YAW_GAIN: f32 = 0.5;
/// Velocity limit in either direction, deg/s.
pub const YAW_MAX_SPEED: f32 = 30.0;
/// Commanded velocity below which the turn counts as done.
pub const YAW_DONE_SPEED: f32 = 0.5;

/// Result of one aircraft yaw.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum YawOutcome {
    Completed,
    /// The time cap elapsed first. The run carries on from wherever it stopped.
    TimedOut,
    Aborted(YawFault),
    Stopped,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum YawFault {
    DriverRejected,
}

impl YawFault {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            YawFault::DriverRejected => "Unable to yaw",
        }
    }
}

impl fmt::Display for YawFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Hardware seam for virtual-stick yaw.
pub trait FlightDriver {
    type Error;

    /// Commands a yaw rate in degrees per second; positive turns clockwise.
    fn send_yaw_velocity(&mut self, speed: f32) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Velocity for the remaining `distance`, clamped to the speed limit.
#[must_use]
pub fn yaw_velocity(distance: f32) -> f32 {
    (distance * YAW_GAIN).clamp(-YAW_MAX_SPEED, YAW_MAX_SPEED)
}

/// Flight controller state shared with the sequencer.
pub struct FlightLink<M>
where
    M: RawMutex,
{
    status: SharedCell<M, ControllerStatus>,
    heading: SharedCell<M, f32>,
    requests: Channel<M, f32, 1>,
    outcome: SyncBarrier<M, YawOutcome>,
}

impl<M> FlightLink<M>
where
    M: RawMutex,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: SharedCell::new(ControllerStatus::Normal),
            heading: SharedCell::new(0.0),
            requests: Channel::new(),
            outcome: SyncBarrier::new("aircraft"),
        }
    }

    /// Current controller status.
    pub fn status(&self) -> ControllerStatus {
        self.status.get()
    }

    /// Last reported compass heading, `0..360`.
    pub fn heading(&self) -> f32 {
        self.heading.get()
    }

    /// Hardware callback for a compass update; accepts `-180..180` or `0..360`.
    pub fn on_heading_changed(&self, heading: f32) {
        self.heading.set(wrap_heading(heading));
    }

    /// Flags the turn in progress (if any) to stop at its next sample.
    pub fn request_stop(&self) {
        self.status.update(ControllerStatus::stop_requested);
    }

    /// Returns `true` while a turn is outstanding.
    pub fn is_busy(&self) -> bool {
        self.outcome.is_active()
    }

    /// Sequencer side: yaws the aircraft to the compass `heading`.
    pub async fn yaw_to(&self, heading: f32) -> YawOutcome {
        self.status.set(ControllerStatus::Normal);
        self.outcome.arm();
        self.requests.send(wrap_heading(heading)).await;
        self.outcome.wait().await
    }
}

impl<M> Default for FlightLink<M>
where
    M: RawMutex,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Aircraft yaw task state.
pub struct AircraftYawActuator<'a, M, D, C>
where
    M: RawMutex,
{
    link: &'a FlightLink<M>,
    driver: D,
    clock: &'a C,
}

impl<'a, M, D, C> AircraftYawActuator<'a, M, D, C>
where
    M: RawMutex,
    D: FlightDriver,
    C: Clock,
{
    pub const fn new(link: &'a FlightLink<M>, driver: D, clock: &'a C) -> Self {
        Self {
            link,
            driver,
            clock,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub async fn run(&mut self) {
        loop {
            let target = self.link.requests.receive().await;
            if let Some(outcome) = self.execute(target).await {
                self.link.outcome.release(outcome);
            }
        }
    }

    /// Turns to `target` (compass degrees). `None` when a fault ended the turn.
    pub async fn execute(&mut self, target: f32) -> Option<YawOutcome> {
        log_info!("aircraft yaw to {}", target);
        let started = self.clock.now();
        let mut speed = YAW_MAX_SPEED;

        loop {
            match interruption(self.link.status()) {
                Some(Interruption::Stopped) => {
                    self.halt().await;
                    return Some(YawOutcome::Stopped);
                }
                Some(Interruption::Silent) => {
                    self.halt().await;
                    return None;
                }
                None => {}
            }

            if (-YAW_DONE_SPEED..=YAW_DONE_SPEED).contains(&speed) {
                self.halt().await;
                log_debug!("aircraft yaw done at {}", self.link.heading());
                return Some(YawOutcome::Completed);
            }
            if self.clock.elapsed_since(started) >= YAW_TIME_CAP {
                self.halt().await;
                log_warn!("Yaw did not complete, heading {}", self.link.heading());
                return Some(YawOutcome::TimedOut);
            }

            let distance = shortest_angular_distance(self.link.heading(), target);
            speed = yaw_velocity(distance);
            if self.driver.send_yaw_velocity(speed).await.is_err() {
                log_warn!("aircraft rejected yaw velocity {}", speed);
                return Some(YawOutcome::Aborted(YawFault::DriverRejected));
            }
            self.clock.sleep(YAW_SAMPLE_PERIOD).await;
        }
    }

    async fn halt(&mut self) {
        if self.driver.send_yaw_velocity(0.0).await.is_err() {
            log_warn!("aircraft rejected yaw halt");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::mock::MockClock;
    use core::cell::RefCell;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    type Link = FlightLink<NoopRawMutex>;

    /// Integrates commanded velocity over one sampling period per call.
    struct MockAircraft<'a> {
        link: &'a Link,
        commands: RefCell<Vec<f32>>,
        frozen: bool,
        reject: bool,
    }

    impl<'a> MockAircraft<'a> {
        fn new(link: &'a Link) -> Self {
            Self {
                link,
                commands: RefCell::new(Vec::new()),
                frozen: false,
                reject: false,
            }
        }
    }

    impl FlightDriver for MockAircraft<'_> {
        type Error = ();

        async fn send_yaw_velocity(&mut self, speed: f32) -> Result<(), ()> {
            self.commands.borrow_mut().push(speed);
            if self.reject {
                return Err(());
            }
            if !self.frozen {
                let step = speed * YAW_SAMPLE_PERIOD.as_secs_f32() * 10.0;
                self.link.on_heading_changed(self.link.heading() + step);
            }
            Ok(())
        }
    }

    #[test]
    fn velocity_is_proportional_and_clamped() {
        assert!((yaw_velocity(10.0) - 5.0).abs() < f32::EPSILON);
        assert!((yaw_velocity(-170.0) + YAW_MAX_SPEED).abs() < f32::EPSILON);
        assert!((yaw_velocity(90.0) - YAW_MAX_SPEED).abs() < f32::EPSILON);
    }

    #[test]
    fn converges_on_target_heading() {
        let link = Link::new();
        link.on_heading_changed(350.0);
        let clock = MockClock::default();
        let mut actuator = AircraftYawActuator::new(&link, MockAircraft::new(&link), &clock);

        let outcome = block_on(actuator.execute(30.0));

        assert_eq!(outcome, Some(YawOutcome::Completed));
        let offset = shortest_angular_distance(link.heading(), 30.0);
        assert!((-1.0..=1.0).contains(&offset), "heading {}", link.heading());
        assert_eq!(actuator.driver().commands.borrow().last(), Some(&0.0));
    }

    #[test]
    fn frozen_aircraft_times_out_without_aborting() {
        let link = Link::new();
        let clock = MockClock::default();
        let mut driver = MockAircraft::new(&link);
        driver.frozen = true;
        let mut actuator = AircraftYawActuator::new(&link, driver, &clock);

        let outcome = block_on(actuator.execute(90.0));

        assert_eq!(outcome, Some(YawOutcome::TimedOut));
        assert_eq!(clock.elapsed(), YAW_TIME_CAP);
    }

    #[test]
    fn rejected_velocity_aborts() {
        let link = Link::new();
        let clock = MockClock::default();
        let mut driver = MockAircraft::new(&link);
        driver.reject = true;
        let mut actuator = AircraftYawActuator::new(&link, driver, &clock);

        let outcome = block_on(actuator.execute(90.0));

        assert_eq!(outcome, Some(YawOutcome::Aborted(YawFault::DriverRejected)));
        assert_eq!(YawFault::DriverRejected.message(), "Unable to yaw");
    }

    #[test]
    fn stop_request_halts_the_turn() {
        let link = Link::new();
        let clock = MockClock::default();
        let mut actuator = AircraftYawActuator::new(&link, MockAircraft::new(&link), &clock);
        link.request_stop();

        let outcome = block_on(actuator.execute(90.0));

        assert_eq!(outcome, Some(YawOutcome::Stopped));
        assert_eq!(*actuator.driver().commands.borrow(), vec![0.0]);
    }

    #[test]
    fn headings_are_stored_as_compass_values() {
        let link = Link::new();
        link.on_heading_changed(-90.0);
        assert!((link.heading() - 270.0).abs() < f32::EPSILON);
    }
}
