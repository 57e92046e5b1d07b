mod support;

use pano_core::actuator::Axis;
use pano_core::actuator::camera::HealthFault;
use pano_core::angles::shortest_angular_distance;
use pano_core::events::PanoEvent;
use pano_core::plan::YawMode;
use pano_core::sequencer::{
    AbortReason, PanoRunning, PreflightError, Progress, RunOutcome, SequencerState,
};
use pano_core::settings::{AircraftModel, FlightMode, ModelSettings, Setting};

use support::{GimbalCall, Log, Rig, Script, events, texts};

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-3, "{actual:?} vs {expected:?}");
    }
}

#[test]
fn handheld_run_captures_every_planned_image() {
    let rig = Rig::new(AircraftModel::Osmo);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);

    let report = rig
        .run(&sequencer, &ModelSettings::default(), Script::default())
        .expect("preflight passes");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.yaw_mode, YawMode::Gimbal);
    assert_eq!(report.planned, 19);

    let names: Vec<&str> = report.session.images().iter().map(|n| n.as_str()).collect();
    assert_eq!(names.len(), 19);
    assert_eq!(names[0], "DJI_0001.JPG");
    assert_eq!(names[18], "DJI_0019.JPG");
    assert!(report.session.is_finished());

    assert_eq!(texts(&log), ["Panorama starting", "Panorama complete"]);
    assert_eq!(sequencer.running(), PanoRunning::IDLE);
    assert_eq!(sequencer.state(), SequencerState::Idle);
    assert_eq!(
        sequencer.progress(),
        Progress {
            count: 19,
            total: 19
        }
    );

    // Handheld rows sweep upwards, then the gimbal yaws to the next column.
    assert_close(&rig.pitches()[..3], &[-60.0, -30.0, 0.0]);
    assert_eq!(rig.gimbal_calls.borrow().first(), Some(&GimbalCall::Reset));
    assert_eq!(rig.gimbal_calls.borrow().last(), Some(&GimbalCall::Reset));
    // The operator gets the start delay before the first command.
    assert!(rig.clock.elapsed().as_secs() >= 5);
}

#[test]
fn aircraft_run_turns_the_airframe_between_columns() {
    let rig = Rig::new(AircraftModel::Phantom3Professional);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    sequencer.on_aircraft_heading(30.0);

    let report = rig
        .run(&sequencer, &ModelSettings::default(), Script::default())
        .expect("preflight passes");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.yaw_mode, YawMode::Aircraft);
    assert_eq!(report.session.images().len(), 19);
    assert!(rig.yaw_commands.get() > 6);

    // Aircraft rows sweep downwards; the last column turn comes back home.
    assert_close(&rig.pitches()[..3], &[0.0, -30.0, -60.0]);
    let offset = shortest_angular_distance(rig.flight.heading(), 30.0);
    assert!((-1.0..=1.0).contains(&offset), "heading {}", rig.flight.heading());
}

#[test]
fn relative_gimbal_follows_the_airframe() {
    let rig = Rig::new(AircraftModel::Phantom4);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    sequencer.on_aircraft_heading(90.0);

    let report = rig
        .run(&sequencer, &ModelSettings::default(), Script::default())
        .expect("Phantom 4 needs no switch check");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.session.images().len(), 19);
    for call in rig.gimbal_calls.borrow().iter() {
        if let GimbalCall::Rotate(attitude) = call {
            assert!(
                (-1.0..=1.0).contains(&attitude.yaw),
                "gimbal yaw drifted from the nose: {attitude:?}"
            );
        }
    }
}

#[test]
fn stop_ends_run_cleanly_without_new_rows() {
    let rig = Rig::new(AircraftModel::Osmo);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    let script = Script {
        stop_after: Some(4),
        ..Script::default()
    };

    let report = rig
        .run(&sequencer, &ModelSettings::default(), script)
        .expect("preflight passes");

    assert_eq!(report.outcome, RunOutcome::Stopped);
    assert_eq!(sequencer.running(), PanoRunning::IDLE);
    assert_eq!(rig.shots.get(), 4);
    assert_eq!(report.session.images().len(), 4);

    let messages = texts(&log);
    assert!(messages.contains(&"Panorama stopping. Please wait ...".to_owned()));
    assert!(!messages.contains(&"Panorama complete".to_owned()));
    assert!(events(&log).contains(&PanoEvent::PanoStopping));
    // Still parks the gimbal.
    assert_eq!(rig.gimbal_calls.borrow().last(), Some(&GimbalCall::Reset));
}

#[test]
fn card_fault_aborts_with_a_single_message() {
    let rig = Rig::new(AircraftModel::Osmo);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    let script = Script {
        card_full_at: Some(3),
        ..Script::default()
    };

    let report = rig
        .run(&sequencer, &ModelSettings::default(), script)
        .expect("preflight passes");

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(AbortReason::Health(HealthFault::SdCardFull))
    );
    assert_eq!(
        sequencer.running(),
        PanoRunning {
            state: false,
            ok: false
        }
    );
    assert_eq!(report.session.images().len(), 2);
    assert_eq!(texts(&log), ["Panorama starting", "SD Card full"]);
    assert!(events(&log).contains(&PanoEvent::PanoAvailable(false)));
    assert_eq!(rig.gimbal_calls.borrow().last(), Some(&GimbalCall::Reset));
}

#[test]
fn image_written_after_stop_is_kept() {
    let rig = Rig::new(AircraftModel::Osmo);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    let script = Script {
        stop_during: Some(4),
        ..Script::default()
    };

    let report = rig
        .run(&sequencer, &ModelSettings::default(), script)
        .expect("preflight passes");

    assert_eq!(report.outcome, RunOutcome::Stopped);
    assert_eq!(rig.shots.get(), 4);
    assert_eq!(report.session.images().len(), 4);
    assert_eq!(report.session.images()[3], "DJI_0004.JPG");
    assert_eq!(sequencer.progress(), Progress { count: 4, total: 19 });
}

#[test]
fn card_fault_after_stop_is_reported_once() {
    let rig = Rig::new(AircraftModel::Osmo);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    let script = Script {
        stop_then_card_full_at: Some(2),
        ..Script::default()
    };

    let report = rig
        .run(&sequencer, &ModelSettings::default(), script)
        .expect("preflight passes");

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(AbortReason::Health(HealthFault::SdCardFull))
    );
    assert_eq!(
        texts(&log),
        [
            "Panorama starting",
            "Panorama stopping. Please wait ...",
            "SD Card full"
        ]
    );
    assert_eq!(
        sequencer.running(),
        PanoRunning {
            state: false,
            ok: false
        }
    );
    assert_eq!(rig.gimbal_calls.borrow().last(), Some(&GimbalCall::Reset));
}

#[test]
fn card_fault_that_clears_still_aborts_the_run() {
    let rig = Rig::new(AircraftModel::Osmo);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    let script = Script {
        card_blip_at: Some(2),
        ..Script::default()
    };

    let report = rig
        .run(&sequencer, &ModelSettings::default(), script)
        .expect("preflight passes");

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(AbortReason::Health(HealthFault::SdCardFull))
    );
    assert_eq!(
        sequencer.running(),
        PanoRunning {
            state: false,
            ok: false
        }
    );
    // No shutter after the fault ended the run.
    assert_eq!(rig.shots.get(), 2);
    assert_eq!(report.session.images().len(), 1);
    assert_eq!(
        texts(&log),
        ["Panorama starting", "SD Card full", "Camera is ready"]
    );
}

#[test]
fn broken_camera_aborts_the_next_run_immediately() {
    let rig = Rig::new(AircraftModel::Osmo);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    let script = Script {
        card_full_at: Some(1),
        ..Script::default()
    };
    rig.run(&sequencer, &ModelSettings::default(), script)
        .expect("preflight passes");

    let report = rig
        .run(&sequencer, &ModelSettings::default(), Script::default())
        .expect("capacity is unknown, so preflight passes");

    assert_eq!(
        report.outcome,
        RunOutcome::Aborted(AbortReason::Health(HealthFault::SdCardFull))
    );
    assert_eq!(rig.shots.get(), 1);
    let full = texts(&log)
        .iter()
        .filter(|text| text.as_str() == "SD Card full")
        .count();
    assert_eq!(full, 2, "one per run");
}

#[test]
fn out_of_range_row_aborts_before_any_shot() {
    let rig = Rig::new(AircraftModel::Phantom3Professional);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    let mut settings = ModelSettings::default();
    settings.apply(Setting::MaxPitch(45));

    let report = rig
        .run(&sequencer, &settings, Script::default())
        .expect("preflight passes");

    match report.outcome {
        RunOutcome::Aborted(AbortReason::OutOfRange(rejected)) => {
            assert_eq!(rejected.axis, Axis::Pitch);
        }
        other => panic!("expected out of range, got {other:?}"),
    }
    assert_eq!(rig.shots.get(), 0);
    assert_eq!(
        texts(&log),
        ["Panorama starting", "Pitch 45 was out of range"]
    );
    assert!(!sequencer.running().ok);
}

#[test]
fn wrong_switch_position_blocks_body_yaw_models() {
    let rig = Rig::new(AircraftModel::Phantom3Professional);
    let log = Log::new(&rig.clock);
    let sequencer = rig.sequencer(&log);
    sequencer.on_remote_flight_mode(FlightMode::P);

    let result = rig.run(&sequencer, &ModelSettings::default(), Script::default());

    assert_eq!(
        result.err(),
        Some(PreflightError::FlightMode {
            required: FlightMode::F
        })
    );
    assert_eq!(texts(&log), ["Please set RC Flight Mode to F first"]);
    assert!(rig.gimbal_calls.borrow().is_empty());
    assert_eq!(sequencer.state(), SequencerState::Idle);
}
