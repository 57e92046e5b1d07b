use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant as HostInstant};

use pano_core::actuator::camera::SdCardState;
use pano_core::sequencer::{RunOutcome, RunReport};
use pano_core::settings::{AircraftModel, FlightMode, ModelSettings};

use crate::sim::{ConsoleSink, Environment, Hardware, Script, SimInstant};

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("run", "run                              - capture one panorama"),
    (
        "status",
        "status                           - show product, settings and faults",
    ),
    (
        "model",
        "model <name>                     - switch the connected product",
    ),
    (
        "set",
        "set <key> = <value>              - change one capture setting",
    ),
    (
        "load",
        "load <path>                      - replace settings from a profile",
    ),
    (
        "heading",
        "heading <degrees>                - move the aircraft nose",
    ),
    (
        "rc",
        "rc <F|A|P|S>                     - set the flight mode switch",
    ),
    (
        "card",
        "card <captures|full|missing|ok>  - report a card condition",
    ),
    (
        "fault",
        "fault <kind> [shot] | fault clear - script a fault for the next run",
    ),
    (
        "telemetry",
        "telemetry <on|off>               - echo attitude and heading updates",
    ),
    ("help", "help [topic]                     - show help for a command"),
];

/// How a response line is presented on the console.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tone {
    Plain,
    Message,
    Warning,
    Status,
    Telemetry,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    pub tone: Tone,
    pub text: String,
}

impl Response {
    pub fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }

    fn plain(text: impl Into<String>) -> Self {
        Self::new(Tone::Plain, text)
    }

    fn error(text: impl Into<String>) -> Self {
        Self::new(Tone::Error, format!("ERR {}", text.into()))
    }
}

/// Startup options gathered from the command line.
#[derive(Clone, Debug)]
pub struct Options {
    pub model: AircraftModel,
    pub settings: Option<PathBuf>,
    pub transcript: Option<PathBuf>,
    pub script: Script,
    pub telemetry: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            model: AircraftModel::Phantom3Professional,
            settings: None,
            transcript: None,
            script: Script::default(),
            telemetry: false,
        }
    }
}

pub struct Session {
    model: AircraftModel,
    settings: ModelSettings,
    script: Script,
    rc_mode: FlightMode,
    telemetry: bool,
    hardware: Hardware,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
    runs: usize,
}

impl Session {
    pub fn new(options: Options) -> io::Result<Self> {
        let settings = match &options.settings {
            Some(path) => load_profile(path, options.model)?,
            None => ModelSettings::default(),
        };
        let transcript = options
            .transcript
            .as_deref()
            .map(TranscriptLogger::new)
            .transpose()?;

        Ok(Self {
            model: options.model,
            settings,
            script: options.script,
            rc_mode: FlightMode::F,
            telemetry: options.telemetry,
            hardware: Hardware::new(options.model),
            transcript,
            started_at: HostInstant::now(),
            runs: 0,
        })
    }

    pub fn model(&self) -> AircraftModel {
        self.model
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<Response>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(elapsed, TranscriptRole::Host, trimmed)?;
        }

        let (command, rest) = trimmed
            .split_once(char::is_whitespace)
            .map_or((trimmed, ""), |(command, rest)| (command, rest.trim()));
        let responses = match command.to_ascii_lowercase().as_str() {
            "help" => Self::help((!rest.is_empty()).then_some(rest)),
            "run" => self.run(),
            "status" => self.status(),
            "model" => self.switch_model(rest),
            "set" => self.set(rest),
            "load" => self.load(rest),
            "heading" => self.heading(rest),
            "rc" => self.rc(rest),
            "card" => self.card(rest),
            "fault" => self.fault(rest),
            "telemetry" => self.set_telemetry(rest),
            _ => vec![
                Response::error(format!("unknown command `{command}`")),
                Response::plain(format!("Available commands: {}", help_topic_list())),
            ],
        };

        self.record_output(elapsed, &responses)?;
        Ok(responses)
    }

    fn help(topic: Option<&str>) -> Vec<Response> {
        let mut lines = Vec::new();
        match topic {
            Some(target) => {
                if let Some((_, detail)) = HELP_TOPICS
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(target))
                {
                    lines.push(Response::plain(*detail));
                } else {
                    lines.push(Response::plain(format!("No help available for `{target}`.")));
                    lines.push(Response::plain(format!(
                        "Available topics: {}",
                        help_topic_list()
                    )));
                }
            }
            None => {
                lines.push(Response::plain("Available commands:"));
                for (_, detail) in HELP_TOPICS {
                    lines.push(Response::plain(format!("  {detail}")));
                }
                lines.push(Response::plain("Type `help <topic>` for a specific command."));
            }
        }
        lines
    }

    fn environment(&self) -> Environment {
        Environment {
            model: self.model,
            rc_mode: self.rc_mode,
        }
    }

    fn run(&mut self) -> Vec<Response> {
        self.runs += 1;
        let sink = ConsoleSink::new(&self.hardware.clock, self.telemetry);
        let hub = self.hardware.hub(self.environment(), &sink);
        let started = self.hardware.clock.elapsed();
        let result = self.hardware.run(&hub, &self.settings, self.script);

        let mut lines = sink.take();
        match result {
            Ok(report) => lines.push(summarize(&report, self.hardware.clock.elapsed() - started)),
            Err(error) => lines.push(Response::error(format!("preflight {error}"))),
        }
        // Scripted faults apply to a single run.
        self.script = Script::default();
        lines
    }

    fn status(&self) -> Vec<Response> {
        let settings = &self.settings;
        let camera = &self.hardware.camera;
        let yaw = if settings.uses_gimbal_yaw(self.model.product_type(), self.model) {
            "gimbal"
        } else {
            "aircraft"
        };
        let fault = camera
            .active_fault()
            .map_or("none", |fault| fault.message());
        vec![
            Response::plain(format!(
                "product {} ({}) yaw={yaw} rc={}",
                self.model,
                self.model.product_type().as_str(),
                self.rc_mode.as_str()
            )),
            Response::plain(format!(
                "rows={} photos_per_row={} nadir_count={} max_pitch={}{} delay={}s photo_delay={}s images={}",
                settings.row_count,
                settings.photos_per_row,
                settings.nadir_count,
                settings.max_pitch,
                if settings.max_pitch_enabled { "" } else { " (disabled)" },
                settings.start_delay_secs,
                settings.photo_delay_secs,
                settings.image_count()
            )),
            Response::plain(format!(
                "camera {} fault={fault} card={} heading={:.1}",
                camera.status().as_str(),
                self.hardware.card_captures(),
                self.hardware.flight.heading()
            )),
            Response::plain(format!(
                "script {} runs={}",
                self.script.describe(),
                self.runs
            )),
        ]
    }

    fn switch_model(&mut self, name: &str) -> Vec<Response> {
        if name.is_empty() {
            return vec![Response::error("expected a model name")];
        }
        let model = AircraftModel::from_name(name);
        if model == AircraftModel::Other {
            return vec![Response::error(format!("unknown model `{name}`"))];
        }
        self.model = model;
        vec![Response::plain(format!(
            "connected {model} ({})",
            model.product_type().as_str()
        ))]
    }

    fn set(&mut self, assignment: &str) -> Vec<Response> {
        match self.settings.merge_profile(assignment, self.model) {
            Ok(()) => vec![Response::plain(format!(
                "ok, {} images per run",
                self.settings.image_count()
            ))],
            Err(error) => vec![Response::error(format!("settings {error}"))],
        }
    }

    fn load(&mut self, path: &str) -> Vec<Response> {
        if path.is_empty() {
            return vec![Response::error("expected a profile path")];
        }
        match load_profile(Path::new(path), self.model) {
            Ok(settings) => {
                self.settings = settings;
                vec![Response::plain(format!(
                    "loaded {path}, {} images per run",
                    settings.image_count()
                ))]
            }
            Err(error) => vec![Response::error(error.to_string())],
        }
    }

    fn heading(&self, value: &str) -> Vec<Response> {
        let Ok(heading) = value.parse::<f32>() else {
            return vec![Response::error(format!("invalid heading `{value}`"))];
        };
        let sink = ConsoleSink::new(&self.hardware.clock, true);
        let hub = self.hardware.hub(self.environment(), &sink);
        hub.on_aircraft_heading(heading);
        sink.take()
    }

    fn rc(&mut self, value: &str) -> Vec<Response> {
        let mode = match value.to_ascii_uppercase().as_str() {
            "F" => FlightMode::F,
            "A" => FlightMode::A,
            "P" => FlightMode::P,
            "S" => FlightMode::S,
            _ => return vec![Response::error(format!("unknown flight mode `{value}`"))],
        };
        self.rc_mode = mode;
        vec![Response::plain(format!("rc mode {}", mode.as_str()))]
    }

    fn card(&self, value: &str) -> Vec<Response> {
        let captures = self.hardware.card_captures();
        let state = match value.to_ascii_lowercase().as_str() {
            "ok" => SdCardState::ready(captures),
            "full" => {
                self.hardware.set_card_captures(0);
                SdCardState {
                    full: true,
                    ..SdCardState::ready(0)
                }
            }
            "missing" => SdCardState {
                inserted: false,
                ..SdCardState::ready(0)
            },
            other => match other.parse::<u32>() {
                Ok(captures) => {
                    self.hardware.set_card_captures(captures);
                    SdCardState::ready(captures)
                }
                Err(_) => return vec![Response::error(format!("unknown card state `{value}`"))],
            },
        };

        let sink = ConsoleSink::new(&self.hardware.clock, false);
        let hub = self.hardware.hub(self.environment(), &sink);
        hub.on_sd_card_state(state);
        let mut lines = sink.take();
        if lines.is_empty() {
            lines.push(Response::plain(format!(
                "card {} captures",
                self.hardware.card_captures()
            )));
        }
        lines
    }

    fn fault(&mut self, args: &str) -> Vec<Response> {
        let mut words = args.split_whitespace();
        let kind = words.next().unwrap_or_default().to_ascii_lowercase();
        let shot = words.next().map(str::parse::<u16>);

        let shot = match (kind.as_str(), shot) {
            ("clear", None) => {
                self.script = Script::default();
                return vec![Response::plain("script cleared")];
            }
            ("gimbal-stuck", None) => {
                self.script.gimbal_stuck = true;
                return vec![Response::plain(format!("script {}", self.script.describe()))];
            }
            (_, Some(Ok(shot))) if shot > 0 => shot,
            _ => {
                return vec![Response::error(
                    "expected `fault <stop-after|sd-fault-after|overheat-after> <shot>`, `fault gimbal-stuck` or `fault clear`",
                )];
            }
        };

        match kind.as_str() {
            "stop-after" => self.script.stop_after = Some(shot),
            "sd-fault-after" => self.script.sd_fault_after = Some(shot),
            "overheat-after" => self.script.overheat_after = Some(shot),
            _ => return vec![Response::error(format!("unknown fault `{kind}`"))],
        }
        vec![Response::plain(format!("script {}", self.script.describe()))]
    }

    fn set_telemetry(&mut self, value: &str) -> Vec<Response> {
        match value.to_ascii_lowercase().as_str() {
            "on" => self.telemetry = true,
            "off" => self.telemetry = false,
            _ => return vec![Response::error("expected `telemetry on` or `telemetry off`")],
        }
        vec![Response::plain(format!("telemetry {value}"))]
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[Response]) -> io::Result<()> {
        let Some(transcript) = self.transcript.as_mut() else {
            return Ok(());
        };
        for line in lines {
            transcript.append_line(elapsed, TranscriptRole::Emulator, &line.text)?;
        }
        Ok(())
    }
}

fn load_profile(path: &Path, model: AircraftModel) -> io::Result<ModelSettings> {
    let text = fs::read_to_string(path)?;
    ModelSettings::from_profile(&text, model).map_err(|error| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {error}", path.display()),
        )
    })
}

fn summarize(report: &RunReport<SimInstant>, took: Duration) -> Response {
    let (tone, label) = match report.outcome {
        RunOutcome::Completed => (Tone::Status, "completed".to_string()),
        RunOutcome::Stopped => (Tone::Warning, "stopped".to_string()),
        RunOutcome::Aborted(reason) => (Tone::Error, format!("aborted ({reason})")),
    };
    Response::new(
        tone,
        format!(
            "run {label}: {}/{} images, {} yaw, {} simulated",
            report.session.image_count(),
            report.planned,
            report.yaw_mode.as_str(),
            format_duration_short(took)
        ),
    )
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# Panorama emulator transcript")?;
        writeln!(
            logger.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(model: AircraftModel) -> Session {
        Session::new(Options {
            model,
            ..Options::default()
        })
        .expect("no files involved")
    }

    fn texts(responses: &[Response]) -> Vec<&str> {
        responses.iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn run_reports_summary_line() {
        let mut session = session(AircraftModel::Osmo);
        let lines = session.handle_command("run").unwrap();
        let summary = lines.last().unwrap();
        assert_eq!(summary.tone, Tone::Status);
        assert!(
            summary
                .text
                .starts_with("run completed: 19/19 images, gimbal yaw"),
            "{}",
            summary.text
        );
    }

    #[test]
    fn scripted_stop_applies_to_one_run() {
        let mut session = session(AircraftModel::Osmo);
        session.handle_command("fault stop-after 2").unwrap();

        let first = session.handle_command("run").unwrap();
        assert!(first.last().unwrap().text.starts_with("run stopped: 2/19"));

        let second = session.handle_command("run").unwrap();
        assert!(second.last().unwrap().text.starts_with("run completed"));
    }

    #[test]
    fn switch_position_is_checked_for_body_yaw() {
        let mut session = session(AircraftModel::Phantom3Professional);
        session.handle_command("rc P").unwrap();
        let lines = session.handle_command("run").unwrap();
        assert_eq!(
            texts(&lines).last().copied(),
            Some("ERR preflight Please set RC Flight Mode to F first")
        );
    }

    #[test]
    fn set_changes_planned_image_count() {
        let mut session = session(AircraftModel::Osmo);
        let lines = session.handle_command("set photos_per_row = 8").unwrap();
        assert_eq!(texts(&lines), ["ok, 25 images per run"]);

        let lines = session.handle_command("set row_count = 99").unwrap();
        assert_eq!(lines[0].tone, Tone::Error);
    }

    #[test]
    fn card_fault_and_recovery_echo_messages() {
        let mut session = session(AircraftModel::Osmo);
        let lines = session.handle_command("card missing").unwrap();
        assert!(lines[0].text.ends_with("SD Card missing"));

        let lines = session.handle_command("card ok").unwrap();
        assert!(lines[0].text.ends_with("Camera is ready"));
    }

    #[test]
    fn unknown_commands_list_topics() {
        let mut session = session(AircraftModel::Osmo);
        let lines = session.handle_command("launch").unwrap();
        assert_eq!(lines[0].text, "ERR unknown command `launch`");
        assert!(lines[1].text.contains("run, status, model"));
    }

    #[test]
    fn model_switch_rejects_unknown_names() {
        let mut session = session(AircraftModel::Osmo);
        assert_eq!(
            texts(&session.handle_command("model phantom 4").unwrap()),
            ["connected Phantom 4 (aircraft)"]
        );
        assert_eq!(session.model(), AircraftModel::Phantom4);
        assert_eq!(
            session.handle_command("model matrice").unwrap()[0].tone,
            Tone::Error
        );
    }
}
