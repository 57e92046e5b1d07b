mod session;
mod sim;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use crossterm::style::Stylize;
use pano_core::settings::AircraftModel;

use session::{Options, Response, Session, Tone};

const USAGE: &str = "Usage: pano-emulator [--model <name>] [--settings <path>] \
[--transcript <path>] [--telemetry] [--stop-after <shot>] [--sd-fault-after <shot>] \
[--overheat-after <shot>] [--gimbal-stuck]";

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Panorama emulator ready with {}. Type `help` for commands or `exit` to quit.",
        session.model()
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            print_response(&mut writer, &response)?;
        }
    }

    Ok(())
}

fn print_response(writer: &mut impl Write, response: &Response) -> io::Result<()> {
    let text = response.text.as_str();
    match response.tone {
        Tone::Plain => writeln!(writer, "{text}"),
        Tone::Message => writeln!(writer, "{}", text.cyan()),
        Tone::Warning => writeln!(writer, "{}", text.yellow()),
        Tone::Status => writeln!(writer, "{}", text.green()),
        Tone::Telemetry => writeln!(writer, "{}", text.dark_grey()),
        Tone::Error => writeln!(writer, "{}", text.red().bold()),
    }
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--model" => {
                let name = value()?;
                options.model = AircraftModel::from_name(&name);
                if options.model == AircraftModel::Other {
                    return Err(format!("Unknown model `{name}`"));
                }
            }
            "--settings" => options.settings = Some(PathBuf::from(value()?)),
            "--transcript" => options.transcript = Some(PathBuf::from(value()?)),
            "--stop-after" => options.script.stop_after = Some(parse_shot(&value()?)?),
            "--sd-fault-after" => options.script.sd_fault_after = Some(parse_shot(&value()?)?),
            "--overheat-after" => options.script.overheat_after = Some(parse_shot(&value()?)?),
            "--telemetry" => options.telemetry = true,
            "--gimbal-stuck" => options.script.gimbal_stuck = true,
            _ => return Err(format!("Unknown argument `{flag}`")),
        }
    }

    Ok(options)
}

fn parse_shot(value: &str) -> Result<u16, String> {
    match value.parse::<u16>() {
        Ok(shot) if shot > 0 => Ok(shot),
        _ => Err(format!("Expected a shot number, got `{value}`")),
    }
}
