//! Settings profile reader.
//!
//! ```text
//! # shared by every model
//! photos_per_row = 8
//!
//! [Inspire 1]
//! ac_gimbal_yaw = true   # yaw with the gimbal
//! ```
//!
//! Assignments before the first section apply to every model; assignments in
//! a `[model]` section apply only when the section names the active model.
//! Later assignments win.

use winnow::ascii::{dec_int, dec_uint, space0};
use winnow::combinator::{alt, delimited, opt};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{rest, take_till, take_while};

use super::{AircraftModel, ModelSettings, Setting, SettingsError};
use crate::actuator::camera::ShootMode;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Line<'a> {
    Blank,
    Section(&'a str),
    Entry { key: &'a str, value: &'a str },
}

pub(super) fn apply(
    settings: &mut ModelSettings,
    text: &str,
    model: AircraftModel,
) -> Result<(), SettingsError> {
    let mut in_scope = true;
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        match profile_line()
            .parse(raw)
            .map_err(|_| SettingsError::Syntax { line })?
        {
            Line::Blank => {}
            Line::Section(name) => {
                in_scope = name.eq_ignore_ascii_case(model.as_str());
                log_debug!("profile section {} in scope: {}", name, in_scope);
            }
            Line::Entry { key, value } => {
                // Out-of-scope entries are still checked so typos surface early.
                let setting = setting(key, value, line)?;
                if in_scope {
                    settings.apply(setting);
                }
            }
        }
    }
    Ok(())
}

fn profile_line<'a>() -> impl Parser<&'a str, Line<'a>, ContextError> {
    move |input: &mut &'a str| {
        space0.parse_next(input)?;
        let line = opt(alt((
            delimited('[', take_till(1.., [']', '#']), ']').map(|name: &str| Line::Section(name.trim())),
            (key, space0, '=', take_till(0.., '#')).map(|(key, _, _, value): (&str, _, _, &str)| {
                Line::Entry {
                    key,
                    value: value.trim(),
                }
            }),
        )))
        .parse_next(input)?;
        space0.parse_next(input)?;
        opt(('#', rest)).parse_next(input)?;
        Ok(line.unwrap_or(Line::Blank))
    }
}

fn key<'a>(input: &mut &'a str) -> Result<&'a str, ContextError> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

fn count(input: &mut &str) -> Result<u8, ContextError> {
    dec_uint.parse_next(input)
}

fn pitch(input: &mut &str) -> Result<i8, ContextError> {
    dec_int.parse_next(input)
}

fn flag(input: &mut &str) -> Result<bool, ContextError> {
    alt(("true".value(true), "false".value(false))).parse_next(input)
}

fn shoot_mode(input: &mut &str) -> Result<ShootMode, ContextError> {
    alt(("0".value(ShootMode::Single), "1".value(ShootMode::Aeb))).parse_next(input)
}

fn setting(key: &str, value: &str, line: usize) -> Result<Setting, SettingsError> {
    let invalid = |_| SettingsError::InvalidValue { line };
    let setting = match key {
        "delay" => Setting::StartDelay(count.parse(value).map_err(invalid)?),
        "photos_per_row" => Setting::PhotosPerRow(count.parse(value).map_err(invalid)?),
        "row_count" => Setting::RowCount(count.parse(value).map_err(invalid)?),
        "nadir_count" => Setting::NadirCount(count.parse(value).map_err(invalid)?),
        "max_pitch" => Setting::MaxPitch(pitch.parse(value).map_err(invalid)?),
        "max_pitch_enabled" => Setting::MaxPitchEnabled(flag.parse(value).map_err(invalid)?),
        "photo_mode" => Setting::PhotoMode(shoot_mode.parse(value).map_err(invalid)?),
        "photo_delay" => Setting::PhotoDelay(count.parse(value).map_err(invalid)?),
        "ac_gimbal_yaw" => Setting::AcGimbalYaw(flag.parse(value).map_err(invalid)?),
        _ => return Err(SettingsError::UnknownKey { line }),
    };
    Ok(setting)
}
