//! Per-model capture settings and the product/model vocabulary.
//!
//! Settings are read once at run start and never change during a run. They
//! come from [`ModelSettings::default`] or from a text profile parsed by
//! [`ModelSettings::from_profile`].

mod profile;

use core::fmt;
use core::time::Duration;

use crate::actuator::camera::ShootMode;

pub const MAX_ROW_COUNT: u8 = 10;
pub const MAX_PHOTOS_PER_ROW: u8 = 24;
pub const MAX_NADIR_COUNT: u8 = 8;
pub const MAX_DELAY_SECS: u8 = 60;
/// Row count enforced once the top row points above the horizon.
pub const MIN_ROWS_ABOVE_HORIZON: u8 = 4;

/// Kind of product carrying the camera.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProductType {
    Aircraft,
    Handheld,
}

impl ProductType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ProductType::Aircraft => "aircraft",
            ProductType::Handheld => "handheld",
        }
    }
}

/// Position of the remote controller's flight mode switch.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FlightMode {
    F,
    A,
    P,
    S,
}

impl FlightMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FlightMode::F => "F",
            FlightMode::A => "A",
            FlightMode::P => "P",
            FlightMode::S => "S",
        }
    }
}

/// Known product models.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AircraftModel {
    Inspire1,
    Inspire1Pro,
    Inspire1Raw,
    Phantom3Standard,
    Phantom3Advanced,
    Phantom3Professional,
    Phantom34K,
    Phantom4,
    Osmo,
    OsmoPro,
    Other,
}

impl AircraftModel {
    const NAMED: [AircraftModel; 10] = [
        AircraftModel::Inspire1,
        AircraftModel::Inspire1Pro,
        AircraftModel::Inspire1Raw,
        AircraftModel::Phantom3Standard,
        AircraftModel::Phantom3Advanced,
        AircraftModel::Phantom3Professional,
        AircraftModel::Phantom34K,
        AircraftModel::Phantom4,
        AircraftModel::Osmo,
        AircraftModel::OsmoPro,
    ];

    /// Looks up a model by its display name, ignoring ASCII case.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        Self::NAMED
            .into_iter()
            .find(|model| model.as_str().eq_ignore_ascii_case(name))
            .unwrap_or(AircraftModel::Other)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AircraftModel::Inspire1 => "Inspire 1",
            AircraftModel::Inspire1Pro => "Inspire 1 Pro",
            AircraftModel::Inspire1Raw => "Inspire 1 RAW",
            AircraftModel::Phantom3Standard => "Phantom 3 Standard",
            AircraftModel::Phantom3Advanced => "Phantom 3 Advanced",
            AircraftModel::Phantom3Professional => "Phantom 3 Professional",
            AircraftModel::Phantom34K => "Phantom 3 4K",
            AircraftModel::Phantom4 => "Phantom 4",
            AircraftModel::Osmo => "Osmo",
            AircraftModel::OsmoPro => "Osmo Pro",
            AircraftModel::Other => "Unknown",
        }
    }

    #[must_use]
    pub const fn is_inspire(self) -> bool {
        matches!(
            self,
            AircraftModel::Inspire1 | AircraftModel::Inspire1Pro | AircraftModel::Inspire1Raw
        )
    }

    #[must_use]
    pub const fn is_phantom4(self) -> bool {
        matches!(self, AircraftModel::Phantom4)
    }

    #[must_use]
    pub const fn product_type(self) -> ProductType {
        match self {
            AircraftModel::Osmo | AircraftModel::OsmoPro => ProductType::Handheld,
            _ => ProductType::Aircraft,
        }
    }

    /// Gimbal yaw is reported and commanded relative to the airframe.
    #[must_use]
    pub const fn relative_gimbal_yaw(self) -> bool {
        self.is_inspire() || self.is_phantom4()
    }

    /// Switch position required before the aircraft body may be yawed.
    #[must_use]
    pub const fn required_flight_mode(self) -> FlightMode {
        FlightMode::F
    }
}

impl fmt::Display for AircraftModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One assignment from a settings profile.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Setting {
    StartDelay(u8),
    PhotosPerRow(u8),
    RowCount(u8),
    NadirCount(u8),
    MaxPitch(i8),
    MaxPitchEnabled(bool),
    PhotoMode(ShootMode),
    PhotoDelay(u8),
    AcGimbalYaw(bool),
}

/// Capture settings for one product model.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModelSettings {
    pub start_delay_secs: u8,
    pub photos_per_row: u8,
    pub row_count: u8,
    pub nadir_count: u8,
    pub max_pitch: i8,
    pub max_pitch_enabled: bool,
    pub photo_mode: ShootMode,
    pub photo_delay_secs: u8,
    /// Inspire only: yaw with the gimbal instead of the aircraft.
    pub ac_gimbal_yaw: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            start_delay_secs: 5,
            photos_per_row: 6,
            row_count: 3,
            nadir_count: 1,
            max_pitch: 0,
            max_pitch_enabled: true,
            photo_mode: ShootMode::Single,
            photo_delay_secs: 0,
            ac_gimbal_yaw: false,
        }
    }
}

impl ModelSettings {
    /// Parses a profile on top of the defaults. See the `profile` module for
    /// the accepted syntax.
    pub fn from_profile(text: &str, model: AircraftModel) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        settings.merge_profile(text, model)?;
        Ok(settings)
    }

    /// Applies a profile fragment on top of the current values. On error the
    /// settings are left untouched.
    pub fn merge_profile(&mut self, text: &str, model: AircraftModel) -> Result<(), SettingsError> {
        let mut merged = *self;
        profile::apply(&mut merged, text, model)?;
        merged.validate()?;
        *self = merged;
        Ok(())
    }

    /// Applies one assignment. Raising the top row above the horizon also
    /// raises the row count to at least [`MIN_ROWS_ABOVE_HORIZON`].
    pub fn apply(&mut self, setting: Setting) {
        match setting {
            Setting::StartDelay(secs) => self.start_delay_secs = secs,
            Setting::PhotosPerRow(count) => self.photos_per_row = count,
            Setting::RowCount(count) => self.row_count = count,
            Setting::NadirCount(count) => self.nadir_count = count,
            Setting::MaxPitch(pitch) => {
                self.max_pitch = pitch;
                if pitch > 0 && self.row_count < MIN_ROWS_ABOVE_HORIZON {
                    self.row_count = MIN_ROWS_ABOVE_HORIZON;
                }
            }
            Setting::MaxPitchEnabled(enabled) => self.max_pitch_enabled = enabled,
            Setting::PhotoMode(mode) => self.photo_mode = mode,
            Setting::PhotoDelay(secs) => self.photo_delay_secs = secs,
            Setting::AcGimbalYaw(enabled) => self.ac_gimbal_yaw = enabled,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let checks = [
            ("row_count", (1..=MAX_ROW_COUNT).contains(&self.row_count)),
            (
                "photos_per_row",
                (1..=MAX_PHOTOS_PER_ROW).contains(&self.photos_per_row),
            ),
            ("nadir_count", self.nadir_count <= MAX_NADIR_COUNT),
            ("max_pitch", (-90..=90).contains(&self.max_pitch)),
            ("delay", self.start_delay_secs <= MAX_DELAY_SECS),
            ("photo_delay", self.photo_delay_secs <= MAX_DELAY_SECS),
        ];
        match checks.into_iter().find(|(_, ok)| !ok) {
            Some((key, _)) => Err(SettingsError::OutOfBounds { key }),
            None => Ok(()),
        }
    }

    /// Images produced by a complete run.
    #[must_use]
    pub fn image_count(&self) -> u16 {
        u16::from(self.row_count) * u16::from(self.photos_per_row) + u16::from(self.nadir_count)
    }

    /// Highest pitch row in degrees.
    #[must_use]
    pub fn top_pitch(&self) -> f32 {
        if self.max_pitch_enabled {
            f32::from(self.max_pitch)
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.start_delay_secs))
    }

    #[must_use]
    pub fn photo_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.photo_delay_secs))
    }

    /// Returns `true` when columns are reached by yawing the gimbal rather
    /// than the aircraft body.
    #[must_use]
    pub const fn uses_gimbal_yaw(&self, product: ProductType, model: AircraftModel) -> bool {
        match product {
            ProductType::Handheld => true,
            ProductType::Aircraft => model.is_inspire() && self.ac_gimbal_yaw,
        }
    }
}

/// Settings profile and bounds errors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SettingsError {
    /// Line could not be read as a section, assignment or comment.
    Syntax { line: usize },
    UnknownKey { line: usize },
    InvalidValue { line: usize },
    OutOfBounds { key: &'static str },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Syntax { line } => write!(f, "syntax error on line {line}"),
            SettingsError::UnknownKey { line } => write!(f, "unknown setting on line {line}"),
            SettingsError::InvalidValue { line } => write!(f, "invalid value on line {line}"),
            SettingsError::OutOfBounds { key } => write!(f, "{key} is out of bounds"),
        }
    }
}
