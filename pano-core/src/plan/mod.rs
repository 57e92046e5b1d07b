//! Capture plan: which pitches, which yaw columns, which nadir shots.
//!
//! A plan is computed once at run start from the settings and the heading the
//! run starts from. It is immutable afterwards.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::actuator::camera::ShootMode;
use crate::angles::{FULL_TURN, wrap_heading};
use crate::settings::{
    MAX_NADIR_COUNT, MAX_PHOTOS_PER_ROW, MAX_ROW_COUNT, ModelSettings, ProductType,
};

/// Lowest pitch of the row sweep; also the nadir pitch.
pub const NADIR_PITCH: f32 = -90.0;

pub const MAX_ROWS: usize = MAX_ROW_COUNT as usize;
pub const MAX_COLUMNS: usize = MAX_PHOTOS_PER_ROW as usize;
pub const MAX_NADIRS: usize = MAX_NADIR_COUNT as usize;

/// How the run moves between yaw columns.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum YawMode {
    /// Rotate the gimbal yaw axis.
    Gimbal,
    /// Turn the aircraft body; the gimbal only pitches.
    Aircraft,
}

impl YawMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            YawMode::Gimbal => "gimbal",
            YawMode::Aircraft => "aircraft",
        }
    }
}

/// Pitch rows from `top` down towards the nadir, `rows` values spaced evenly.
///
/// Aircraft sweep downwards from the top row; handheld products sweep upwards.
pub fn pitches_for_loop(top: f32, rows: u8, product: ProductType) -> impl Iterator<Item = f32> {
    let interval = if rows == 0 {
        0.0
    } else {
        (top - NADIR_PITCH) / f32::from(rows)
    };
    let ascending = matches!(product, ProductType::Handheld);
    (0..rows).map(move |index| {
        let row = if ascending { rows - 1 - index } else { index };
        top - f32::from(row) * interval
    })
}

/// `count` headings evenly spaced after `heading`, the last one returning to it.
/// Every value lies in `[0, 360)`.
pub fn yaw_angles(count: u8, heading: f32) -> impl Iterator<Item = f32> {
    let step = if count == 0 {
        0.0
    } else {
        FULL_TURN / f32::from(count)
    };
    (1..=count).map(move |column| wrap_heading(heading + step * f32::from(column)))
}

/// Plan construction failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PlanError {
    NoRows,
    NoColumns,
    /// A dimension exceeds the fixed plan storage.
    Capacity { what: &'static str },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::NoRows => f.write_str("panorama needs at least one row"),
            PlanError::NoColumns => f.write_str("panorama needs at least one photo per row"),
            PlanError::Capacity { what } => write!(f, "too many {what} for one panorama"),
        }
    }
}

/// Everything the sequencer needs to run one panorama.
#[derive(Clone, Debug, PartialEq)]
pub struct PanoramaPlan {
    pub pitches: Vec<f32, MAX_ROWS>,
    /// Heading to turn to after each column, in capture order.
    pub columns: Vec<f32, MAX_COLUMNS>,
    /// Heading for each nadir shot after the first.
    pub nadir_yaws: Vec<f32, MAX_NADIRS>,
    pub nadir_pitch: f32,
    pub nadir_count: u8,
    pub shoot_mode: ShootMode,
    pub photo_delay: Duration,
    /// Wait before the first command; handheld runs give the operator time to step back.
    pub start_delay: Duration,
    pub yaw_mode: YawMode,
}

impl PanoramaPlan {
    /// Builds a plan starting from compass `heading`.
    pub fn build(
        settings: &ModelSettings,
        product: ProductType,
        yaw_mode: YawMode,
        heading: f32,
    ) -> Result<Self, PlanError> {
        if settings.row_count == 0 {
            return Err(PlanError::NoRows);
        }
        if settings.photos_per_row == 0 {
            return Err(PlanError::NoColumns);
        }

        let pitches = collect_bounded(
            pitches_for_loop(settings.top_pitch(), settings.row_count, product),
            "rows",
        )?;
        let columns = collect_bounded(yaw_angles(settings.photos_per_row, heading), "columns")?;
        let nadir_yaws = collect_bounded(
            yaw_angles(settings.nadir_count, heading).take(usize::from(
                settings.nadir_count.saturating_sub(1),
            )),
            "nadir shots",
        )?;

        let start_delay = match product {
            ProductType::Handheld => settings.start_delay(),
            ProductType::Aircraft => Duration::ZERO,
        };

        Ok(Self {
            pitches,
            columns,
            nadir_yaws,
            nadir_pitch: NADIR_PITCH,
            nadir_count: settings.nadir_count,
            shoot_mode: settings.photo_mode,
            photo_delay: settings.photo_delay(),
            start_delay,
            yaw_mode,
        })
    }

    /// Images a complete run produces.
    #[must_use]
    pub fn image_count(&self) -> u16 {
        let grid = self.pitches.len() * self.columns.len();
        u16::try_from(grid).unwrap_or(u16::MAX) + u16::from(self.nadir_count)
    }
}

fn collect_bounded<const N: usize>(
    values: impl Iterator<Item = f32>,
    what: &'static str,
) -> Result<Vec<f32, N>, PlanError> {
    let mut bounded = Vec::new();
    for value in values {
        bounded
            .push(value)
            .map_err(|_| PlanError::Capacity { what })?;
    }
    Ok(bounded)
}
