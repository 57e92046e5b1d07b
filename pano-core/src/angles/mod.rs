//! Heading and attitude angle helpers.
//!
//! Two conventions coexist: gimbal commands use signed angles in
//! `(-180, 180]`, compass headings and the yaw plan use `[0, 360)`. Positive
//! values always rotate clockwise.

/// Degrees in a full turn.
pub const FULL_TURN: f32 = 360.0;
/// Degrees in a half turn.
pub const HALF_TURN: f32 = 180.0;

/// Maps an arbitrary angle in degrees into `(-180, 180]`.
///
/// Both `180` and `-180` normalize to `180`, so the result is idempotent.
#[must_use]
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = wrap_heading(angle);
    if wrapped > HALF_TURN {
        wrapped - FULL_TURN
    } else {
        wrapped
    }
}

/// Maps an arbitrary angle in degrees into `[0, 360)`.
#[must_use]
pub fn wrap_heading(angle: f32) -> f32 {
    let mut wrapped = angle % FULL_TURN;
    if wrapped < 0.0 {
        wrapped += FULL_TURN;
    }
    // `-tiny % 360 + 360` can round up to exactly one full turn.
    if wrapped >= FULL_TURN {
        wrapped -= FULL_TURN;
    }
    wrapped
}

/// Converts a compass heading reported in `(-180, 180]` into `[0, 360)`.
#[must_use]
pub fn heading_to_360(heading: f32) -> f32 {
    if heading >= 0.0 {
        heading
    } else {
        heading + FULL_TURN
    }
}

/// Signed rotation from `from` to `to`, taking the short way round.
///
/// The result lies in `(-180, 180]`; positive means turn clockwise.
#[must_use]
pub fn shortest_angular_distance(from: f32, to: f32) -> f32 {
    normalize_angle(to - from)
}
