//! Checks run before a panorama may start. The first failing check wins.

use core::fmt;

use crate::plan::PlanError;
use crate::settings::{AircraftModel, FlightMode, ModelSettings, ProductType};

/// The connected product.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Product {
    pub product_type: ProductType,
    pub model: AircraftModel,
}

impl Product {
    /// Product inferred from the model name.
    #[must_use]
    pub const fn from_model(model: AircraftModel) -> Self {
        Self {
            product_type: model.product_type(),
            model,
        }
    }
}

/// Components currently reachable through the vendor runtime.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Connection {
    pub product: Option<Product>,
    pub camera: bool,
    pub gimbal: bool,
    pub flight_controller: bool,
    pub remote: bool,
}

impl Connection {
    /// Every component present for `model`.
    #[must_use]
    pub const fn complete(model: AircraftModel) -> Self {
        let aircraft = matches!(model.product_type(), ProductType::Aircraft);
        Self {
            product: Some(Product::from_model(model)),
            camera: true,
            gimbal: true,
            flight_controller: aircraft,
            remote: aircraft,
        }
    }
}

/// Reasons a run refuses to start. `Display` is the operator message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PreflightError {
    AlreadyRunning,
    NoProduct,
    NoCamera,
    NotEnoughSpace { images: u16 },
    NoGimbal,
    NoFlightController,
    NoRemote,
    FlightMode { required: FlightMode },
    Plan(PlanError),
}

impl fmt::Display for PreflightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreflightError::AlreadyRunning => f.write_str("Panorama already running"),
            PreflightError::NoProduct => f.write_str("Unable to find DJI Product"),
            PreflightError::NoCamera => f.write_str("Unable to find a camera"),
            PreflightError::NotEnoughSpace { images } => {
                write!(f, "Not enough space on card for {images} images")
            }
            PreflightError::NoGimbal => f.write_str("Unable to find a gimbal"),
            PreflightError::NoFlightController => {
                f.write_str("Unable to find a flight controller")
            }
            PreflightError::NoRemote => f.write_str("Unable to find a remote control"),
            PreflightError::FlightMode { required } => {
                write!(f, "Please set RC Flight Mode to {} first", required.as_str())
            }
            PreflightError::Plan(error) => write!(f, "Unable to build panorama: {error}"),
        }
    }
}

/// Runs the checks in operator-facing order.
///
/// `has_space` is asked whether the card holds the given number of images.
pub fn check(
    connection: &Connection,
    settings: &ModelSettings,
    has_space: impl FnOnce(u16) -> bool,
    rc_mode: Option<FlightMode>,
) -> Result<Product, PreflightError> {
    let product = connection.product.ok_or(PreflightError::NoProduct)?;
    if !connection.camera {
        return Err(PreflightError::NoCamera);
    }
    let images = settings.image_count();
    if !has_space(images) {
        return Err(PreflightError::NotEnoughSpace { images });
    }
    if !connection.gimbal {
        return Err(PreflightError::NoGimbal);
    }

    if product.product_type == ProductType::Aircraft {
        if !connection.flight_controller {
            return Err(PreflightError::NoFlightController);
        }
        if !connection.remote {
            return Err(PreflightError::NoRemote);
        }
        let body_yaw = !settings.uses_gimbal_yaw(product.product_type, product.model);
        let required = product.model.required_flight_mode();
        if body_yaw && !product.model.is_phantom4() && rc_mode != Some(required) {
            return Err(PreflightError::FlightMode { required });
        }
    }

    Ok(product)
}
