#![cfg_attr(target_os = "none", no_std)]

// Panorama capture sequencing shared by MCU firmware and host tooling.
//
// The crate stays portable by keeping every hardware touch point behind a
// driver trait and every wait behind the `Clock` abstraction. On bare-metal
// targets it builds without the standard library.

#[macro_use]
mod log;

pub mod actuator;
pub mod angles;
pub mod clock;
pub mod events;
pub mod plan;
pub mod sequencer;
pub mod session;
pub mod settings;
pub mod sync;
