//! Scheduled IQ capture from an RTL-SDR dongle with automatic gain calibration

pub mod args;
pub mod calibrate;
pub mod capture;
pub mod config;
#[cfg(feature = "rtlsdr")]
pub mod device;
pub mod error;
pub mod identity;
pub mod layout;
pub mod npy;
pub mod process;
pub mod resolver;
pub mod schedule;
pub mod signal;
pub mod transport;

pub use error::{Error, Result};
