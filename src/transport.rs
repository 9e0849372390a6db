//! The two ways of getting samples out of a dongle, chosen once at startup

use std::{path::PathBuf, time::Duration};

use tracing::info;

use crate::{
    calibrate::Gain,
    capture::{RecordStats, Store},
    config::CaptureConfig,
    error::Result,
    process::ProcessTransport,
    schedule::SharedClock,
};

/// A receiver that can be calibrated and then record a window
pub trait Transport {
    fn name(&self) -> &'static str;

    /// Pick the gain to record with
    fn calibrate(&mut self, config: &CaptureConfig) -> Result<Gain>;

    /// Capture buffers from now until the end of the window
    fn record(
        &mut self,
        config: &CaptureConfig,
        gain: Gain,
        store: &Store,
        clock: &SharedClock,
    ) -> Result<RecordStats>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Kind {
    /// Direct device if one is attached and supported, otherwise external process
    Auto,
    /// In-process librtlsdr handle
    Device,
    /// External capture command piping raw bytes
    Process,
}

/// Settings both transports draw from
#[derive(Debug, Clone)]
pub struct Options {
    pub exe: PathBuf,
    pub depth: usize,
    pub replace_poll: Duration,
}

#[cfg(feature = "rtlsdr")]
fn device(opts: &Options) -> Result<Box<dyn Transport>> {
    Ok(Box::new(crate::device::DeviceTransport::new(
        opts.depth,
        opts.replace_poll,
    )))
}

#[cfg(not(feature = "rtlsdr"))]
fn device(_: &Options) -> Result<Box<dyn Transport>> {
    Err(crate::error::Error::Config(
        "built without the `rtlsdr` feature, direct device capture is unavailable".to_owned(),
    ))
}

#[cfg(feature = "rtlsdr")]
fn device_attached() -> bool {
    let n = crate::device::device_count();
    info!(devices = n, "Enumerated RTL SDR devices");
    n > 0
}

#[cfg(not(feature = "rtlsdr"))]
fn device_attached() -> bool {
    false
}

pub fn select(kind: Kind, opts: &Options) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match kind {
        Kind::Device => device(opts)?,
        Kind::Process => Box::new(ProcessTransport::new(opts.exe.clone())),
        Kind::Auto if device_attached() => device(opts)?,
        Kind::Auto => Box::new(ProcessTransport::new(opts.exe.clone())),
    };
    info!(transport = transport.name(), "Selected capture transport");
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> Options {
        Options {
            exe: PathBuf::from("rtl_sdr"),
            depth: 2,
            replace_poll: Duration::from_secs(2),
        }
    }

    #[test]
    fn explicit_process() {
        assert_eq!(select(Kind::Process, &opts()).unwrap().name(), "process");
    }

    #[cfg(not(feature = "rtlsdr"))]
    #[test]
    fn auto_without_driver_uses_process() {
        assert_eq!(select(Kind::Auto, &opts()).unwrap().name(), "process");
        assert!(select(Kind::Device, &opts()).is_err());
    }
}
