//! Capture through an external `rtl_sdr` process writing raw bytes to stdout

use std::{
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
};

use tracing::debug;

use crate::{
    calibrate::{self, Gain, GainProbe},
    capture::{self, RecordStats, Store},
    config::{CaptureConfig, Tuning},
    error::{Error, Result},
    schedule::SharedClock,
    signal::{self, Level},
    transport::Transport,
};

pub const DEFAULT_EXE: &str = "rtl_sdr";

/// Command line for one capture process. Gain 0 asks rtl_sdr for autogain.
pub fn args(tuning: &Tuning, gain: Gain) -> Vec<String> {
    let gain = match gain {
        Gain::Auto => "0".to_owned(),
        Gain::Manual(db) => db.to_string(),
    };
    vec![
        "-d".to_owned(),
        tuning.device_index.to_string(),
        "-f".to_owned(),
        tuning.center_frequency.to_string(),
        "-s".to_owned(),
        tuning.sample_rate.to_string(),
        "-g".to_owned(),
        gain,
        "-p".to_owned(),
        tuning.freq_correction.to_string(),
        "-".to_owned(),
    ]
}

/// A running capture process, killed when dropped
struct CaptureProcess {
    child: Child,
}

impl CaptureProcess {
    fn spawn(exe: &Path, tuning: &Tuning, gain: Gain) -> Result<Self> {
        let args = args(tuning, gain);
        debug!(?exe, ?args, "Spawning capture process");
        let child = Command::new(exe)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Device(format!("spawning {exe:?}: {e}")))?;
        Ok(Self { child })
    }

    fn stdout(&mut self) -> Result<&mut ChildStdout> {
        self.child
            .stdout
            .as_mut()
            .ok_or_else(|| Error::Device("capture process has no stdout".to_owned()))
    }
}

impl Drop for CaptureProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Spawns a short lived process per probe
pub struct ProcessProbe<'a> {
    exe: &'a Path,
    tuning: Tuning,
    len: usize,
}

impl GainProbe for ProcessProbe<'_> {
    fn probe(&mut self, gain: Gain) -> Result<Level> {
        let mut process = CaptureProcess::spawn(self.exe, &self.tuning, gain)?;
        let mut buf = vec![0u8; self.len];
        let got = capture::read_full(process.stdout()?, &mut buf)?;
        if got < self.len {
            return Err(Error::StreamClosed {
                expected: self.len,
                got,
            });
        }
        Ok(signal::byte_level(&buf))
    }
}

pub struct ProcessTransport {
    exe: PathBuf,
}

impl ProcessTransport {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }
}

impl Transport for ProcessTransport {
    fn name(&self) -> &'static str {
        "process"
    }

    fn calibrate(&mut self, config: &CaptureConfig) -> Result<Gain> {
        let mut probe = ProcessProbe {
            exe: &self.exe,
            tuning: config.tuning,
            len: config.probe_len(),
        };
        calibrate::calibrate(&config.sweep, &mut probe)
    }

    fn record(
        &mut self,
        config: &CaptureConfig,
        gain: Gain,
        store: &Store,
        clock: &SharedClock,
    ) -> Result<RecordStats> {
        let mut process = CaptureProcess::spawn(&self.exe, &config.tuning, gain)?;
        capture::record_stream(
            process.stdout()?,
            config.tuning.center_frequency,
            config.buffer_len(),
            config.window.stop,
            clock,
            store,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning() -> Tuning {
        Tuning {
            device_index: 0,
            center_frequency: 104_300_000,
            sample_rate: 2_048_000,
            freq_correction: 1,
        }
    }

    #[test]
    fn manual_gain_args() {
        assert_eq!(
            args(&tuning(), Gain::Manual(12.5)).join(" "),
            "-d 0 -f 104300000 -s 2048000 -g 12.5 -p 1 -"
        );
    }

    #[test]
    fn autogain_is_zero() {
        let a = args(&tuning(), Gain::Auto);
        let g = a.iter().position(|s| s == "-g").unwrap();
        assert_eq!(a[g + 1], "0");
    }

    #[test]
    fn missing_executable_is_device_error() {
        let exe = PathBuf::from("/nonexistent/rtl_sdr");
        let mut probe = ProcessProbe {
            exe: &exe,
            tuning: tuning(),
            len: 16,
        };
        assert!(matches!(probe.probe(Gain::Auto), Err(Error::Device(_))));
    }
}
