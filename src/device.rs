/*! In-process RTL-SDR access through librtlsdr.

Each capture opens the dongle, tunes it, reads one buffer and closes it
again, all while holding the pool's device lock. Calibration keeps one handle
open for the whole sweep.
*/
use std::time::Duration;

use tracing::debug;

use crate::{
    calibrate::{self, Gain, GainProbe},
    capture::{CapturePool, RecordStats, SampleSource, Store},
    config::{CaptureConfig, Tuning},
    error::{self, Error, Result},
    schedule::SharedClock,
    signal::{self, Level},
    transport::Transport,
};

// librtlsdr wants reads in multiples of 512 bytes
const CHUNK_SIZE: usize = 16 * 16384;
const READ_ALIGN: usize = 512;

pub fn device_count() -> usize {
    rtlsdr::get_device_count().max(0) as usize
}

fn open(tuning: &Tuning) -> Result<rtlsdr::RTLSDRDevice> {
    let found = device_count();
    if tuning.device_index as usize >= found {
        return Err(Error::Device(format!(
            "RTL SDR index {} doesn't exist, found {found}",
            tuning.device_index
        )));
    }
    let mut dev = rtlsdr::open(tuning.device_index as i32)
        .map_err(|e| Error::Device(format!("RTL SDR open: {e}")))?;
    dev.set_center_freq(tuning.center_frequency)?;
    dev.set_sample_rate(tuning.sample_rate)?;
    if tuning.freq_correction != 0 {
        dev.set_freq_correction(tuning.freq_correction)?;
    }
    debug!(
        freq = tuning.center_frequency,
        rate = tuning.sample_rate,
        ppm = tuning.freq_correction,
        "Tuned device"
    );
    Ok(dev)
}

fn set_gain(dev: &mut rtlsdr::RTLSDRDevice, gain: Gain) -> Result<()> {
    match gain {
        Gain::Auto => dev.set_tuner_gain_mode(false)?,
        Gain::Manual(db) => {
            dev.set_tuner_gain_mode(true)?;
            // Tenths of a dB
            dev.set_tuner_gain((db * 10.0).round() as i32)?;
        }
    }
    Ok(())
}

fn read_bytes(dev: &mut rtlsdr::RTLSDRDevice, len: usize) -> Result<Vec<u8>> {
    dev.reset_buffer()?;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let want = (len - out.len()).min(CHUNK_SIZE);
        let aligned = want.div_ceil(READ_ALIGN) * READ_ALIGN;
        let buf = dev.read_sync(aligned)?;
        if buf.is_empty() {
            return Err(Error::Device(format!(
                "short read after {} of {len} bytes",
                out.len()
            )));
        }
        out.extend_from_slice(&buf[..buf.len().min(want)]);
    }
    Ok(out)
}

/// Opens the dongle fresh for every buffer
pub struct RtlSdrSource;

impl SampleSource for RtlSdrSource {
    fn read(&mut self, tuning: &Tuning, gain: Gain, len: usize) -> Result<Vec<u8>> {
        let mut dev = open(tuning)?;
        set_gain(&mut dev, gain)?;
        let res = read_bytes(&mut dev, len);
        error::and_cleanup(res, dev.close().map_err(Error::from))
    }
}

/// Sweeps gain on an open handle, measuring complex sample magnitude
pub struct DeviceProbe {
    dev: rtlsdr::RTLSDRDevice,
    len: usize,
}

impl GainProbe for DeviceProbe {
    fn probe(&mut self, gain: Gain) -> Result<Level> {
        set_gain(&mut self.dev, gain)?;
        let bytes = read_bytes(&mut self.dev, self.len)?;
        Ok(signal::iq_level(&signal::iq_from_bytes(&bytes)))
    }
}

pub struct DeviceTransport {
    depth: usize,
    poll: Duration,
}

impl DeviceTransport {
    pub fn new(depth: usize, poll: Duration) -> Self {
        Self { depth, poll }
    }
}

impl Transport for DeviceTransport {
    fn name(&self) -> &'static str {
        "device"
    }

    fn calibrate(&mut self, config: &CaptureConfig) -> Result<Gain> {
        if config.sweep.start >= config.sweep.end {
            return calibrate::calibrate(&config.sweep, &mut NoProbe);
        }
        let mut probe = DeviceProbe {
            dev: open(&config.tuning)?,
            len: config.probe_len(),
        };
        let res = calibrate::calibrate(&config.sweep, &mut probe);
        error::and_cleanup(res, probe.dev.close().map_err(Error::from))
    }

    fn record(
        &mut self,
        config: &CaptureConfig,
        gain: Gain,
        store: &Store,
        clock: &SharedClock,
    ) -> Result<RecordStats> {
        CapturePool::new(RtlSdrSource, self.depth, self.poll).run(
            config.tuning,
            gain,
            config.buffer_len(),
            config.window.stop,
            clock,
            store,
        )
    }
}

/// Stands in when the sweep range is empty and no device access is needed
struct NoProbe;

impl GainProbe for NoProbe {
    fn probe(&mut self, _: Gain) -> Result<Level> {
        Err(Error::Device("no probe available".to_owned()))
    }
}
