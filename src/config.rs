//! Record configuration documents and the capture settings derived from them

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};

/// Calendar fields as they appear in the config documents, interpreted as UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    pub y: i32,
    pub m: u32,
    pub d: u32,
    pub hh: u32,
    pub mm: u32,
    pub ss: u32,
}

impl Calendar {
    /// Seconds since the unix epoch
    pub fn epoch(&self) -> Result<i64> {
        NaiveDate::from_ymd_opt(self.y, self.m, self.d)
            .and_then(|d| d.and_hms_opt(self.hh, self.mm, self.ss))
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| Error::Config(format!("invalid calendar time {self:?}")))
    }
}

/// The shared record config (remote mirror or local fallback)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub version: i64,
    pub created: i64,
    pub device_number: u32,
    pub center_frequency: u32,
    pub samplerate: u32,
    pub secondsofrecording: u64,
    #[serde(default)]
    pub freq_correction: i32,
    pub recording_start: Calendar,
    pub recording_end: Calendar,
    pub gain_start: f64,
    pub gain_end: f64,
    pub gain_step: f64,
    pub signal_threshold: f64,
    /// Seconds before `recording_start` at which to calibrate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration_start: Option<u64>,
}

impl RecordConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("record config does not match schema: {e}")))
    }
}

/// Node specific limits, local to this machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub secondsofrecording_maximum: u64,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Config(format!("opening node config {path:?}: {e}")))?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Everything needed to tune the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub device_index: u32,
    pub center_frequency: u32,
    pub sample_rate: u32,
    /// PPM, zero means no correction
    pub freq_correction: i32,
}

/// Parameters of the linear gain sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainSweep {
    pub start: f64,
    pub end: f64,
    pub step: f64,
    pub threshold: f64,
}

/// Absolute recording window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: i64,
    pub stop: i64,
    /// `None` calibrates as soon as the scheduler runs
    pub calibration_lead: Option<u64>,
}

impl Window {
    /// Earliest time calibration may run
    pub fn calibration_at(&self) -> Option<i64> {
        self.calibration_lead
            .map(|lead| self.start.saturating_sub(i64::try_from(lead).unwrap_or(i64::MAX)))
    }
}

/// Capture settings after merging the record config with the node limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    pub tuning: Tuning,
    pub seconds: u64,
    pub window: Window,
    pub sweep: GainSweep,
}

impl CaptureConfig {
    pub fn new(record: &RecordConfig, node: &NodeConfig) -> Result<Self> {
        if record.gain_step <= 0.0 && record.gain_start < record.gain_end {
            return Err(Error::Config(format!(
                "gain_step must be positive, got {}",
                record.gain_step
            )));
        }
        if record.samplerate == 0 {
            return Err(Error::Config("samplerate must be positive".to_owned()));
        }
        let seconds = record.secondsofrecording.min(node.secondsofrecording_maximum);
        info!(
            commanded = record.secondsofrecording,
            maximum = node.secondsofrecording_maximum,
            seconds,
            "Recording duration"
        );
        if seconds == 0 {
            return Err(Error::Config(format!(
                "recording duration is zero (commanded {}, node maximum {})",
                record.secondsofrecording, node.secondsofrecording_maximum
            )));
        }
        let start = record.recording_start.epoch()?;
        if let Some(lead) = record.calibration_start {
            i64::try_from(lead)
                .ok()
                .and_then(|lead| start.checked_sub(lead))
                .ok_or_else(|| Error::Config(format!("calibration_start {lead} out of range")))?;
        }
        Ok(Self {
            tuning: Tuning {
                device_index: record.device_number,
                center_frequency: record.center_frequency,
                sample_rate: record.samplerate,
                freq_correction: record.freq_correction,
            },
            seconds,
            window: Window {
                start,
                stop: record.recording_end.epoch()?,
                calibration_lead: record.calibration_start,
            },
            sweep: GainSweep {
                start: record.gain_start,
                end: record.gain_end,
                step: record.gain_step,
                threshold: record.signal_threshold,
            },
        })
    }

    /// Number of IQ samples per capture buffer
    pub fn nsamples(&self) -> u64 {
        self.seconds * self.tuning.sample_rate as u64
    }

    /// Bytes per capture buffer, one byte per I and per Q
    pub fn buffer_len(&self) -> usize {
        2 * self.nsamples() as usize
    }

    /// Bytes per calibration probe: two seconds of IQ samples
    pub fn probe_len(&self) -> usize {
        2 * 2 * self.tuning.sample_rate as usize
    }
}
