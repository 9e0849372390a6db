//! Picks the authoritative record config out of a remote copy and a local copy.
//!
//! The remote document is mirrored to disk on every successful fetch. If the
//! fetch fails and there is no mirror yet, a placeholder with `created: 0` is
//! written so the merge always has two inputs. The local document is created
//! from a template when missing. Whichever document has the newer `created`
//! field wins, ties go to the remote one.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const DEFAULT_URL: &str =
    "https://raw.githubusercontent.com/aerospaceresearch/dgsn-hub-ops/master/io-radio/record-config.json";
pub const REMOTE_FILE: &str = "record-github-config.json";
pub const LOCAL_FILE: &str = "record-config.json";
/// Schema version written into the placeholder and the template
pub const SCHEMA_VERSION: i64 = 1457968166;

/// Somewhere a record config document can be fetched from
pub trait ConfigSource {
    fn fetch(&self) -> Result<Value>;
}

/// A single HTTP GET
pub struct HttpSource {
    pub url: String,
    pub timeout: Duration,
}

impl ConfigSource for HttpSource {
    fn fetch(&self) -> Result<Value> {
        info!(url = %self.url, "Downloading record config");
        let response = ureq::get(&self.url).timeout(self.timeout).call()?;
        response
            .into_json()
            .map_err(|e| Error::Fetch(format!("decoding {}: {e}", self.url)))
    }
}

/// The local config written when none exists
pub fn template() -> Value {
    json!({
        "comment": "prototpye status",
        "version": SCHEMA_VERSION,
        "created": 1457968167,
        "device_number": 0,
        "center_frequency": 104300000,
        "samplerate": 2048000,
        "secondsofrecording": 40,
        "freq_correction": 1,
        "recording_start": {"y": 2016, "m": 3, "d": 31, "hh": 0, "mm": 0, "ss": 0},
        "recording_end": {"y": 2016, "m": 3, "d": 31, "hh": 1, "mm": 0, "ss": 0},
        "gain_start": 1.0,
        "gain_end": 48.0,
        "gain_step": 1.0,
        "signal_threshold": 0.12
    })
}

fn placeholder() -> Value {
    json!({"version": SCHEMA_VERSION, "created": 0})
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
}

fn created(doc: &Value, path: &Path) -> Result<i64> {
    doc.get("created")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Config(format!("{path:?} has no integer `created` field")))
}

pub struct Resolver<S> {
    source: S,
    dir: PathBuf,
}

impl<S: ConfigSource> Resolver<S> {
    pub fn new(source: S, dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            dir: dir.into(),
        }
    }

    pub fn remote_path(&self) -> PathBuf {
        self.dir.join(REMOTE_FILE)
    }

    pub fn local_path(&self) -> PathBuf {
        self.dir.join(LOCAL_FILE)
    }

    /// Refresh the remote mirror, falling back to a placeholder if there is none
    fn refresh_remote(&self) -> Result<()> {
        let path = self.remote_path();
        match self.source.fetch() {
            Ok(doc) => write_json(&path, &doc),
            Err(e) => {
                warn!("Could not fetch remote config: {e}");
                if !path.exists() {
                    info!(?path, "Creating placeholder remote config");
                    write_json(&path, &placeholder())?;
                }
                Ok(())
            }
        }
    }

    /// Return the authoritative config document, leaving both candidates on disk
    pub fn resolve(&self) -> Result<Value> {
        self.refresh_remote()?;
        let remote_path = self.remote_path();
        let remote = read_json(&remote_path)?;

        let local_path = self.local_path();
        if !local_path.exists() {
            info!(path = ?local_path, "Creating local config from template");
            write_json(&local_path, &template())?;
        }
        let local = read_json(&local_path)?;

        let remote_created = created(&remote, &remote_path)?;
        let local_created = created(&local, &local_path)?;
        info!(remote_created, local_created, "Comparing config candidates");
        if remote_created >= local_created {
            info!("Using remote config");
            Ok(remote)
        } else {
            info!("Using local config");
            Ok(local)
        }
    }
}
