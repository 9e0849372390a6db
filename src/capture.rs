//! This module contains all the capture logic
//!
//! Buffers are pulled from the receiver while holding the device lock, and
//! written out after the lock is released. Every buffer is written under a
//! `tmp_` name first and renamed once complete, so a file under its final name
//! is always whole.

use std::{
    collections::HashMap,
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::{
    calibrate::Gain,
    config::Tuning,
    error::{Error, Result},
    identity::GroundstationId,
    npy,
    schedule::SharedClock,
};

const TMP_PREFIX: &str = "tmp_";
const EXTENSION: &str = "npy";

/// One block of raw interleaved I/Q bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureBuffer {
    /// Unix seconds at the start of the read
    pub timestamp: i64,
    pub center_frequency: u32,
    pub samples: Vec<u8>,
}

impl CaptureBuffer {
    /// `<id>_<frequency>_<epoch>`
    pub fn stem(&self, id: &GroundstationId) -> String {
        format!("{}_{}_{}", id, self.center_frequency, self.timestamp)
    }
}

/// Destination directory for finished buffers
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
    id: GroundstationId,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>, id: GroundstationId) -> Self {
        Self {
            dir: dir.into(),
            id,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn final_path(&self, buffer: &CaptureBuffer) -> PathBuf {
        self.dir
            .join(format!("{}.{EXTENSION}", buffer.stem(&self.id)))
    }

    fn tmp_path(&self, buffer: &CaptureBuffer) -> PathBuf {
        self.dir
            .join(format!("{TMP_PREFIX}{}.{EXTENSION}", buffer.stem(&self.id)))
    }

    /// Write under the temporary name, then rename into place
    pub fn persist(&self, buffer: &CaptureBuffer) -> Result<PathBuf> {
        let tmp = self.tmp_path(buffer);
        let path = self.final_path(buffer);
        npy::save_bytes(&tmp, &buffer.samples)?;
        std::fs::rename(&tmp, &path)?;
        info!(?path, bytes = buffer.samples.len(), "Saved buffer");
        Ok(path)
    }
}

/// Totals for one recording window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStats {
    pub buffers: usize,
    pub failed: usize,
}

/// Exclusive access to a physical receiver
pub trait SampleSource: Send + 'static {
    /// Configure the receiver and read `len` bytes of interleaved I/Q
    fn read(&mut self, tuning: &Tuning, gain: Gain, len: usize) -> Result<Vec<u8>>;
}

struct Task<S> {
    source: Arc<Mutex<S>>,
    tuning: Tuning,
    gain: Gain,
    len: usize,
    clock: SharedClock,
    store: Store,
}

impl<S: SampleSource> Task<S> {
    /// Read one buffer. The device lock is dropped on return.
    fn capture(&self) -> Result<CaptureBuffer> {
        let mut source = self
            .source
            .lock()
            .map_err(|_| Error::Device("device lock poisoned".to_owned()))?;
        let timestamp = self.clock.now();
        debug!(timestamp, "Reading buffer");
        Ok(CaptureBuffer {
            timestamp,
            center_frequency: self.tuning.center_frequency,
            samples: source.read(&self.tuning, self.gain, self.len)?,
        })
    }

    fn run(&self) -> Result<PathBuf> {
        let buffer = self.capture()?;
        self.store.persist(&buffer)
    }
}

fn check_len(len: usize) -> Result<()> {
    if len == 0 {
        return Err(Error::Config("capture buffer length is zero".to_owned()));
    }
    Ok(())
}

/// Fixed number of overlapping capture tasks, each replaced as soon as it finishes.
///
/// The shared lock keeps device reads from interleaving while the previous
/// buffer is still being written out.
pub struct CapturePool<S> {
    source: Arc<Mutex<S>>,
    depth: usize,
    poll: Duration,
}

impl<S: SampleSource> CapturePool<S> {
    pub fn new(source: S, depth: usize, poll: Duration) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            depth: depth.max(1),
            poll,
        }
    }

    fn spawn(
        &self,
        n: usize,
        task: Task<S>,
        done: Sender<(usize, Result<PathBuf>)>,
    ) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name(format!("capture-{n}"))
            .spawn(move || {
                let res = task.run();
                // The supervisor outlives every worker
                let _ = done.send((n, res));
            })?;
        Ok(handle)
    }

    /// Keep capturing until `stop`. In flight reads are allowed to finish.
    pub fn run(
        &self,
        tuning: Tuning,
        gain: Gain,
        len: usize,
        stop: i64,
        clock: &SharedClock,
        store: &Store,
    ) -> Result<RecordStats> {
        check_len(len)?;
        let (done_tx, done_rx) = unbounded();
        let new_task = || Task {
            source: self.source.clone(),
            tuning,
            gain,
            len,
            clock: clock.clone(),
            store: store.clone(),
        };
        let mut stats = RecordStats::default();
        let mut last_err = None;
        let mut workers: HashMap<usize, JoinHandle<()>> = HashMap::new();
        let mut spawned = 0usize;

        for _ in 0..self.depth {
            workers.insert(spawned, self.spawn(spawned, new_task(), done_tx.clone())?);
            spawned += 1;
        }

        while !workers.is_empty() {
            match done_rx.recv_timeout(self.poll) {
                Ok((n, res)) => {
                    if let Some(handle) = workers.remove(&n) {
                        let _ = handle.join();
                    }
                    match res {
                        Ok(_) => {
                            stats.buffers += 1;
                            if clock.now() <= stop {
                                let handle = self.spawn(spawned, new_task(), done_tx.clone())?;
                                workers.insert(spawned, handle);
                                info!(rec = spawned, "Capture task added");
                                spawned += 1;
                            }
                        }
                        Err(e) => {
                            error!(task = n, "Capture task failed: {e}");
                            stats.failed += 1;
                            last_err = Some(e);
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let finished: Vec<usize> = workers
                        .iter()
                        .filter(|(_, h)| h.is_finished())
                        .map(|(n, _)| *n)
                        .collect();
                    // A worker that reported has its result queued, so only
                    // an empty queue means the finished ones died without one
                    if done_rx.is_empty() {
                        for n in finished {
                            warn!(task = n, "Capture task crashed");
                            if let Some(handle) = workers.remove(&n) {
                                let _ = handle.join();
                            }
                            stats.failed += 1;
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(buffers = stats.buffers, failed = stats.failed, "Recording window closed");
        match last_err {
            Some(e) if stats.buffers == 0 => Err(e),
            _ => Ok(stats),
        }
    }
}

/// Fill `buf` from `reader`, returning how much was read before EOF
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Slice a continuous byte stream into buffers until `stop`
pub fn record_stream<R: Read>(
    reader: &mut R,
    center_frequency: u32,
    len: usize,
    stop: i64,
    clock: &SharedClock,
    store: &Store,
) -> Result<RecordStats> {
    check_len(len)?;
    let mut stats = RecordStats::default();
    while clock.now() <= stop {
        let timestamp = clock.now();
        let mut samples = vec![0u8; len];
        let got = read_full(reader, &mut samples)?;
        if got < len {
            samples.truncate(got);
            if got > 0 {
                store.persist(&CaptureBuffer {
                    timestamp,
                    center_frequency,
                    samples,
                })?;
            }
            return Err(Error::StreamClosed { expected: len, got });
        }
        store.persist(&CaptureBuffer {
            timestamp,
            center_frequency,
            samples,
        })?;
        stats.buffers += 1;
    }
    info!(buffers = stats.buffers, "Recording window closed");
    Ok(stats)
}
