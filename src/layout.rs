//! On-disk layout shared by all programs on a node

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::Result;

/// Categories under `<data-root>/rec`
pub const CATEGORIES: [&str; 4] = ["iq", "sdr", "gapped", "coded"];
/// Raw IQ captures go here
pub const IQ: &str = CATEGORIES[0];
const CONFIG_SUBDIR: &str = "io-radio";

#[derive(Debug, Clone)]
pub struct Layout {
    pub rec: PathBuf,
    pub config: PathBuf,
}

impl Layout {
    /// Create every directory we write to. Safe to run repeatedly.
    pub fn bootstrap(data_root: &Path, hub_root: &Path) -> Result<Self> {
        let rec = data_root.join("rec");
        for category in CATEGORIES {
            let dir = rec.join(category);
            debug!(?dir, "Ensuring directory");
            fs::create_dir_all(&dir)?;
        }
        let config = hub_root.join(CONFIG_SUBDIR);
        fs::create_dir_all(&config)?;
        Ok(Self { rec, config })
    }

    pub fn category(&self, name: &str) -> PathBuf {
        self.rec.join(name)
    }
}
