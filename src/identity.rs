//! Stable per-host groundstation id, derived once from the hardware MAC

use std::{fmt, path::Path};

use sha2::{Digest, Sha224};
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    npy,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundstationId(String);

impl GroundstationId {
    /// Hash the decimal form of a 48-bit node id
    pub fn from_node(node: u64) -> Self {
        let digest = Sha224::digest(node.to_string().as_bytes());
        Self(
            digest
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the cached id, or derive one from `node` and cache it
    pub fn load_or_create<F>(path: &Path, node: F) -> Result<Self>
    where
        F: FnOnce() -> Result<u64>,
    {
        let id = if path.exists() {
            let id = npy::load_str(path)?;
            if id.is_empty() {
                return Err(Error::Identity(format!("{path:?} holds an empty id")));
            }
            Self(id)
        } else {
            let id = Self::from_node(node()?);
            npy::save_str(path, id.as_str())?;
            id
        };
        info!(id = id.as_str(), "Groundstation id");
        Ok(id)
    }
}

impl fmt::Display for GroundstationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The host's MAC as a 48-bit integer.
///
/// Without a readable MAC we fall back to a random node id with the multicast
/// bit set, which is what RFC 4122 asks for. It is only ever hashed once,
/// since the result is cached.
pub fn hardware_node() -> Result<u64> {
    let mac = mac_address::get_mac_address()
        .map_err(|e| Error::Identity(format!("reading MAC address: {e}")))?;
    Ok(match mac {
        Some(mac) => mac
            .bytes()
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64),
        None => {
            warn!("No MAC address found, using a random node id");
            (rand::random::<u64>() & 0xffff_ffff_ffff) | 0x0100_0000_0000
        }
    })
}
