//! Signal level estimators for the two raw sample representations we see.
//!
//! Both return a level normalized to roughly 0..1 so a single configured
//! threshold means the same thing for either capture transport.

use num_complex::Complex;

/// DC offset of the RTL-SDR unsigned byte format
pub const DC_OFFSET: f32 = 127.0;

/// Summary of one probe buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub mean: f32,
    pub min: f32,
    pub max: f32,
}

impl Level {
    fn from_magnitudes(mags: impl Iterator<Item = f32>) -> Self {
        let (mut sum, mut n) = (0f64, 0usize);
        let mut min = f32::INFINITY;
        let mut max = 0f32;
        for m in mags {
            sum += m as f64;
            n += 1;
            min = min.min(m);
            max = max.max(m);
        }
        if n == 0 {
            return Self {
                mean: 0.0,
                min: 0.0,
                max: 0.0,
            };
        }
        Self {
            mean: (sum / n as f64) as f32,
            min,
            max,
        }
    }
}

/// Convert interleaved I/Q bytes into complex samples in -1..1
pub fn iq_from_bytes(bytes: &[u8]) -> Vec<Complex<f32>> {
    bytes
        .chunks_exact(2)
        .map(|iq| {
            Complex::new(
                iq[0] as f32 / 127.5 - 1.0,
                iq[1] as f32 / 127.5 - 1.0,
            )
        })
        .collect()
}

/// Mean magnitude of complex samples (direct device transport)
pub fn iq_level(samples: &[Complex<f32>]) -> Level {
    Level::from_magnitudes(samples.iter().map(|s| s.norm()))
}

/// Mean of the DC-recentered byte magnitudes, scaled by the DC offset (pipe transport)
pub fn byte_level(bytes: &[u8]) -> Level {
    Level::from_magnitudes(bytes.iter().map(|&b| (b as f32 - DC_OFFSET).abs() / DC_OFFSET))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_bytes() {
        let level = byte_level(&[127u8; 1024]);
        assert_eq!(level.mean, 0.0);
        assert_eq!(level.max, 0.0);
    }

    #[test]
    fn full_scale_bytes() {
        let level = byte_level(&[0, 254, 0, 254]);
        assert!((level.mean - 1.0).abs() < 1e-6);
        assert!((level.min - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mixed_bytes() {
        // |0-127|, |127-127|, |190-127|, |64-127| = 127, 0, 63, 63
        let level = byte_level(&[0, 127, 190, 64]);
        let expected = (127.0 + 0.0 + 63.0 + 63.0) / 4.0 / 127.0;
        assert!((level.mean - expected).abs() < 1e-6);
        assert_eq!(level.min, 0.0);
    }

    #[test]
    fn iq_conversion() {
        let iq = iq_from_bytes(&[0, 255, 255, 0, 7]);
        // Odd trailing byte is dropped
        assert_eq!(iq.len(), 2);
        assert_eq!(iq[0], Complex::new(-1.0, 1.0));
        assert_eq!(iq[1], Complex::new(1.0, -1.0));
        let level = iq_level(&iq);
        assert!((level.mean - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(iq_level(&[]).mean, 0.0);
        assert_eq!(byte_level(&[]).mean, 0.0);
    }
}
