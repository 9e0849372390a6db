//! Linear gain sweep.
//!
//! Starting at the configured floor, gain is stepped up and a two second probe
//! is taken at each setting until the signal level crosses the threshold. The
//! setting one step below the crossing is kept. If the sweep runs off the
//! ceiling instead, hardware autogain is used. Either way the final choice is
//! probed once more and logged.

use std::fmt;

use tracing::{debug, info, warn};

use crate::{config::GainSweep, error::Result, signal::Level};

/// Receiver gain setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gain {
    /// Hardware automatic gain control
    Auto,
    /// Manual gain in dB
    Manual(f64),
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gain::Auto => f.write_str("auto"),
            Gain::Manual(db) => write!(f, "{db}"),
        }
    }
}

/// Something that can measure the signal level at a given gain
pub trait GainProbe {
    /// Apply `gain`, read one probe buffer, and return its level
    fn probe(&mut self, gain: Gain) -> Result<Level>;
}

/// Run the sweep. Read errors abort calibration.
pub fn calibrate<P: GainProbe + ?Sized>(sweep: &GainSweep, probe: &mut P) -> Result<Gain> {
    if sweep.start >= sweep.end {
        info!(gain = sweep.end, "Sweep range is empty, using fixed gain");
        return Ok(Gain::Manual(sweep.end));
    }

    let mut gain = sweep.start;
    let mut level = 0f64;
    while level < sweep.threshold && gain <= sweep.end {
        gain += sweep.step;
        let l = probe.probe(Gain::Manual(gain))?;
        debug!(gain, level = l.mean, min = l.min, max = l.max, "Probe");
        level = l.mean as f64;
    }

    // Leaving the loop past the ceiling means no usable manual gain, even if
    // that last probe met the threshold
    let chosen = if gain > sweep.end {
        warn!(
            ceiling = sweep.end,
            level,
            "Threshold not reached below ceiling, activating autogain"
        );
        Gain::Auto
    } else {
        let g = (gain - sweep.step).max(sweep.start);
        info!(gain = g, "Found gain");
        Gain::Manual(g)
    };

    // Verification read, only reported
    let l = probe.probe(chosen)?;
    info!(gain = %chosen, level = l.mean, min = l.min, max = l.max, "Calibrated");
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Signal level grows linearly with gain
    struct Ramp {
        per_db: f32,
        probes: Vec<Gain>,
    }

    impl Ramp {
        fn new(per_db: f32) -> Self {
            Self {
                per_db,
                probes: vec![],
            }
        }
    }

    impl GainProbe for Ramp {
        fn probe(&mut self, gain: Gain) -> Result<Level> {
            self.probes.push(gain);
            let mean = match gain {
                Gain::Auto => 0.5,
                Gain::Manual(db) => db as f32 * self.per_db,
            };
            Ok(Level {
                mean,
                min: 0.0,
                max: mean,
            })
        }
    }

    fn sweep(start: f64, end: f64, step: f64, threshold: f64) -> GainSweep {
        GainSweep {
            start,
            end,
            step,
            threshold,
        }
    }

    #[test]
    fn empty_range_skips_probing() {
        for (start, end) in [(48.0, 48.0), (50.0, 10.0), (1.0, 0.0)] {
            let mut probe = Ramp::new(1.0);
            let gain = calibrate(&sweep(start, end, 1.0, 0.1), &mut probe).unwrap();
            assert_eq!(gain, Gain::Manual(end));
            assert!(probe.probes.is_empty());
        }
    }

    #[test]
    fn threshold_met() {
        // Level at 10 dB is 0.10, first crossing of 0.095
        let mut probe = Ramp::new(0.01);
        let gain = calibrate(&sweep(1.0, 48.0, 1.0, 0.095), &mut probe).unwrap();
        assert_eq!(gain, Gain::Manual(9.0));
        // 2..=10 during the sweep, then the verification read
        assert_eq!(probe.probes.len(), 10);
        assert_eq!(probe.probes[0], Gain::Manual(2.0));
        assert_eq!(probe.probes.last(), Some(&Gain::Manual(9.0)));
    }

    #[test]
    fn threshold_met_on_first_probe() {
        let mut probe = Ramp::new(1.0);
        let gain = calibrate(&sweep(1.0, 48.0, 2.0, 0.1), &mut probe).unwrap();
        assert_eq!(gain, Gain::Manual(1.0));
    }

    #[test]
    fn ceiling_reached_uses_autogain() {
        let mut probe = Ramp::new(0.0);
        let gain = calibrate(&sweep(1.0, 48.0, 1.0, 0.12), &mut probe).unwrap();
        assert_eq!(gain, Gain::Auto);
        assert_eq!(probe.probes.last(), Some(&Gain::Auto));
        assert!(probe
            .probes
            .iter()
            .filter_map(|g| match g {
                Gain::Manual(db) => Some(*db),
                Gain::Auto => None,
            })
            .all(|db| db <= 48.0 + 1.0));
    }

    #[test]
    fn never_returns_above_ceiling() {
        for per_db in [0.0, 0.001, 0.002, 0.0025, 0.01, 0.1] {
            let mut probe = Ramp::new(per_db);
            match calibrate(&sweep(1.0, 48.0, 1.0, 0.12), &mut probe).unwrap() {
                Gain::Manual(db) => assert!((1.0..=48.0).contains(&db)),
                Gain::Auto => {}
            }
        }
    }

    /// Silent until the gain passes `above`, then loud
    struct Cliff {
        above: f64,
        probes: Vec<Gain>,
    }

    impl GainProbe for Cliff {
        fn probe(&mut self, gain: Gain) -> Result<Level> {
            self.probes.push(gain);
            let mean = match gain {
                Gain::Manual(db) if db > self.above => 0.2,
                Gain::Manual(_) => 0.0,
                Gain::Auto => 0.5,
            };
            Ok(Level {
                mean,
                min: 0.0,
                max: mean,
            })
        }
    }

    #[test]
    fn threshold_met_only_past_ceiling() {
        let mut probe = Cliff {
            above: 48.0,
            probes: vec![],
        };
        let gain = calibrate(&sweep(1.0, 48.0, 1.0, 0.12), &mut probe).unwrap();
        assert_eq!(gain, Gain::Auto);
        // 2..=49 during the sweep, then the verification read
        assert_eq!(probe.probes.len(), 49);
        assert_eq!(probe.probes[47], Gain::Manual(49.0));
        assert_eq!(probe.probes.last(), Some(&Gain::Auto));
    }

    #[test]
    fn threshold_met_at_ceiling() {
        let mut probe = Cliff {
            above: 47.5,
            probes: vec![],
        };
        let gain = calibrate(&sweep(1.0, 48.0, 1.0, 0.12), &mut probe).unwrap();
        assert_eq!(gain, Gain::Manual(47.0));
    }

    struct Broken;

    impl GainProbe for Broken {
        fn probe(&mut self, _: Gain) -> Result<Level> {
            Err(Error::Device("read failed".to_owned()))
        }
    }

    #[test]
    fn read_error_aborts() {
        assert!(matches!(
            calibrate(&sweep(1.0, 48.0, 1.0, 0.1), &mut Broken),
            Err(Error::Device(_))
        ));
    }
}
