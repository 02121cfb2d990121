use std::fs;
use std::path::Path;

use super::{Dataset, Direction, ImpulseResponse, Measurements};
use crate::error::{Error, LoadError};
use crate::pcm;

const LEFT_PREFIX: &str = "L-";
const RIGHT_PREFIX: &str = "R-";
const EXTENSION: &str = ".wav";

/// HRIR dataset read from a directory of per-angle WAV pairs.
///
/// Every `L-<angle>.wav` needs a matching `R-<angle>.wav` with the same angle
/// token (`L-005.wav` pairs with `R-005.wav`). Angles are integer azimuths in
/// degrees at ear level. Unmatched left files are skipped with a warning.
///
/// Lookups compare azimuths directly, `|stored - requested|`, without wrapping
/// around 360 degrees.
#[derive(Clone, Debug)]
pub struct WavPairDataset {
    measurements: Measurements,
}

impl WavPairDataset {
    /// Load every complete pair found in `dir`
    ///
    /// ```no_run
    /// use binorbit::dataset::{Dataset, Direction, WavPairDataset};
    ///
    /// let hrirs = WavPairDataset::open("hrir/samrec").unwrap();
    /// let ir = hrirs.lookup(Direction::azimuth(45.0));
    /// ```
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref();
        Self::load(dir).map_err(|source| Error::load(dir, source))
    }

    fn load(dir: &Path) -> Result<Self, LoadError> {
        let mut angles = Vec::new();

        for entry in fs::read_dir(dir)? {
            let name = entry?.file_name();

            if let Some(angle) = name.to_str().and_then(parse_left) {
                angles.push(angle);
            }
        }

        // directory order is platform dependent, lookups tie-break on load order
        angles.sort();

        let mut entries = Vec::with_capacity(angles.len());
        let mut sample_rate = None;
        let mut previous = None;

        for (angle, token) in angles {
            if previous == Some(angle) {
                log::warn!("Duplicate HRIR files for angle {angle}, keeping the first pair");
                continue;
            }

            let right_path = dir.join(format!("{RIGHT_PREFIX}{token}{EXTENSION}"));

            if !right_path.is_file() {
                log::warn!(
                    "Right channel file {} not found for angle {angle}, skipping",
                    right_path.display()
                );
                continue;
            }

            let left = pcm::read_mono(dir.join(format!("{LEFT_PREFIX}{token}{EXTENSION}")))?;
            let right = pcm::read_mono(&right_path)?;

            if left.sample_rate != right.sample_rate {
                log::warn!(
                    "Sample rates differ for angle {angle}: left {} Hz, right {} Hz",
                    left.sample_rate,
                    right.sample_rate
                );
            }

            let rate = *sample_rate.get_or_insert(left.sample_rate);

            if left.sample_rate != rate {
                log::warn!(
                    "Angle {angle} was captured at {} Hz, dataset rate is {rate} Hz",
                    left.sample_rate
                );
            }

            previous = Some(angle);
            entries.push((
                Direction::azimuth(angle as f32),
                ImpulseResponse::new(left.samples, right.samples),
            ));
        }

        let measurements = Measurements::new(entries, sample_rate.unwrap_or_default())?;

        log::info!(
            "Loaded {} HRIR pairs ({} taps, {} Hz) from {}",
            measurements.len(),
            measurements.filter_len(),
            measurements.sample_rate(),
            dir.display()
        );

        Ok(Self { measurements })
    }

    /// Loaded azimuths in ascending order
    pub fn azimuths(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.measurements.len()).map(|i| self.measurements.direction(i).azimuth)
    }
}

impl Dataset for WavPairDataset {
    fn sample_rate(&self) -> u32 {
        self.measurements.sample_rate()
    }

    fn filter_len(&self) -> usize {
        self.measurements.filter_len()
    }

    fn len(&self) -> usize {
        self.measurements.len()
    }

    fn nearest(&self, direction: Direction) -> usize {
        self.measurements
            .nearest_by(|stored| (stored.azimuth - direction.azimuth).abs())
    }

    fn response(&self, index: usize) -> &ImpulseResponse {
        self.measurements.response(index)
    }

    fn direction(&self, index: usize) -> Direction {
        self.measurements.direction(index)
    }
}

/// `L-010.wav` -> `(10, "010")`
fn parse_left(name: &str) -> Option<(i32, String)> {
    let token = name.strip_prefix(LEFT_PREFIX)?.strip_suffix(EXTENSION)?;

    // unsigned degrees only, `L--5.wav` is not an angle
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let angle = token.parse().ok()?;

    Some((angle, token.to_owned()))
}
