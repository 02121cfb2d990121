//! Directional HRIR datasets.
//!
//! A dataset resolves a requested [`Direction`] to the nearest measured
//! [`ImpulseResponse`]. Two encodings are supported:
//!
//! - [`WavPairDataset`]: a directory of `L-<angle>.wav` / `R-<angle>.wav`
//!   files, one pair per azimuth.
//! - [`SofaDataset`]: a single `SOFA` container (Spatially Oriented Format
//!   for Acoustics) read through [`libmysofa`]. Requires the `sofa` feature.
//!
//! Both are immutable once loaded and can be shared between renders.
//!
//! [`libmysofa`]: https://github.com/hoene/libmysofa

mod wav_pairs;

#[cfg(feature = "sofa")]
mod sofa;

pub use wav_pairs::WavPairDataset;

#[cfg(feature = "sofa")]
pub use sofa::{OpenOptions, SofaDataset};

use crate::error::LoadError;

/// Source direction in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Direction {
    /// Horizontal angle, conventionally in `[0, 360)`
    pub azimuth: f32,
    /// Vertical angle, 0 is ear level
    pub elevation: f32,
}

impl Direction {
    pub fn new(azimuth: f32, elevation: f32) -> Self {
        Self { azimuth, elevation }
    }

    /// Direction on the horizontal plane
    pub fn azimuth(azimuth: f32) -> Self {
        Self::new(azimuth, 0.0)
    }
}

/// Left and right ear impulse responses measured for one direction.
#[derive(Clone, Debug, PartialEq)]
pub struct ImpulseResponse {
    pub left: Box<[f32]>,
    pub right: Box<[f32]>,
}

impl ImpulseResponse {
    pub fn new(left: impl Into<Box<[f32]>>, right: impl Into<Box<[f32]>>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Read-only access to a loaded HRIR dataset.
pub trait Dataset: Sync {
    /// Sample rate the measurements were captured at
    fn sample_rate(&self) -> u32;

    /// Length shared by every impulse response of the dataset
    fn filter_len(&self) -> usize;

    /// Number of measured directions, never zero
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the measurement closest to `direction`.
    ///
    /// Ties resolve to the measurement stored first.
    fn nearest(&self, direction: Direction) -> usize;

    /// Measurement stored at `index`
    ///
    /// # Panics
    ///
    /// This method panics if `index >= self.len()`
    fn response(&self, index: usize) -> &ImpulseResponse;

    /// Direction of the measurement stored at `index`
    fn direction(&self, index: usize) -> Direction;

    /// Impulse response pair closest to `direction`
    fn lookup(&self, direction: Direction) -> &ImpulseResponse {
        self.response(self.nearest(direction))
    }
}

/// Storage shared by the dataset encodings. Entries keep their load order,
/// which defines tie breaking during lookups.
#[derive(Clone, Debug)]
pub(crate) struct Measurements {
    directions: Vec<Direction>,
    responses: Vec<ImpulseResponse>,
    sample_rate: u32,
    filter_len: usize,
}

impl Measurements {
    /// Validate loaded entries and bring them to a common length.
    ///
    /// Left/right length mismatches are rejected, shorter pairs are zero
    /// padded to the longest impulse response of the set.
    pub(crate) fn new(
        entries: Vec<(Direction, ImpulseResponse)>,
        sample_rate: u32,
    ) -> Result<Self, LoadError> {
        if entries.is_empty() {
            return Err(LoadError::Empty);
        }

        if let Some((direction, ir)) = entries
            .iter()
            .find(|(_, ir)| ir.left.len() != ir.right.len())
        {
            return Err(LoadError::ChannelLengthMismatch {
                azimuth: direction.azimuth,
                left: ir.left.len(),
                right: ir.right.len(),
            });
        }

        let filter_len = entries.iter().map(|(_, ir)| ir.len()).max().unwrap_or(0);

        if filter_len == 0 {
            return Err(LoadError::Empty);
        }

        let (directions, responses) = entries
            .into_iter()
            .map(|(direction, ir)| {
                if ir.len() < filter_len {
                    log::debug!(
                        "Padding impulse response at {:?} from {} to {} taps",
                        direction,
                        ir.len(),
                        filter_len
                    );
                    (direction, pad(ir, filter_len))
                } else {
                    (direction, ir)
                }
            })
            .unzip();

        Ok(Self {
            directions,
            responses,
            sample_rate,
            filter_len,
        })
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) fn filter_len(&self) -> usize {
        self.filter_len
    }

    pub(crate) fn len(&self) -> usize {
        self.directions.len()
    }

    pub(crate) fn response(&self, index: usize) -> &ImpulseResponse {
        &self.responses[index]
    }

    pub(crate) fn direction(&self, index: usize) -> Direction {
        self.directions[index]
    }

    /// Linear scan for the entry minimizing `distance`; the first minimum wins.
    pub(crate) fn nearest_by<F>(&self, distance: F) -> usize
    where
        F: Fn(&Direction) -> f32,
    {
        let mut best = 0;
        let mut best_distance = f32::INFINITY;

        for (index, direction) in self.directions.iter().enumerate() {
            let d = distance(direction);

            if d < best_distance {
                best = index;
                best_distance = d;
            }
        }

        best
    }
}

fn pad(ir: ImpulseResponse, len: usize) -> ImpulseResponse {
    let mut left = ir.left.into_vec();
    let mut right = ir.right.into_vec();

    left.resize(len, 0.0);
    right.resize(len, 0.0);

    ImpulseResponse::new(left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(azimuth: f32, taps: &[f32]) -> (Direction, ImpulseResponse) {
        (
            Direction::azimuth(azimuth),
            ImpulseResponse::new(taps.to_vec(), taps.to_vec()),
        )
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(matches!(
            Measurements::new(Vec::new(), 48000),
            Err(LoadError::Empty)
        ));
    }

    #[test]
    fn zero_length_responses_are_rejected() {
        assert!(matches!(
            Measurements::new(vec![entry(0.0, &[])], 48000),
            Err(LoadError::Empty)
        ));
    }

    #[test]
    fn channel_length_mismatch_is_rejected() {
        let entries = vec![
            entry(0.0, &[1.0]),
            (
                Direction::azimuth(90.0),
                ImpulseResponse::new(vec![1.0, 0.0], vec![1.0]),
            ),
        ];

        match Measurements::new(entries, 48000) {
            Err(LoadError::ChannelLengthMismatch {
                azimuth,
                left,
                right,
            }) => {
                assert_eq!(azimuth, 90.0);
                assert_eq!((left, right), (2, 1));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn shorter_responses_are_padded() {
        let set = Measurements::new(vec![entry(0.0, &[1.0]), entry(90.0, &[0.5, 0.25, 0.125])], 44100)
            .unwrap();

        assert_eq!(set.filter_len(), 3);
        assert_eq!(&*set.response(0).left, &[1.0, 0.0, 0.0]);
        assert_eq!(&*set.response(1).right, &[0.5, 0.25, 0.125]);
        assert_eq!(set.sample_rate(), 44100);
    }

    #[test]
    fn nearest_prefers_first_on_ties() {
        let set = Measurements::new(vec![entry(90.0, &[1.0]), entry(180.0, &[1.0])], 48000).unwrap();

        assert_eq!(set.nearest_by(|d| (d.azimuth - 135.0).abs()), 0);
        assert_eq!(set.nearest_by(|d| (d.azimuth - 136.0).abs()), 1);
    }

    #[test]
    fn nearest_ignores_nan_distances() {
        let set = Measurements::new(vec![entry(0.0, &[1.0]), entry(10.0, &[1.0])], 48000).unwrap();
        assert_eq!(set.nearest_by(|_| f32::NAN), 0);
    }
}
