//! `SOFA` container loader built on the [`libmysofa`] C library.
//!
//! The whole `SourcePosition` and `DataIR` arrays are copied out of the
//! container at load time, the native handle is released before
//! [`OpenOptions::open`] returns.
//!
//! [`libmysofa`]: https://github.com/hoene/libmysofa

use std::{ffi::CString, fs, io, path::Path, slice};

use super::{Dataset, Direction, ImpulseResponse, Measurements};
use crate::error::{Error, LoadError, SofaError};

const DEFAULT_NORMALIZED: bool = false;

#[derive(Clone, Debug)]
pub struct OpenOptions {
    sample_rate: Option<f32>,
    normalized: bool,
}

impl OpenOptions {
    pub fn new() -> Self {
        Default::default()
    }

    /// Resample HRIR data to `sample_rate` on load. By default the data is
    /// kept at the rate stored in the container.
    pub fn sample_rate(&mut self, sample_rate: f32) -> &mut Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Apply loudness normalization upon opening a SOFA file. Default value
    /// is `false`.
    pub fn normalized(&mut self, normalized: bool) -> &mut Self {
        self.normalized = normalized;
        self
    }

    /// Open a SOFA file at `path` with open options specified in `self`
    ///
    /// ```no_run
    /// use binorbit::dataset::OpenOptions;
    ///
    /// let hrirs = OpenOptions::new()
    ///     .sample_rate(44100.0)
    ///     .open("my/sofa/file.sofa")
    ///     .unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<SofaDataset, Error> {
        let path = path.as_ref();
        self.load(path).map_err(|source| Error::load(path, source))
    }

    fn load(&self, path: &Path) -> Result<SofaDataset, LoadError> {
        // libmysofa reports a missing file as a generic read error
        fs::metadata(path)?;

        let hrtf = RawHrtf::load(path)?;

        unsafe {
            check(ffi::mysofa_check(hrtf.0))?;
            ffi::mysofa_tospherical(hrtf.0);

            if let Some(sample_rate) = self.sample_rate {
                check(ffi::mysofa_resample(hrtf.0, sample_rate))?;
            }

            if self.normalized {
                ffi::mysofa_loudness(hrtf.0);
            }
        }

        let raw = unsafe { &*hrtf.0 };

        let positions = unsafe { values(&raw.SourcePosition) };
        let data_ir = unsafe { values(&raw.DataIR) };
        let sample_rate = unsafe { values(&raw.DataSamplingRate) }
            .first()
            .copied()
            .unwrap_or_default();

        let dataset = SofaDataset::from_raw_parts(
            positions,
            raw.C as usize,
            data_ir,
            raw.R as usize,
            raw.N as usize,
            sample_rate.round() as u32,
        )?;

        log::info!(
            "Loaded {} HRIR measurements ({} taps, {} Hz) from {}",
            dataset.len(),
            dataset.filter_len(),
            dataset.sample_rate(),
            path.display()
        );

        Ok(dataset)
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            sample_rate: None,
            normalized: DEFAULT_NORMALIZED,
        }
    }
}

/// HRIR dataset read from a `SOFA` container.
///
/// Each measurement contributes one entry keyed by its source position
/// (azimuth, elevation). Receivers 0 and 1 are taken as left and right ear.
///
/// Lookups use the Euclidean distance over `(azimuth, elevation)` treated as
/// plane coordinates. This approximates angular distance and degrades close to
/// the poles and across the azimuth wrap.
#[derive(Clone, Debug)]
pub struct SofaDataset {
    measurements: Measurements,
}

impl SofaDataset {
    /// Open a SOFA file with the default open options
    ///
    /// ```no_run
    /// use binorbit::dataset::SofaDataset;
    ///
    /// let hrirs = SofaDataset::open("my/sofa/file.sofa").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SofaDataset, Error> {
        OpenOptions::new().open(path)
    }

    /// Assemble a dataset from container arrays.
    ///
    /// `positions` is `M x coords` spherical source positions, `data_ir` is
    /// `M x receivers x taps` impulse responses.
    pub(crate) fn from_raw_parts(
        positions: &[f32],
        coords: usize,
        data_ir: &[f32],
        receivers: usize,
        taps: usize,
        sample_rate: u32,
    ) -> Result<SofaDataset, LoadError> {
        if receivers < 2 {
            return Err(LoadError::MissingReceivers(receivers));
        }

        if coords < 2 {
            return Err(SofaError::InvalidDimensions.into());
        }

        let measurements = positions.len() / coords;

        if data_ir.len() < measurements * receivers * taps {
            return Err(SofaError::InvalidDimensions.into());
        }

        let entries = positions
            .chunks_exact(coords)
            .zip(data_ir.chunks_exact(receivers * taps))
            .map(|(position, ir)| {
                (
                    Direction::new(position[0], position[1]),
                    ImpulseResponse::new(&ir[..taps], &ir[taps..2 * taps]),
                )
            })
            .collect();

        Ok(SofaDataset {
            measurements: Measurements::new(entries, sample_rate)?,
        })
    }
}

impl Dataset for SofaDataset {
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
        self.measurements.nearest_by(|stored| {
            f32::hypot(
                stored.azimuth - direction.azimuth,
                stored.elevation - direction.elevation,
            )
        })
    }

    fn response(&self, index: usize) -> &ImpulseResponse {
        self.measurements.response(index)
    }

    fn direction(&self, index: usize) -> Direction {
        self.measurements.direction(index)
    }
}

/// Owned `MYSOFA_HRTF` handle, freed on drop.
struct RawHrtf(*mut ffi::MYSOFA_HRTF);

impl RawHrtf {
    fn load(path: &Path) -> Result<RawHrtf, LoadError> {
        let path = cstr(path)?;
        let mut err = 0;

        let raw = unsafe { ffi::mysofa_load(path.as_ptr(), &mut err) };

        if raw.is_null() || err != ffi::MYSOFA_OK {
            if !raw.is_null() {
                unsafe { ffi::mysofa_free(raw) };
            }

            return Err(SofaError::from_raw(err).into());
        }

        Ok(RawHrtf(raw))
    }
}

impl Drop for RawHrtf {
    fn drop(&mut self) {
        unsafe { ffi::mysofa_free(self.0) }
    }
}

fn check(err: i32) -> Result<(), SofaError> {
    match err {
        ffi::MYSOFA_OK => Ok(()),
        err => Err(SofaError::from_raw(err)),
    }
}

/// # Safety
///
/// `array` must belong to a live `MYSOFA_HRTF` and the returned slice must not
/// outlive it.
unsafe fn values(array: &ffi::MYSOFA_ARRAY) -> &[f32] {
    if array.values.is_null() || array.elements == 0 {
        return &[];
    }

    slice::from_raw_parts(array.values, array.elements as usize)
}

#[cfg(unix)]
fn cstr(path: &Path) -> io::Result<CString> {
    use std::os::unix::ffi::OsStrExt;
    Ok(CString::new(path.as_os_str().as_bytes())?)
}

#[cfg(not(unix))]
fn cstr(path: &Path) -> io::Result<CString> {
    let path = path
        .to_str()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Path is not valid UTF-8"))?;
    Ok(CString::new(path)?)
}
