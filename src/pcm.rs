//! PCM helpers shared by the dataset loaders and the renderer: mono decode
//! with channel downmix, the stereo overlap-add accumulator and an atomic
//! stereo WAV writer.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Mono floating point samples at a known sample rate.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a WAV file into a mono buffer.
///
/// Integer samples are scaled to `[-1, 1]`, multichannel files are averaged
/// frame by frame.
pub fn read_mono<P: AsRef<Path>>(path: P) -> Result<AudioBuffer, hound::Error> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(AudioBuffer::new(
        downmix(interleaved, spec.channels as usize),
        spec.sample_rate,
    ))
}

/// Average interleaved frames into one channel.
pub fn downmix(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }

    let scale = 1.0 / channels as f32;

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect()
}

/// Two channel accumulator the renderer overlap-adds convolved blocks into.
#[derive(Clone, Debug, PartialEq)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBuffer {
    pub fn zeroed(len: usize) -> Self {
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Add `left` and `right` into the buffer starting at `offset`.
    ///
    /// # Panics
    ///
    /// This method panics if either slice reaches past the end of the buffer.
    pub fn accumulate(&mut self, offset: usize, left: &[f32], right: &[f32]) {
        for (acc, x) in Iterator::zip(self.left[offset..offset + left.len()].iter_mut(), left) {
            *acc += x;
        }

        for (acc, x) in Iterator::zip(self.right[offset..offset + right.len()].iter_mut(), right) {
            *acc += x;
        }
    }

    /// Largest absolute sample across both channels
    pub fn peak(&self) -> f32 {
        Iterator::chain(self.left.iter(), self.right.iter()).fold(0.0, |acc, x| acc.max(x.abs()))
    }

    /// Scale both channels so the peak becomes 1.0. Silent buffers are left
    /// untouched. Returns the peak found before scaling.
    pub fn normalize(&mut self) -> f32 {
        let peak = self.peak();

        if peak > 0.0 {
            for sample in self.left.iter_mut().chain(self.right.iter_mut()) {
                *sample /= peak;
            }
        }

        peak
    }

    /// Interleaved `[l0, r0, l1, r1, ...]` frames
    pub fn frames(&self) -> impl Iterator<Item = [f32; 2]> + '_ {
        Iterator::zip(self.left.iter(), self.right.iter()).map(|(l, r)| [*l, *r])
    }
}

/// Sample encoding of rendered output files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// 16 bit signed integer PCM
    #[default]
    Pcm16,
    /// 24 bit signed integer PCM
    Pcm24,
    /// 32 bit IEEE float
    Float32,
}

impl OutputFormat {
    fn spec(self, sample_rate: u32) -> WavSpec {
        let (bits_per_sample, sample_format) = match self {
            OutputFormat::Pcm16 => (16, SampleFormat::Int),
            OutputFormat::Pcm24 => (24, SampleFormat::Int),
            OutputFormat::Float32 => (32, SampleFormat::Float),
        };

        WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

/// Write `buffer` as a stereo WAV file.
///
/// Samples land in a temporary file next to `path` which is renamed over
/// `path` only once the WAV header has been finalized; on any failure the
/// temporary file is removed and `path` is not touched.
pub fn write_stereo<P: AsRef<Path>>(
    path: P,
    buffer: &StereoBuffer,
    sample_rate: u32,
    format: OutputFormat,
) -> Result<(), hound::Error> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = tempfile::Builder::new();

    // the rename keeps the temporary file mode, request what `File::create` gets
    #[cfg(unix)]
    builder.permissions(std::os::unix::fs::PermissionsExt::from_mode(0o666));

    let mut tmp = builder.tempfile_in(dir)?;
    write_frames(tmp.as_file_mut(), buffer, format.spec(sample_rate), format)?;

    tmp.persist(path)
        .map_err(|err| hound::Error::IoError(err.error))?;

    Ok(())
}

fn write_frames(
    file: &mut File,
    buffer: &StereoBuffer,
    spec: WavSpec,
    format: OutputFormat,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::new(BufWriter::new(file), spec)?;

    for frame in buffer.frames() {
        for sample in frame {
            let sample = sample.clamp(-1.0, 1.0);

            match format {
                OutputFormat::Pcm16 => writer.write_sample((sample * i16::MAX as f32) as i16)?,
                OutputFormat::Pcm24 => writer.write_sample((sample * 8_388_607.0) as i32)?,
                OutputFormat::Float32 => writer.write_sample(sample)?,
            }
        }
    }

    writer.finalize()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Write interleaved float samples to a WAV fixture.
    pub(crate) fn write_fixture(path: &Path, channels: u16, sample_rate: u32, samples: &[f32]) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let mut writer = WavWriter::create(path, spec).unwrap();
        for sample in samples {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn downmix_averages_frames() {
        let mono = downmix(vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn downmix_mono_is_identity() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix(input.clone(), 1), input);
    }

    #[test]
    fn read_int_stereo_file_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");

        let spec = WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [16384i16, 0, -16384, -16384] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let audio = read_mono(&path).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.len(), 2);
        assert_approx_eq!(audio.samples[0], 0.25, 1e-6);
        assert_approx_eq!(audio.samples[1], -0.5, 1e-6);
    }

    #[test]
    fn accumulate_sums_overlapping_regions() {
        let mut acc = StereoBuffer::zeroed(5);
        acc.accumulate(0, &[1.0, 1.0, 1.0], &[2.0, 2.0, 2.0]);
        acc.accumulate(2, &[1.0, 1.0, 1.0], &[-2.0, -2.0, -2.0]);

        assert_eq!(acc.left, vec![1.0, 1.0, 2.0, 1.0, 1.0]);
        assert_eq!(acc.right, vec![2.0, 2.0, 0.0, -2.0, -2.0]);
    }

    #[test]
    fn normalize_scales_to_unit_peak() {
        let mut acc = StereoBuffer {
            left: vec![0.5, -2.0],
            right: vec![1.0, 0.25],
        };

        assert_eq!(acc.normalize(), 2.0);
        assert_eq!(acc.left, vec![0.25, -1.0]);
        assert_eq!(acc.right, vec![0.5, 0.125]);
    }

    #[test]
    fn normalize_keeps_silence() {
        let mut acc = StereoBuffer::zeroed(4);
        assert_eq!(acc.normalize(), 0.0);
        assert!(acc.frames().all(|[l, r]| l == 0.0 && r == 0.0));
    }

    #[test]
    fn write_stereo_float_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let buffer = StereoBuffer {
            left: vec![0.0, 0.5, -1.0],
            right: vec![1.0, -0.5, 0.25],
        };

        write_stereo(&path, &buffer, 44100, OutputFormat::Float32).unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44100);

        let samples = reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(samples, vec![0.0, 1.0, 0.5, -0.5, -1.0, 0.25]);

        // only the output file remains, no leftovers from the temp file
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn write_stereo_pcm16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out16.wav");

        let buffer = StereoBuffer {
            left: vec![1.0],
            right: vec![-1.0],
        };

        write_stereo(&path, &buffer, 8000, OutputFormat::Pcm16).unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(samples, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn write_stereo_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.wav");

        let err = write_stereo(&path, &StereoBuffer::zeroed(1), 8000, OutputFormat::Pcm16);
        assert!(matches!(err, Err(hound::Error::IoError(_))));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn write_stereo_keeps_default_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let reference = dir.path().join("reference");

        write_stereo(&path, &StereoBuffer::zeroed(2), 8000, OutputFormat::Pcm16).unwrap();
        File::create(&reference).unwrap();

        let mode = |path: &Path| std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), mode(&reference));
    }
}
