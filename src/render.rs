//! Rotating binaural renderer.
//!
//! The input is cut into fixed length blocks. Every block is assigned the
//! azimuth a source circling the listener at a constant speed would have at
//! the block's temporal midpoint, convolved with the nearest measured HRIR
//! pair and overlap-added into a stereo accumulator. The accumulator is peak
//! normalized before it is handed back or written out.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::convolve::{Convolver, FilterSpectrum};
use crate::dataset::{Dataset, Direction};
use crate::error::Error;
use crate::pcm::{self, AudioBuffer, OutputFormat, StereoBuffer};
use crate::progress::{CancelToken, Progress, Silent, Stage};

const DEFAULT_BLOCK_DURATION: f64 = 0.1;
const DEFAULT_ROTATION_PERIOD: f64 = 10.0;
const DEFAULT_ELEVATION: f32 = 0.0;
const DEFAULT_PROGRESS_STEP: u8 = 10;

/// Constant speed sweep around the listener.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotation {
    period: f64,
}

impl Rotation {
    /// One full turn every `period` seconds
    pub fn new(period: f64) -> Self {
        Self { period }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Azimuth in degrees, in `[0, 360)`, at `t` seconds
    pub fn angle_at(&self, t: f64) -> f32 {
        let angle = (360.0 * (t / self.period)).rem_euclid(360.0) as f32;

        // values just below 360 may round up when narrowed
        if angle >= 360.0 {
            0.0
        } else {
            angle
        }
    }
}

#[must_use]
pub struct RendererBuilder {
    block_duration: f64,
    rotation_period: f64,
    elevation: f32,
    output_format: OutputFormat,
    progress_step: u8,
}

impl RendererBuilder {
    fn new() -> RendererBuilder {
        RendererBuilder {
            block_duration: DEFAULT_BLOCK_DURATION,
            rotation_period: DEFAULT_ROTATION_PERIOD,
            elevation: DEFAULT_ELEVATION,
            output_format: OutputFormat::default(),
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }

    /// Set the amount of audio in seconds convolved with a single HRIR.
    /// Default value is 0.1.
    pub fn with_block_duration(mut self, block_duration: f64) -> Self {
        self.block_duration = block_duration;
        self
    }

    /// Set the time in seconds one full turn around the listener takes.
    /// Default value is 10.0.
    pub fn with_rotation_period(mut self, rotation_period: f64) -> Self {
        self.rotation_period = rotation_period;
        self
    }

    /// Set the elevation in degrees used for dataset lookups. Default value is
    /// 0.0.
    pub fn with_elevation(mut self, elevation: f32) -> Self {
        self.elevation = elevation;
        self
    }

    /// Set the sample encoding of files written by
    /// [`render_file`](Renderer::render_file). Default is 16 bit PCM.
    pub fn with_output_format(mut self, output_format: OutputFormat) -> Self {
        self.output_format = output_format;
        self
    }

    /// Set how many percent of rendered blocks pass between two progress
    /// reports. Default value is 10.
    pub fn with_progress_step(mut self, progress_step: u8) -> Self {
        self.progress_step = progress_step;
        self
    }

    /// Try to build [Renderer](crate::render::Renderer)
    ///
    /// This will fail if the block duration or rotation period is not a
    /// positive finite number, or the progress step is outside `1..=100`.
    pub fn build(self) -> Result<Renderer, Error> {
        if !(self.block_duration.is_finite() && self.block_duration > 0.0) {
            return Err(Error::InvalidOptions("block duration must be positive"));
        }

        if !(self.rotation_period.is_finite() && self.rotation_period > 0.0) {
            return Err(Error::InvalidOptions("rotation period must be positive"));
        }

        if !self.elevation.is_finite() {
            return Err(Error::InvalidOptions("elevation must be finite"));
        }

        if !(1..=100).contains(&self.progress_step) {
            return Err(Error::InvalidOptions("progress step must be within 1..=100"));
        }

        Ok(Renderer {
            block_duration: self.block_duration,
            rotation: Rotation::new(self.rotation_period),
            elevation: self.elevation,
            output_format: self.output_format,
            progress_step: self.progress_step,
        })
    }
}

/// Block geometry of one render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub block_len: usize,
    pub num_blocks: usize,
    pub filter_len: usize,
}

impl Layout {
    /// `num_blocks * block_len + filter_len - 1`
    pub fn output_len(&self) -> usize {
        self.num_blocks * self.block_len + self.filter_len - 1
    }
}

/// What a single block is rendered with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Block {
    /// First input sample of the block
    pub offset: usize,
    /// Number of input samples, shorter than `block_len` only for the tail
    pub len: usize,
    /// Source azimuth at the block midpoint
    pub angle: f32,
    /// Dataset measurement the block is convolved with
    pub entry: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    pub layout: Layout,
    pub blocks: Vec<Block>,
}

#[derive(Clone, Debug)]
pub struct Renderer {
    block_duration: f64,
    rotation: Rotation,
    elevation: f32,
    output_format: OutputFormat,
    progress_step: u8,
}

impl Renderer {
    /// Get default [`renderer builder`](crate::render::RendererBuilder)
    pub fn builder() -> RendererBuilder {
        RendererBuilder::new()
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Samples per block at `sample_rate`
    pub fn block_len(&self, sample_rate: u32) -> usize {
        (sample_rate as f64 * self.block_duration).round() as usize
    }

    /// Assign an angle and a dataset measurement to every block of an input
    /// of `input_len` samples.
    pub fn plan<D>(&self, input_len: usize, sample_rate: u32, dataset: &D) -> Result<Plan, Error>
    where
        D: Dataset + ?Sized,
    {
        if dataset.is_empty() || dataset.filter_len() == 0 {
            return Err(Error::EmptyDataset);
        }

        let block_len = self.block_len(sample_rate);

        if block_len == 0 {
            return Err(Error::InvalidOptions(
                "block duration is shorter than one sample",
            ));
        }

        let num_blocks = input_len.div_ceil(block_len);
        let filter_len = dataset.filter_len();

        // output buffer and per-block FFT size must both be addressable
        let tail = filter_len - 1;
        let fits = num_blocks
            .checked_mul(block_len)
            .and_then(|len| len.checked_add(tail))
            .is_some()
            && block_len
                .checked_add(tail)
                .and_then(usize::checked_next_power_of_two)
                .is_some();

        if !fits {
            return Err(Error::InvalidOptions(
                "block duration is too long for the dataset filter length",
            ));
        }

        let sample_rate = sample_rate as f64;

        let blocks = (0..num_blocks)
            .map(|i| {
                let offset = i * block_len;
                let len = block_len.min(input_len - offset);
                let midpoint = (offset as f64 + len as f64 / 2.0) / sample_rate;
                let angle = self.rotation.angle_at(midpoint);
                let entry = dataset.nearest(Direction::new(angle, self.elevation));

                Block {
                    offset,
                    len,
                    angle,
                    entry,
                }
            })
            .collect();

        Ok(Plan {
            layout: Layout {
                block_len,
                num_blocks,
                filter_len,
            },
            blocks,
        })
    }

    /// Render `audio` into a normalized stereo buffer.
    ///
    /// ```no_run
    /// use binorbit::dataset::WavPairDataset;
    /// use binorbit::pcm;
    /// use binorbit::render::Renderer;
    ///
    /// let hrirs = WavPairDataset::open("hrir/samrec").unwrap();
    /// let audio = pcm::read_mono("input.wav").unwrap();
    ///
    /// let stereo = Renderer::builder()
    ///     .build()
    ///     .unwrap()
    ///     .render(&audio, &hrirs)
    ///     .unwrap();
    /// ```
    pub fn render<D>(&self, audio: &AudioBuffer, dataset: &D) -> Result<StereoBuffer, Error>
    where
        D: Dataset + ?Sized,
    {
        self.render_with(audio, dataset, &Silent, &CancelToken::new())
    }

    /// Same as [`render`](Self::render), reporting progress to `progress` and
    /// giving up once `cancel` is triggered.
    pub fn render_with<D, P>(
        &self,
        audio: &AudioBuffer,
        dataset: &D,
        progress: &P,
        cancel: &CancelToken,
    ) -> Result<StereoBuffer, Error>
    where
        D: Dataset + ?Sized,
        P: Progress + ?Sized,
    {
        let plan = self.plan(audio.len(), audio.sample_rate, dataset)?;
        let layout = plan.layout;

        if dataset.sample_rate() != audio.sample_rate {
            log::warn!(
                "HRIR dataset is sampled at {} Hz, input at {} Hz",
                dataset.sample_rate(),
                audio.sample_rate
            );
        }

        log::debug!(
            "Rendering {} blocks of {} samples with {} tap filters",
            layout.num_blocks,
            layout.block_len,
            layout.filter_len
        );

        let mut output = StereoBuffer::zeroed(layout.output_len());

        if layout.num_blocks > 0 {
            let mut convolver = Convolver::new(layout.block_len, layout.filter_len);
            let spectra = transform_entries(&mut convolver, &plan, dataset)?;
            let tracker = Tracker::new(progress, self.progress_step, layout.num_blocks);

            convolve_blocks(
                convolver,
                &plan,
                &spectra,
                &audio.samples,
                &mut output,
                &tracker,
                cancel,
            )?;
        }

        let peak = output.normalize();
        log::debug!("Normalized output by a peak of {peak}");

        progress.report(Stage::Render, 100);

        Ok(output)
    }

    /// Render the WAV file at `input` into a stereo WAV file at `output`.
    ///
    /// Nothing is written to `output` unless the whole render succeeds.
    pub fn render_file<D, I, O>(&self, input: I, output: O, dataset: &D) -> Result<(), Error>
    where
        D: Dataset + ?Sized,
        I: AsRef<Path>,
        O: AsRef<Path>,
    {
        self.render_file_with(input, output, dataset, &Silent, &CancelToken::new())
    }

    /// Same as [`render_file`](Self::render_file), reporting progress to
    /// `progress` and giving up once `cancel` is triggered.
    pub fn render_file_with<D, P, I, O>(
        &self,
        input: I,
        output: O,
        dataset: &D,
        progress: &P,
        cancel: &CancelToken,
    ) -> Result<(), Error>
    where
        D: Dataset + ?Sized,
        P: Progress + ?Sized,
        I: AsRef<Path>,
        O: AsRef<Path>,
    {
        let input = input.as_ref();
        let output = output.as_ref();

        progress.report(Stage::Decode, 0);

        let audio = pcm::read_mono(input).map_err(|source| Error::Decode {
            path: input.to_owned(),
            source,
        })?;

        progress.report(Stage::Decode, 100);

        let stereo = self.render_with(&audio, dataset, progress, cancel)?;

        pcm::write_stereo(output, &stereo, audio.sample_rate, self.output_format).map_err(
            |source| Error::Write {
                path: output.to_owned(),
                source,
            },
        )?;

        progress.report(Stage::Write, 100);

        log::info!(
            "Rendered {} ({:.1} s) to {}",
            input.display(),
            audio.duration(),
            output.display()
        );

        Ok(())
    }
}

/// Transform every measurement the plan refers to, once.
fn transform_entries<D>(
    convolver: &mut Convolver,
    plan: &Plan,
    dataset: &D,
) -> Result<HashMap<usize, FilterSpectrum>, Error>
where
    D: Dataset + ?Sized,
{
    let mut spectra = HashMap::new();

    for block in &plan.blocks {
        if !spectra.contains_key(&block.entry) {
            let spectrum = convolver.transform(dataset.response(block.entry))?;
            spectra.insert(block.entry, spectrum);
        }
    }

    Ok(spectra)
}

#[cfg(not(feature = "parallel"))]
fn convolve_blocks<P>(
    mut convolver: Convolver,
    plan: &Plan,
    spectra: &HashMap<usize, FilterSpectrum>,
    samples: &[f32],
    output: &mut StereoBuffer,
    tracker: &Tracker<'_, P>,
    cancel: &CancelToken,
) -> Result<(), Error>
where
    P: Progress + ?Sized,
{
    let total = plan.blocks.len();
    let mut left = Vec::with_capacity(convolver.output_len(plan.layout.block_len));
    let mut right = Vec::with_capacity(left.capacity());

    for (completed, block) in plan.blocks.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { completed, total });
        }

        let input = &samples[block.offset..block.offset + block.len];
        let out_len = convolver.output_len(block.len);

        left.resize(out_len, 0.0);
        right.resize(out_len, 0.0);

        convolver.process(input, &spectra[&block.entry], &mut left, &mut right)?;
        output.accumulate(block.offset, &left, &right);

        tracker.advance();
    }

    Ok(())
}

/// Blocks are convolved on the rayon pool into separate buffers, then summed
/// into `output` in block order so the result matches the sequential path
/// bit for bit.
#[cfg(feature = "parallel")]
fn convolve_blocks<P>(
    convolver: Convolver,
    plan: &Plan,
    spectra: &HashMap<usize, FilterSpectrum>,
    samples: &[f32],
    output: &mut StereoBuffer,
    tracker: &Tracker<'_, P>,
    cancel: &CancelToken,
) -> Result<(), Error>
where
    P: Progress + ?Sized,
{
    use rayon::prelude::*;

    let total = plan.blocks.len();

    let rendered = plan
        .blocks
        .par_iter()
        .map_init(
            || convolver.clone(),
            |convolver, block| {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled {
                        completed: tracker.completed(),
                        total,
                    });
                }

                let input = &samples[block.offset..block.offset + block.len];
                let out_len = convolver.output_len(block.len);

                let mut left = vec![0.0; out_len];
                let mut right = vec![0.0; out_len];

                convolver.process(input, &spectra[&block.entry], &mut left, &mut right)?;
                tracker.advance();

                Ok((left, right))
            },
        )
        .collect::<Result<Vec<_>, Error>>()?;

    for (block, (left, right)) in Iterator::zip(plan.blocks.iter(), rendered.iter()) {
        output.accumulate(block.offset, left, right);
    }

    Ok(())
}

/// Turns completed block counts into monotonic percentage reports.
struct Tracker<'a, P: Progress + ?Sized> {
    progress: &'a P,
    step: usize,
    total: usize,
    /// completed blocks and last reported percentage
    state: Mutex<(usize, usize)>,
}

impl<'a, P: Progress + ?Sized> Tracker<'a, P> {
    fn new(progress: &'a P, step: u8, total: usize) -> Self {
        progress.report(Stage::Render, 0);

        Tracker {
            progress,
            step: step as usize,
            total,
            state: Mutex::new((0, 0)),
        }
    }

    fn advance(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };

        state.0 += 1;

        let percent = state.0 * 100 / self.total;
        let milestone = percent - percent % self.step;

        // the final 100 is reported once the output is normalized
        if milestone > state.1 && milestone < 100 {
            state.1 = milestone;
            self.progress.report(Stage::Render, milestone as u8);
        }
    }

    #[cfg(feature = "parallel")]
    fn completed(&self) -> usize {
        self.state.lock().map(|state| state.0).unwrap_or_default()
    }
}
