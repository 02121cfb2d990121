//! Full linear convolution of one audio block against an impulse response
//! pair, computed in the frequency domain.
//!
//! The FFT size is the next power of two that holds `block_len + filter_len - 1`
//! samples, so a single transform per block produces the complete, un-aliased
//! result including the tail that the renderer overlap-adds into the next
//! blocks.

use std::sync::Arc;

use crate::dataset::ImpulseResponse;

use realfft::num_complex::Complex;
use realfft::num_traits::Zero;
use realfft::{ComplexToReal, FftError, RealFftPlanner, RealToComplex};

/// Frequency domain image of an [`ImpulseResponse`], reusable across blocks.
#[derive(Clone, Debug)]
pub struct FilterSpectrum {
    left: Box<[Complex<f32>]>,
    right: Box<[Complex<f32>]>,
}

#[derive(Clone)]
pub struct Convolver {
    /// Longest input block accepted by `process`
    block_len: usize,
    /// Length of the impulse responses
    filter_len: usize,
    /// FFT size
    fft_len: usize,
    /// Real FFT module
    rfft: Arc<dyn RealToComplex<f32>>,
    /// Inverse FFT module
    ifft: Arc<dyn ComplexToReal<f32>>,
    /// RFFT scratch memory
    rfft_scratch: Vec<Complex<f32>>,
    /// IFFT scratch memory
    ifft_scratch: Vec<Complex<f32>>,
    /// zero padded time domain buffer
    scratch: Box<[f32]>,
    /// spectrum of the current input block
    input: Box<[Complex<f32>]>,
    /// point wise product handed to the inverse transform
    acc: Box<[Complex<f32>]>,
}

impl Convolver {
    /// # Panics
    ///
    /// This method panics if `block_len` or `filter_len` is zero.
    pub fn new(block_len: usize, filter_len: usize) -> Self {
        assert!(block_len > 0 && filter_len > 0);

        let fft_len = (block_len + filter_len - 1).next_power_of_two();
        let spectra_len = fft_len / 2 + 1;

        let mut planner = RealFftPlanner::<f32>::new();
        let rfft = planner.plan_fft_forward(fft_len);
        let ifft = planner.plan_fft_inverse(fft_len);

        let rfft_scratch = rfft.make_scratch_vec();
        let ifft_scratch = ifft.make_scratch_vec();

        Convolver {
            block_len,
            filter_len,
            fft_len,
            rfft,
            ifft,
            rfft_scratch,
            ifft_scratch,
            scratch: vec![0.0; fft_len].into_boxed_slice(),
            input: vec![Complex::zero(); spectra_len].into_boxed_slice(),
            acc: vec![Complex::zero(); spectra_len].into_boxed_slice(),
        }
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn filter_len(&self) -> usize {
        self.filter_len
    }

    pub fn fft_len(&self) -> usize {
        self.fft_len
    }

    /// Number of samples `process` writes for an input of `input_len` samples
    pub fn output_len(&self, input_len: usize) -> usize {
        input_len + self.filter_len - 1
    }

    /// Transform both ears of `ir` for use with [`process`](Self::process).
    ///
    /// # Panics
    ///
    /// This method panics if `ir` is longer than the filter length the
    /// convolver was built for.
    pub fn transform(&mut self, ir: &ImpulseResponse) -> Result<FilterSpectrum, FftError> {
        Ok(FilterSpectrum {
            left: self.spectrum(&ir.left)?,
            right: self.spectrum(&ir.right)?,
        })
    }

    /// Convolve `input` with both ears of `filter`.
    ///
    /// # Panics
    ///
    /// This method panics if:
    /// - `input.len() > self.block_len()`
    /// - `left.len() != self.output_len(input.len())`
    /// - `right.len() != self.output_len(input.len())`
    pub fn process(
        &mut self,
        input: &[f32],
        filter: &FilterSpectrum,
        left: &mut [f32],
        right: &mut [f32],
    ) -> Result<(), FftError> {
        assert!(input.len() <= self.block_len);
        assert_eq!(left.len(), self.output_len(input.len()));
        assert_eq!(right.len(), self.output_len(input.len()));

        self.scratch[..input.len()].copy_from_slice(input);
        self.scratch[input.len()..].fill(0.0);

        self.rfft
            .process_with_scratch(&mut self.scratch, &mut self.input, &mut self.rfft_scratch)?;

        self.apply(&filter.left, left)?;
        self.apply(&filter.right, right)?;

        Ok(())
    }

    fn spectrum(&mut self, taps: &[f32]) -> Result<Box<[Complex<f32>]>, FftError> {
        assert!(taps.len() <= self.filter_len);

        let mut h = vec![Complex::zero(); self.fft_len / 2 + 1].into_boxed_slice();

        self.scratch[..taps.len()].copy_from_slice(taps);
        self.scratch[taps.len()..].fill(0.0);

        self.rfft
            .process_with_scratch(&mut self.scratch, &mut h, &mut self.rfft_scratch)?;

        Ok(h)
    }

    fn apply(&mut self, h: &[Complex<f32>], y: &mut [f32]) -> Result<(), FftError> {
        let scale = 1.0 / self.fft_len as f32;

        for (acc, (x, h)) in Iterator::zip(
            self.acc.iter_mut(),
            Iterator::zip(self.input.iter(), h.iter()),
        ) {
            *acc = x * h;
        }

        // dc and nyquist bins of a real signal carry no imaginary part
        let last = self.acc.len() - 1;
        self.acc[0].im = 0.0;
        self.acc[last].im = 0.0;

        self.ifft
            .process_with_scratch(&mut self.acc, &mut self.scratch, &mut self.ifft_scratch)?;

        for (y, x) in Iterator::zip(y.iter_mut(), self.scratch.iter()) {
            *y = x * scale;
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    pub(crate) fn convolve_from_definition(x: &[f32], h: &[f32]) -> Vec<f32> {
        let mut y = vec![0.0; x.len() + h.len() - 1];

        for (i, x) in x.iter().enumerate() {
            for (j, h) in h.iter().enumerate() {
                y[i + j] += x * h;
            }
        }

        y
    }

    #[must_use]
    struct ConvTest {
        filter_len: usize,
        input_len: usize,
        block_len: usize,
    }

    impl Default for ConvTest {
        fn default() -> Self {
            Self {
                filter_len: 256,
                input_len: 128,
                block_len: 128,
            }
        }
    }

    impl ConvTest {
        fn filter_len(mut self, filter_len: usize) -> Self {
            self.filter_len = filter_len;
            self
        }

        fn block_len(mut self, block_len: usize) -> Self {
            self.block_len = block_len;
            self
        }

        fn input_len(mut self, input_len: usize) -> Self {
            self.input_len = input_len;
            self
        }

        fn run(&self) {
            let mut convolver = Convolver::new(self.block_len, self.filter_len);

            assert_eq!(convolver.block_len(), self.block_len);
            assert_eq!(convolver.filter_len(), self.filter_len);
            assert!(convolver.fft_len().is_power_of_two());
            assert!(convolver.fft_len() >= self.block_len + self.filter_len - 1);
            assert!(convolver.fft_len() / 2 < self.block_len + self.filter_len - 1);

            let input = (1..=self.input_len)
                .map(|v| (v as f32 * 0.37).sin())
                .collect::<Vec<_>>();
            let taps_left = (1..=self.filter_len)
                .map(|v| 1.0 / v as f32)
                .collect::<Vec<_>>();
            let taps_right = (1..=self.filter_len)
                .map(|v| (v as f32 * 0.11).cos())
                .collect::<Vec<_>>();

            let ir = ImpulseResponse::new(taps_left.clone(), taps_right.clone());
            let filter = convolver.transform(&ir).expect("filter transformed");

            let out_len = convolver.output_len(self.input_len);
            let mut left = vec![0.0; out_len];
            let mut right = vec![0.0; out_len];

            convolver
                .process(&input, &filter, &mut left, &mut right)
                .expect("block convolved");

            let expected = convolve_from_definition(&input, &taps_left);
            for (a, b) in Iterator::zip(expected.iter(), left.iter()) {
                assert_approx_eq!(a, b, 1e-3);
            }

            let expected = convolve_from_definition(&input, &taps_right);
            for (a, b) in Iterator::zip(expected.iter(), right.iter()) {
                assert_approx_eq!(a, b, 1e-3);
            }
        }
    }

    #[test]
    fn conv_default() {
        ConvTest::default().run();
    }

    #[test]
    fn conv_long_kernel() {
        ConvTest::default()
            .filter_len(4096)
            .block_len(256)
            .input_len(256)
            .run();
    }

    #[test]
    fn conv_short_kernel() {
        ConvTest::default()
            .filter_len(16)
            .block_len(4410)
            .input_len(4410)
            .run();
    }

    #[test]
    fn conv_partial_block() {
        ConvTest::default()
            .filter_len(200)
            .block_len(4410)
            .input_len(1234)
            .run();
    }

    #[test]
    fn conv_single_tap() {
        ConvTest::default().filter_len(1).input_len(100).block_len(100).run();
    }

    #[test]
    fn conv_single_sample_input() {
        ConvTest::default().filter_len(33).input_len(1).block_len(64).run();
    }

    #[test]
    fn unit_impulse_is_identity() {
        let mut convolver = Convolver::new(8, 1);
        let filter = convolver
            .transform(&ImpulseResponse::new(vec![1.0], vec![-1.0]))
            .unwrap();

        let input = [0.5, -0.25, 1.0, 0.0, 0.75];
        let mut left = [0.0; 5];
        let mut right = [0.0; 5];

        convolver
            .process(&input, &filter, &mut left, &mut right)
            .unwrap();

        for ((x, l), r) in input.iter().zip(left.iter()).zip(right.iter()) {
            assert_approx_eq!(x, l, 1e-6);
            assert_approx_eq!(-x, r, 1e-6);
        }
    }

    #[test]
    #[should_panic]
    fn oversized_block_panics() {
        let mut convolver = Convolver::new(4, 2);
        let filter = convolver
            .transform(&ImpulseResponse::new(vec![1.0, 0.0], vec![1.0, 0.0]))
            .unwrap();

        let mut left = [0.0; 6];
        let mut right = [0.0; 6];
        let _ = convolver.process(&[0.0; 5], &filter, &mut left, &mut right);
    }
}
