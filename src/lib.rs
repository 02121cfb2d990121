//! # Binorbit
//!
//! Offline rotating binaural ("8D") renderer.
//!
//! A mono signal, or the channel average of a multichannel one, is cut into
//! short blocks. Each block is convolved with the measured head related
//! impulse response (HRIR) closest to a source that circles the listener at a
//! constant speed, and the blocks are overlap-added into a peak normalized
//! stereo output.
//!
//! HRIRs come from a [`dataset`]: either a directory of per-angle WAV pairs
//! or a `SOFA` file (Spatially Oriented Format for Acoustics) read with
//! [`libmysofa`] when the `sofa` feature is enabled.
//!
//! [`libmysofa`]: https://github.com/hoene/libmysofa
//! [`dataset`]: `crate::dataset`
//!
//! # Example
//!
//! ```no_run
//! use binorbit::dataset::SofaDataset;
//! use binorbit::render::Renderer;
//!
//! // Load the whole container once, it can be shared by many renders
//! let hrirs = SofaDataset::open("my/sofa/file.sofa").unwrap();
//!
//! let renderer = Renderer::builder()
//!     .with_block_duration(0.1)
//!     .with_rotation_period(10.0)
//!     .build()
//!     .unwrap();
//!
//! renderer
//!     .render_file("input.wav", "output.wav", &hrirs)
//!     .unwrap();
//! ```

pub mod convolve;
pub mod dataset;
pub mod pcm;
pub mod progress;
pub mod render;

mod error;

pub use crate::error::{Error, LoadError};

#[cfg(feature = "sofa")]
pub use crate::error::SofaError;
