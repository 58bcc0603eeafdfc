//! Armonico Core - kernel seam and parameter model for the armonico
//! additive synthesizer.
//!
//! This crate holds everything the rendering engine and a synthesis backend
//! agree on, and nothing that runs on a thread of its own:
//!
//! # Core Abstractions
//!
//! ## Kernel Seam
//!
//! - [`SynthKernel`] - the backend contract: note start, block evaluation,
//!   parameter snapshots
//! - [`VoiceId`] - stable voice identity correlating engine voices to
//!   backend resources
//! - [`KernelError`] - block-evaluation failures, reported by value
//!
//! ## Parameter Model
//!
//! - [`ParameterStates`] - full snapshot of every editor-exposed parameter
//! - [`AdsrParams`], [`LfoParams`], [`EnvelopeParams`] - envelope building
//!   blocks
//! - [`DetuneParams`], [`EchoParams`], [`FilterParams`] - the remaining
//!   editor sections
//!
//! ## Reference Backend
//!
//! - [`AdditiveKernel`] - a deterministic CPU implementation of
//!   [`SynthKernel`], good enough to run and test the engine end-to-end
//!
//! # Block Geometry
//!
//! Blocks are fixed at compile time: [`BLOCK_SIZE`] frames of
//! [`NUM_CHANNELS`] interleaved channels at [`SAMPLE_RATE`] Hz. The engine
//! rejects hosts running at any other rate; varying rates are out of scope.
//!
//! # Example
//!
//! ```rust
//! use armonico_core::{AdditiveKernel, ParameterStates, SynthKernel, BLOCK_SAMPLES};
//!
//! let kernel = AdditiveKernel::new(4);
//! kernel.parameter_states_changed(&ParameterStates::default());
//! kernel.on_note_start(0);
//!
//! let mut block = vec![0.0f32; BLOCK_SAMPLES];
//! kernel
//!     .evaluate_voice_block(&mut block, 0, 0, 440.0 * core::f32::consts::TAU, false)
//!     .unwrap();
//! ```

pub mod additive;
pub mod kernel;
pub mod params;

pub use additive::AdditiveKernel;
pub use kernel::{KernelError, SynthKernel, VoiceId};
pub use params::{
    AdsrParams, DEFAULT_DELAY_MIX, DEFAULT_GAIN, DetuneParams, EchoParams, EnvelopeParams,
    FilterParams, LfoParams, ParameterStates, ParamsError,
};

/// Frames per synthesis block.
pub const BLOCK_SIZE: usize = 512;

/// Interleaved channels per frame.
pub const NUM_CHANNELS: usize = 2;

/// Samples per block (`BLOCK_SIZE * NUM_CHANNELS`).
pub const BLOCK_SAMPLES: usize = BLOCK_SIZE * NUM_CHANNELS;

/// The fixed sample rate, in Hz.
pub const SAMPLE_RATE: f32 = 44_100.0;

/// Additive partials in the parameter model.
pub const NUM_PARTIALS: usize = 16;

/// Default number of voices in an engine pool.
pub const DEFAULT_POLYPHONY: usize = 8;
