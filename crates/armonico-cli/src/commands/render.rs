//! Offline rendering command: notes in, WAV file out.
//!
//! Runs the full engine (fill workers included) block by block, so an
//! offline render exercises exactly the code path the real-time host does.

use super::load_params;
use anyhow::Context;
use armonico_core::{AdditiveKernel, BLOCK_SIZE, DEFAULT_POLYPHONY, NUM_CHANNELS, SAMPLE_RATE};
use armonico_engine::{AudioBlock, Engine};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// MIDI note to play (repeat for a chord)
    #[arg(short, long, default_values_t = vec![69u8])]
    note: Vec<u8>,

    /// Held duration in seconds before release
    #[arg(long, default_value = "1.0")]
    duration: f32,

    /// Maximum tail rendered after release, in seconds
    #[arg(long, default_value = "3.0")]
    tail: f32,

    /// Preset TOML file of synthesis parameters
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Override the preset's output gain
    #[arg(long)]
    gain: Option<f32>,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let mut params = load_params(args.preset.as_deref())?;
    if let Some(gain) = args.gain {
        params.gain = gain;
    }

    let kernel = Arc::new(AdditiveKernel::with_params(DEFAULT_POLYPHONY, params));
    let mut engine = Engine::new(kernel, SAMPLE_RATE)?;

    let held_blocks = blocks_for_seconds(args.duration);
    let tail_blocks = blocks_for_seconds(args.tail);

    println!(
        "Rendering {:?} for {:.2}s (+ up to {:.2}s tail) to {}...",
        args.note,
        args.duration,
        args.tail,
        args.output.display()
    );

    let spec = hound::WavSpec {
        channels: NUM_CHANNELS as u16,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)
        .with_context(|| format!("failed to create '{}'", args.output.display()))?;

    for &note in &args.note {
        engine.note_on(note, 1.0);
    }

    let pb = ProgressBar::new((held_blocks + tail_blocks) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} blocks")
            .unwrap()
            .progress_chars("##-"),
    );

    let mut interleaved = vec![0.0f32; BLOCK_SIZE * NUM_CHANNELS];
    let mut peak = 0.0f32;
    for block_index in 0..held_blocks + tail_blocks {
        if block_index == held_blocks {
            for &note in &args.note {
                engine.note_off(note, 0.0);
            }
        }

        let mut block = AudioBlock::stereo(BLOCK_SIZE);
        engine.render_next_block(&mut block, 0, BLOCK_SIZE);
        peak = peak.max(block.peak());

        block.write_interleaved(&mut interleaved);
        for &sample in &interleaved {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * f32::from(i16::MAX)) as i16)?;
        }
        pb.inc(1);

        // Every voice ended naturally: the remaining tail is silence.
        if block_index >= held_blocks && engine.active_voice_count() == 0 {
            break;
        }
    }
    pb.finish_and_clear();
    writer.finalize().context("failed to finalize WAV")?;

    println!("Done (peak {:.3}).", peak);
    if peak > 1.0 {
        println!("Warning: output clipped; try a lower --gain.");
    }
    Ok(())
}

fn blocks_for_seconds(seconds: f32) -> usize {
    ((seconds.max(0.0) * SAMPLE_RATE) / BLOCK_SIZE as f32).ceil() as usize
}
