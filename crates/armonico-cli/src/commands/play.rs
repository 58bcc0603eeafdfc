//! Live playback command: the engine runs inside a cpal output callback.
//!
//! Note events travel from the main thread into the audio callback over a
//! channel; the callback drains pending events and renders the block through
//! the engine, exactly as a plugin host would.

use super::load_params;
use anyhow::Context;
use armonico_core::{AdditiveKernel, DEFAULT_POLYPHONY, NUM_CHANNELS, SAMPLE_RATE};
use armonico_engine::{AudioBlock, Engine, NoteEvent, TimedEvent};
use clap::Args;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

#[derive(Args)]
pub struct PlayArgs {
    /// MIDI note to play (repeat for a chord)
    #[arg(short, long, default_values_t = vec![60u8, 64, 67])]
    note: Vec<u8>,

    /// Cycle the notes as an arpeggio instead of holding a chord
    #[arg(long)]
    arpeggio: bool,

    /// Arpeggio tempo in beats per minute
    #[arg(long, default_value = "120.0")]
    bpm: f32,

    /// Preset TOML file of synthesis parameters
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Output device (partial name, case-insensitive; default device if omitted)
    #[arg(short, long)]
    output: Option<String>,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let params = load_params(args.preset.as_deref())?;
    let kernel = Arc::new(AdditiveKernel::with_params(DEFAULT_POLYPHONY, params));
    let mut engine = Engine::new(kernel, SAMPLE_RATE)?;

    let host = cpal::default_host();
    let device = find_output_device(&host, args.output.as_deref())?;
    println!("Playing on '{}'. Press Ctrl+C to stop.", device_name(&device));

    let rate = SAMPLE_RATE as u32;
    let supported = device
        .supported_output_configs()
        .context("failed to query output configurations")?
        .find(|range| {
            range.channels() as usize == NUM_CHANNELS
                && range.sample_format() == SampleFormat::F32
                && range.min_sample_rate() <= rate
                && range.max_sample_rate() >= rate
        })
        .with_context(|| {
            format!("output device does not support {NUM_CHANNELS} ch f32 at {rate} Hz")
        })?;
    let config = supported.with_sample_rate(rate).config();

    let (tx, rx) = mpsc::channel::<NoteEvent>();

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Apply everything that arrived since the last callback at
                // the head of this block.
                let events: Vec<TimedEvent> = rx
                    .try_iter()
                    .map(|event| TimedEvent { frame: 0, event })
                    .collect();
                let frames = data.len() / NUM_CHANNELS;
                let mut block = AudioBlock::stereo(frames);
                engine.process_block(&events, &mut block);
                block.write_interleaved(data);
            },
            |err| tracing::error!(error = %err, "output stream error"),
            None,
        )
        .context("failed to build output stream")?;
    stream.play().context("failed to start output stream")?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    if args.arpeggio {
        let beat = Duration::from_secs_f32(60.0 / args.bpm.max(1.0));
        let mut idx = 0usize;
        while running.load(Ordering::SeqCst) {
            let note = args.note[idx % args.note.len()];
            let _ = tx.send(NoteEvent::NoteOn {
                note,
                velocity: 1.0,
            });
            std::thread::sleep(beat / 2);
            let _ = tx.send(NoteEvent::NoteOff {
                note,
                velocity: 0.0,
            });
            std::thread::sleep(beat / 2);
            idx += 1;
        }
    } else {
        for &note in &args.note {
            let _ = tx.send(NoteEvent::NoteOn {
                note,
                velocity: 1.0,
            });
        }
        while running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
        }
        for &note in &args.note {
            let _ = tx.send(NoteEvent::NoteOff {
                note,
                velocity: 0.0,
            });
        }
    }

    // Let the release tails ring out before tearing the stream down.
    std::thread::sleep(Duration::from_millis(500));
    drop(stream);
    Ok(())
}

/// Extract a printable device name via `description()` (cpal 0.17+).
fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Find an output device by partial name match, or return the default.
fn find_output_device(host: &cpal::Host, name: Option<&str>) -> anyhow::Result<cpal::Device> {
    match name {
        Some(search) => {
            let search_lower = search.to_lowercase();
            let devices = host
                .output_devices()
                .context("failed to list output devices")?;
            for device in devices {
                if device_name(&device).to_lowercase().contains(&search_lower) {
                    return Ok(device);
                }
            }
            anyhow::bail!("no output device matching '{search}'")
        }
        None => host
            .default_output_device()
            .context("no default output device available"),
    }
}
