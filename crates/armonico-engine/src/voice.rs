//! A single synthesizer voice and its double-buffered render path.
//!
//! Each voice owns two `BLOCK_SIZE * NUM_CHANNELS` interleaved buffers: the
//! drain buffer, consumed sample-by-sample on the audio thread, and the fill
//! buffer, produced by the voice's fill worker. When the drain buffer is
//! exhausted the audio thread copies fill into drain under the shared lock
//! and posts a new fill request, so the audio thread never waits on kernel
//! computation unless the worker has fallen a whole block behind.

use crate::block::AudioBlock;
use crate::worker::{VoiceShared, spawn_fill_worker};
use armonico_core::{BLOCK_SIZE, NUM_CHANNELS, SynthKernel, VoiceId};
use core::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

/// Convert a MIDI note number to its frequency in Hz (A4 = 69 = 440 Hz).
#[inline]
pub fn midi_note_to_hz(note: u8) -> f32 {
    440.0 * ((f32::from(note) - 69.0) / 12.0).exp2()
}

/// The host-facing capability set of a voice.
///
/// There is exactly one voice implementation; the trait exists as the seam
/// the host engine registers against, replacing a base-class hierarchy with
/// a flat capability set.
pub trait SynthVoice {
    /// Whether this voice can take on a new note right now.
    fn can_play(&self) -> bool;

    /// Assign a note to this voice and begin sounding it.
    fn start_note(&mut self, note: u8, velocity: f32);

    /// Release the current note; a disallowed tail-off stops it dead.
    fn stop_note(&mut self, velocity: f32, allow_tail_off: bool);

    /// Append this voice's next `num_frames` samples into `output`.
    fn render_block(&mut self, output: &mut AudioBlock, start_frame: usize, num_frames: usize);
}

/// One polyphonic voice: buffer pair, fill worker, and note state.
pub struct Voice {
    id: VoiceId,
    /// Interleaved drain buffer, read only by the audio thread.
    drain: Vec<f32>,
    /// Next frame to consume from the drain buffer; `BLOCK_SIZE` means
    /// exhausted.
    read_cursor: usize,
    /// Whether a note is currently assigned (distinct from worker liveness).
    active: bool,
    note: Option<u8>,
    /// Allocation age, maintained by the engine for voice stealing.
    age: u64,
    shared: Arc<VoiceShared>,
    kernel: Arc<dyn SynthKernel>,
    worker: Option<JoinHandle<()>>,
}

impl Voice {
    /// Build the voice and spawn its fill worker.
    pub(crate) fn spawn(id: VoiceId, kernel: Arc<dyn SynthKernel>) -> std::io::Result<Self> {
        let shared = Arc::new(VoiceShared::new());
        let worker = spawn_fill_worker(id, Arc::clone(&shared), Arc::clone(&kernel))?;
        Ok(Self {
            id,
            drain: vec![0.0; BLOCK_SIZE * NUM_CHANNELS],
            read_cursor: BLOCK_SIZE,
            active: false,
            note: None,
            age: 0,
            shared,
            kernel,
            worker: Some(worker),
        })
    }

    /// Stable identity correlating this voice to kernel-side resources.
    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// Whether a note is currently assigned to this voice.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The MIDI note currently sounding, if any.
    pub fn note(&self) -> Option<u8> {
        self.note
    }

    pub(crate) fn age(&self) -> u64 {
        self.age
    }

    pub(crate) fn set_age(&mut self, age: u64) {
        self.age = age;
    }

    /// Clear the current note assignment without touching the worker.
    fn clear_note(&mut self) {
        self.active = false;
        self.note = None;
    }

    /// Swap the buffer pair and ask the worker for the next block.
    ///
    /// Copies the current fill buffer into the drain buffer under the shared
    /// lock, then posts the fill request. If the worker has not serviced the
    /// *previous* request yet this waits for it: an audible underrun, never
    /// stale data.
    fn swap_and_request_fill(&mut self) {
        let mut slot = self.shared.slot.lock();
        if slot.fill_requested {
            tracing::warn!(voice = self.id, "fill worker behind, audio thread waiting");
            self.shared
                .ready
                .wait_while(&mut slot, |slot| slot.fill_requested);
        }
        self.drain.copy_from_slice(&slot.buffer);
        slot.fill_requested = true;
        self.shared.ready.notify_all();
    }
}

impl SynthVoice for Voice {
    fn can_play(&self) -> bool {
        // The single voice type plays every note the engine routes to it.
        true
    }

    fn start_note(&mut self, note: u8, velocity: f32) {
        {
            // Zero both buffers under the lock; a worker mid-computation
            // finishes first, so the stale block can never be heard.
            let mut slot = self.shared.slot.lock();
            slot.buffer.fill(0.0);
            slot.fill_requested = false;
            self.drain.fill(0.0);
        }
        // Force a resynchronizing swap before the first sample of the note.
        self.read_cursor = BLOCK_SIZE;
        self.shared.releasing.store(false, Ordering::Release);
        self.shared
            .fundamental
            .store(midi_note_to_hz(note) * TAU, Ordering::Release);
        self.kernel.on_note_start(self.id);
        self.active = true;
        self.note = Some(note);
        tracing::debug!(voice = self.id, note, velocity, "note start");
    }

    fn stop_note(&mut self, _velocity: f32, allow_tail_off: bool) {
        tracing::debug!(voice = self.id, allow_tail_off, "note stop");
        self.shared.releasing.store(true, Ordering::Release);
        if !allow_tail_off {
            self.clear_note();
        }
    }

    fn render_block(&mut self, output: &mut AudioBlock, start_frame: usize, num_frames: usize) {
        if !self.active {
            return;
        }
        for frame in start_frame..start_frame + num_frames {
            if self.read_cursor == BLOCK_SIZE {
                self.read_cursor = 0;
                self.swap_and_request_fill();
            } else if self.read_cursor == BLOCK_SIZE - 1
                && !self.drain[(BLOCK_SIZE - 1) * NUM_CHANNELS].is_finite()
            {
                // Non-finite in the terminal channel-0 slot is the kernel's
                // end-of-note signal.
                self.drain[(BLOCK_SIZE - 1) * NUM_CHANNELS] = 0.0;
                tracing::debug!(voice = self.id, "note ended by kernel sentinel");
                self.clear_note();
                return;
            }
            for ch in 0..output.num_channels() {
                let sample = self.drain[self.read_cursor * NUM_CHANNELS + ch.min(NUM_CHANNELS - 1)];
                // A non-finite value anywhere else is a kernel bug; drop it
                // rather than poison the mix.
                if sample.is_finite() {
                    output.add_sample(ch, frame, sample);
                }
            }
            self.read_cursor += 1;
        }
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        // Join the worker before the buffers go away.
        self.shared.request_shutdown();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!(voice = self.id, "fill worker panicked");
        }
    }
}
