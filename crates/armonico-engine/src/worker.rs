//! Per-voice fill workers.
//!
//! Every voice owns exactly one background thread that produces blocks into
//! the voice's fill buffer on request. The worker sleeps on a condition
//! variable between requests and is woken either by the audio thread's swap
//! (fill requested) or by shutdown. Requests never queue: at most one fill
//! is in flight per voice, so the worker can never run more than one block
//! ahead of playback.

use armonico_core::{BLOCK_SAMPLES, BLOCK_SIZE, SynthKernel, VoiceId};
use atomic_float::AtomicF32;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// The fill buffer and its request flag, guarded by the per-voice mutex.
pub(crate) struct FillSlot {
    /// Interleaved fill buffer, written only by the worker.
    pub(crate) buffer: Vec<f32>,
    /// Set by the audio thread's swap, cleared by the worker when it starts
    /// servicing the request.
    pub(crate) fill_requested: bool,
}

/// State shared between a voice (audio/control side) and its fill worker.
pub(crate) struct VoiceShared {
    /// Fill buffer slot.
    pub(crate) slot: Mutex<FillSlot>,
    /// Signals both directions: request posted, and request serviced.
    pub(crate) ready: Condvar,
    /// Worker shutdown flag; flips true -> false exactly once, at voice drop.
    pub(crate) alive: AtomicBool,
    /// Note is in its release phase.
    pub(crate) releasing: AtomicBool,
    /// Fundamental frequency in radians per second.
    pub(crate) fundamental: AtomicF32,
}

impl VoiceShared {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(FillSlot {
                buffer: vec![0.0; BLOCK_SAMPLES],
                fill_requested: false,
            }),
            ready: Condvar::new(),
            alive: AtomicBool::new(true),
            releasing: AtomicBool::new(false),
            fundamental: AtomicF32::new(0.0),
        }
    }

    /// Ask the worker to exit and wake it if it is waiting.
    pub(crate) fn request_shutdown(&self) {
        self.alive.store(false, Ordering::Release);
        self.ready.notify_all();
    }
}

/// Spawn the fill worker for `voice`.
pub(crate) fn spawn_fill_worker(
    voice: VoiceId,
    shared: Arc<VoiceShared>,
    kernel: Arc<dyn SynthKernel>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("armonico-fill-{voice}"))
        .spawn(move || fill_loop(voice, &shared, kernel.as_ref()))
}

/// The worker loop: wait for a request or shutdown, evaluate one block,
/// repeat.
fn fill_loop(voice: VoiceId, shared: &VoiceShared, kernel: &dyn SynthKernel) {
    tracing::trace!(voice, "fill worker started");
    let mut sample_offset: u64 = 0;
    loop {
        let mut slot = shared.slot.lock();
        shared.ready.wait_while(&mut slot, |slot| {
            !slot.fill_requested && shared.alive.load(Ordering::Acquire)
        });
        if !shared.alive.load(Ordering::Acquire) {
            tracing::trace!(voice, "fill worker stopping");
            return;
        }
        slot.fill_requested = false;

        let fundamental = shared.fundamental.load(Ordering::Acquire);
        let releasing = shared.releasing.load(Ordering::Acquire);
        // The lock is held across the kernel call. The audio thread's swap
        // waits for `fill_requested` to go false under this same lock, so it
        // can never observe a half-written fill buffer; the price is that a
        // swap arriving mid-computation blocks for the remainder of the call.
        if let Err(err) = kernel.evaluate_voice_block(
            &mut slot.buffer,
            voice,
            sample_offset,
            fundamental,
            releasing,
        ) {
            tracing::error!(voice, error = %err, "kernel evaluation failed, substituting silence");
            slot.buffer.fill(0.0);
        }
        sample_offset += BLOCK_SIZE as u64;
        shared.ready.notify_all();
    }
}
