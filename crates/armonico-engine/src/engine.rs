//! The polyphonic engine: a fixed pool of voices and note dispatch.
//!
//! The pool is built once, spawning one fill worker per voice, and torn down
//! once; note assignment only mutates live voice state. Rendering walks every
//! active voice and sums into the caller's [`AudioBlock`].

use crate::block::AudioBlock;
use crate::voice::{SynthVoice, Voice};
use crate::{Error, Result};
use armonico_core::{DEFAULT_POLYPHONY, ParameterStates, SAMPLE_RATE, SynthKernel};
use std::sync::Arc;

/// A note-stream event with its frame offset inside the current block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedEvent {
    /// Frame offset relative to the start of the block being processed.
    pub frame: usize,
    /// The event itself.
    pub event: NoteEvent,
}

/// Host note-stream events the engine understands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NoteEvent {
    /// Begin a note.
    NoteOn {
        /// MIDI note number.
        note: u8,
        /// Normalized velocity, 0..=1.
        velocity: f32,
    },
    /// Release a note (tail-off allowed).
    NoteOff {
        /// MIDI note number.
        note: u8,
        /// Normalized release velocity, 0..=1.
        velocity: f32,
    },
    /// Pitch-wheel position, -1..=1.
    PitchWheel {
        /// Normalized wheel position.
        value: f32,
    },
    /// Continuous controller change.
    Controller {
        /// Controller number.
        number: u8,
        /// Normalized controller value, 0..=1.
        value: f32,
    },
}

/// Fixed-size pool of voices plus the shared synthesis kernel.
pub struct Engine {
    voices: Vec<Voice>,
    kernel: Arc<dyn SynthKernel>,
    /// Monotonic allocation counter for oldest-voice stealing.
    age_counter: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("voices", &self.voices.len())
            .field("age_counter", &self.age_counter)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine with [`DEFAULT_POLYPHONY`] voices.
    ///
    /// `sample_rate` must equal the compile-time [`SAMPLE_RATE`]; anything
    /// else is rejected, since the kernel contract bakes the rate in.
    pub fn new(kernel: Arc<dyn SynthKernel>, sample_rate: f32) -> Result<Self> {
        Self::with_polyphony(kernel, sample_rate, DEFAULT_POLYPHONY)
    }

    /// Build an engine with an explicit voice count.
    pub fn with_polyphony(
        kernel: Arc<dyn SynthKernel>,
        sample_rate: f32,
        polyphony: usize,
    ) -> Result<Self> {
        if (sample_rate - SAMPLE_RATE).abs() > f32::EPSILON {
            return Err(Error::UnsupportedSampleRate {
                expected: SAMPLE_RATE,
                got: sample_rate,
            });
        }
        if polyphony == 0 {
            return Err(Error::ZeroPolyphony);
        }
        let voices = (0..polyphony)
            .map(|id| Voice::spawn(id, Arc::clone(&kernel)))
            .collect::<std::io::Result<Vec<_>>>()?;
        tracing::info!(polyphony, sample_rate, "engine ready");
        Ok(Self {
            voices,
            kernel,
            age_counter: 0,
        })
    }

    /// Number of voices in the pool.
    pub fn polyphony(&self) -> usize {
        self.voices.len()
    }

    /// Number of voices currently assigned a note.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Read access to the voice pool, for host registration and inspection.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Begin a note, reusing or stealing a voice as needed.
    pub fn note_on(&mut self, note: u8, velocity: f32) {
        let idx = self.allocate_voice(note);
        self.age_counter += 1;
        let voice = &mut self.voices[idx];
        voice.set_age(self.age_counter);
        voice.start_note(note, velocity);
    }

    /// Release every voice sounding `note`, with tail-off.
    pub fn note_off(&mut self, note: u8, velocity: f32) {
        for voice in &mut self.voices {
            if voice.is_active() && voice.note() == Some(note) {
                voice.stop_note(velocity, true);
            }
        }
    }

    /// Stop every sounding voice.
    pub fn all_notes_off(&mut self, allow_tail_off: bool) {
        for voice in &mut self.voices {
            if voice.is_active() {
                voice.stop_note(0.0, allow_tail_off);
            }
        }
    }

    /// Pitch-wheel input. Accepted but not interpreted by this core.
    pub fn pitch_wheel(&mut self, value: f32) {
        tracing::trace!(value, "pitch wheel ignored");
    }

    /// Controller input. Accepted but not interpreted by this core.
    pub fn controller(&mut self, number: u8, value: f32) {
        tracing::trace!(number, value, "controller ignored");
    }

    /// Render `num_frames` frames from every active voice, summing into
    /// `output` starting at `start_frame`.
    pub fn render_next_block(
        &mut self,
        output: &mut AudioBlock,
        start_frame: usize,
        num_frames: usize,
    ) {
        debug_assert!(start_frame + num_frames <= output.num_frames());
        for voice in &mut self.voices {
            voice.render_block(output, start_frame, num_frames);
        }
    }

    /// Sample-accurate block processing: apply each event at its frame
    /// offset, rendering the audio between events.
    ///
    /// Events beyond the end of `output` are applied after the last rendered
    /// frame. `events` need not be sorted.
    pub fn process_block(&mut self, events: &[TimedEvent], output: &mut AudioBlock) {
        let mut ordered: Vec<&TimedEvent> = events.iter().collect();
        ordered.sort_by_key(|event| event.frame);

        let total = output.num_frames();
        let mut cursor = 0;
        for timed in ordered {
            let frame = timed.frame.min(total);
            if frame > cursor {
                self.render_next_block(output, cursor, frame - cursor);
                cursor = frame;
            }
            self.apply_event(timed.event);
        }
        if cursor < total {
            self.render_next_block(output, cursor, total - cursor);
        }
    }

    /// Push a parameter snapshot through to the kernel.
    ///
    /// This is the only parameter path into synthesis; the engine itself
    /// never interprets the snapshot.
    pub fn set_parameters(&self, states: &ParameterStates) {
        self.kernel.parameter_states_changed(states);
    }

    fn apply_event(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::NoteOn { note, velocity } => self.note_on(note, velocity),
            NoteEvent::NoteOff { note, velocity } => self.note_off(note, velocity),
            NoteEvent::PitchWheel { value } => self.pitch_wheel(value),
            NoteEvent::Controller { number, value } => self.controller(number, value),
        }
    }

    /// Pick the voice for a new note: retrigger, then free, then oldest.
    fn allocate_voice(&self, note: u8) -> usize {
        if let Some(idx) = self
            .voices
            .iter()
            .position(|v| v.is_active() && v.note() == Some(note))
        {
            return idx;
        }
        if let Some(idx) = self
            .voices
            .iter()
            .position(|v| !v.is_active() && v.can_play())
        {
            return idx;
        }
        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.age())
            .map_or(0, |(idx, _)| idx)
    }
}
