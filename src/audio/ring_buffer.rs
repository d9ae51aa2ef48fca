//! Fixed-capacity ring buffer holding the most recent audio samples.
//!
//! Backs pre-roll capture: the device driver thread writes every arriving
//! chunk here before any detector runs on it, so a snapshot taken at wake
//! time always includes the audio immediately preceding the trigger.

use std::sync::Mutex;

struct RingState {
    buf: Vec<i16>,
    cursor: usize,
    wrapped: bool,
}

/// A fixed-capacity ring of the most recently written samples.
///
/// A single mutex guards the cursor and wrapped flag; reads return an owned
/// copy so callers never hold the lock while processing a snapshot.
pub struct RingBuffer {
    capacity: usize,
    state: Mutex<RingState>,
}

impl RingBuffer {
    /// Create a ring sized for `duration_s` seconds at `rate` Hz, mono.
    pub fn with_duration(duration_s: f32, rate: u32) -> Self {
        let capacity = ((duration_s * rate as f32).floor() as usize).max(1);
        Self::with_capacity(capacity)
    }

    /// Create a ring with an explicit sample capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(RingState {
                buf: vec![0i16; capacity],
                cursor: 0,
                wrapped: false,
            }),
        }
    }

    /// Total sample capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write samples into the ring, overwriting the oldest data as needed.
    pub fn write(&self, samples: &[i16]) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let n = self.capacity;

        if samples.len() >= n {
            let tail = &samples[samples.len() - n..];
            state.buf.copy_from_slice(tail);
            state.cursor = 0;
            state.wrapped = true;
            return;
        }

        let cursor = state.cursor;
        let remaining = n - cursor;
        if samples.len() < remaining {
            state.buf[cursor..cursor + samples.len()].copy_from_slice(samples);
            state.cursor = cursor + samples.len();
        } else {
            // samples.len() >= remaining: the write reaches or passes the end
            // of the buffer, so the cursor lands on or wraps past 0.
            state.buf[cursor..n].copy_from_slice(&samples[..remaining]);
            let rest = &samples[remaining..];
            state.buf[..rest.len()].copy_from_slice(rest);
            state.cursor = rest.len();
            state.wrapped = true;
        }
    }

    /// Snapshot of every sample currently held, in chronological order.
    pub fn read_all(&self) -> Vec<i16> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.snapshot(&state)
    }

    /// Snapshot of the last `n` samples (fewer if the ring holds less).
    pub fn read_last(&self, n: usize) -> Vec<i16> {
        let all = self.read_all();
        if all.len() <= n {
            all
        } else {
            all[all.len() - n..].to_vec()
        }
    }

    /// Snapshot of the last `s` seconds at `rate` Hz.
    pub fn read_last_seconds(&self, s: f32, rate: u32) -> Vec<i16> {
        let n = (s * rate as f32).floor() as usize;
        self.read_last(n)
    }

    /// Number of seconds of audio currently held, at `rate` Hz.
    pub fn available_duration_s(&self, rate: u32) -> f32 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let held = if state.wrapped { self.capacity } else { state.cursor };
        held as f32 / rate as f32
    }

    /// Discard all held samples and reset to the empty state.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.buf.iter_mut().for_each(|s| *s = 0);
        state.cursor = 0;
        state.wrapped = false;
    }

    fn snapshot(&self, state: &RingState) -> Vec<i16> {
        if !state.wrapped {
            state.buf[..state.cursor].to_vec()
        } else {
            let mut out = Vec::with_capacity(self.capacity);
            out.extend_from_slice(&state.buf[state.cursor..]);
            out.extend_from_slice(&state.buf[..state.cursor]);
            out
        }
    }
}
