//! Audio device integration using rodio.
//!
//! Plays samples from the ring buffer to the system audio device and
//! coordinates shutdown with the producer side.

use super::RingBuffer;
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Audio source that reads from the ring buffer.
struct RingBufferSource {
    ring_buffer: Arc<RingBuffer>,
    sample_rate: u32,
    channels: u16,
    finished: Arc<AtomicBool>,
    /// Internal batch buffer, refilled from the ring buffer in one read
    /// to keep lock traffic off the per-sample path
    buffer: Vec<i16>,
    /// Current position in the internal buffer
    buffer_pos: usize,
}

impl RingBufferSource {
    fn new(
        ring_buffer: Arc<RingBuffer>,
        sample_rate: u32,
        channels: u16,
        finished: Arc<AtomicBool>,
    ) -> Self {
        RingBufferSource {
            ring_buffer,
            sample_rate,
            channels,
            finished,
            buffer: vec![0; 4096],
            // Start by reading a fresh batch
            buffer_pos: 4096,
        }
    }
}

impl Source for RingBufferSource {
    fn current_frame_len(&self) -> Option<usize> {
        let available = self.ring_buffer.available_read();
        if available > 0 {
            Some(available)
        } else {
            Some(4096)
        }
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Iterator for RingBufferSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }

        if self.buffer_pos >= self.buffer.len() {
            let read = self.ring_buffer.read(&mut self.buffer);
            if read > 0 {
                self.buffer_pos = 0;
            } else {
                // Underrun: hand out silence so the stream stays alive
                self.buffer_pos = 0;
                self.buffer.fill(0);
            }
        }

        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Some(sample)
    }
}

/// Audio playback device using rodio.
pub struct AudioDevice {
    _stream: OutputStream,
    _sink: Sink,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start draining the ring buffer.
    ///
    /// # Arguments
    /// * `sample_rate` - Sample rate in Hz (typically 44100)
    /// * `channels` - Number of audio channels (2 for the interleaved
    ///   stereo the players produce)
    /// * `ring_buffer` - Buffer the producer thread writes into
    pub fn new(
        sample_rate: u32,
        channels: u16,
        ring_buffer: Arc<RingBuffer>,
    ) -> Result<Self, String> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| format!("Failed to create audio stream: {e}"))?;

        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| format!("Failed to create audio sink: {e}"))?;

        let finished = Arc::new(AtomicBool::new(false));

        let source =
            RingBufferSource::new(ring_buffer, sample_rate, channels, Arc::clone(&finished));
        sink.append(source);

        let running = Arc::new(AtomicBool::new(true));

        Ok(AudioDevice {
            _stream: stream,
            _sink: sink,
            running,
            finished,
        })
    }

    /// Pause playback.
    pub fn pause(&self) {
        self._sink.pause();
    }

    /// Resume playback.
    pub fn play(&self) {
        self._sink.play();
    }

    /// Check if the audio device is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signal that no more samples will be produced so the playback
    /// stream terminates instead of looping silence forever.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.pause();
        self.running.store(false, Ordering::Relaxed);
    }
}
