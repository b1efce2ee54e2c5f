//! Streaming front half of the audio path.
//!
//! Owns the ring buffer and offers a blocking write with backpressure for
//! the producer thread, plus playback statistics for the status display.

use super::ring_buffer::RingBufferError;
use super::{RingBuffer, StreamConfig, BUFFER_BACKOFF_MICROS};
use parking_lot::Mutex;
use std::sync::Arc;

/// Real-time streaming engine feeding the audio device.
pub struct RealtimePlayer {
    /// Ring buffer for sample storage
    buffer: Arc<RingBuffer>,
    /// Playback statistics
    stats: Arc<Mutex<PlaybackStats>>,
}

/// Counters for monitoring buffer health during playback.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackStats {
    /// Number of overrun events (producer write stalled on a full buffer)
    pub overrun_count: usize,
    /// Number of samples queued for playback
    pub samples_played: usize,
    /// Current buffer fill percentage
    pub fill_percentage: f32,
}

impl RealtimePlayer {
    /// Create a new streaming engine with the configured buffer size.
    pub fn new(config: StreamConfig) -> Result<Self, RingBufferError> {
        let buffer = Arc::new(RingBuffer::new(config.ring_buffer_size)?);

        let stats = Arc::new(Mutex::new(PlaybackStats {
            overrun_count: 0,
            samples_played: 0,
            fill_percentage: 0.0,
        }));

        Ok(RealtimePlayer { buffer, stats })
    }

    /// Write samples to the playback buffer, blocking with backpressure
    /// until everything is written or the retry budget runs out.
    ///
    /// Returns the number of samples actually written.
    pub fn write_blocking(&self, samples: &[i16]) -> usize {
        // ~100ms max wait at 100us backoff
        const MAX_RETRIES: u32 = 1000;

        let mut total_written = 0;
        let mut remaining = samples;
        let mut retry_count = 0;

        while !remaining.is_empty() && retry_count < MAX_RETRIES {
            let written = self.buffer.write(remaining);

            {
                let mut stats = self.stats.lock();
                stats.samples_played += written;
                stats.fill_percentage = self.buffer.fill_percentage();
                if written == 0 {
                    stats.overrun_count += 1;
                }
            }

            total_written += written;

            if written == 0 {
                // Buffer is full, back off and retry
                std::thread::sleep(std::time::Duration::from_micros(BUFFER_BACKOFF_MICROS));
                retry_count += 1;
            } else {
                remaining = &remaining[written..];
                retry_count = 0;
            }
        }

        total_written
    }

    /// Current playback statistics.
    pub fn get_stats(&self) -> PlaybackStats {
        *self.stats.lock()
    }

    /// Buffer fill level from 0.0 to 1.0.
    pub fn fill_percentage(&self) -> f32 {
        self.buffer.fill_percentage()
    }

    /// Handle to the ring buffer for the audio device to read from.
    pub fn get_buffer(&self) -> Arc<RingBuffer> {
        Arc::clone(&self.buffer)
    }
}
