//! Streaming audio playback with minimal memory consumption.
//!
//! Samples flow from the producer thread through a fixed-size ring buffer
//! into a rodio sink, so a song of any length plays in constant memory.

// Allow unused methods - these are part of a complete streaming API
#![allow(dead_code)]

pub mod audio_device;
pub mod realtime;
pub mod ring_buffer;

pub use audio_device::AudioDevice;
pub use realtime::{PlaybackStats, RealtimePlayer};
pub use ring_buffer::RingBuffer;

/// Default sample rate (44.1 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Status line update interval in milliseconds
pub const STATUS_UPDATE_MS: u64 = 100;

/// Buffer backoff time in microseconds
pub const BUFFER_BACKOFF_MICROS: u64 = 100;

/// Configuration for streaming playback.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Size of the ring buffer in samples. Larger buffers add latency but
    /// survive longer producer stalls. The players emit interleaved
    /// stereo, so 8192 samples hold 4096 frames (93ms at 44.1kHz).
    pub ring_buffer_size: usize,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of audio channels
    pub channels: u16,
}

impl StreamConfig {
    /// Streaming configuration optimized for low latency.
    pub fn low_latency(sample_rate: u32) -> Self {
        StreamConfig {
            ring_buffer_size: 8192,
            sample_rate,
            channels: 2,
        }
    }

    /// Streaming configuration optimized for stability.
    pub fn stable(sample_rate: u32) -> Self {
        StreamConfig {
            ring_buffer_size: 32768,
            sample_rate,
            channels: 2,
        }
    }

    /// Buffered latency in milliseconds.
    pub fn latency_ms(&self) -> f32 {
        let frames = self.ring_buffer_size as f32 / self.channels as f32;
        (frames / self.sample_rate as f32) * 1000.0
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::stable(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_latency_config_stays_under_a_tenth_of_a_second() {
        let config = StreamConfig::low_latency(44100);
        let latency = config.latency_ms();
        assert!(latency > 90.0 && latency < 95.0);
    }

    #[test]
    fn stable_config_buffers_more() {
        let config = StreamConfig::default();
        assert!(config.latency_ms() > StreamConfig::low_latency(44100).latency_ms());
        assert_eq!(config.channels, 2);
    }
}
