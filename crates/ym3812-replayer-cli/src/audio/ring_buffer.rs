//! Ring buffer shared between the sample producer and the audio device.
//!
//! One thread renders synth output into the buffer while the rodio
//! consumer drains it, so memory use stays fixed at the buffer capacity
//! no matter how long the song runs. Positions are tracked with atomics
//! for cross-thread visibility; the storage itself sits behind a mutex.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Error type for ring buffer operations.
#[derive(Debug, Clone)]
pub struct RingBufferError(pub String);

impl std::fmt::Display for RingBufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for RingBufferError {}

/// Fixed-capacity ring buffer of interleaved stereo samples.
///
/// # Thread Safety
/// - One producer thread (sample generator)
/// - One consumer thread (audio playback)
/// - Buffer access goes through a parking_lot::Mutex; read/write positions
///   use atomics so `available_read` works without taking the lock
#[derive(Debug)]
pub struct RingBuffer {
    /// Shared sample storage
    buffer: Mutex<Vec<i16>>,
    /// Write position (producer)
    write_pos: AtomicUsize,
    /// Read position (consumer)
    read_pos: AtomicUsize,
    /// Capacity, always a power of 2
    capacity: usize,
    /// Capacity mask for fast modulo: `pos & mask == pos % capacity`
    mask: usize,
}

impl RingBuffer {
    /// Create a new ring buffer. The capacity is rounded up to the next
    /// power of 2.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested capacity is 0 or would exceed the
    /// maximum safe allocation (256 MB of samples).
    pub fn new(requested_capacity: usize) -> Result<Self, RingBufferError> {
        if requested_capacity == 0 {
            return Err(RingBufferError(
                "Ring buffer capacity must be greater than 0".into(),
            ));
        }

        let capacity = requested_capacity.next_power_of_two();

        const MAX_CAPACITY: usize = 256 * 1024 * 1024 / std::mem::size_of::<i16>();
        if capacity > MAX_CAPACITY {
            return Err(RingBufferError(format!(
                "Ring buffer capacity {capacity} exceeds maximum safe size {MAX_CAPACITY}"
            )));
        }

        let mask = capacity - 1;

        Ok(RingBuffer {
            buffer: Mutex::new(vec![0; capacity]),
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
            capacity,
            mask,
        })
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples available to read without blocking.
    pub fn available_read(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);

        if write >= read {
            write - read
        } else {
            self.capacity - (read - write)
        }
    }

    /// Write samples to the buffer (producer side).
    ///
    /// Returns the number of samples actually written; 0 when the buffer
    /// is full.
    pub fn write(&self, samples: &[i16]) -> usize {
        let mut buf = self.buffer.lock();

        // Compute free space under the lock so the consumer cannot race us
        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let available = if write_pos >= read_pos {
            self.capacity - (write_pos - read_pos) - 1
        } else {
            (read_pos - write_pos) - 1
        };

        let to_write = samples.len().min(available);

        if to_write == 0 {
            return 0;
        }

        let write_idx = write_pos & self.mask;

        if write_idx + to_write <= self.capacity {
            buf[write_idx..write_idx + to_write].copy_from_slice(&samples[..to_write]);
        } else {
            // Wrap-around write
            let first_part = self.capacity - write_idx;
            buf[write_idx..].copy_from_slice(&samples[..first_part]);
            buf[..to_write - first_part].copy_from_slice(&samples[first_part..to_write]);
        }

        drop(buf);

        self.write_pos
            .store(write_pos + to_write, Ordering::Release);

        to_write
    }

    /// Read samples from the buffer (consumer side).
    ///
    /// Returns the number of samples actually read.
    pub fn read(&self, dest: &mut [i16]) -> usize {
        let buf = self.buffer.lock();

        let write_pos = self.write_pos.load(Ordering::Acquire);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let available = if write_pos >= read_pos {
            write_pos - read_pos
        } else {
            self.capacity - (read_pos - write_pos)
        };

        let to_read = dest.len().min(available);

        if to_read == 0 {
            return 0;
        }

        let read_idx = read_pos & self.mask;

        if read_idx + to_read <= self.capacity {
            dest[..to_read].copy_from_slice(&buf[read_idx..read_idx + to_read]);
        } else {
            // Wrap-around read
            let first_part = self.capacity - read_idx;
            dest[..first_part].copy_from_slice(&buf[read_idx..]);
            dest[first_part..to_read].copy_from_slice(&buf[..to_read - first_part]);
        }

        drop(buf);

        self.read_pos.store(read_pos + to_read, Ordering::Release);

        to_read
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.available_read() == 0
    }

    /// Fill level from 0.0 (empty) to 1.0 (full).
    pub fn fill_percentage(&self) -> f32 {
        (self.available_read() as f32) / (self.capacity as f32)
    }
}
