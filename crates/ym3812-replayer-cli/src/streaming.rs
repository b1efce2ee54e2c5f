//! Real-time audio streaming and playback control.
//!
//! Wires the boxed player to the audio device: a producer thread pulls
//! samples from the player into the ring buffer while rodio drains it,
//! and the main thread polls shared state for the status display.

use crate::audio::{AudioDevice, RealtimePlayer, StreamConfig, BUFFER_BACKOFF_MICROS};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use ym3812_common::{PlaybackState, SongPlayer};

/// Audio streaming context with device and producer thread.
pub struct StreamingContext {
    /// Audio device handle
    pub audio_device: AudioDevice,
    /// Producer thread handle
    pub producer_thread: std::thread::JoinHandle<()>,
    /// True while the producer is feeding samples
    pub running: Arc<AtomicBool>,
    /// Shared player instance
    pub player: Arc<Mutex<Box<dyn SongPlayer>>>,
    /// Streaming engine
    pub streamer: Arc<RealtimePlayer>,
}

impl StreamingContext {
    /// Initialize audio streaming and start the producer thread.
    ///
    /// Playback begins immediately; the producer keeps running until the
    /// song ends (a looping player never does) or `shutdown` is called.
    pub fn start(
        player: Box<dyn SongPlayer>,
        config: StreamConfig,
    ) -> ym3812_ims_replayer::Result<Self> {
        let streamer = Arc::new(
            RealtimePlayer::new(config)
                .map_err(|e| format!("Failed to create realtime player: {e}"))?,
        );
        let audio_device =
            AudioDevice::new(config.sample_rate, config.channels, streamer.get_buffer())
                .map_err(|e| format!("Failed to create audio device: {e}"))?;

        println!("Audio device initialized - playing to speakers\n");

        let player = Arc::new(Mutex::new(player));
        let running = Arc::new(AtomicBool::new(true));

        let running_clone = Arc::clone(&running);
        let player_clone = Arc::clone(&player);
        let streamer_clone = Arc::clone(&streamer);

        let producer_thread = std::thread::spawn(move || {
            run_producer_loop(player_clone, streamer_clone, running_clone);
        });

        Ok(StreamingContext {
            audio_device,
            producer_thread,
            running,
            player,
            streamer,
        })
    }

    /// Signal shutdown, wait for the producer to finish and let the
    /// buffered tail play out before cutting the stream.
    pub fn shutdown(self) {
        self.running.store(false, Ordering::Relaxed);
        self.producer_thread
            .join()
            .expect("Producer thread panicked during shutdown");

        let deadline = Instant::now() + Duration::from_secs(2);
        while self.streamer.fill_percentage() > 0.0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        self.audio_device.finish();
    }
}

/// Producer loop that generates samples and feeds them to the streamer.
///
/// Runs in a dedicated thread. Ends on its own when the player reaches
/// the stopped state, which a non-looping song does at its natural end.
fn run_producer_loop(
    player: Arc<Mutex<Box<dyn SongPlayer>>>,
    streamer: Arc<RealtimePlayer>,
    running: Arc<AtomicBool>,
) {
    let mut sample_buffer = [0i16; 4096];

    {
        let mut player = player.lock();
        player.play();
    }

    while running.load(Ordering::Relaxed) {
        let batch_size = sample_buffer.len();

        // Generate under the lock, reusing sample_buffer across iterations
        let stopped = {
            let mut player = player.lock();
            player.generate_samples_into(&mut sample_buffer);
            player.state() == PlaybackState::Stopped
        };

        let written = streamer.write_blocking(&sample_buffer[..batch_size]);
        if written < batch_size {
            // Buffer full, back off briefly
            std::thread::sleep(std::time::Duration::from_micros(BUFFER_BACKOFF_MICROS));
        }

        if stopped {
            // The buffer already holds the final chunk; hand control back
            running.store(false, Ordering::Relaxed);
            break;
        }
    }
}
