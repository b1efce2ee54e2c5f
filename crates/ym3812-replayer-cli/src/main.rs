//! YM3812 (OPL2) real-time playback CLI.
//!
//! Command-line player for AdLib-era music files featuring:
//! - IMS, ROL and VGM playback with automatic BNK bank discovery
//! - Real-time audio streaming with low latency
//! - A terminal status line with per-channel activity
//! - Offline WAV rendering

mod args;
mod audio;
mod player_factory;
mod status;
mod streaming;

use std::io::Write as _;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use ym3812::export::{export_to_wav_with_config, ExportConfig};
use ym3812_common::SongPlayer;

use args::CliArgs;
use audio::{StreamConfig, DEFAULT_SAMPLE_RATE, STATUS_UPDATE_MS};
use player_factory::{create_player, PlayerInfo};
use status::status_line;
use streaming::StreamingContext;

fn main() -> ym3812_ims_replayer::Result<()> {
    println!("YM3812 OPL2 Emulator - AdLib Music Playback");
    println!("===========================================\n");

    let args = CliArgs::parse();

    if args.show_help {
        CliArgs::print_help();
        return if args.file_path.is_none() {
            Ok(())
        } else {
            Err("Invalid arguments".into())
        };
    }

    let Some(file_path) = args.file_path.as_deref() else {
        CliArgs::print_help();
        return Err("No input file given".into());
    };

    // Create player instance
    let PlayerInfo {
        mut player,
        song_info,
        title,
        format,
    } = create_player(file_path, args.transpose)?;

    // Display file information
    println!("File Information:");
    println!("{song_info}\n");

    // Apply playback controls before the first sample
    player.set_loop_enabled(args.loop_enabled);
    if let Some(percent) = args.tempo {
        player.control_tempo(percent);
    }
    if let Some(volume) = args.volume {
        player.control_volume(volume);
    }

    if let Some(ref wav_path) = args.wav_path {
        return export_wav(player.as_mut(), wav_path);
    }

    // Configure streaming
    let config = StreamConfig::low_latency(DEFAULT_SAMPLE_RATE);
    println!("Streaming Configuration:");
    println!("  Sample rate: {} Hz", config.sample_rate);
    println!(
        "  Buffer size: {} samples ({:.1}ms latency)",
        config.ring_buffer_size,
        config.latency_ms()
    );
    println!();

    // Start streaming
    let playback_start = Instant::now();
    let context = StreamingContext::start(player, config)?;

    // Status loop until the producer reports the end of the song; a
    // looping song runs until the process is interrupted
    while context.running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(STATUS_UPDATE_MS));
        let snapshot = context.player.lock().snapshot();
        print!("\r{}", status_line(&snapshot, &title));
        let _ = std::io::stdout().flush();
    }
    println!();

    // Shutdown and display statistics
    let total_time = playback_start.elapsed();
    let final_stats = context.streamer.get_stats();
    context.shutdown();
    println!("\n=== Playback Statistics ===");
    println!("Duration:          {:.2} seconds", total_time.as_secs_f32());
    println!("Samples played:    {}", final_stats.samples_played);
    println!("Overrun events:    {}", final_stats.overrun_count);
    println!("Format:            {format}");
    println!("\nPlayback complete!");

    Ok(())
}

/// Render the song offline to a WAV file instead of playing it.
fn export_wav(player: &mut dyn SongPlayer, path: &str) -> ym3812_ims_replayer::Result<()> {
    println!("Rendering to '{path}'...");
    let summary = export_to_wav_with_config(player, path, &ExportConfig::default())
        .map_err(|e| format!("WAV export failed: {e}"))?;
    println!(
        "Wrote {:.2} seconds ({} frames) to '{path}'",
        summary.seconds, summary.frames
    );
    Ok(())
}
