//! Player instantiation and file loading.
//!
//! Routes a song file to the matching replayer by extension, discovers
//! the instrument bank IMS and ROL songs depend on, and returns the
//! boxed player together with a printable description of what loaded.

use std::fmt;
use std::path::{Path, PathBuf};

use ym3812_bnk::InstrumentBank;
use ym3812_common::SongPlayer;
use ym3812_ims_replayer::{load_ims, ImsPlayer};
use ym3812_rol_replayer::{load_rol, RolPlayer};
use ym3812_vgm_replayer::{load_vgm, VgmPlayer};

type Result<T> = ym3812_ims_replayer::Result<T>;

/// Information about a loaded player.
pub struct PlayerInfo {
    /// Boxed player instance
    pub player: Box<dyn SongPlayer>,
    /// Human-readable song information
    pub song_info: String,
    /// Song title for the status line
    pub title: String,
    /// File format (IMS, ROL, VGM)
    pub format: String,
}

impl fmt::Debug for PlayerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerInfo")
            .field("song_info", &self.song_info)
            .field("title", &self.title)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Create a player instance from a file path.
///
/// The format is chosen by file extension. `transpose` only applies to
/// ROL songs and is ignored by the other formats.
pub fn create_player(file_path: &str, transpose: Option<i8>) -> Result<PlayerInfo> {
    let path = Path::new(file_path);
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "ims" => load_ims_file(file_path),
        "rol" => load_rol_file(file_path, transpose),
        // .vgz routes to the VGM loader so its compression error surfaces
        "vgm" | "vgz" => load_vgm_file(file_path),
        _ => Err(format!(
            "Unsupported file type '.{extension}' (expected .ims, .rol or .vgm)"
        )
        .into()),
    }
}

/// Load an IMS (AdLib music stream) file.
fn load_ims_file(file_path: &str) -> Result<PlayerInfo> {
    let song = load_ims(file_path).map_err(|e| format!("Failed to load IMS file: {e}"))?;
    let (bank, bank_path) = load_bank(Path::new(file_path))?;

    let title = if song.name.is_empty() {
        "(untitled)".to_string()
    } else {
        song.name.clone()
    };

    let mut info = format!(
        "File: {}\nFormat: IMS (AdLib music stream)\nTitle: {}\n\
         Mode: {}\nChannels: {}\nInstruments: {}\nTempo: {} bpm\n\
         Duration: {}\nBank: {}",
        file_path,
        title,
        mode_name(song.percussive),
        song.num_channels(),
        song.instrument_names.len(),
        song.basic_tempo,
        format_duration(song.duration_ms() / 1000.0),
        bank_path.display(),
    );

    let player =
        ImsPlayer::new(song, &bank).map_err(|e| format!("Failed to create IMS player: {e}"))?;
    append_missing(&mut info, &player.missing_instruments(), "muted");

    Ok(PlayerInfo {
        player: Box::new(player) as Box<dyn SongPlayer>,
        song_info: info,
        title,
        format: "IMS".to_string(),
    })
}

/// Load a ROL (AdLib Visual Composer) file.
fn load_rol_file(file_path: &str, transpose: Option<i8>) -> Result<PlayerInfo> {
    let song = load_rol(file_path).map_err(|e| format!("Failed to load ROL file: {e}"))?;
    let (bank, bank_path) = load_bank(Path::new(file_path))?;

    let title = if song.comment.trim().is_empty() {
        "(untitled)".to_string()
    } else {
        song.comment.trim().to_string()
    };

    let mut info = format!(
        "File: {}\nFormat: ROL (AdLib Visual Composer)\nTitle: {}\n\
         Mode: {}\nChannels: {}\nInstruments: {}\n\
         Timing: {} ticks/beat at {:.1} bpm\nDuration: {}\nBank: {}",
        file_path,
        title,
        mode_name(song.percussive),
        song.num_channels(),
        song.instrument_names.len(),
        song.ticks_per_beat,
        song.basic_tempo,
        format_duration(song.duration_ms() / 1000.0),
        bank_path.display(),
    );

    let mut player =
        RolPlayer::new(song, &bank).map_err(|e| format!("Failed to create ROL player: {e}"))?;
    append_missing(&mut info, &player.missing_instruments(), "fallback timbre");

    // Transpose is ROL-specific, so it applies here rather than through
    // the SongPlayer trait
    if let Some(semitones) = transpose {
        player.set_key_transpose(semitones);
        info.push_str(&format!("\nTranspose: {semitones:+} semitones"));
    }

    Ok(PlayerInfo {
        player: Box::new(player) as Box<dyn SongPlayer>,
        song_info: info,
        title,
        format: "ROL".to_string(),
    })
}

/// Load a VGM register log with YM3812 commands.
fn load_vgm_file(file_path: &str) -> Result<PlayerInfo> {
    let song = load_vgm(file_path).map_err(|e| format!("Failed to load VGM file: {e}"))?;

    let gd3 = song.gd3.clone().unwrap_or_default();
    let title = if gd3.track.is_empty() {
        "(untitled)".to_string()
    } else {
        gd3.track.clone()
    };

    let mut info = format!(
        "File: {}\nFormat: VGM {}.{:02x} (YM3812 at {} Hz)\nTitle: {}\n\
         Game: {}\nAuthor: {}\nCommands: {}\nLoop: {}\nDuration: {}",
        file_path,
        song.version >> 8,
        song.version & 0xFF,
        song.ym3812_clock,
        title,
        or_unknown(&gd3.game),
        or_unknown(&gd3.author),
        song.commands.len(),
        if song.loop_index.is_some() {
            "yes"
        } else {
            "no"
        },
        format_duration(f64::from(song.duration_seconds())),
    );
    if song.skipped_commands > 0 {
        info.push_str(&format!(
            "\nSkipped: {} commands for other chips",
            song.skipped_commands
        ));
    }

    let player =
        VgmPlayer::new(song).map_err(|e| format!("Failed to create VGM player: {e}"))?;

    Ok(PlayerInfo {
        player: Box::new(player) as Box<dyn SongPlayer>,
        song_info: info,
        title,
        format: "VGM".to_string(),
    })
}

/// Locate and load the instrument bank for an IMS or ROL song.
fn load_bank(song_path: &Path) -> Result<(InstrumentBank, PathBuf)> {
    let Some(bank_path) = find_bank(song_path) else {
        return Err(format!(
            "No instrument bank found for '{}': tried '{}' and standard.bnk in the same directory",
            song_path.display(),
            song_path.with_extension("bnk").display(),
        )
        .into());
    };

    let bank = InstrumentBank::load(&bank_path)
        .map_err(|e| format!("Failed to load bank '{}': {e}", bank_path.display()))?;
    Ok((bank, bank_path))
}

/// Bank discovery: `<stem>.bnk` next to the song first, then
/// `standard.bnk` in the same directory. Both are also tried in upper
/// case for songs copied off DOS media.
fn find_bank(song_path: &Path) -> Option<PathBuf> {
    for ext in ["bnk", "BNK"] {
        let sidecar = song_path.with_extension(ext);
        if sidecar.is_file() {
            return Some(sidecar);
        }
    }

    let dir = song_path.parent().unwrap_or_else(|| Path::new("."));
    for name in ["standard.bnk", "STANDARD.BNK"] {
        let fallback = dir.join(name);
        if fallback.is_file() {
            return Some(fallback);
        }
    }

    None
}

fn append_missing(info: &mut String, missing: &[&str], effect: &str) {
    if !missing.is_empty() {
        info.push_str(&format!(
            "\nMissing instruments ({effect}): {}",
            missing.join(", ")
        ));
    }
}

fn mode_name(percussive: bool) -> &'static str {
    if percussive {
        "percussive (6 voices + 5 drums)"
    } else {
        "melodic (9 voices)"
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "(unknown)"
    } else {
        value
    }
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = create_player("song.mid", None).unwrap_err();
        assert!(err.to_string().contains(".mid"));
    }

    #[test]
    fn missing_file_reports_the_load_failure() {
        let err = create_player("/nonexistent/song.vgm", None).unwrap_err();
        assert!(err.to_string().contains("Failed to load VGM file"));
    }

    #[test]
    fn missing_bank_names_the_candidates() {
        let err = load_bank(Path::new("/nonexistent/song.ims")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("song.bnk"));
        assert!(message.contains("standard.bnk"));
    }

    #[test]
    fn duration_formats_as_minutes_and_seconds() {
        assert_eq!(format_duration(0.0), "0:00");
        assert_eq!(format_duration(61.4), "1:01");
        assert_eq!(format_duration(600.0), "10:00");
    }
}
