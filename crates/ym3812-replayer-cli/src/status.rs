//! Plain-text status line for the terminal.
//!
//! Renders one overwriteable line per poll from a player snapshot:
//! playback state, title, progress, tempo and a per-channel level meter.

use ym3812_common::PlayerSnapshot;

/// Meter ramp from silent to loud.
const METER_CHARS: [char; 5] = [' ', '.', ':', '|', '#'];

/// Fixed line width so a shorter line fully overwrites a longer one.
const LINE_WIDTH: usize = 78;

/// Render the status line for one snapshot.
pub fn status_line(snapshot: &PlayerSnapshot, title: &str) -> String {
    let state = if snapshot.is_paused {
        "paused "
    } else if snapshot.is_playing {
        "playing"
    } else {
        "stopped"
    };

    let percent = if snapshot.total_size > 0 {
        (snapshot.cursor as f64 / snapshot.total_size as f64 * 100.0).min(100.0)
    } else {
        0.0
    };

    let tempo = if snapshot.tempo > 0 {
        format!("{:3} bpm", snapshot.tempo)
    } else {
        "  -    ".to_string()
    };

    let meters: String = snapshot
        .channel_volumes
        .iter()
        .map(|&volume| meter_char(volume))
        .collect();

    let title: String = title.chars().take(24).collect();
    let line = format!(
        "{state}  {title:<24} {percent:5.1}%  {tempo}  [{meters}]  notes {:2}",
        snapshot.active_notes.len()
    );
    format!("{line:<LINE_WIDTH$}")
}

/// Map a 0-127 volume onto the meter ramp.
fn meter_char(volume: u8) -> char {
    let index = (volume as usize * METER_CHARS.len()) / 128;
    METER_CHARS[index.min(METER_CHARS.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ym3812_common::ActiveNote;

    #[test]
    fn meter_spans_the_volume_range() {
        assert_eq!(meter_char(0), ' ');
        assert_eq!(meter_char(32), '.');
        assert_eq!(meter_char(64), ':');
        assert_eq!(meter_char(96), '|');
        assert_eq!(meter_char(127), '#');
    }

    #[test]
    fn line_shows_progress_and_activity() {
        let snapshot = PlayerSnapshot {
            is_playing: true,
            cursor: 50,
            total_size: 200,
            tempo: 120,
            channel_volumes: vec![0, 64, 127],
            active_notes: vec![ActiveNote { channel: 1, note: 60 }],
            ..PlayerSnapshot::default()
        };

        let line = status_line(&snapshot, "Test Song");
        assert!(line.starts_with("playing"));
        assert!(line.contains("Test Song"));
        assert!(line.contains("25.0%"));
        assert!(line.contains("120 bpm"));
        assert!(line.contains("[ :#]"));
        assert_eq!(line.len(), LINE_WIDTH);
    }

    #[test]
    fn long_titles_are_truncated() {
        let snapshot = PlayerSnapshot::default();
        let line = status_line(&snapshot, &"x".repeat(100));
        assert_eq!(line.len(), LINE_WIDTH);
        assert!(line.starts_with("stopped"));
    }

    #[test]
    fn zero_tempo_shows_a_dash() {
        let snapshot = PlayerSnapshot {
            is_playing: true,
            ..PlayerSnapshot::default()
        };
        let line = status_line(&snapshot, "vgm log");
        assert!(line.contains(" - "));
    }
}
