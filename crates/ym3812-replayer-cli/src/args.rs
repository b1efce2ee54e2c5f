//! Command-line argument parsing for the YM3812 replayer CLI.
//!
//! Handles the playback flags (loop, tempo, volume, transpose), the WAV
//! export mode and help text generation.

use std::env;

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Song file to play
    pub file_path: Option<String>,
    /// Render to this WAV file instead of playing
    pub wav_path: Option<String>,
    /// Repeat the song at its natural end
    pub loop_enabled: bool,
    /// Playback speed in percent (100 = as authored)
    pub tempo: Option<u16>,
    /// Master volume, 0-127
    pub volume: Option<u8>,
    /// Semitone shift for ROL songs
    pub transpose: Option<i8>,
    /// Whether help was requested
    pub show_help: bool,
}

impl CliArgs {
    /// Parse arguments from the command line.
    pub fn parse() -> Self {
        Self::parse_from(env::args().skip(1))
    }

    fn parse_from(args: impl Iterator<Item = String>) -> Self {
        let mut parsed = Self::default();
        let mut iter = args;

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => {
                    parsed.show_help = true;
                }
                "--loop" => {
                    parsed.loop_enabled = true;
                }
                "--wav" => match iter.next() {
                    Some(path) => parsed.wav_path = Some(path),
                    None => {
                        eprintln!("--wav requires a file path");
                        parsed.show_help = true;
                    }
                },
                "--tempo" => {
                    let value = iter.next();
                    parsed.set_tempo(value.as_deref());
                }
                "--volume" => {
                    let value = iter.next();
                    parsed.set_volume(value.as_deref());
                }
                "--transpose" => {
                    let value = iter.next();
                    parsed.set_transpose(value.as_deref());
                }
                _ if arg.starts_with("--wav=") => {
                    parsed.wav_path = Some(arg[6..].to_string());
                }
                _ if arg.starts_with("--tempo=") => {
                    parsed.set_tempo(Some(&arg[8..]));
                }
                _ if arg.starts_with("--volume=") => {
                    parsed.set_volume(Some(&arg[9..]));
                }
                _ if arg.starts_with("--transpose=") => {
                    parsed.set_transpose(Some(&arg[12..]));
                }
                _ if arg.starts_with('-') => {
                    eprintln!("Unknown flag: {}", arg);
                    parsed.show_help = true;
                }
                _ => {
                    parsed.file_path = Some(arg);
                }
            }
        }

        parsed
    }

    fn set_tempo(&mut self, value: Option<&str>) {
        match value.and_then(|v| v.parse::<u16>().ok()) {
            Some(percent) if percent >= 1 => self.tempo = Some(percent),
            _ => {
                eprintln!("--tempo requires a percentage of at least 1");
                self.show_help = true;
            }
        }
    }

    fn set_volume(&mut self, value: Option<&str>) {
        match value.and_then(|v| v.parse::<u8>().ok()) {
            Some(volume) if volume <= 127 => self.volume = Some(volume),
            _ => {
                eprintln!("--volume requires a value between 0 and 127");
                self.show_help = true;
            }
        }
    }

    fn set_transpose(&mut self, value: Option<&str>) {
        match value.and_then(|v| v.parse::<i8>().ok()) {
            Some(semitones) if (-13..=13).contains(&semitones) => {
                self.transpose = Some(semitones);
            }
            _ => {
                eprintln!("--transpose requires a semitone count between -13 and 13");
                self.show_help = true;
            }
        }
    }

    /// Print help text to stderr.
    pub fn print_help() {
        eprintln!(
            "Usage:\n  ym3812-replayer [flags] <file.ims|file.rol|file.vgm>\n\n\
             Flags:\n\
             \x20 --wav <path>         Render to a WAV file instead of playing\n\
             \x20 --loop               Repeat the song at its natural end\n\
             \x20 --tempo <percent>    Playback speed, 100 plays as authored\n\
             \x20 --volume <0-127>     Master volume (default 127)\n\
             \x20 --transpose <n>      Shift ROL notes by n semitones (-13..13)\n\
             \x20 -h, --help           Show this help\n\n\
             Supported Formats:\n\
             \x20 IMS (AdLib music stream), ROL (Visual Composer), VGM (YM3812)\n\n\
             Instrument Banks:\n\
             \x20 IMS and ROL songs need an AdLib BNK instrument file. The player\n\
             \x20 looks for <song>.bnk next to the song file, then falls back to\n\
             \x20 standard.bnk in the same directory.\n\n\
             Examples:\n\
             \x20 ym3812-replayer song.ims               # Play with the sidecar bank\n\
             \x20 ym3812-replayer --loop tune.rol        # Repeat until interrupted\n\
             \x20 ym3812-replayer --wav out.wav song.vgm # Offline render\n"
        );
    }
}
