//! Parsed IMS song model.

/// Ticks per beat in the IMS event clock.
pub const TICKS_PER_BEAT: u32 = 240;

/// An IMS song: header fields, the instrument name list and the raw
/// event stream.
///
/// Events are MIDI-like with running status. After each event come its
/// delay bytes: any number of `0xF8` markers worth 240 ticks each,
/// closed by one literal tick count. `0xFC` in delay position ends the
/// song.
#[derive(Debug, Clone)]
pub struct ImsSong {
    pub version: u16,
    /// Beats per minute before any tempo events.
    pub basic_tempo: u16,
    /// Percussive songs address 11 voices, melodic songs 9.
    pub percussive: bool,
    pub name: String,
    /// Bank names of the instruments the song refers to by index.
    pub instrument_names: Vec<String>,
    pub events: Vec<u8>,
}

impl ImsSong {
    pub fn num_channels(&self) -> usize {
        if self.percussive {
            11
        } else {
            9
        }
    }

    /// Dry-run the event stream to estimate the song length. Only tempo
    /// events change timing, so everything else is skipped by length.
    pub fn duration_ms(&self) -> f64 {
        let len = self.events.len();
        let mut pos = 0usize;
        let mut status = 0u8;
        let base = self.basic_tempo.max(1) as f64;
        let mut tempo = base;
        let mut total_ms = 0.0;

        while pos < len {
            let mut byte = self.events[pos];
            pos += 1;
            if byte == 0xFC {
                break;
            }
            if byte >= 0x80 {
                status = byte;
                if pos >= len {
                    break;
                }
                byte = self.events[pos];
                pos += 1;
            }
            match status & 0xF0 {
                // one further data byte
                0x80 | 0x90 | 0xE0 => pos += 1,
                0xF0 => {
                    if pos + 2 < len {
                        let d1 = self.events[pos + 1] as f64;
                        let d2 = self.events[pos + 2] as f64;
                        tempo = (base * d1 + base * d2 / 128.0).max(1.0);
                    }
                    pos += 4;
                }
                // volume, program change and anything unknown carry one
                // data byte, already consumed
                _ => {}
            }

            let mut ticks = 0u64;
            while pos < len {
                let delay = self.events[pos];
                pos += 1;
                match delay {
                    0xF8 => ticks += 240,
                    0xFC => {
                        pos = len;
                        break;
                    }
                    literal => {
                        ticks += literal as u64;
                        break;
                    }
                }
            }
            total_ms += ticks as f64 * 60_000.0 / (TICKS_PER_BEAT as f64 * tempo);
        }
        total_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(events: Vec<u8>) -> ImsSong {
        ImsSong {
            version: 1,
            basic_tempo: 120,
            percussive: false,
            name: String::new(),
            instrument_names: vec![],
            events,
        }
    }

    #[test]
    fn duration_sums_delays_at_the_base_tempo() {
        // two note events, 240 ticks apart, at 120 bpm = 480 ticks/s
        let s = song(vec![0x90, 48, 100, 0xF8, 0, 0x90, 50, 100, 0xFC]);
        let ms = s.duration_ms();
        assert!((ms - 500.0).abs() < 1e-6, "got {ms}");
    }

    #[test]
    fn duration_tracks_tempo_events() {
        // tempo doubles to 240 bpm, then 240 ticks pass
        let s = song(vec![0xF0, 0, 0, 2, 0, 0, 0, 0x90, 48, 100, 0xF8, 0xFC]);
        let ms = s.duration_ms();
        assert!((ms - 250.0).abs() < 1e-6, "got {ms}");
    }
}
