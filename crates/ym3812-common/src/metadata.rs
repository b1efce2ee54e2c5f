//! Song metadata shared across formats.

/// Metadata extracted from a song file at load time.
///
/// Fields a format cannot supply stay empty; displays should treat empty
/// strings as "unknown" via [`display_title`](SongMetadata::display_title).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongMetadata {
    /// Song title (IMS embedded name, VGM GD3 track name).
    pub title: String,
    /// Author or composer when the format records one.
    pub author: String,
    /// Free-form comment (ROL comment field, VGM GD3 game name).
    pub comment: String,
    /// Short format tag: `"IMS"`, `"ROL"` or `"VGM"`.
    pub format: String,
    /// Number of channels the song addresses.
    pub channels: usize,
    /// Duration in seconds when derivable at load time.
    pub duration_seconds: Option<f32>,
}

impl SongMetadata {
    /// The title, or `"<unknown>"` when the file carries none.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "<unknown>"
        } else {
            &self.title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_title_falls_back() {
        let mut metadata = SongMetadata::default();
        assert_eq!(metadata.display_title(), "<unknown>");
        metadata.title = "BLUESKY".into();
        assert_eq!(metadata.display_title(), "BLUESKY");
    }
}
