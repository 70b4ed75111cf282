// Output naming - per-frame, container and audio file names

use chrono::{Datelike, NaiveDate};

use super::model::NamingScheme;

/// Resolves relative output names for one clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNaming {
    base_name: String,
    scheme: NamingScheme,
    capture_date: Option<NaiveDate>,
}

impl OutputNaming {
    pub fn new(base_name: impl Into<String>, scheme: NamingScheme, capture_date: Option<NaiveDate>) -> Self {
        Self {
            base_name: base_name.into(),
            scheme,
            capture_date,
        }
    }

    /// Plain naming regardless of the configured scheme
    pub fn plain(base_name: impl Into<String>) -> Self {
        Self::new(base_name, NamingScheme::Sequential, None)
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Reel/scene prefix used by the editor-compatible scheme
    fn reel_prefix(&self) -> String {
        // Missing capture dates fall back to 00-01-01
        let (year, month, day) = self
            .capture_date
            .map(|date| (date.year(), date.month(), date.day()))
            .unwrap_or((2000, 1, 1));
        format!(
            "{}_1_{:02}-{:02}-{:02}_0001_C0000",
            self.base_name,
            year.rem_euclid(100),
            month,
            day
        )
    }

    /// Name of one frame file; `frame_number` is the clip's absolute frame number
    pub fn frame_name(&self, frame_number: u32, extension: &str) -> String {
        match self.scheme {
            NamingScheme::Sequential => {
                format!("{}_{:06}{}", self.base_name, frame_number, extension)
            }
            NamingScheme::EditorReel => {
                format!("{}_{:06}{}", self.reel_prefix(), frame_number, extension)
            }
        }
    }

    /// Name of a single-file output such as a container or WAV
    pub fn file_name(&self, extension: &str) -> String {
        match self.scheme {
            NamingScheme::Sequential => format!("{}{}", self.base_name, extension),
            NamingScheme::EditorReel => format!("{}{}", self.reel_prefix(), extension),
        }
    }

    pub fn audio_name(&self) -> String {
        self.file_name(".wav")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 3, 7)
    }

    #[test]
    fn test_sequential_names() {
        let naming = OutputNaming::new("M01-1200", NamingScheme::Sequential, date());
        assert_eq!(naming.frame_name(42, ".dng"), "M01-1200_000042.dng");
        assert_eq!(naming.file_name(".mov"), "M01-1200.mov");
        assert_eq!(naming.audio_name(), "M01-1200.wav");
    }

    #[test]
    fn test_editor_reel_names() {
        let naming = OutputNaming::new("M01-1200", NamingScheme::EditorReel, date());
        assert_eq!(
            naming.frame_name(7, ".dng"),
            "M01-1200_1_24-03-07_0001_C0000_000007.dng"
        );
        assert_eq!(naming.audio_name(), "M01-1200_1_24-03-07_0001_C0000.wav");
    }

    #[test]
    fn test_frame_number_wider_than_six_digits() {
        let naming = OutputNaming::plain("clip");
        assert_eq!(naming.frame_name(1_234_567, ".tif"), "clip_1234567.tif");
    }
}
