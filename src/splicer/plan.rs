use std::path::PathBuf;

use crate::types::{Bitrate, EditRule};

/// Main videos shorter than this are kept whole as the lead-in.
const SHORT_VIDEO_SECONDS: f64 = 1.0;

/// Fraction of the main video kept as lead-in.
const LEAD_IN_FRACTION: f64 = 0.1;

/// The input a segment is cut from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Main,
    Insert,
}

impl Source {
    /// Position of the source in the transcoder inputs
    pub fn input_index(self) -> usize {
        match self {
            Source::Main => 0,
            Source::Insert => 1,
        }
    }
}

/// A time range of one input, played as-is in the output.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub source: Source,
    pub start: f64,
    /// `None` plays the source up to its end
    pub end: Option<f64>,
    /// Length of the segment in the output, in seconds
    pub duration: f64,
    /// Whether the source has an audio track to cut from
    pub has_audio: bool,
}

/// Probed facts about a media file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

/// Encoding parameters shared by every splice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeSettings {
    pub bitrate: Bitrate,
    pub audio_bitrate: Bitrate,
    pub frame_rate: u32,
    /// Read inputs at most this many times faster than real time
    pub read_rate: Option<f64>,
}

/// Everything the transcoder needs to produce one combined video.
#[derive(Debug, Clone, PartialEq)]
pub struct SplicePlan {
    pub main: PathBuf,
    pub insert: PathBuf,
    pub segments: Vec<Segment>,
    pub width: u32,
    pub height: u32,
    pub encode: EncodeSettings,
}

impl SplicePlan {
    pub fn new(
        main: PathBuf,
        main_info: &MediaInfo,
        insert: PathBuf,
        insert_info: &MediaInfo,
        rule: EditRule,
        encode: EncodeSettings,
    ) -> Self {
        let (width, height) = canvas(main_info, insert_info);
        Self {
            main,
            insert,
            segments: segments(rule, main_info, insert_info),
            width,
            height,
            encode,
        }
    }

    /// Expected duration of the combined video
    pub fn output_duration(&self) -> f64 {
        self.segments.iter().map(|segment| segment.duration).sum()
    }
}

/// Length of the lead-in kept from a main video of the given duration.
pub fn lead_in_duration(main_duration: f64) -> f64 {
    if main_duration < SHORT_VIDEO_SECONDS {
        main_duration
    } else {
        (main_duration * LEAD_IN_FRACTION).min(main_duration)
    }
}

/// Cut the inputs into the ordered segments of the output.
pub fn segments(rule: EditRule, main: &MediaInfo, insert: &MediaInfo) -> Vec<Segment> {
    let insert_segment = Segment {
        source: Source::Insert,
        start: 0.0,
        end: None,
        duration: insert.duration,
        has_audio: insert.has_audio,
    };

    match rule {
        EditRule::LeadIn => {
            let lead_in = lead_in_duration(main.duration);
            vec![
                Segment {
                    source: Source::Main,
                    start: 0.0,
                    end: Some(lead_in),
                    duration: lead_in,
                    has_audio: main.has_audio,
                },
                insert_segment,
            ]
        }
        EditRule::Middle => {
            let half = main.duration / 2.0;
            vec![
                Segment {
                    source: Source::Main,
                    start: 0.0,
                    end: Some(half),
                    duration: half,
                    has_audio: main.has_audio,
                },
                insert_segment,
                Segment {
                    source: Source::Main,
                    start: half,
                    end: None,
                    duration: main.duration - half,
                    has_audio: main.has_audio,
                },
            ]
        }
    }
}

/// Smallest canvas both inputs fit in. H.264 with yuv420p needs even sizes.
fn canvas(main: &MediaInfo, insert: &MediaInfo) -> (u32, u32) {
    let even = |n: u32| (n.max(2) + 1) & !1;
    (
        even(main.width.max(insert.width)),
        even(main.height.max(insert.height)),
    )
}
