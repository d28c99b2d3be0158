use std::{ffi::OsStr, fmt::Debug, fmt::Write, path::Path, time::Duration};

use miette::{miette, Context, IntoDiagnostic};
use serde::Deserialize;
use tracing::{debug, info};

use super::command::{
    assert_success_command, run_streaming, Capture, FFMPEG, FFPROBE, FFXXX_DEFAULT_ARGS,
};
use crate::{
    result::Result,
    splicer::{MediaInfo, Segment, SplicePlan},
};

/// Audio format every segment is converted to before concatenation
const AUDIO_FORMAT: &str = "sample_rates=44100:channel_layouts=stereo";

pub trait StreamTransformer: Sync + Debug {
    /// Read the duration, picture size and audio presence of a media file.
    fn probe(&self, input: &Path) -> Result<MediaInfo>;

    /// Encode the segments of the plan, in order, into the output file.
    ///
    /// On error the output file may exist and hold partial data.
    fn render(&self, plan: &SplicePlan, output: &Path) -> Result<()>;
}

/// Interface for the [ffmpeg](https://ffmpeg.org) and ffprobe programs
#[derive(Debug)]
pub struct Ffmpeg {
    probe_timeout: Duration,
    encode_timeout: Duration,
}

impl Ffmpeg {
    /// Verify that the `ffmpeg` and `ffprobe` binaries are reachable
    pub fn new(probe_timeout: Duration, encode_timeout: Duration) -> Result<Self> {
        for program in [FFMPEG, FFPROBE] {
            assert_success_command(
                program,
                |cmd| cmd.arg("-version"),
                Capture::empty(),
                Some(Duration::from_secs(30)),
            )
            .map_err(miette::Report::new)?;
        }

        Ok(Self {
            probe_timeout,
            encode_timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl StreamTransformer for Ffmpeg {
    fn probe(&self, input: &Path) -> Result<MediaInfo> {
        let res = assert_success_command(
            FFPROBE,
            |cmd| {
                cmd.args(FFXXX_DEFAULT_ARGS)
                    .args(["-of", "json"])
                    .arg("-show_format")
                    .arg("-show_streams")
                    .args([OsStr::new("-i"), input.as_os_str()])
            },
            Capture::STDOUT,
            Some(self.probe_timeout),
        )
        .map_err(miette::Report::new)?;

        let output = String::from_utf8_lossy(&res.stdout);
        Ok(parse_probe(&output)
            .wrap_err_with(|| format!("Could not probe {}", input.display()))?)
    }

    fn render(&self, plan: &SplicePlan, output: &Path) -> Result<()> {
        let graph = filter_graph(plan);
        let encode = &plan.encode;
        let bitrate = encode.bitrate.to_string();
        let audio_bitrate = encode.audio_bitrate.to_string();
        let frame_rate = encode.frame_rate.to_string();
        let read_rate = encode.read_rate.map(|rate| rate.to_string());

        let mut milestones = Milestones::default();
        let total = plan.output_duration();

        run_streaming(
            FFMPEG,
            |cmd| {
                cmd.args(FFXXX_DEFAULT_ARGS)
                    .arg("-nostats")
                    .args(["-progress", "pipe:1"])
                    .arg("-y");
                for input in [&plan.main, &plan.insert] {
                    if let Some(read_rate) = &read_rate {
                        cmd.args(["-readrate", read_rate]);
                    }
                    cmd.args([OsStr::new("-i"), input.as_os_str()]);
                }
                cmd.args(["-filter_complex", &graph])
                    .args(["-map", "[v]", "-map", "[a]"])
                    .args(["-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p"])
                    .args(["-b:v", &bitrate, "-r", &frame_rate])
                    .args(["-c:a", "aac", "-b:a", &audio_bitrate])
                    .args(["-movflags", "+faststart", "-f", "mp4"])
                    .arg(output)
            },
            Some(self.encode_timeout),
            |line| {
                if let Some(percent) = progress_percent(line, total) {
                    for milestone in milestones.reached(percent) {
                        info!("Encoding progress: {milestone}%");
                    }
                }
            },
        )
        .map_err(miette::Report::new)?;

        debug!("Rendered {}", output.display());
        Ok(())
    }
}

fn parse_probe(output: &str) -> miette::Result<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(output)
        .into_diagnostic()
        .wrap_err("Could not parse ffprobe JSON output")?;

    let duration: f64 = probe
        .format
        .duration
        .as_deref()
        .ok_or_else(|| miette!("No duration in ffprobe output"))?
        .parse()
        .into_diagnostic()
        .wrap_err("Duration is not a number")?;

    let video = probe
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| miette!("No video stream"))?;
    let (width, height) = video
        .width
        .zip(video.height)
        .ok_or_else(|| miette!("Video stream has no dimensions"))?;

    let has_audio = probe
        .streams
        .iter()
        .any(|stream| stream.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        duration,
        width,
        height,
        has_audio,
    })
}

/// Build the `-filter_complex` graph: every segment is cut, fitted on the
/// output canvas and resampled, then all of them are concatenated into
/// the `[v]` and `[a]` pads.
pub(crate) fn filter_graph(plan: &SplicePlan) -> String {
    let (w, h) = (plan.width, plan.height);
    let fps = plan.encode.frame_rate;
    let mut graph = String::new();
    let mut concat_inputs = String::new();

    for (i, segment) in plan.segments.iter().enumerate() {
        let input = segment.source.input_index();
        let range = trim_range(segment);

        // Writing to a String never fails
        let _ = write!(
            graph,
            "[{input}:v]trim={range},setpts=PTS-STARTPTS,\
            scale={w}:{h}:force_original_aspect_ratio=decrease,\
            pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p[v{i}];"
        );

        if segment.has_audio {
            let _ = write!(
                graph,
                "[{input}:a]atrim={range},asetpts=PTS-STARTPTS,aformat={AUDIO_FORMAT}[a{i}];"
            );
        } else {
            let _ = write!(
                graph,
                "anullsrc=channel_layout=stereo:sample_rate=44100,\
                atrim=duration={:.3}[a{i}];",
                segment.duration
            );
        }

        let _ = write!(concat_inputs, "[v{i}][a{i}]");
    }

    let _ = write!(
        graph,
        "{concat_inputs}concat=n={}:v=1:a=1[v][a]",
        plan.segments.len()
    );
    graph
}

fn trim_range(segment: &Segment) -> String {
    match segment.end {
        Some(end) => format!("start={:.3}:end={:.3}", segment.start, end),
        None => format!("start={:.3}", segment.start),
    }
}

/// Parse an ffmpeg `-progress` line into a completion percentage.
fn progress_percent(line: &str, total_seconds: f64) -> Option<f64> {
    let micros: f64 = line.strip_prefix("out_time_us=")?.trim().parse().ok()?;
    if total_seconds <= 0.0 {
        return None;
    }
    Some((micros / 1_000_000.0 / total_seconds * 100.0).clamp(0.0, 100.0))
}

/// Report encoding progress only when crossing a few fixed percentages.
#[derive(Debug)]
struct Milestones {
    milestones: &'static [u8],
    next: usize,
}

impl Default for Milestones {
    fn default() -> Self {
        Self {
            milestones: &[0, 25, 50, 75, 95],
            next: 0,
        }
    }
}

impl Milestones {
    /// Milestones crossed since the last call.
    fn reached(&mut self, percent: f64) -> Vec<u8> {
        let start = self.next;
        while self
            .milestones
            .get(self.next)
            .is_some_and(|&milestone| percent >= f64::from(milestone))
        {
            self.next += 1;
        }
        self.milestones[start..self.next].to_vec()
    }
}
