use std::{fmt::Display, sync::OnceLock};

use regex::Regex;
use url::Url;

use crate::result::ErrorKind;

/// Hosts serving the regular `/watch?v=<id>` pages.
const WATCH_HOSTS: [&str; 4] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
];

/// Path prefixes where the video ID is the next path segment.
const ID_PATH_PREFIXES: [&str; 4] = ["shorts", "embed", "live", "v"];

static VIDEO_ID_RE: OnceLock<Regex> = OnceLock::new();

fn video_id_re() -> &'static Regex {
    VIDEO_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

/// A YouTube URL known to point at a single video.
///
/// Parsing happens locally: a URL that fails here never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoUrl {
    url: Url,
    video_id: String,
}

impl VideoUrl {
    pub fn parse(raw: &str) -> Result<Self, ErrorKind> {
        let url = Url::parse(raw.trim()).map_err(|_| ErrorKind::InvalidUrl)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ErrorKind::InvalidUrl);
        }

        let host = url.host_str().ok_or(ErrorKind::InvalidUrl)?;
        let video_id = if host == "youtu.be" {
            url.path_segments()
                .and_then(|mut segments| segments.next())
                .map(str::to_owned)
        } else if WATCH_HOSTS.contains(&host) {
            Self::id_from_youtube_path(&url)
        } else {
            None
        };

        match video_id {
            Some(video_id) if video_id_re().is_match(&video_id) => Ok(Self { url, video_id }),
            _ => Err(ErrorKind::InvalidUrl),
        }
    }

    fn id_from_youtube_path(url: &Url) -> Option<String> {
        let mut segments = url.path_segments()?;
        match segments.next()? {
            "watch" => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            prefix if ID_PATH_PREFIXES.contains(&prefix) => segments.next().map(str::to_owned),
            _ => None,
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl Display for VideoUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_url_shapes() {
        for (raw, id) in [
            ("https://www.youtube.com/watch?v=tPEE9ZwTmy0", "tPEE9ZwTmy0"),
            ("https://youtube.com/watch?v=short123", "short123"),
            ("https://m.youtube.com/watch?feature=share&v=abc_DEF-1", "abc_DEF-1"),
            ("https://youtu.be/tPEE9ZwTmy0?t=3", "tPEE9ZwTmy0"),
            ("https://www.youtube.com/shorts/aBcDeFgHiJk", "aBcDeFgHiJk"),
            ("http://www.youtube.com/embed/aBcDeFgHiJk", "aBcDeFgHiJk"),
        ] {
            let url = VideoUrl::parse(raw).unwrap_or_else(|_| panic!("{raw} should parse"));
            assert_eq!(url.video_id(), id);
        }
    }

    #[test]
    fn rejects_everything_else() {
        for raw in [
            "",
            "not a url",
            "ftp://youtube.com/watch?v=abc",
            "https://vimeo.com/12345",
            "https://www.youtube.com/",
            "https://www.youtube.com/watch",
            "https://www.youtube.com/watch?v=",
            "https://www.youtube.com/watch?v=bad%20id",
            "https://youtu.be/",
        ] {
            assert_eq!(VideoUrl::parse(raw), Err(ErrorKind::InvalidUrl), "{raw}");
        }
    }
}
