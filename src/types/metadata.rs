use std::fmt::Display;

use serde::Deserialize;

/// Who is allowed to watch a video, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Public,
    Unlisted,
    Private,
    NeedsAuth,
    SubscriberOnly,
    PremiumOnly,
    #[serde(other)]
    Other,
}

impl Availability {
    /// Whether an anonymous client can download the video at all.
    pub fn is_restricted(self) -> bool {
        matches!(
            self,
            Availability::Private
                | Availability::NeedsAuth
                | Availability::SubscriberOnly
                | Availability::PremiumOnly
        )
    }
}

/// Video metadata as reported by the host. Never persisted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "duration", default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub availability: Option<Availability>,
}

impl Display for VideoMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({})", self.title, self.id)?;
        match self.duration_seconds {
            Some(duration) => write!(f, " {duration:.1}s"),
            None => write!(f, " unknown duration"),
        }
    }
}
