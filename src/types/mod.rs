mod bitrate;
mod edit_rule;
mod metadata;
mod video_url;

pub use bitrate::Bitrate;
pub use edit_rule::EditRule;
pub use metadata::{Availability, VideoMetadata};
pub use video_url::VideoUrl;
