use crate::{outside::HostFailure, result::ErrorKind};

/// Error text fragments, checked top to bottom against the lowercased
/// failure message. The first match decides the kind.
pub const MESSAGE_RULES: &[(&str, ErrorKind)] = &[
    ("http error 429", ErrorKind::RateLimit),
    ("too many requests", ErrorKind::RateLimit),
    ("rate limit", ErrorKind::RateLimit),
    ("rate-limit", ErrorKind::RateLimit),
    ("ratelimit", ErrorKind::RateLimit),
    ("sign in to confirm you're not a bot", ErrorKind::RateLimit),
    ("unavailable", ErrorKind::Unavailable),
    ("private", ErrorKind::Unavailable),
    ("unsupported url", ErrorKind::InvalidUrl),
    ("is not a valid url", ErrorKind::InvalidUrl),
    ("incomplete youtube id", ErrorKind::InvalidUrl),
];

/// Map a video host failure to the kind reported to the user.
///
/// HTTP statuses are trusted over the message text.
pub fn classify(failure: &HostFailure) -> ErrorKind {
    match failure {
        HostFailure::Status { code, .. } => classify_status(*code),
        HostFailure::TimedOut => ErrorKind::HttpError,
        HostFailure::Message(message) => classify_message(message),
    }
}

pub fn classify_status(code: u16) -> ErrorKind {
    match code {
        429 => ErrorKind::RateLimit,
        404 => ErrorKind::InvalidUrl,
        410 | 451 => ErrorKind::Unavailable,
        _ => ErrorKind::HttpError,
    }
}

pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();
    MESSAGE_RULES
        .iter()
        .find(|(pattern, _)| message.contains(pattern))
        .map_or(ErrorKind::HttpError, |&(_, kind)| kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_win_over_text() {
        let failure = HostFailure::Status {
            code: 429,
            message: "video unavailable".to_owned(),
        };
        assert_eq!(classify(&failure), ErrorKind::RateLimit);

        let failure = HostFailure::Status {
            code: 503,
            message: "Too Many Requests".to_owned(),
        };
        assert_eq!(classify(&failure), ErrorKind::HttpError);
    }

    #[test]
    fn status_table() {
        assert_eq!(classify_status(404), ErrorKind::InvalidUrl);
        assert_eq!(classify_status(410), ErrorKind::Unavailable);
        assert_eq!(classify_status(451), ErrorKind::Unavailable);
        assert_eq!(classify_status(403), ErrorKind::HttpError);
        assert_eq!(classify_status(500), ErrorKind::HttpError);
    }

    #[test]
    fn rate_limit_is_checked_before_unavailable() {
        assert_eq!(
            classify_message("ERROR: This content isn't available, try later. Rate-limit reached"),
            ErrorKind::RateLimit
        );
        assert_eq!(
            classify_message("Video unavailable: too many requests"),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn message_rules() {
        for (message, kind) in [
            ("ERROR: [youtube] x: Video unavailable", ErrorKind::Unavailable),
            ("ERROR: [youtube] x: Private video. Sign in", ErrorKind::Unavailable),
            (
                "ERROR: [youtube] x: Sign in to confirm you're not a bot",
                ErrorKind::RateLimit,
            ),
            ("ERROR: Unsupported URL: https://example.com", ErrorKind::InvalidUrl),
            (
                "ERROR: [youtube:truncated_id] abc: Incomplete YouTube ID abc",
                ErrorKind::InvalidUrl,
            ),
            ("ERROR: unable to download webpage: HTTP Error 429", ErrorKind::RateLimit),
            ("ERROR: Connection reset by peer", ErrorKind::HttpError),
            ("", ErrorKind::HttpError),
        ] {
            assert_eq!(classify_message(message), kind, "{message}");
        }
    }

    #[test]
    fn digits_in_video_ids_are_not_statuses() {
        assert_eq!(
            classify_message(
                "ERROR: [youtube] aB429cDeFgH: Video unavailable. This video has been removed by the uploader"
            ),
            ErrorKind::Unavailable
        );
        assert_eq!(
            classify_message("ERROR: [youtube] x429yz: Connection reset by peer"),
            ErrorKind::HttpError
        );
    }

    #[test]
    fn timeouts_are_http_errors() {
        assert_eq!(classify(&HostFailure::TimedOut), ErrorKind::HttpError);
    }
}
