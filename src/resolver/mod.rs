//! Turn a user supplied URL into a local video file.

mod classify;

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

pub use classify::{classify, classify_message, classify_status, MESSAGE_RULES};

use crate::{
    io::{discard, is_non_empty_file, unique_path, VIDEO_EXTENSION},
    outside::{HostFailure, VideoHost},
    proxy::ProxyEndpoint,
    result::{ErrorKind, Result},
    types::VideoUrl,
};

/// A video file on disk, owned by whoever holds this handle.
///
/// Nothing deletes it implicitly, the owner calls [`LocalVideoFile::remove`].
#[derive(Debug, PartialEq, Eq)]
pub struct LocalVideoFile {
    path: PathBuf,
}

impl LocalVideoFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(self) -> std::io::Result<()> {
        crate::io::remove_if_exists(&self.path)
    }
}

#[derive(Debug)]
pub struct Resolver<'a> {
    host: &'a dyn VideoHost,
    output_dir: &'a Path,
    /// Longest accepted video, in seconds. `None` accepts anything.
    max_duration: Option<u64>,
}

impl<'a> Resolver<'a> {
    pub fn new(host: &'a dyn VideoHost, output_dir: &'a Path, max_duration: Option<u64>) -> Self {
        Self {
            host,
            output_dir,
            max_duration,
        }
    }

    /// Validate the URL, check the video can and may be fetched, then download
    /// its lowest quality stream into the output directory.
    ///
    /// No file is left behind when an error is returned.
    pub fn resolve(&self, url: &str, proxy: Option<&str>) -> Result<LocalVideoFile> {
        let proxy = proxy
            .map(|raw| {
                ProxyEndpoint::parse(raw).inspect_err(|_| {
                    error!("Invalid proxy URL, refusing to connect");
                })
            })
            .transpose()?;
        if let Some(proxy) = &proxy {
            debug!("Using proxy {proxy}");
        }

        let video_url = VideoUrl::parse(url).inspect_err(|_| {
            info!("Rejected URL {url:?}");
        })?;
        debug!("Video ID: {}", video_url.video_id());

        let metadata = self
            .host
            .get_metadata(video_url.as_str(), proxy.as_ref())
            .map_err(|failure| report("Could not get video info", &failure))?;
        debug!("Metadata: {metadata}");

        if metadata
            .availability
            .is_some_and(|availability| availability.is_restricted())
        {
            info!("Video {} is not public", metadata.id);
            return Err(ErrorKind::Unavailable.into());
        }

        let duration = match metadata.duration_seconds {
            Some(duration) if duration > 0.0 => duration,
            _ => {
                warn!("Could not get the duration of {}, aborting", metadata.id);
                return Err(ErrorKind::Unavailable.into());
            }
        };

        if let Some(max) = self.max_duration {
            if duration > max as f64 {
                info!("Video too long: {duration}s > {max}s");
                return Err(ErrorKind::TooLong.into());
            }
        }

        let dest = unique_path(self.output_dir, "", VIDEO_EXTENSION)?;
        info!("Downloading {} into {}", metadata.id, dest.display());

        let downloaded = self
            .host
            .download_lowest_quality(video_url.as_str(), proxy.as_ref(), &dest);
        if let Err(failure) = downloaded {
            remove_partial(&dest);
            return Err(download_kind(report("Download failed", &failure)).into());
        }

        if !is_non_empty_file(&dest) {
            error!("Download reported success but {} is missing or empty", dest.display());
            remove_partial(&dest);
            return Err(ErrorKind::HttpError.into());
        }

        Ok(LocalVideoFile { path: dest })
    }
}

fn report(context: &str, failure: &HostFailure) -> ErrorKind {
    let kind = classify(failure);
    match kind {
        ErrorKind::HttpError | ErrorKind::RateLimit => error!("{context} ({kind:?}): {failure:?}"),
        _ => info!("{context} ({kind:?}): {failure:?}"),
    }
    kind
}

/// The URL was already accepted by the metadata request, so a download
/// failure is either a rate limit, an unavailable video or an HTTP error.
fn download_kind(kind: ErrorKind) -> ErrorKind {
    match kind {
        ErrorKind::RateLimit | ErrorKind::Unavailable => kind,
        _ => ErrorKind::HttpError,
    }
}

/// Remove what a failed download may have written.
fn remove_partial(dest: &Path) {
    discard(dest);
    let mut part = dest.as_os_str().to_owned();
    part.push(".part");
    discard(Path::new(&part));
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use super::*;
    use crate::types::{Availability, VideoMetadata};

    /// Scripted video host counting its calls
    #[derive(Debug)]
    struct FakeHost {
        metadata: std::result::Result<VideoMetadata, HostFailure>,
        download: std::result::Result<&'static [u8], HostFailure>,
        metadata_calls: AtomicUsize,
        download_calls: AtomicUsize,
        seen_proxy: Mutex<Option<String>>,
    }

    impl FakeHost {
        fn with_duration(duration: f64) -> Self {
            Self {
                metadata: Ok(VideoMetadata {
                    id: "short123".to_owned(),
                    title: "short".to_owned(),
                    duration_seconds: Some(duration),
                    availability: Some(Availability::Public),
                }),
                download: Ok(b"not really a video"),
                metadata_calls: AtomicUsize::new(0),
                download_calls: AtomicUsize::new(0),
                seen_proxy: Mutex::new(None),
            }
        }

        fn failing_metadata(failure: HostFailure) -> Self {
            Self {
                metadata: Err(failure),
                ..Self::with_duration(5.0)
            }
        }
    }

    impl VideoHost for FakeHost {
        fn get_metadata(
            &self,
            _url: &str,
            proxy: Option<&ProxyEndpoint>,
        ) -> std::result::Result<VideoMetadata, HostFailure> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_proxy.lock().unwrap() = proxy.map(|p| p.as_str().to_owned());
            self.metadata.clone()
        }

        fn download_lowest_quality(
            &self,
            _url: &str,
            _proxy: Option<&ProxyEndpoint>,
            dest: &Path,
        ) -> std::result::Result<(), HostFailure> {
            self.download_calls.fetch_add(1, Ordering::SeqCst);
            match &self.download {
                Ok(bytes) => {
                    fs::write(dest, bytes).unwrap();
                    Ok(())
                }
                Err(failure) => {
                    // Leave a partial file behind like an interrupted download would
                    let mut part = dest.as_os_str().to_owned();
                    part.push(".part");
                    fs::write(part, b"half").unwrap();
                    Err(failure.clone())
                }
            }
        }
    }

    const URL: &str = "https://youtube.com/watch?v=short123";

    fn dir_len(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn short_video_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::with_duration(5.0);
        let resolver = Resolver::new(&host, dir.path(), Some(300));

        let file = resolver.resolve(URL, None).unwrap();
        assert!(file.path().starts_with(dir.path()));
        assert_eq!(file.path().extension().unwrap(), "mp4");
        assert!(is_non_empty_file(file.path()));
        assert_eq!(host.download_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn too_long_video_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::with_duration(301.0);
        let resolver = Resolver::new(&host, dir.path(), Some(300));

        let err = resolver.resolve(URL, None).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TooLong));
        assert_eq!(host.download_calls.load(Ordering::SeqCst), 0);
        assert_eq!(dir_len(dir.path()), 0);
    }

    #[test]
    fn unlimited_duration_accepts_long_videos() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::with_duration(10_000.0);
        let resolver = Resolver::new(&host, dir.path(), None);
        assert!(resolver.resolve(URL, None).is_ok());
    }

    #[test]
    fn malformed_proxy_never_reaches_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::with_duration(5.0);
        let resolver = Resolver::new(&host, dir.path(), Some(300));

        for proxy in ["10.0.0.1:3128", "http://", "://host:1"] {
            let err = resolver.resolve(URL, Some(proxy)).unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::ProxyError));
        }
        assert_eq!(host.metadata_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn valid_proxy_is_passed_to_the_host() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::with_duration(5.0);
        let resolver = Resolver::new(&host, dir.path(), Some(300));

        resolver
            .resolve(URL, Some("http://10.0.0.1:3128"))
            .unwrap();
        assert_eq!(
            host.seen_proxy.lock().unwrap().as_deref(),
            Some("http://10.0.0.1:3128")
        );
    }

    #[test]
    fn invalid_url_never_reaches_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::with_duration(5.0);
        let resolver = Resolver::new(&host, dir.path(), Some(300));

        let err = resolver.resolve("https://example.com/video", None).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidUrl));
        assert_eq!(host.metadata_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn http_429_is_a_rate_limit() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost::failing_metadata(HostFailure::Status {
            code: 429,
            message: "HTTP Error 429: Too Many Requests".to_owned(),
        });
        let resolver = Resolver::new(&host, dir.path(), Some(300));

        let err = resolver.resolve(URL, None).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RateLimit));
    }

    #[test]
    fn restricted_or_durationless_videos_are_unavailable() {
        let dir = tempfile::tempdir().unwrap();

        let mut host = FakeHost::with_duration(5.0);
        if let Ok(metadata) = &mut host.metadata {
            metadata.availability = Some(Availability::Private);
        }
        let err = Resolver::new(&host, dir.path(), Some(300))
            .resolve(URL, None)
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Unavailable));

        let mut host = FakeHost::with_duration(5.0);
        if let Ok(metadata) = &mut host.metadata {
            metadata.duration_seconds = None;
        }
        let err = Resolver::new(&host, dir.path(), Some(300))
            .resolve(URL, None)
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Unavailable));
        assert_eq!(host.download_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_download_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost {
            download: Err(HostFailure::Message(
                "ERROR: [youtube] short123: Video unavailable".to_owned(),
            )),
            ..FakeHost::with_duration(5.0)
        };
        let resolver = Resolver::new(&host, dir.path(), Some(300));

        let err = resolver.resolve(URL, None).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Unavailable));
        assert_eq!(dir_len(dir.path()), 0);
    }

    #[test]
    fn not_found_during_download_is_an_http_error() {
        for failure in [
            HostFailure::Status {
                code: 404,
                message: "HTTP Error 404: Not Found".to_owned(),
            },
            HostFailure::Message("ERROR: Unsupported URL: https://cdn.example/v".to_owned()),
        ] {
            let dir = tempfile::tempdir().unwrap();
            let host = FakeHost {
                download: Err(failure.clone()),
                ..FakeHost::with_duration(5.0)
            };
            let resolver = Resolver::new(&host, dir.path(), Some(300));

            let err = resolver.resolve(URL, None).unwrap_err();
            assert_eq!(err.kind(), Some(ErrorKind::HttpError), "{failure:?}");
            assert_eq!(dir_len(dir.path()), 0);
        }
    }

    #[test]
    fn rate_limit_during_download_keeps_its_kind() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost {
            download: Err(HostFailure::Status {
                code: 429,
                message: "HTTP Error 429: Too Many Requests".to_owned(),
            }),
            ..FakeHost::with_duration(5.0)
        };
        let resolver = Resolver::new(&host, dir.path(), Some(300));

        let err = resolver.resolve(URL, None).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::RateLimit));
    }

    #[test]
    fn empty_download_is_an_http_error() {
        let dir = tempfile::tempdir().unwrap();
        let host = FakeHost {
            download: Ok(b""),
            ..FakeHost::with_duration(5.0)
        };
        let resolver = Resolver::new(&host, dir.path(), Some(300));

        let err = resolver.resolve(URL, None).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::HttpError));
        assert_eq!(dir_len(dir.path()), 0);
    }
}
