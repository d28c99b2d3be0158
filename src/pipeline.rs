//! One request, from submitted URL to combined video file name.

use std::{fmt::Display, path::Path};

use tracing::{debug, error, info, info_span, warn};

use crate::{
    io::{discard, is_non_empty_file, random_stem},
    proxy::ProxyEndpoint,
    resolver::Resolver,
    result::{Error, ErrorKind},
    splicer::Splicer,
};

/// Length of the request id shown in the logs
const REQUEST_ID_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolving,
    Splicing,
    Cleanup,
    Done,
    Failed(ErrorKind),
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Resolving => write!(f, "resolving"),
            Stage::Splicing => write!(f, "splicing"),
            Stage::Cleanup => write!(f, "cleanup"),
            Stage::Done => write!(f, "done"),
            Stage::Failed(kind) => write!(f, "failed ({})", kind.name()),
        }
    }
}

/// Everything a request needs, shared by all the workers.
#[derive(Debug)]
pub struct Pipeline<'a> {
    resolver: Resolver<'a>,
    splicer: Splicer<'a>,
    insert_clip: &'a Path,
    output_dir: &'a Path,
    proxy: Option<&'a ProxyEndpoint>,
}

impl<'a> Pipeline<'a> {
    /// `output_dir` must be the directory both the resolver and the splicer write to.
    pub fn new(
        resolver: Resolver<'a>,
        splicer: Splicer<'a>,
        insert_clip: &'a Path,
        output_dir: &'a Path,
        proxy: Option<&'a ProxyEndpoint>,
    ) -> Self {
        Self {
            resolver,
            splicer,
            insert_clip,
            output_dir,
            proxy,
        }
    }

    /// Download the video behind `url`, splice the insert clip into it and
    /// return the file name of the result, relative to the output directory.
    ///
    /// The downloaded source is always deleted. Unexpected failures are
    /// logged and reported as [`ErrorKind::ProcessingError`].
    pub fn handle_request(&self, url: &str) -> Result<String, ErrorKind> {
        let request_id = random_stem();
        let span = info_span!("req", id = &request_id[..REQUEST_ID_LEN]);
        let _enter = span.enter();

        info!("Processing {url}");
        let res = self.run(url);
        match &res {
            Ok(file_name) => info!("{}: {file_name}", Stage::Done),
            Err(kind) => warn!("{}: {kind}", Stage::Failed(*kind)),
        }
        res
    }

    fn run(&self, url: &str) -> Result<String, ErrorKind> {
        debug!("Stage: {}", Stage::Resolving);
        let source = self
            .resolver
            .resolve(url, self.proxy.map(ProxyEndpoint::as_str))
            .map_err(|err| classified(Stage::Resolving, err))?;

        debug!("Stage: {}", Stage::Splicing);
        let spliced = self.splicer.splice(source.path(), self.insert_clip);

        debug!("Stage: {}", Stage::Cleanup);
        let source_path = source.path().to_path_buf();
        if let Err(err) = source.remove() {
            warn!("Could not delete {}: {err}", source_path.display());
        }

        let file_name = spliced.map_err(|err| classified(Stage::Splicing, err))?;

        let output = self.output_dir.join(&file_name);
        if !is_non_empty_file(&output) {
            error!("{} is missing or empty after splicing", output.display());
            discard(&output);
            return Err(ErrorKind::ProcessingError);
        }

        Ok(file_name)
    }
}

fn classified(stage: Stage, err: Error) -> ErrorKind {
    match err {
        Error::Kind(kind) => kind,
        Error::Miette(report) => {
            error!("Unexpected failure while {stage}: {report:?}");
            ErrorKind::ProcessingError
        }
    }
}
