//! Combine a downloaded video with the insert clip.

mod plan;

use std::path::Path;

use tracing::{debug, error, info};

pub use plan::{
    lead_in_duration, segments, EncodeSettings, MediaInfo, Segment, SplicePlan, Source,
};

use crate::{
    io::{is_non_empty_file, named_tempfile_in, VIDEO_EXTENSION},
    outside::StreamTransformer,
    result::{ErrorKind, Result},
    types::EditRule,
};

/// Prefix of every combined video file name
pub const OUTPUT_PREFIX: &str = "combined_";

#[derive(Debug)]
pub struct Splicer<'a> {
    transformer: &'a dyn StreamTransformer,
    output_dir: &'a Path,
    rule: EditRule,
    encode: EncodeSettings,
}

impl<'a> Splicer<'a> {
    pub fn new(
        transformer: &'a dyn StreamTransformer,
        output_dir: &'a Path,
        rule: EditRule,
        encode: EncodeSettings,
    ) -> Self {
        Self {
            transformer,
            output_dir,
            rule,
            encode,
        }
    }

    /// Splice `insert` into `main` and write the result in the output directory.
    ///
    /// Returns the file name of the combined video, `combined_<main file name>`.
    /// Neither input is modified or deleted. Every failure is reported as
    /// [`ErrorKind::ProcessingError`] and leaves no output behind.
    pub fn splice(&self, main: &Path, insert: &Path) -> Result<String> {
        self.try_splice(main, insert).map_err(|err| {
            error!("Could not splice {}: {err:?}", main.display());
            ErrorKind::ProcessingError.into()
        })
    }

    fn try_splice(&self, main: &Path, insert: &Path) -> Result<String> {
        let file_name = main
            .file_name()
            .ok_or_else(|| miette::miette!("{} has no file name", main.display()))?
            .to_string_lossy();
        let output_name = format!("{OUTPUT_PREFIX}{file_name}");
        let output_path = self.output_dir.join(&output_name);

        let main_info = self.transformer.probe(main)?;
        let insert_info = self.transformer.probe(insert)?;
        debug!("Main video: {main_info:?}, insert clip: {insert_info:?}");

        let plan = SplicePlan::new(
            main.to_path_buf(),
            &main_info,
            insert.to_path_buf(),
            &insert_info,
            self.rule,
            self.encode,
        );
        info!(
            "Encoding {} segments into {output_name} ({:.1}s)",
            plan.segments.len(),
            plan.output_duration()
        );

        // Encode next to the final file, then rename it into place.
        // The temporary file is removed on any early return.
        let tmp = named_tempfile_in(self.output_dir, VIDEO_EXTENSION)?;
        self.transformer.render(&plan, tmp.path())?;

        if !is_non_empty_file(tmp.path()) {
            return Err(miette::miette!("The encoder produced no output").into());
        }

        tmp.persist_noclobber(&output_path)
            .map_err(|err| err.error)?;
        info!("Wrote {}", output_path.display());

        Ok(output_name)
    }
}
