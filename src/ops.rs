//! Host-facing operations
//!
//! [KepubOperations] has one method per shape in which a host calls into the
//! library: converting to KePub, converting back, and reading or writing the
//! metadata record. Every method takes the container bytes and returns new
//! bytes together with the [ConversionReport] of the run, the library itself
//! never prints anything.
//!
//! ```rust, no_run
//! # use lib_kepub::{Kepubify, KepubOperations, OutputConfig};
//! # fn main() -> Result<(), lib_kepub::KepubError> {
//! let input = std::fs::read("./book.epub")?;
//! let outcome = Kepubify::new().convert_to_kepub(&input, &OutputConfig::default())?;
//!
//! std::fs::write("./book.kepub.epub", &outcome.data)?;
//! println!("{} spans added", outcome.report.spans_added);
//! # Ok(())
//! # }
//! ```

use std::{fs, mem, path::Path};

use crate::{
    config::{InputConfig, OutputConfig},
    container::Container,
    error::KepubError,
    metadata::{self, KepubMetadata, fix_cover_image},
    pipeline::{Pipeline, prepare_output_resources},
    report::ConversionReport,
    segment::{PunctuationSegmenter, SentenceSegmenter},
    serializer::write_container,
};

/// The converted container and what happened while converting it
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub data: Vec<u8>,
    pub report: ConversionReport,
}

/// Entry points of the library, one per host operation
pub trait KepubOperations {
    /// Converts an EPUB container into a KePub container
    ///
    /// # Return
    /// - `Ok(ConversionOutcome)`: The KePub bytes and the conversion report
    /// - `Err(KepubError::DrmEncumbered)`: The container is protected and
    ///   `reject_drm_encumbered` is set
    /// - `Err(KepubError)`: Any fatal error, no partial output is produced
    fn convert_to_kepub(
        &self,
        input: &[u8],
        config: &OutputConfig,
    ) -> Result<ConversionOutcome, KepubError>;

    /// Converts a KePub container back into a plain EPUB container
    fn convert_from_kepub(
        &self,
        input: &[u8],
        config: &InputConfig,
    ) -> Result<ConversionOutcome, KepubError>;

    /// Reads the metadata record of a container
    fn read_metadata(&self, input: &[u8]) -> Result<KepubMetadata, KepubError>;

    /// Replaces the metadata record of a container
    fn write_metadata(
        &self,
        input: &[u8],
        metadata: &KepubMetadata,
    ) -> Result<ConversionOutcome, KepubError>;
}

/// The default implementation of [KepubOperations]
///
/// Generic over the sentence segmenter used for span wrapping.
#[derive(Debug, Clone, Default)]
pub struct Kepubify<S = PunctuationSegmenter> {
    segmenter: S,
}

impl Kepubify {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: SentenceSegmenter> Kepubify<S> {
    pub fn with_segmenter(segmenter: S) -> Self {
        Self { segmenter }
    }

    /// Converts the EPUB file at `input` into a KePub file at `output`
    ///
    /// When `copy_dir` is configured, the result is also copied there under
    /// the output file name.
    pub fn convert_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input: P,
        output: Q,
        config: &OutputConfig,
    ) -> Result<ConversionReport, KepubError> {
        let data = fs::read(input.as_ref())?;
        let mut outcome = self.convert_to_kepub(&data, config)?;

        let output = output.as_ref();
        fs::write(output, &outcome.data)?;

        if let Some(copy_dir) = &config.copy_dir {
            fs::create_dir_all(copy_dir)?;
            let file_name = output.file_name().ok_or_else(|| KepubError::ResourceNotFound {
                resource: output.display().to_string(),
            })?;
            let copy = copy_dir.join(file_name);
            fs::write(&copy, &outcome.data)?;
            outcome
                .report
                .debug(None, format!("copy written to {}", copy.display()));
        }

        Ok(outcome.report)
    }
}

/// Opens a container, moving its loading warnings into the report
fn open_container(input: &[u8], report: &mut ConversionReport) -> Result<Container, KepubError> {
    let mut container = Container::from_bytes(input)?;
    for warning in mem::take(&mut container.warnings) {
        report.warn(None, warning);
    }
    Ok(container)
}

/// Whether a protected container has to be passed through, or fails the run
fn passes_through_drm(
    container: &Container,
    reject: bool,
    report: &mut ConversionReport,
) -> Result<bool, KepubError> {
    if !container.is_drm_encumbered() {
        return Ok(false);
    }
    if reject {
        report.error(None, "the container is DRM-encumbered");
        return Err(KepubError::DrmEncumbered);
    }

    report.warn(None, "the container is DRM-encumbered, passed through unmodified");
    Ok(true)
}

impl<S: SentenceSegmenter> KepubOperations for Kepubify<S> {
    fn convert_to_kepub(
        &self,
        input: &[u8],
        config: &OutputConfig,
    ) -> Result<ConversionOutcome, KepubError> {
        let mut report = ConversionReport::default();
        let mut container = open_container(input, &mut report)?;

        if passes_through_drm(&container, config.reject_drm_encumbered, &mut report)? {
            return Ok(ConversionOutcome {
                data: input.to_vec(),
                report,
            });
        }

        let injection = prepare_output_resources(&mut container, config, &mut report)?;
        fix_cover_image(&mut container, &mut report)?;

        Pipeline::output(config, &self.segmenter, injection).run(&mut container, &mut report)?;
        let data = write_container(&container)?;

        report.info(
            None,
            format!(
                "{} documents converted, {} spans added",
                report.documents_processed, report.spans_added
            ),
        );
        Ok(ConversionOutcome { data, report })
    }

    fn convert_from_kepub(
        &self,
        input: &[u8],
        config: &InputConfig,
    ) -> Result<ConversionOutcome, KepubError> {
        let mut report = ConversionReport::default();
        let mut container = open_container(input, &mut report)?;

        if passes_through_drm(&container, config.reject_drm_encumbered, &mut report)? {
            return Ok(ConversionOutcome {
                data: input.to_vec(),
                report,
            });
        }

        Pipeline::input(config).run(&mut container, &mut report)?;
        let data = write_container(&container)?;

        report.info(
            None,
            format!(
                "{} documents converted, {} Kobo markers removed",
                report.documents_processed, report.markers_removed
            ),
        );
        Ok(ConversionOutcome { data, report })
    }

    fn read_metadata(&self, input: &[u8]) -> Result<KepubMetadata, KepubError> {
        let container = Container::from_bytes(input)?;
        Ok(metadata::read_metadata(&container))
    }

    fn write_metadata(
        &self,
        input: &[u8],
        metadata: &KepubMetadata,
    ) -> Result<ConversionOutcome, KepubError> {
        let mut report = ConversionReport::default();
        let mut container = open_container(input, &mut report)?;

        metadata::write_metadata(&mut container, metadata, &mut report)?;
        let data = write_container(&container)?;

        Ok(ConversionOutcome { data, report })
    }
}
