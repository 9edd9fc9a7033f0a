//! Content transform pipeline
//!
//! A [Pipeline] is an ordered list of [Transform]s applied to every content
//! document of the spine, strictly in spine order. Documents are only
//! written back into the container once every document went through, so an
//! aborted run never leaves a half converted container behind.
//!
//! The order of the passes is fixed:
//! 1. head validation
//! 2. forced cleanup
//! 3. Kobo marker stripping (KePub to EPUB only)
//! 4. punctuation smartening (EPUB to KePub only, opt-in)
//! 5. sentence span wrapping (EPUB to KePub only)
//! 6. stylesheet and script injection
//! 7. markup cleanup

use std::time::{Duration, Instant};

use serde_json::json;

use crate::{
    config::{HyphenationConfig, InputConfig, OutputConfig},
    container::Container,
    dom::Document,
    error::KepubError,
    report::ConversionReport,
    segment::SentenceSegmenter,
    transform::{
        ForcedCleanup, HeadValidation, MarkerStripping, MarkupCleanup, ReferenceInjection,
        SideEffect, SmartenPunctuation, SpanWrapping, Transform, TransformContext,
    },
    utils::{CSS_MIMETYPE, JS_MIMETYPE, local_time, parent_dir},
};

/// Directory, next to the OPF file, receiving the generated stylesheets
const CSS_DIR: &str = "kte-css";

const NO_HYPHENS_CSS: &str = r#"* {
    -webkit-hyphens: none !important;
    hyphens: none !important;
    adobe-hyphenate: none !important;
    -adobe-hyphenate: none !important;
}
"#;

const STYLE_HACKS_CSS: &str = r#"div#book-inner {
    margin-top: 0;
    margin-bottom: 0;
}
"#;

const KOBO_SCRIPT_NAME: &str = "kobo.js";

const DETAILS_FILE_NAME: &str = "plugininfo.kte";

/// An ordered list of transforms and the policy for running them
pub struct Pipeline<'a> {
    transforms: Vec<Box<dyn Transform + 'a>>,

    /// Skip failing documents instead of aborting
    pub best_effort: bool,

    pub timeout: Option<Duration>,
}

impl<'a> Pipeline<'a> {
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
            best_effort: false,
            timeout: None,
        }
    }

    pub fn push(&mut self, transform: impl Transform + 'a) -> &mut Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Names of the transforms, in the order they run
    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|transform| transform.name()).collect()
    }

    /// Builds the EPUB to KePub pipeline
    ///
    /// # Parameters
    /// - `config`: Toggles for the optional passes
    /// - `segmenter`: Sentence boundaries for span wrapping
    /// - `injection`: References to add, usually from [prepare_output_resources]
    pub fn output(
        config: &OutputConfig,
        segmenter: &'a dyn SentenceSegmenter,
        injection: ReferenceInjection,
    ) -> Self {
        let mut pipeline = Self::new();
        pipeline.push(HeadValidation).push(ForcedCleanup);

        if config.smarten_punctuation {
            pipeline.push(SmartenPunctuation);
        }
        if config.extended_features {
            pipeline.push(SpanWrapping::new(segmenter));
        }
        if !injection.is_empty() {
            pipeline.push(injection);
        }
        if config.clean_markup {
            pipeline.push(MarkupCleanup);
        }

        pipeline.best_effort = config.best_effort;
        pipeline.timeout = config.timeout;
        pipeline
    }

    /// Builds the KePub to EPUB pipeline
    pub fn input(config: &InputConfig) -> Self {
        let mut pipeline = Self::new();
        pipeline.push(HeadValidation).push(ForcedCleanup);

        if config.strip_kobo_markers {
            pipeline.push(MarkerStripping::new(config.marker_rule));
        }
        if config.clean_markup {
            pipeline.push(MarkupCleanup);
        }

        pipeline.best_effort = config.best_effort;
        pipeline.timeout = config.timeout;
        pipeline
    }

    /// Runs the pipeline over every spine document of `container`
    ///
    /// # Return
    /// - `Ok(())`: Every document was processed or, in best-effort mode, skipped
    /// - `Err(KepubError::Timeout)`: The deadline passed before the last document
    /// - `Err(KepubError)`: The first failure, when it is fatal under the policy
    pub fn run(
        &self,
        container: &mut Container,
        report: &mut ConversionReport,
    ) -> Result<(), KepubError> {
        let started = Instant::now();
        let language = container.language();
        let spine: Vec<String> = container
            .get_spine_order()
            .into_iter()
            .map(str::to_string)
            .collect();

        report.debug(
            None,
            format!(
                "running {} over {} documents",
                self.names().join(", "),
                spine.len()
            ),
        );

        let mut rewritten = Vec::new();
        for (index, path) in spine.iter().enumerate() {
            if self.timeout.is_some_and(|timeout| started.elapsed() >= timeout) {
                report.error(None, "conversion timed out, output discarded");
                return Err(KepubError::Timeout);
            }

            report.visited.push(path.clone());
            match self.process(container, path, index, language.as_deref(), report) {
                Ok(data) => {
                    report.documents_processed += 1;
                    if let Some(data) = data {
                        rewritten.push((path, data));
                    }
                }
                Err(err) if self.best_effort && err.is_document_error() => {
                    report.error(Some(path), format!("skipped: {err}"));
                    report.skipped.push(path.clone());
                }
                Err(err) => return Err(err),
            }
        }

        for (path, data) in rewritten {
            container.replace_resource(path, data)?;
        }

        Ok(())
    }

    /// Transforms one document, returning its new bytes when anything changed
    fn process(
        &self,
        container: &Container,
        path: &str,
        spine_index: usize,
        language: Option<&str>,
        report: &mut ConversionReport,
    ) -> Result<Option<Vec<u8>>, KepubError> {
        let data = container.read_resource(path)?;
        let html_syntax = container
            .manifest_item_by_path(path)
            .is_some_and(|item| item.mime == "text/html");

        let parsed = match Document::from_bytes(data, path) {
            Err(KepubError::XmlError { message, .. }) if html_syntax => {
                report.debug(Some(path), format!("not well-formed ({message}), parsed as HTML"));
                Document::from_html_bytes(data)
            }
            parsed => parsed,
        };
        let mut doc = parsed.map_err(|err| match err {
            KepubError::XmlError { .. } => err,
            err => KepubError::UnsupportedMarkup {
                path: path.to_string(),
                reason: err.to_string(),
            },
        })?;

        let mut ctx = TransformContext {
            path,
            spine_index,
            language,
            report,
        };

        let mut changed = false;
        let mut spans_added = 0;
        let mut markers_removed = 0;
        for transform in &self.transforms {
            let effects = transform.apply(&mut doc, &mut ctx)?;
            if effects.is_empty() {
                continue;
            }

            for effect in &effects {
                match effect {
                    SideEffect::SpansAdded(count) => spans_added += count,
                    SideEffect::MarkersRemoved(count) => markers_removed += count,
                    SideEffect::ReferenceAdded(target) => {
                        ctx.debug(format!("reference to {target} added"))
                    }
                    _ => {}
                }
            }
            ctx.debug(format!("{} applied", transform.name()));
            changed = true;
        }

        // Counters only include documents that made it through
        ctx.report.spans_added += spans_added;
        ctx.report.markers_removed += markers_removed;

        if changed {
            Ok(Some(doc.to_bytes()?))
        } else {
            Ok(None)
        }
    }
}

impl Default for Pipeline<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders the hyphenation stylesheet from its settings
pub fn hyphenation_css(config: &HyphenationConfig) -> String {
    let limit_lines = match config.limit_lines {
        0 => "no-limit".to_string(),
        lines => lines.to_string(),
    };

    format!(
        r#"* {{
    -webkit-hyphens: auto;
    -webkit-hyphenate-limit-after: {after};
    -webkit-hyphenate-limit-before: {before};
    -webkit-hyphenate-limit-lines: {limit_lines};
    hyphens: auto;
    hyphenate-limit-chars: {min} {before} {after};
    hyphenate-limit-lines: {limit_lines};
    adobe-hyphenate: auto;
    -adobe-hyphenate: auto;
}}

h1, h2, h3, h4, h5, h6, td {{
    -webkit-hyphens: none !important;
    hyphens: none !important;
    adobe-hyphenate: none !important;
    -adobe-hyphenate: none !important;
}}
"#,
        min = config.min_chars,
        before = config.min_chars_before,
        after = config.min_chars_after,
    )
}

/// Adds the stylesheets, script and details file an output conversion needs
///
/// # Return
/// - The references every content document must carry
pub fn prepare_output_resources(
    container: &mut Container,
    config: &OutputConfig,
    report: &mut ConversionReport,
) -> Result<ReferenceInjection, KepubError> {
    let base_dir = parent_dir(&container.opf_path).to_string();
    let in_base = |name: &str| match base_dir.as_str() {
        "" => name.to_string(),
        dir => format!("{dir}/{name}"),
    };

    let mut injection = ReferenceInjection::default();
    let mut add = |container: &mut Container, path: String, data: Vec<u8>, mime: &str| {
        container.add_resource(&path, data, mime);
        report.debug(None, format!("{path} added"));
        report.added_resources.push(path.clone());
        path
    };

    if config.disable_hyphenation {
        let path = in_base(&format!("{CSS_DIR}/no-hyphens.css"));
        let path = add(container, path, NO_HYPHENS_CSS.into(), CSS_MIMETYPE);
        injection.stylesheets.push(path);
    } else if config.hyphenation.is_active() {
        let path = in_base(&format!("{CSS_DIR}/hyphenation.css"));
        let css = hyphenation_css(&config.hyphenation);
        let path = add(container, path, css.into_bytes(), CSS_MIMETYPE);
        injection.stylesheets.push(path);
    }

    if config.style_hacks {
        let path = in_base(&format!("{CSS_DIR}/stylehacks.css"));
        let path = add(container, path, STYLE_HACKS_CSS.into(), CSS_MIMETYPE);
        injection.stylesheets.push(path);
    }

    if let Some(script) = &config.kobo_script {
        let existing = container
            .manifest
            .values()
            .map(|item| item.path.clone())
            .find(|path| {
                let file_name = path.rsplit('/').next().unwrap_or_default();
                file_name.starts_with("kobo") && file_name.ends_with(".js")
            });

        let path = match existing {
            Some(path) => path,
            None => add(container, in_base(KOBO_SCRIPT_NAME), script.clone(), JS_MIMETYPE),
        };
        injection.scripts.push(path);
    }

    if config.write_details_file {
        let details = json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "date": local_time(),
            "hyphenation": !config.disable_hyphenation && config.hyphenation.is_active(),
            "extended_features": config.extended_features,
            "clean_markup": config.clean_markup,
            "smarten_punctuation": config.smarten_punctuation,
        });
        let data = serde_json::to_vec_pretty(&details).map_err(|err| KepubError::Serialization {
            resource: format!("{DETAILS_FILE_NAME}: {err}"),
        })?;
        add(container, in_base(DETAILS_FILE_NAME), data, "application/json");
    }

    if !config.disable_hyphenation && config.hyphenation.is_active() {
        let language = container.language();
        report.info(
            None,
            format!(
                "hyphenation dictionary: {}",
                HyphenationConfig::dictionary_name(language.as_deref())
            ),
        );
    }

    Ok(injection)
}
