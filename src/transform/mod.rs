//! Content document transforms
//!
//! Each pass of the pipeline implements [Transform]. A pass receives the parsed
//! document and a [TransformContext] describing where the document sits in the
//! container, mutates the tree in place and describes what it did as a list of
//! [SideEffect]s. A pass that changed nothing returns no side effects, which
//! lets the pipeline keep the original bytes of untouched documents.

use crate::{dom::Document, error::KepubError, report::ConversionReport};

pub mod cleanup;
pub mod head;
pub mod inject;
pub mod smarten;
pub mod spans;
pub mod strip;

pub use cleanup::{ForcedCleanup, MarkupCleanup};
pub use head::HeadValidation;
pub use inject::ReferenceInjection;
pub use smarten::SmartenPunctuation;
pub use spans::SpanWrapping;
pub use strip::MarkerStripping;

/// Structural changes reported by a transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Sentence or image spans wrapped into the document
    SpansAdded(usize),

    /// The body content was wrapped into the Kobo column divs
    DivsAdded,

    /// Kobo marker elements unwrapped
    MarkersRemoved(usize),

    /// A `<link>` or `<script>` reference to this container path was added
    ReferenceAdded(String),

    /// Elements removed or collapsed by markup cleanup
    Cleaned(usize),

    /// Standards compliance fixes applied
    Normalized(usize),

    /// Straight punctuation replaced by typographic punctuation
    Smartened(usize),
}

/// Where the document being transformed lives, and where to report to
pub struct TransformContext<'a> {
    /// Container path of the document
    pub path: &'a str,

    /// Zero-based position of the document in the spine
    pub spine_index: usize,

    /// Language of the publication, if declared
    pub language: Option<&'a str>,

    pub report: &'a mut ConversionReport,
}

impl TransformContext<'_> {
    pub fn debug(&mut self, message: impl Into<String>) {
        self.report.debug(Some(self.path), message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.report.warn(Some(self.path), message);
    }
}

/// A single rewriting pass over one content document
pub trait Transform {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Applies the pass to `doc`
    ///
    /// # Return
    /// - `Ok(effects)`: The structural changes made, empty when nothing changed
    /// - `Err(KepubError)`: The document cannot be processed
    fn apply(
        &self,
        doc: &mut Document,
        ctx: &mut TransformContext,
    ) -> Result<Vec<SideEffect>, KepubError>;
}

/// Wraps a count into a side effect, or nothing for zero
pub(crate) fn counted(count: usize, effect: fn(usize) -> SideEffect) -> Vec<SideEffect> {
    if count == 0 { vec![] } else { vec![effect(count)] }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::{
        dom::Document,
        error::KepubError,
        report::ConversionReport,
        transform::{SideEffect, Transform, TransformContext},
    };

    pub const PATH: &str = "OEBPS/Text/ch1.xhtml";

    /// Wraps body markup into a parsed content document
    pub fn document(body: &str) -> Document {
        Document::parse(&crate::utils::fixtures::xhtml(body), PATH).unwrap()
    }

    /// Runs `transform` on `doc` as the first spine document
    pub fn run(
        transform: &dyn Transform,
        doc: &mut Document,
    ) -> Result<Vec<SideEffect>, KepubError> {
        let mut report = ConversionReport::default();
        let mut ctx = TransformContext {
            path: PATH,
            spine_index: 0,
            language: Some("en"),
            report: &mut report,
        };
        transform.apply(doc, &mut ctx)
    }

    /// Serialized body of a document
    pub fn body_markup(doc: &Document) -> String {
        let body = Document {
            prolog: vec![],
            root: doc.body().unwrap().clone(),
            epilog: vec![],
        };
        String::from_utf8(body.to_bytes().unwrap()).unwrap()
    }
}
