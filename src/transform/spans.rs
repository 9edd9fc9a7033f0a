//! Sentence span wrapping
//!
//! Kobo readers track the reading position through `koboSpan` elements. Every
//! sentence of body text and every image gets wrapped into one, numbered
//! `kobo.{spine index}.{counter}` with the counter restarting for each
//! document. The body content is then moved into the `book-columns` and
//! `book-inner` divs the reader lays pages out with.

use std::ops::Range;

use crate::{
    dom::{Document, Element, Node},
    error::KepubError,
    segment::SentenceSegmenter,
    transform::{SideEffect, Transform, TransformContext},
};

/// Elements whose content is never split into spans
const SKIPPED_TAGS: [&str; 17] = [
    "button",
    "circle",
    "defs",
    "figcaption",
    "figure",
    "g",
    "input",
    "math",
    "path",
    "polygon",
    "pre",
    "rect",
    "script",
    "style",
    "svg",
    "use",
    "video",
];

pub const KOBO_SPAN_CLASS: &str = "koboSpan";

/// Adds sentence spans, then the Kobo divs
pub struct SpanWrapping<'a> {
    segmenter: &'a dyn SentenceSegmenter,
}

/// Numbering state of the document being wrapped
struct SpanCounter<'a> {
    span_name: String,
    spine_index: usize,
    next: usize,
    language: Option<&'a str>,
}

impl SpanCounter<'_> {
    fn next_span(&mut self) -> Element {
        let id = format!("kobo.{}.{}", self.spine_index, self.next);
        self.next += 1;

        Element::new(&self.span_name)
            .with_attr("class", KOBO_SPAN_CLASS)
            .with_attr("id", &id)
    }
}

/// Adjacent text and entity reference nodes, segmented as one piece of text
///
/// References take part in the text as their `&name;` form.
#[derive(Default)]
struct TextRun {
    text: String,
    references: Vec<Range<usize>>,
}

impl TextRun {
    fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn push_reference(&mut self, name: &str) {
        let start = self.text.len();
        self.text.push('&');
        self.text.push_str(name);
        self.text.push(';');
        self.references.push(start..self.text.len());
    }

    /// Whether `offset` falls strictly inside a reference
    fn splits_reference(&self, offset: usize) -> bool {
        self.references
            .iter()
            .any(|reference| reference.start < offset && offset < reference.end)
    }

    /// Rebuilds the nodes covering `range`, which must not split a reference
    fn nodes(&self, range: Range<usize>) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut cursor = range.start;

        let inside = self
            .references
            .iter()
            .filter(|reference| reference.start >= range.start && reference.end <= range.end);
        for reference in inside {
            if cursor < reference.start {
                nodes.push(Node::Text(self.text[cursor..reference.start].to_string()));
            }
            let name = &self.text[reference.start + 1..reference.end - 1];
            nodes.push(Node::EntityRef(name.to_string()));
            cursor = reference.end;
        }
        if cursor < range.end {
            nodes.push(Node::Text(self.text[cursor..range.end].to_string()));
        }

        nodes
    }
}

impl<'a> SpanWrapping<'a> {
    pub fn new(segmenter: &'a dyn SentenceSegmenter) -> Self {
        Self { segmenter }
    }

    fn wrap_element(&self, element: &mut Element, counter: &mut SpanCounter) {
        let children = std::mem::take(&mut element.children);
        let mut rebuilt = Vec::with_capacity(children.len());
        let mut run = TextRun::default();

        for node in children {
            match node {
                Node::Text(text) => run.push_text(&text),
                Node::EntityRef(name) => run.push_reference(&name),
                Node::Element(mut child) => {
                    self.wrap_run(&mut run, counter, &mut rebuilt);

                    let skipped = SKIPPED_TAGS.contains(&child.local_name());
                    let is_image = child.local_name() == "img";

                    if skipped {
                        rebuilt.push(Node::Element(child));
                    } else if is_image {
                        // Images are positions of their own, their content is left alone
                        let span = counter.next_span().with_child(Node::Element(child));
                        rebuilt.push(Node::Element(span));
                    } else {
                        self.wrap_element(&mut child, counter);
                        rebuilt.push(Node::Element(child));
                    }
                }
                node => {
                    self.wrap_run(&mut run, counter, &mut rebuilt);
                    rebuilt.push(node);
                }
            }
        }
        self.wrap_run(&mut run, counter, &mut rebuilt);

        element.children = rebuilt;
    }

    /// Splits a run of character data into sentence spans
    ///
    /// Whitespace between sentences stays bare text. The run is emptied.
    fn wrap_run(&self, run: &mut TextRun, counter: &mut SpanCounter, output: &mut Vec<Node>) {
        let run = std::mem::take(run);
        if run.text.is_empty() {
            return;
        }

        let mut cursor = 0;
        for range in self.segmenter.segment(&run.text, counter.language) {
            // Third-party ranges may be unordered or off char boundaries
            let on_boundaries =
                run.text.is_char_boundary(range.start) && run.text.is_char_boundary(range.end);
            if !on_boundaries
                || range.start < cursor
                || range.start >= range.end
                || run.splits_reference(range.start)
                || run.splits_reference(range.end)
            {
                continue;
            }

            output.extend(run.nodes(cursor..range.start));
            let mut span = counter.next_span();
            span.children = run.nodes(range.clone());
            output.push(Node::Element(span));
            cursor = range.end;
        }

        output.extend(run.nodes(cursor..run.text.len()));
    }

    /// Moves the body content into `div#book-columns > div#book-inner`
    ///
    /// Returns false when the document is left alone.
    fn add_divs(body: &mut Element, ctx: &mut TransformContext) -> bool {
        let elements = body.descendants();
        let has_inner_div = elements.iter().any(|element| {
            element.local_name() == "div" && element.attr("id").as_deref() == Some("book-inner")
        });
        if has_inner_div {
            ctx.warn("Kobo <div> tags present, not adding divs");
            return false;
        }

        let div_count = elements.iter().filter(|e| e.local_name() == "div").count();
        let p_count = elements.iter().filter(|e| e.local_name() == "p").count();
        if div_count > p_count {
            // Books laid out with divs instead of paragraphs break with the extra columns
            ctx.warn(format!(
                "{div_count} <div> tags and {p_count} <p> tags, not adding divs"
            ));
            return false;
        }

        let div_name = body.sibling_name("div");
        let mut inner = Element::new(&div_name).with_attr("id", "book-inner");
        inner.children = std::mem::take(&mut body.children);
        let outer = Element::new(&div_name)
            .with_attr("id", "book-columns")
            .with_child(Node::Element(inner));
        body.children = vec![Node::Element(outer)];

        true
    }
}

/// Whether `element` is a Kobo span produced by an earlier conversion
pub(crate) fn is_existing_kobo_span(element: &Element) -> bool {
    element.local_name() == "span"
        && (element.has_class(KOBO_SPAN_CLASS)
            || element.attr("id").is_some_and(|id| id.starts_with("kobo.")))
}

impl Transform for SpanWrapping<'_> {
    fn name(&self) -> &'static str {
        "span wrapping"
    }

    fn apply(
        &self,
        doc: &mut Document,
        ctx: &mut TransformContext,
    ) -> Result<Vec<SideEffect>, KepubError> {
        let Some(body) = doc.body_mut() else {
            return Ok(vec![]);
        };

        let existing = body
            .descendants()
            .into_iter()
            .filter(|element| is_existing_kobo_span(element))
            .count();
        if existing > 0 {
            ctx.warn(format!("{existing} Kobo <span> tags present, not adding spans"));
            return Ok(vec![]);
        }

        let mut counter = SpanCounter {
            span_name: body.sibling_name("span"),
            spine_index: ctx.spine_index,
            next: 0,
            language: ctx.language,
        };
        self.wrap_element(body, &mut counter);

        let mut effects = Vec::new();
        if counter.next > 0 {
            ctx.debug(format!("{} spans added", counter.next));
            effects.push(SideEffect::SpansAdded(counter.next));
        }
        if Self::add_divs(body, ctx) {
            effects.push(SideEffect::DivsAdded);
        }

        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Range;

    use crate::{
        segment::{PunctuationSegmenter, SentenceSegmenter},
        transform::{
            SideEffect, SpanWrapping,
            testing::{body_markup, document, run},
        },
    };

    #[test]
    fn test_two_sentences() {
        let mut doc = document("<p>Hello. World.</p>");
        let effects = run(&SpanWrapping::new(&PunctuationSegmenter), &mut doc).unwrap();

        assert_eq!(
            effects,
            vec![SideEffect::SpansAdded(2), SideEffect::DivsAdded]
        );
        assert_eq!(
            body_markup(&doc),
            concat!(
                r#"<body><div id="book-columns"><div id="book-inner"><p>"#,
                r#"<span class="koboSpan" id="kobo.0.0">Hello.</span> "#,
                r#"<span class="koboSpan" id="kobo.0.1">World.</span>"#,
                r#"</p></div></div></body>"#,
            )
        );
    }

    /// Numbering runs through nested elements in document order
    #[test]
    fn test_nested_numbering() {
        let mut doc = document(
            r#"<p>A <em>b. C</em> d.</p><p><img src="x.png"/></p><pre>Not. Split.</pre><p>  </p>"#,
        );
        let before = doc.text();
        run(&SpanWrapping::new(&PunctuationSegmenter), &mut doc).unwrap();

        let ids: Vec<String> = doc
            .body()
            .unwrap()
            .descendants()
            .into_iter()
            .filter_map(|element| element.attr("id"))
            .filter(|id| id.starts_with("kobo."))
            .collect();
        assert_eq!(
            ids,
            vec!["kobo.0.0", "kobo.0.1", "kobo.0.2", "kobo.0.3", "kobo.0.4"]
        );
        assert_eq!(doc.text(), before);

        let markup = body_markup(&doc);
        assert!(markup.contains(
            r#"<span class="koboSpan" id="kobo.0.4"><img src="x.png"/></span>"#
        ));
        assert!(markup.contains("<pre>Not. Split.</pre>"));
        assert!(markup.contains("<p>  </p>"));
    }

    #[test]
    fn test_spine_index_in_ids() {
        let mut doc = document("<p>Only.</p>");
        let mut report = crate::report::ConversionReport::default();
        let mut ctx = crate::transform::TransformContext {
            path: "b.xhtml",
            spine_index: 3,
            language: None,
            report: &mut report,
        };
        crate::transform::Transform::apply(
            &SpanWrapping::new(&PunctuationSegmenter),
            &mut doc,
            &mut ctx,
        )
        .unwrap();

        assert!(body_markup(&doc).contains(r#"id="kobo.3.0""#));
    }

    /// Documents that already carry spans are left untouched
    #[test]
    fn test_existing_spans() {
        let mut doc = document(r#"<p><span class="koboSpan" id="kobo.0.0">Hi.</span></p>"#);
        let original = doc.clone();

        let effects = run(&SpanWrapping::new(&PunctuationSegmenter), &mut doc).unwrap();
        assert_eq!(effects, vec![]);
        assert_eq!(doc, original);
    }

    /// More divs than paragraphs means no column divs
    #[test]
    fn test_div_heavy_document() {
        let mut doc = document("<div><div>One.</div></div><p>Two.</p>");
        let effects = run(&SpanWrapping::new(&PunctuationSegmenter), &mut doc).unwrap();

        assert_eq!(effects, vec![SideEffect::SpansAdded(2)]);
        assert!(!body_markup(&doc).contains("book-columns"));
    }

    struct BrokenSegmenter;

    impl SentenceSegmenter for BrokenSegmenter {
        fn segment(&self, _text: &str, _locale: Option<&str>) -> Vec<Range<usize>> {
            vec![4..2, 0..3, 1..2, 2..100]
        }
    }

    /// Out of order or out of bounds ranges never lose text
    #[test]
    fn test_untrusted_segmenter() {
        let mut doc = document("<p>abcdef</p>");
        run(&SpanWrapping::new(&BrokenSegmenter), &mut doc).unwrap();

        assert_eq!(doc.body().unwrap().text(), "abcdef");
        assert!(
            body_markup(&doc).contains(r#"<span class="koboSpan" id="kobo.0.0">abc</span>def"#)
        );
    }

    /// Character references belong to the sentence they appear in
    #[test]
    fn test_entity_inside_sentence() {
        let mut doc = document("<p>Caf&eacute; noir. Next.</p>");
        run(&SpanWrapping::new(&PunctuationSegmenter), &mut doc).unwrap();

        assert!(body_markup(&doc).contains(concat!(
            r#"<p><span class="koboSpan" id="kobo.0.0">Café noir.</span> "#,
            r#"<span class="koboSpan" id="kobo.0.1">Next.</span></p>"#,
        )));
    }

    /// Unknown references stay references, inside the span of their sentence
    #[test]
    fn test_unresolved_entity_inside_sentence() {
        let mut doc = document("<p>Brand &custom; rules. Next.</p>");
        run(&SpanWrapping::new(&PunctuationSegmenter), &mut doc).unwrap();

        assert!(body_markup(&doc).contains(concat!(
            r#"<p><span class="koboSpan" id="kobo.0.0">Brand &custom; rules.</span> "#,
            r#"<span class="koboSpan" id="kobo.0.1">Next.</span></p>"#,
        )));
    }
}
