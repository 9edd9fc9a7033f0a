use crate::{
    config::MarkerRule,
    dom::{Document, Element, Node},
    error::KepubError,
    transform::{SideEffect, Transform, TransformContext, counted},
};

/// Unwraps Kobo marker elements, keeping their content in place
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerStripping {
    pub rule: MarkerRule,
}

impl MarkerStripping {
    pub fn new(rule: MarkerRule) -> Self {
        Self { rule }
    }

    /// Whether `element` is a marker under the configured rule
    pub fn is_marker(&self, element: &Element) -> bool {
        match (self.rule, element.local_name()) {
            (MarkerRule::V1, "span") => element.attr("class").as_deref() == Some("koboSpan"),
            (MarkerRule::V2, "span") => {
                element.has_class("koboSpan")
                    || element.attr("id").is_some_and(|id| is_kobo_span_id(&id))
            }
            (MarkerRule::V2, "div") => matches!(
                element.attr("id").as_deref(),
                Some("book-columns" | "book-inner")
            ),
            _ => false,
        }
    }

    fn strip_element(&self, element: &mut Element) -> usize {
        let mut count = 0;

        let children = std::mem::take(&mut element.children);
        let mut rebuilt = Vec::with_capacity(children.len());
        for node in children {
            match node {
                Node::Element(mut child) => {
                    count += self.strip_element(&mut child);
                    if self.is_marker(&child) {
                        rebuilt.extend(child.children);
                        count += 1;
                    } else {
                        rebuilt.push(Node::Element(child));
                    }
                }
                node => rebuilt.push(node),
            }
        }

        element.children = rebuilt;
        if count > 0 {
            element.merge_text();
        }

        count
    }
}

/// Matches `kobo.<digits>.<digits>`
pub(crate) fn is_kobo_span_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("kobo.") else {
        return false;
    };

    match rest.split_once('.') {
        Some((first, second)) => {
            !first.is_empty()
                && !second.is_empty()
                && first.bytes().all(|b| b.is_ascii_digit())
                && second.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

impl Transform for MarkerStripping {
    fn name(&self) -> &'static str {
        "kobo marker stripping"
    }

    fn apply(
        &self,
        doc: &mut Document,
        ctx: &mut TransformContext,
    ) -> Result<Vec<SideEffect>, KepubError> {
        let count = self.strip_element(&mut doc.root);
        if count > 0 {
            ctx.debug(format!("{count} Kobo marker elements removed"));
        }

        Ok(counted(count, SideEffect::MarkersRemoved))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::MarkerRule,
        transform::{
            MarkerStripping, SideEffect,
            strip::is_kobo_span_id,
            testing::{body_markup, document, run},
        },
    };

    #[test]
    fn test_single_span() {
        let mut doc = document(r#"<p><span class="koboSpan" id="kobo.0.0">Hello.</span></p>"#);
        let effects = run(&MarkerStripping::default(), &mut doc).unwrap();

        assert_eq!(effects, vec![SideEffect::MarkersRemoved(1)]);
        assert_eq!(body_markup(&doc), "<body><p>Hello.</p></body>");
    }

    /// Text around and between markers is merged back in order
    #[test]
    fn test_content_preserved() {
        let mut doc = document(concat!(
            r#"<div id="book-columns"><div id="book-inner">"#,
            r#"<p><span class="koboSpan" id="kobo.1.0">One.</span> "#,
            r#"<span class="koboSpan" id="kobo.1.1">Two <em>three</em>.</span></p>"#,
            r#"<p><span class="koboSpan" id="kobo.1.2"><img src="a.png"/></span></p>"#,
            r#"</div></div>"#,
        ));
        let before = doc.text();

        let effects = run(&MarkerStripping::new(MarkerRule::V2), &mut doc).unwrap();
        assert_eq!(effects, vec![SideEffect::MarkersRemoved(5)]);
        assert_eq!(doc.text(), before);
        assert_eq!(
            body_markup(&doc),
            r#"<body><p>One. Two <em>three</em>.</p><p><img src="a.png"/></p></body>"#
        );
    }

    /// The first rule only knows the exact class convention
    #[test]
    fn test_v1_rule() {
        let markup = concat!(
            r#"<div id="book-inner"><p>"#,
            r#"<span class="koboSpan">a</span>"#,
            r#"<span class="koboSpan extra">b</span>"#,
            r#"<span id="kobo.3.4">c</span>"#,
            r#"</p></div>"#,
        );

        let mut doc = document(markup);
        let effects = run(&MarkerStripping::new(MarkerRule::V1), &mut doc).unwrap();
        assert_eq!(effects, vec![SideEffect::MarkersRemoved(1)]);

        let mut doc = document(markup);
        let effects = run(&MarkerStripping::new(MarkerRule::V2), &mut doc).unwrap();
        assert_eq!(effects, vec![SideEffect::MarkersRemoved(4)]);
        assert_eq!(body_markup(&doc), "<body><p>abc</p></body>");
    }

    #[test]
    fn test_unrelated_spans_kept() {
        let mut doc = document(r#"<p><span class="smallcaps" id="kobo-note">x</span></p>"#);
        assert_eq!(run(&MarkerStripping::default(), &mut doc).unwrap(), vec![]);
    }

    #[test]
    fn test_kobo_span_id() {
        assert!(is_kobo_span_id("kobo.0.0"));
        assert!(is_kobo_span_id("kobo.12.345"));
        assert!(!is_kobo_span_id("kobo.1"));
        assert!(!is_kobo_span_id("kobo.a.1"));
        assert!(!is_kobo_span_id("kobo..1"));
        assert!(!is_kobo_span_id("notkobo.1.1"));
    }
}
