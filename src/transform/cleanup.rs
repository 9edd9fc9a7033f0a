//! Markup normalization passes
//!
//! [ForcedCleanup] always runs and fixes markup that readers choke on.
//! [MarkupCleanup] is optional and removes markup that is merely redundant.

use crate::{
    dom::{Document, Element, Misc, Node},
    error::KepubError,
    transform::{SideEffect, Transform, TransformContext, counted},
};

/// Formatting elements whose directly nested duplicates are redundant
const COLLAPSIBLE: [&str; 8] = ["b", "em", "i", "s", "span", "strike", "strong", "u"];

/// Inline elements removed when they carry neither attributes nor text
const REMOVABLE_WHEN_EMPTY: [&str; 12] = [
    "b", "big", "em", "font", "i", "s", "small", "span", "strike", "strong", "sub", "u",
];

const REPLACEMENT_CHARACTER: char = '\u{fffd}';

/// Fixes considered essential for the reader to render the document
///
/// - the XML declaration and `charset` metas are made to declare UTF-8, which
///   is what the document is written back as;
/// - `meta` and `link` elements are emptied and written self-closing;
/// - self-closing `script` and `p` elements get an explicit end tag;
/// - U+FFFD replacement characters are removed from text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForcedCleanup;

impl ForcedCleanup {
    fn clean_element(element: &mut Element) -> usize {
        let mut count = 0;

        if element.local_name() == "meta" && Self::relabel_charset(element) {
            count += 1;
        }

        match element.local_name() {
            "meta" | "link" if !element.children.is_empty() => {
                element.children.clear();
                element.self_closing = true;
                count += 1;
            }
            "script" | "p" if element.self_closing && element.children.is_empty() => {
                element.self_closing = false;
                count += 1;
            }
            _ => {}
        }

        for child in element.children.iter_mut() {
            match child {
                Node::Text(text) if text.contains(REPLACEMENT_CHARACTER) => {
                    text.retain(|ch| ch != REPLACEMENT_CHARACTER);
                    count += 1;
                }
                Node::Element(child) => count += Self::clean_element(child),
                _ => {}
            }
        }

        count
    }

    /// Points `<meta charset>` and `<meta http-equiv content>` at UTF-8
    fn relabel_charset(meta: &mut Element) -> bool {
        if let Some(charset) = meta.attr("charset") {
            if charset.eq_ignore_ascii_case("utf-8") {
                return false;
            }
            meta.set_attr("charset", "utf-8");
            return true;
        }

        let is_content_type = meta
            .attr("http-equiv")
            .is_some_and(|value| value.eq_ignore_ascii_case("content-type"));
        match meta.attr("content") {
            Some(content) if is_content_type => {
                let lowercase = content.to_ascii_lowercase();
                let Some(start) = lowercase.find("charset=") else {
                    return false;
                };
                let value_start = start + "charset=".len();
                if lowercase[value_start..].starts_with("utf-8") {
                    return false;
                }
                meta.set_attr("content", &format!("{}charset=utf-8", &content[..start]));
                true
            }
            _ => false,
        }
    }
}

impl Transform for ForcedCleanup {
    fn name(&self) -> &'static str {
        "forced cleanup"
    }

    fn apply(
        &self,
        doc: &mut Document,
        ctx: &mut TransformContext,
    ) -> Result<Vec<SideEffect>, KepubError> {
        let mut count = 0;

        for misc in doc.prolog.iter_mut() {
            if let Misc::Decl {
                encoding: Some(encoding),
                ..
            } = misc
            {
                if !encoding.eq_ignore_ascii_case("utf-8") {
                    ctx.debug(format!("declared encoding {encoding} replaced by UTF-8"));
                    *encoding = "UTF-8".to_string();
                    count += 1;
                }
            }
        }

        count += Self::clean_element(&mut doc.root);

        Ok(counted(count, SideEffect::Normalized))
    }
}

/// Removes redundant markup without changing the rendered text
///
/// Elements carrying an `id` are never touched, so Kobo spans and link
/// targets survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupCleanup;

impl MarkupCleanup {
    fn clean_element(element: &mut Element) -> usize {
        let mut count = 0;
        for child in element.children.iter_mut().filter_map(Node::as_element_mut) {
            count += Self::clean_element(child);
        }

        if Self::collapse_nested(element) {
            count += 1;
        }

        let children = std::mem::take(&mut element.children);
        let mut rebuilt = Vec::with_capacity(children.len());
        for node in children {
            let Node::Element(child) = node else {
                rebuilt.push(node);
                continue;
            };

            if child.has_attr("id") {
                rebuilt.push(Node::Element(child));
                continue;
            }

            let local_name = child.local_name().to_ascii_lowercase();
            if child.name.eq_ignore_ascii_case("o:p") && child.is_blank() {
                // Word paragraph markers stand for a single space
                rebuilt.push(Node::Text(" ".to_string()));
                count += 1;
            } else if child
                .prefix()
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("st1"))
            {
                rebuilt.extend(child.children);
                count += 1;
            } else if (Self::is_heading(&local_name) || Self::is_removable(&local_name, &child))
                && child.is_blank()
            {
                // Whitespace is kept so that neighbouring words stay apart
                rebuilt.extend(child.children);
                count += 1;
            } else {
                rebuilt.push(Node::Element(child));
            }
        }

        element.children = rebuilt;
        element.merge_text();

        count
    }

    /// Turns `<b><b>text</b></b>` into `<b>text</b>`
    fn collapse_nested(element: &mut Element) -> bool {
        if !element.attributes.is_empty() || !COLLAPSIBLE.contains(&element.local_name()) {
            return false;
        }

        let grandchildren = match element.children.as_mut_slice() {
            [Node::Element(inner)] if inner.name == element.name && inner.attributes.is_empty() => {
                std::mem::take(&mut inner.children)
            }
            _ => return false,
        };
        element.children = grandchildren;

        true
    }

    fn is_heading(local_name: &str) -> bool {
        matches!(local_name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
    }

    fn is_removable(local_name: &str, element: &Element) -> bool {
        element.attributes.is_empty() && REMOVABLE_WHEN_EMPTY.contains(&local_name)
    }
}

impl Transform for MarkupCleanup {
    fn name(&self) -> &'static str {
        "markup cleanup"
    }

    fn apply(
        &self,
        doc: &mut Document,
        ctx: &mut TransformContext,
    ) -> Result<Vec<SideEffect>, KepubError> {
        let Some(body) = doc.body_mut() else {
            return Ok(vec![]);
        };

        let count = Self::clean_element(body);
        if count > 0 {
            ctx.debug(format!("{count} redundant elements cleaned"));
        }

        Ok(counted(count, SideEffect::Cleaned))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        dom::{Document, Misc},
        transform::{
            ForcedCleanup, MarkupCleanup, SideEffect,
            testing::{PATH, body_markup, document, run},
        },
    };

    mod forced_cleanup_tests {
        use super::*;

        #[test]
        fn test_nothing_to_do() {
            let mut doc = document("<p>Fine.</p>");
            assert_eq!(run(&ForcedCleanup, &mut doc).unwrap(), vec![]);
        }

        #[test]
        fn test_encoding_declaration() {
            let mut doc = Document::parse(
                concat!(
                    r#"<?xml version="1.0" encoding="windows-1252"?>"#,
                    "<html><head><title/></head><body/></html>",
                ),
                PATH,
            )
            .unwrap();

            assert_eq!(
                run(&ForcedCleanup, &mut doc).unwrap(),
                vec![SideEffect::Normalized(1)]
            );
            assert!(matches!(
                &doc.prolog[0],
                Misc::Decl { encoding: Some(encoding), .. } if encoding == "UTF-8"
            ));
        }

        /// Documents are written as UTF-8, whatever their metas declared
        #[test]
        fn test_charset_metas() {
            let mut doc = Document::parse(
                concat!(
                    r#"<html><head><meta charset="ISO-8859-1"/>"#,
                    r#"<meta http-equiv="Content-Type" "#,
                    r#"content="text/html; charset=windows-1252"/>"#,
                    r#"<meta charset="UTF-8"/></head><body/></html>"#,
                ),
                PATH,
            )
            .unwrap();

            assert_eq!(
                run(&ForcedCleanup, &mut doc).unwrap(),
                vec![SideEffect::Normalized(2)]
            );
            let output = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
            assert!(output.contains(concat!(
                r#"<meta charset="utf-8"/>"#,
                r#"<meta http-equiv="Content-Type" content="text/html; charset=utf-8"/>"#,
                r#"<meta charset="UTF-8"/>"#,
            )));
        }

        #[test]
        fn test_element_fixes() {
            let mut doc = Document::parse(
                concat!(
                    r#"<html><head><meta name="a" content="b">junk</meta><script src="a.js"/>"#,
                    "</head><body><p/><p>a\u{fffd}b</p></body></html>",
                ),
                PATH,
            )
            .unwrap();

            assert_eq!(
                run(&ForcedCleanup, &mut doc).unwrap(),
                vec![SideEffect::Normalized(4)]
            );

            let output = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
            assert_eq!(
                output,
                concat!(
                    r#"<html><head><meta name="a" content="b"/><script src="a.js"></script>"#,
                    "</head><body><p></p><p>ab</p></body></html>",
                )
            );
        }
    }

    mod markup_cleanup_tests {
        use super::*;

        #[test]
        fn test_ms_cruft() {
            let mut doc =
                document(r#"<p>one<o:p>  </o:p>two <st1:place>Paris</st1:place></p>"#);
            assert_eq!(
                run(&MarkupCleanup, &mut doc).unwrap(),
                vec![SideEffect::Cleaned(2)]
            );
            assert_eq!(body_markup(&doc), "<body><p>one two Paris</p></body>");
        }

        #[test]
        fn test_empty_headings() {
            let mut doc = document("<h1> </h1><h2 id=\"anchor\"></h2><h3>Title</h3>");
            run(&MarkupCleanup, &mut doc).unwrap();
            assert_eq!(
                body_markup(&doc),
                "<body> <h2 id=\"anchor\"></h2><h3>Title</h3></body>"
            );
        }

        #[test]
        fn test_nested_formatting() {
            let mut doc = document("<p><b><b><b>bold</b></b></b> <i class=\"x\"><i>it</i></i></p>");
            assert_eq!(
                run(&MarkupCleanup, &mut doc).unwrap(),
                vec![SideEffect::Cleaned(2)]
            );
            assert_eq!(
                body_markup(&doc),
                "<body><p><b>bold</b> <i class=\"x\"><i>it</i></i></p></body>"
            );
        }

        /// Empty inline elements go, spans with identifiers stay
        #[test]
        fn test_empty_inline_elements() {
            let mut doc = document(
                r#"<p>a<span></span>b<em> </em>c<span class="koboSpan" id="kobo.0.0"></span></p>"#,
            );
            run(&MarkupCleanup, &mut doc).unwrap();
            assert_eq!(
                body_markup(&doc),
                r#"<body><p>ab c<span class="koboSpan" id="kobo.0.0"></span></p></body>"#
            );
        }

        #[test]
        fn test_visible_text_unchanged() {
            let mut doc = document("<div><p>x<b><b>y</b></b><o:p></o:p>z</p><h4></h4></div>");
            let before = doc.body().unwrap().text();
            run(&MarkupCleanup, &mut doc).unwrap();
            // The Word paragraph marker is the only thing allowed to add text
            assert_eq!(doc.body().unwrap().text(), before.replace("yz", "y z"));
        }
    }
}
