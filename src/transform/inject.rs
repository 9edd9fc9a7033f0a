use crate::{
    dom::{Document, Element},
    error::KepubError,
    transform::{SideEffect, Transform, TransformContext},
    utils::{parent_dir, relative_href, resolve_href},
};

/// Ensures `<link>` and `<script>` references to container resources in `<head>`
///
/// References are compared by the container path they resolve to, so running
/// the pass again, or on a document that already links the resource through a
/// differently written href, adds nothing.
#[derive(Debug, Clone, Default)]
pub struct ReferenceInjection {
    /// Container paths of stylesheets to link
    pub stylesheets: Vec<String>,

    /// Container paths of scripts to reference
    pub scripts: Vec<String>,
}

impl ReferenceInjection {
    pub fn new(stylesheets: Vec<String>, scripts: Vec<String>) -> Self {
        Self {
            stylesheets,
            scripts,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stylesheets.is_empty() && self.scripts.is_empty()
    }

    /// Container paths already referenced by the `attribute` of `local_name` elements
    fn referenced(
        head: &Element,
        local_name: &str,
        attribute: &str,
        base_dir: &str,
    ) -> Vec<String> {
        head.child_elements()
            .filter(|element| element.local_name() == local_name)
            .filter_map(|element| element.attr(attribute))
            .filter_map(|href| resolve_href(base_dir, &href))
            .collect()
    }
}

impl Transform for ReferenceInjection {
    fn name(&self) -> &'static str {
        "reference injection"
    }

    fn apply(
        &self,
        doc: &mut Document,
        ctx: &mut TransformContext,
    ) -> Result<Vec<SideEffect>, KepubError> {
        let head = doc.head_mut().ok_or_else(|| KepubError::MissingHead {
            path: ctx.path.to_string(),
        })?;
        let base_dir = parent_dir(ctx.path);

        let mut effects = Vec::new();

        let linked = Self::referenced(head, "link", "href", base_dir);
        for stylesheet in &self.stylesheets {
            if linked.contains(stylesheet) {
                continue;
            }

            let link = Element {
                self_closing: true,
                ..Element::new(&head.sibling_name("link"))
            }
            .with_attr("rel", "stylesheet")
            .with_attr("type", "text/css")
            .with_attr("href", &relative_href(ctx.path, stylesheet));
            head.append_element(link);
            effects.push(SideEffect::ReferenceAdded(stylesheet.clone()));
        }

        let loaded = Self::referenced(head, "script", "src", base_dir);
        for script in &self.scripts {
            if loaded.contains(script) {
                continue;
            }

            // Scripts always get an explicit end tag
            let element = Element::new(&head.sibling_name("script"))
                .with_attr("type", "text/javascript")
                .with_attr("src", &relative_href(ctx.path, script));
            head.append_element(element);
            effects.push(SideEffect::ReferenceAdded(script.clone()));
        }

        Ok(effects)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        dom::Document,
        transform::{
            ReferenceInjection, SideEffect,
            testing::{PATH, run},
        },
    };

    fn injection() -> ReferenceInjection {
        ReferenceInjection::new(
            vec!["OEBPS/kte-css/stylehacks.css".to_string()],
            vec!["OEBPS/kobo.js".to_string()],
        )
    }

    fn head_markup(doc: &Document) -> String {
        let head = Document {
            prolog: vec![],
            root: doc.head().unwrap().clone(),
            epilog: vec![],
        };
        String::from_utf8(head.to_bytes().unwrap()).unwrap()
    }

    #[test]
    fn test_inject_references() {
        let mut doc = Document::parse(
            "<html><head>\n  <title>T</title>\n</head><body/></html>",
            PATH,
        )
        .unwrap();

        let effects = run(&injection(), &mut doc).unwrap();
        assert_eq!(
            effects,
            vec![
                SideEffect::ReferenceAdded("OEBPS/kte-css/stylehacks.css".to_string()),
                SideEffect::ReferenceAdded("OEBPS/kobo.js".to_string()),
            ]
        );
        assert_eq!(
            head_markup(&doc),
            concat!(
                "<head>\n  <title>T</title>",
                "\n  <link rel=\"stylesheet\" type=\"text/css\" ",
                "href=\"../kte-css/stylehacks.css\"/>",
                "\n  <script type=\"text/javascript\" src=\"../kobo.js\"></script>",
                "\n</head>"
            )
        );
    }

    /// A second run adds nothing
    #[test]
    fn test_idempotent() {
        let mut doc = Document::parse(
            "<html><head><title>T</title></head><body/></html>",
            PATH,
        )
        .unwrap();

        run(&injection(), &mut doc).unwrap();
        let once = doc.clone();
        let effects = run(&injection(), &mut doc).unwrap();

        assert_eq!(effects, vec![]);
        assert_eq!(doc, once);
    }

    /// Existing references are recognized by the path they resolve to
    #[test]
    fn test_existing_reference_other_spelling() {
        let mut doc = Document::parse(
            concat!(
                r#"<html><head><link rel="stylesheet" href="./../kte-css/stylehacks.css"/>"#,
                "</head><body/></html>",
            ),
            PATH,
        )
        .unwrap();

        let effects = run(
            &ReferenceInjection::new(vec!["OEBPS/kte-css/stylehacks.css".to_string()], vec![]),
            &mut doc,
        )
        .unwrap();
        assert_eq!(effects, vec![]);
    }
}
