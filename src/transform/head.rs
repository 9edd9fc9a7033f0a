use crate::{
    dom::Document,
    error::KepubError,
    transform::{SideEffect, Transform, TransformContext},
};

/// Precondition check: an `<html>` root with a non-empty `<head>` and a `<body>`
///
/// Never mutates the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadValidation;

impl Transform for HeadValidation {
    fn name(&self) -> &'static str {
        "head validation"
    }

    fn apply(
        &self,
        doc: &mut Document,
        ctx: &mut TransformContext,
    ) -> Result<Vec<SideEffect>, KepubError> {
        if doc.root.local_name() != "html" {
            return Err(KepubError::UnsupportedMarkup {
                path: ctx.path.to_string(),
                reason: format!("the root element is <{}>, not <html>", doc.root.name),
            });
        }

        let head = doc.head().ok_or_else(|| KepubError::MissingHead {
            path: ctx.path.to_string(),
        })?;
        if head.child_elements().next().is_none() {
            return Err(KepubError::EmptyHead {
                path: ctx.path.to_string(),
            });
        }

        if doc.body().is_none() {
            return Err(KepubError::UnsupportedMarkup {
                path: ctx.path.to_string(),
                reason: "the document has no <body> element".to_string(),
            });
        }

        Ok(vec![])
    }
}
