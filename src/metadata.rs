//! Publication metadata
//!
//! Reads and replaces the bibliographic record held in the OPF `<metadata>`
//! element. Fields that are not part of [KepubMetadata] are left as they are.

use indexmap::IndexMap;

use crate::{
    container::Container,
    dom::{Element, Node},
    error::KepubError,
    report::ConversionReport,
    utils::NormalizeWhitespace,
};

const SERIES_META: &str = "calibre:series";
const SERIES_INDEX_META: &str = "calibre:series_index";
const COVER_META: &str = "cover";
const COVER_PROPERTY: &str = "cover-image";
const OPF_NAMESPACE: &str = "http://www.idpf.org/2007/opf";

/// The bibliographic record of a publication
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KepubMetadata {
    pub title: Option<String>,

    /// Creators without a role, or with the `aut` role, in document order
    pub authors: Vec<String>,

    pub language: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<f64>,

    /// Identifier values keyed by their `opf:scheme`, or their id without one
    pub identifiers: IndexMap<String, String>,

    /// Remaining `<meta name content>` pairs
    pub custom: IndexMap<String, String>,
}

/// Reads the metadata record from the package of `container`
pub fn read_metadata(container: &Container) -> KepubMetadata {
    let mut metadata = KepubMetadata::default();
    let Some(metadata_element) = container.package().root.find("metadata") else {
        return metadata;
    };

    for element in metadata_element.descendants().into_iter().skip(1) {
        let text = element.text().normalize_whitespace();
        match element.local_name() {
            "title" if metadata.title.is_none() && !text.is_empty() => metadata.title = Some(text),
            "creator" if is_author(element) && !text.is_empty() => metadata.authors.push(text),
            "language" if metadata.language.is_none() && !text.is_empty() => {
                metadata.language = Some(text)
            }
            "identifier" if !text.is_empty() => {
                if let Some(scheme) = identifier_scheme(element) {
                    metadata.identifiers.entry(scheme).or_insert(text);
                }
            }
            "meta" => {
                let (Some(name), Some(content)) = (element.attr("name"), element.attr("content"))
                else {
                    continue;
                };
                match name.as_str() {
                    SERIES_META => metadata.series = Some(content),
                    SERIES_INDEX_META => metadata.series_index = content.trim().parse().ok(),
                    _ => {
                        metadata.custom.insert(name, content);
                    }
                }
            }
            _ => {}
        }
    }

    metadata
}

/// Replaces the metadata record in the package of `container`
///
/// Identifiers and custom fields are updated or added, never removed, so that
/// the package keeps its unique identifier. The cover image fix-up runs
/// afterwards.
pub fn write_metadata(
    container: &mut Container,
    metadata: &KepubMetadata,
    report: &mut ConversionReport,
) -> Result<(), KepubError> {
    let package = container.package_mut();
    let mut opf = {
        let scope: Vec<&Element> = std::iter::once(&package.root)
            .chain(package.root.find("metadata"))
            .collect();
        opf_prefix(&scope)
    };
    let metadata_element =
        package
            .root
            .find_mut("metadata")
            .ok_or_else(|| KepubError::MalformedContainer {
                reason: "the package has no metadata element".to_string(),
            })?;
    let dc = dc_prefix(metadata_element);

    match &metadata.title {
        Some(title) => set_dc_text(metadata_element, &dc, "title", title),
        None => {
            remove_children(metadata_element, |element| element.local_name() == "title");
        }
    }

    remove_children(metadata_element, |element| {
        element.local_name() == "creator" && is_author(element)
    });
    for author in &metadata.authors {
        let creator = Element::new(&format!("{dc}:creator")).with_child(Node::Text(author.clone()));
        metadata_element.append_element(creator);
    }

    match &metadata.language {
        Some(language) => set_dc_text(metadata_element, &dc, "language", language),
        None => {
            remove_children(metadata_element, |element| element.local_name() == "language");
        }
    }

    for (scheme, value) in &metadata.identifiers {
        let existing = metadata_element
            .children
            .iter_mut()
            .filter_map(Node::as_element_mut)
            .find(|element| {
                element.local_name() == "identifier"
                    && identifier_scheme(element).as_deref() == Some(scheme.as_str())
            });
        match existing {
            Some(element) => element.set_text(value),
            None => {
                // EPUB 3 packages usually leave the prefix unbound
                let opf = opf.get_or_insert_with(|| {
                    metadata_element.set_attr("xmlns:opf", OPF_NAMESPACE);
                    "opf".to_string()
                });
                let identifier = Element::new(&format!("{dc}:identifier"))
                    .with_attr(&format!("{opf}:scheme"), scheme)
                    .with_child(Node::Text(value.clone()));
                metadata_element.append_element(identifier);
            }
        }
    }

    set_meta(metadata_element, SERIES_META, metadata.series.as_deref());
    let series_index = metadata.series_index.map(|index| index.to_string());
    set_meta(metadata_element, SERIES_INDEX_META, series_index.as_deref());
    for (name, content) in &metadata.custom {
        set_meta(metadata_element, name, Some(content));
    }

    report.debug(None, "metadata replaced");
    fix_cover_image(container, report)?;

    Ok(())
}

/// Marks the cover image of the manifest with the `cover-image` property
///
/// The cover is the item named by `<meta name="cover">`, by id or by href.
/// Without one, the first image item whose id starts with `cover` is used.
///
/// # Return
/// - `Ok(true)`: A cover image was found
/// - `Ok(false)`: The publication has no recognizable cover
pub fn fix_cover_image(
    container: &mut Container,
    report: &mut ConversionReport,
) -> Result<bool, KepubError> {
    let cover_reference = container
        .package()
        .root
        .find("metadata")
        .into_iter()
        .flat_map(|metadata| metadata.descendants())
        .find(|element| {
            element.local_name() == "meta" && element.attr("name").as_deref() == Some(COVER_META)
        })
        .and_then(|element| element.attr("content"));

    let from_meta = cover_reference.and_then(|reference| {
        container
            .manifest
            .get(&reference)
            .or_else(|| {
                container
                    .manifest
                    .values()
                    .find(|item| item.href == reference && item.is_image())
            })
            .map(|item| item.id.clone())
    });
    let cover_id = from_meta.or_else(|| {
        container
            .manifest
            .values()
            .find(|item| item.id.to_lowercase().starts_with("cover") && item.is_image())
            .map(|item| item.id.clone())
    });

    let Some(cover_id) = cover_id else {
        report.debug(None, "no cover image found");
        return Ok(false);
    };

    let properties = &container.manifest[&cover_id].properties;
    if container.manifest[&cover_id].has_property(COVER_PROPERTY) {
        report.debug(None, format!("{cover_id} is already the cover image"));
        return Ok(true);
    }

    let properties = match properties.as_deref().map(str::trim) {
        Some(existing) if !existing.is_empty() => format!("{existing} {COVER_PROPERTY}"),
        _ => COVER_PROPERTY.to_string(),
    };
    container.set_manifest_properties(&cover_id, &properties)?;
    report.info(None, format!("{cover_id} marked as the cover image"));

    Ok(true)
}

/// The prefix the package or metadata element binds to the OPF namespace
fn opf_prefix(scope: &[&Element]) -> Option<String> {
    scope
        .iter()
        .flat_map(|element| &element.attributes)
        .find_map(|attr| {
            let prefix = attr.name.strip_prefix("xmlns:")?;
            (attr.value == OPF_NAMESPACE).then(|| prefix.to_string())
        })
}

/// Whether a `dc:creator` is an author
fn is_author(element: &Element) -> bool {
    match element.attr("opf:role").or_else(|| element.attr("role")) {
        Some(role) => role == "aut",
        None => true,
    }
}

fn identifier_scheme(element: &Element) -> Option<String> {
    element
        .attr("opf:scheme")
        .or_else(|| element.attr("scheme"))
        .or_else(|| element.attr("id"))
}

/// Prefix the package binds to Dublin Core elements, `dc` when unknown
fn dc_prefix(metadata: &Element) -> String {
    metadata
        .descendants()
        .into_iter()
        .find(|element| matches!(element.local_name(), "title" | "identifier" | "language"))
        .and_then(|element| element.prefix())
        .unwrap_or("dc")
        .to_string()
}

/// Sets the text of the first `local_name` child, adding one if missing
fn set_dc_text(metadata: &mut Element, dc: &str, local_name: &str, text: &str) {
    match metadata.child_element_mut(local_name) {
        Some(element) => element.set_text(text),
        None => {
            let element = Element::new(&format!("{dc}:{local_name}"))
                .with_child(Node::Text(text.to_string()));
            metadata.append_element(element);
        }
    }
}

/// Sets, adds or removes a `<meta name content>` pair
fn set_meta(metadata: &mut Element, name: &str, content: Option<&str>) {
    let is_match = |element: &Element| {
        element.local_name() == "meta" && element.attr("name").as_deref() == Some(name)
    };

    let Some(content) = content else {
        remove_children(metadata, is_match);
        return;
    };

    let existing = metadata
        .children
        .iter_mut()
        .filter_map(Node::as_element_mut)
        .find(|element| is_match(&**element));
    match existing {
        Some(element) => element.set_attr("content", content),
        None => {
            let meta = Element {
                self_closing: true,
                ..Element::new(&metadata.sibling_name("meta"))
            }
            .with_attr("name", name)
            .with_attr("content", content);
            metadata.append_element(meta);
        }
    }
}

/// Removes the matching child elements with the whitespace preceding them
fn remove_children(parent: &mut Element, predicate: impl Fn(&Element) -> bool) -> usize {
    let children = std::mem::take(&mut parent.children);
    let mut removed = 0;

    for child in children {
        if child.as_element().is_some_and(&predicate) {
            if parent.children.last().is_some_and(Node::is_whitespace) {
                parent.children.pop();
            }
            removed += 1;
            continue;
        }
        parent.children.push(child);
    }

    removed
}
