//! Container loader
//!
//! Opens an EPUB-like ZIP container, locates its OPF package and exposes the
//! manifest, the spine and the raw resources by container path. The container
//! owns every entry of the archive in its original order, so that the
//! serializer can copy untouched resources byte for byte.

use std::io::{Cursor, Read, Seek};

use indexmap::IndexMap;
use zip::ZipArchive;

use crate::{
    dom::{Document, Element, Node},
    error::KepubError,
    types::{EncryptionData, ManifestItem, SpineItem},
    utils::{compression_method_check, guess_media_type, parent_dir, relative_href, resolve_href},
};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";
const RIGHTS_PATH: &str = "META-INF/rights.xml";

/// Font obfuscation algorithms, which do not make a container DRM-encumbered
const FONT_OBFUSCATION_METHODS: [&str; 2] = [
    "http://www.idpf.org/2008/embedding",
    "http://ns.adobe.com/pdf/enc#RC",
];

/// Media types of spine entries that are dropped instead of processed
const IGNORED_SPINE_TYPES: [&str; 2] =
    ["application/vnd.adobe-page-template+xml", "application/text"];

const DTBOOK_MIMETYPE: &str = "application/x-dtbook+xml";

/// An opened container and its parsed OPF package
///
/// The invariants established by [Container::from_reader] hold for the whole
/// lifetime of the value: every spine item references an HTML manifest item,
/// the spine is never empty and every manifest item has bytes in the container.
#[derive(Debug, Clone)]
pub struct Container {
    /// Archive entries in their original order, directories excluded
    pub(crate) entries: IndexMap<String, Vec<u8>>,

    /// The path to the OPF file
    pub opf_path: String,

    /// The parsed OPF package
    pub(crate) package: Document,

    /// Whether `package` changed and has to be written back
    pub(crate) package_dirty: bool,

    /// Manifest items keyed by id, in declaration order
    pub(crate) manifest: IndexMap<String, ManifestItem>,

    /// Reading order, already cleaned of unusable entries
    pub(crate) spine: Vec<SpineItem>,

    /// Container paths of resources added after loading
    pub added: Vec<String>,

    /// Problems found while loading that did not prevent it
    pub warnings: Vec<String>,
}

impl Container {
    /// Opens a container held in memory
    pub fn from_bytes(data: &[u8]) -> Result<Self, KepubError> {
        Self::from_reader(Cursor::new(data))
    }

    /// Opens a container from a reader
    ///
    /// # Parameters
    /// - `reader`: The data source of the ZIP archive
    ///
    /// # Return
    /// - `Ok(Container)`: The loaded container
    /// - `Err(KepubError::MalformedContainer)`: The archive is unreadable, has no
    ///   OPF package, references a missing resource or has an empty spine
    /// - `Err(KepubError::UnsupportedMarkup)`: The manifest declares DTBook content
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, KepubError> {
        // Loading process
        // 1. Verify the compression methods and read every entry
        // 2. Locate and parse the OPF package
        // 3. Parse the manifest, then the spine against the manifest

        let mut archive = ZipArchive::new(reader).map_err(|err| KepubError::MalformedContainer {
            reason: format!("unreadable archive: {err}"),
        })?;
        compression_method_check(&mut archive)?;

        let mut entries = IndexMap::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }

            let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
            file.read_to_end(&mut data)?;
            entries.insert(file.name().to_string(), data);
        }

        let opf_path = Self::locate_package(&entries)?;
        let package = Document::from_bytes(&entries[&opf_path], &opf_path).map_err(|err| {
            KepubError::MalformedContainer {
                reason: format!("unreadable package document \"{opf_path}\": {err}"),
            }
        })?;

        let mut container = Self {
            entries,
            opf_path,
            package,
            package_dirty: false,
            manifest: IndexMap::new(),
            spine: Vec::new(),
            added: Vec::new(),
            warnings: Vec::new(),
        };
        container.parse_manifest()?;
        container.parse_spine()?;

        Ok(container)
    }

    /// Finds the OPF package path
    ///
    /// `META-INF/container.xml` is authoritative when present. Without it the
    /// first `.opf` file that is neither hidden nor macOS metadata is used.
    fn locate_package(entries: &IndexMap<String, Vec<u8>>) -> Result<String, KepubError> {
        let path = match entries.get(CONTAINER_PATH) {
            Some(data) => {
                let container = Document::from_bytes(data, CONTAINER_PATH).map_err(|err| {
                    KepubError::MalformedContainer {
                        reason: format!("unreadable {CONTAINER_PATH}: {err}"),
                    }
                })?;

                container
                    .root
                    .descendants()
                    .into_iter()
                    .filter(|element| element.local_name() == "rootfile")
                    .find_map(|element| element.attr("full-path"))
                    .map(|path| path.trim_start_matches('/').to_string())
                    .ok_or_else(|| KepubError::MalformedContainer {
                        reason: format!("{CONTAINER_PATH} declares no rootfile"),
                    })?
            }

            None => entries
                .keys()
                .find(|name| {
                    let file_name = name.rsplit('/').next().unwrap_or_default();
                    name.to_ascii_lowercase().ends_with(".opf")
                        && !name.starts_with("__MACOSX/")
                        && !file_name.starts_with('.')
                })
                .cloned()
                .ok_or_else(|| KepubError::MalformedContainer {
                    reason: "no OPF package found".to_string(),
                })?,
        };

        if !entries.contains_key(&path) {
            return Err(KepubError::MalformedContainer {
                reason: format!("the OPF package \"{path}\" is missing"),
            });
        }

        Ok(path)
    }

    /// Parse the `<manifest>` section of the package
    fn parse_manifest(&mut self) -> Result<(), KepubError> {
        let manifest_element =
            self.package
                .root
                .find("manifest")
                .ok_or_else(|| KepubError::MalformedContainer {
                    reason: "the package has no manifest".to_string(),
                })?;
        let base_dir = parent_dir(&self.opf_path);

        let mut manifest = IndexMap::new();
        for element in manifest_element
            .child_elements()
            .filter(|element| element.local_name() == "item")
        {
            let (Some(id), Some(href)) = (element.attr("id"), element.attr("href")) else {
                self.warnings
                    .push("manifest item without id or href ignored".to_string());
                continue;
            };

            if href.contains("://") {
                self.warnings
                    .push(format!("remote manifest item \"{id}\" ({href}) ignored"));
                continue;
            }

            let path =
                resolve_href(base_dir, &href).ok_or_else(|| KepubError::MalformedContainer {
                    reason: format!("the manifest item \"{id}\" points outside of the container"),
                })?;
            let mime = element
                .attr("media-type")
                .unwrap_or_else(|| guess_media_type(&path).to_string());

            if mime == DTBOOK_MIMETYPE {
                return Err(KepubError::UnsupportedMarkup {
                    path,
                    reason: "DTBook content documents are not supported".to_string(),
                });
            }

            if !self.entries.contains_key(&path) {
                return Err(KepubError::MalformedContainer {
                    reason: format!("the manifest references the missing resource \"{path}\""),
                });
            }

            manifest.insert(
                id.clone(),
                ManifestItem {
                    id,
                    href,
                    path,
                    mime,
                    properties: element.attr("properties"),
                },
            );
        }

        self.manifest = manifest;
        Ok(())
    }

    /// Parse the `<spine>` section of the package
    ///
    /// Entries with a missing or duplicate idref and page templates are dropped
    /// with a warning; entries pointing at anything but HTML are fatal.
    fn parse_spine(&mut self) -> Result<(), KepubError> {
        let spine_element =
            self.package
                .root
                .find("spine")
                .ok_or_else(|| KepubError::MalformedContainer {
                    reason: "the package has no spine".to_string(),
                })?;

        let mut spine: Vec<SpineItem> = Vec::new();
        for element in spine_element
            .child_elements()
            .filter(|element| element.local_name() == "itemref")
        {
            let Some(idref) = element.attr("idref") else {
                self.warnings.push("spine entry without idref removed".to_string());
                continue;
            };

            let Some(item) = self.manifest.get(&idref) else {
                self.warnings
                    .push(format!("spine entry \"{idref}\" has no manifest item, removed"));
                continue;
            };

            if spine.iter().any(|existing| existing.idref == idref) {
                self.warnings
                    .push(format!("duplicate spine entry \"{idref}\" removed"));
                continue;
            }

            if IGNORED_SPINE_TYPES.contains(&item.mime.as_str()) {
                self.warnings.push(format!(
                    "spine entry \"{idref}\" of type {} removed",
                    item.mime
                ));
                continue;
            }

            if !item.is_html() {
                return Err(KepubError::MalformedContainer {
                    reason: format!(
                        "the spine entry \"{idref}\" has the non-HTML media type {}",
                        item.mime
                    ),
                });
            }

            spine.push(SpineItem {
                idref,
                path: item.path.clone(),
                linear: element.attr("linear").is_none_or(|linear| linear != "no"),
            });
        }

        if spine.is_empty() {
            return Err(KepubError::MalformedContainer {
                reason: "the spine has no content document".to_string(),
            });
        }

        self.spine = spine;
        Ok(())
    }

    /// Manifest items keyed by id, in declaration order
    pub fn manifest(&self) -> &IndexMap<String, ManifestItem> {
        &self.manifest
    }

    /// The cleaned reading order
    pub fn spine(&self) -> &[SpineItem] {
        &self.spine
    }

    /// Returns the path and media type of a manifest item
    pub fn get_manifest_entry(&self, id: &str) -> Option<(&str, &str)> {
        self.manifest
            .get(id)
            .map(|item| (item.path.as_str(), item.mime.as_str()))
    }

    /// Returns the container paths of the spine documents in reading order
    pub fn get_spine_order(&self) -> Vec<&str> {
        self.spine.iter().map(|item| item.path.as_str()).collect()
    }

    /// Returns the manifest item stored at a container path
    pub fn manifest_item_by_path(&self, path: &str) -> Option<&ManifestItem> {
        self.manifest.values().find(|item| item.path == path)
    }

    /// Paths of every HTML content document of the manifest, in manifest order
    pub fn html_names(&self) -> impl Iterator<Item = &str> {
        self.manifest
            .values()
            .filter(|item| item.is_html())
            .map(|item| item.path.as_str())
    }

    pub fn has_resource(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Reads the raw bytes of a resource
    pub fn read_resource(&self, path: &str) -> Result<&[u8], KepubError> {
        self.entries
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| KepubError::ResourceNotFound {
                resource: path.to_string(),
            })
    }

    /// Replaces the bytes of an existing resource, keeping its archive position
    pub fn replace_resource(&mut self, path: &str, data: Vec<u8>) -> Result<(), KepubError> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| KepubError::ResourceNotFound {
                resource: path.to_string(),
            })?;
        *entry = data;

        Ok(())
    }

    /// Adds a resource to the archive and the manifest, never to the spine
    ///
    /// Adding a path that is already in the manifest only replaces its bytes.
    ///
    /// # Return
    /// - The manifest id of the resource
    pub fn add_resource(&mut self, path: &str, data: Vec<u8>, mime: &str) -> String {
        if let Some(item) = self.manifest_item_by_path(path) {
            let id = item.id.clone();
            self.entries.insert(path.to_string(), data);
            return id;
        }

        let id = self.unique_id(path);
        let href = relative_href(&self.opf_path, path);

        if let Some(manifest_element) = self.package.root.find_mut("manifest") {
            let item = Element {
                self_closing: true,
                ..Element::new(&manifest_element.sibling_name("item"))
            }
            .with_attr("id", &id)
            .with_attr("href", &href)
            .with_attr("media-type", mime);

            manifest_element.append_element(item);
        }

        self.manifest.insert(
            id.clone(),
            ManifestItem {
                id: id.clone(),
                href,
                path: path.to_string(),
                mime: mime.to_string(),
                properties: None,
            },
        );
        self.entries.insert(path.to_string(), data);
        self.added.push(path.to_string());
        self.package_dirty = true;

        id
    }

    /// Derives a manifest id from a file name, unique within the manifest
    fn unique_id(&self, path: &str) -> String {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let stem = file_name.split('.').next().unwrap_or(file_name);
        let base: String = stem
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
            .collect();
        let base = match base.chars().next() {
            Some(ch) if ch.is_ascii_alphabetic() => base,
            _ => format!("res_{base}"),
        };

        let mut id = base.clone();
        let mut counter = 1;
        while self.manifest.contains_key(&id) {
            id = format!("{base}-{counter}");
            counter += 1;
        }
        id
    }

    /// Sets the `properties` attribute of a manifest item
    pub fn set_manifest_properties(
        &mut self,
        id: &str,
        properties: &str,
    ) -> Result<(), KepubError> {
        let item = self
            .manifest
            .get_mut(id)
            .ok_or_else(|| KepubError::ResourceNotFound {
                resource: id.to_string(),
            })?;
        item.properties = Some(properties.to_string());

        if let Some(manifest_element) = self.package.root.find_mut("manifest") {
            if let Some(element) = manifest_element
                .children
                .iter_mut()
                .filter_map(Node::as_element_mut)
                .find(|element| element.attr("id").as_deref() == Some(id))
            {
                element.set_attr("properties", properties);
            }
        }
        self.package_dirty = true;

        Ok(())
    }

    /// The parsed OPF package
    pub fn package(&self) -> &Document {
        &self.package
    }

    /// Mutable access to the OPF package, which will be written back
    pub fn package_mut(&mut self) -> &mut Document {
        self.package_dirty = true;
        &mut self.package
    }

    pub fn package_dirty(&self) -> bool {
        self.package_dirty
    }

    /// The first `dc:language` declared by the package
    pub fn language(&self) -> Option<String> {
        self.package
            .root
            .find("metadata")?
            .child_elements()
            .find(|element| element.local_name() == "language")
            .map(|element| element.text().trim().to_string())
            .filter(|language| !language.is_empty())
    }

    /// Parse `META-INF/encryption.xml`
    ///
    /// Returns an empty list when the container has no encryption file.
    pub fn encryption(&self) -> Result<Vec<EncryptionData>, KepubError> {
        let Some(data) = self.entries.get(ENCRYPTION_PATH) else {
            return Ok(Vec::new());
        };

        let root = Document::from_bytes(data, ENCRYPTION_PATH)?.root;
        let mut encryption_data = Vec::new();
        for element in root
            .descendants()
            .into_iter()
            .filter(|element| element.local_name() == "EncryptedData")
        {
            let method = element
                .find("EncryptionMethod")
                .and_then(|method| method.attr("Algorithm"))
                .ok_or_else(|| KepubError::MalformedContainer {
                    reason: format!("{ENCRYPTION_PATH} has an entry without algorithm"),
                })?;
            let data = element
                .find("CipherReference")
                .and_then(|reference| reference.attr("URI"))
                .unwrap_or_default();

            encryption_data.push(EncryptionData { method, data });
        }

        Ok(encryption_data)
    }

    /// Whether the container holds resources protected by DRM
    ///
    /// Font obfuscation is not DRM. An encryption file that cannot be read is
    /// assumed to protect something.
    pub fn is_drm_encumbered(&self) -> bool {
        if self.entries.contains_key(RIGHTS_PATH) {
            return true;
        }

        match self.encryption() {
            Ok(encryption_data) => encryption_data
                .iter()
                .any(|data| !FONT_OBFUSCATION_METHODS.contains(&data.method.as_str())),
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        container::Container,
        error::KepubError,
        utils::fixtures::{CONTAINER_XML, build_zip, epub, package, xhtml},
    };

    fn two_chapters() -> Vec<u8> {
        epub(&[
            ("Text/ch1.xhtml", &xhtml("<p>One</p>")),
            ("Text/ch2.xhtml", &xhtml("<p>Two</p>")),
        ])
    }

    mod load_tests {
        use super::*;

        #[test]
        fn test_load_manifest_and_spine() {
            let container = Container::from_bytes(&two_chapters()).unwrap();

            assert_eq!(container.opf_path, "OEBPS/content.opf");
            assert_eq!(
                container.get_spine_order(),
                vec!["OEBPS/Text/ch1.xhtml", "OEBPS/Text/ch2.xhtml"]
            );
            assert_eq!(
                container.get_manifest_entry("css"),
                Some(("OEBPS/style.css", "text/css"))
            );
            assert_eq!(container.html_names().count(), 2);
            assert_eq!(container.language().as_deref(), Some("en"));

            let ids: Vec<&str> = container.manifest().keys().map(String::as_str).collect();
            assert_eq!(ids, vec!["ch0", "ch1", "css"]);
            let spine = container.spine();
            assert_eq!(spine.len(), 2);
            assert_eq!(spine[1].idref, "ch1");
            assert!(spine.iter().all(|item| item.linear));
            assert_eq!(
                container.read_resource("OEBPS/style.css").unwrap(),
                b"p { margin: 0; }"
            );
        }

        #[test]
        fn test_read_missing_resource() {
            let container = Container::from_bytes(&two_chapters()).unwrap();
            let result = container.read_resource("OEBPS/nope.css");
            assert_eq!(
                result.unwrap_err(),
                KepubError::ResourceNotFound {
                    resource: "OEBPS/nope.css".to_string()
                }
            );
        }

        #[test]
        fn test_not_a_zip() {
            let result = Container::from_bytes(b"definitely not a zip archive");
            assert!(matches!(result, Err(KepubError::MalformedContainer { .. })));
        }

        /// Without container.xml the first visible OPF file is used
        #[test]
        fn test_package_fallback() {
            let chapter = xhtml("<p>One</p>");
            let opf = package(&[("ch1.xhtml", &chapter)], "");
            let data = build_zip(&[
                ("mimetype", b"application/epub+zip"),
                ("__MACOSX/OEBPS/._content.opf", b"junk"),
                ("OEBPS/content.opf", opf.as_bytes()),
                ("OEBPS/style.css", b""),
                ("OEBPS/ch1.xhtml", chapter.as_bytes()),
            ]);

            let container = Container::from_bytes(&data).unwrap();
            assert_eq!(container.opf_path, "OEBPS/content.opf");
        }

        #[test]
        fn test_no_package() {
            let data = build_zip(&[("mimetype", b"application/epub+zip")]);
            assert!(matches!(
                Container::from_bytes(&data),
                Err(KepubError::MalformedContainer { .. })
            ));
        }

        #[test]
        fn test_missing_manifest_resource() {
            let chapter = xhtml("<p>One</p>");
            let opf = package(&[("ch1.xhtml", &chapter)], "");
            let data = build_zip(&[
                ("mimetype", b"application/epub+zip"),
                ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
                ("OEBPS/content.opf", opf.as_bytes()),
                ("OEBPS/style.css", b""),
            ]);

            assert!(matches!(
                Container::from_bytes(&data),
                Err(KepubError::MalformedContainer { .. })
            ));
        }

        #[test]
        fn test_dtbook_rejected() {
            let chapter = xhtml("<p>One</p>");
            let opf = package(
                &[("ch1.xhtml", &chapter)],
                concat!(
                    r#"    <item id="book" href="book.xml" "#,
                    r#"media-type="application/x-dtbook+xml"/>"#,
                    "\n",
                ),
            );
            let data = build_zip(&[
                ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
                ("OEBPS/content.opf", opf.as_bytes()),
                ("OEBPS/style.css", b""),
                ("OEBPS/ch1.xhtml", chapter.as_bytes()),
                ("OEBPS/book.xml", b"<dtbook/>"),
            ]);

            assert!(matches!(
                Container::from_bytes(&data),
                Err(KepubError::UnsupportedMarkup { .. })
            ));
        }
    }

    mod spine_tests {
        use super::*;

        fn container_with_spine(
            spine: &str,
            extra_manifest: &str,
        ) -> Result<Container, KepubError> {
            let chapter = xhtml("<p>One</p>");
            let opf = package(&[("ch1.xhtml", &chapter)], extra_manifest)
                .replace("    <itemref idref=\"ch0\"/>\n", spine);
            let data = build_zip(&[
                ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
                ("OEBPS/content.opf", opf.as_bytes()),
                ("OEBPS/style.css", b""),
                ("OEBPS/ch1.xhtml", chapter.as_bytes()),
                ("OEBPS/page.xpgt", b"<template/>"),
            ]);
            Container::from_bytes(&data)
        }

        /// Missing, duplicate and page template entries are dropped
        #[test]
        fn test_spine_cleanup() {
            let container = container_with_spine(
                concat!(
                    r#"<itemref idref="ghost"/><itemref idref="ch0"/>"#,
                    r#"<itemref idref="ch0"/><itemref idref="tpl"/>"#,
                ),
                concat!(
                    r#"    <item id="tpl" href="page.xpgt" "#,
                    r#"media-type="application/vnd.adobe-page-template+xml"/>"#,
                    "\n",
                ),
            )
            .unwrap();

            assert_eq!(container.get_spine_order(), vec!["OEBPS/ch1.xhtml"]);
            assert_eq!(container.warnings.len(), 3);
        }

        #[test]
        fn test_empty_spine() {
            let result = container_with_spine("", "");
            assert!(matches!(result, Err(KepubError::MalformedContainer { .. })));
        }

        #[test]
        fn test_non_html_spine_entry() {
            let result = container_with_spine("<itemref idref=\"css\"/>", "");
            assert!(matches!(result, Err(KepubError::MalformedContainer { .. })));
        }

        #[test]
        fn test_non_linear_entry() {
            let container =
                container_with_spine("<itemref idref=\"ch0\" linear=\"no\"/>", "").unwrap();
            assert!(!container.spine[0].linear);
        }
    }

    mod resource_tests {
        use super::*;

        #[test]
        fn test_add_resource() {
            let mut container = Container::from_bytes(&two_chapters()).unwrap();
            assert!(!container.package_dirty());

            let id = container.add_resource(
                "OEBPS/kte-css/stylehacks.css",
                b"body {}".to_vec(),
                "text/css",
            );
            assert_eq!(id, "stylehacks");
            assert!(container.package_dirty());
            assert_eq!(
                container.get_manifest_entry("stylehacks"),
                Some(("OEBPS/kte-css/stylehacks.css", "text/css"))
            );

            let item = container
                .package()
                .root
                .find("manifest")
                .unwrap()
                .child_elements()
                .last()
                .unwrap()
                .clone();
            assert_eq!(item.attr("href").as_deref(), Some("kte-css/stylehacks.css"));

            // The spine never receives added resources
            assert_eq!(container.spine.len(), 2);

            // Adding the same path again only replaces the bytes
            let again = container.add_resource(
                "OEBPS/kte-css/stylehacks.css",
                b"p {}".to_vec(),
                "text/css",
            );
            assert_eq!(again, id);
            assert_eq!(container.added.len(), 1);
            assert_eq!(
                container.read_resource("OEBPS/kte-css/stylehacks.css").unwrap(),
                b"p {}"
            );
        }

        #[test]
        fn test_unique_ids() {
            let mut container = Container::from_bytes(&two_chapters()).unwrap();
            let first = container.add_resource("OEBPS/a/css.css", vec![], "text/css");
            let second = container.add_resource("OEBPS/b/css.css", vec![], "text/css");
            assert_eq!(first, "css-1");
            assert_eq!(second, "css-2");
        }

        #[test]
        fn test_replace_resource() {
            let mut container = Container::from_bytes(&two_chapters()).unwrap();
            container
                .replace_resource("OEBPS/style.css", b"h1 {}".to_vec())
                .unwrap();
            assert_eq!(container.read_resource("OEBPS/style.css").unwrap(), b"h1 {}");
            assert!(container.replace_resource("OEBPS/none.css", vec![]).is_err());
        }
    }

    mod drm_tests {
        use super::*;

        fn with_extra(name: &str, data: &[u8]) -> Container {
            let chapter = xhtml("<p>One</p>");
            let opf = package(&[("ch1.xhtml", &chapter)], "");
            let data = build_zip(&[
                ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
                (name, data),
                ("OEBPS/content.opf", opf.as_bytes()),
                ("OEBPS/style.css", b""),
                ("OEBPS/ch1.xhtml", chapter.as_bytes()),
            ]);
            Container::from_bytes(&data).unwrap()
        }

        fn encryption_xml(algorithm: &str) -> String {
            format!(
                r#"<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container"
    xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="{algorithm}"/>
    <enc:CipherData><enc:CipherReference URI="OEBPS/font.otf"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#
            )
        }

        #[test]
        fn test_plain_container() {
            let container = Container::from_bytes(&two_chapters()).unwrap();
            assert!(!container.is_drm_encumbered());
        }

        #[test]
        fn test_font_obfuscation_is_not_drm() {
            let xml = encryption_xml("http://www.idpf.org/2008/embedding");
            let container = with_extra("META-INF/encryption.xml", xml.as_bytes());
            assert!(!container.is_drm_encumbered());
            assert_eq!(container.encryption().unwrap()[0].data, "OEBPS/font.otf");
        }

        #[test]
        fn test_encrypted_content() {
            let xml = encryption_xml("http://www.w3.org/2001/04/xmlenc#aes128-cbc");
            let container = with_extra("META-INF/encryption.xml", xml.as_bytes());
            assert!(container.is_drm_encumbered());
        }

        #[test]
        fn test_rights_file() {
            let container = with_extra("META-INF/rights.xml", b"<rights/>");
            assert!(container.is_drm_encumbered());
        }

        #[test]
        fn test_unreadable_encryption_file() {
            let container = with_extra("META-INF/encryption.xml", b"<encryption><broken>");
            assert!(container.is_drm_encumbered());
        }
    }
}
