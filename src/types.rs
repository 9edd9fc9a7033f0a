/// Represents a resource item declared in the package manifest
///
/// The `ManifestItem` structure represents a single resource file declared in the
/// OPF manifest. Every resource the pipeline reads, rewrites or adds is addressed
/// through one of these entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    /// The manifest identifier of the resource
    pub id: String,

    /// The href exactly as written in the OPF
    pub href: String,

    /// The path to the resource file within the container
    ///
    /// The href resolved against the directory of the OPF file, with
    /// percent-encoding decoded and `.`/`..` segments collapsed.
    pub path: String,

    /// The media type of the resource
    pub mime: String,

    /// Optional properties associated with this resource
    ///
    /// This field contains a space-separated list of properties, such as `nav`
    /// or `cover-image`.
    pub properties: Option<String>,
}

impl ManifestItem {
    /// Whether the resource is a content document the pipeline can rewrite
    pub fn is_html(&self) -> bool {
        crate::utils::HTML_MIMETYPES.contains(&self.mime.as_str())
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|value| value.split_whitespace().any(|token| token == property))
    }
}

/// Represents an item in the spine, defining the reading order of the publication
///
/// Spine items are only kept when they reference an existing HTML manifest item,
/// so `path` is always a readable content document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    /// The ID reference to a manifest item
    pub idref: String,

    /// The container path of the referenced content document
    pub path: String,

    /// Indicates whether this item is part of the linear reading order
    pub linear: bool,
}

/// Represents encryption information for container resources
///
/// This structure holds one `EncryptedData` entry of `META-INF/encryption.xml`:
/// which resource is encrypted and with what algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionData {
    /// The encryption algorithm URI
    ///
    /// Font obfuscation methods that do not prevent rewriting the container:
    /// - IDPF font obfuscation: "http://www.idpf.org/2008/embedding"
    /// - Adobe font obfuscation: "http://ns.adobe.com/pdf/enc#RC"
    pub method: String,

    /// The URI of the encrypted resource
    pub data: String,
}

#[cfg(test)]
mod tests {
    use crate::types::ManifestItem;

    fn item(mime: &str, properties: Option<&str>) -> ManifestItem {
        ManifestItem {
            id: "id".to_string(),
            href: "a".to_string(),
            path: "OEBPS/a".to_string(),
            mime: mime.to_string(),
            properties: properties.map(str::to_string),
        }
    }

    #[test]
    fn test_manifest_item_kinds() {
        assert!(item("application/xhtml+xml", None).is_html());
        assert!(item("text/html", None).is_html());
        assert!(!item("text/css", None).is_html());
        assert!(item("image/jpeg", None).is_image());
    }

    #[test]
    fn test_manifest_item_properties() {
        let cover = item("image/jpeg", Some("svg cover-image"));
        assert!(cover.has_property("cover-image"));
        assert!(!cover.has_property("cover"));
        assert!(!item("image/jpeg", None).has_property("cover-image"));
    }
}
