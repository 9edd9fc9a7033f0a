use std::io::{Read, Seek};

use chrono::Utc;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use percent_encoding::percent_decode_str;
use zip::{CompressionMethod, ZipArchive};

use crate::error::KepubError;

/// Media types treated as content documents
pub const HTML_MIMETYPES: [&str; 2] = ["application/xhtml+xml", "text/html"];

pub const CSS_MIMETYPE: &str = "text/css";

pub const JS_MIMETYPE: &str = "application/javascript";

/// Returns the current UTC time in the format used by the details file
pub fn local_time() -> String {
    Utc::now().format("%a %b %e %H:%M:%S %Y").to_string()
}

/// Checks if the compression method of all entries in the container
/// conforms to the OCF requirements.
///
/// OCF containers can only use either Stored (uncompressed) or Deflated
/// (deflate compression). Any other method makes the container malformed.
pub fn compression_method_check<R: Read + Seek>(
    zip_archive: &mut ZipArchive<R>,
) -> Result<(), KepubError> {
    for index in 0..zip_archive.len() {
        let file = zip_archive.by_index(index)?;

        match file.compression() {
            CompressionMethod::Stored | CompressionMethod::Deflated => continue,
            _ => {
                return Err(KepubError::MalformedContainer {
                    reason: format!(
                        "the \"{}\" file uses the unsupported \"{}\" compression method",
                        file.name(),
                        file.compression()
                    ),
                });
            }
        };
    }

    Ok(())
}

/// Returns the directory part of a container path, without a trailing slash
///
/// Files at the container root have an empty directory.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Resolves an href found in a document located in `base_dir` to a container path
///
/// Fragments and queries are dropped, percent-encoding is decoded and
/// `.`/`..` segments are collapsed. Returns `None` for remote URLs and for
/// links that would leave the container root.
pub fn resolve_href(base_dir: &str, href: &str) -> Option<String> {
    let href = href.split(['#', '?']).next().unwrap_or_default();
    if href.is_empty() || href.contains("://") || href.starts_with("data:") {
        return None;
    }

    let href = percent_decode_str(href).decode_utf8_lossy();
    let (mut segments, relative): (Vec<&str>, &str) = match href.strip_prefix('/') {
        Some(absolute) => (Vec::new(), absolute),
        None => (
            base_dir.split('/').filter(|s| !s.is_empty()).collect(),
            &href[..],
        ),
    };

    for segment in relative.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                // failed to navigate up,
                // which means we're trying to escape the root directory
                segments.pop()?;
            }
            _ => segments.push(segment),
        }
    }

    Some(segments.join("/"))
}

/// Computes the href that a document at `from_doc` must use to reach `target`
///
/// Both arguments are container paths.
pub fn relative_href(from_doc: &str, target: &str) -> String {
    let from: Vec<&str> = parent_dir(from_doc)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let to: Vec<&str> = target.split('/').collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    // The last segment of `to` is the file name and never part of the shared prefix
    let common = common.min(to.len().saturating_sub(1));

    let mut parts = vec![".."; from.len() - common];
    parts.extend_from_slice(&to[common..]);
    parts.join("/")
}

/// Guesses the media type of a resource from its file extension
pub fn guess_media_type(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xhtml" | "xht" => "application/xhtml+xml",
        "html" | "htm" => "text/html",
        "opf" => "application/oebps-package+xml",
        "ncx" => "application/x-dtbncx+xml",
        "css" => CSS_MIMETYPE,
        "js" => JS_MIMETYPE,
        "json" | "kte" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Provides functionality to decode byte data into strings
///
/// It supports automatic detection of multiple encoding formats,
/// including UTF-8 (with or without BOM), UTF-16 BE, and UTF-16 LE.
///
/// ## Notes
/// - Data without a BOM (Byte Order Mark) that is not valid UTF-8 is decoded with
///   the encoding its XML declaration or `charset` meta names, and with
///   Windows-1252 when it names none.
/// - Decoding never substitutes characters: data that is invalid in its
///   encoding fails with [KepubError::EncodingError].
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, KepubError>;
}

impl DecodeBytes for [u8] {
    fn decode(&self) -> Result<String, KepubError> {
        if self.is_empty() || self.len() < 4 {
            return Err(KepubError::EmptyDataError);
        }

        match self[0..3] {
            // Check UTF-8 BOM (0xEF, 0xBB, 0xBF)
            [0xEF, 0xBB, 0xBF, ..] => {
                String::from_utf8(self[3..].to_vec()).map_err(KepubError::from)
            }

            // Check UTF-16 BE BOM (0xFE, 0xFF)
            [0xFE, 0xFF, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(KepubError::from)
            }

            // Check UTF-16 LE BOM (0xFF, 0xFE)
            [0xFF, 0xFE, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(KepubError::from)
            }

            _ => match std::str::from_utf8(self) {
                Ok(utf8_str) => Ok(utf8_str.to_string()),
                Err(_) => decode_declared(self),
            },
        }
    }
}

/// Decodes data that is not UTF-8 with the encoding it declares
///
/// A declared UTF-8 is not trusted here, the data already failed to decode as
/// such. Windows-1252 is a superset of ISO-8859-1 and the usual encoding of
/// such mislabeled documents.
fn decode_declared(data: &[u8]) -> Result<String, KepubError> {
    let encoding = match declared_encoding(data) {
        Some(label) => Encoding::for_label(label.as_bytes())
            .ok_or(KepubError::EncodingError { encoding: label })?,
        None => WINDOWS_1252,
    };
    let encoding = if encoding == UTF_8 { WINDOWS_1252 } else { encoding };

    encoding
        .decode_without_bom_handling_and_without_replacement(data)
        .map(|text| text.into_owned())
        .ok_or_else(|| KepubError::EncodingError {
            encoding: encoding.name().to_string(),
        })
}

/// Finds the encoding named by the XML declaration or a `charset` in the first kilobyte
fn declared_encoding(data: &[u8]) -> Option<String> {
    // Labels are ASCII, other bytes only need to keep their position
    let head: String = data
        .iter()
        .take(1024)
        .map(|byte| char::from(byte.to_ascii_lowercase()))
        .collect();

    let from_declaration = head
        .trim_start()
        .strip_prefix("<?xml")
        .and_then(|rest| rest.split_once("?>"))
        .and_then(|(declaration, _)| pseudo_attribute(declaration, "encoding"));

    from_declaration.or_else(|| pseudo_attribute(&head, "charset"))
}

/// Reads the value of `key="value"`, `key='value'` or `key=value`
fn pseudo_attribute(markup: &str, key: &str) -> Option<String> {
    let start = markup.find(key)? + key.len();
    let rest = markup[start..].trim_start().strip_prefix('=')?.trim_start();

    let value = match rest.chars().next()? {
        quote @ ('"' | '\'') => rest[1..].split(quote).next()?,
        _ => rest
            .split(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ';' | '/' | '>'))
            .next()?,
    };

    (!value.is_empty()).then(|| value.to_string())
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<String, KepubError> {
        self.as_slice().decode()
    }
}

/// Provides functionality for normalizing whitespace characters
///
/// This trait normalizes various sequences of whitespace characters
/// (including spaces, tabs, newlines, etc.) in a string into a single
/// whitespace character, removing leading and trailing whitespace characters.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// In-memory containers shared by the unit tests
#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{Cursor, Write};

    use zip::{CompressionMethod, ZipWriter, write::FileOptions};

    pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    /// Zips `entries` in order, `mimetype` stored and everything else deflated
    pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            let method = if *name == "mimetype" {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            let options = FileOptions::<()>::default().compression_method(method);
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// Wraps body markup into a minimal XHTML content document
    pub fn xhtml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>Chapter</title></head>
<body>{body}</body>
</html>
"#
        )
    }

    /// Builds an OPF package listing `chapters` in the manifest and the spine
    pub fn package(chapters: &[(&str, &str)], extra_manifest: &str) -> String {
        let manifest: String = chapters
            .iter()
            .enumerate()
            .map(|(index, (href, _))| {
                let mime = super::guess_media_type(href);
                format!("    <item id=\"ch{index}\" href=\"{href}\" media-type=\"{mime}\"/>\n")
            })
            .collect();
        let spine: String = (0..chapters.len())
            .map(|index| format!("    <itemref idref=\"ch{index}\"/>\n"))
            .collect();

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>Sample</dc:title>
    <dc:creator opf:role="aut">Jane Doe</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="uid" opf:scheme="uuid">1234</dc:identifier>
  </metadata>
  <manifest>
{manifest}    <item id="css" href="style.css" media-type="text/css"/>
{extra_manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>
"#
        )
    }

    /// Builds a complete EPUB with one content document per chapter
    ///
    /// `chapters` holds `(href relative to OEBPS, markup)` pairs in spine order.
    pub fn epub(chapters: &[(&str, &str)]) -> Vec<u8> {
        let chapters: Vec<(&str, &[u8])> = chapters
            .iter()
            .map(|(href, markup)| (*href, markup.as_bytes()))
            .collect();
        epub_bytes(&chapters)
    }

    /// Like [epub], for content documents that are not UTF-8
    pub fn epub_bytes(chapters: &[(&str, &[u8])]) -> Vec<u8> {
        let hrefs: Vec<(&str, &str)> = chapters.iter().map(|(href, _)| (*href, "")).collect();
        let opf = package(&hrefs, "");
        let paths: Vec<String> = chapters
            .iter()
            .map(|(href, _)| format!("OEBPS/{href}"))
            .collect();

        let mut entries: Vec<(&str, &[u8])> = vec![
            ("mimetype", b"application/epub+zip".as_slice()),
            ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
            ("OEBPS/content.opf", opf.as_bytes()),
            ("OEBPS/style.css", b"p { margin: 0; }".as_slice()),
        ];
        for (path, (_, markup)) in paths.iter().zip(chapters) {
            entries.push((path.as_str(), markup));
        }

        build_zip(&entries)
    }
}
