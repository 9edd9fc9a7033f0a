//! Error Type Definition Module
//!
//! This module defines the error types that may be encountered while loading a
//! container, running the KePub transform pipeline over its content documents,
//! and writing the result back out. All errors are uniformly wrapped in the
//! `KepubError` enumeration for convenient error handling by the caller.
//!
//! Archive level failures ([KepubError::MalformedContainer], [KepubError::Serialization])
//! are always fatal to a run. Document level failures ([KepubError::MissingHead],
//! [KepubError::EmptyHead], [KepubError::UnsupportedMarkup], [KepubError::XmlError])
//! carry the path of the offending document and may be skipped in best-effort mode.

use thiserror::Error;

/// Types of errors that can occur during KePub processing
#[derive(Debug, Error)]
pub enum KepubError {
    /// ZIP archive related errors
    ///
    /// Errors occur when processing the ZIP structure of the container,
    /// such as file corruption, unreadability, etc.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// The container was opened successfully but its content documents
    /// contain DRM-encumbered resources, and the caller asked for those to be rejected.
    #[error("DRM-encumbered container: the container holds encrypted resources.")]
    DrmEncumbered,

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// A content document has a `<head>` element without any child element.
    #[error("Empty head: The <head> element of \"{path}\" has no children.")]
    EmptyHead { path: String },

    /// Encoding error
    ///
    /// The data is not valid in the encoding it declares, or declares an
    /// encoding that is not known.
    #[error("Decode error: The data cannot be decoded as \"{encoding}\".")]
    EncodingError { encoding: String },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// Malformed container error
    ///
    /// Triggered when the archive is unreadable as an EPUB-like container: no OPF
    /// package was found, the manifest references a resource the archive does not
    /// hold, or the spine has no usable content document.
    #[error("Malformed container: {reason}")]
    MalformedContainer { reason: String },

    /// A content document has no `<head>` element at all.
    #[error("Missing head: The content document \"{path}\" has no <head> element.")]
    MissingHead { path: String },

    /// Unable to find the resource error
    ///
    /// This error occurs when an attempt is made to read a resource
    /// but it does not exist in the container.
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },

    /// Serialization error
    ///
    /// This error occurs when the serializer is asked to write a manifest
    /// entry whose bytes are no longer available.
    #[error("Serialization error: The resource \"{resource}\" is missing at write time.")]
    Serialization { resource: String },

    /// The caller-supplied deadline ran out before every document was processed.
    #[error("Timeout: The conversion did not finish before its deadline.")]
    Timeout,

    /// Unsupported markup error
    ///
    /// Raised for markup dialects the pipeline declines to process,
    /// such as DTBook content documents.
    #[error("Unsupported markup in \"{path}\": {reason}")]
    UnsupportedMarkup { path: String, reason: String },

    /// UTF-8 decoding error
    ///
    /// This error occurs when attempting to decode byte data into a UTF-8 string
    /// but the data is not formatted correctly.
    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    /// UTF-16 decoding error
    ///
    /// This error occurs when attempting to decode byte data into a UTF-16 string
    /// but the data is not formatted correctly.
    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },

    /// XML error located inside a specific document
    ///
    /// `position` is the byte offset reported by the parser, `line` the
    /// line number derived from it.
    #[error("XML error in \"{path}\" at line {line} (byte {position}): {message}")]
    XmlError {
        path: String,
        line: usize,
        position: u64,
        message: String,
    },

    /// QuickXml error
    ///
    /// This error occurs when writing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },
}

impl KepubError {
    /// Returns the content document this error belongs to, if any
    pub fn document(&self) -> Option<&str> {
        match self {
            KepubError::EmptyHead { path }
            | KepubError::MissingHead { path }
            | KepubError::UnsupportedMarkup { path, .. }
            | KepubError::XmlError { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether the error is confined to a single content document
    ///
    /// Only such errors may be skipped in best-effort mode.
    pub fn is_document_error(&self) -> bool {
        self.document().is_some()
    }
}

impl From<zip::result::ZipError> for KepubError {
    fn from(value: zip::result::ZipError) -> Self {
        KepubError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for KepubError {
    fn from(value: quick_xml::Error) -> Self {
        KepubError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for KepubError {
    fn from(value: std::io::Error) -> Self {
        KepubError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for KepubError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        KepubError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for KepubError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        KepubError::Utf16DecodeError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for KepubError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::EmptyHead { path: l_path }, Self::EmptyHead { path: r_path }) => {
                l_path == r_path
            }
            (Self::MissingHead { path: l_path }, Self::MissingHead { path: r_path }) => {
                l_path == r_path
            }
            (
                Self::EncodingError {
                    encoding: l_encoding,
                },
                Self::EncodingError {
                    encoding: r_encoding,
                },
            ) => l_encoding == r_encoding,
            (
                Self::ResourceNotFound {
                    resource: l_resource,
                },
                Self::ResourceNotFound {
                    resource: r_resource,
                },
            ) => l_resource == r_resource,
            (
                Self::Serialization {
                    resource: l_resource,
                },
                Self::Serialization {
                    resource: r_resource,
                },
            ) => l_resource == r_resource,
            (
                Self::UnsupportedMarkup { path: l_path, .. },
                Self::UnsupportedMarkup { path: r_path, .. },
            ) => l_path == r_path,
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::KepubError;

    #[test]
    fn test_document_errors_carry_path() {
        let err = KepubError::EmptyHead {
            path: "OEBPS/ch1.xhtml".to_string(),
        };
        assert_eq!(err.document(), Some("OEBPS/ch1.xhtml"));
        assert!(err.is_document_error());

        let err = KepubError::MalformedContainer {
            reason: "no OPF".to_string(),
        };
        assert_eq!(err.document(), None);
        assert!(!err.is_document_error());
    }

    #[test]
    fn test_error_messages() {
        let err = KepubError::MissingHead {
            path: "a.xhtml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing head: The content document \"a.xhtml\" has no <head> element."
        );

        let err = KepubError::XmlError {
            path: "a.xhtml".to_string(),
            line: 3,
            position: 42,
            message: "unexpected end".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "XML error in \"a.xhtml\" at line 3 (byte 42): unexpected end"
        );
    }
}
