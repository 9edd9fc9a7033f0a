//! Container serializer
//!
//! Writes a [Container] back into an OCF ZIP archive. The `mimetype` entry
//! always comes first and uncompressed, as reading systems sniff it at a fixed
//! offset. Every other entry is deflated and keeps its original position.

use std::io::{Cursor, Seek, Write};

use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::{container::Container, error::KepubError};

const MIMETYPE_PATH: &str = "mimetype";
const DEFAULT_MIMETYPE: &[u8] = b"application/epub+zip";

/// Serializes `container` into archive bytes
pub fn write_container(container: &Container) -> Result<Vec<u8>, KepubError> {
    let mut buffer = Cursor::new(Vec::new());
    write_container_to(container, &mut buffer)?;
    Ok(buffer.into_inner())
}

/// Serializes `container` into `writer`
///
/// # Return
/// - `Ok(())`: The archive was written completely
/// - `Err(KepubError::Serialization)`: A manifest item has no bytes
/// - `Err(KepubError)`: Writing the archive failed
pub fn write_container_to<W: Write + Seek>(
    container: &Container,
    writer: W,
) -> Result<(), KepubError> {
    for item in container.manifest.values() {
        if !container.has_resource(&item.path) {
            return Err(KepubError::Serialization {
                resource: item.path.clone(),
            });
        }
    }

    let package = match container.package_dirty() {
        true => Some(container.package().to_bytes()?),
        false => None,
    };

    let mut zip = ZipWriter::new(writer);
    let stored = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

    let mimetype = container
        .entries
        .get(MIMETYPE_PATH)
        .map(Vec::as_slice)
        .unwrap_or(DEFAULT_MIMETYPE);
    zip.start_file(MIMETYPE_PATH, stored)?;
    zip.write_all(mimetype)?;

    for (path, data) in &container.entries {
        if path == MIMETYPE_PATH {
            continue;
        }

        let data = match &package {
            Some(package) if *path == container.opf_path => package.as_slice(),
            _ => data.as_slice(),
        };
        zip.start_file(path.as_str(), deflated)?;
        zip.write_all(data)?;
    }

    zip.finish()?;
    Ok(())
}
