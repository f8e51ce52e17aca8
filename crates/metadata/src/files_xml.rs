//! Streaming file-index parser
//!
//! The file index is an XML stream of
//! `<files fn="NEVRA">path\npath\n...</files>` elements. We never build
//! a DOM: the reader walks events and hands each package's file list to
//! a callback, so a 10^7-row index imports in bounded memory.

use quick_xml::events::Event;
use quick_xml::Reader;

use urpm_errors::{Error, MetadataError};
use urpm_types::PackageFile;

use crate::compression::decompress;

/// Walk a (possibly compressed) file-index blob, invoking `sink` once
/// per package with its file rows.
///
/// # Errors
///
/// Returns an error on decompression failure or malformed XML; the sink
/// may abort the walk by returning an error of its own.
pub fn visit_files<F>(data: &[u8], mut sink: F) -> Result<(), Error>
where
    F: FnMut(&str, Vec<PackageFile>) -> Result<(), Error>,
{
    let raw = decompress(data)?;
    let mut reader = Reader::from_reader(raw.as_slice());
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current: Option<(String, Vec<PackageFile>)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"files" => {
                let nevra = e
                    .try_get_attribute("fn")
                    .map_err(|e| xml_err(&reader, &e.to_string()))?
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned())
                    .unwrap_or_default();
                current = Some((nevra, Vec::new()));
            }
            Ok(Event::Text(t)) => {
                if let Some((nevra, files)) = current.as_mut() {
                    let text = t.unescape().map_err(|e| xml_err(&reader, &e.to_string()))?;
                    files.extend(
                        text.lines()
                            .map(str::trim)
                            .filter(|l| !l.is_empty())
                            .map(|path| PackageFile::from_path(nevra, path)),
                    );
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"files" => {
                if let Some((nevra, files)) = current.take() {
                    sink(&nevra, files)?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_err(&reader, &e.to_string())),
        }
        buf.clear();
    }

    Ok(())
}

/// Collect the NEVRA set by scanning only `fn` attributes. Much cheaper
/// than a full visit: element text is skipped unparsed.
///
/// # Errors
///
/// Returns an error on decompression failure or malformed XML.
pub fn scan_nevras(data: &[u8]) -> Result<Vec<String>, Error> {
    let raw = decompress(data)?;
    let mut reader = Reader::from_reader(raw.as_slice());
    let mut buf = Vec::new();
    let mut nevras = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == b"files" => {
                if let Some(a) = e
                    .try_get_attribute("fn")
                    .map_err(|e| xml_err(&reader, &e.to_string()))?
                {
                    nevras.push(String::from_utf8_lossy(&a.value).into_owned());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(xml_err(&reader, &e.to_string())),
        }
        buf.clear();
    }

    Ok(nevras)
}

fn xml_err<R>(reader: &Reader<R>, message: &str) -> Error {
    MetadataError::Xml(format!(
        "at byte {}: {message}",
        reader.buffer_position()
    ))
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
<media_files>
<files fn=\"a-1.0-1.x86_64\">/usr/bin/a
/usr/share/doc/a/README</files>
<files fn=\"b-2.0-1.noarch\">/etc/b.conf</files>
<files fn=\"empty-0-1.noarch\"></files>
</media_files>";

    #[test]
    fn visits_each_package() {
        let mut seen = Vec::new();
        visit_files(SAMPLE.as_bytes(), |nevra, files| {
            seen.push((nevra.to_string(), files));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, "a-1.0-1.x86_64");
        assert_eq!(seen[0].1.len(), 2);
        assert_eq!(seen[0].1[0].dir, "/usr/bin");
        assert_eq!(seen[0].1[0].basename, "a");
        assert_eq!(seen[1].1.len(), 1);
        assert!(seen[2].1.is_empty());
    }

    #[test]
    fn scan_reads_only_attributes() {
        let nevras = scan_nevras(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            nevras,
            vec!["a-1.0-1.x86_64", "b-2.0-1.noarch", "empty-0-1.noarch"]
        );
    }

    #[test]
    fn compressed_input_is_transparent() {
        let compressed = zstd::stream::encode_all(SAMPLE.as_bytes(), 3).unwrap();
        let nevras = scan_nevras(&compressed).unwrap();
        assert_eq!(nevras.len(), 3);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(scan_nevras(b"<media_files><files fn=").is_err());
    }

    #[test]
    fn sink_error_aborts_walk() {
        let err = visit_files(SAMPLE.as_bytes(), |_, _| {
            Err(urpm_errors::Error::internal("stop"))
        })
        .unwrap_err();
        assert!(err.to_string().contains("stop"));
    }
}
