//! MXL file handler: reads compressed MusicXML (.mxl) archives.
//!
//! An .mxl file is a ZIP archive containing:
//!   - META-INF/container.xml : declares the root MusicXML file path
//!   - <rootfile>.xml         : the actual MusicXML content (e.g., score.xml)
//!   - (optional) other files : images, sounds, etc.

use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::{Result, ViewerError};
use crate::model::Score;
use crate::parser;

/// Read and parse a .mxl file from raw bytes.
pub fn parse_mxl(data: &[u8]) -> Result<Score> {
    let xml = extract_musicxml_from_mxl(data)?;
    parser::parse_musicxml(&xml)
}

/// Extract the MusicXML content string from .mxl bytes.
pub fn extract_musicxml_from_mxl(data: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let root_file_path = read_container_xml(&mut archive)?;
    log::debug!("MXL root file: {root_file_path}");

    let mut root_file = archive.by_name(&root_file_path)?;
    let mut xml = String::new();
    root_file.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Parse META-INF/container.xml to find the root MusicXML file path.
fn read_container_xml(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String> {
    let container_xml = match archive.by_name("META-INF/container.xml") {
        Ok(mut container_file) => {
            let mut xml = String::new();
            container_file.read_to_string(&mut xml)?;
            Some(xml)
        }
        Err(_) => None,
    }; // mutable borrow of archive is released here

    if let Some(xml) = container_xml {
        let doc = roxmltree::Document::parse(&xml)?;
        return doc
            .descendants()
            .find(|n| n.has_tag_name("rootfile"))
            .and_then(|n| n.attribute("full-path"))
            .map(str::to_string)
            .ok_or_else(|| ViewerError::Decode("no rootfile found in container.xml".into()));
    }

    // Fallback: first .xml/.musicxml outside META-INF
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names
        .iter()
        .find(|name| {
            !name.starts_with("META-INF/")
                && (name.ends_with(".xml") || name.ends_with(".musicxml"))
        })
        .cloned()
        .ok_or_else(|| {
            ViewerError::Decode(format!("no MusicXML file found in archive, files: {names:?}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options =
                SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
            for (name, content) in files {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    const SCORE: &str = r#"<score-partwise><part-list>
        <score-part id="P1"><part-name>Bass</part-name></score-part>
        </part-list><part id="P1"><measure number="1"/></part></score-partwise>"#;

    #[test]
    fn container_points_at_root_file() {
        let data = archive(&[
            (
                "META-INF/container.xml",
                r#"<container><rootfiles><rootfile full-path="song/score.xml"/></rootfiles></container>"#,
            ),
            ("decoy.xml", "<not-a-score/>"),
            ("song/score.xml", SCORE),
        ]);
        let score = parse_mxl(&data).unwrap();
        assert_eq!(score.tracks[0].name, "Bass");
    }

    #[test]
    fn missing_container_falls_back_to_first_xml() {
        let data = archive(&[("score.musicxml", SCORE)]);
        assert_eq!(parse_mxl(&data).unwrap().tracks.len(), 1);
    }

    #[test]
    fn not_a_zip_is_an_archive_error() {
        let err = parse_mxl(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, ViewerError::Archive(_)));
    }
}
