#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

pub const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/></Relationships>"#;

pub const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:docDefaults/></w:styles>"#;

pub fn document(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
            r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
            r#"<w:body>{}<w:sectPr><w:pgSz w:w="12240" w:h="15840"/>"#,
            r#"<w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/>"#,
            r#"</w:sectPr></w:body></w:document>"#
        ),
        body
    )
}

/// An in-memory .docx built part by part.
pub struct Skeleton {
    parts: Vec<(String, Vec<u8>, CompressionMethod)>,
}

impl Skeleton {
    /// Content types, document relationships, styles and a document with
    /// `body`.
    pub fn new(body: &str) -> Self {
        Skeleton { parts: Vec::new() }
            .with_part("[Content_Types].xml", CONTENT_TYPES)
            .with_part("word/_rels/document.xml.rels", DOCUMENT_RELS)
            .with_stored_part("word/styles.xml", STYLES.as_bytes())
            .with_part("word/document.xml", &document(body))
    }

    pub fn with_part(mut self, name: &str, contents: &str) -> Self {
        self.parts.push((
            name.to_string(),
            contents.as_bytes().to_vec(),
            CompressionMethod::Deflated,
        ));
        self
    }

    pub fn with_stored_part(mut self, name: &str, contents: &[u8]) -> Self {
        self.parts
            .push((name.to_string(), contents.to_vec(), CompressionMethod::Stored));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        zip_of(
            self.parts
                .iter()
                .map(|(name, contents, method)| (name.as_str(), contents.as_slice(), *method)),
        )
    }
}

pub fn zip_of<'a, I>(parts: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a str, &'a [u8], CompressionMethod)>,
{
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents, method) in parts {
        let options = SimpleFileOptions::default().compression_method(method);
        zip.start_file(name, options).unwrap();
        zip.write_all(contents).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A workbook holding a shared string table and the given sheets.
pub fn workbook(shared_strings: &str, sheets: &[&str]) -> Vec<u8> {
    let names: Vec<String> = (1..=sheets.len())
        .map(|n| format!("xl/worksheets/sheet{}.xml", n))
        .collect();
    let mut parts: Vec<(&str, &[u8], CompressionMethod)> = vec![
        ("[Content_Types].xml", "<Types/>".as_bytes(), CompressionMethod::Deflated),
        ("xl/sharedStrings.xml", shared_strings.as_bytes(), CompressionMethod::Deflated),
    ];
    for (name, sheet) in names.iter().zip(sheets) {
        parts.push((name.as_str(), sheet.as_bytes(), CompressionMethod::Deflated));
    }
    zip_of(parts)
}

pub fn part_names(archive: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(archive)).unwrap();
    archive.file_names().map(String::from).collect()
}

pub fn read_bytes(archive: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).unwrap();
    contents
}

pub fn read_part(archive: &[u8], name: &str) -> String {
    String::from_utf8(read_bytes(archive, name)).unwrap()
}

/// The stored (possibly compressed) bytes of a part and its method.
pub fn raw_part(archive: &[u8], name: &str) -> (Vec<u8>, CompressionMethod) {
    let mut archive = ZipArchive::new(Cursor::new(archive)).unwrap();
    for index in 0..archive.len() {
        let mut file = archive.by_index_raw(index).unwrap();
        if file.name() == name {
            let method = file.compression();
            let mut raw = Vec::new();
            file.read_to_end(&mut raw).unwrap();
            return (raw, method);
        }
    }
    panic!("no part named {}", name);
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes: Vec<u8> = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Values of `attribute` on every `element` start tag, in order.
pub fn attribute_values(xml: &str, element: &str, attribute: &str) -> Vec<String> {
    let open = format!("<{} ", element);
    let key = format!(" {}=\"", attribute);
    xml.match_indices(&open)
        .filter_map(|(start, _)| {
            let tag = &xml[start..start + xml[start..].find('>')?];
            let value_start = tag.find(&key)? + key.len();
            let value_end = value_start + tag[value_start..].find('"')?;
            Some(tag[value_start..value_end].to_string())
        })
        .collect()
}
