use crate::errors::DocxTemplateError;
use std::io::{BufReader, Cursor};
use xml::writer::{EmitterConfig, XmlEvent};
use xml::EventReader;

static NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

/// The `[Content_Types].xml` registry, keeping the order of its entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn parse(part: &str, xml: &str) -> Result<Self, DocxTemplateError> {
        let mut result = ContentTypes::default();
        let parser = EventReader::new(BufReader::new(xml.as_bytes()));

        for event in parser {
            match event {
                Ok(xml::reader::XmlEvent::StartElement {
                    name, attributes, ..
                }) => {
                    let fetch = |local: &str| {
                        attributes
                            .iter()
                            .find(|attr| attr.name.local_name == local)
                            .map(|attr| attr.value.clone())
                    };
                    match name.local_name.as_str() {
                        "Default" => {
                            if let (Some(extension), Some(content_type)) =
                                (fetch("Extension"), fetch("ContentType"))
                            {
                                result.defaults.push((extension, content_type));
                            }
                        }
                        "Override" => {
                            if let (Some(part_name), Some(content_type)) =
                                (fetch("PartName"), fetch("ContentType"))
                            {
                                result.overrides.push((part_name, content_type));
                            }
                        }
                        _ => (),
                    }
                }
                Ok(_) => (),
                Err(error) => return Err(DocxTemplateError::malformed(part, error.to_string())),
            }
        }

        Ok(result)
    }

    /// Registers a default unless the extension already has one. Returns
    /// whether an entry was added.
    pub fn add_default(&mut self, extension: &str, content_type: &str) -> bool {
        if self
            .defaults
            .iter()
            .any(|(e, _)| e.eq_ignore_ascii_case(extension))
        {
            return false;
        }
        self.defaults
            .push((extension.to_string(), content_type.to_string()));
        true
    }

    pub fn to_xml(&self, part: &str) -> Result<String, DocxTemplateError> {
        let failed = |_| DocxTemplateError::FailedWriteXml { part: part.into() };

        let mut buf: Vec<u8> = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut writer = EmitterConfig::new()
                .perform_indent(false)
                .create_writer(cursor);

            writer
                .write(XmlEvent::StartDocument {
                    version: xml::common::XmlVersion::Version10,
                    encoding: Some("UTF-8"),
                    standalone: Some(true),
                })
                .map_err(failed)?;
            writer
                .write(XmlEvent::start_element("Types").default_ns(NS_CONTENT_TYPES))
                .map_err(failed)?;
            for (extension, content_type) in self.defaults.iter() {
                writer
                    .write(
                        XmlEvent::start_element("Default")
                            .attr("Extension", extension)
                            .attr("ContentType", content_type),
                    )
                    .map_err(failed)?;
                writer.write(XmlEvent::end_element()).map_err(failed)?;
            }
            for (part_name, content_type) in self.overrides.iter() {
                writer
                    .write(
                        XmlEvent::start_element("Override")
                            .attr("PartName", part_name)
                            .attr("ContentType", content_type),
                    )
                    .map_err(failed)?;
                writer.write(XmlEvent::end_element()).map_err(failed)?;
            }
            writer.write(XmlEvent::end_element()).map_err(failed)?;
        }

        String::from_utf8(buf).map_err(|_| DocxTemplateError::FailedWriteXml { part: part.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="PNG" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

    #[test]
    fn defaults_are_added_once() {
        let mut types = ContentTypes::parse("[Content_Types].xml", TYPES).unwrap();
        assert!(!types.add_default("png", "image/png"));
        assert!(types.add_default("jpeg", "image/jpeg"));
        assert!(!types.add_default("jpeg", "image/jpeg"));

        let xml = types.to_xml("[Content_Types].xml").unwrap();
        let reparsed = ContentTypes::parse("[Content_Types].xml", &xml).unwrap();
        assert_eq!(reparsed, types);
        assert_eq!(xml.matches("Extension=\"jpeg\"").count(), 1);
    }
}
