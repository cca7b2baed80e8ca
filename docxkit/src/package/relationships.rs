use crate::errors::DocxTemplateError;
use std::io::{BufReader, Cursor};
use xml::writer::{EmitterConfig, XmlEvent};
use xml::EventReader;

static NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetMode {
    #[default]
    Internal,
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub target_mode: TargetMode,
}

impl Relationship {
    pub fn new(id: &str, rel_type: &str, target: &str) -> Self {
        Self {
            id: id.to_string(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            target_mode: TargetMode::Internal,
        }
    }

    pub fn image(id: &str, target: &str) -> Self {
        Relationship::new(id, relationship_types::IMAGE, target)
    }
}

pub mod relationship_types {
    pub const IMAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    pub const PACKAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/package";
}

/// The entries of one `.rels` part, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relationships {
    entries: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(part: &str, xml: &str) -> Result<Self, DocxTemplateError> {
        let mut entries = Vec::new();
        let parser = EventReader::new(BufReader::new(xml.as_bytes()));

        for event in parser {
            match event {
                Ok(xml::reader::XmlEvent::StartElement {
                    name, attributes, ..
                }) if name.local_name == "Relationship" => {
                    let fetch = |local: &str| {
                        attributes
                            .iter()
                            .find(|attr| attr.name.local_name == local)
                            .map(|attr| attr.value.clone())
                    };
                    let id = fetch("Id").ok_or_else(|| {
                        DocxTemplateError::malformed(part, "relationship without an Id")
                    })?;
                    entries.push(Relationship {
                        id,
                        rel_type: fetch("Type").unwrap_or_default(),
                        target: fetch("Target").unwrap_or_default(),
                        target_mode: match fetch("TargetMode").as_deref() {
                            Some("External") => TargetMode::External,
                            _ => TargetMode::Internal,
                        },
                    });
                }
                Ok(_) => (),
                Err(error) => return Err(DocxTemplateError::malformed(part, error.to_string())),
            }
        }

        Ok(Relationships { entries })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.entries.iter()
    }

    pub fn push(&mut self, relationship: Relationship) {
        self.entries.push(relationship);
    }

    /// Target of the first relationship of type `rel_type`.
    pub fn target_of_type(&self, rel_type: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|r| r.rel_type == rel_type)
            .map(|r| r.target.as_str())
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
                .write(XmlEvent::start_element("Relationships").default_ns(NS_PKG_REL))
                .map_err(failed)?;
            for entry in self.entries.iter() {
                let mut element = XmlEvent::start_element("Relationship")
                    .attr("Id", &entry.id)
                    .attr("Type", &entry.rel_type)
                    .attr("Target", &entry.target);
                if entry.target_mode == TargetMode::External {
                    element = element.attr("TargetMode", "External");
                }
                writer.write(element).map_err(failed)?;
                writer.write(XmlEvent::end_element()).map_err(failed)?;
            }
            writer.write(XmlEvent::end_element()).map_err(failed)?;
        }

        String::from_utf8(buf).map_err(|_| DocxTemplateError::FailedWriteXml { part: part.into() })
    }
}
