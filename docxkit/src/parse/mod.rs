pub(crate) mod markup;
pub mod patch;
pub mod variables;

use crate::errors::DocxTemplateError;
use crate::{PageDimensions, NS_WP_ML};
use std::io::BufReader;
use xml::EventReader;

pub use patch::patch_xml;
pub use variables::extract_variables;

/// Extract page dimensions from the main document part. The last section
/// wins; attributes that are absent keep their US Letter default.
pub(crate) fn parse_page_dimensions(
    part: &str,
    document_xml: &str,
) -> Result<PageDimensions, DocxTemplateError> {
    let mut dimensions = PageDimensions::default();
    let mut found_size = false;

    let source_buf = BufReader::new(document_xml.as_bytes());
    let parser = EventReader::new(source_buf);
    let ns = Some(String::from(NS_WP_ML));

    let fetch_attr_value = |attrs: &[xml::attribute::OwnedAttribute],
                            name: &str|
     -> Result<Option<i32>, DocxTemplateError> {
        for attr in attrs.iter() {
            if attr.name.local_name == name && attr.name.namespace == ns {
                let value = attr.value.trim().parse::<i32>().map_err(|_| {
                    DocxTemplateError::malformed(
                        part,
                        format!("attribute '{}' is not a number: '{}'", name, attr.value),
                    )
                })?;
                return Ok(Some(value));
            }
        }
        Ok(None)
    };

    for event in parser {
        match event {
            Ok(xml::reader::XmlEvent::StartElement {
                name, attributes, ..
            }) => {
                if name.namespace != ns {
                    continue;
                }

                // Fetch page size
                if name.local_name == "pgSz" {
                    found_size = true;
                    if let Some(w) = fetch_attr_value(&attributes, "w")? {
                        dimensions.width = w;
                    }
                    if let Some(h) = fetch_attr_value(&attributes, "h")? {
                        dimensions.height = h;
                    }
                }

                // Fetch page margins
                if name.local_name == "pgMar" {
                    let targets: [(&str, &mut i32); 7] = [
                        ("top", &mut dimensions.m_top),
                        ("bottom", &mut dimensions.m_bottom),
                        ("right", &mut dimensions.m_right),
                        ("left", &mut dimensions.m_left),
                        ("header", &mut dimensions.header),
                        ("footer", &mut dimensions.footer),
                        ("gutter", &mut dimensions.gutter),
                    ];
                    for (attr_name, target) in targets {
                        if let Some(value) = fetch_attr_value(&attributes, attr_name)? {
                            *target = value;
                        }
                    }
                }
            }
            Ok(_) => (),
            Err(error) => return Err(DocxTemplateError::malformed(part, error.to_string())),
        }
    }

    if !found_size {
        log::warn!(
            "No page size found in '{}', assuming US Letter with 1 inch margins",
            part
        );
    }

    Ok(dimensions)
}

/// Decodes a part as UTF-8 text.
pub(crate) fn part_text(part: &str, bytes: Vec<u8>) -> Result<String, DocxTemplateError> {
    String::from_utf8(bytes).map_err(|_| DocxTemplateError::Encoding { part: part.into() })
}
