pub mod errors;
mod inject;
pub mod meta;
pub mod package;
pub mod parse;
pub mod render;
pub mod template;
pub mod xlsx;

pub use crate::errors::{BoxError, DocxTemplateError};
pub use crate::meta::MediaAsset;
pub use crate::template::{AssemblyState, DocxTemplate, PartProcessor};

use std::io::Cursor;
use zip::ZipArchive;

/// Namespace string used in DOCX XML data to denote word processing elements (like paragraphs).
static NS_WP_ML: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Namespace string used in DOCX XML data to denote drawings in the document.
static NS_WPD_ML: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";

static NS_DWML_MAIN: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
static NS_DWML_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

/// Relationship Namespace in DOCX
static NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

// Well-known part names
pub(crate) static PART_CONTENT_TYPES: &str = "[Content_Types].xml";
pub(crate) static PART_DOCUMENT: &str = "word/document.xml";
pub(crate) static PART_DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
pub(crate) static DIR_MEDIA: &str = "word/media/";

type DocxPayload = ZipArchive<Cursor<Vec<u8>>>;

pub(crate) fn header_part(n: usize) -> String {
    format!("word/header{}.xml", n)
}

pub(crate) fn footer_part(n: usize) -> String {
    format!("word/footer{}.xml", n)
}

pub(crate) fn chart_part(n: usize) -> String {
    format!("word/charts/chart{}.xml", n)
}

/// Embedded workbooks are numbered `Microsoft_Excel_Worksheet.xlsx`,
/// `Microsoft_Excel_Worksheet1.xlsx`, ...
pub(crate) fn embedded_workbook_part(n: usize) -> String {
    if n == 0 {
        "word/embeddings/Microsoft_Excel_Worksheet.xlsx".to_string()
    } else {
        format!("word/embeddings/Microsoft_Excel_Worksheet{}.xlsx", n)
    }
}

/// Page geometry of the document, in twentieths of a point.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDimensions {
    pub height: i32,
    pub width: i32,
    pub m_top: i32,
    pub m_bottom: i32,
    pub m_right: i32,
    pub m_left: i32,
    pub header: i32,
    pub footer: i32,
    pub gutter: i32,
}

impl Default for PageDimensions {
    /// US Letter with 1 inch margins.
    fn default() -> Self {
        PageDimensions {
            height: 15840,
            width: 12240,
            m_top: 1440,
            m_bottom: 1440,
            m_right: 1440,
            m_left: 1440,
            header: 720,
            footer: 720,
            gutter: 0,
        }
    }
}

impl PageDimensions {
    pub fn usable_width_twips(&self) -> i32 {
        self.width - self.m_left - self.m_right
    }

    pub fn usable_height_twips(&self) -> i32 {
        self.height - self.m_top - self.m_bottom
    }
}
