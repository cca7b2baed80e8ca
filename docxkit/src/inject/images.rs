use crate::errors::DocxTemplateError;
use crate::meta::DocumentMeta;
use crate::package::Relationship;
use crate::parse::markup::{escape_xml, replace_elements, unescape_xml};
use crate::{NS_DWML_MAIN, NS_DWML_PIC, NS_REL, NS_WPD_ML};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref IMAGE_TEXT: Regex =
        Regex::new(r"<w:t(?:\s[^>]*)?>\s*\[\[IMAGE:([^\]]+)\]\]\s*</w:t>").unwrap();
    static ref REPLACE_IMAGE: Regex = Regex::new(r"\[\[REPLACE_IMAGE:([^\]]+)\]\]").unwrap();
    static ref BLIP_EMBED: Regex = Regex::new(r#"(<a:blip\b[^>]*?\br:embed=")[^"]*(")"#).unwrap();
}

/// Replaces every text node holding nothing but an `[[IMAGE:name]]` token
/// with an inline drawing of that media. Tokens naming unknown media stay.
pub(crate) fn insert_images(
    xml: &str,
    meta: &mut DocumentMeta,
    relationships: &mut Vec<Relationship>,
) -> Result<String, DocxTemplateError> {
    let mut result = String::with_capacity(xml.len());
    let mut bookmark: usize = 0;

    for capture in IMAGE_TEXT.captures_iter(xml) {
        let whole = match capture.get(0) {
            Some(whole) => whole,
            None => continue,
        };
        let name = unescape_xml(capture[1].trim());
        let placed = match meta.media(&name)? {
            Some(placed) => placed,
            None => continue,
        };

        let (cx, cy) = meta.fit_image(placed.width_px, placed.height_px);
        let drawing = InlineDrawing {
            doc_pr_id: meta.next_doc_pr_id()?,
            picture_number: meta.next_picture_number(),
            relationship_id: meta.next_relationship_id(),
            description: &name,
            cx,
            cy,
        };
        log::debug!(
            "Placing media '{}' as {} ({})",
            name,
            placed.file_name,
            drawing.relationship_id
        );
        relationships.push(Relationship::image(
            &drawing.relationship_id,
            &placed.target(),
        ));

        result.push_str(&xml[bookmark..whole.start()]);
        result.push_str(&drawing.to_xml());
        bookmark = whole.end();
    }
    result.push_str(&xml[bookmark..]);

    Ok(result)
}

/// Points every drawing that carries a `[[REPLACE_IMAGE:name]]` token at the
/// named media instead of its current picture, and drops the token.
pub(crate) fn replace_images(
    xml: &str,
    meta: &mut DocumentMeta,
    relationships: &mut Vec<Relationship>,
) -> Result<String, DocxTemplateError> {
    if !xml.contains("[[REPLACE_IMAGE:") {
        return Ok(xml.to_string());
    }

    let mut failure: Option<DocxTemplateError> = None;
    let result = replace_elements(xml, "w:drawing", |drawing| {
        if failure.is_some() {
            return drawing.to_string();
        }
        let name = match REPLACE_IMAGE.captures(drawing) {
            Some(capture) => unescape_xml(capture[1].trim()),
            None => return drawing.to_string(),
        };
        let placed = match meta.media(&name) {
            Ok(Some(placed)) => placed,
            Ok(None) => return drawing.to_string(),
            Err(error) => {
                failure = Some(error);
                return drawing.to_string();
            }
        };

        let relationship_id = meta.next_relationship_id();
        relationships.push(Relationship::image(&relationship_id, &placed.target()));

        let stripped = REPLACE_IMAGE.replace_all(drawing, "");
        BLIP_EMBED
            .replace_all(&stripped, |c: &Captures| {
                format!("{}{}{}", &c[1], relationship_id, &c[2])
            })
            .into_owned()
    });

    match failure {
        Some(error) => Err(error),
        None => Ok(result),
    }
}

struct InlineDrawing<'a> {
    doc_pr_id: u32,
    picture_number: u64,
    relationship_id: String,
    description: &'a str,
    cx: i64,
    cy: i64,
}

impl InlineDrawing<'_> {
    fn to_xml(&self) -> String {
        let name = format!("Picture {}", self.picture_number);
        let description = escape_xml(self.description);
        format!(
            concat!(
                r#"<w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="{wp}">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
                r#"<wp:effectExtent l="0" t="0" r="0" b="0"/>"#,
                r#"<wp:docPr id="{id}" name="{name}" descr="{descr}"/>"#,
                r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="{a}" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
                r#"<a:graphic xmlns:a="{a}"><a:graphicData uri="{pic}"><pic:pic xmlns:pic="{pic}">"#,
                r#"<pic:nvPicPr><pic:cNvPr id="0" name="{name}" descr="{descr}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="{rid}" xmlns:r="{r}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
                r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>"#
            ),
            wp = NS_WPD_ML,
            a = NS_DWML_MAIN,
            pic = NS_DWML_PIC,
            r = NS_REL,
            cx = self.cx,
            cy = self.cy,
            id = self.doc_pr_id,
            name = name,
            descr = description,
            rid = self.relationship_id,
        )
    }
}
