//! Expands the placeholder tokens left behind by the template helpers into
//! real markup, then tidies up what rendering did to the structure.

mod cleanup;
mod colors;
mod images;

use crate::errors::DocxTemplateError;
use crate::meta::DocumentMeta;
use crate::package::Relationship;

/// Runs every injection pass over a rendered document, header or footer
/// part. Relationships the new markup needs are appended to `relationships`.
pub(crate) fn inject_placeholders(
    part: &str,
    xml: &str,
    meta: &mut DocumentMeta,
    relationships: &mut Vec<Relationship>,
) -> Result<String, DocxTemplateError> {
    log::debug!("Injecting placeholders into '{}'", part);

    let xml = images::insert_images(xml, meta, relationships)?;
    let xml = images::replace_images(&xml, meta, relationships)?;
    let xml = colors::recolor_shapes(&xml);
    let xml = colors::recolor_table_cells(&xml);

    let xml = cleanup::collapse_nested_runs(&xml);
    let xml = cleanup::preserve_spaces(&xml);
    Ok(cleanup::remove_empty_rows(&xml))
}
