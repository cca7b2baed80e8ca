use super::shared_strings::SharedStringsRemap;
use crate::parse::markup::{attribute_value, escape_xml};
use lazy_static::lazy_static;
use regex::{Captures, NoExpand, Regex};

lazy_static! {
    static ref CELL: Regex = Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").unwrap();
    static ref SHARED_TYPE: Regex = Regex::new(r#"\s+t\s*=\s*"s""#).unwrap();
    static ref CELL_VALUE: Regex = Regex::new(r"<v>\s*(\d+)\s*</v>").unwrap();
}

/// One value of a chart preview series: the cell it lives in and its
/// number as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartValue {
    pub cell: String,
    pub value: String,
}

/// A worksheet after its shared-string cells were renumbered.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RewrittenSheet {
    pub xml: String,
    /// Numbers moved into their cells, in cell order.
    pub values: Vec<ChartValue>,
    /// Cells still pointing into the string table.
    pub shared_cells: usize,
}

/// Turns cells that referenced a number entry into numeric cells and points
/// the remaining string cells at their new table index.
pub(crate) fn rewrite_sheet(xml: &str, remap: &SharedStringsRemap) -> RewrittenSheet {
    let mut values: Vec<ChartValue> = Vec::new();
    let mut shared_cells: usize = 0;

    let rewritten = CELL.replace_all(xml, |c: &Captures| {
        let attributes = &c[1];
        let content = match c.get(2) {
            Some(content) if attribute_value(attributes, "t") == Some("s") => content.as_str(),
            _ => return c[0].to_string(),
        };
        let old_index = match CELL_VALUE
            .captures(content)
            .and_then(|v| v[1].parse::<usize>().ok())
        {
            Some(index) => index,
            None => {
                shared_cells += 1;
                return c[0].to_string();
            }
        };

        if let Some(number) = remap.number(old_index) {
            values.push(ChartValue {
                cell: attribute_value(attributes, "r").unwrap_or_default().to_string(),
                value: number.to_string(),
            });
            let attributes = SHARED_TYPE.replace(attributes, "");
            let value = format!("<v>{}</v>", escape_xml(number));
            let content = CELL_VALUE.replace(content, NoExpand(&value));
            return format!("<c{}>{}</c>", attributes, content);
        }

        shared_cells += 1;
        match remap.index(old_index) {
            Some(new_index) if new_index != old_index => {
                let value = format!("<v>{}</v>", new_index);
                let content = CELL_VALUE.replace(content, NoExpand(&value));
                format!("<c{}>{}</c>", attributes, content)
            }
            Some(_) => c[0].to_string(),
            None => {
                log::warn!("Cell points at missing shared string {}", old_index);
                c[0].to_string()
            }
        }
    });

    RewrittenSheet {
        xml: rewritten.into_owned(),
        values,
        shared_cells,
    }
}
