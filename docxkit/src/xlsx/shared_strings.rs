use crate::parse::markup::{element_ranges, unescape_xml, with_attribute};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

lazy_static! {
    static ref ENTRY_TEXT: Regex = Regex::new(r"<t(?:\s[^>]*)?>([^<]*)</t>").unwrap();
    static ref NUMBER: Regex = Regex::new(r"\[\[NUMBER:([^\]]*)\]\]").unwrap();
    static ref SST_START: Regex = Regex::new(r"<sst\b([^>]*?)(/?)>").unwrap();
}

/// How a rendered string table changed when its number entries were taken
/// out: the numbers by their old index, and the new index of every string
/// that stayed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedStringsRemap {
    numbers: BTreeMap<usize, String>,
    indices: BTreeMap<usize, usize>,
}

impl SharedStringsRemap {
    /// The number that replaced the entry at `old_index`.
    pub fn number(&self, old_index: usize) -> Option<&str> {
        self.numbers.get(&old_index).map(String::as_str)
    }

    /// New position of the string that was at `old_index`.
    pub fn index(&self, old_index: usize) -> Option<usize> {
        self.indices.get(&old_index).copied()
    }

    /// Entries left in the table.
    pub fn unique_count(&self) -> usize {
        self.indices.len()
    }
}

/// Takes every `[[NUMBER:v]]` entry out of a rendered string table.
pub(crate) fn extract_numbers(xml: &str) -> (String, SharedStringsRemap) {
    let mut remap = SharedStringsRemap::default();
    let mut result = String::with_capacity(xml.len());
    let mut bookmark: usize = 0;

    for (old_index, range) in element_ranges(xml, "si").into_iter().enumerate() {
        let entry = &xml[range.clone()];
        let text: String = ENTRY_TEXT
            .captures_iter(entry)
            .map(|c| c[1].to_string())
            .collect();

        match NUMBER.captures(&text) {
            Some(capture) => {
                let value = unescape_xml(capture[1].trim());
                log::debug!("Shared string {} holds the number {}", old_index, value);
                remap.numbers.insert(old_index, value);
                result.push_str(&xml[bookmark..range.start]);
                bookmark = range.end;
            }
            None => {
                let new_index = remap.indices.len();
                remap.indices.insert(old_index, new_index);
            }
        }
    }
    result.push_str(&xml[bookmark..]);

    (result, remap)
}

/// Rewrites the `count` and `uniqueCount` attributes of the table.
pub(crate) fn set_counts(xml: &str, count: usize, unique_count: usize) -> String {
    SST_START
        .replacen(xml, 1, |c: &Captures| {
            let attributes = with_attribute(&c[1], "count", &count.to_string());
            let attributes = with_attribute(&attributes, "uniqueCount", &unique_count.to_string());
            format!("<sst{}{}>", attributes, &c[2])
        })
        .into_owned()
}
