use crate::parse::markup::{
    direct_children, pairs, replace_elements, split_element, tags, Tag, TagKind,
};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref BARE_TEXT: Regex = Regex::new(r"<w:t>([^<]*)</w:t>").unwrap();
    static ref TEXT_CONTENT: Regex = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>").unwrap();
}

/// Markup that makes a row visible even without any text.
const GRAPHIC_MARKERS: [&str; 6] = [
    "<w:drawing",
    "<w:pict",
    "<w:object",
    "<mc:AlternateContent",
    "<v:shape",
    "<wps:",
];

/// Splits runs whose text node ended up holding whole runs, as happens when
/// a styling helper is used inside the text of an existing run. The inner
/// runs become siblings; text around them keeps the outer run properties.
pub(crate) fn collapse_nested_runs(xml: &str) -> String {
    let lexed = tags(xml);
    let paired = pairs(&lexed);

    let mut result = String::with_capacity(xml.len());
    let mut bookmark: usize = 0;
    let mut index: usize = 0;
    while index < lexed.len() {
        let tag = &lexed[index];
        if tag.kind == TagKind::Open && tag.name == "w:r" {
            if let Some(close) = paired[index] {
                if holds_nested_runs(&lexed, &paired, index, close) {
                    result.push_str(&xml[bookmark..tag.span.start]);
                    result.push_str(&split_run(xml, &lexed, &paired, index, close));
                    bookmark = lexed[close].span.end;
                    index = close + 1;
                    continue;
                }
            }
        }
        index += 1;
    }
    result.push_str(&xml[bookmark..]);

    result
}

/// Whether a text node directly inside the run `open..=close` contains runs.
fn holds_nested_runs(
    lexed: &[Tag<'_>],
    paired: &[Option<usize>],
    open: usize,
    close: usize,
) -> bool {
    children_between(lexed, paired, open, close)
        .into_iter()
        .any(|(first, last)| {
            lexed[first].name == "w:t"
                && lexed[first + 1..last]
                    .iter()
                    .any(|t| t.name == "w:r" && t.kind != TagKind::Close)
        })
}

/// Direct children of the element opened at `open` and closed at `close`.
fn children_between(
    lexed: &[Tag<'_>],
    paired: &[Option<usize>],
    open: usize,
    close: usize,
) -> Vec<(usize, usize)> {
    let inner = &lexed[open + 1..close];
    // pair indices are global, shift them into the slice
    let shifted: Vec<Option<usize>> = paired[open + 1..close]
        .iter()
        .map(|p| p.and_then(|i| i.checked_sub(open + 1)))
        .collect();
    direct_children(inner, &shifted)
        .into_iter()
        .map(|(first, last)| (first + open + 1, last + open + 1))
        .collect()
}

fn split_run(
    xml: &str,
    lexed: &[Tag<'_>],
    paired: &[Option<usize>],
    open: usize,
    close: usize,
) -> String {
    let start_tag = &xml[lexed[open].span.clone()];
    let children = children_between(lexed, paired, open, close);
    let properties = children
        .first()
        .filter(|(first, _)| lexed[*first].name == "w:rPr")
        .map(|&(first, last)| &xml[lexed[first].span.start..lexed[last].span.end])
        .unwrap_or("");

    let mut result = String::new();
    let mut pending = String::new();
    let flush = |result: &mut String, pending: &mut String| {
        if !pending.trim().is_empty() {
            result.push_str(start_tag);
            result.push_str(properties);
            result.push_str(pending);
            result.push_str("</w:r>");
        }
        pending.clear();
    };

    for (first, last) in children {
        let child = &lexed[first];
        let region = &xml[child.span.start..lexed[last].span.end];
        if child.name == "w:rPr" {
            continue;
        }
        let nested = child.name == "w:t"
            && lexed[first + 1..last]
                .iter()
                .any(|t| t.name == "w:r" && t.kind != TagKind::Close);
        if !nested {
            pending.push_str(region);
            continue;
        }

        let mut text_start = child.span.end;
        for (inner_first, inner_last) in children_between(lexed, paired, first, last) {
            let inner = &lexed[inner_first];
            push_text(&mut pending, &xml[text_start..inner.span.start]);
            text_start = lexed[inner_last].span.end;
            flush(&mut result, &mut pending);
            result.push_str(&xml[inner.span.start..text_start]);
        }
        push_text(&mut pending, &xml[text_start..lexed[last].span.start]);
    }
    flush(&mut result, &mut pending);

    result
}

fn push_text(pending: &mut String, text: &str) {
    if !text.is_empty() {
        pending.push_str(r#"<w:t xml:space="preserve">"#);
        pending.push_str(text);
        pending.push_str("</w:t>");
    }
}

/// Marks text nodes with leading or trailing white space as preserving it.
pub(crate) fn preserve_spaces(xml: &str) -> String {
    BARE_TEXT
        .replace_all(xml, |c: &Captures| {
            let text = &c[1];
            let padded = text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace);
            if padded {
                format!(r#"<w:t xml:space="preserve">{}</w:t>"#, text)
            } else {
                c[0].to_string()
            }
        })
        .into_owned()
}

/// Drops table rows without visible text or graphics. Rows of nested tables
/// are checked as well.
pub(crate) fn remove_empty_rows(xml: &str) -> String {
    if !xml.contains("<w:tr") {
        return xml.to_string();
    }
    replace_elements(xml, "w:tr", |row| {
        if is_empty_row(row) {
            log::debug!("Removing an empty table row");
            return String::new();
        }
        match split_element(row) {
            Some((open, inner, close)) => format!("{}{}{}", open, remove_empty_rows(inner), close),
            None => row.to_string(),
        }
    })
}

fn is_empty_row(row: &str) -> bool {
    if GRAPHIC_MARKERS.iter().any(|marker| row.contains(marker)) {
        return false;
    }
    TEXT_CONTENT
        .captures_iter(row)
        .all(|c| c[1].trim().is_empty())
}
