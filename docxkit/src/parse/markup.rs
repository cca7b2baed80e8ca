//! A tag-level view over serialized markup.
//!
//! The passes in this crate work on the text of a part rather than on a
//! document tree, but they still need to know where an element starts and
//! where its matching end tag is. This module lexes start/end/empty tags and
//! pairs them up by name, which is enough to find balanced element regions
//! even when elements of the same name nest.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;

lazy_static! {
    static ref TAG: Regex =
        Regex::new(r"<(/?)([A-Za-z_][\w.\-]*(?::[\w.\-]+)?)((?:\s[^>]*?)?)(/?)>").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagKind {
    Open,
    Close,
    Empty,
}

#[derive(Debug, Clone)]
pub(crate) struct Tag<'a> {
    pub kind: TagKind,
    pub name: &'a str,
    pub attributes: &'a str,
    pub span: Range<usize>,
}

/// Lexes every element tag of `xml` in document order. Comments, processing
/// instructions and CDATA sections are not reported.
pub(crate) fn tags(xml: &str) -> Vec<Tag<'_>> {
    TAG.captures_iter(xml)
        .filter_map(|capture| {
            let whole = capture.get(0)?;
            let name = capture.get(2)?.as_str();
            let attributes = capture.get(3).map(|m| m.as_str()).unwrap_or("");
            let kind = if !capture[1].is_empty() {
                TagKind::Close
            } else if !capture[4].is_empty() {
                TagKind::Empty
            } else {
                TagKind::Open
            };
            Some(Tag {
                kind,
                name,
                attributes,
                span: whole.range(),
            })
        })
        .collect()
}

/// Byte ranges of every outermost `name` element in `xml`, start tag through
/// end tag. Elements left open at the end of the input are ignored.
pub(crate) fn element_ranges(xml: &str, name: &str) -> Vec<Range<usize>> {
    let mut result: Vec<Range<usize>> = Vec::new();
    let mut depth: usize = 0;
    let mut start: usize = 0;

    for tag in tags(xml).into_iter().filter(|tag| tag.name == name) {
        match tag.kind {
            TagKind::Empty if depth == 0 => result.push(tag.span),
            TagKind::Empty => (),
            TagKind::Open => {
                if depth == 0 {
                    start = tag.span.start;
                }
                depth += 1;
            }
            TagKind::Close if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    result.push(start..tag.span.end);
                }
            }
            TagKind::Close => (),
        }
    }

    result
}

/// Rewrites every outermost `name` element with `f`, leaving the text in
/// between untouched.
pub(crate) fn replace_elements<F>(xml: &str, name: &str, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let ranges = element_ranges(xml, name);
    if ranges.is_empty() {
        return xml.to_string();
    }

    let mut result = String::with_capacity(xml.len());
    let mut bookmark: usize = 0;
    for range in ranges {
        result.push_str(&xml[bookmark..range.start]);
        result.push_str(&f(&xml[range.clone()]));
        bookmark = range.end;
    }
    result.push_str(&xml[bookmark..]);

    result
}

/// For every tag, the index of its partner: the end tag of an open tag and
/// the open tag of an end tag. Empty and unbalanced tags have none.
pub(crate) fn pairs(tags: &[Tag<'_>]) -> Vec<Option<usize>> {
    let mut result: Vec<Option<usize>> = vec![None; tags.len()];
    let mut open: HashMap<&str, Vec<usize>> = HashMap::new();

    for (index, tag) in tags.iter().enumerate() {
        match tag.kind {
            TagKind::Open => open.entry(tag.name).or_default().push(index),
            TagKind::Close => {
                if let Some(start) = open.get_mut(tag.name).and_then(|stack| stack.pop()) {
                    result[start] = Some(index);
                    result[index] = Some(start);
                }
            }
            TagKind::Empty => (),
        }
    }

    result
}

/// Index pairs `(first tag, last tag)` of the top level elements lexed from
/// an element's content.
pub(crate) fn direct_children(lexed: &[Tag<'_>], paired: &[Option<usize>]) -> Vec<(usize, usize)> {
    let mut children: Vec<(usize, usize)> = Vec::new();
    let mut index: usize = 0;
    while index < lexed.len() {
        let last = match lexed[index].kind {
            TagKind::Open => paired[index].unwrap_or(index),
            _ => index,
        };
        if lexed[index].kind != TagKind::Close {
            children.push((index, last));
        }
        index = last + 1;
    }
    children
}

/// Value of attribute `name` inside the raw attribute text of a tag.
pub(crate) fn attribute_value<'a>(attributes: &'a str, name: &str) -> Option<&'a str> {
    attribute_range(attributes, name).map(|range| &attributes[range])
}

/// Byte range of the value of attribute `name`, quotes excluded.
fn attribute_range(attributes: &str, name: &str) -> Option<Range<usize>> {
    let mut offset: usize = 0;
    while let Some(found) = attributes[offset..].find(name) {
        let position = offset + found;
        let before_ok = attributes[..position]
            .chars()
            .last()
            .map(char::is_whitespace)
            .unwrap_or(position == 0);
        let after = position + name.len();
        let rest = &attributes[after..];
        let trimmed = rest.trim_start();
        if before_ok && trimmed.starts_with('=') {
            let value = trimmed[1..].trim_start();
            let value_start = attributes.len() - value.len();
            let quote = value.chars().next()?;
            if quote == '"' || quote == '\'' {
                let end = value[1..].find(quote)?;
                return Some(value_start + 1..value_start + 1 + end);
            }
        }
        offset = after;
    }
    None
}

/// Raw attribute text with attribute `name` set to `value`, appended when
/// missing. `value` must already be escaped.
pub(crate) fn with_attribute(attributes: &str, name: &str, value: &str) -> String {
    match attribute_range(attributes, name) {
        Some(range) => format!(
            "{}{}{}",
            &attributes[..range.start],
            value,
            &attributes[range.end..]
        ),
        None => format!("{} {}=\"{}\"", attributes.trim_end(), name, value),
    }
}

/// Splits a non-empty element into its start tag, content and end tag.
pub(crate) fn split_element(element: &str) -> Option<(&str, &str, &str)> {
    let open_end = element.find('>')? + 1;
    if element[..open_end].ends_with("/>") {
        return None;
    }
    let close_start = element.rfind("</")?;
    if close_start < open_end {
        return None;
    }
    Some((
        &element[..open_end],
        &element[open_end..close_start],
        &element[close_start..],
    ))
}

/// Escapes text for use as XML character data or attribute value.
pub(crate) fn escape_xml(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}

/// Reverses the predefined XML entities.
pub(crate) fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
