//! Repairs template expressions that a word processor has cut into pieces.
//!
//! Authoring tools are free to split `{{ Title }}` into several runs, to
//! wrap parts of it into proofing or bookmark elements and to escape its
//! quotes. `patch_xml` puts such expressions back together so the template
//! engine sees the text the author typed.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref SPLIT_OPEN: Regex = Regex::new(r"\{([^\}]*?)\{").unwrap();
    static ref SPLIT_CLOSE: Regex = Regex::new(r"\}([^\{]*?)\}").unwrap();
    static ref EXPRESSION: Regex = Regex::new(r"\{\{[\s\S]*?\}\}").unwrap();
    static ref MARKUP_TAG: Regex = Regex::new(r"<\s*/?[\w\-:.]+(\s+[^>]*?)?[\s/]*>").unwrap();
    static ref BARE_HEX_ARGUMENTS: Vec<(&'static str, Regex)> = ["shapeBgFillColor", "tableCellBgColor"]
        .iter()
        .map(|name| {
            let pattern = format!(r"\{{\{{(~?)\s*{}\s+(#?[0-9A-Fa-f]{{6}})\s*(~?)\}}\}}", name);
            (*name, Regex::new(&pattern).unwrap())
        })
        .collect();
}

const ENTITIES: [(&str, &str); 10] = [
    ("&quot;", "\""),
    ("&#34;", "\""),
    ("&apos;", "'"),
    ("&#39;", "'"),
    ("&lt;", "<"),
    ("&#60;", "<"),
    ("&gt;", ">"),
    ("&#62;", ">"),
    ("&amp;", "&"),
    ("&#38;", "&"),
];

/// Normalizes template expressions in `xml`. Applying it twice gives the same
/// result as applying it once.
pub fn patch_xml(xml: &str) -> String {
    let merged = SPLIT_OPEN.replace_all(xml, "{{");
    let merged = SPLIT_CLOSE.replace_all(&merged, "}}");

    let cleaned = EXPRESSION.replace_all(&merged, |capture: &Captures| {
        normalize_dot_references(&clean_expression(&capture[0]))
    });

    let mut result = cleaned.into_owned();
    for (name, pattern) in BARE_HEX_ARGUMENTS.iter() {
        result = pattern
            .replace_all(&result, |capture: &Captures| {
                format!(
                    "{{{{{}{} \"{}\"{}}}}}",
                    &capture[1], name, &capture[2], &capture[3]
                )
            })
            .into_owned();
    }

    result
}

/// Strips markup and unescapes entities until neither changes the text.
fn clean_expression(expression: &str) -> String {
    let mut current = expression.to_string();
    loop {
        let mut next = MARKUP_TAG.replace_all(&current, "").into_owned();
        for (entity, replacement) in ENTITIES.iter() {
            next = next.replace(entity, replacement);
        }
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Accepts `.Field` as a field reference and a bare `.` as the current
/// context. Quoted literals are left alone.
fn normalize_dot_references(expression: &str) -> String {
    let chars: Vec<char> = expression.chars().collect();
    let mut result = String::with_capacity(expression.len());
    let mut quote: Option<char> = None;

    for (index, &c) in chars.iter().enumerate() {
        if let Some(open) = quote {
            if c == open {
                quote = None;
            }
            result.push(c);
            continue;
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
            result.push(c);
            continue;
        }
        if c == '.' {
            let before = index.checked_sub(1).map(|i| chars[i]);
            let after = chars.get(index + 1).copied();
            let leads_reference = match before {
                Some(b) => b.is_whitespace() || matches!(b, '{' | '(' | '~' | '='),
                None => true,
            };
            if leads_reference {
                match after {
                    Some(a) if a.is_alphabetic() || a == '_' || a == '[' => continue,
                    Some(a) if a.is_whitespace() || matches!(a, '}' | ')' | '~') => {
                        result.push_str("this");
                        continue;
                    }
                    None => {
                        result.push_str("this");
                        continue;
                    }
                    _ => (),
                }
            }
        }
        result.push(c);
    }

    result
}
