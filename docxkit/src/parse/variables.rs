//! Lists the data fields a template refers to.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

lazy_static! {
    static ref EXPRESSION: Regex = Regex::new(r"\{\{\{?~?([\s\S]*?)~?\}?\}\}").unwrap();
    static ref NUMBER: Regex = Regex::new(r"^-?\d+(\.\d+)?([eE][-+]?\d+)?$").unwrap();
}

/// Helpers every handlebars registry knows about.
const BUILT_IN_HELPERS: [&str; 17] = [
    "if", "unless", "each", "with", "lookup", "log", "raw", "eq", "ne", "gt", "gte", "lt", "lte",
    "and", "or", "not", "len",
];

#[derive(Debug, PartialEq)]
enum Token {
    Word(String),
    Literal,
    OpenSub,
    CloseSub,
}

/// Collects every field path referenced by the expressions of an already
/// patched template. Names in `helpers` are never reported as fields.
pub fn extract_variables(template: &str, helpers: &BTreeSet<String>) -> BTreeSet<String> {
    let mut result = BTreeSet::new();

    for capture in EXPRESSION.captures_iter(template) {
        let body = capture[1].trim();
        if body.starts_with('!') || body.starts_with('>') || body.starts_with('/') {
            continue;
        }
        if body.starts_with("#>") || body.starts_with("#*") || body.starts_with('*') {
            continue;
        }
        let body = body.trim_start_matches(|c| c == '#' || c == '^');
        let body = match body.strip_prefix("else") {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
            _ => body,
        };

        collect_fields(&tokenize(body), helpers, &mut result);
    }

    result
}

fn collect_fields(tokens: &[Token], helpers: &BTreeSet<String>, result: &mut BTreeSet<String>) {
    // one flag per nesting level: is the next word in head position
    let mut heads: Vec<bool> = vec![true];

    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::OpenSub => heads.push(true),
            Token::CloseSub => {
                heads.pop();
                if heads.is_empty() {
                    heads.push(false);
                }
            }
            Token::Literal => mark_argument(&mut heads),
            Token::Word(word) => {
                let head = heads.last().copied().unwrap_or(false);
                mark_argument(&mut heads);

                if word == "as" {
                    return;
                }
                let value = match word.split_once('=') {
                    Some((_, value)) => value,
                    None => word.as_str(),
                };
                if value.is_empty() {
                    continue;
                }
                if head {
                    let has_arguments = !matches!(tokens.get(index + 1), None | Some(Token::CloseSub));
                    if has_arguments || helpers.contains(value) || BUILT_IN_HELPERS.contains(&value) {
                        continue;
                    }
                }
                if let Some(path) = field_path(value) {
                    result.insert(path);
                }
            }
        }
    }
}

fn mark_argument(heads: &mut [bool]) {
    if let Some(head) = heads.last_mut() {
        *head = false;
    }
}

fn field_path(word: &str) -> Option<String> {
    if NUMBER.is_match(word) || matches!(word, "true" | "false" | "null" | "undefined" | "this" | "else") {
        return None;
    }
    let mut path = word;
    if let Some(rest) = path.strip_prefix("@root.") {
        path = rest;
    } else if path.starts_with('@') {
        return None;
    }
    while let Some(rest) = path.strip_prefix("../") {
        path = rest;
    }
    for prefix in ["this.", "this/", "./"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            path = rest;
        }
    }
    if path.is_empty() || path == "this" {
        return None;
    }
    Some(path.to_string())
}

fn tokenize(body: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars();

    let flush = |current: &mut String, tokens: &mut Vec<Token>| {
        if !current.is_empty() {
            tokens.push(Token::Word(std::mem::take(current)));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                let quote_in_hash = current.ends_with('=');
                for inner in chars.by_ref() {
                    if inner == c {
                        break;
                    }
                }
                if quote_in_hash {
                    current.clear();
                }
                flush(&mut current, &mut tokens);
                tokens.push(Token::Literal);
            }
            '(' => {
                flush(&mut current, &mut tokens);
                tokens.push(Token::OpenSub);
            }
            ')' => {
                flush(&mut current, &mut tokens);
                tokens.push(Token::CloseSub);
            }
            '|' => {
                // block parameters end the expression
                flush(&mut current, &mut tokens);
                break;
            }
            c if c.is_whitespace() => flush(&mut current, &mut tokens),
            c => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);

    tokens
}
