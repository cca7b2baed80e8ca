//! Run fragments produced by the styling helpers.
//!
//! A fragment is a sequence of complete `<w:r>` elements. Styling helpers
//! accept either plain text, which becomes a single run, or a fragment made
//! by another helper, whose text runs are re-styled in place.

use crate::parse::markup::escape_xml;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::fmt;

lazy_static! {
    static ref TEXT_RUN: Regex = Regex::new(
        r#"<w:r>(?:<w:rPr>(.*?)</w:rPr>)?<w:t xml:space="preserve">(.*?)</w:t></w:r>"#
    )
    .unwrap();
    static ref RPR_CHILD: Regex = Regex::new(r#"<w:(\w+)(?: w:val="([^"]*)")?[^>]*/>"#).unwrap();
    static ref SHD_FILL: Regex = Regex::new(r#"w:fill="([^"]*)""#).unwrap();
    static ref HEX_COLOR: Regex = Regex::new(r"^#?([0-9A-Fa-f]{6})$").unwrap();
}

/// Names accepted by `w:highlight`.
pub(crate) const HIGHLIGHT_PALETTE: [&str; 17] = [
    "black",
    "blue",
    "cyan",
    "green",
    "magenta",
    "red",
    "yellow",
    "white",
    "darkBlue",
    "darkCyan",
    "darkGreen",
    "darkMagenta",
    "darkRed",
    "darkYellow",
    "darkGray",
    "lightGray",
    "none",
];

pub(crate) const LINE_BREAK: &str = "<w:r><w:br/></w:r>";
pub(crate) const PAGE_BREAK: &str = r#"<w:r><w:br w:type="page"/></w:r>"#;
pub(crate) const TAB: &str = "<w:r><w:tab/></w:r>";

/// A single formatting property a helper can set on a run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StyleAxis {
    Bold,
    Italic,
    Underline,
    Strike,
    /// Size in half-points.
    Size(u32),
    Color(String),
    Highlight(String),
    Shade(String),
}

impl fmt::Display for StyleAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StyleAxis::Bold => "bold",
            StyleAxis::Italic => "italic",
            StyleAxis::Underline => "underline",
            StyleAxis::Strike => "strike",
            StyleAxis::Size(_) => "size",
            StyleAxis::Color(_) => "color",
            StyleAxis::Highlight(_) => "highlight",
            StyleAxis::Shade(_) => "shade",
        };
        write!(f, "{}", name)
    }
}

impl StyleAxis {
    /// Parses a `style` keyword such as `bold` or `color=FF0000`.
    pub(crate) fn from_keyword(keyword: &str) -> Result<Self, String> {
        let (name, value) = match keyword.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (keyword, None),
        };
        match (name, value) {
            ("bold", None) => Ok(StyleAxis::Bold),
            ("italic", None) => Ok(StyleAxis::Italic),
            ("underline", None) => Ok(StyleAxis::Underline),
            ("strike", None) => Ok(StyleAxis::Strike),
            ("size", Some(points)) => {
                let points = points
                    .parse::<f64>()
                    .map_err(|_| format!("font size '{}' is not a number", points))?;
                StyleAxis::size(points)
            }
            ("color", Some(hex)) => Ok(StyleAxis::Color(normalize_hex(hex)?)),
            ("highlight", Some(name)) => StyleAxis::highlight(name),
            ("shade", Some(hex)) => Ok(StyleAxis::Shade(normalize_hex(hex)?)),
            _ => Err(format!("unknown style keyword '{}'", keyword)),
        }
    }

    pub(crate) fn size(points: f64) -> Result<Self, String> {
        if !(1.0..=1638.0).contains(&points) {
            return Err(format!("font size {} is out of range", points));
        }
        Ok(StyleAxis::Size((points * 2.0).round() as u32))
    }

    pub(crate) fn highlight(name: &str) -> Result<Self, String> {
        if HIGHLIGHT_PALETTE.contains(&name) {
            Ok(StyleAxis::Highlight(name.to_string()))
        } else {
            Err(format!("'{}' is not a highlight color", name))
        }
    }
}

/// Validates a 6 digit hex color, with or without `#`, and returns it upper
/// cased without the `#`.
pub(crate) fn normalize_hex(value: &str) -> Result<String, String> {
    HEX_COLOR
        .captures(value.trim())
        .map(|capture| capture[1].to_uppercase())
        .ok_or_else(|| format!("'{}' is not a hex color", value))
}

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct RunStyle {
    bold: bool,
    italic: bool,
    underline: bool,
    strike: bool,
    size: Option<u32>,
    color: Option<String>,
    highlight: Option<String>,
    shade: Option<String>,
}

impl RunStyle {
    /// Sets one axis. Setting an axis that is already set is an error.
    pub(crate) fn apply(&mut self, axis: StyleAxis) -> Result<(), String> {
        let duplicate = match &axis {
            StyleAxis::Bold => std::mem::replace(&mut self.bold, true),
            StyleAxis::Italic => std::mem::replace(&mut self.italic, true),
            StyleAxis::Underline => std::mem::replace(&mut self.underline, true),
            StyleAxis::Strike => std::mem::replace(&mut self.strike, true),
            StyleAxis::Size(half_points) => self.size.replace(*half_points).is_some(),
            StyleAxis::Color(hex) => self.color.replace(hex.clone()).is_some(),
            StyleAxis::Highlight(name) => self.highlight.replace(name.clone()).is_some(),
            StyleAxis::Shade(hex) => self.shade.replace(hex.clone()).is_some(),
        };
        if duplicate {
            Err(format!("style '{}' is already applied", axis))
        } else {
            Ok(())
        }
    }

    /// Reads back the properties of a run written by `to_run_properties`.
    fn from_run_properties(rpr: &str) -> Self {
        let mut style = RunStyle::default();
        for capture in RPR_CHILD.captures_iter(rpr) {
            let value = capture.get(2).map(|m| m.as_str().to_string());
            match &capture[1] {
                "b" => style.bold = true,
                "i" => style.italic = true,
                "u" => style.underline = true,
                "strike" => style.strike = true,
                "sz" => style.size = value.and_then(|v| v.parse().ok()),
                "color" => style.color = value,
                "highlight" => style.highlight = value,
                "shd" => {
                    style.shade = SHD_FILL
                        .captures(&capture[0])
                        .map(|fill| fill[1].to_string())
                }
                _ => (),
            }
        }
        style
    }

    /// Run properties in schema order.
    pub(crate) fn to_run_properties(&self) -> String {
        let mut result = String::new();
        if self.bold {
            result.push_str("<w:b/><w:bCs/>");
        }
        if self.italic {
            result.push_str("<w:i/><w:iCs/>");
        }
        if self.strike {
            result.push_str("<w:strike/>");
        }
        if let Some(color) = &self.color {
            result.push_str(&format!(r#"<w:color w:val="{}"/>"#, color));
        }
        if let Some(size) = self.size {
            result.push_str(&format!(
                r#"<w:sz w:val="{0}"/><w:szCs w:val="{0}"/>"#,
                size
            ));
        }
        if let Some(highlight) = &self.highlight {
            result.push_str(&format!(r#"<w:highlight w:val="{}"/>"#, highlight));
        }
        if self.underline {
            result.push_str(r#"<w:u w:val="single"/>"#);
        }
        if let Some(shade) = &self.shade {
            result.push_str(&format!(
                r#"<w:shd w:val="clear" w:color="auto" w:fill="{}"/>"#,
                shade
            ));
        }
        result
    }
}

/// A run with escaped text.
pub(crate) fn text_run(style: &RunStyle, escaped_text: &str) -> String {
    let rpr = style.to_run_properties();
    if rpr.is_empty() {
        format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, escaped_text)
    } else {
        format!(
            r#"<w:r><w:rPr>{}</w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#,
            rpr, escaped_text
        )
    }
}

/// Whether `value` is markup produced by one of the run helpers rather than
/// plain text.
pub(crate) fn is_fragment(value: &str) -> bool {
    value.starts_with("<w:r>") && value.ends_with("</w:r>")
}

/// Turns plain text into a run, or passes a fragment through.
pub(crate) fn as_fragment(value: &str) -> String {
    if is_fragment(value) {
        value.to_string()
    } else {
        text_run(&RunStyle::default(), &escape_xml(value))
    }
}

/// Applies `axes` to plain text or to every text run of a fragment.
pub(crate) fn restyle(value: &str, axes: &[StyleAxis]) -> Result<String, String> {
    let fragment = as_fragment(value);
    let mut failure: Option<String> = None;

    let result = TEXT_RUN.replace_all(&fragment, |capture: &Captures| {
        let mut style = capture
            .get(1)
            .map(|rpr| RunStyle::from_run_properties(rpr.as_str()))
            .unwrap_or_default();
        for axis in axes {
            if let Err(message) = style.apply(axis.clone()) {
                failure.get_or_insert(message);
            }
        }
        text_run(&style, &capture[2])
    });

    match failure {
        Some(message) => Err(message),
        None => Ok(result.into_owned()),
    }
}

/// Text with line feeds turned into line breaks.
pub(crate) fn lines(text: &str) -> String {
    text.replace("\r\n", "\n")
        .split('\n')
        .map(|line| text_run(&RunStyle::default(), &escape_xml(line)))
        .collect::<Vec<String>>()
        .join(LINE_BREAK)
}
