//! The helper library available to every template.

use super::runs::{self, normalize_hex, StyleAxis};
use crate::parse::markup::escape_xml;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason, ScopedJson,
};
use serde_json::Value;

/// Helpers that write document markup.
pub(crate) const LIBRARY: [&str; 19] = [
    "bold",
    "italic",
    "underline",
    "strike",
    "fontSize",
    "color",
    "highlight",
    "shade",
    "style",
    "br",
    "pageBreak",
    "tab",
    "lines",
    "list",
    "concat",
    "image",
    "replaceImage",
    "shapeBgFillColor",
    "tableCellBgColor",
];

pub(crate) const WORKBOOK_LIBRARY: [&str; 1] = ["toNumberCell"];

/// What a helper evaluates to.
#[derive(Debug, PartialEq)]
pub(crate) enum Produced {
    /// Run markup, written as is.
    Markup(String),
    /// Plain text, escaped on output.
    Text(String),
    /// A structured value for other helpers to consume.
    Value(Value),
}

type HelperFn = fn(&[&Value]) -> Result<Produced, String>;

#[derive(Clone, Copy)]
struct LibraryHelper {
    name: &'static str,
    evaluate: HelperFn,
}

impl LibraryHelper {
    fn produce(&self, h: &Helper<'_>) -> Result<Produced, RenderError> {
        let params: Vec<&Value> = h.params().iter().map(|p| p.value()).collect();
        (self.evaluate)(&params)
            .map_err(|message| RenderErrorReason::Other(format!("{}: {}", self.name, message)).into())
    }
}

impl HelperDef for LibraryHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let value = match self.produce(h)? {
            Produced::Markup(s) | Produced::Text(s) => Value::String(s),
            Produced::Value(v) => v,
        };
        Ok(ScopedJson::Derived(value))
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        match self.produce(h)? {
            Produced::Markup(markup) => out.write(&markup)?,
            Produced::Text(text) => out.write(&escape_xml(&text))?,
            Produced::Value(value) => out.write(&escape_xml(&value.to_string()))?,
        }
        Ok(())
    }
}

/// Registers the document helper library.
pub(crate) fn register_library(registry: &mut Handlebars<'static>) {
    let helpers: [(&'static str, HelperFn); 19] = [
        ("bold", |p| single_axis(p, StyleAxis::Bold)),
        ("italic", |p| single_axis(p, StyleAxis::Italic)),
        ("underline", |p| single_axis(p, StyleAxis::Underline)),
        ("strike", |p| single_axis(p, StyleAxis::Strike)),
        ("fontSize", font_size),
        ("color", |p| valued_axis(p, |v| Ok(StyleAxis::Color(normalize_hex(&v)?)))),
        ("highlight", |p| valued_axis(p, |v| StyleAxis::highlight(&v))),
        ("shade", |p| valued_axis(p, |v| Ok(StyleAxis::Shade(normalize_hex(&v)?)))),
        ("style", style),
        ("br", |p| fixed(p, runs::LINE_BREAK)),
        ("pageBreak", |p| fixed(p, runs::PAGE_BREAK)),
        ("tab", |p| fixed(p, runs::TAB)),
        ("lines", |p| {
            expect_arity(p, 1)?;
            Ok(Produced::Markup(runs::lines(&text_of(p[0])?)))
        }),
        ("list", |p| Ok(Produced::Value(Value::Array(p.iter().map(|v| (*v).clone()).collect())))),
        ("concat", concat),
        ("image", |p| placeholder(p, "IMAGE")),
        ("replaceImage", |p| placeholder(p, "REPLACE_IMAGE")),
        ("shapeBgFillColor", |p| color_placeholder(p, "SHAPE_BG_FILL_COLOR")),
        ("tableCellBgColor", |p| color_placeholder(p, "TABLE_CELL_BG_COLOR")),
    ];

    for (name, evaluate) in helpers {
        registry.register_helper(name, Box::new(LibraryHelper { name, evaluate }));
    }
}

/// Registers the helpers only meaningful inside an embedded workbook.
pub(crate) fn register_workbook_library(registry: &mut Handlebars<'static>) {
    registry.register_helper(
        "toNumberCell",
        Box::new(LibraryHelper {
            name: "toNumberCell",
            evaluate: to_number_cell,
        }),
    );
}

fn expect_arity(params: &[&Value], expected: usize) -> Result<(), String> {
    if params.len() == expected {
        Ok(())
    } else {
        Err(format!("expected {} argument(s), got {}", expected, params.len()))
    }
}

fn text_of(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err("expected text, found a list or object".into()),
    }
}

fn single_axis(params: &[&Value], axis: StyleAxis) -> Result<Produced, String> {
    expect_arity(params, 1)?;
    runs::restyle(&text_of(params[0])?, &[axis]).map(Produced::Markup)
}

fn valued_axis<F>(params: &[&Value], make: F) -> Result<Produced, String>
where
    F: Fn(String) -> Result<StyleAxis, String>,
{
    expect_arity(params, 2)?;
    let axis = make(text_of(params[1])?)?;
    runs::restyle(&text_of(params[0])?, &[axis]).map(Produced::Markup)
}

fn font_size(params: &[&Value]) -> Result<Produced, String> {
    expect_arity(params, 2)?;
    let points = match params[1] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| format!("font size '{}' is not a number", params[1]))?;
    runs::restyle(&text_of(params[0])?, &[StyleAxis::size(points)?]).map(Produced::Markup)
}

fn style(params: &[&Value]) -> Result<Produced, String> {
    let (text, keywords) = params
        .split_first()
        .ok_or_else(|| "expected text followed by style keywords".to_string())?;
    let axes = keywords
        .iter()
        .map(|keyword| StyleAxis::from_keyword(&text_of(keyword)?))
        .collect::<Result<Vec<StyleAxis>, String>>()?;
    runs::restyle(&text_of(text)?, &axes).map(Produced::Markup)
}

fn fixed(params: &[&Value], markup: &str) -> Result<Produced, String> {
    expect_arity(params, 0)?;
    Ok(Produced::Markup(markup.to_string()))
}

fn concat(params: &[&Value]) -> Result<Produced, String> {
    let parts = params
        .iter()
        .map(|value| text_of(value))
        .collect::<Result<Vec<String>, String>>()?;

    if parts.iter().any(|part| runs::is_fragment(part)) {
        Ok(Produced::Markup(
            parts
                .iter()
                .filter(|part| !part.is_empty())
                .map(|part| runs::as_fragment(part))
                .collect(),
        ))
    } else {
        Ok(Produced::Text(parts.concat()))
    }
}

fn placeholder(params: &[&Value], kind: &str) -> Result<Produced, String> {
    expect_arity(params, 1)?;
    let name = text_of(params[0])?;
    if name.trim().is_empty() {
        return Err("media name is empty".into());
    }
    Ok(Produced::Text(format!("[[{}:{}]]", kind, name.trim())))
}

fn color_placeholder(params: &[&Value], kind: &str) -> Result<Produced, String> {
    expect_arity(params, 1)?;
    let hex = normalize_hex(&text_of(params[0])?)?;
    Ok(Produced::Text(format!("[[{}:{}]]", kind, hex)))
}

fn to_number_cell(params: &[&Value]) -> Result<Produced, String> {
    expect_arity(params, 1)?;
    let number = match params[0] {
        Value::Number(n) => n.to_string(),
        other => return Err(format!("'{}' is not a number", other)),
    };
    Ok(Produced::Text(format!("[[NUMBER:{}]]", number)))
}
