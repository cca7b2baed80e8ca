//! Fill colors requested through `[[SHAPE_BG_FILL_COLOR:hex]]` and
//! `[[TABLE_CELL_BG_COLOR:hex]]` markers.

use crate::parse::markup::{
    attribute_value, direct_children, pairs, replace_elements, split_element, tags,
    with_attribute, TagKind,
};
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref SHAPE_FILL: Regex =
        Regex::new(r"\[\[SHAPE_BG_FILL_COLOR:#?([0-9A-Fa-f]{6})\]\]").unwrap();
    static ref CELL_FILL: Regex =
        Regex::new(r"\[\[TABLE_CELL_BG_COLOR:#?([0-9A-Fa-f]{6})\]\]").unwrap();
    static ref SCHEME_COLOR: Regex =
        Regex::new(r"(?s)<a:schemeClr\b[^>]*?(?:/>|>(.*?)</a:schemeClr>)").unwrap();
    static ref SRGB_VALUE: Regex = Regex::new(r#"(<a:srgbClr\b[^>]*?\bval=")[^"]*(")"#).unwrap();
    static ref VML_SHAPE: Regex =
        Regex::new(r"<(v:(?:shape|rect|roundrect|oval))\b([^>]*?)(/?)>").unwrap();
    static ref VML_FILL: Regex = Regex::new(r"<v:fill\b([^>]*?)(/?)>").unwrap();
}

/// Shape fills a `wps:spPr` may carry, one at most.
const SHAPE_FILLS: [&str; 6] = [
    "a:noFill",
    "a:solidFill",
    "a:gradFill",
    "a:blipFill",
    "a:pattFill",
    "a:grpFill",
];

/// Children of `w:tcPr` that follow `w:shd`.
const SHADE_SUCCESSORS: [&str; 11] = [
    "w:noWrap",
    "w:tcMar",
    "w:textDirection",
    "w:tcFitText",
    "w:vAlign",
    "w:hideMark",
    "w:headers",
    "w:cellIns",
    "w:cellDel",
    "w:cellMerge",
    "w:tcPrChange",
];

/// Recolors every shape that holds a shape fill marker and removes the
/// marker. Both the DrawingML shape and its VML fallback are updated.
pub(crate) fn recolor_shapes(xml: &str) -> String {
    if !SHAPE_FILL.is_match(xml) {
        return xml.to_string();
    }

    let mut result = xml.to_string();
    for container in ["mc:AlternateContent", "w:drawing", "w:pict"] {
        result = replace_elements(&result, container, recolor_shape_block);
    }
    result
}

fn recolor_shape_block(block: &str) -> String {
    let hex = match SHAPE_FILL.captures_iter(block).last() {
        Some(capture) => capture[1].to_ascii_uppercase(),
        None => return block.to_string(),
    };
    log::debug!("Filling shape with #{}", hex);

    let block = replace_elements(block, "wps:spPr", |properties| {
        fill_shape_properties(properties, &hex)
    });
    let block = recolor_vml(&block, &hex);
    SHAPE_FILL.replace_all(&block, "").into_owned()
}

fn solid_fill(hex: &str) -> String {
    format!(r#"<a:solidFill><a:srgbClr val="{}"/></a:solidFill>"#, hex)
}

fn fill_shape_properties(properties: &str, hex: &str) -> String {
    let (open, inner, close) = match split_element(properties) {
        Some(parts) => parts,
        None => {
            let open = properties.trim_end_matches("/>").trim_end();
            return format!("{}>{}</wps:spPr>", open, solid_fill(hex));
        }
    };

    let lexed = tags(inner);
    let paired = pairs(&lexed);
    let children = direct_children(&lexed, &paired);

    let fill = children
        .iter()
        .find(|child| SHAPE_FILLS.contains(&lexed[child.0].name));
    let (range, replacement) = match fill {
        Some(&(first, last)) => {
            let range = lexed[first].span.start..lexed[last].span.end;
            let replacement = if lexed[first].name == "a:gradFill" {
                recolor_gradient(&inner[range.clone()], hex)
            } else {
                solid_fill(hex)
            };
            (range, replacement)
        }
        None => {
            let anchor = children
                .iter()
                .rev()
                .find(|child| matches!(lexed[child.0].name, "a:prstGeom" | "a:custGeom"))
                .or_else(|| children.iter().find(|child| lexed[child.0].name == "a:xfrm"));
            let at = anchor.map(|&(_, last)| lexed[last].span.end).unwrap_or(0);
            (at..at, solid_fill(hex))
        }
    };

    format!(
        "{}{}{}{}{}",
        open,
        &inner[..range.start],
        replacement,
        &inner[range.end..],
        close
    )
}

/// Keeps the gradient stops and their modifiers, pinned to one color.
fn recolor_gradient(gradient: &str, hex: &str) -> String {
    let srgb = SCHEME_COLOR.replace_all(gradient, |c: &Captures| match c.get(1) {
        Some(modifiers) => format!(r#"<a:srgbClr val="{}">{}</a:srgbClr>"#, hex, modifiers.as_str()),
        None => format!(r#"<a:srgbClr val="{}"/>"#, hex),
    });
    SRGB_VALUE
        .replace_all(&srgb, |c: &Captures| format!("{}{}{}", &c[1], hex, &c[2]))
        .into_owned()
}

fn recolor_vml(block: &str, hex: &str) -> String {
    let color = format!("#{}", hex);

    let shapes = VML_SHAPE.replace_all(block, |c: &Captures| {
        let mut attributes = with_attribute(&c[2], "fillcolor", &color);
        if attribute_value(&attributes, "filled") == Some("f") {
            attributes = with_attribute(&attributes, "filled", "t");
        }
        format!("<{}{}{}>", &c[1], attributes, &c[3])
    });

    VML_FILL
        .replace_all(&shapes, |c: &Captures| {
            let attributes = &c[1];
            // Solid and pattern fills already follow the shape's fillcolor
            let gradient = attribute_value(attributes, "type")
                .map(|kind| kind.starts_with("gradient"))
                .unwrap_or(false);
            if !gradient {
                return c[0].to_string();
            }
            let darker = adjust_brightness(hex, 0.25, false);
            let lighter = adjust_brightness(hex, 0.35, true);
            let mut rebuilt = with_attribute(
                attributes,
                "colors",
                &format!("0 #{};0.5 #{};1 #{}", darker, hex, lighter),
            );
            rebuilt = with_attribute(&rebuilt, "color2", &format!("#{}", lighter));
            format!("<v:fill{}{}>", rebuilt, &c[2])
        })
        .into_owned()
}

/// Moves each channel of `hex` towards white (`lighten`) or black by
/// `factor`.
pub(crate) fn adjust_brightness(hex: &str, factor: f64, lighten: bool) -> String {
    let channel = |offset: usize| -> f64 {
        hex.get(offset..offset + 2)
            .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            .map(f64::from)
            .unwrap_or(0.0)
    };

    [0, 2, 4]
        .iter()
        .map(|&offset| {
            let c = channel(offset);
            let adjusted = if lighten {
                c + (255.0 - c) * factor
            } else {
                c * (1.0 - factor)
            };
            format!("{:02X}", (adjusted.clamp(0.0, 255.0) + 0.5).floor() as u8)
        })
        .collect()
}

/// Sets the shading of every table cell that holds a cell fill marker,
/// removes the marker and any run it leaves empty.
pub(crate) fn recolor_table_cells(xml: &str) -> String {
    if !CELL_FILL.is_match(xml) {
        return xml.to_string();
    }
    replace_elements(xml, "w:tc", recolor_cell)
}

fn recolor_cell(cell: &str) -> String {
    if !CELL_FILL.is_match(cell) {
        return cell.to_string();
    }
    let (open, body, close) = match split_element(cell) {
        Some(parts) => parts,
        None => return cell.to_string(),
    };

    // cells of nested tables carry their own markers
    let body = replace_elements(body, "w:tbl", |table| {
        replace_elements(table, "w:tc", recolor_cell)
    });
    let hex = match CELL_FILL.captures_iter(&body).last() {
        Some(capture) => capture[1].to_ascii_uppercase(),
        None => return format!("{}{}{}", open, body, close),
    };
    log::debug!("Shading table cell with #{}", hex);

    let body = CELL_FILL.replace_all(&body, "");
    let body = remove_empty_text_runs(&body);
    format!("{}{}{}", open, shade_cell(&body, &hex), close)
}

fn remove_empty_text_runs(xml: &str) -> String {
    replace_elements(xml, "w:r", |run| {
        if is_empty_text_run(run) {
            String::new()
        } else {
            run.to_string()
        }
    })
}

/// A run holding nothing but its properties and one empty text node.
fn is_empty_text_run(run: &str) -> bool {
    let inner = match split_element(run) {
        Some((_, inner, _)) => inner,
        None => return false,
    };
    let lexed = tags(inner);
    let paired = pairs(&lexed);

    let mut texts: usize = 0;
    for (first, last) in direct_children(&lexed, &paired) {
        match lexed[first].name {
            "w:rPr" => (),
            "w:t" if first == last || inner[lexed[first].span.end..lexed[last].span.start].is_empty() => {
                texts += 1
            }
            _ => return false,
        }
    }
    texts == 1
}

fn shade(hex: &str) -> String {
    format!(r#"<w:shd w:val="clear" w:color="auto" w:fill="{}"/>"#, hex)
}

fn shade_cell(body: &str, hex: &str) -> String {
    let lexed = tags(body);
    let paired = pairs(&lexed);

    let first = match lexed.first() {
        Some(first) if first.name == "w:tcPr" => first,
        _ => return format!("<w:tcPr>{}</w:tcPr>{}", shade(hex), body),
    };

    let properties_end = match first.kind {
        TagKind::Open => match paired[0] {
            Some(close) => lexed[close].span.end,
            None => return body.to_string(),
        },
        TagKind::Empty => {
            return format!(
                "{}<w:tcPr{}>{}</w:tcPr>{}",
                &body[..first.span.start],
                first.attributes,
                shade(hex),
                &body[first.span.end..]
            );
        }
        TagKind::Close => return body.to_string(),
    };

    let properties = &body[first.span.start..properties_end];
    format!(
        "{}{}{}",
        &body[..first.span.start],
        shade_cell_properties(properties, hex),
        &body[properties_end..]
    )
}

fn shade_cell_properties(properties: &str, hex: &str) -> String {
    let (open, inner, close) = match split_element(properties) {
        Some(parts) => parts,
        None => return properties.to_string(),
    };
    let lexed = tags(inner);
    let paired = pairs(&lexed);
    let children = direct_children(&lexed, &paired);

    if let Some(&(first, _)) = children.iter().find(|c| lexed[c.0].name == "w:shd") {
        let tag = &lexed[first];
        let closing = if tag.kind == TagKind::Empty { "/>" } else { ">" };
        let rebuilt = format!(
            "<w:shd{}{}",
            with_attribute(tag.attributes, "w:fill", hex),
            closing
        );
        return format!(
            "{}{}{}{}{}",
            open,
            &inner[..tag.span.start],
            rebuilt,
            &inner[tag.span.end..],
            close
        );
    }

    let at = children
        .iter()
        .find(|c| SHADE_SUCCESSORS.contains(&lexed[c.0].name))
        .map(|c| lexed[c.0].span.start)
        .unwrap_or(inner.len());
    format!(
        "{}{}{}{}{}",
        open,
        &inner[..at],
        shade(hex),
        &inner[at..],
        close
    )
}
