pub(crate) mod helpers;
pub(crate) mod runs;

use crate::errors::DocxTemplateError;
use crate::parse::{markup::escape_xml, patch_xml};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    ScopedJson,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A caller-supplied helper. It is shared between the engines built for the
/// document parts and for the embedded workbooks.
#[derive(Clone)]
pub(crate) struct SharedHelper(pub(crate) Arc<dyn HelperDef + Send + Sync>);

impl HelperDef for SharedHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        self.0.call_inner(h, r, ctx, rc)
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        self.0.call(h, r, ctx, rc, out)
    }
}

/// Patches and renders the text of one part.
pub(crate) struct TemplateEngine {
    registry: Handlebars<'static>,
}

impl TemplateEngine {
    /// Engine for document, header, footer and chart parts.
    pub(crate) fn for_document(custom: &[(String, SharedHelper)]) -> Self {
        let mut registry = base_registry();
        helpers::register_library(&mut registry);
        register_custom(&mut registry, custom);
        TemplateEngine { registry }
    }

    /// Engine for the shared strings of an embedded workbook.
    pub(crate) fn for_workbook(custom: &[(String, SharedHelper)]) -> Self {
        let mut registry = base_registry();
        helpers::register_library(&mut registry);
        helpers::register_workbook_library(&mut registry);
        register_custom(&mut registry, custom);
        TemplateEngine { registry }
    }

    pub(crate) fn render(
        &self,
        part: &str,
        source: &str,
        data: &Value,
    ) -> Result<String, DocxTemplateError> {
        let patched = patch_xml(source);
        log::debug!("Rendering '{}'", part);
        self.registry
            .render_template(&patched, data)
            .map_err(|source| DocxTemplateError::Render {
                part: part.into(),
                source,
            })
    }
}

/// Every helper name the engines know, for telling helpers from fields.
pub(crate) fn known_helpers(custom: &[(String, SharedHelper)]) -> BTreeSet<String> {
    helpers::LIBRARY
        .iter()
        .chain(helpers::WORKBOOK_LIBRARY.iter())
        .map(|name| name.to_string())
        .chain(custom.iter().map(|(name, _)| name.clone()))
        .collect()
}

fn base_registry() -> Handlebars<'static> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    registry.register_escape_fn(escape_xml);
    registry
}

fn register_custom(registry: &mut Handlebars<'static>, custom: &[(String, SharedHelper)]) {
    for (name, helper) in custom {
        registry.register_helper(name, Box::new(helper.clone()));
    }
}
