//! This module is responsible for assembling a finished .docx file out of a
//! skeleton, caller data and registered media.

use crate::{
    chart_part, embedded_workbook_part,
    errors::{BoxError, DocxTemplateError},
    footer_part, header_part,
    inject::inject_placeholders,
    meta::{DocumentMeta, MediaAsset, MediaMap},
    package::{ContentTypes, Package, Relationship, Relationships},
    parse::{extract_variables, patch_xml},
    render::{known_helpers, SharedHelper, TemplateEngine},
    xlsx::{patch_chart_cache, sync_workbook, ChartBindings, ChartValue, PART_SHARED_STRINGS},
    PART_CONTENT_TYPES, PART_DOCUMENT, PART_DOCUMENT_RELS,
};
use handlebars::HelperDef;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A caller-supplied transformation of the text of one part.
pub type PartProcessor = Box<dyn Fn(&str) -> Result<String, BoxError> + Send + Sync>;

type ProcessorChains = BTreeMap<String, Vec<PartProcessor>>;

/// Where a template is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Created,
    Applied,
    Saved,
    BytesRead,
}

/// Everything the caller registered before applying.
#[derive(Default)]
struct TemplateConfig {
    media: MediaMap,
    helpers: Vec<(String, SharedHelper)>,
    pre_processors: ProcessorChains,
    post_processors: ProcessorChains,
}

/// A .docx skeleton supporting Handlebars syntax in its document, headers,
/// footers, charts and embedded workbooks.
pub struct DocxTemplate {
    source: Vec<u8>,
    config: TemplateConfig,
    state: AssemblyState,
    output: Option<Vec<u8>>,
}

impl fmt::Debug for DocxTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocxTemplate")
            .field("source_len", &self.source.len())
            .field("media", &self.config.media.keys().collect::<Vec<_>>())
            .field(
                "helpers",
                &self.config.helpers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl DocxTemplate {
    /// Create DocxTemplate from memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocxTemplateError> {
        let source = Vec::from(bytes);
        // Fail early on anything that is not a zip container.
        Package::from_bytes(source.clone())?;

        Ok(Self {
            source,
            config: TemplateConfig::default(),
            state: AssemblyState::Created,
            output: None,
        })
    }

    /// Create a DocxTemplate from a .docx file on disk.
    pub fn from_file<P: AsRef<Path>>(file_name: P) -> Result<Self, DocxTemplateError> {
        let buf = std::fs::read(file_name)?;
        DocxTemplate::from_bytes(&buf)
    }

    /// Registers an image templates can refer to by the base name of `name`.
    pub fn add_media(&mut self, name: &str, data: Vec<u8>) -> &mut Self {
        let asset = MediaAsset::new(name, data);
        if asset.kind().is_none() {
            log::warn!(
                "Media '{}' has an unsupported format (only png and jpeg are placed)",
                asset.name
            );
        }
        self.config.media.insert(asset.name.clone(), asset);
        self
    }

    /// Registers a helper, replacing a built-in or earlier helper of the same
    /// name.
    pub fn add_helper<H>(&mut self, name: &str, helper: H) -> &mut Self
    where
        H: HelperDef + Send + Sync + 'static,
    {
        let helper = SharedHelper(Arc::new(helper));
        match self.config.helpers.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = helper,
            None => self.config.helpers.push((name.to_string(), helper)),
        }
        self
    }

    /// Appends `processor` to the chain run over `part` before assembly.
    pub fn add_pre_processor<F>(&mut self, part: &str, processor: F) -> &mut Self
    where
        F: Fn(&str) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.config
            .pre_processors
            .entry(part.to_string())
            .or_default()
            .push(Box::new(processor));
        self
    }

    /// Appends `processor` to the chain run over `part` of the assembled
    /// document.
    pub fn add_post_processor<F>(&mut self, part: &str, processor: F) -> &mut Self
    where
        F: Fn(&str) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.config
            .post_processors
            .entry(part.to_string())
            .or_default()
            .push(Box::new(processor));
        self
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Every field path the skeleton refers to, across the document, headers,
    /// footers, charts and the string tables of embedded workbooks.
    pub fn variables(&self) -> Result<BTreeSet<String>, DocxTemplateError> {
        let mut sources = Sources::open(&self.source, &self.config.pre_processors)?;
        let helpers = known_helpers(&self.config.helpers);
        let mut result = BTreeSet::new();

        for part in template_parts(&sources.package) {
            let template = patch_xml(&sources.text(&part)?);
            result.extend(extract_variables(&template, &helpers));
        }

        for part in numbered_parts(&sources.package, 0, embedded_workbook_part) {
            let mut workbook = Package::from_bytes(sources.bytes(&part)?)?;
            if workbook.contains(PART_SHARED_STRINGS) {
                let template = patch_xml(&workbook.read_text(PART_SHARED_STRINGS)?);
                result.extend(extract_variables(&template, &helpers));
            }
        }

        Ok(result)
    }

    /// Render the template given some data context into a new .docx file,
    /// available through [`DocxTemplate::bytes`] and [`DocxTemplate::save`].
    pub fn apply<T: Serialize>(&mut self, data: &T) -> Result<(), DocxTemplateError> {
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(error) => {
                self.discard();
                return Err(error.into());
            }
        };
        self.apply_value(&value)
    }

    /// Same as [`DocxTemplate::apply`] with data given as JSON text.
    pub fn apply_json(&mut self, json: &[u8]) -> Result<(), DocxTemplateError> {
        let value: Value = match serde_json::from_slice(json) {
            Ok(value) => value,
            Err(error) => {
                self.discard();
                return Err(error.into());
            }
        };
        self.apply_value(&value)
    }

    fn apply_value(&mut self, data: &Value) -> Result<(), DocxTemplateError> {
        match assemble(&self.source, &self.config, data) {
            Ok(output) => {
                self.output = Some(output);
                self.state = AssemblyState::Applied;
                Ok(())
            }
            Err(error) => {
                self.discard();
                Err(error)
            }
        }
    }

    fn discard(&mut self) {
        self.output = None;
        self.state = AssemblyState::Created;
    }

    /// The assembled document.
    pub fn bytes(&mut self) -> Result<&[u8], DocxTemplateError> {
        match &self.output {
            Some(output) => {
                self.state = AssemblyState::BytesRead;
                Ok(output.as_slice())
            }
            None => Err(DocxTemplateError::NotApplied),
        }
    }

    /// Writes the assembled document to `file_name`.
    pub fn save<P: AsRef<Path>>(&mut self, file_name: P) -> Result<(), DocxTemplateError> {
        let output = self.output.as_ref().ok_or(DocxTemplateError::NotApplied)?;
        std::fs::write(file_name, output)?;
        self.state = AssemblyState::Saved;
        Ok(())
    }
}

/// Names produced by `name(first)`, `name(first + 1)`, ... up to the first
/// one missing from the package.
fn numbered_parts(package: &Package, first: usize, name: fn(usize) -> String) -> Vec<String> {
    (first..)
        .map(name)
        .take_while(|part| package.contains(part))
        .collect()
}

/// Templated text parts in processing order, the document excepted.
fn template_parts(package: &Package) -> Vec<String> {
    let mut parts = numbered_parts(package, 1, header_part);
    parts.extend(numbered_parts(package, 1, footer_part));
    if package.contains(PART_DOCUMENT) {
        parts.push(PART_DOCUMENT.to_string());
    }
    parts.extend(numbered_parts(package, 1, chart_part));
    parts
}

/// `word/header1.xml` -> `word/_rels/header1.xml.rels`
fn relationships_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((folder, file)) => format!("{}/_rels/{}.rels", folder, file),
        None => format!("_rels/{}.rels", part),
    }
}

fn run_chain(part: &str, text: String, chain: &[PartProcessor]) -> Result<String, DocxTemplateError> {
    chain.iter().try_fold(text, |text, processor| {
        processor(&text).map_err(|error| DocxTemplateError::Processor {
            part: part.into(),
            message: error.to_string(),
        })
    })
}

/// Part contents as seen by the assembly: pre-processed text where a chain
/// ran, the stored part otherwise.
struct Sources {
    package: Package,
    processed: HashMap<String, String>,
}

impl Sources {
    fn open(bytes: &[u8], pre_processors: &ProcessorChains) -> Result<Self, DocxTemplateError> {
        let mut package = Package::from_bytes(bytes.to_vec())?;
        let mut processed = HashMap::new();

        for (part, chain) in pre_processors {
            if !package.contains(part) {
                log::warn!("No part '{}' to pre-process", part);
                continue;
            }
            log::debug!("Pre-processing '{}'", part);
            let text = run_chain(part, package.read_text(part)?, chain)?;
            processed.insert(part.clone(), text);
        }

        Ok(Sources { package, processed })
    }

    fn contains(&self, part: &str) -> bool {
        self.package.contains(part)
    }

    fn text(&mut self, part: &str) -> Result<String, DocxTemplateError> {
        match self.processed.get(part) {
            Some(text) => Ok(text.clone()),
            None => self.package.read_text(part),
        }
    }

    fn bytes(&mut self, part: &str) -> Result<Vec<u8>, DocxTemplateError> {
        match self.processed.get(part) {
            Some(text) => Ok(text.clone().into_bytes()),
            None => self.package.read(part),
        }
    }
}

/// One run of the assembly: the parts rewritten so far and the parts to add.
struct Assembly<'a> {
    data: &'a Value,
    document_engine: TemplateEngine,
    rewritten: HashMap<String, Vec<u8>>,
    appended: Vec<(String, Vec<u8>)>,
}

impl<'a> Assembly<'a> {
    /// Renders a document, header or footer part and expands its
    /// placeholders.
    fn render_text_part(
        &mut self,
        sources: &mut Sources,
        part: &str,
        meta: &mut DocumentMeta<'_>,
        relationships: &mut Vec<Relationship>,
    ) -> Result<(), DocxTemplateError> {
        let rendered = self
            .document_engine
            .render(part, &sources.text(part)?, self.data)?;
        let xml = inject_placeholders(part, &rendered, meta, relationships)?;
        self.rewritten.insert(part.to_string(), xml.into_bytes());
        Ok(())
    }

    /// Headers and footers keep the relationships of their images in their
    /// own rels part, created when the skeleton has none.
    fn render_side_part(
        &mut self,
        sources: &mut Sources,
        part: &str,
        meta: &mut DocumentMeta<'_>,
    ) -> Result<(), DocxTemplateError> {
        let rels_part = relationships_part(part);
        let existing = sources.contains(&rels_part);
        let mut rels = if existing {
            Relationships::parse(&rels_part, &sources.text(&rels_part)?)?
        } else {
            Relationships::default()
        };
        meta.reserve_relationship_ids(&rels);

        let mut added: Vec<Relationship> = Vec::new();
        self.render_text_part(sources, part, meta, &mut added)?;
        if added.is_empty() {
            return Ok(());
        }

        for relationship in added {
            rels.push(relationship);
        }
        let xml = rels.to_xml(&rels_part)?.into_bytes();
        if existing {
            self.rewritten.insert(rels_part, xml);
        } else {
            self.appended.push((rels_part, xml));
        }
        Ok(())
    }
}

fn assemble(source: &[u8], config: &TemplateConfig, data: &Value) -> Result<Vec<u8>, DocxTemplateError> {
    let mut sources = Sources::open(source, &config.pre_processors)?;
    for required in [PART_CONTENT_TYPES, PART_DOCUMENT, PART_DOCUMENT_RELS] {
        if !sources.contains(required) {
            return Err(DocxTemplateError::missing(required));
        }
    }

    let mut assembly = Assembly {
        data,
        document_engine: TemplateEngine::for_document(&config.helpers),
        // Pre-processed parts are written even when nothing else touches them.
        rewritten: sources
            .processed
            .iter()
            .map(|(part, text)| (part.clone(), text.clone().into_bytes()))
            .collect(),
        appended: Vec::new(),
    };

    let document_rels_xml = sources.text(PART_DOCUMENT_RELS)?;
    let mut meta = DocumentMeta::learn(
        &sources.text(PART_DOCUMENT)?,
        &document_rels_xml,
        sources.package.names().iter().map(String::as_str),
        &config.media,
    )?;
    let bindings = ChartBindings::learn(&mut sources.package)?;

    // Embedded workbooks
    let workbook_engine = TemplateEngine::for_workbook(&config.helpers);
    let mut series: HashMap<String, Vec<ChartValue>> = HashMap::new();
    for part in numbered_parts(&sources.package, 0, embedded_workbook_part) {
        let synced = sync_workbook(&part, sources.bytes(&part)?, &workbook_engine, data)?;
        assembly.rewritten.insert(part.clone(), synced.bytes);
        series.insert(part, synced.series);
    }

    // Headers, footers and the document
    let side_parts = numbered_parts(&sources.package, 1, header_part)
        .into_iter()
        .chain(numbered_parts(&sources.package, 1, footer_part));
    for part in side_parts {
        assembly.render_side_part(&mut sources, &part, &mut meta)?;
    }

    let mut document_relationships: Vec<Relationship> = Vec::new();
    assembly.render_text_part(&mut sources, PART_DOCUMENT, &mut meta, &mut document_relationships)?;

    // Charts
    for (i, part) in numbered_parts(&sources.package, 1, chart_part)
        .into_iter()
        .enumerate()
    {
        let chart = format!("chart{}", i + 1);
        let mut xml = assembly
            .document_engine
            .render(&part, &sources.text(&part)?, data)?;
        match bindings.workbook_of(&chart).map(|w| (w, series.get(w))) {
            Some((_, Some(values))) => xml = patch_chart_cache(&part, &xml, values),
            Some((workbook, None)) => {
                log::warn!("'{}' is bound to '{}', which was not synchronized", part, workbook)
            }
            None => log::debug!("'{}' is not bound to a workbook", part),
        }
        assembly.rewritten.insert(part, xml.into_bytes());
    }

    // Content types for the registered media
    let mut content_types = ContentTypes::parse(PART_CONTENT_TYPES, &sources.text(PART_CONTENT_TYPES)?)?;
    let mut content_types_changed = false;
    for asset in config.media.values() {
        match (asset.kind(), asset.extension()) {
            (Some(kind), Some(extension)) => {
                content_types_changed |= content_types.add_default(&extension, kind.content_type());
            }
            _ => log::warn!("Not registering a content type for media '{}'", asset.name),
        }
    }
    if content_types_changed {
        assembly.rewritten.insert(
            PART_CONTENT_TYPES.to_string(),
            content_types.to_xml(PART_CONTENT_TYPES)?.into_bytes(),
        );
    }

    // Document relationships, only when something was added
    if !document_relationships.is_empty() {
        let mut rels = Relationships::parse(PART_DOCUMENT_RELS, &document_rels_xml)?;
        for relationship in document_relationships {
            rels.push(relationship);
        }
        assembly.rewritten.insert(
            PART_DOCUMENT_RELS.to_string(),
            rels.to_xml(PART_DOCUMENT_RELS)?.into_bytes(),
        );
    }

    let placed = meta.placed_media();
    for (media, asset) in placed.iter() {
        assembly.appended.push((media.part_name(), asset.data.clone()));
    }

    let rewritten_count = assembly.rewritten.len();
    let output = sources
        .package
        .rebuild(assembly.rewritten, assembly.appended)?;
    let output = post_process(output, &config.post_processors)?;

    log::info!(
        "Assembled document: {} part(s) rewritten, {} media file(s) added",
        rewritten_count,
        placed.len()
    );

    Ok(output)
}

fn post_process(output: Vec<u8>, post_processors: &ProcessorChains) -> Result<Vec<u8>, DocxTemplateError> {
    if post_processors.is_empty() {
        return Ok(output);
    }

    let mut package = Package::from_bytes(output)?;
    let mut rewritten = HashMap::new();
    for (part, chain) in post_processors {
        if !package.contains(part) {
            log::warn!("No part '{}' to post-process", part);
            continue;
        }
        log::debug!("Post-processing '{}'", part);
        let text = run_chain(part, package.read_text(part)?, chain)?;
        rewritten.insert(part.clone(), text.into_bytes());
    }
    package.rebuild(rewritten, Vec::new())
}
