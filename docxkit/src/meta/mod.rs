//! What an assembly run knows about the skeleton before it adds content:
//! identifiers already in use, page geometry and the media it places.

use crate::errors::DocxTemplateError;
use crate::package::relationships::Relationships;
use crate::parse::parse_page_dimensions;
use crate::{PageDimensions, DIR_MEDIA, PART_DOCUMENT};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;

/// Drawing ids must stay below this value.
pub(crate) const DOC_PR_ID_ROOF: u32 = 2_147_483_647;
pub(crate) const EMU_PER_INCH: f64 = 914_400.0;
pub(crate) const TWIPS_PER_INCH: f64 = 1_440.0;
/// At 96 DPI.
pub(crate) const EMU_PER_PIXEL: f64 = 9_525.0;

lazy_static! {
    static ref DOC_PR: Regex = Regex::new(r"<wp:docPr\b([^>]*)>").unwrap();
    static ref ID_ATTR: Regex = Regex::new(r#"(?:^|\s)id="(\d+)""#).unwrap();
    static ref PICTURE_NAME: Regex = Regex::new(r#"(?:^|\s)name="Picture\s+(\d+)""#).unwrap();
    static ref RELATIONSHIP_ID: Regex = Regex::new(r"^rId(\d+)$").unwrap();
    static ref MEDIA_IMAGE: Regex = Regex::new(r"^word/media/image(\d+)\.\w+$").unwrap();
}

/// Image formats that can be placed into the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Png,
    Jpeg,
}

impl MediaKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(MediaKind::Png),
            "jpg" | "jpeg" => Some(MediaKind::Jpeg),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            MediaKind::Png => "image/png",
            MediaKind::Jpeg => "image/jpeg",
        }
    }
}

/// An image registered by the caller under a name templates refer to.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub name: String,
    pub data: Vec<u8>,
}

impl MediaAsset {
    /// Keeps only the base name of `name`.
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);
        MediaAsset {
            name: base.to_string(),
            data,
        }
    }

    /// Lower case extension, as written in the package.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, extension)| extension.to_ascii_lowercase())
    }

    pub fn kind(&self) -> Option<MediaKind> {
        self.extension().and_then(|e| MediaKind::from_extension(&e))
    }
}

pub(crate) type MediaMap = BTreeMap<String, MediaAsset>;

/// A media asset that received a place in the package.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlacedMedia {
    /// `imageN.ext`, relative to `word/media/`.
    pub file_name: String,
    pub width_px: u32,
    pub height_px: u32,
}

impl PlacedMedia {
    pub(crate) fn part_name(&self) -> String {
        format!("{}{}", DIR_MEDIA, self.file_name)
    }

    pub(crate) fn target(&self) -> String {
        format!("media/{}", self.file_name)
    }
}

/// Per-run identifier allocator.
#[derive(Debug)]
pub(crate) struct DocumentMeta<'a> {
    doc_pr_cursor: u32,
    doc_pr_ids: HashSet<u32>,
    greater_relationship_id: u64,
    greater_picture_number: u64,
    greater_image_number: u64,
    page: PageDimensions,
    assets: &'a MediaMap,
    placed: BTreeMap<String, PlacedMedia>,
}

impl<'a> DocumentMeta<'a> {
    /// Scans the skeleton once.
    pub(crate) fn learn<'n, I>(
        document_xml: &str,
        relationships_xml: &str,
        part_names: I,
        assets: &'a MediaMap,
    ) -> Result<Self, DocxTemplateError>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let mut doc_pr_ids: HashSet<u32> = HashSet::new();
        let mut greater_picture_number: u64 = 0;

        for doc_pr in DOC_PR.captures_iter(document_xml) {
            let attributes = &doc_pr[1];
            if let Some(id) = ID_ATTR
                .captures(attributes)
                .and_then(|c| c[1].parse::<u32>().ok())
            {
                doc_pr_ids.insert(id);
            }
            if let Some(number) = PICTURE_NAME
                .captures(attributes)
                .and_then(|c| c[1].parse::<u64>().ok())
            {
                greater_picture_number = greater_picture_number.max(number);
            }
        }

        let relationships = Relationships::parse(crate::PART_DOCUMENT_RELS, relationships_xml)?;
        let greater_relationship_id = greatest_relationship_number(&relationships);

        let greater_image_number = part_names
            .into_iter()
            .filter_map(|name| MEDIA_IMAGE.captures(name))
            .filter_map(|c| c[1].parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let page = parse_page_dimensions(PART_DOCUMENT, document_xml)?;

        Ok(DocumentMeta {
            doc_pr_cursor: 0,
            doc_pr_ids,
            greater_relationship_id,
            greater_picture_number,
            greater_image_number,
            page,
            assets,
            placed: BTreeMap::new(),
        })
    }

    /// A fresh drawing id that collides with no id seen or issued so far.
    pub(crate) fn next_doc_pr_id(&mut self) -> Result<u32, DocxTemplateError> {
        self.next_doc_pr_id_within(u64::from(DOC_PR_ID_ROOF))
    }

    fn next_doc_pr_id_within(&mut self, attempts: u64) -> Result<u32, DocxTemplateError> {
        for _ in 0..attempts {
            self.doc_pr_cursor = self.doc_pr_cursor.wrapping_add(1);
            let candidate = scatter(self.doc_pr_cursor) % DOC_PR_ID_ROOF;
            if candidate != 0 && self.doc_pr_ids.insert(candidate) {
                return Ok(candidate);
            }
        }
        Err(DocxTemplateError::IdSpaceExhausted { attempts })
    }

    pub(crate) fn next_relationship_id(&mut self) -> String {
        self.greater_relationship_id += 1;
        format!("rId{}", self.greater_relationship_id)
    }

    /// Moves the relationship counter past every `rIdN` of another rels part,
    /// so ids issued afterwards are free there too.
    pub(crate) fn reserve_relationship_ids(&mut self, relationships: &Relationships) {
        self.greater_relationship_id = self
            .greater_relationship_id
            .max(greatest_relationship_number(relationships));
    }

    pub(crate) fn next_picture_number(&mut self) -> u64 {
        self.greater_picture_number += 1;
        self.greater_picture_number
    }

    pub(crate) fn next_image_number(&mut self) -> u64 {
        self.greater_image_number += 1;
        self.greater_image_number
    }

    /// Usable page area in EMU.
    pub(crate) fn usable_area_emu(&self) -> (f64, f64) {
        let to_emu = |twips: i32| f64::from(twips.max(0)) / TWIPS_PER_INCH * EMU_PER_INCH;
        (
            to_emu(self.page.usable_width_twips()),
            to_emu(self.page.usable_height_twips()),
        )
    }

    /// Size in EMU of an image of the given pixel size, scaled down
    /// uniformly to fit the usable page area.
    pub(crate) fn fit_image(&self, width_px: u32, height_px: u32) -> (i64, i64) {
        let width = f64::from(width_px) * EMU_PER_PIXEL;
        let height = f64::from(height_px) * EMU_PER_PIXEL;
        let (usable_width, usable_height) = self.usable_area_emu();

        let mut scale: f64 = 1.0;
        if width > 0.0 && usable_width > 0.0 {
            scale = scale.min(usable_width / width);
        }
        if height > 0.0 && usable_height > 0.0 {
            scale = scale.min(usable_height / height);
        }

        ((width * scale).round() as i64, (height * scale).round() as i64)
    }

    /// The package file for media `name`, allocated on first use. `None` for
    /// unknown names and unsupported formats.
    pub(crate) fn media(&mut self, name: &str) -> Result<Option<PlacedMedia>, DocxTemplateError> {
        if let Some(placed) = self.placed.get(name) {
            return Ok(Some(placed.clone()));
        }

        let asset = match self.assets.get(name) {
            Some(asset) => asset,
            None => {
                log::warn!("No media registered under the name '{}'", name);
                return Ok(None);
            }
        };
        let extension = match (asset.kind(), asset.extension()) {
            (Some(_), Some(extension)) => extension,
            _ => {
                log::warn!("Media '{}' has an unsupported format", name);
                return Ok(None);
            }
        };

        let (width_px, height_px) = image::ImageReader::new(Cursor::new(&asset.data))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|source| DocxTemplateError::Image {
                name: name.into(),
                source,
            })?;

        let placed = PlacedMedia {
            file_name: format!("image{}.{}", self.next_image_number(), extension),
            width_px,
            height_px,
        };
        self.placed.insert(name.to_string(), placed.clone());

        Ok(Some(placed))
    }

    /// Media placed so far, with the bytes to store.
    pub(crate) fn placed_media(&self) -> Vec<(&PlacedMedia, &'a MediaAsset)> {
        let assets: &'a MediaMap = self.assets;
        self.placed
            .iter()
            .filter_map(|(name, placed)| assets.get(name).map(|asset| (placed, asset)))
            .collect()
    }
}

fn greatest_relationship_number(relationships: &Relationships) -> u64 {
    relationships
        .iter()
        .filter_map(|r| RELATIONSHIP_ID.captures(&r.id))
        .filter_map(|c| c[1].parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

/// Bijective mix of a 32-bit counter.
fn scatter(counter: u32) -> u32 {
    let mut x = counter.wrapping_mul(0x9E37_79B1);
    x = x.rotate_left(16);
    x ^ 0x85EB_CA6B
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image3.png"/></Relationships>"#;

    fn document(drawings: &str) -> String {
        format!(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"><w:body>{}<w:sectPr><w:pgSz w:w="12240" w:h="15840"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/></w:sectPr></w:body></w:document>"#,
            drawings
        )
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes: Vec<u8> = Vec::new();
        image::RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn learns_existing_identifiers() {
        let assets = MediaMap::new();
        let xml = document(r#"<wp:docPr name="Picture 4" id="12"/><wp:docPr id="3" name="Chart 1"/>"#);
        let mut meta = DocumentMeta::learn(
            &xml,
            RELS,
            vec!["word/document.xml", "word/media/image3.png", "word/media/image10.jpeg"],
            &assets,
        )
        .unwrap();

        assert!(meta.doc_pr_ids.contains(&12));
        assert!(meta.doc_pr_ids.contains(&3));
        assert_eq!(meta.next_relationship_id(), "rId8");
        assert_eq!(meta.next_picture_number(), 5);
        assert_eq!(meta.next_image_number(), 11);
    }

    #[test]
    fn other_rels_parts_push_the_relationship_counter() {
        let assets = MediaMap::new();
        let xml = document("");
        let mut meta = DocumentMeta::learn(&xml, RELS, Vec::new(), &assets).unwrap();
        let header_rels = Relationships::parse(
            "word/_rels/header1.xml.rels",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId12" Type="t" Target="media/image1.png"/></Relationships>"#,
        )
        .unwrap();

        meta.reserve_relationship_ids(&header_rels);
        assert_eq!(meta.next_relationship_id(), "rId13");
        meta.reserve_relationship_ids(&Relationships::default());
        assert_eq!(meta.next_relationship_id(), "rId14");
    }

    #[test]
    fn issued_ids_are_unique_non_zero_and_in_range() {
        let assets = MediaMap::new();
        let xml = document("");
        let mut meta = DocumentMeta::learn(&xml, RELS, Vec::new(), &assets).unwrap();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let id = meta.next_doc_pr_id().unwrap();
            assert!(id != 0 && id < DOC_PR_ID_ROOF);
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn skips_ids_already_in_the_skeleton() {
        let first = scatter(1) % DOC_PR_ID_ROOF;
        let assets = MediaMap::new();
        let xml = document(&format!(r#"<wp:docPr id="{}" name="Picture 1"/>"#, first));
        let mut meta = DocumentMeta::learn(&xml, RELS, Vec::new(), &assets).unwrap();
        let issued = meta.next_doc_pr_id().unwrap();
        assert_ne!(issued, first);
        assert_eq!(issued, scatter(2) % DOC_PR_ID_ROOF);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let assets = MediaMap::new();
        let xml = document("");
        let mut meta = DocumentMeta::learn(&xml, RELS, Vec::new(), &assets).unwrap();
        let taken = scatter(1) % DOC_PR_ID_ROOF;
        meta.doc_pr_ids.insert(taken);
        let err = meta.next_doc_pr_id_within(1).unwrap_err();
        assert!(matches!(err, DocxTemplateError::IdSpaceExhausted { attempts: 1 }));
    }

    #[test]
    fn large_images_are_scaled_to_the_page() {
        let assets = MediaMap::new();
        let xml = document("");
        let meta = DocumentMeta::learn(&xml, RELS, Vec::new(), &assets).unwrap();

        // 6.5in x 9in usable
        assert_eq!(meta.fit_image(96, 48), (914_400, 457_200));
        let (w, h) = meta.fit_image(1248, 624);
        assert_eq!(w, 5_943_600);
        assert_eq!(h, 2_971_800);
    }

    #[test]
    fn media_is_allocated_once_after_existing_images() {
        let mut assets = MediaMap::new();
        let logo = MediaAsset::new("assets/logo.PNG", png(4, 2));
        assets.insert(logo.name.clone(), logo);
        assets.insert("notes.gif".into(), MediaAsset::new("notes.gif", vec![1, 2, 3]));

        let xml = document("");
        let mut meta =
            DocumentMeta::learn(&xml, RELS, vec!["word/media/image3.png"], &assets).unwrap();

        let first = meta.media("logo.PNG").unwrap().unwrap();
        assert_eq!(first.file_name, "image4.png");
        assert_eq!((first.width_px, first.height_px), (4, 2));
        assert_eq!(meta.media("logo.PNG").unwrap().unwrap(), first);
        assert_eq!(first.target(), "media/image4.png");

        assert_eq!(meta.media("notes.gif").unwrap(), None);
        assert_eq!(meta.media("missing.png").unwrap(), None);
        assert_eq!(meta.placed_media().len(), 1);
    }

    #[test]
    fn undecodable_media_is_an_error() {
        let mut assets = MediaMap::new();
        assets.insert("broken.png".into(), MediaAsset::new("broken.png", vec![0, 1, 2]));
        let xml = document("");
        let mut meta = DocumentMeta::learn(&xml, RELS, Vec::new(), &assets).unwrap();
        assert!(matches!(
            meta.media("broken.png"),
            Err(DocxTemplateError::Image { .. })
        ));
    }
}
