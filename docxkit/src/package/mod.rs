//! Reading parts out of a zip container and writing a new container that
//! carries untouched parts over without recompressing them.

pub mod content_types;
pub mod relationships;

pub use content_types::ContentTypes;
pub use relationships::{Relationship, Relationships};

use crate::errors::DocxTemplateError;
use crate::parse::part_text;
use crate::DocxPayload;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// An opened container. Part names keep their order in the archive.
pub(crate) struct Package {
    archive: DocxPayload,
    names: Vec<String>,
    indices: HashMap<String, usize>,
}

impl Package {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Result<Self, DocxTemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut names: Vec<String> = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            names.push(archive.by_index_raw(i)?.name().to_string());
        }
        let indices = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(Package {
            archive,
            names,
            indices,
        })
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    pub(crate) fn read(&mut self, name: &str) -> Result<Vec<u8>, DocxTemplateError> {
        let index = *self
            .indices
            .get(name)
            .ok_or_else(|| DocxTemplateError::missing(name))?;
        let mut file = self.archive.by_index(index)?;
        let mut contents: Vec<u8> = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(contents)
    }

    pub(crate) fn read_text(&mut self, name: &str) -> Result<String, DocxTemplateError> {
        let bytes = self.read(name)?;
        part_text(name, bytes)
    }

    /// Method a rewritten part should be stored with.
    fn compression(&mut self, name: &str) -> Result<CompressionMethod, DocxTemplateError> {
        let index = match self.indices.get(name) {
            Some(index) => *index,
            None => return Ok(CompressionMethod::Deflated),
        };
        let method = self.archive.by_index_raw(index)?.compression();
        Ok(match method {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        })
    }

    /// Writes a new container. Parts found in `rewritten` get the new contents
    /// and keep their compression method, all other parts are copied as they
    /// are stored. `appended` parts follow at the end.
    pub(crate) fn rebuild(
        &mut self,
        mut rewritten: HashMap<String, Vec<u8>>,
        appended: Vec<(String, Vec<u8>)>,
    ) -> Result<Vec<u8>, DocxTemplateError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for index in 0..self.names.len() {
            let name = self.names[index].clone();
            match rewritten.remove(&name) {
                Some(contents) => {
                    let options =
                        SimpleFileOptions::default().compression_method(self.compression(&name)?);
                    zip.start_file(name.as_str(), options)?;
                    zip.write_all(&contents)?;
                }
                None => {
                    let file = self.archive.by_index_raw(index)?;
                    zip.raw_copy_file(file)?;
                }
            }
        }

        for (name, contents) in appended {
            if self.contains(&name) {
                log::warn!("Part '{}' already exists, not adding it again", name);
                continue;
            }
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&contents)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}
