use thiserror::Error;

/// Boxed error returned by caller-supplied part processors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum DocxTemplateError {
    #[error("Required part '{part}' not found in the package")]
    MissingPart { part: String },

    #[error("Failed to render template in '{part}': {source}")]
    Render {
        part: String,
        #[source]
        source: handlebars::RenderError,
    },

    #[error("Part '{part}' is not valid UTF-8")]
    Encoding { part: String },

    #[error("Part '{part}' is malformed: {message}")]
    Malformed { part: String, message: String },

    #[error("Failed to write XML data for '{part}'")]
    FailedWriteXml { part: String },

    #[error("Surpassed {attempts} attempts to create a unique drawing id")]
    IdSpaceExhausted { attempts: u64 },

    #[error("Unable to read dimensions of media '{name}': {source}")]
    Image {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Processor for '{part}' failed: {message}")]
    Processor { part: String, message: String },

    #[error("Template has not been applied yet")]
    NotApplied,

    #[error(transparent)]
    DocxZip {
        #[from]
        source: zip::result::ZipError,
    },

    #[error(transparent)]
    DocxIo {
        #[from]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl DocxTemplateError {
    pub(crate) fn malformed(part: &str, message: impl Into<String>) -> Self {
        DocxTemplateError::Malformed {
            part: part.into(),
            message: message.into(),
        }
    }

    pub(crate) fn missing(part: &str) -> Self {
        DocxTemplateError::MissingPart { part: part.into() }
    }
}
