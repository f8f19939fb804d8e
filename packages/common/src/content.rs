use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Payload tag on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Pdf,
    Document,
    Spreadsheet,
    /// Any other attachment.
    File,
}

impl ContentKind {
    pub const ALL: [ContentKind; 6] = [
        Self::Text,
        Self::Image,
        Self::Pdf,
        Self::Document,
        Self::Spreadsheet,
        Self::File,
    ];

    /// Classify an attachment by MIME type, falling back to the file name for CSV.
    ///
    /// Never returns [`ContentKind::Text`].
    pub fn classify(mime: &str, file_name: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime == "application/pdf" {
            Self::Pdf
        } else if mime.contains("spreadsheet")
            || mime.contains("excel")
            || file_name.to_ascii_lowercase().ends_with(".csv")
        {
            Self::Spreadsheet
        } else if mime.contains("document") || mime.contains("word") {
            Self::Document
        } else {
            Self::File
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::File => "file",
        }
    }

    /// Prompt sent to the vision model when the user supplies none.
    pub fn default_prompt(&self) -> &'static str {
        match self {
            Self::Image => "What's in this image?",
            Self::Pdf => "Analyze this PDF document and summarize its content.",
            Self::Spreadsheet => "Analyze this spreadsheet and summarize the key data insights.",
            Self::Document => "Analyze this document and summarize its content.",
            Self::Text | Self::File => "What's in this file?",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                "content_type must be one of: text, image, pdf, document, spreadsheet, file"
                    .to_string()
            })
    }
}

pub fn is_image_mime(mime: &str) -> bool {
    mime.to_ascii_lowercase().starts_with("image/")
}

/// File extension used for object keys of the given MIME type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    let mime = mime.to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        "text/csv" => "csv",
        "application/msword" => "doc",
        "application/vnd.ms-excel" => "xls",
        m if m.contains("spreadsheetml") => "xlsx",
        m if m.contains("wordprocessingml") => "docx",
        _ => "bin",
    }
}
