//! Export formats for native Google documents.
//!
//! Native documents have no binary content; downloading one exports it to
//! the format below and appends the extension to the local file name.

/// Format a native document is exported to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportTarget {
    pub mime_type: &'static str,
    /// Includes the leading dot
    pub extension: &'static str,
}

const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";

const EXPORT_TABLE: &[(&str, ExportTarget)] = &[
    ("application/vnd.google-apps.document", ExportTarget { mime_type: DOCX, extension: ".docx" }),
    ("application/vnd.google-apps.spreadsheet", ExportTarget { mime_type: XLSX, extension: ".xlsx" }),
    ("application/vnd.google-apps.presentation", ExportTarget { mime_type: PPTX, extension: ".pptx" }),
    ("application/vnd.google-apps.drawing", ExportTarget { mime_type: "image/jpeg", extension: ".jpg" }),
    ("application/vnd.google-apps.site", ExportTarget { mime_type: "text/plain", extension: ".txt" }),
    ("application/vnd.google-apps.mail-layout", ExportTarget { mime_type: "text/plain", extension: ".txt" }),
    ("application/vnd.google-apps.form", ExportTarget { mime_type: "application/zip", extension: ".zip" }),
    (
        "application/vnd.google-apps.script",
        ExportTarget { mime_type: "application/vnd.google-apps.script+json", extension: ".json" },
    ),
    ("application/vnd.google-apps.scenes", ExportTarget { mime_type: "video/mp4", extension: ".mp4" }),
    ("application/vnd.google-apps.jam", ExportTarget { mime_type: "application/pdf", extension: ".pdf" }),
];

/// Export format for `mime_type`, or `None` for binary files.
pub fn export_target(mime_type: &str) -> Option<ExportTarget> {
    EXPORT_TABLE
        .iter()
        .find(|(native, _)| *native == mime_type)
        .map(|(_, target)| *target)
}
