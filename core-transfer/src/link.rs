//! Drive link parsing.

use crate::{Result, TransferError};
use url::Url;

const ID_NOT_FOUND: &str = "Google Drive ID could not be found in the provided link";

/// Stable download link for a file id.
pub fn download_link(id: &str) -> String {
    format!("https://drive.google.com/uc?id={}&export=download", id)
}

/// Browser link for a folder id.
pub fn folder_link(id: &str) -> String {
    format!("https://drive.google.com/drive/folders/{}", id)
}

/// Extract the file or folder id from a Drive link.
///
/// Accepted shapes:
///
/// - `https://drive.google.com/file/d/<id>/view`
/// - `https://drive.google.com/drive/folders/<id>` (also `/drive/u/0/folders/<id>`)
/// - `https://drive.google.com/open?id=<id>`, `/uc?id=<id>`, `/folderview?id=<id>`
/// - `https://docs.google.com/<kind>/d/<id>/edit`
///
/// ```
/// use core_transfer::link::drive_id_from_link;
///
/// let id = drive_id_from_link("https://drive.google.com/file/d/1AbC-d_9/view?usp=sharing").unwrap();
/// assert_eq!(id, "1AbC-d_9");
/// ```
pub fn drive_id_from_link(link: &str) -> Result<String> {
    let url = Url::parse(link.trim()).map_err(|_| invalid())?;

    if let Some(segments) = url.path_segments() {
        let segments: Vec<&str> = segments.filter(|s| !s.is_empty()).collect();
        for window in segments.windows(2) {
            if matches!(window[0], "d" | "folders") && is_drive_id(window[1]) {
                return Ok(window[1].to_string());
            }
        }
    }

    url.query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|id| is_drive_id(id))
        .ok_or_else(invalid)
}

fn is_drive_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn invalid() -> TransferError {
    TransferError::InvalidLink(ID_NOT_FOUND.to_string())
}
