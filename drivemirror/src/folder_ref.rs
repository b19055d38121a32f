use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FolderRefError {
    #[error("folder reference is empty")]
    Empty,
    #[error("no folder id found in {0:?}")]
    NoId(String),
}

/// Extracts a folder id from either a bare id or a pasted share link.
///
/// For links the `id` query parameter wins when present; otherwise the
/// last non-empty path segment is taken.
pub fn parse_folder_ref(input: &str) -> Result<String, FolderRefError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FolderRefError::Empty);
    }

    if let Ok(url) = Url::parse(trimmed)
        && url.has_host()
    {
        if let Some(id) = id_param(&url) {
            return Ok(id);
        }
        return url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|segment| !segment.is_empty()))
            .map(str::to_string)
            .ok_or_else(|| FolderRefError::NoId(trimmed.to_string()));
    }

    // Links pasted without a scheme, such as `drive.google.com/open?id=..`.
    if let Ok(url) = Url::parse(&format!("https://{trimmed}"))
        && let Some(id) = id_param(&url)
    {
        return Ok(id);
    }

    let without_query = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    without_query
        .split('/')
        .rfind(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| FolderRefError::NoId(trimmed.to_string()))
}

fn id_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, id)| id.trim().to_string())
        .filter(|id| !id.is_empty())
}
