/// Extension appended when neither the name nor the MIME type says anything.
pub const DEFAULT_EXTENSION: &str = ".mp4";

/// Returns `name` with an extension appended when it has none.
///
/// Names already containing a `.` are returned unchanged. Otherwise the
/// MIME type picks the extension: `video/*` gives `.mp4`, `image/*` gives
/// `.jpg`, `application/pdf` gives `.pdf`. Any other known type is left
/// without an extension; an empty or unusable type falls back to
/// [`DEFAULT_EXTENSION`].
pub fn infer_extension(name: &str, mime_type: &str) -> String {
    if name.contains('.') {
        return name.to_string();
    }
    match extension_for_mime(mime_type) {
        Some(ext) => format!("{name}{ext}"),
        None => name.to_string(),
    }
}

fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let mime = mime_type.trim().to_ascii_lowercase();
    let Some((kind, subtype)) = mime.split_once('/') else {
        return Some(DEFAULT_EXTENSION);
    };
    let subtype = subtype.split(';').next().unwrap_or_default().trim();
    match (kind, subtype) {
        ("video", _) => Some(".mp4"),
        ("image", _) => Some(".jpg"),
        ("application", "pdf") => Some(".pdf"),
        ("application", "octet-stream") => Some(DEFAULT_EXTENSION),
        _ => None,
    }
}
