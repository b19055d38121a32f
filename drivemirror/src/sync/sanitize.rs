/// Name used when a remote name has no usable characters left.
pub const FALLBACK_NAME: &str = "untitled";

/// Reduces a remote folder name to characters that are safe in a local
/// directory name: alphanumerics, space, `.`, `_` and `-`. Surrounding
/// whitespace is trimmed after filtering.
pub fn sanitize(raw_name: &str) -> String {
    let filtered: String = raw_name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect();
    filtered.trim().to_string()
}

/// [`sanitize`], falling back to [`FALLBACK_NAME`] for names that would
/// otherwise be empty or resolve to the current or parent directory.
pub fn folder_component(raw_name: &str) -> String {
    let clean = sanitize(raw_name);
    if clean.is_empty() || clean == "." || clean == ".." {
        FALLBACK_NAME.to_string()
    } else {
        clean
    }
}

/// File names keep their characters, except those that would split the
/// name into several path components.
pub fn file_component(raw_name: &str) -> String {
    let clean: String = raw_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    if clean.trim().is_empty() || clean == "." || clean == ".." {
        FALLBACK_NAME.to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_disallowed_characters() {
        assert_eq!(sanitize("A/B:C"), "ABC");
    }

    #[test]
    fn trims_after_filtering() {
        assert_eq!(sanitize("  Trip 2024!  "), "Trip 2024");
        assert_eq!(sanitize("! Trip"), "Trip");
    }

    #[test]
    fn keeps_unicode_letters_and_allowed_punctuation() {
        assert_eq!(sanitize("Férias_2023-v1.final"), "Férias_2023-v1.final");
    }

    #[test]
    fn empty_sanitized_folder_name_uses_fallback() {
        assert_eq!(sanitize("???"), "");
        assert_eq!(folder_component("???"), FALLBACK_NAME);
        assert_eq!(folder_component(".."), FALLBACK_NAME);
        assert_eq!(folder_component("Docs"), "Docs");
    }

    #[test]
    fn file_component_only_replaces_separators() {
        assert_eq!(file_component("a/b\\c: d?.txt"), "a_b_c: d?.txt");
        assert_eq!(file_component(".."), FALLBACK_NAME);
        assert_eq!(file_component("  "), FALLBACK_NAME);
    }
}
