//! File extension and language lookup

/// Language reported for extensions missing from the lookup table
pub const UNKNOWN_LANGUAGE: &str = "Unknown";

/// File-type key for files without an extension
pub const NO_EXTENSION: &str = "no-extension";

const LANGUAGES: &[(&str, &str)] = &[
    (".js", "JavaScript"),
    (".ts", "TypeScript"),
    (".jsx", "React JSX"),
    (".tsx", "React TSX"),
    (".py", "Python"),
    (".java", "Java"),
    (".cpp", "C++"),
    (".c", "C"),
    (".cs", "C#"),
    (".php", "PHP"),
    (".rb", "Ruby"),
    (".go", "Go"),
    (".rs", "Rust"),
    (".md", "Markdown"),
    (".json", "JSON"),
    (".yml", "YAML"),
    (".yaml", "YAML"),
    (".xml", "XML"),
    (".html", "HTML"),
    (".css", "CSS"),
    (".scss", "SCSS"),
    (".sql", "SQL"),
    (".sh", "Shell"),
    (".dockerfile", "Docker"),
];

/// Extension of a file name including the leading dot.
///
/// Dotfiles such as `.env` and names ending in a dot have no extension.
pub fn extension_of(file_name: &str) -> Option<String> {
    let name = file_name.rsplit('/').next().unwrap_or(file_name);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(idx) if idx + 1 == name.len() => None,
        Some(idx) => Some(name[idx..].to_string()),
    }
}

/// Language for an extension, matched case-insensitively
pub fn language_for_extension(extension: Option<&str>) -> &'static str {
    let Some(extension) = extension else {
        return UNKNOWN_LANGUAGE;
    };
    let extension = extension.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, language)| *language)
        .unwrap_or(UNKNOWN_LANGUAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("main.rs").as_deref(), Some(".rs"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of("src/app/index.TSX").as_deref(), Some(".TSX"));
        assert_eq!(extension_of(".env"), None);
        assert_eq!(extension_of("Makefile"), None);
        assert_eq!(extension_of("weird."), None);
    }

    #[test]
    fn test_language_lookup() {
        assert_eq!(language_for_extension(Some(".rs")), "Rust");
        assert_eq!(language_for_extension(Some(".YAML")), "YAML");
        assert_eq!(language_for_extension(Some(".jsx")), "React JSX");
        assert_eq!(language_for_extension(Some(".toml")), UNKNOWN_LANGUAGE);
        assert_eq!(language_for_extension(None), UNKNOWN_LANGUAGE);
    }
}
