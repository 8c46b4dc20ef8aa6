//! File filtering for repository fetching

use repodoc_core::{extension_of, RepositoryConfig, RepositorySettings};
use std::collections::HashSet;

/// Why a tree entry was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Include,
    /// A directory segment of the path is excluded
    ExcludedDirectory(String),
    /// The file name is on the excluded list
    ExcludedFile,
    /// Unrecognized extension and no conventional extensionless name
    UnsupportedType,
}

/// Inclusion rules applied to every blob of a repository tree.
///
/// Checks run in order: excluded directory segment, excluded file name,
/// then extension/special-name acceptance.
#[derive(Debug, Clone)]
pub struct FileFilter {
    excluded_dirs: HashSet<String>,
    excluded_files: HashSet<String>,
    /// Lowercase, with leading dot
    supported_extensions: HashSet<String>,
    /// Uppercase
    special_files: Vec<String>,
    max_file_size: u64,
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

impl FileFilter {
    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self {
            excluded_dirs: config.excluded_dirs.iter().cloned().collect(),
            excluded_files: config.excluded_files.iter().cloned().collect(),
            supported_extensions: config
                .supported_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            special_files: config.special_files.iter().map(|s| s.to_uppercase()).collect(),
            max_file_size: config.max_file_size_bytes,
        }
    }

    /// Apply per-repository overrides on top of the configured rules
    pub fn with_settings(mut self, settings: &RepositorySettings) -> Self {
        self.excluded_dirs
            .extend(settings.excluded_paths.iter().map(|p| p.trim_matches('/').to_string()));
        if !settings.included_extensions.is_empty() {
            self.supported_extensions = settings
                .included_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect();
        }
        if let Some(max) = settings.max_file_size_bytes {
            self.max_file_size = max;
        }
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn exceeds_size_cap(&self, size: u64) -> bool {
        size > self.max_file_size
    }

    pub fn decide(&self, path: &str) -> FilterDecision {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(file_name) = segments.pop() else {
            return FilterDecision::UnsupportedType;
        };

        if let Some(dir) = segments.iter().find(|s| self.excluded_dirs.contains(**s)) {
            return FilterDecision::ExcludedDirectory(dir.to_string());
        }

        if self.excluded_files.contains(file_name) {
            return FilterDecision::ExcludedFile;
        }

        let recognized = extension_of(file_name)
            .map(|ext| self.supported_extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false);
        if recognized {
            return FilterDecision::Include;
        }

        let upper = file_name.to_uppercase();
        if self.special_files.iter().any(|special| upper.contains(special.as_str())) {
            FilterDecision::Include
        } else {
            FilterDecision::UnsupportedType
        }
    }

    pub fn should_include(&self, path: &str) -> bool {
        self.decide(path) == FilterDecision::Include
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::from_config(&RepositoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_directory_segments() {
        let filter = FileFilter::default();
        assert_eq!(
            filter.decide("node_modules/lodash/index.js"),
            FilterDecision::ExcludedDirectory("node_modules".to_string())
        );
        assert_eq!(
            filter.decide("web/dist/app.js"),
            FilterDecision::ExcludedDirectory("dist".to_string())
        );
        // segment match is exact
        assert!(filter.should_include("distribution/app.js"));
        // only directory segments count
        assert!(filter.should_include("src/build.rs"));
    }

    #[test]
    fn test_excluded_file_names() {
        let filter = FileFilter::default();
        assert_eq!(filter.decide("package-lock.json"), FilterDecision::ExcludedFile);
        assert_eq!(filter.decide("app/.env.local"), FilterDecision::ExcludedFile);
        assert!(filter.should_include("package.json"));
    }

    #[test]
    fn test_extensions_and_special_names() {
        let filter = FileFilter::default();
        assert!(filter.should_include("src/Main.JAVA"));
        assert!(filter.should_include("Dockerfile"));
        assert!(filter.should_include("docker/Dockerfile.dev"));
        assert!(filter.should_include("LICENSE"));
        assert!(filter.should_include("changelog"));
        assert_eq!(filter.decide("logo.png"), FilterDecision::UnsupportedType);
        assert_eq!(filter.decide("Procfile"), FilterDecision::UnsupportedType);
    }

    #[test]
    fn test_repository_settings_override() {
        let settings = RepositorySettings {
            max_file_size_bytes: Some(10),
            excluded_paths: vec!["vendor/".to_string()],
            included_extensions: vec!["toml".to_string()],
        };
        let filter = FileFilter::default().with_settings(&settings);

        assert!(filter.should_include("Cargo.toml"));
        assert!(!filter.should_include("src/main.rs"));
        assert!(!filter.should_include("vendor/lib/Cargo.toml"));
        assert!(filter.exceeds_size_cap(11));
        assert!(!filter.exceeds_size_cap(10));
    }
}
