//! Statistics aggregation
//!
//! Pure computation over the job's file and chunk records.

use repodoc_core::{
    language_for_extension, ChunkRecord, FileRecord, FileTypeStat, LanguageStat, RepodocResult,
    Statistics, NO_EXTENSION,
};
use std::collections::HashMap;

fn percentage_of(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (count as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Compute language and file-type statistics.
///
/// Both lists are sorted by count descending, ties by name ascending.
/// Percentages are relative to the number of files, rounded to two decimals.
pub fn aggregate(files: &[FileRecord], chunks: &[ChunkRecord]) -> RepodocResult<Statistics> {
    for file in files {
        file.validate()?;
    }
    for chunk in chunks {
        chunk.validate()?;
    }

    let total_files = files.len();
    let total_lines = files.iter().map(|f| f.line_count).sum();

    let mut languages: HashMap<&'static str, (usize, usize)> = HashMap::new();
    let mut extensions: HashMap<&str, usize> = HashMap::new();
    for file in files {
        let language = language_for_extension(file.extension.as_deref());
        let entry = languages.entry(language).or_default();
        entry.0 += 1;
        entry.1 += file.line_count;

        *extensions
            .entry(file.extension.as_deref().unwrap_or(NO_EXTENSION))
            .or_default() += 1;
    }

    let mut language_breakdown: Vec<LanguageStat> = languages
        .into_iter()
        .map(|(language, (file_count, line_count))| LanguageStat {
            language: language.to_string(),
            file_count,
            line_count,
            percentage: percentage_of(file_count, total_files),
        })
        .collect();
    language_breakdown.sort_by(|a, b| {
        b.file_count
            .cmp(&a.file_count)
            .then_with(|| a.language.cmp(&b.language))
    });

    let mut file_types: Vec<FileTypeStat> = extensions
        .into_iter()
        .map(|(extension, count)| FileTypeStat {
            extension: extension.to_string(),
            count,
            percentage: percentage_of(count, total_files),
        })
        .collect();
    file_types.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.extension.cmp(&b.extension)));

    let processed_chunks = chunks.iter().filter(|c| c.is_processed()).count();
    let analyzed_chunks = chunks.iter().filter(|c| c.analyzed).count();

    Ok(Statistics {
        total_files,
        total_lines,
        total_chunks: chunks.len(),
        processed_chunks,
        analyzed_chunks,
        failed_chunks: processed_chunks - analyzed_chunks,
        language_breakdown,
        file_types,
    })
}
