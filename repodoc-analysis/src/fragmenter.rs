//! File fragmentation into token-bounded, line-addressed chunks

use repodoc_core::{
    count_lines, ChunkRecord, ErrorContext, FileRecord, RepodocError, RepodocResult,
};
use tracing::debug;

/// Estimated token count: one token per four characters, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Splits file contents into chunks of at most `max_tokens` estimated tokens.
///
/// Files over budget are cut into equal line ranges; the per-chunk token
/// estimate is not rebalanced, so uneven line lengths can still exceed the
/// budget.
#[derive(Debug, Clone, Copy)]
pub struct Fragmenter {
    max_tokens: usize,
}

impl Fragmenter {
    pub fn new(max_tokens: usize) -> RepodocResult<Self> {
        if max_tokens == 0 {
            return Err(repodoc_core::validation_error!(
                "Token budget per chunk must be greater than 0",
                "max_tokens_per_chunk",
                "fragmenter"
            ));
        }
        Ok(Self { max_tokens })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Fragment every file, in order. Chunk ids are `{analysis_id}_{index}`.
    ///
    /// Files with empty content produce no chunks. A record whose line count
    /// disagrees with its content is rejected.
    pub fn fragment<'a, I>(&self, analysis_id: &str, files: I) -> RepodocResult<Vec<ChunkRecord>>
    where
        I: IntoIterator<Item = (&'a FileRecord, &'a str)>,
    {
        let mut chunks = Vec::new();

        for (record, content) in files {
            record.validate()?;
            let lines = count_lines(content);
            if record.line_count != lines {
                return Err(RepodocError::Validation {
                    message: format!(
                        "File record {} reports {} lines but content has {}",
                        record.path, record.line_count, lines
                    ),
                    field: Some("line_count".to_string()),
                    context: ErrorContext::new("fragmenter")
                        .with_operation("fragment")
                        .with_metadata("path", &record.path),
                });
            }

            if content.is_empty() {
                debug!(path = %record.path, "Skipping empty file");
                continue;
            }

            let before = chunks.len();
            self.fragment_file(analysis_id, record, content, &mut chunks);
            debug!(path = %record.path, chunks = chunks.len() - before, "Fragmented file");
        }

        Ok(chunks)
    }

    fn fragment_file(
        &self,
        analysis_id: &str,
        record: &FileRecord,
        content: &str,
        chunks: &mut Vec<ChunkRecord>,
    ) {
        let estimated_tokens = estimate_tokens(content);
        let lines: Vec<&str> = content.split('\n').collect();
        let total_lines = lines.len();

        let push = |chunks: &mut Vec<ChunkRecord>,
                        content: String,
                        start_line: usize,
                        end_line: usize,
                        estimated_tokens: usize,
                        chunk_number: usize,
                        total_chunks: usize| {
            let id = format!("{}_{}", analysis_id, chunks.len());
            chunks.push(ChunkRecord {
                id,
                file_path: record.path.clone(),
                file_name: record.name.clone(),
                extension: record.extension.clone(),
                content,
                start_line,
                end_line,
                estimated_tokens,
                chunk_number,
                total_chunks,
                analyzed: false,
                analysis: None,
            });
        };

        if estimated_tokens <= self.max_tokens {
            push(chunks, content.to_string(), 1, total_lines, estimated_tokens, 1, 1);
            return;
        }

        let num_chunks = estimated_tokens.div_ceil(self.max_tokens);
        let lines_per_chunk = total_lines.div_ceil(num_chunks);
        let total_chunks = total_lines.div_ceil(lines_per_chunk);

        for (index, slice) in lines.chunks(lines_per_chunk).enumerate() {
            let chunk_content = slice.join("\n");
            let start_line = index * lines_per_chunk + 1;
            let tokens = estimate_tokens(&chunk_content);
            push(
                chunks,
                chunk_content,
                start_line,
                start_line + slice.len() - 1,
                tokens,
                index + 1,
                total_chunks,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> FileRecord {
        FileRecord::new(path, content.len() as u64, content).unwrap()
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(Fragmenter::new(0).is_err());
    }

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        // counted in characters, not bytes
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn test_empty_file_produces_no_chunks() {
        let record = file("empty.rs", "");
        let chunks = Fragmenter::new(10)
            .unwrap()
            .fragment("job", [(&record, "")])
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_uneven_split_has_short_last_chunk() {
        // 5 lines of 8 chars + separators = 44 chars = 11 tokens, budget 4 => 3 chunks of 2 lines
        let content = "aaaaaaaa\nbbbbbbbb\ncccccccc\ndddddddd\neeeeeeee";
        let record = file("src/x.rs", content);
        let chunks = Fragmenter::new(4)
            .unwrap()
            .fragment("job", [(&record, content)])
            .unwrap();

        let ranges: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
        assert_eq!(ranges, vec![(1, 2), (3, 4), (5, 5)]);
        assert!(chunks.iter().all(|c| c.total_chunks == 3));
        assert_eq!(chunks[2].content, "eeeeeeee");
        assert_eq!(chunks[2].estimated_tokens, 2);
    }

    #[test]
    fn test_ids_are_unique_across_files() {
        let a = file("a.rs", "fn a() {}");
        let b = file("b.rs", "fn b() {}");
        let chunks = Fragmenter::new(100)
            .unwrap()
            .fragment("job-1", [(&a, "fn a() {}"), (&b, "fn b() {}")])
            .unwrap();
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["job-1_0", "job-1_1"]);
    }

    #[test]
    fn test_inconsistent_record_is_rejected() {
        let record = file("a.rs", "one line");
        let err = Fragmenter::new(100)
            .unwrap()
            .fragment("job", [(&record, "two\nlines")])
            .unwrap_err();
        assert!(matches!(err, RepodocError::Validation { .. }));
    }
}
