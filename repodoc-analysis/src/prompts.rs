//! Prompts for chunk analysis and overview generation

use repodoc_core::{ChunkRecord, ProjectContext, PromptMessage};

/// System prompt for per-chunk analysis
pub const CHUNK_ANALYSIS_SYSTEM_PROMPT: &str = "You are an expert software architect and code analyst. Provide clear, concise, and technically accurate analysis of code.";

/// System prompt for the project overview
pub const OVERVIEW_SYSTEM_PROMPT: &str = "You are an expert technical writer specializing in software documentation. Create comprehensive, clear, and user-friendly documentation.";

/// User prompt asking for an analysis of one chunk
pub fn create_chunk_analysis_prompt(chunk: &ChunkRecord, context: &ProjectContext) -> String {
    let fence = chunk
        .extension
        .as_deref()
        .map(|ext| ext.trim_start_matches('.'))
        .unwrap_or("");

    format!(
        r#"You are an expert code analyst. Analyze the following code chunk and provide insights about its functionality, purpose, and how it fits within the project context.

Project Context: {context}

Code chunk from file: {path}
Lines {start}-{end}:

```{fence}
{content}
```

Please provide a concise analysis covering:
1. Primary functionality and purpose
2. Key components (functions, classes, variables)
3. Dependencies and imports
4. How it connects to other parts of the project
5. Any notable patterns or architectural decisions

Keep the analysis focused and technical, suitable for documentation generation."#,
        context = context,
        path = chunk.file_path,
        start = chunk.start_line,
        end = chunk.end_line,
        fence = fence,
        content = chunk.content,
    )
}

/// User prompt asking for a narrative overview of the whole project
pub fn create_overview_prompt(context: &ProjectContext, analysis_text: &str) -> String {
    format!(
        r#"Based on the following code analysis, generate a comprehensive project overview for documentation.

Repository: {name}
Description: {description}
Primary Language: {language}

Code Analysis:
{analysis}

Generate a project overview that includes:
1. Project purpose and main functionality
2. Architecture overview
3. Key technologies and dependencies
4. Main components and their relationships
5. Setup and installation requirements
6. Basic usage examples
7. Project structure explanation

Format the response in clear, well-structured markdown suitable for documentation."#,
        name = context.full_name,
        description = context
            .description
            .as_deref()
            .unwrap_or("No description provided"),
        language = context.language.as_deref().unwrap_or("Mixed"),
        analysis = analysis_text,
    )
}

pub fn chunk_analysis_messages(chunk: &ChunkRecord, context: &ProjectContext) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(CHUNK_ANALYSIS_SYSTEM_PROMPT),
        PromptMessage::user(create_chunk_analysis_prompt(chunk, context)),
    ]
}

pub fn overview_messages(context: &ProjectContext, analysis_text: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(OVERVIEW_SYSTEM_PROMPT),
        PromptMessage::user(create_overview_prompt(context, analysis_text)),
    ]
}
