//! Helpers for turning raw documents into indexable chunks.

use crate::vector::ContentKind;
use regex::Regex;
use std::sync::OnceLock;

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\s*(def|class|function|import|from|const|let|var|fn|pub fn|use|struct|impl)\s")
            .expect("code pattern is valid")
    })
}

fn config_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^\s*[\w.-]+\s*[:=]\s*\S").expect("config pattern is valid"))
}

const COMMAND_PREFIXES: &[&str] = &[
    "npm ", "npx ", "yarn ", "pnpm ", "pip ", "pip3 ", "cargo ", "mkdir ", "git ", "cd ",
    "docker ", "make ", "go ", "python ", "$ ",
];

const CONFIG_EXTENSIONS: &[&str] = &[".json", ".yaml", ".yml", ".toml", ".env", ".ini"];

/// Heuristic content classification for text indexed without an explicit kind.
pub fn classify_content(text: &str) -> ContentKind {
    let trimmed = text.trim();
    if trimmed.contains("```") || trimmed.starts_with("//") || code_pattern().is_match(trimmed) {
        return ContentKind::Code;
    }

    let lines: Vec<&str> = trimmed.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let command_lines = lines
        .iter()
        .filter(|l| COMMAND_PREFIXES.iter().any(|p| l.starts_with(p)))
        .count();
    if !lines.is_empty() && command_lines * 2 >= lines.len() {
        return ContentKind::Command;
    }

    let lower = trimmed.to_lowercase();
    let config_lines = config_pattern().find_iter(trimmed).count();
    if CONFIG_EXTENSIONS.iter().any(|ext| lower.contains(ext))
        || (!lines.is_empty() && config_lines * 2 >= lines.len())
    {
        return ContentKind::Config;
    }

    ContentKind::Documentation
}

/// Splits `text` on paragraph boundaries into pieces of at most `max_chars`
/// characters. Paragraphs longer than that are cut on word boundaries with
/// `overlap` characters of trailing context carried into the next piece.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let overlap = overlap.min(max_chars / 2);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let para_len = paragraph.chars().count();
        if para_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(split_long(paragraph, max_chars, overlap));
            continue;
        }

        let joined_len = current.chars().count() + 2 + para_len;
        if !current.is_empty() && joined_len > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_long(paragraph: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = paragraph.split_whitespace().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut end = start;
        let mut len = 0;
        while end < words.len() {
            let add = words[end].chars().count() + usize::from(end > start);
            if len + add > max_chars && end > start {
                break;
            }
            len += add;
            end += 1;
        }
        pieces.push(words[start..end].join(" "));
        if end >= words.len() {
            break;
        }

        // step back far enough to carry `overlap` characters forward
        let mut back = end;
        let mut carried = 0;
        while back > start + 1 && carried < overlap {
            back -= 1;
            carried += words[back].chars().count() + 1;
        }
        start = if back > start { back } else { end };
    }
    pieces
}
