//! Prompt rendering and response extraction for model-backed collaborators.

use super::traits::{GenerationOptions, SynthesisOptions, SystemAnalysis};
use crate::concepts::ConceptualMapping;
use crate::retrieval::RankedChunk;
use std::fmt::Write;

const MAX_CHUNK_CHARS: usize = 1200;

pub const PLAN_SYSTEM_PROMPT: &str = "You are a build automation engineer. You turn a project \
request into an executable build plan made of ordered, dependency-annotated steps. Each file \
step carries the complete file content. Respond with a single JSON document and nothing else.";

pub const SPECIFICATION_SYSTEM_PROMPT: &str = "You are a software architect writing a system \
specification from an automated analysis. Describe purpose, components, their responsibilities, \
the architectural patterns in use and how components depend on each other. Respond in Markdown.";

pub fn build_plan_prompt(request: &str, context: &[RankedChunk], options: &GenerationOptions) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Create a build plan for the following request.\n");
    if let Some(name) = &options.project_name {
        let _ = writeln!(prompt, "Project name: {}\n", name);
    }
    let _ = writeln!(prompt, "REQUEST:\n{}\n", request.trim());

    if context.is_empty() {
        let _ = writeln!(prompt, "REFERENCE MATERIAL:\nNone\n");
    } else {
        let _ = writeln!(prompt, "REFERENCE MATERIAL:");
        for (i, ranked) in context.iter().enumerate() {
            let chunk = &ranked.chunk;
            let _ = writeln!(
                prompt,
                "[{}] {} from {} (score {:.2})\n{}\n",
                i + 1,
                chunk.kind.as_str(),
                chunk.metadata.source.as_deref().unwrap_or(ranked.index.as_str()),
                ranked.score,
                truncate(&chunk.content, MAX_CHUNK_CHARS)
            );
        }
    }

    prompt.push_str(
        r#"Respond with JSON:
{
  "name": "project name",
  "description": "one sentence",
  "steps": [
    {
      "id": "unique-step-id",
      "type": "CreateDirectory" | "WriteFile" | "InstallDependency" | "RunCommand" | "CopyFile" | "ModifyFile" | "ValidateStep",
      "description": "what the step does",
      "depends_on": ["ids of earlier steps"],
      "critical": true,
      "retries": 0,
      "path": "relative/path (file and directory steps)",
      "content": "full file content (WriteFile)",
      "command": "shell command (RunCommand)",
      "package": "package name (InstallDependency)",
      "manager": "npm | pip | cargo (InstallDependency)"
    }
  ],
  "validations": [
    { "rule": { "type": "FileExists", "path": "relative/path" }, "critical": true }
  ]
}

Rules:
- Paths are relative to the project root and never contain '..'
- A step may only depend on steps listed before it
- Commands must be non-interactive
"#,
    );
    prompt
}

pub fn specification_prompt(
    analysis: &SystemAnalysis,
    mapping: &ConceptualMapping,
    options: &SynthesisOptions,
) -> String {
    let mut prompt = String::new();
    let title = options.title.as_deref().unwrap_or(&analysis.target);
    let _ = writeln!(prompt, "Write a specification titled \"{}\".\n", title);

    let _ = writeln!(prompt, "COMPONENTS:");
    for component in &analysis.components {
        let concept = mapping
            .mapped_components
            .iter()
            .find(|m| m.component_id == component.id)
            .map(|m| format!("{} ({:.2})", m.concept, m.confidence))
            .unwrap_or_else(|| "unclassified".to_string());
        let _ = writeln!(
            prompt,
            "- {} [{}] concept: {} technologies: {}",
            component.name,
            component.component_type,
            concept,
            if component.technologies.is_empty() {
                "-".to_string()
            } else {
                component.technologies.join(", ")
            }
        );
    }

    if !analysis.dependencies.is_empty() {
        let _ = writeln!(prompt, "\nDEPENDENCIES:");
        for dep in &analysis.dependencies {
            let _ = writeln!(prompt, "- {} -> {} ({})", dep.from, dep.to, dep.kind);
        }
    }

    if !analysis.api_surface.is_empty() {
        let _ = writeln!(prompt, "\nAPI SURFACE:");
        for endpoint in &analysis.api_surface {
            let _ = writeln!(
                prompt,
                "- {} {} ({})",
                endpoint.method, endpoint.path, endpoint.component
            );
        }
    }

    let _ = writeln!(prompt, "\nARCHITECTURAL PATTERNS:");
    if mapping.patterns.is_empty() {
        let _ = writeln!(prompt, "- none recognized");
    }
    for pattern in &mapping.patterns {
        let _ = writeln!(
            prompt,
            "- {} (confidence {:.2}, components: {})",
            pattern.name,
            pattern.confidence,
            pattern.components.join(", ")
        );
    }

    if !mapping.hierarchy.roots.is_empty() {
        let _ = writeln!(
            prompt,
            "\nTOP-LEVEL CONCEPTS: {}",
            mapping.hierarchy.roots.join(", ")
        );
    }
    prompt
}

/// Strips a surrounding markdown code fence, if any.
pub fn extract_fenced(content: &str) -> &str {
    let trimmed = content.trim();

    for fence in ["```json", "```yaml", "```yml", "```"] {
        if let Some(start_idx) = trimmed.find(fence) {
            let after_fence = &trimmed[start_idx + fence.len()..];
            if let Some(end_idx) = after_fence.find("```") {
                return after_fence[..end_idx].trim();
            }
        }
    }

    trimmed
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}
