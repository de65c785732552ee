//! Output formatting for JSON, YAML and human-readable text

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write;

use crate::build::BuildResult;
use crate::concepts::{ArchitecturalConcept, ConceptualMapping};

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn structured<T: Serialize + ?Sized>(&self, value: &T) -> Result<Option<String>> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)
                .map(Some)
                .context("Failed to serialize to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(value)
                .map(Some)
                .context("Failed to serialize to YAML"),
            OutputFormat::Human => Ok(None),
        }
    }

    pub fn format_build_result(&self, result: &BuildResult) -> Result<String> {
        if let Some(out) = self.structured(result)? {
            return Ok(out);
        }

        let mut out = String::new();
        let status = if result.success { "SUCCESS" } else { "FAILED" };
        writeln!(out, "Build {} {}", result.build_id, status)?;
        writeln!(out, "  Workspace: {}", result.workspace.display())?;
        writeln!(out, "  Executed: {}", join_or_none(&result.executed_steps))?;
        if !result.skipped_steps.is_empty() {
            writeln!(out, "  Skipped: {}", result.skipped_steps.join(", "))?;
        }
        if !result.failed_steps.is_empty() {
            writeln!(out, "  Failed: {}", result.failed_steps.join(", "))?;
        }
        if let Some(failure) = &result.failure {
            writeln!(out, "  Reason: {}", failure)?;
        }
        if result.rollback_performed {
            writeln!(
                out,
                "  Rollback: {} actions undone",
                result.metrics.rollback_actions
            )?;
        }
        if let Some(path) = &result.artifact_path {
            writeln!(out, "  Artifact: {}", path.display())?;
        }
        for warning in &result.warnings {
            writeln!(out, "  Warning: {}", warning)?;
        }
        writeln!(
            out,
            "  Duration: {:.2}s ({} attempts)",
            result.metrics.duration.as_secs_f64(),
            result.metrics.attempts
        )?;
        Ok(out)
    }

    pub fn format_concepts(&self, concepts: &[&ArchitecturalConcept]) -> Result<String> {
        if let Some(out) = self.structured(concepts)? {
            return Ok(out);
        }

        let mut out = String::new();
        let width = concepts.iter().map(|c| c.name.len()).max().unwrap_or(0);
        for concept in concepts {
            writeln!(
                out,
                "{:<width$}  {:<22}  {}",
                concept.name,
                concept.category.as_str(),
                concept.description,
                width = width
            )?;
        }
        writeln!(out, "\n{} concepts", concepts.len())?;
        Ok(out)
    }

    pub fn format_concept(&self, concept: &ArchitecturalConcept) -> Result<String> {
        if let Some(out) = self.structured(concept)? {
            return Ok(out);
        }

        let mut out = String::new();
        writeln!(out, "{} ({})", concept.name, concept.category)?;
        writeln!(out, "  {}", concept.description)?;
        writeln!(out, "  Keywords: {}", concept.keywords.join(", "))?;
        if !concept.relationships.is_empty() {
            writeln!(out, "  Relationships:")?;
            for rel in &concept.relationships {
                writeln!(out, "    {:?} {} ({:.2})", rel.kind, rel.target, rel.strength)?;
            }
        }
        Ok(out)
    }

    pub fn format_mapping(&self, mapping: &ConceptualMapping) -> Result<String> {
        if let Some(out) = self.structured(mapping)? {
            return Ok(out);
        }

        let mut out = String::new();
        writeln!(
            out,
            "Mapped {} components (confidence {:.2})",
            mapping.mapped_components.len(),
            mapping.confidence
        )?;
        for component in &mapping.mapped_components {
            writeln!(
                out,
                "  {} -> {} ({:.2})",
                component.component_name, component.concept, component.confidence
            )?;
        }
        if !mapping.unmapped_components.is_empty() {
            writeln!(out, "Unmapped: {}", mapping.unmapped_components.join(", "))?;
        }
        if mapping.patterns.is_empty() {
            writeln!(out, "Patterns: none")?;
        } else {
            writeln!(out, "Patterns:")?;
            for pattern in &mapping.patterns {
                writeln!(
                    out,
                    "  {} ({:.2}): {}",
                    pattern.name,
                    pattern.confidence,
                    pattern.components.join(", ")
                )?;
            }
        }
        Ok(out)
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
