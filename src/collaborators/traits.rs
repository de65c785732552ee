//! Capabilities the pipeline consumes but does not implement itself.

use super::error::CollaboratorError;
use crate::build::{BuildPlan, PlanParseError};
use crate::concepts::ConceptualMapping;
use crate::retrieval::RankedChunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed-dimension vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError>;

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        context: &[RankedChunk],
        options: &GenerationOptions,
    ) -> Result<PlanDocument, CollaboratorError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait SpecificationWriter: Send + Sync {
    async fn synthesize(
        &self,
        analysis: &SystemAnalysis,
        mapping: &ConceptualMapping,
        options: &SynthesisOptions,
    ) -> Result<String, CollaboratorError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait SystemIntrospector: Send + Sync {
    async fn analyze(&self, target: &str) -> Result<SystemAnalysis, CollaboratorError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, document: &PlanDocument) -> Result<BuildPlan, PlanParseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Json,
    Yaml,
    Markdown,
    Unknown,
}

/// Raw plan as produced by a generator, before parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    pub content: String,
    pub format: DocumentFormat,
    pub generator: String,
}

impl PlanDocument {
    pub fn new(content: impl Into<String>, generator: impl Into<String>) -> Self {
        let content = content.into();
        let format = DocumentFormat::sniff(&content);
        Self {
            content,
            format,
            generator: generator.into(),
        }
    }
}

impl DocumentFormat {
    pub fn sniff(content: &str) -> Self {
        let trimmed = content.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with('#') {
            DocumentFormat::Markdown
        } else if trimmed.starts_with('{') || trimmed.starts_with('[') {
            DocumentFormat::Json
        } else if trimmed.lines().next().is_some_and(|l| l.contains(':')) {
            DocumentFormat::Yaml
        } else {
            DocumentFormat::Unknown
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub project_name: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 4096,
            project_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisOptions {
    pub title: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            title: None,
            temperature: 0.3,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemComponent {
    pub id: String,
    pub name: String,
    pub component_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub technologies: Vec<String>,
}

impl SystemComponent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        component_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            component_type: component_type.into(),
            description: String::new(),
            technologies: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_technologies(mut self, technologies: &[&str]) -> Self {
        self.technologies = technologies.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Text used when embedding the component.
    pub fn signature(&self) -> String {
        let mut text = format!("{} {} {}", self.name, self.component_type, self.description);
        for tech in &self.technologies {
            text.push(' ');
            text.push_str(tech);
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDependency {
    pub from: String,
    pub to: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub component: String,
    pub method: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemAnalysis {
    pub target: String,
    pub components: Vec<SystemComponent>,
    #[serde(default)]
    pub dependencies: Vec<ComponentDependency>,
    #[serde(default)]
    pub api_surface: Vec<ApiEndpoint>,
    #[serde(default)]
    pub technologies: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sniffing() {
        assert_eq!(DocumentFormat::sniff("{\"steps\": []}"), DocumentFormat::Json);
        assert_eq!(DocumentFormat::sniff("name: demo\nsteps: []"), DocumentFormat::Yaml);
        assert_eq!(
            DocumentFormat::sniff("```json\n{}\n```"),
            DocumentFormat::Markdown
        );
        assert_eq!(DocumentFormat::sniff("just words"), DocumentFormat::Unknown);
    }

    #[test]
    fn test_component_signature() {
        let component = SystemComponent::new("c1", "UserController", "controller")
            .with_description("handles users")
            .with_technologies(&["express"]);
        assert_eq!(
            component.signature(),
            "UserController controller handles users express"
        );
    }
}
