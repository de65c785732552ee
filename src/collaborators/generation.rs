//! Model-backed plan generation and specification writing.

use super::error::CollaboratorError;
use super::prompt::{
    build_plan_prompt, extract_fenced, specification_prompt, PLAN_SYSTEM_PROMPT,
    SPECIFICATION_SYSTEM_PROMPT,
};
use super::traits::{
    GenerationOptions, PlanDocument, PlanGenerator, SpecificationWriter, SynthesisOptions,
    SystemAnalysis,
};
use crate::concepts::ConceptualMapping;
use crate::llm::{ChatMessage, LLMClient, LLMRequest};
use crate::retrieval::RankedChunk;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct LlmPlanGenerator {
    client: Arc<dyn LLMClient>,
}

impl LlmPlanGenerator {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlanGenerator for LlmPlanGenerator {
    async fn generate(
        &self,
        prompt: &str,
        context: &[RankedChunk],
        options: &GenerationOptions,
    ) -> Result<PlanDocument, CollaboratorError> {
        let start = Instant::now();
        let request = LLMRequest::new(vec![
            ChatMessage::system(PLAN_SYSTEM_PROMPT),
            ChatMessage::user(build_plan_prompt(prompt, context, options)),
        ])
        .with_temperature(options.temperature)
        .with_max_tokens(options.max_tokens);

        let response = self.client.chat(request).await?;
        let body = extract_fenced(&response.content);
        if body.is_empty() {
            return Err(CollaboratorError::invalid_response(
                self.name(),
                "empty plan document",
            ));
        }

        // Invalid responses are retryable, so reject them here.
        if serde_json::from_str::<serde_json::Value>(body).is_err()
            && serde_yaml::from_str::<serde_yaml::Mapping>(body).is_err()
        {
            return Err(CollaboratorError::invalid_response(
                self.name(),
                "plan is neither JSON nor YAML",
            ));
        }

        info!(
            generator = self.client.name(),
            context_chunks = context.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generated build plan"
        );
        Ok(PlanDocument::new(response.content, self.client.name()))
    }

    fn name(&self) -> &str {
        "llm-plan-generator"
    }
}

pub struct LlmSpecificationWriter {
    client: Arc<dyn LLMClient>,
}

impl LlmSpecificationWriter {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpecificationWriter for LlmSpecificationWriter {
    async fn synthesize(
        &self,
        analysis: &SystemAnalysis,
        mapping: &ConceptualMapping,
        options: &SynthesisOptions,
    ) -> Result<String, CollaboratorError> {
        let request = LLMRequest::new(vec![
            ChatMessage::system(SPECIFICATION_SYSTEM_PROMPT),
            ChatMessage::user(specification_prompt(analysis, mapping, options)),
        ])
        .with_temperature(options.temperature)
        .with_max_tokens(options.max_tokens);

        let response = self.client.chat(request).await?;
        let document = response.content.trim();
        if document.is_empty() {
            return Err(CollaboratorError::invalid_response(
                self.name(),
                "empty specification",
            ));
        }

        debug!(chars = document.len(), "Synthesized specification");
        match &options.title {
            Some(title) if !document.starts_with('#') => Ok(format!("# {}\n\n{}\n", title, document)),
            _ => Ok(format!("{}\n", document)),
        }
    }

    fn name(&self) -> &str {
        "llm-specification-writer"
    }
}
