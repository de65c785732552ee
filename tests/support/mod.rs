#![allow(dead_code)]

use async_trait::async_trait;
use specforge::build::{BuildEngine, BuildOptions, StructuredPlanParser};
use specforge::collaborators::{
    CollaboratorError, Embedder, HashingEmbedder, LlmPlanGenerator, LlmSpecificationWriter,
    StaticIntrospector, SystemComponent,
};
use specforge::concepts::ConceptualMapper;
use specforge::llm::{MockLLMClient, MockResponse};
use specforge::retrieval::{RetrieverConfig, SemanticRetriever};
use specforge::session::{
    OrchestratorConfig, PipelineServices, Session, SessionOrchestrator, SessionStatus,
};
use specforge::vector::VectorStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// One dimension per keyword; a text lights up the keywords it contains.
pub struct KeywordEmbedder {
    keywords: Vec<&'static str>,
    /// Weight each dimension by occurrence count instead of 0/1.
    counting: bool,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&'static str]) -> Self {
        Self {
            keywords: keywords.to_vec(),
            counting: false,
        }
    }

    pub fn mvc() -> Self {
        Self::new(&["model", "view", "controller", "service", "database", "queue"])
    }

    pub fn counting(mut self) -> Self {
        self.counting = true;
        self
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        let lower = text.to_lowercase();
        Ok(self
            .keywords
            .iter()
            .map(|k| match lower.matches(k).count() {
                0 => 0.0,
                n if self.counting => n as f32,
                _ => 1.0,
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.keywords.len()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Orchestrator over a scripted LLM, a temp workspace root and fixed
/// components for reverse sessions.
pub struct Harness {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub llm: Arc<MockLLMClient>,
    pub temp: TempDir,
}

impl Harness {
    pub fn new(max_sessions: usize) -> Self {
        Self::with_components(max_sessions, Vec::new(), Arc::new(HashingEmbedder::new(64)))
    }

    pub fn with_components(
        max_sessions: usize,
        components: Vec<SystemComponent>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let temp = TempDir::new().unwrap();
        let llm = Arc::new(MockLLMClient::new());
        let store = Arc::new(VectorStore::in_memory(embedder.dimension()).unwrap());

        let services = PipelineServices {
            retriever: Arc::new(SemanticRetriever::new(
                store.clone(),
                embedder.clone(),
                RetrieverConfig::default(),
            )),
            mapper: Arc::new(ConceptualMapper::new(store, embedder)),
            build_engine: Arc::new(BuildEngine::new()),
            plan_generator: Arc::new(LlmPlanGenerator::new(llm.clone())),
            plan_parser: Arc::new(StructuredPlanParser::default()),
            introspector: Arc::new(StaticIntrospector::from_components(components)),
            specification_writer: Arc::new(LlmSpecificationWriter::new(llm.clone())),
        };
        let config = OrchestratorConfig::default()
            .with_max_concurrent_sessions(max_sessions)
            .with_workspace_root(temp.path().join("workspaces"));

        Self {
            orchestrator: Arc::new(SessionOrchestrator::new(services, config)),
            llm,
            temp,
        }
    }

    pub fn respond(&self, content: &str) {
        self.llm.add_response(MockResponse::text(content));
    }

    pub fn respond_after(&self, content: &str, delay: Duration) {
        self.llm
            .add_response(MockResponse::text(content).delayed(delay));
    }

    /// Polls until the session reaches `status` or the deadline passes.
    pub async fn wait_for(&self, session_id: &str, status: SessionStatus) -> Session {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let session = self.orchestrator.get_session(session_id).unwrap();
            if session.status == status {
                return session;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "session stuck in {}",
                session.status
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Build options for tests: no backoff between retries.
pub fn fast_build_options() -> BuildOptions {
    BuildOptions::default()
        .with_backoff(Duration::ZERO)
        .with_default_timeout(Duration::from_secs(10))
}

pub fn readme_plan() -> &'static str {
    r#"```json
{
  "name": "demo",
  "steps": [
    {"id": "src", "type": "CreateDirectory", "path": "src"},
    {"id": "readme", "type": "WriteFile", "path": "README.md", "content": "demo", "depends_on": ["src"]}
  ],
  "validations": [{"rule": {"type": "FileExists", "path": "README.md"}}]
}
```"#
}
