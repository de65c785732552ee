//! Timeout and bounded retry around collaborator calls.
//!
//! This policy is independent of build-step retries: a generation call that
//! is retried here counts as a single phase attempt for the session.

use super::error::CollaboratorError;
use super::traits::{
    GenerationOptions, PlanDocument, PlanGenerator, SpecificationWriter, SynthesisOptions,
    SystemAnalysis, SystemIntrospector,
};
use crate::concepts::ConceptualMapping;
use crate::retrieval::RankedChunk;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Budget for a single attempt.
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

pub async fn call_with_retry<T, F, Fut>(
    collaborator: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let error = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => CollaboratorError::Timeout {
                collaborator: collaborator.to_string(),
                elapsed: policy.timeout,
            },
        };

        if !error.is_retryable() || attempt > policy.max_retries {
            return Err(error);
        }

        warn!(
            collaborator,
            attempt,
            max_retries = policy.max_retries,
            error = %error,
            "Collaborator call failed, retrying"
        );
        tokio::time::sleep(policy.backoff).await;
    }
}

/// Wraps a collaborator with [`call_with_retry`].
pub struct Resilient<T: ?Sized> {
    inner: Arc<T>,
    policy: RetryPolicy,
}

impl<T: ?Sized> Resilient<T> {
    pub fn new(inner: Arc<T>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<T: PlanGenerator + ?Sized> PlanGenerator for Resilient<T> {
    async fn generate(
        &self,
        prompt: &str,
        context: &[RankedChunk],
        options: &GenerationOptions,
    ) -> Result<PlanDocument, CollaboratorError> {
        call_with_retry(self.inner.name(), &self.policy, || {
            self.inner.generate(prompt, context, options)
        })
        .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[async_trait]
impl<T: SpecificationWriter + ?Sized> SpecificationWriter for Resilient<T> {
    async fn synthesize(
        &self,
        analysis: &SystemAnalysis,
        mapping: &ConceptualMapping,
        options: &SynthesisOptions,
    ) -> Result<String, CollaboratorError> {
        call_with_retry(self.inner.name(), &self.policy, || {
            self.inner.synthesize(analysis, mapping, options)
        })
        .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[async_trait]
impl<T: SystemIntrospector + ?Sized> SystemIntrospector for Resilient<T> {
    async fn analyze(&self, target: &str) -> Result<SystemAnalysis, CollaboratorError> {
        call_with_retry(self.inner.name(), &self.policy, || self.inner.analyze(target)).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
