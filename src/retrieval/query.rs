//! Lightweight query analysis: complexity, intent, domains and keywords.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    CodeGeneration,
    Configuration,
    Documentation,
    Debugging,
    Architecture,
    Deployment,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// In [0, 1].
    pub complexity: f32,
    pub intent: QueryIntent,
    pub domains: Vec<String>,
    pub keywords: Vec<String>,
}

const INTENT_KEYWORDS: &[(QueryIntent, &[&str])] = &[
    (
        QueryIntent::CodeGeneration,
        &["implement", "create", "build", "generate", "write", "code", "function", "class", "app", "application"],
    ),
    (
        QueryIntent::Configuration,
        &["configure", "config", "configuration", "setup", "settings", "environment", "env"],
    ),
    (
        QueryIntent::Documentation,
        &["document", "documentation", "explain", "describe", "readme", "docs", "guide"],
    ),
    (
        QueryIntent::Debugging,
        &["debug", "fix", "error", "bug", "issue", "crash", "failing", "broken"],
    ),
    (
        QueryIntent::Architecture,
        &["architecture", "design", "pattern", "structure", "microservice", "microservices", "component", "layer", "layered"],
    ),
    (
        QueryIntent::Deployment,
        &["deploy", "deployment", "docker", "kubernetes", "release", "container", "helm"],
    ),
];

const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("frontend", &["react", "vue", "angular", "frontend", "ui", "css", "html", "svelte"]),
    ("backend", &["api", "server", "backend", "rest", "graphql", "express", "django", "flask", "axum", "endpoint"]),
    ("database", &["database", "sql", "postgres", "postgresql", "mysql", "mongodb", "redis", "schema", "sqlite"]),
    ("devops", &["docker", "kubernetes", "ci", "cd", "deploy", "terraform", "helm", "pipeline"]),
    ("security", &["auth", "authentication", "oauth", "jwt", "security", "encryption", "tls"]),
    ("testing", &["test", "tests", "testing", "unit", "integration", "e2e", "jest", "pytest"]),
];

const CONJUNCTIONS: &[&str] = &["and", "or", "but", "with", "then", "also", "plus"];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "are", "was", "will", "should",
    "would", "could", "can", "has", "have", "had", "not", "but", "all", "any", "its", "our",
    "your", "their", "them", "then", "than", "also", "use", "using", "which", "when", "where",
    "what", "how", "who", "make", "need", "needs", "want", "please", "some", "one", "each",
];

const MAX_KEYWORDS: usize = 20;

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

pub fn analyze_query(text: &str) -> QueryAnalysis {
    let tokens = tokens(text);
    let token_set: HashSet<&str> = tokens.iter().map(String::as_str).collect();

    let technical_terms = DOMAIN_KEYWORDS
        .iter()
        .flat_map(|(_, words)| words.iter())
        .filter(|w| token_set.contains(**w))
        .collect::<HashSet<_>>()
        .len();
    let conjunctions = tokens
        .iter()
        .filter(|t| CONJUNCTIONS.contains(&t.as_str()))
        .count();

    let length_part = (text.chars().count() as f32 / 500.0).min(1.0);
    let tech_part = (technical_terms as f32 / 5.0).min(1.0);
    let conj_part = (conjunctions as f32 / 3.0).min(1.0);
    let complexity = (0.4 * length_part + 0.4 * tech_part + 0.2 * conj_part).clamp(0.0, 1.0);

    QueryAnalysis {
        complexity,
        intent: classify_intent(&tokens),
        domains: DOMAIN_KEYWORDS
            .iter()
            .filter(|(_, words)| words.iter().any(|w| token_set.contains(w)))
            .map(|(domain, _)| domain.to_string())
            .collect(),
        keywords: keywords(&tokens),
    }
}

fn classify_intent(tokens: &[String]) -> QueryIntent {
    let mut best = QueryIntent::Mixed;
    let mut best_votes = 0;
    let mut tied = false;

    for (intent, words) in INTENT_KEYWORDS {
        let votes = tokens
            .iter()
            .filter(|t| words.contains(&t.as_str()))
            .count();
        if votes > best_votes {
            best = *intent;
            best_votes = votes;
            tied = false;
        } else if votes > 0 && votes == best_votes {
            tied = true;
        }
    }

    if best_votes == 0 || tied {
        QueryIntent::Mixed
    } else {
        best
    }
}

fn keywords(tokens: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter(|t| t.len() >= 3 && !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| seen.insert(t.as_str()))
        .take(MAX_KEYWORDS)
        .cloned()
        .collect()
}
