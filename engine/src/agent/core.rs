//! Agent Core
//!
//! This module implements the orchestration of one support query. Each call
//! to [`SupportAgent::ask`] is an independent asynchronous flow:
//!
//! 1. Merge the session's sticky scoping context with the caller's
//! 2. Exact-match cache lookup (hit returns immediately)
//! 3. Classify domain relevance
//! 4. Embed + similarity search, then rank and score results
//! 5. Decide whether the generic lookup tool must be forced
//! 6. Dispatch at most two keyword-suggested tools, sequentially
//! 7. Generate the answer (degrading to source text on failure)
//! 8. Store in cache, then record the turn on a detached task
//!
//! The cache write and the memory append are sequenced strictly after
//! generation, so a cancelled flow records nothing — a turn is either fully
//! recorded or not recorded at all. `ask` never returns an error; every
//! failure degrades into a templated answer.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::QueryCache;
use crate::classifier::Relevance;
use crate::config::{Config, RetrievalConfig};
use crate::error::AgentError;
use crate::memory::{ConversationMemory, ConversationTurn, NewTurn};
use crate::provider::Provider;
use crate::ranking::{self, RankedResult};
use crate::tools::{ToolInvocationResult, ToolRegistry, ToolRequest};
use crate::types::{AgentResponse, AgentStats, Query, SourceRef};
use crate::vector::{RetrievedDocument, VectorStore};

/// Maximum keyword-suggested tools executed per turn
const MAX_SUGGESTED_TOOLS: usize = 2;

/// Recent turns folded into the generation prompt
const HISTORY_CONTEXT_TURNS: i64 = 5;

/// Characters of source text quoted per document in a degraded answer
const DEGRADED_EXCERPT_CHARS: usize = 200;

/// Templated answer when retrieval, fallback, and tools all come up empty
const EMPTY_ANSWER: &str = "I couldn't find relevant information about that topic. \
     Please try rephrasing your question or ask about a different topic.";

/// The query orchestrator.
///
/// Holds no mutable state of its own; everything shared lives behind the
/// cache/memory pool or the external stores, so any number of `ask` flows
/// can run concurrently on one instance.
pub struct SupportAgent {
    classifier: Arc<dyn Relevance>,
    cache: Arc<QueryCache>,
    memory: Arc<ConversationMemory>,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn Provider>,
    vector: Arc<dyn VectorStore>,
    retrieval: RetrievalConfig,
    fallback_tool: String,
    provider_timeout: Duration,
}

impl SupportAgent {
    pub fn new(
        classifier: Arc<dyn Relevance>,
        cache: Arc<QueryCache>,
        memory: Arc<ConversationMemory>,
        tools: Arc<ToolRegistry>,
        provider: Arc<dyn Provider>,
        vector: Arc<dyn VectorStore>,
        config: &Config,
    ) -> Self {
        Self {
            classifier,
            cache,
            memory,
            tools,
            provider,
            vector,
            retrieval: config.retrieval.clone(),
            fallback_tool: config.tools.fallback.clone(),
            provider_timeout: Duration::from_secs(config.provider.timeout_secs),
        }
    }

    /// Answer one query for a session.
    pub async fn ask(
        &self,
        raw_query: &str,
        session_id: &str,
        scoping: BTreeMap<String, String>,
    ) -> AgentResponse {
        // Sticky session context first, caller-supplied entries win
        let mut effective = self.memory.context(session_id).await;
        if !scoping.is_empty() {
            for (key, value) in &scoping {
                effective.insert(key.clone(), value.clone());
            }
            if let Err(e) = self.memory.save_context(session_id, &effective).await {
                warn!("Failed to persist session context: {}", e);
            }
        }

        let query = Query::new(raw_query, effective);

        // Cache before any expensive work
        if let Some(mut hit) = self.cache.get(&query).await {
            info!("Cache hit for session {}", session_id);
            hit.cached = true;
            return hit;
        }

        let classification = self.classifier.classify(&query);
        debug!(
            "Query classified in_domain={} for session {}",
            classification.in_domain, session_id
        );

        let documents = self.retrieve(&query).await;
        let ranked = ranking::rank(documents);
        let top_score = ranked.first().map(|r| r.adjusted_score).unwrap_or(0.0);
        let low_relevance = ranked.is_empty() || top_score < self.retrieval.relevance_threshold;

        // Forced generic lookup: out-of-domain queries and weak retrievals
        // both bypass the keyword suggestions, and a usable lookup result
        // supersedes the knowledge base as the answer source.
        let force_fallback = !classification.in_domain || low_relevance;
        let mut fallback_attempted = false;
        let mut fallback_result: Option<ToolInvocationResult> = None;

        if force_fallback {
            debug!(
                "Forcing {} (in_domain={}, top_score={:.2})",
                self.fallback_tool, classification.in_domain, top_score
            );
            fallback_attempted = true;
            let result = self
                .tools
                .invoke(&self.fallback_tool, &json!({ "query": query.raw.trim() }))
                .await;
            if result.success && lookup_has_results(&result) {
                fallback_result = Some(result);
            } else {
                warn!("Forced lookup yielded nothing usable");
            }
        }
        let fallback_used = fallback_result.is_some();

        // Keyword-suggested tools, skipped entirely once the forced lookup
        // answered. An already-attempted fallback tool is never re-invoked.
        let mut tool_results: Vec<ToolInvocationResult> = Vec::new();
        if !fallback_used {
            let requests: Vec<ToolRequest> = self
                .tools
                .suggest(&query.normalized)
                .into_iter()
                .filter(|s| !(fallback_attempted && s.tool == self.fallback_tool))
                .take(MAX_SUGGESTED_TOOLS)
                .map(|s| ToolRequest {
                    tool: s.tool,
                    params: json!({ "query": query.raw.trim() }),
                })
                .collect();

            if !requests.is_empty() {
                debug!(
                    "Dispatching suggested tools: {}",
                    requests
                        .iter()
                        .map(|r| r.tool.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                tool_results = self.tools.invoke_batch(&requests).await;
            }
        }

        let any_tool_succeeded = tool_results.iter().any(|r| r.success);
        if ranked.is_empty() && !fallback_used && !any_tool_succeeded {
            // Nothing to answer from; templated apology, not recorded
            return AgentResponse {
                answer: EMPTY_ANSWER.to_string(),
                sources: Vec::new(),
                success: false,
                used_fallback: false,
                result_count: 0,
                cached: false,
            };
        }

        let history = self
            .memory
            .history(session_id, Some(HISTORY_CONTEXT_TURNS))
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to load history for prompt context: {}", e);
                Vec::new()
            });

        let prompt = if let Some(ref lookup) = fallback_result {
            build_lookup_prompt(&query, lookup)
        } else {
            let context_blob = ranking::assemble(&ranked, self.retrieval.context_budget);
            build_domain_prompt(&query, &context_blob, &history, &tool_results)
        };

        let answer = match timeout(self.provider_timeout, self.provider.generate(&prompt)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!("Generation failed, degrading to source text: {}", e);
                degraded_answer(&ranked, fallback_result.as_ref())
            }
            Err(_) => {
                warn!(
                    "Generation timed out after {}s, degrading to source text",
                    self.provider_timeout.as_secs()
                );
                degraded_answer(&ranked, fallback_result.as_ref())
            }
        };

        let sources = if let Some(ref lookup) = fallback_result {
            lookup_sources(lookup)
        } else {
            ranked_sources(&ranked)
        };

        let response = AgentResponse {
            answer,
            sources,
            success: true,
            used_fallback: fallback_used,
            result_count: ranked.len(),
            cached: false,
        };

        // Both writes happen only after generation completed: a flow
        // cancelled earlier leaves no partial record behind.
        self.cache.put(&query, &response).await;
        self.record_turn(session_id, &query, &response);

        response
    }

    /// Conversation history for a session, oldest first.
    pub async fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>, AgentError> {
        self.memory.history(session_id, None).await
    }

    /// Forget a session entirely. Returns the number of turns removed.
    pub async fn clear_history(&self, session_id: &str) -> Result<u64, AgentError> {
        self.memory.clear(session_id).await
    }

    /// Aggregate counters for the status surface.
    pub async fn stats(&self) -> AgentStats {
        let documents = self.vector.count().await.unwrap_or_else(|e| {
            warn!("Failed to count knowledge base documents: {}", e);
            0
        });
        let (sessions, turns) = self.memory.counts().await.unwrap_or_else(|e| {
            warn!("Failed to count conversation turns: {}", e);
            (0, 0)
        });

        AgentStats {
            documents,
            sessions,
            turns,
        }
    }

    /// Embed the query and search the knowledge base. Any failure or
    /// timeout degrades to an empty retrieval.
    async fn retrieve(&self, query: &Query) -> Vec<RetrievedDocument> {
        let budget = Duration::from_secs(self.retrieval.timeout_secs);

        let vector = match timeout(budget, self.provider.embed(&query.raw)).await {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                warn!("Embedding failed, retrieval degraded to empty: {}", e);
                return Vec::new();
            }
            Err(_) => {
                warn!("Embedding timed out, retrieval degraded to empty");
                return Vec::new();
            }
        };

        match timeout(budget, self.vector.search(&vector, self.retrieval.top_k)).await {
            Ok(Ok(documents)) => documents,
            Ok(Err(e)) => {
                warn!("Similarity search failed, retrieval degraded to empty: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("Similarity search timed out, retrieval degraded to empty");
                Vec::new()
            }
        }
    }

    /// Record the turn write-behind: dispatched, never awaited by the
    /// response path, with its own error logging.
    fn record_turn(&self, session_id: &str, query: &Query, response: &AgentResponse) {
        let memory = Arc::clone(&self.memory);
        let turn = NewTurn {
            session_id: session_id.to_string(),
            query: query.raw.trim().to_string(),
            answer: response.answer.clone(),
            sources: response.sources.clone(),
            result_count: response.result_count as i64,
            used_fallback: response.used_fallback,
        };

        tokio::spawn(async move {
            if let Err(e) = memory.append(&turn).await {
                warn!("Failed to record conversation turn: {}", e);
            }
        });
    }
}

/// True when a lookup payload actually carries results.
fn lookup_has_results(result: &ToolInvocationResult) -> bool {
    match result.payload.get("total_results").and_then(|v| v.as_u64()) {
        Some(n) => n > 0,
        None => !result.payload.is_null(),
    }
}

/// Source list from a lookup payload's result entries.
fn lookup_sources(result: &ToolInvocationResult) -> Vec<SourceRef> {
    result
        .payload
        .get("results")
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .map(|entry| {
                    SourceRef::new(
                        entry.get("title").and_then(|v| v.as_str()).unwrap_or("Web result"),
                        entry.get("url").and_then(|v| v.as_str()).unwrap_or(""),
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Source list from ranked knowledge-base results.
fn ranked_sources(ranked: &[RankedResult]) -> Vec<SourceRef> {
    ranked
        .iter()
        .map(|r| {
            SourceRef::new(&r.document.metadata.title, &r.document.metadata.locator)
                .with_score(r.adjusted_score)
        })
        .collect()
}

/// Render lookup results as numbered lines for the prompt.
fn format_lookup_results(result: &ToolInvocationResult) -> String {
    let entries = result
        .payload
        .get("results")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut lines = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let title = entry.get("title").and_then(|v| v.as_str()).unwrap_or("");
        let url = entry.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let snippet = entry.get("snippet").and_then(|v| v.as_str()).unwrap_or("");
        lines.push(format!("{}. {} ({})\n   {}", i + 1, title, url, snippet));
    }
    lines.join("\n")
}

/// Prompt for questions answered from the generic lookup.
fn build_lookup_prompt(query: &Query, lookup: &ToolInvocationResult) -> String {
    format!(
        "You are a helpful assistant. The user's question is not about the \
         community platform, so answer it directly from the lookup results \
         below. Do not mention the platform or its documentation.\n\n\
         Question: {}\n\n\
         Lookup results:\n{}\n\n\
         Give a clear, direct answer based only on these results.",
        query.raw.trim(),
        format_lookup_results(lookup)
    )
}

/// Prompt for in-domain questions answered from the knowledge base.
fn build_domain_prompt(
    query: &Query,
    context_blob: &str,
    history: &[ConversationTurn],
    tool_results: &[ToolInvocationResult],
) -> String {
    let mut prompt = String::from(
        "You are a community support agent. Answer the question using the \
         documentation excerpts below. Use the platform's terminology \
         (servers, channels, roles, permissions) and give practical, \
         step-by-step instructions where the excerpts contain them.\n",
    );

    if !query.context.is_empty() {
        let pairs: Vec<String> = query
            .context
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        prompt.push_str(&format!("\nCommunity context: {}\n", pairs.join(", ")));
    }

    if !history.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for turn in history {
            let mut answer_lead: String = turn.answer.chars().take(200).collect();
            if answer_lead.len() < turn.answer.len() {
                answer_lead.push_str("...");
            }
            prompt.push_str(&format!("Q: {}\nA: {}\n", turn.query, answer_lead));
        }
    }

    prompt.push_str(&format!("\nDocumentation:\n{}\n", context_blob));

    for result in tool_results.iter().filter(|r| r.success) {
        prompt.push_str(&format!(
            "\nTool result ({}):\n{}\n",
            result.tool,
            serde_json::to_string_pretty(&result.payload).unwrap_or_default()
        ));
    }

    prompt.push_str(&format!("\nQuestion: {}\nAnswer:", query.raw.trim()));
    prompt
}

/// Deterministic answer used when generation fails: quote the strongest
/// sources directly rather than surfacing a provider error.
fn degraded_answer(ranked: &[RankedResult], lookup: Option<&ToolInvocationResult>) -> String {
    if let Some(lookup) = lookup {
        return format!(
            "I'm having trouble generating a full answer right now. \
             Here is what a web lookup found:\n\n{}",
            format_lookup_results(lookup)
        );
    }

    let excerpts: Vec<String> = ranked
        .iter()
        .take(2)
        .map(|r| {
            let lead: String = r.document.content.chars().take(DEGRADED_EXCERPT_CHARS).collect();
            format!("**{}**: {}...", r.document.metadata.title, lead)
        })
        .collect();

    if excerpts.is_empty() {
        return "I'm having trouble generating an answer right now. \
                Please try again in a moment."
            .to_string();
    }

    format!(
        "I'm having trouble generating a full answer right now, but I found \
         relevant documentation:\n\n{}\n\nPlease try rephrasing your question \
         if this doesn't cover it.",
        excerpts.join("\n\n")
    )
}
