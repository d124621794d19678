//! Tool dispatcher
//!
//! A static registry of external-lookup backends with keyword-driven
//! suggestion and failure-isolated execution. Backends are a closed set of
//! tagged variants behind one invoke interface; all dispatch goes through
//! the registry, never through scattered string matching.
//!
//! Invocation never propagates an error: unknown names, backend failures,
//! and timeouts all come back as a structured [`ToolInvocationResult`] with
//! `success = false`, so one bad tool cannot abort its siblings or the turn.

pub mod permission_calc;
pub mod status_check;
pub mod web_lookup;
pub mod webhook_probe;

pub use permission_calc::PermissionCalcTool;
pub use status_check::StatusCheckTool;
pub use web_lookup::WebLookupTool;
pub use webhook_probe::WebhookProbeTool;

use crate::config::ToolsConfig;
use crate::types::now_unix;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Result type for tool backend operations
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors a tool backend can raise. Converted to structured results at the
/// registry boundary; callers of the registry never see these.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("timed out")]
    Timeout,
}

/// Confidence for a high-signal keyword match
const CONFIDENCE_HIGH: f64 = 0.9;

/// Confidence for a medium-signal keyword match
const CONFIDENCE_MEDIUM: f64 = 0.7;

/// Confidence for any other trigger match
const CONFIDENCE_DEFAULT: f64 = 0.5;

/// Static registry entry: a tool's name and its trigger keywords.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    high_signal: &'static [&'static str],
    medium_signal: &'static [&'static str],
    low_signal: &'static [&'static str],
}

impl ToolDescriptor {
    /// Confidence for a lowercased query, or `None` when no keyword matches.
    /// The strongest matching tier wins.
    fn confidence_for(&self, query: &str) -> Option<f64> {
        if self.high_signal.iter().any(|kw| query.contains(kw)) {
            Some(CONFIDENCE_HIGH)
        } else if self.medium_signal.iter().any(|kw| query.contains(kw)) {
            Some(CONFIDENCE_MEDIUM)
        } else if self.low_signal.iter().any(|kw| query.contains(kw)) {
            Some(CONFIDENCE_DEFAULT)
        } else {
            None
        }
    }
}

/// A tool the dispatcher believes can help with a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSuggestion {
    pub tool: String,
    pub confidence: f64,
}

/// One queued invocation for `invoke_batch`.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool: String,
    pub params: serde_json::Value,
}

/// Outcome of one tool invocation, success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocationResult {
    pub tool: String,
    pub success: bool,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
}

impl ToolInvocationResult {
    fn ok(tool: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            success: true,
            payload,
            error: None,
            timestamp: now_unix(),
        }
    }

    fn failed(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            payload: serde_json::Value::Null,
            error: Some(error.into()),
            timestamp: now_unix(),
        }
    }
}

/// The closed set of tool backends.
enum ToolBackend {
    WebLookup(WebLookupTool),
    WebhookProbe(WebhookProbeTool),
    StatusCheck(StatusCheckTool),
    PermissionCalc(PermissionCalcTool),
}

impl ToolBackend {
    async fn invoke(&self, params: &serde_json::Value) -> Result<serde_json::Value> {
        match self {
            ToolBackend::WebLookup(tool) => tool.invoke(params).await,
            ToolBackend::WebhookProbe(tool) => tool.invoke(params).await,
            ToolBackend::StatusCheck(tool) => tool.invoke(params).await,
            ToolBackend::PermissionCalc(tool) => tool.invoke(params),
        }
    }
}

struct ToolEntry {
    descriptor: ToolDescriptor,
    backend: ToolBackend,
}

/// Registry of available tools, built once at startup.
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
    timeout: Duration,
}

impl ToolRegistry {
    /// Build the registry with the full default tool suite.
    pub fn with_defaults(client: reqwest::Client, config: &ToolsConfig) -> anyhow::Result<Self> {
        let entries = vec![
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "web_lookup",
                    description: "Generic web lookup for questions outside the knowledge base",
                    high_signal: &["latest", "update", "news"],
                    medium_signal: &["new", "recent", "current", "today"],
                    low_signal: &["search", "look up", "happening"],
                },
                backend: ToolBackend::WebLookup(WebLookupTool::new(
                    client.clone(),
                    config.web_lookup_base_url.clone(),
                )),
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "webhook_probe",
                    description: "Validate a webhook URL and optionally deliver a test payload",
                    high_signal: &["webhook"],
                    medium_signal: &["callback url"],
                    low_signal: &["endpoint test"],
                },
                backend: ToolBackend::WebhookProbe(WebhookProbeTool::new(client.clone())?),
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "status_check",
                    description: "Check platform component health and active incidents",
                    high_signal: &["status", "down", "outage"],
                    medium_signal: &["degraded", "service issues"],
                    low_signal: &["problems", "broken"],
                },
                backend: ToolBackend::StatusCheck(StatusCheckTool::new(
                    client,
                    config.status_base_url.clone(),
                )),
            },
            ToolEntry {
                descriptor: ToolDescriptor {
                    name: "permission_calc",
                    description: "Fold permission names into a bitfield or decode one",
                    high_signal: &["permission", "bitfield"],
                    medium_signal: &["role", "admin", "moderator"],
                    low_signal: &["access level"],
                },
                backend: ToolBackend::PermissionCalc(PermissionCalcTool::new()),
            },
        ];

        Ok(Self {
            entries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Names of all registered tools, in registration order.
    pub fn known_tools(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.descriptor.name).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.descriptor.name == name)
    }

    /// Suggest tools for a query, strongest confidence first. Ties keep
    /// registration order (the sort is stable), so conflicts resolve
    /// first-registered-wins.
    pub fn suggest(&self, query: &str) -> Vec<ToolSuggestion> {
        let query = query.to_lowercase();

        let mut suggestions: Vec<ToolSuggestion> = self
            .entries
            .iter()
            .filter_map(|entry| {
                entry.descriptor.confidence_for(&query).map(|confidence| {
                    ToolSuggestion {
                        tool: entry.descriptor.name.to_string(),
                        confidence,
                    }
                })
            })
            .collect();

        suggestions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        suggestions
    }

    /// Invoke one tool under the configured timeout.
    ///
    /// Never returns an error: unknown names and backend failures come back
    /// as `success = false` results.
    pub async fn invoke(&self, name: &str, params: &serde_json::Value) -> ToolInvocationResult {
        let Some(entry) = self.entries.iter().find(|e| e.descriptor.name == name) else {
            warn!("Unknown tool requested: {}", name);
            return ToolInvocationResult::failed(
                name,
                format!(
                    "Tool '{}' not found. Known tools: {}",
                    name,
                    self.known_tools().join(", ")
                ),
            );
        };

        debug!("Invoking tool '{}'", name);

        let outcome = tokio::time::timeout(self.timeout, entry.backend.invoke(params)).await;

        match outcome {
            Ok(Ok(payload)) => ToolInvocationResult::ok(name, payload),
            Ok(Err(e)) => {
                warn!("Tool '{}' failed: {}", name, e);
                ToolInvocationResult::failed(name, e.to_string())
            }
            Err(_) => {
                warn!(
                    "Tool '{}' timed out after {}s",
                    name,
                    self.timeout.as_secs()
                );
                ToolInvocationResult::failed(name, ToolError::Timeout.to_string())
            }
        }
    }

    /// Invoke a batch of requests sequentially, preserving input order.
    /// A failure is recorded in place and the batch continues.
    pub async fn invoke_batch(&self, requests: &[ToolRequest]) -> Vec<ToolInvocationResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.invoke(&request.tool, &request.params).await);
        }
        results
    }
}
