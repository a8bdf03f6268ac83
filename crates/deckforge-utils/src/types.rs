//! Shared data model for the generation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Normalized input to one remote generation call.
///
/// This is the only thing the cache fingerprint is derived from, so every
/// field that can change the remote output must live here. Extra
/// provider-specific knobs go in `extra_params`; null values there are
/// ignored by the fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub provider_id: String,
    pub model_id: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub json_schema: Option<serde_json::Value>,
    /// Sorted map so iteration order is deterministic.
    pub extra_params: BTreeMap<String, serde_json::Value>,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
        messages: Vec<Message>,
        temperature: f64,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            messages,
            temperature,
            max_tokens: None,
            top_p: None,
            json_schema: None,
            extra_params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    #[must_use]
    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_extra_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra_params.insert(key.into(), value);
        self
    }
}

/// One topic to be processed into a [`CombinedArtifact`] within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub category_index: usize,
    pub category_name: String,
    pub item_index: usize,
    pub topic_text: String,
}

/// A categorized question set; enumeration order defines work item indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionSet {
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub topics: Vec<String>,
}

impl QuestionSet {
    /// Flatten into immutable work items, one per topic.
    #[must_use]
    pub fn work_items(&self) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for (category_index, category) in self.categories.iter().enumerate() {
            for (item_index, topic) in category.topics.iter().enumerate() {
                items.push(WorkItem {
                    category_index,
                    category_name: category.name.clone(),
                    item_index,
                    topic_text: topic.clone(),
                });
            }
        }
        items
    }
}

/// Outcome of one provider call. Failures are represented explicitly;
/// provider errors never cross component boundaries as panics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub success: bool,
    pub raw_text: String,
    pub error_kind: Option<String>,
}

impl ProviderResult {
    #[must_use]
    pub fn success(raw_text: impl Into<String>) -> Self {
        Self {
            success: true,
            raw_text: raw_text.into(),
            error_kind: None,
        }
    }

    #[must_use]
    pub fn failure(error_kind: impl Into<String>) -> Self {
        Self {
            success: false,
            raw_text: String::new(),
            error_kind: Some(error_kind.into()),
        }
    }

    /// A result counts as empty when it failed or produced no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.success || self.raw_text.trim().is_empty()
    }
}

/// One flashcard inside a combined artifact.
///
/// `options`/`correct_answer` are present only for the multiple-choice
/// variant; basic cards omit them entirely in serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub card_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub front: String,
    pub back: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

/// Schema-conformant output of a combine step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedArtifact {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub cards: Vec<Card>,
}

/// Run lifecycle status. Transitions are monotonic: `Running` is initial,
/// `Completed`/`Failed` are terminal and exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Aggregate counters recorded when a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// Provenance record for one end-to-end pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub user_label: Option<String>,
    pub mode: String,
    pub subject: String,
    pub card_type: String,
    pub status: RunStatus,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
