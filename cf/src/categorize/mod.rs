//! LLM-backed task categorization
//!
//! Two requests: a bare category for a task, and a category plus tags that
//! also draws on the page linked from the description. Both are advisory.
//! Callers treat any error as "no suggestion" and leave their own state alone.

mod scrape;

pub use scrape::{FetchError, HttpFetcher, PageFetcher, find_first_url, page_text};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::prompts::{PromptContext, PromptLoader};

/// Token budget for a suggestion reply
const SUGGESTION_MAX_TOKENS: u32 = 256;

/// Longest category accepted from a free-text reply
const MAX_CATEGORY_CHARS: usize = 40;

/// Errors from the categorization service
#[derive(Debug, Error)]
pub enum CategorizeError {
    #[error("A title is required before asking for suggestions")]
    MissingTitle,

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("The model returned no usable suggestion")]
    EmptyResponse,
}

/// What the service is told about a task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDetails {
    pub title: String,
    pub description: String,
    pub user_tags: Vec<String>,
}

impl TaskDetails {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            user_tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.user_tags = tags;
        self
    }

    fn prompt_context(&self) -> PromptContext {
        PromptContext {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            user_tags: self.user_tags.clone(),
            url: None,
            website_content: None,
        }
    }
}

/// Suggested category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySuggestion {
    pub category: String,
}

/// Suggested category and tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailsSuggestion {
    pub category: String,
    pub tags: Vec<String>,
}

/// Shape of the model's JSON reply; both key styles are accepted
#[derive(Debug, Deserialize)]
struct RawSuggestion {
    #[serde(default, alias = "suggestedCategory")]
    category: Option<String>,
    #[serde(default, alias = "suggestedTags")]
    tags: Vec<String>,
}

/// Parse a reply leniently
///
/// The first `{...}` span is read as JSON. Without one, the trimmed text
/// itself is taken as the category.
fn parse_reply(text: &str) -> Result<DetailsSuggestion, CategorizeError> {
    let json = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str::<RawSuggestion>(&text[start..=end]).ok(),
        _ => None,
    };

    let (category, tags) = match json {
        Some(raw) => (raw.category.unwrap_or_default(), raw.tags),
        None => {
            debug!("parse_reply: no JSON object, using text as category");
            let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
            (line.trim_matches(|c| c == '"' || c == '\'' || c == '.').to_string(), Vec::new())
        }
    };

    let category: String = category.trim().chars().take(MAX_CATEGORY_CHARS).collect();
    if category.is_empty() {
        return Err(CategorizeError::EmptyResponse);
    }

    let mut cleaned: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').to_string();
        if !tag.is_empty() && !cleaned.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            cleaned.push(tag);
        }
    }

    Ok(DetailsSuggestion { category, tags: cleaned })
}

/// Categorization service
pub struct Categorizer {
    llm: Arc<dyn LlmClient>,
    fetcher: Arc<dyn PageFetcher>,
    prompts: PromptLoader,
}

impl Categorizer {
    pub fn new(llm: Arc<dyn LlmClient>, fetcher: Arc<dyn PageFetcher>, prompts: PromptLoader) -> Self {
        Self { llm, fetcher, prompts }
    }

    /// Ask for the single best category for a task
    pub async fn categorize_task(&self, details: &TaskDetails) -> Result<CategorySuggestion, CategorizeError> {
        debug!(title = %details.title, "categorize_task: called");
        if details.title.trim().is_empty() {
            return Err(CategorizeError::MissingTitle);
        }

        let ctx = details.prompt_context();
        let reply = self.ask("categorize", &ctx).await?;
        let parsed = parse_reply(&reply)?;

        info!(category = %parsed.category, "Category suggested");
        Ok(CategorySuggestion {
            category: parsed.category,
        })
    }

    /// Ask for a category and tags, reading the first linked page if any
    ///
    /// A page that cannot be fetched or read is not an error: the prompt
    /// then states that no website content is available.
    pub async fn suggest_details(&self, details: &TaskDetails) -> Result<DetailsSuggestion, CategorizeError> {
        debug!(title = %details.title, "suggest_details: called");
        if details.title.trim().is_empty() {
            return Err(CategorizeError::MissingTitle);
        }

        let mut ctx = details.prompt_context();
        if let Some(url) = find_first_url(&details.description) {
            match self.fetcher.fetch_text(&url).await {
                Ok(text) => {
                    debug!(%url, text_len = text.len(), "suggest_details: page content read");
                    ctx.website_content = Some(text);
                }
                Err(e) => {
                    warn!(%url, error = %e, "Failed to read linked page, continuing without it");
                }
            }
            ctx.url = Some(url);
        } else {
            debug!("suggest_details: no URL in description");
        }

        let reply = self.ask("suggest", &ctx).await?;
        let suggestion = parse_reply(&reply)?;

        info!(category = %suggestion.category, tags = suggestion.tags.len(), "Details suggested");
        Ok(suggestion)
    }

    async fn ask(&self, template: &str, ctx: &PromptContext) -> Result<String, CategorizeError> {
        let system = self
            .prompts
            .render(&format!("{}-system", template), ctx)
            .map_err(|e| CategorizeError::Prompt(e.to_string()))?;
        let user = self
            .prompts
            .render(template, ctx)
            .map_err(|e| CategorizeError::Prompt(e.to_string()))?;

        let response = self
            .llm
            .complete(CompletionRequest::single(system, user, SUGGESTION_MAX_TOKENS))
            .await?;

        response.content.ok_or(CategorizeError::EmptyResponse)
    }
}

/// Hands out tickets so that only the newest request's result is used
///
/// Issuing a new ticket, or calling [`SuggestionTracker::abandon`], makes
/// every earlier ticket stale.
#[derive(Debug, Clone, Default)]
pub struct SuggestionTracker {
    latest: Arc<AtomicU64>,
}

/// One request's claim on the result slot
#[derive(Debug)]
pub struct Ticket {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl SuggestionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request
    pub fn issue(&self) -> Ticket {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(id, "SuggestionTracker::issue: called");
        Ticket {
            id,
            latest: Arc::clone(&self.latest),
        }
    }

    /// Drop interest in whatever is in flight
    pub fn abandon(&self) {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(id, "SuggestionTracker::abandon: called");
    }
}

impl Ticket {
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.id
    }

    /// Return `value` only if no newer request was started
    pub fn accept<T>(&self, value: T) -> Option<T> {
        if self.is_current() {
            Some(value)
        } else {
            debug!(id = self.id, "Ticket::accept: stale result discarded");
            None
        }
    }
}
