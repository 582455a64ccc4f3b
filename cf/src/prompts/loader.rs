//! Prompt Loader
//!
//! Loads prompt templates from an override directory or falls back to the
//! embedded defaults, and renders them with Handlebars.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Template file extension in the override directory
const TEMPLATE_EXTENSION: &str = "hbs";

/// Values available to task prompt templates
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    pub title: String,
    pub description: String,
    pub user_tags: Vec<String>,
    /// First URL found in the description
    pub url: Option<String>,
    /// Text extracted from the linked page, when it could be read
    pub website_content: Option<String>,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory
    user_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `user_dir` before the embedded prompts
    pub fn new(user_dir: Option<impl AsRef<Path>>) -> Self {
        let user_dir = user_dir
            .map(|d| d.as_ref().to_path_buf())
            .filter(|d| d.is_dir());
        debug!(?user_dir, "PromptLoader::new: called");
        Self {
            hbs: Self::engine(),
            user_dir,
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        Self {
            hbs: Self::engine(),
            user_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text, never HTML
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks `<user_dir>/<name>.hbs` first, then the embedded fallback.
    pub fn load_template(&self, name: &str) -> Result<String> {
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.{}", name, TEMPLATE_EXTENSION));
            if path.exists() {
                debug!(?path, "load_template: user override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read user prompt {}: {}", path.display(), e));
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "load_template: embedded");
            return Ok(content.to_string());
        }

        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render(&self, template_name: &str, context: &PromptContext) -> Result<String> {
        let template = self.load_template(template_name)?;
        debug!(%template_name, "render: called");

        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> PromptContext {
        PromptContext {
            title: "Pay rent".to_string(),
            description: "See https://bank.example/invoice".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_categorize_without_tags() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader.render("categorize", &context()).unwrap();

        assert!(rendered.contains("Title: Pay rent"));
        assert!(rendered.contains("User Defined Tags: None"));
    }

    #[test]
    fn test_render_joins_tags_and_does_not_escape() {
        let loader = PromptLoader::embedded_only();
        let ctx = PromptContext {
            title: "Q&A <prep>".to_string(),
            user_tags: vec!["money".to_string(), "home".to_string()],
            ..Default::default()
        };
        let rendered = loader.render("categorize", &ctx).unwrap();

        assert!(rendered.contains("Title: Q&A <prep>"));
        assert!(rendered.contains("User Defined Tags: money, home"));
        assert!(rendered.contains("Description: None"));
    }

    #[test]
    fn test_render_suggest_without_content() {
        let loader = PromptLoader::embedded_only();
        let rendered = loader.render("suggest", &context()).unwrap();
        assert!(rendered.contains("No website content available."));
    }

    #[test]
    fn test_render_suggest_with_content() {
        let loader = PromptLoader::embedded_only();
        let ctx = PromptContext {
            url: Some("https://bank.example/invoice".to_string()),
            website_content: Some("Invoice due on the 1st".to_string()),
            ..context()
        };
        let rendered = loader.render("suggest", &ctx).unwrap();

        assert!(rendered.contains("Linked Page: https://bank.example/invoice"));
        assert!(rendered.contains("Website Content: Invoice due on the 1st"));
    }

    #[test]
    fn test_user_override_wins() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("categorize.hbs"), "Custom: {{title}}").unwrap();

        let loader = PromptLoader::new(Some(temp.path()));
        assert_eq!(loader.render("categorize", &context()).unwrap(), "Custom: Pay rent");

        // Names without an override still fall back
        assert!(loader.render("suggest", &context()).is_ok());
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.load_template("nonexistent-template").is_err());
    }
}
