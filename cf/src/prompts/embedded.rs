//! Embedded fallback prompts
//!
//! These are compiled into the binary and used when no override file is found.

/// System prompt for choosing a single category
pub const CATEGORIZE_SYSTEM: &str = r#"You are an assistant that sorts personal daily tasks into categories.

Pick the single most fitting category for the task you are given. Prefer
short, common labels such as Work, Study, Health, Finance, Personal, Errands,
Household or Social, but use a better label when none of these fit.
Take the user's own tags into account when they are given.

Reply with JSON only, no commentary:
{"category": "<category>"}
"#;

/// Task details for categorization
pub const CATEGORIZE_USER: &str = r#"Title: {{{title}}}
Description: {{#if description}}{{{description}}}{{else}}None{{/if}}
User Defined Tags: {{#if user_tags}}{{#each user_tags}}{{{this}}}{{#unless @last}}, {{/unless}}{{/each}}{{else}}None{{/if}}
"#;

/// System prompt for category and tag suggestions
pub const SUGGEST_SYSTEM: &str = r#"You are an assistant that categorizes personal daily tasks and suggests tags for them.

You are given the task title, its description, any tags the user already
chose, and the text of the web page linked from the description when it
could be read.

1. Decide the most appropriate category for the task.
2. Suggest 2 to 6 short lowercase tags. Keep the user's tags and add ones
   drawn from the description and the page content.

Reply with JSON only, no commentary:
{"category": "<category>", "tags": ["<tag>", "<tag>"]}
"#;

/// Task details and page content for suggestions
pub const SUGGEST_USER: &str = r#"Task Title: {{{title}}}
Task Description: {{#if description}}{{{description}}}{{else}}None{{/if}}
User Defined Tags: {{#if user_tags}}{{#each user_tags}}{{{this}}}{{#unless @last}}, {{/unless}}{{/each}}{{else}}None{{/if}}
{{#if url}}Linked Page: {{{url}}}
{{/if}}Website Content: {{#if website_content}}{{{website_content}}}{{else}}No website content available.{{/if}}
"#;

/// Get an embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    match name {
        "categorize-system" => Some(CATEGORIZE_SYSTEM),
        "categorize" => Some(CATEGORIZE_USER),
        "suggest-system" => Some(SUGGEST_SYSTEM),
        "suggest" => Some(SUGGEST_USER),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_known_names() {
        for name in ["categorize-system", "categorize", "suggest-system", "suggest"] {
            assert!(get_embedded(name).is_some(), "missing {}", name);
        }
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("plan").is_none());
    }

    #[test]
    fn test_system_prompts_ask_for_json() {
        assert!(CATEGORIZE_SYSTEM.contains("\"category\""));
        assert!(SUGGEST_SYSTEM.contains("\"tags\""));
    }
}
