//! Prompt templates for the categorization service

mod embedded;
mod loader;

pub use loader::{PromptContext, PromptLoader};
