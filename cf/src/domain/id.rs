//! Task ID generation and resolution
//!
//! IDs are UUID v7 strings: unique, never reused, and roughly time-ordered.
//! The leading characters encode the creation time and are shared by tasks
//! created close together, so abbreviations are taken from the random tail.

/// Number of characters shown when an ID is abbreviated
const SHORT_ID_LEN: usize = 8;

/// Generate a new task ID
pub fn generate_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Abbreviate an ID for display: its last characters
pub fn short_id(id: &str) -> &str {
    id.get(id.len().saturating_sub(SHORT_ID_LEN)..).unwrap_or(id)
}

/// ID resolution for partial matches
pub struct IdResolver<'a> {
    ids: Vec<&'a str>,
}

impl<'a> IdResolver<'a> {
    pub fn new(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Resolve a partial reference to a full ID
    ///
    /// A reference matches an ID it starts or ends with, so both typed
    /// prefixes and the abbreviations from [`short_id`] resolve.
    ///
    /// Returns:
    /// - Ok(Some(id)) if exactly one match
    /// - Ok(None) if no matches
    /// - Err with candidates if ambiguous
    pub fn resolve(&self, reference: &str) -> Result<Option<String>, Vec<String>> {
        if reference.is_empty() {
            return Ok(None);
        }

        // An exact match always wins over prefix matches
        if let Some(id) = self.ids.iter().find(|id| **id == reference) {
            return Ok(Some(id.to_string()));
        }

        let mut matches: Vec<String> = self
            .ids
            .iter()
            .filter(|id| id.starts_with(reference) || id.ends_with(reference))
            .map(|id| id.to_string())
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(matches),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0192f5a4-aaaa-7bbb-8ccc-ddddeeeeffff"), "eeeeffff");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_short_ids_of_back_to_back_ids_resolve() {
        let ids: Vec<String> = (0..50).map(|_| generate_id()).collect();
        let resolver = IdResolver::new(ids.iter().map(String::as_str));

        for id in &ids {
            assert_eq!(resolver.resolve(short_id(id)).unwrap(), Some(id.clone()));
        }
    }

    #[test]
    fn test_resolve_suffix() {
        let ids = ["0192-aaa-111", "0192-bbb-222"];
        let resolver = IdResolver::new(ids);

        assert_eq!(resolver.resolve("222").unwrap(), Some("0192-bbb-222".to_string()));
        assert_eq!(resolver.resolve("bbb-222").unwrap(), Some("0192-bbb-222".to_string()));
    }

    #[test]
    fn test_resolve_prefix() {
        let ids = ["0192-aaa", "0192-bbb", "0193-ccc"];
        let resolver = IdResolver::new(ids);

        assert_eq!(resolver.resolve("0193").unwrap(), Some("0193-ccc".to_string()));
        assert_eq!(resolver.resolve("0192-b").unwrap(), Some("0192-bbb".to_string()));
        assert_eq!(resolver.resolve("ffff").unwrap(), None);
        assert_eq!(resolver.resolve("").unwrap(), None);

        let candidates = resolver.resolve("0192").unwrap_err();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_resolve_exact_beats_prefix() {
        let ids = ["abc", "abcd"];
        let resolver = IdResolver::new(ids);
        assert_eq!(resolver.resolve("abc").unwrap(), Some("abc".to_string()));
    }
}
