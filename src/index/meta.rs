//! `meta.yaml` files at the root, category and example level

use crate::error::{NbeError, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;

/// Meta file name
pub const META_FILE: &str = "meta.yaml";

/// Root level meta
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RootMeta {
    /// Category order
    pub categories: Vec<String>,
}

/// Category level meta
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CategoryMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Example order
    pub examples: Vec<String>,
}

/// Example level meta
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExampleMeta {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Read the meta file in `dir`, or the default when there is none
pub fn read_meta<T: DeserializeOwned + Default>(dir: &Path) -> Result<T> {
    let path = dir.join(META_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_yaml::from_str(&content)
        .map_err(|e| NbeError::Yaml(format!("{}: {}", path.display(), e)))
}

/// Default title: every word of the directory name capitalized
pub fn default_title(name: &str) -> String {
    name.split_inclusive(|c: char| !c.is_alphanumeric())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_title() {
        assert_eq!(default_title("pub-sub"), "Pub-Sub");
        assert_eq!(default_title("messaging"), "Messaging");
        assert_eq!(default_title("key value"), "Key Value");
    }

    #[test]
    fn test_missing_meta_is_default() {
        let temp = tempdir().unwrap();
        let meta: CategoryMeta = read_meta(temp.path()).unwrap();
        assert!(meta.title.is_none());
        assert!(meta.examples.is_empty());
    }

    #[test]
    fn test_read_category_meta() {
        let temp = tempdir().unwrap();
        std::fs::write(
            temp.path().join(META_FILE),
            "title: Messaging\ndescription: Core NATS\nexamples:\n  - pub-sub\n  - request-reply\n",
        )
        .unwrap();

        let meta: CategoryMeta = read_meta(temp.path()).unwrap();
        assert_eq!(meta.title.as_deref(), Some("Messaging"));
        assert_eq!(meta.examples, vec!["pub-sub", "request-reply"]);
    }

    #[test]
    fn test_invalid_meta() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(META_FILE), "categories: {").unwrap();

        let result: Result<RootMeta> = read_meta(temp.path());
        assert!(matches!(result, Err(NbeError::Yaml(_))));
    }
}
