use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

const PALETTE_KEY_PREFIX: &str = "p:";
/// Allows up to three chained palette references (`p:a` -> `p:b` -> `p:c` -> color).
const PALETTE_MAX_RECURSION_DEPTH: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaletteError {
    #[error("palette: requested color {key} does not exist in palette of colors {available}")]
    MissingKey { key: String, available: String },

    #[error("palette: recursive resolution of color {key} returned palette reference {value} and reached recursion depth {depth}")]
    RecursiveKey {
        key: String,
        value: String,
        depth: usize,
    },
}

/// Named color lookup table. Values are plain color expressions or further
/// `p:` references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Palette(HashMap<String, String>);

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Layer `other` on top of this palette; keys in `other` win.
    pub fn merge(mut self, other: &Palette) -> Self {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
        self
    }

    /// Resolve `name` if it is a palette reference, otherwise return it unchanged.
    pub fn resolve(&self, name: &str) -> Result<String, PaletteError> {
        self.resolve_at(name, 1, name)
    }

    fn resolve_at(&self, name: &str, depth: usize, original: &str) -> Result<String, PaletteError> {
        let Some(key) = name.strip_prefix(PALETTE_KEY_PREFIX) else {
            return Ok(name.to_string());
        };

        let Some(color) = self.0.get(key) else {
            return Err(PaletteError::MissingKey {
                key: key.to_string(),
                available: self.sorted_keys(),
            });
        };

        if color.starts_with(PALETTE_KEY_PREFIX) {
            if depth > PALETTE_MAX_RECURSION_DEPTH {
                return Err(PaletteError::RecursiveKey {
                    key: original.to_string(),
                    value: color.clone(),
                    depth,
                });
            }

            return self.resolve_at(color, depth + 1, original);
        }

        Ok(color.clone())
    }

    fn sorted_keys(&self) -> String {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys.join(",")
    }
}

impl FromIterator<(String, String)> for Palette {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette(entries: &[(&str, &str)]) -> Palette {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_plain_color_passes_through() {
        let p = palette(&[("red", "#ff0000")]);
        assert_eq!(p.resolve("blue").unwrap(), "blue");
        assert_eq!(p.resolve("p:red").unwrap(), "#ff0000");
    }

    #[test]
    fn test_chained_references_within_bound() {
        let p = palette(&[("a", "p:b"), ("b", "p:c"), ("c", "p:d"), ("d", "#123456")]);
        assert_eq!(p.resolve("p:a").unwrap(), "#123456");
    }

    #[test]
    fn test_cycle_hits_recursion_bound() {
        let p = palette(&[("a", "p:b"), ("b", "p:a")]);
        match p.resolve("p:a") {
            Err(PaletteError::RecursiveKey { key, depth, .. }) => {
                assert_eq!(key, "p:a");
                assert_eq!(depth, PALETTE_MAX_RECURSION_DEPTH + 1);
            }
            other => panic!("expected recursion error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_lists_available() {
        let p = palette(&[("b", "red"), ("a", "blue")]);
        let err = p.resolve("p:zzz").unwrap_err();
        assert_eq!(
            err.to_string(),
            "palette: requested color zzz does not exist in palette of colors a,b"
        );
    }
}
