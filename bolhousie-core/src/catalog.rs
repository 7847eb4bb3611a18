//! Static catalog of callable items (brands, each with a set of taglines).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One catalog entry. `taglines` is never empty once the catalog is validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub taglines: Vec<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, taglines: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            taglines: taglines.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Validated catalog: unique ids, at least one item, every item has a tagline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    items: Vec<Item>,
}

impl Catalog {
    pub fn new(items: Vec<Item>) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.id.clone()) {
                return Err(CatalogError::DuplicateId(item.id.clone()));
            }
            if item.taglines.is_empty() {
                return Err(CatalogError::NoTaglines(item.id.clone()));
            }
        }
        Ok(Self { items })
    }

    /// Parse a JSON array of `{id, name, taglines}`.
    pub fn from_json(s: &str) -> Result<Self, CatalogError> {
        let items: Vec<Item> = serde_json::from_str(s)?;
        Self::new(items)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog is empty")]
    Empty,
    #[error("duplicate item id {0:?}")]
    DuplicateId(String),
    #[error("item {0:?} has no taglines")]
    NoTaglines(String),
}

/// Catalog of `n` synthetic items (`item-0`, `item-1`, ...), two taglines each. Used by tests.
#[cfg(test)]
pub(crate) fn sample_catalog(n: usize) -> Catalog {
    let items = (0..n)
        .map(|i| Item {
            id: format!("item-{i}"),
            name: format!("Brand {i}"),
            taglines: vec![format!("tagline {i}a"), format!("tagline {i}b")],
        })
        .collect();
    Catalog::new(items).expect("sample catalog is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_list() {
        let json = r#"[
            {"id": "amul", "name": "Amul", "taglines": ["The taste of India"]},
            {"id": "nirma", "name": "Nirma", "taglines": ["Washing powder Nirma", "Doodh si safedi"]}
        ]"#;
        let catalog = Catalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("nirma").unwrap().taglines.len(), 2);
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let items = vec![
            Item::new("a", "A", &["x"]),
            Item::new("a", "A again", &["y"]),
        ];
        assert!(matches!(Catalog::new(items), Err(CatalogError::DuplicateId(id)) if id == "a"));
    }

    #[test]
    fn rejects_item_without_taglines() {
        let items = vec![Item::new("a", "A", &[])];
        assert!(matches!(Catalog::new(items), Err(CatalogError::NoTaglines(_))));
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert!(matches!(Catalog::new(vec![]), Err(CatalogError::Empty)));
        assert!(matches!(
            Catalog::from_json("{\"id\": 1}"),
            Err(CatalogError::Parse(_))
        ));
    }
}
