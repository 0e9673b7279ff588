//! Template retrieval seam.
//!
//! `src` attributes resolve through a `PacketSource`; the stage caches the
//! fetched text so each key is retrieved once per stage.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Resolves a `src` key to template text.
pub trait PacketSource {
    fn fetch(&mut self, key: &str) -> Result<String>;
}

/// An in-memory source backed by a map. The test and embedding default.
#[derive(Default)]
pub struct MapSource {
    templates: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        MapSource::default()
    }

    pub fn insert(&mut self, key: &str, text: &str) -> &mut Self {
        self.templates.insert(key.to_string(), text.to_string());
        self
    }
}

impl PacketSource for MapSource {
    fn fetch(&mut self, key: &str) -> Result<String> {
        self.templates
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Fetch {
                key: key.to_string(),
                reason: "no template under key".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_source() {
        let mut source = MapSource::new();
        source.insert("widget", "<div></div>");
        assert_eq!(source.fetch("widget").unwrap(), "<div></div>");
        assert!(matches!(
            source.fetch("missing"),
            Err(Error::Fetch { .. })
        ));
    }
}
