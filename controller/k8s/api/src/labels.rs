use std::collections::BTreeMap;

pub type Map = BTreeMap<String, String>;

/// Whether `selector` selects a resource carrying `labels`.
///
/// Subset semantics: every selector entry must be present with the same
/// value; an empty selector selects everything.
pub fn selects(selector: &Map, labels: &Map) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Map {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn selects_supersets_only() {
        let selector = labels(&[("a", "1")]);
        assert!(selects(&selector, &labels(&[("a", "1"), ("b", "2")])));
        assert!(!selects(&selector, &labels(&[("b", "2")])));
        assert!(!selects(&selector, &labels(&[("a", "2")])));
    }

    #[test]
    fn empty_selector_selects_everything() {
        assert!(selects(&Map::new(), &labels(&[])));
        assert!(selects(&Map::new(), &labels(&[("a", "1")])));
    }
}
