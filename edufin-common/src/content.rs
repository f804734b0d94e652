//! Plan-gated content catalog.

use serde::{Deserialize, Serialize};

use crate::plan::PlanTier;

/// One entry of a content catalog (course, lesson, tool).
///
/// Fields other than `id`, `title` and `planAccess` are carried through
/// untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Tiers allowed to see this item.
    #[serde(default)]
    pub plan_access: Vec<PlanTier>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, plan_access: Vec<PlanTier>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            plan_access,
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_accessible_to(&self, tier: PlanTier) -> bool {
        self.plan_access.contains(&tier)
    }
}

/// Items of `catalog` whose access list includes `tier`, in catalog order.
pub fn filter_content(catalog: &[ContentItem], tier: PlanTier) -> Vec<ContentItem> {
    catalog
        .iter()
        .filter(|item| item.is_accessible_to(tier))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<ContentItem> {
        vec![
            ContentItem::new("a", "Orçamento pessoal", vec![PlanTier::EscolaBasica]),
            ContentItem::new("b", "Investimentos", vec![PlanTier::EscolaPremium]),
            ContentItem::new(
                "c",
                "Juros compostos",
                vec![PlanTier::EscolaBasica, PlanTier::EscolaPremium, PlanTier::RedeDeEnsino],
            ),
        ]
    }

    #[test]
    fn test_filter_returns_items_for_tier() {
        let catalog = vec![
            ContentItem::new("a", "", vec![PlanTier::EscolaBasica]),
            ContentItem::new("b", "", vec![PlanTier::EscolaPremium]),
        ];
        let visible = filter_content(&catalog, PlanTier::EscolaBasica);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "a");
    }

    #[test]
    fn test_filter_is_exact_subset_in_order() {
        let catalog = catalog();
        let visible = filter_content(&catalog, PlanTier::EscolaPremium);
        let ids: Vec<&str> = visible.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        for item in &catalog {
            let included = visible.contains(item);
            assert_eq!(included, item.plan_access.contains(&PlanTier::EscolaPremium));
        }
    }

    #[test]
    fn test_filter_empty_for_unused_tier() {
        assert!(filter_content(&catalog(), PlanTier::Unknown).is_empty());
        assert!(filter_content(&[], PlanTier::EscolaBasica).is_empty());
    }

    #[test]
    fn test_filter_does_not_mutate_catalog() {
        let catalog = catalog();
        let before = catalog.clone();
        let first = filter_content(&catalog, PlanTier::RedeDeEnsino);
        let second = filter_content(&catalog, PlanTier::RedeDeEnsino);
        assert_eq!(catalog, before);
        assert_eq!(first, second);
    }

    #[test]
    fn test_catalog_json_keeps_extra_fields() {
        let json = r#"[
            {"id": "a", "title": "Poupança", "planAccess": ["Escola Básica", "premium"], "duration": "2h"}
        ]"#;
        let catalog: Vec<ContentItem> = serde_json::from_str(json).unwrap();
        assert_eq!(
            catalog[0].plan_access,
            vec![PlanTier::EscolaBasica, PlanTier::EscolaPremium]
        );
        assert_eq!(catalog[0].extra.get("duration").unwrap(), "2h");

        let out = serde_json::to_string(&catalog[0]).unwrap();
        assert!(out.contains(r#""planAccess":["Escola Básica","Escola Premium"]"#));
        assert!(out.contains(r#""duration":"2h""#));
    }
}
