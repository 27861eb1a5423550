use std::collections::BTreeMap;

use serde::Serialize;

use crate::docx::styles::{StyleCatalog, StyleDefinition};
use crate::error::Diagnostic;

/// Which pass resolved a target id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Manual,
    ExactName,
    FamilyPrefix,
    DefaultFallback,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MappedStyle {
    pub template_id: String,
    pub rule: MatchRule,
}

/// Target style id -> template style id. Built once per run and never modified afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IdentifierMap {
    entries: BTreeMap<String, MappedStyle>,
    /// Target ids no pass resolved, in target catalog order.
    unmapped: Vec<String>,
}

impl IdentifierMap {
    pub fn get(&self, target_id: &str) -> Option<&str> {
        self.entries.get(target_id).map(|m| m.template_id.as_str())
    }

    pub fn rule(&self, target_id: &str) -> Option<MatchRule> {
        self.entries.get(target_id).map(|m| m.rule)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappedStyle)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }
}

/// Knobs for the mapping passes. The default reproduces the plain three-pass behaviour.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingRules {
    /// Heading-family prefix, compared case-insensitively (full Unicode lowercase).
    pub heading_prefix: String,
    /// Exact name of the template style that catches everything else.
    pub fallback_style: String,
    /// (target id or name, template id or name), applied before every other pass.
    pub manual: Vec<(String, String)>,
}

impl Default for MappingRules {
    fn default() -> Self {
        Self {
            heading_prefix: "heading".to_string(),
            fallback_style: "Normal".to_string(),
            manual: Vec::new(),
        }
    }
}

pub fn build_mapping(template: &StyleCatalog, target: &StyleCatalog) -> IdentifierMap {
    build_mapping_with(template, target, &MappingRules::default()).0
}

/// Case-folded form used by every name comparison.
fn fold(name: &str) -> String {
    name.to_lowercase()
}

fn find_by_id_or_name<'a>(catalog: &'a StyleCatalog, key: &str) -> Option<&'a StyleDefinition> {
    let key = key.trim();
    let folded = fold(key);
    catalog
        .get(key)
        .or_else(|| catalog.iter().find(|s| fold(&s.name) == folded))
}

fn resolve(entries: &mut BTreeMap<String, MappedStyle>, id: &str, template_id: &str, rule: MatchRule) {
    entries.entry(id.to_string()).or_insert_with(|| MappedStyle {
        template_id: template_id.to_string(),
        rule,
    });
}

fn starts_with_ignore_case(name: &str, folded_prefix: &str) -> bool {
    fold(name).starts_with(folded_prefix)
}

/// Resolves every target id in order: manual overrides, exact name, heading-family prefix,
/// then the fallback style. A target id is final at the first pass that resolves it.
pub fn build_mapping_with(
    template: &StyleCatalog,
    target: &StyleCatalog,
    rules: &MappingRules,
) -> (IdentifierMap, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut entries: BTreeMap<String, MappedStyle> = BTreeMap::new();

    for (from, to) in &rules.manual {
        match (find_by_id_or_name(target, from), find_by_id_or_name(template, to)) {
            (Some(t), Some(tpl)) => resolve(&mut entries, &t.id, &tpl.id, MatchRule::Manual),
            _ => diagnostics.push(Diagnostic::ManualMappingUnresolved {
                from: from.clone(),
                to: to.clone(),
            }),
        }
    }

    let template_names: Vec<(String, &StyleDefinition)> =
        template.iter().map(|t| (fold(&t.name), t)).collect();
    for style in target.iter() {
        if entries.contains_key(&style.id) {
            continue;
        }
        let name = fold(&style.name);
        if let Some((_, tpl)) = template_names.iter().find(|(folded, _)| *folded == name) {
            resolve(&mut entries, &style.id, &tpl.id, MatchRule::ExactName);
        }
    }

    let prefix = fold(&rules.heading_prefix);
    let prefix = prefix.as_str();
    if !prefix.is_empty() {
        let family = template
            .iter()
            .find(|t| starts_with_ignore_case(&t.name, prefix));
        if let Some(tpl) = family {
            for style in target.iter() {
                if !entries.contains_key(&style.id) && starts_with_ignore_case(&style.name, prefix) {
                    resolve(&mut entries, &style.id, &tpl.id, MatchRule::FamilyPrefix);
                }
            }
        }
    }

    if let Some(fallback) = template.iter().find(|t| t.name == rules.fallback_style) {
        for style in target.iter() {
            if !entries.contains_key(&style.id) {
                resolve(&mut entries, &style.id, &fallback.id, MatchRule::DefaultFallback);
            }
        }
    }

    let unmapped: Vec<String> = target
        .ids()
        .filter(|id| !entries.contains_key(*id))
        .map(str::to_string)
        .collect();
    if !unmapped.is_empty() {
        diagnostics.push(Diagnostic::MappingIncomplete {
            unmapped: unmapped.clone(),
        });
    }

    (IdentifierMap { entries, unmapped }, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::styles::extract_catalog;
    use crate::docx::xml::WML_NS;

    fn catalog(styles: &[(&str, &str)]) -> StyleCatalog {
        let body: String = styles
            .iter()
            .map(|(id, name)| {
                format!(r#"<w:style w:type="paragraph" w:styleId="{id}"><w:name w:val="{name}"/></w:style>"#)
            })
            .collect();
        let xml = format!(r#"<w:styles xmlns:w="{WML_NS}">{body}</w:styles>"#);
        extract_catalog("word/styles.xml", xml.as_bytes()).expect("catalog")
    }

    #[test]
    fn exact_match_takes_precedence_over_fallback() {
        let template = catalog(&[("H1T", "Heading1"), ("NormalT", "Normal")]);
        let target = catalog(&[("H1X", "Heading1"), ("BTX", "BodyText")]);
        let (map, diags) = build_mapping_with(&template, &target, &MappingRules::default());
        assert_eq!(map.get("H1X"), Some("H1T"));
        assert_eq!(map.rule("H1X"), Some(MatchRule::ExactName));
        assert_eq!(map.get("BTX"), Some("NormalT"));
        assert_eq!(map.rule("BTX"), Some(MatchRule::DefaultFallback));
        assert!(diags.is_empty());
        assert!(map.unmapped().is_empty());
    }

    #[test]
    fn names_compare_case_insensitively() {
        let template = catalog(&[("a", "Body Text"), ("b", "body text")]);
        let target = catalog(&[("x", "BODY TEXT")]);
        assert_eq!(build_mapping(&template, &target).get("x"), Some("a"));
    }

    #[test]
    fn names_fold_beyond_ascii() {
        let template = catalog(&[("U", "Überschrift"), ("N", "Normal")]);
        let target = catalog(&[("X", "überschrift"), ("Y", "ÜBERSCHRIFT 2")]);
        let rules = MappingRules {
            heading_prefix: "Überschrift".to_string(),
            ..MappingRules::default()
        };
        let (map, diags) = build_mapping_with(&template, &target, &rules);
        assert_eq!(map.get("X"), Some("U"));
        assert_eq!(map.rule("X"), Some(MatchRule::ExactName));
        assert_eq!(map.get("Y"), Some("U"));
        assert_eq!(map.rule("Y"), Some(MatchRule::FamilyPrefix));
        assert!(diags.is_empty());

        let manual = MappingRules {
            manual: vec![("ÜBERSCHRIFT".to_string(), "normal".to_string())],
            ..MappingRules::default()
        };
        let (map, _) = build_mapping_with(&template, &target, &manual);
        assert_eq!(map.get("X"), Some("N"));
        assert_eq!(map.rule("X"), Some(MatchRule::Manual));
    }

    #[test]
    fn heading_family_maps_to_first_template_heading() {
        let template = catalog(&[("Title", "Title"), ("T2", "heading 2"), ("T1", "heading 1")]);
        let target = catalog(&[("X1", "heading 1"), ("X7", "Heading 7"), ("Y", "Caption")]);
        let (map, diags) = build_mapping_with(&template, &target, &MappingRules::default());
        assert_eq!(map.get("X1"), Some("T1"));
        assert_eq!(map.get("X7"), Some("T2"));
        assert_eq!(map.rule("X7"), Some(MatchRule::FamilyPrefix));
        assert_eq!(map.get("Y"), None);
        assert_eq!(map.unmapped(), ["Y".to_string()]);
        assert_eq!(
            diags,
            vec![Diagnostic::MappingIncomplete {
                unmapped: vec!["Y".to_string()]
            }]
        );
    }

    #[test]
    fn manual_overrides_run_first() {
        let template = catalog(&[("NormalT", "Normal"), ("QuoteT", "Quote")]);
        let target = catalog(&[("N", "Normal"), ("Cite", "Citation")]);
        let rules = MappingRules {
            manual: vec![
                ("normal".to_string(), "QuoteT".to_string()),
                ("Citation".to_string(), "quote".to_string()),
                ("Missing".to_string(), "Normal".to_string()),
            ],
            ..MappingRules::default()
        };
        let (map, diags) = build_mapping_with(&template, &target, &rules);
        assert_eq!(map.get("N"), Some("QuoteT"));
        assert_eq!(map.rule("N"), Some(MatchRule::Manual));
        assert_eq!(map.get("Cite"), Some("QuoteT"));
        assert_eq!(
            diags,
            vec![Diagnostic::ManualMappingUnresolved {
                from: "Missing".to_string(),
                to: "Normal".to_string()
            }]
        );
    }

    #[test]
    fn mapping_is_deterministic() {
        let template = catalog(&[("A", "heading 1"), ("B", "Normal"), ("C", "List")]);
        let target = catalog(&[("z", "Heading 3"), ("y", "list"), ("x", "Other")]);
        let first = build_mapping(&template, &target);
        for _ in 0..5 {
            assert_eq!(build_mapping(&template, &target), first);
        }
    }
}
