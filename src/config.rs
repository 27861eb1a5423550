use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::pipeline::MappingRules;

pub const DEFAULT_CONFIG_FILE: &str = "style-transplant.toml";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub mapping: MappingSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MappingSection {
    /// Names starting with this prefix form the heading family. Default: "heading".
    #[serde(default)]
    pub heading_prefix: Option<String>,

    /// Template style (by exact name) that unresolved target styles fall back to.
    /// Default: "Normal".
    #[serde(default)]
    pub fallback_style: Option<String>,

    /// Target style (id or name) -> template style (id or name), applied before name matching
    /// in the order the file lists them.
    #[serde(default)]
    pub manual: toml::Table,
}

impl AppConfig {
    pub fn mapping_rules(&self) -> MappingRules {
        let defaults = MappingRules::default();
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        MappingRules {
            heading_prefix: non_empty(&self.mapping.heading_prefix)
                .unwrap_or(defaults.heading_prefix),
            fallback_style: non_empty(&self.mapping.fallback_style)
                .unwrap_or(defaults.fallback_style),
            manual: self
                .mapping
                .manual
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
        }
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

/// Looks for `filename` upwards from the current directory, then from `workdir`, then from the
/// executable's directory.
pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    if let Some((key, _)) = cfg.mapping.manual.iter().find(|(_, v)| !v.is_str()) {
        anyhow::bail!("{}: [mapping.manual] value for {key:?} must be a string", path.display());
    }
    Ok(cfg)
}

const DEFAULT_CONFIG: &str = r#"[mapping]
# Target styles whose name starts with this prefix (case-insensitive) and that have no
# exact-name counterpart map to the first template style with the same prefix.
heading_prefix = "heading"

# Template style, by exact name, that every still-unresolved target style maps to.
fallback_style = "Normal"

# Overrides applied before name matching: "target id or name" = "template id or name".
[mapping.manual]
# "Body Text" = "Normal"
# "Caption" = "Quote"
"#;

/// Writes a commented default config into `dir`. An existing file is kept unless `force`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(DEFAULT_CONFIG_FILE);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_reproduces_default_rules() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = init_default_config(dir.path(), false).expect("init");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.mapping_rules(), MappingRules::default());
    }

    #[test]
    fn init_keeps_existing_file_unless_forced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[mapping]\nfallback_style = \"Body\"\n").expect("write");

        init_default_config(dir.path(), false).expect("init");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.mapping_rules().fallback_style, "Body");

        init_default_config(dir.path(), true).expect("init forced");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.mapping_rules().fallback_style, "Normal");
    }

    #[test]
    fn manual_table_and_blank_values() {
        let cfg: AppConfig = toml::from_str(
            r#"[mapping]
heading_prefix = "  "
[mapping.manual]
Caption = "Quote"
"Body Text" = "Normal"
"#,
        )
        .expect("parse");
        let rules = cfg.mapping_rules();
        assert_eq!(rules.heading_prefix, "heading");
        assert_eq!(
            rules.manual,
            vec![
                ("Caption".to_string(), "Quote".to_string()),
                ("Body Text".to_string(), "Normal".to_string()),
            ]
        );
    }

    #[test]
    fn manual_overrides_keep_file_order() {
        use crate::docx::styles::extract_catalog;
        use crate::docx::xml::WML_NS;
        use crate::pipeline::{build_mapping_with, MatchRule};

        let catalog = |body: &str| {
            let xml = format!(r#"<w:styles xmlns:w="{WML_NS}">{body}</w:styles>"#);
            extract_catalog("word/styles.xml", xml.as_bytes()).expect("catalog")
        };
        let template = catalog(
            r#"<w:style w:styleId="Q"><w:name w:val="Quote"/></w:style><w:style w:styleId="N"><w:name w:val="Normal"/></w:style>"#,
        );
        let target = catalog(r#"<w:style w:styleId="Zeta"><w:name w:val="Alpha"/></w:style>"#);

        // Both keys name the same target style; the first one in the file wins.
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[mapping.manual]\nZeta = \"Quote\"\nAlpha = \"Normal\"\n")
            .expect("write");
        let rules = load_config(&path).expect("load").mapping_rules();
        let (map, diags) = build_mapping_with(&template, &target, &rules);
        assert_eq!(map.get("Zeta"), Some("Q"));
        assert_eq!(map.rule("Zeta"), Some(MatchRule::Manual));
        assert!(diags.is_empty());

        std::fs::write(&path, "[mapping.manual]\nAlpha = \"Normal\"\nZeta = \"Quote\"\n")
            .expect("write");
        let rules = load_config(&path).expect("load").mapping_rules();
        assert_eq!(build_mapping_with(&template, &target, &rules).0.get("Zeta"), Some("N"));
    }

    #[test]
    fn non_string_manual_values_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[mapping.manual]\nCaption = 3\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn finds_config_in_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "").expect("write");
        assert_eq!(find_file_upwards(&nested, DEFAULT_CONFIG_FILE, 8), Some(path));
        assert_eq!(find_file_upwards(&nested, "absent.toml", 1), None);
    }
}
