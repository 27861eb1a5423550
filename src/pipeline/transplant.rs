use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::docx::merge::replace_definitions;
use crate::docx::package::{DocxPackage, DOCUMENT_PART, STYLES_PART};
use crate::docx::rewrite::{rewrite, RewriteCounts};
use crate::docx::scan::{collect_references, page_layout};
use crate::docx::styles::{catalog_from_part, parse_style_part, StyleCatalog};
use crate::docx::xml::{write_xml_part, WordPart, XmlPart};
use crate::error::{ReferenceKind, Result, TransplantError};
use crate::pipeline::mapping::{build_mapping_with, MappingRules};
use crate::pipeline::stats::ProcessingStats;

/// A package opened for reading with its style part and primary content part parsed.
pub(crate) struct LoadedPackage {
    pub package: DocxPackage,
    pub styles: WordPart,
    pub catalog: StyleCatalog,
    pub content: WordPart,
}

impl LoadedPackage {
    pub fn load(path: &Path) -> Result<Self> {
        let package = DocxPackage::open(path)?;
        let styles = parse_style_part(STYLES_PART, package.read_part(STYLES_PART)?)?;
        let catalog = catalog_from_part(&styles)?;
        let content = WordPart::parse(DOCUMENT_PART, package.read_part(DOCUMENT_PART)?, "document")
            .map_err(|e| TransplantError::corrupt(path, format!("{DOCUMENT_PART}: {e:#}")))?;
        Ok(Self {
            package,
            styles,
            catalog,
            content,
        })
    }
}

/// Style transplantation: the target's content dressed in the template's style catalog.
#[derive(Clone, Debug, Default)]
pub struct Transplant {
    rules: MappingRules,
}

impl Transplant {
    pub fn new(rules: MappingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &MappingRules {
        &self.rules
    }

    /// Writes `output`: the target package with its style part replaced by the template's
    /// definitions and its style references rewritten through the identifier map. Every other
    /// part is carried over byte for byte. Nothing is written unless every step succeeds.
    pub fn process(&self, template: &Path, target: &Path, output: &Path) -> Result<ProcessingStats> {
        ensure_distinct_output(output, &[template, target])?;

        let tpl = LoadedPackage::load(template)?;
        let tgt = LoadedPackage::load(target)?;

        let scan = collect_references(&tgt.content);
        let (mapping, diagnostics) = build_mapping_with(&tpl.catalog, &tgt.catalog, &self.rules);
        let merged = replace_definitions(&tgt.styles, &tpl.styles)
            .map_err(|e| TransplantError::malformed_styles(STYLES_PART, format!("{e:#}")))?;
        let rewritten = rewrite(&tgt.content, &mapping);

        let mut overrides: HashMap<String, Vec<u8>> = HashMap::new();
        overrides.insert(STYLES_PART.to_string(), serialize(&merged.xml, output)?);
        let content_rewritten = rewritten.changed > 0;
        if content_rewritten {
            overrides.insert(DOCUMENT_PART.to_string(), serialize(&rewritten.part, output)?);
        }
        tgt.package.write_with_replacements(output, &overrides)?;

        Ok(ProcessingStats {
            paragraphs: scan.paragraphs,
            tables: scan.tables,
            template_styles: tpl.catalog.len(),
            target_styles: tgt.catalog.len(),
            references: RewriteCounts {
                paragraph: scan.count(ReferenceKind::Paragraph),
                run: scan.count(ReferenceKind::Run),
                table: scan.count(ReferenceKind::Table),
            },
            references_total: rewritten.total,
            used_ids: scan.used_ids().len(),
            rewritten: rewritten.by_kind,
            rewritten_total: rewritten.rewritten,
            styles_removed: merged.removed,
            styles_inserted: merged.inserted,
            defaults_replaced: merged.defaults_replaced,
            namespaces_added: merged.namespaces_added.len(),
            content_rewritten,
            parts_carried: tgt.package.part_names().count() - overrides.len(),
            page_layout: page_layout(&tgt.content),
            mapping,
            diagnostics,
        })
    }
}

/// `Transplant::process` with the default mapping rules.
pub fn process(template: &Path, target: &Path, output: &Path) -> Result<ProcessingStats> {
    Transplant::default().process(template, target, output)
}

fn serialize(part: &XmlPart, output: &Path) -> Result<Vec<u8>> {
    write_xml_part(part).map_err(|e| {
        TransplantError::io(
            output,
            std::io::Error::other(format!("serialize {}: {e:#}", part.name)),
        )
    })
}

/// Absolute form of `path`, resolving through the parent directory when the file itself does
/// not exist yet.
fn resolved(path: &Path) -> PathBuf {
    if let Ok(p) = path.canonicalize() {
        return p;
    }
    match (path.parent(), path.file_name()) {
        (Some(dir), Some(name)) => {
            let dir = if dir.as_os_str().is_empty() {
                Path::new(".")
            } else {
                dir
            };
            dir.canonicalize()
                .map(|d| d.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

fn ensure_distinct_output(output: &Path, inputs: &[&Path]) -> Result<()> {
    let out = resolved(output);
    if inputs.iter().any(|input| resolved(input) == out) {
        return Err(TransplantError::OutputConflict(output.to_path_buf()));
    }
    Ok(())
}
