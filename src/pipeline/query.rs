use std::path::Path;

use serde::Serialize;

use crate::docx::scan::{find_by_text, page_layout, Occurrence, PageLayout};
use crate::docx::styles::StyleCatalog;
use crate::error::Result;
use crate::pipeline::transplant::LoadedPackage;

/// Paragraphs, list items and tables of `target` whose text contains `needle`, each with the
/// style it resolves to in the target's own catalog. Independent of `process`.
pub fn find_styles_by_text(target: &Path, needle: &str) -> Result<Vec<Occurrence>> {
    let doc = LoadedPackage::load(target)?;
    Ok(find_by_text(&doc.content, &doc.catalog, needle))
}

#[derive(Clone, Debug, Serialize)]
pub struct CatalogDump {
    pub path: String,
    pub catalog: StyleCatalog,
    pub page_layout: Option<PageLayout>,
}

pub fn dump_catalog(path: &Path) -> Result<CatalogDump> {
    let doc = LoadedPackage::load(path)?;
    Ok(CatalogDump {
        path: path.display().to_string(),
        page_layout: page_layout(&doc.content),
        catalog: doc.catalog,
    })
}
