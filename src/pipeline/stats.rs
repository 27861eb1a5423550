use serde::Serialize;

use crate::docx::rewrite::RewriteCounts;
use crate::docx::scan::PageLayout;
use crate::error::Diagnostic;
use crate::pipeline::mapping::IdentifierMap;

/// Counters and findings of one `process` run. Filled by the pipeline, read-only to callers.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProcessingStats {
    pub(crate) paragraphs: usize,
    pub(crate) tables: usize,
    pub(crate) template_styles: usize,
    pub(crate) target_styles: usize,
    pub(crate) references: RewriteCounts,
    pub(crate) references_total: usize,
    pub(crate) used_ids: usize,
    pub(crate) rewritten: RewriteCounts,
    pub(crate) rewritten_total: usize,
    pub(crate) styles_removed: usize,
    pub(crate) styles_inserted: usize,
    pub(crate) defaults_replaced: bool,
    pub(crate) namespaces_added: usize,
    pub(crate) content_rewritten: bool,
    pub(crate) parts_carried: usize,
    pub(crate) page_layout: Option<PageLayout>,
    pub(crate) mapping: IdentifierMap,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl ProcessingStats {
    /// Body-level paragraphs of the target, list items included.
    pub fn paragraphs(&self) -> usize {
        self.paragraphs
    }

    pub fn tables(&self) -> usize {
        self.tables
    }

    pub fn template_styles(&self) -> usize {
        self.template_styles
    }

    pub fn target_styles(&self) -> usize {
        self.target_styles
    }

    /// References found in the target content part, per kind.
    pub fn references(&self) -> &RewriteCounts {
        &self.references
    }

    pub fn references_total(&self) -> usize {
        self.references_total
    }

    /// Distinct style ids the target content refers to.
    pub fn used_ids(&self) -> usize {
        self.used_ids
    }

    pub fn rewritten(&self) -> &RewriteCounts {
        &self.rewritten
    }

    /// Success tally: references that now point at a template id.
    pub fn rewritten_total(&self) -> usize {
        self.rewritten_total
    }

    /// Failure tally: references left pointing at an id the map does not cover.
    pub fn untouched_total(&self) -> usize {
        self.references_total - self.rewritten_total
    }

    pub fn ids_mapped(&self) -> usize {
        self.mapping.len()
    }

    pub fn ids_unmapped(&self) -> usize {
        self.mapping.unmapped().len()
    }

    pub fn styles_removed(&self) -> usize {
        self.styles_removed
    }

    pub fn styles_inserted(&self) -> usize {
        self.styles_inserted
    }

    pub fn defaults_replaced(&self) -> bool {
        self.defaults_replaced
    }

    pub fn namespaces_added(&self) -> usize {
        self.namespaces_added
    }

    /// Whether the content part was replaced; when false it was carried through verbatim.
    pub fn content_rewritten(&self) -> bool {
        self.content_rewritten
    }

    /// Parts copied into the output unchanged.
    pub fn parts_carried(&self) -> usize {
        self.parts_carried
    }

    pub fn page_layout(&self) -> Option<&PageLayout> {
        self.page_layout.as_ref()
    }

    pub fn mapping(&self) -> &IdentifierMap {
        &self.mapping
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_complete(&self) -> bool {
        self.mapping.unmapped().is_empty()
    }
}
