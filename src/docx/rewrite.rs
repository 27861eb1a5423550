use serde::Serialize;

use crate::docx::scan::collect_references;
use crate::docx::xml::{set_attr, WordPart, XmlPart};
use crate::error::ReferenceKind;
use crate::pipeline::mapping::IdentifierMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RewriteCounts {
    pub paragraph: usize,
    pub run: usize,
    pub table: usize,
}

impl RewriteCounts {
    fn bump(&mut self, kind: ReferenceKind) {
        match kind {
            ReferenceKind::Paragraph => self.paragraph += 1,
            ReferenceKind::Run => self.run += 1,
            ReferenceKind::Table => self.table += 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RewriteOutcome {
    pub part: XmlPart,
    /// References covered by the map.
    pub rewritten: usize,
    /// Covered references whose id actually differs from the mapped one.
    pub changed: usize,
    /// All references seen, rewritten or not.
    pub total: usize,
    pub by_kind: RewriteCounts,
}

/// Replaces the id of every paragraph, run and table style reference that `map` has an entry
/// for. References to ids absent from the map keep their attribute bytes.
pub fn rewrite(part: &WordPart, map: &IdentifierMap) -> RewriteOutcome {
    let scan = collect_references(part);
    let val_key = part.names.qualify("val");
    let mut xml = part.xml.clone();
    let mut by_kind = RewriteCounts::default();
    let mut rewritten = 0usize;
    let mut changed = 0usize;

    for reference in &scan.references {
        let Some(new_id) = map.get(&reference.style_id) else {
            continue;
        };
        if new_id != reference.style_id {
            set_attr(&mut xml.events[reference.event_index], &val_key, new_id);
            changed += 1;
        }
        rewritten += 1;
        by_kind.bump(reference.kind);
    }

    RewriteOutcome {
        part: xml,
        rewritten,
        changed,
        total: scan.references.len(),
        by_kind,
    }
}
