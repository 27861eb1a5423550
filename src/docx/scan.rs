use std::collections::BTreeSet;

use serde::Serialize;

use crate::docx::styles::{
    list_attrs, FontAttrs, ListAttrs, ParagraphAttrs, StyleCatalog, StyleKind, TableAttrs,
};
use crate::docx::xml::{attr_value, Element, WordNames, WordPart, XmlEvent};
use crate::error::{Diagnostic, ReferenceKind};

/// One style-id usage inside a content part. `event_index` points at the
/// `pStyle`/`rStyle`/`tblStyle` element carrying the id in its `val` attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContentReference {
    pub kind: ReferenceKind,
    pub style_id: String,
    pub event_index: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ContentScan {
    pub references: Vec<ContentReference>,
    /// Body-level paragraphs.
    pub paragraphs: usize,
    /// Body-level tables.
    pub tables: usize,
}

impl ContentScan {
    /// Distinct ids over all three reference kinds.
    pub fn used_ids(&self) -> BTreeSet<&str> {
        self.references.iter().map(|r| r.style_id.as_str()).collect()
    }

    pub fn count(&self, kind: ReferenceKind) -> usize {
        self.references.iter().filter(|r| r.kind == kind).count()
    }
}

fn reference_kind(names: &WordNames, name: &str, parent: &str) -> Option<ReferenceKind> {
    if names.is(name, "pStyle") && names.is(parent, "pPr") {
        Some(ReferenceKind::Paragraph)
    } else if names.is(name, "rStyle") && names.is(parent, "rPr") {
        Some(ReferenceKind::Run)
    } else if names.is(name, "tblStyle") && names.is(parent, "tblPr") {
        Some(ReferenceKind::Table)
    } else {
        None
    }
}

/// Collects every paragraph, run and table style reference of a content part, in document order.
pub fn collect_references(part: &WordPart) -> ContentScan {
    let names = &part.names;
    let val_key = names.qualify("val");
    let mut scan = ContentScan::default();
    let mut stack: Vec<&str> = Vec::new();

    for (idx, ev) in part.xml.events.iter().enumerate() {
        match ev {
            XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => {
                let parent = stack.last().copied().unwrap_or("");
                if let Some(kind) = reference_kind(names, name, parent) {
                    if let Some(id) = attr_value(attrs, &val_key) {
                        let id = id.trim();
                        if !id.is_empty() {
                            scan.references.push(ContentReference {
                                kind,
                                style_id: id.to_string(),
                                event_index: idx,
                            });
                        }
                    }
                }
                if names.is(parent, "body") {
                    if names.is(name, "p") {
                        scan.paragraphs += 1;
                    } else if names.is(name, "tbl") {
                        scan.tables += 1;
                    }
                }
                if matches!(ev, XmlEvent::Start { .. }) {
                    stack.push(name);
                }
            }
            XmlEvent::End { .. } => {
                stack.pop();
            }
            _ => {}
        }
    }
    scan
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceKind {
    Paragraph,
    List,
    Table,
}

/// How a resolved style was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleOrigin {
    /// Referenced explicitly and declared in the catalog.
    Declared,
    /// No reference; the catalog's default style for the kind applies.
    DefaultStyle,
    /// No reference and no default style.
    Unstyled,
    /// Referenced, but the catalog has no such id.
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedStyle {
    pub id: Option<String>,
    pub name: String,
    pub kind: StyleKind,
    pub origin: StyleOrigin,
    pub font: FontAttrs,
    pub paragraph: ParagraphAttrs,
    pub table: TableAttrs,
    pub list: ListAttrs,
}

pub const UNSTYLED_NAME: &str = "(no style)";

impl ResolvedStyle {
    fn placeholder(id: Option<String>, name: String, kind: StyleKind, origin: StyleOrigin) -> Self {
        Self {
            id,
            name,
            kind,
            origin,
            font: FontAttrs::default(),
            paragraph: ParagraphAttrs::default(),
            table: TableAttrs::default(),
            list: ListAttrs::default(),
        }
    }
}

/// Placeholder name for a referenced id that the catalog does not declare.
pub fn unknown_style_name(id: &str) -> String {
    format!("unknown:{id}")
}

pub fn resolve_style(catalog: &StyleCatalog, reference: Option<&str>, kind: StyleKind) -> ResolvedStyle {
    let (def, origin) = match reference {
        Some(id) => match catalog.get(id) {
            Some(def) => (def, StyleOrigin::Declared),
            None => {
                return ResolvedStyle::placeholder(
                    Some(id.to_string()),
                    unknown_style_name(id),
                    kind,
                    StyleOrigin::Unknown,
                )
            }
        },
        None => match catalog.default_style(kind) {
            Some(def) => (def, StyleOrigin::DefaultStyle),
            None => {
                return ResolvedStyle::placeholder(
                    None,
                    UNSTYLED_NAME.to_string(),
                    kind,
                    StyleOrigin::Unstyled,
                )
            }
        },
    };
    ResolvedStyle {
        id: Some(def.id.clone()),
        name: def.name.clone(),
        kind: def.kind,
        origin,
        font: def.font.clone(),
        paragraph: def.paragraph.clone(),
        table: def.table.clone(),
        list: def.list.clone(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub kind: OccurrenceKind,
    /// Ordinal among body-level paragraphs (list items included) or body-level tables.
    pub index: usize,
    pub text: String,
    pub style: ResolvedStyle,
    /// Direct numbering properties of a list paragraph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numbering: Option<ListAttrs>,
}

impl Occurrence {
    pub fn diagnostic(&self) -> Option<Diagnostic> {
        if self.style.origin != StyleOrigin::Unknown {
            return None;
        }
        Some(Diagnostic::UnknownStyleReference {
            style_id: self.style.id.clone().unwrap_or_default(),
            reference: match self.kind {
                OccurrenceKind::Table => ReferenceKind::Table,
                _ => ReferenceKind::Paragraph,
            },
        })
    }
}

/// Text of a paragraph: the `t` children of its runs, in document order. Paragraphs nested
/// inside it (text boxes) are not part of its text.
pub fn paragraph_text(names: &WordNames, p: &Element<'_>) -> String {
    let mut out = String::new();
    collect_run_text(names, p, &mut out);
    out
}

fn collect_run_text(names: &WordNames, el: &Element<'_>, out: &mut String) {
    for child in el.children() {
        if names.is(child.name(), "p") {
            continue;
        }
        if names.is(child.name(), "r") {
            for t in child.children().filter(|t| names.is(t.name(), "t")) {
                out.push_str(&t.text());
            }
            continue;
        }
        collect_run_text(names, &child, out);
    }
}

fn cell_text(names: &WordNames, tc: &Element<'_>) -> String {
    tc.children()
        .filter(|c| names.is(c.name(), "p"))
        .map(|p| paragraph_text(names, &p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Every cell under `el`, nested tables included, in document order.
fn table_cells<'a>(names: &WordNames, el: &Element<'a>, out: &mut Vec<Element<'a>>) {
    for child in el.children() {
        if names.is(child.name(), "tc") {
            out.push(child);
        }
        table_cells(names, &child, out);
    }
}

/// Finds body-level paragraphs and tables whose text contains `needle`, each paired with the
/// style it resolves to in `catalog` (the catalog of the same package).
pub fn find_by_text(part: &WordPart, catalog: &StyleCatalog, needle: &str) -> Vec<Occurrence> {
    let names = &part.names;
    let mut found = Vec::new();
    let Some(body) = names.child(&part.root(), "body") else {
        return found;
    };

    let mut p_index = 0usize;
    let mut t_index = 0usize;
    for child in body.children() {
        if names.is(child.name(), "p") {
            let index = p_index;
            p_index += 1;
            let text = paragraph_text(names, &child);
            if !text.contains(needle) {
                continue;
            }
            let ppr = names.child(&child, "pPr");
            let numbering = ppr
                .map(|p| list_attrs(names, &p))
                .filter(ListAttrs::is_set);
            let reference = ppr.and_then(|p| names.child_val(&p, "pStyle"));
            found.push(Occurrence {
                kind: if numbering.is_some() {
                    OccurrenceKind::List
                } else {
                    OccurrenceKind::Paragraph
                },
                index,
                text,
                style: resolve_style(catalog, reference.as_deref(), StyleKind::Paragraph),
                numbering,
            });
        } else if names.is(child.name(), "tbl") {
            let index = t_index;
            t_index += 1;
            let mut cells = Vec::new();
            table_cells(names, &child, &mut cells);
            let Some(text) = cells
                .iter()
                .map(|tc| cell_text(names, tc))
                .find(|t| t.contains(needle))
            else {
                continue;
            };
            let reference = names
                .child(&child, "tblPr")
                .and_then(|p| names.child_val(&p, "tblStyle"));
            found.push(Occurrence {
                kind: OccurrenceKind::Table,
                index,
                text,
                style: resolve_style(catalog, reference.as_deref(), StyleKind::Table),
                numbering: None,
            });
        }
    }
    found
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PageMargins {
    pub top: Option<i32>,
    pub bottom: Option<i32>,
    pub left: Option<i32>,
    pub right: Option<i32>,
    pub header: Option<i32>,
    pub footer: Option<i32>,
    pub gutter: Option<i32>,
}

/// Page setup of the first section of a content part. Lengths in twentieths of a point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageLayout {
    pub kind: StyleKind,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub orientation: Option<String>,
    pub margins: PageMargins,
}

pub fn page_layout(part: &WordPart) -> Option<PageLayout> {
    let names = &part.names;
    let body = names.child(&part.root(), "body")?;
    let sect = first_section(names, &body)?;
    let int = |el: &Element<'_>, local: &str| -> Option<i32> {
        el.attr(&names.qualify(local))
            .and_then(|v| v.trim().parse::<i32>().ok())
    };
    let size = names.child(&sect, "pgSz");
    let mar = names.child(&sect, "pgMar");
    Some(PageLayout {
        kind: StyleKind::Page,
        width: size
            .as_ref()
            .and_then(|s| int(s, "w"))
            .and_then(|v| u32::try_from(v).ok()),
        height: size
            .as_ref()
            .and_then(|s| int(s, "h"))
            .and_then(|v| u32::try_from(v).ok()),
        orientation: size
            .as_ref()
            .and_then(|s| s.attr(&names.qualify("orient")).map(|v| v.into_owned())),
        margins: mar
            .map(|m| PageMargins {
                top: int(&m, "top"),
                bottom: int(&m, "bottom"),
                left: int(&m, "left"),
                right: int(&m, "right"),
                header: int(&m, "header"),
                footer: int(&m, "footer"),
                gutter: int(&m, "gutter"),
            })
            .unwrap_or_default(),
    })
}

/// First `sectPr` in document order: a section break inside a paragraph comes before the
/// body's closing one.
fn first_section<'a>(names: &WordNames, body: &Element<'a>) -> Option<Element<'a>> {
    for child in body.children() {
        if names.is(child.name(), "sectPr") {
            return Some(child);
        }
        if names.is(child.name(), "p") {
            if let Some(sect) = names
                .child(&child, "pPr")
                .and_then(|ppr| names.child(&ppr, "sectPr"))
            {
                return Some(sect);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::styles::extract_catalog;
    use crate::docx::xml::WML_NS;

    fn document(body: &str) -> WordPart {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="{WML_NS}"><w:body>{body}</w:body></w:document>"#
        );
        WordPart::parse("word/document.xml", xml.as_bytes(), "document").expect("document")
    }

    fn catalog() -> StyleCatalog {
        let xml = format!(
            r#"<w:styles xmlns:w="{WML_NS}">
<w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
<w:style w:type="paragraph" w:styleId="BTX"><w:name w:val="BodyText"/><w:pPr><w:ind w:firstLine="480"/></w:pPr></w:style>
<w:style w:type="table" w:styleId="Grid"><w:name w:val="Table Grid"/></w:style>
</w:styles>"#
        );
        extract_catalog("word/styles.xml", xml.as_bytes()).expect("catalog")
    }

    #[test]
    fn collects_three_reference_kinds() {
        let part = document(
            r#"<w:p><w:pPr><w:pStyle w:val="H1X"/><w:rPr><w:rStyle w:val="Mark"/></w:rPr></w:pPr>
<w:r><w:rPr><w:rStyle w:val="Emph"/></w:rPr><w:t>a</w:t></w:r></w:p>
<w:tbl><w:tblPr><w:tblStyle w:val="Grid"/></w:tblPr><w:tr><w:tc><w:p><w:pPr><w:pStyle w:val="H1X"/></w:pPr></w:p></w:tc></w:tr></w:tbl>
<w:p><w:r><w:t>pStyle outside pPr is not a reference</w:t></w:r><w:pStyle w:val="Nope"/></w:p>"#,
        );
        let scan = collect_references(&part);
        let got: Vec<(ReferenceKind, &str)> = scan
            .references
            .iter()
            .map(|r| (r.kind, r.style_id.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (ReferenceKind::Paragraph, "H1X"),
                (ReferenceKind::Run, "Mark"),
                (ReferenceKind::Run, "Emph"),
                (ReferenceKind::Table, "Grid"),
                (ReferenceKind::Paragraph, "H1X"),
            ]
        );
        assert_eq!(scan.paragraphs, 2);
        assert_eq!(scan.tables, 1);
        assert_eq!(
            scan.used_ids().into_iter().collect::<Vec<_>>(),
            vec!["Emph", "Grid", "H1X", "Mark"]
        );
        assert_eq!(scan.count(ReferenceKind::Run), 2);
    }

    #[test]
    fn finds_paragraph_text_across_runs() {
        let part = document(
            r#"<w:p><w:r><w:t>无关</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="BTX"/></w:pPr><w:r><w:t>正</w:t></w:r><w:proofErr w:type="spellStart"/><w:r><w:tab/><w:t>文内容</w:t></w:r></w:p>"#,
        );
        let found = find_by_text(&part, &catalog(), "正文");
        assert_eq!(found.len(), 1);
        let occ = &found[0];
        assert_eq!(occ.kind, OccurrenceKind::Paragraph);
        assert_eq!(occ.index, 1);
        assert_eq!(occ.text, "正文内容");
        assert_eq!(occ.style.name, "BodyText");
        assert_eq!(occ.style.origin, StyleOrigin::Declared);
        assert_eq!(occ.style.paragraph.indent_first_line, Some(480));
        assert!(occ.diagnostic().is_none());
    }

    #[test]
    fn list_detection_and_placeholders() {
        let part = document(
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="1"/><w:numId w:val="4"/></w:numPr></w:pPr><w:r><w:t>item one</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="Ghost"/></w:pPr><w:r><w:t>item two</w:t></w:r></w:p>"#,
        );
        let found = find_by_text(&part, &catalog(), "item");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, OccurrenceKind::List);
        assert_eq!(
            found[0].numbering,
            Some(ListAttrs {
                num_id: Some(4),
                level: Some(1)
            })
        );
        assert_eq!(found[0].style.origin, StyleOrigin::DefaultStyle);
        assert_eq!(found[0].style.name, "Normal");

        assert_eq!(found[1].kind, OccurrenceKind::Paragraph);
        assert_eq!(found[1].style.origin, StyleOrigin::Unknown);
        assert_eq!(found[1].style.name, "unknown:Ghost");
        assert_eq!(
            found[1].diagnostic(),
            Some(Diagnostic::UnknownStyleReference {
                style_id: "Ghost".to_string(),
                reference: ReferenceKind::Paragraph
            })
        );
    }

    #[test]
    fn table_counts_once() {
        let part = document(
            r#"<w:tbl><w:tblPr><w:tblStyle w:val="Grid"/></w:tblPr>
<w:tr><w:tc><w:p><w:r><w:t>cell hit</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>another hit</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>miss</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>third hit</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        );
        let found = find_by_text(&part, &catalog(), "hit");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, OccurrenceKind::Table);
        assert_eq!(found[0].index, 0);
        assert_eq!(found[0].text, "cell hit");
        assert_eq!(found[0].style.name, "Table Grid");
        assert_eq!(found[1].index, 2);
        assert_eq!(found[1].style.origin, StyleOrigin::Unstyled);
        assert_eq!(found[1].style.name, UNSTYLED_NAME);
    }

    #[test]
    fn reads_first_section_layout() {
        let part = document(
            r#"<w:p><w:pPr><w:sectPr><w:pgSz w:w="16838" w:h="11906" w:orient="landscape"/></w:sectPr></w:pPr></w:p>
<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:bottom="1440" w:left="1800" w:right="1800" w:header="851" w:footer="992" w:gutter="0"/></w:sectPr>"#,
        );
        let layout = page_layout(&part).expect("layout");
        assert_eq!(layout.kind, StyleKind::Page);
        assert_eq!(layout.width, Some(16838));
        assert_eq!(layout.orientation.as_deref(), Some("landscape"));
        assert_eq!(layout.margins, PageMargins::default());
    }
}
