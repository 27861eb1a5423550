//! Style catalog extraction from a package's style part.
//!
//! Every attribute is optional: a property element that is absent from the XML
//! stays `None` (or an empty map) and means "inherit", never zero or false.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::docx::xml::{local_name, Element, WordNames, WordPart};
use crate::error::{Result, TransplantError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleKind {
    Paragraph,
    Character,
    Table,
    List,
    Page,
}

impl StyleKind {
    /// Kind named by a `w:type` attribute. Absent or unrecognised values mean paragraph.
    pub fn from_type_attr(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("character") => Self::Character,
            Some("table") => Self::Table,
            Some("numbering") => Self::List,
            _ => Self::Paragraph,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FontAttrs {
    pub name: Option<String>,
    pub east_asia: Option<String>,
    /// Half-points, as stored in `w:sz`.
    pub size: Option<u32>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<String>,
    pub color: Option<String>,
    pub strike: Option<bool>,
    pub double_strike: Option<bool>,
    pub all_caps: Option<bool>,
    pub small_caps: Option<bool>,
    pub shadow: Option<bool>,
    pub outline: Option<bool>,
    pub emboss: Option<bool>,
    pub engrave: Option<bool>,
    pub vert_align: Option<String>,
}

/// Lengths are twentieths of a point, as stored in the XML.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParagraphAttrs {
    pub alignment: Option<String>,
    pub line_spacing: Option<i32>,
    pub line_rule: Option<String>,
    pub space_before: Option<i32>,
    pub space_after: Option<i32>,
    pub indent_left: Option<i32>,
    pub indent_right: Option<i32>,
    /// Negative for a hanging indent.
    pub indent_first_line: Option<i32>,
    pub keep_together: Option<bool>,
    pub keep_with_next: Option<bool>,
    pub page_break_before: Option<bool>,
    pub widow_control: Option<bool>,
    pub outline_level: Option<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TableAttrs {
    /// Edge name (`top`, `insideH`, ...) to border type.
    pub borders: BTreeMap<String, String>,
    /// Edge name to cell margin width.
    pub cell_margins: BTreeMap<String, i32>,
    pub shading: Option<String>,
    pub indent: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ListAttrs {
    pub num_id: Option<u32>,
    pub level: Option<u8>,
}

impl ListAttrs {
    pub fn is_set(&self) -> bool {
        self.num_id.is_some() || self.level.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StyleDefinition {
    pub id: String,
    pub name: String,
    pub kind: StyleKind,
    pub based_on: Option<String>,
    pub is_default: bool,
    pub custom: bool,
    pub font: FontAttrs,
    pub paragraph: ParagraphAttrs,
    pub table: TableAttrs,
    pub list: ListAttrs,
}

/// Document-wide defaults (`w:docDefaults`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SharedDefaults {
    pub font: FontAttrs,
    pub paragraph: ParagraphAttrs,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct StyleCatalog {
    styles: Vec<StyleDefinition>,
    defaults: Option<SharedDefaults>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl StyleCatalog {
    /// Appends a definition unless its id is already taken; the first definition of an id wins.
    pub fn insert(&mut self, style: StyleDefinition) -> bool {
        if self.index.contains_key(&style.id) {
            return false;
        }
        self.index.insert(style.id.clone(), self.styles.len());
        self.styles.push(style);
        true
    }

    pub fn set_defaults(&mut self, defaults: Option<SharedDefaults>) {
        self.defaults = defaults;
    }

    pub fn get(&self, id: &str) -> Option<&StyleDefinition> {
        self.index.get(id).map(|&i| &self.styles[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Definitions in document order.
    pub fn iter(&self) -> std::slice::Iter<'_, StyleDefinition> {
        self.styles.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.styles.iter().map(|s| s.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn defaults(&self) -> Option<&SharedDefaults> {
        self.defaults.as_ref()
    }

    /// The style flagged `w:default` for `kind`, if any.
    pub fn default_style(&self, kind: StyleKind) -> Option<&StyleDefinition> {
        self.styles.iter().find(|s| s.kind == kind && s.is_default)
    }
}

/// Parses raw style-part bytes into a catalog.
pub fn extract_catalog(part_name: &str, bytes: &[u8]) -> Result<StyleCatalog> {
    let part = parse_style_part(part_name, bytes)?;
    catalog_from_part(&part)
}

pub fn parse_style_part(part_name: &str, bytes: &[u8]) -> Result<WordPart> {
    WordPart::parse(part_name, bytes, "styles")
        .map_err(|e| TransplantError::malformed_styles(part_name, format!("{e:#}")))
}

pub fn catalog_from_part(part: &WordPart) -> Result<StyleCatalog> {
    let names = &part.names;
    let root = part.root();
    let mut catalog = StyleCatalog::default();

    for child in root.children() {
        if names.is(child.name(), "docDefaults") {
            if catalog.defaults().is_none() {
                catalog.set_defaults(Some(shared_defaults(names, &child)));
            }
        } else if names.is(child.name(), "style") {
            // Nothing can reference a style without an id; it stays in the raw part only.
            if let Some(style) = style_definition(names, &child) {
                catalog.insert(style);
            }
        }
    }
    Ok(catalog)
}

fn style_definition(names: &WordNames, el: &Element<'_>) -> Option<StyleDefinition> {
    let id = el
        .attr(&names.qualify("styleId"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())?;
    let kind = StyleKind::from_type_attr(el.attr(&names.qualify("type")).as_deref());
    let name = names.child_val(el, "name").unwrap_or_else(|| id.clone());

    let ppr = names.child(el, "pPr");
    Some(StyleDefinition {
        kind,
        name,
        based_on: names.child_val(el, "basedOn"),
        is_default: on_off(el.attr(&names.qualify("default")).as_deref()),
        custom: on_off(el.attr(&names.qualify("customStyle")).as_deref()),
        font: names
            .child(el, "rPr")
            .map(|r| font_attrs(names, &r))
            .unwrap_or_default(),
        paragraph: ppr.map(|p| paragraph_attrs(names, &p)).unwrap_or_default(),
        table: names
            .child(el, "tblPr")
            .map(|t| table_attrs(names, &t))
            .unwrap_or_default(),
        list: ppr.map(|p| list_attrs(names, &p)).unwrap_or_default(),
        id,
    })
}

fn shared_defaults(names: &WordNames, el: &Element<'_>) -> SharedDefaults {
    let font = names
        .child(el, "rPrDefault")
        .and_then(|d| names.child(&d, "rPr"))
        .map(|r| font_attrs(names, &r))
        .unwrap_or_default();
    let paragraph = names
        .child(el, "pPrDefault")
        .and_then(|d| names.child(&d, "pPr"))
        .map(|p| paragraph_attrs(names, &p))
        .unwrap_or_default();
    SharedDefaults { font, paragraph }
}

fn on_off(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("1" | "true" | "on"))
}

/// Toggle property: `<w:b/>` is on, `<w:b w:val="0"/>` is off, absence is unset.
fn toggle(names: &WordNames, parent: &Element<'_>, local: &str) -> Option<bool> {
    let el = names.child(parent, local)?;
    match el.attr(&names.qualify("val")).as_deref().map(str::trim) {
        Some("0" | "false" | "off" | "none") => Some(false),
        _ => Some(true),
    }
}

fn int_attr<T: std::str::FromStr>(names: &WordNames, el: &Element<'_>, local: &str) -> Option<T> {
    el.attr(&names.qualify(local))
        .and_then(|v| v.trim().parse::<T>().ok())
}

fn str_attr(names: &WordNames, el: &Element<'_>, local: &str) -> Option<String> {
    el.attr(&names.qualify(local))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn font_attrs(names: &WordNames, rpr: &Element<'_>) -> FontAttrs {
    let fonts = names.child(rpr, "rFonts");
    FontAttrs {
        name: fonts.as_ref().and_then(|f| {
            str_attr(names, f, "ascii").or_else(|| str_attr(names, f, "hAnsi"))
        }),
        east_asia: fonts.as_ref().and_then(|f| str_attr(names, f, "eastAsia")),
        size: names
            .child(rpr, "sz")
            .and_then(|s| int_attr(names, &s, "val")),
        bold: toggle(names, rpr, "b"),
        italic: toggle(names, rpr, "i"),
        underline: names.child_val(rpr, "u"),
        color: names.child_val(rpr, "color"),
        strike: toggle(names, rpr, "strike"),
        double_strike: toggle(names, rpr, "dstrike"),
        all_caps: toggle(names, rpr, "caps"),
        small_caps: toggle(names, rpr, "smallCaps"),
        shadow: toggle(names, rpr, "shadow"),
        outline: toggle(names, rpr, "outline"),
        emboss: toggle(names, rpr, "emboss"),
        engrave: toggle(names, rpr, "imprint"),
        vert_align: names.child_val(rpr, "vertAlign"),
    }
}

pub(crate) fn paragraph_attrs(names: &WordNames, ppr: &Element<'_>) -> ParagraphAttrs {
    let spacing = names.child(ppr, "spacing");
    let ind = names.child(ppr, "ind");
    let first_line = ind.as_ref().and_then(|i| {
        int_attr::<i32>(names, i, "firstLine")
            .or_else(|| int_attr::<i32>(names, i, "hanging").map(|h| -h))
    });
    ParagraphAttrs {
        alignment: names.child_val(ppr, "jc"),
        line_spacing: spacing.as_ref().and_then(|s| int_attr(names, s, "line")),
        line_rule: spacing.as_ref().and_then(|s| str_attr(names, s, "lineRule")),
        space_before: spacing.as_ref().and_then(|s| int_attr(names, s, "before")),
        space_after: spacing.as_ref().and_then(|s| int_attr(names, s, "after")),
        indent_left: ind
            .as_ref()
            .and_then(|i| int_attr(names, i, "left").or_else(|| int_attr(names, i, "start"))),
        indent_right: ind
            .as_ref()
            .and_then(|i| int_attr(names, i, "right").or_else(|| int_attr(names, i, "end"))),
        indent_first_line: first_line,
        keep_together: toggle(names, ppr, "keepLines"),
        keep_with_next: toggle(names, ppr, "keepNext"),
        page_break_before: toggle(names, ppr, "pageBreakBefore"),
        widow_control: toggle(names, ppr, "widowControl"),
        outline_level: names
            .child(ppr, "outlineLvl")
            .and_then(|o| int_attr(names, &o, "val")),
    }
}

fn table_attrs(names: &WordNames, tblpr: &Element<'_>) -> TableAttrs {
    let mut attrs = TableAttrs::default();
    if let Some(borders) = names.child(tblpr, "tblBorders") {
        for edge in borders.children() {
            if let Some(val) = str_attr(names, &edge, "val") {
                attrs
                    .borders
                    .insert(local_name(edge.name()).to_string(), val);
            }
        }
    }
    if let Some(margins) = names.child(tblpr, "tblCellMar") {
        for edge in margins.children() {
            if let Some(w) = int_attr(names, &edge, "w") {
                attrs
                    .cell_margins
                    .insert(local_name(edge.name()).to_string(), w);
            }
        }
    }
    attrs.shading = names
        .child(tblpr, "shd")
        .and_then(|s| str_attr(names, &s, "fill"));
    attrs.indent = names
        .child(tblpr, "tblInd")
        .and_then(|i| int_attr(names, &i, "w"));
    attrs
}

pub(crate) fn list_attrs(names: &WordNames, ppr: &Element<'_>) -> ListAttrs {
    let Some(num_pr) = names.child(ppr, "numPr") else {
        return ListAttrs::default();
    };
    ListAttrs {
        num_id: names
            .child(&num_pr, "numId")
            .and_then(|n| int_attr(names, &n, "val")),
        level: names
            .child(&num_pr, "ilvl")
            .and_then(|n| int_attr(names, &n, "val")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml::WML_NS;

    fn styles_xml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="{WML_NS}">{body}</w:styles>"#
        )
    }

    #[test]
    fn reads_kinds_names_and_attribute_groups() {
        let xml = styles_xml(
            r#"
  <w:docDefaults>
    <w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:eastAsia="SimSun"/><w:sz w:val="21"/></w:rPr></w:rPrDefault>
    <w:pPrDefault><w:pPr><w:spacing w:after="160" w:line="259" w:lineRule="auto"/></w:pPr></w:pPrDefault>
  </w:docDefaults>
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:pPr><w:ind w:firstLine="420"/><w:widowControl w:val="0"/></w:pPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Heading1">
    <w:name w:val="heading 1"/><w:basedOn w:val="Normal"/>
    <w:pPr><w:keepNext/><w:spacing w:before="340"/><w:outlineLvl w:val="0"/></w:pPr>
    <w:rPr><w:b/><w:i w:val="0"/><w:sz w:val="44"/><w:color w:val="2F5496"/></w:rPr>
  </w:style>
  <w:style w:type="character" w:customStyle="1" w:styleId="Emph"><w:name w:val="Emph"/></w:style>
  <w:style w:type="table" w:styleId="Grid">
    <w:name w:val="Table Grid"/>
    <w:tblPr><w:tblBorders><w:top w:val="single"/><w:insideH w:val="single"/></w:tblBorders>
      <w:tblCellMar><w:left w:w="108" w:type="dxa"/></w:tblCellMar></w:tblPr>
  </w:style>
  <w:style w:type="numbering" w:styleId="Bullets"><w:name w:val="Bullets"/>
    <w:pPr><w:numPr><w:numId w:val="3"/></w:numPr></w:pPr></w:style>
  <w:style w:type="mystery" w:styleId="Odd"/>
"#,
        );
        let catalog = extract_catalog("word/styles.xml", xml.as_bytes()).expect("catalog");
        let ids: Vec<&str> = catalog.ids().collect();
        assert_eq!(ids, vec!["Normal", "Heading1", "Emph", "Grid", "Bullets", "Odd"]);

        let normal = catalog.get("Normal").expect("normal");
        assert!(normal.is_default);
        assert_eq!(normal.paragraph.indent_first_line, Some(420));
        assert_eq!(normal.paragraph.widow_control, Some(false));
        assert_eq!(normal.paragraph.keep_with_next, None);

        let h1 = catalog.get("Heading1").expect("h1");
        assert_eq!(h1.name, "heading 1");
        assert_eq!(h1.based_on.as_deref(), Some("Normal"));
        assert_eq!(h1.font.bold, Some(true));
        assert_eq!(h1.font.italic, Some(false));
        assert_eq!(h1.font.underline, None);
        assert_eq!(h1.font.size, Some(44));
        assert_eq!(h1.paragraph.keep_with_next, Some(true));
        assert_eq!(h1.paragraph.space_before, Some(340));
        assert_eq!(h1.paragraph.space_after, None);
        assert_eq!(h1.paragraph.outline_level, Some(0));

        assert_eq!(catalog.get("Emph").expect("emph").kind, StyleKind::Character);
        assert!(catalog.get("Emph").expect("emph").custom);
        let grid = catalog.get("Grid").expect("grid");
        assert_eq!(grid.kind, StyleKind::Table);
        assert_eq!(grid.table.borders.get("insideH").map(String::as_str), Some("single"));
        assert_eq!(grid.table.cell_margins.get("left"), Some(&108));
        assert_eq!(grid.table.shading, None);
        let bullets = catalog.get("Bullets").expect("bullets");
        assert_eq!(bullets.kind, StyleKind::List);
        assert_eq!(bullets.list.num_id, Some(3));
        assert_eq!(bullets.list.level, None);

        let odd = catalog.get("Odd").expect("odd");
        assert_eq!(odd.kind, StyleKind::Paragraph);
        assert_eq!(odd.name, "Odd");

        let defaults = catalog.defaults().expect("defaults");
        assert_eq!(defaults.font.name.as_deref(), Some("Calibri"));
        assert_eq!(defaults.font.east_asia.as_deref(), Some("SimSun"));
        assert_eq!(defaults.paragraph.line_spacing, Some(259));
        assert_eq!(
            catalog.default_style(StyleKind::Paragraph).map(|s| s.id.as_str()),
            Some("Normal")
        );
    }

    #[test]
    fn first_definition_of_an_id_wins() {
        let xml = styles_xml(
            r#"<w:style w:styleId="A"><w:name w:val="First"/></w:style><w:style w:styleId="A"><w:name w:val="Second"/></w:style>"#,
        );
        let catalog = extract_catalog("word/styles.xml", xml.as_bytes()).expect("catalog");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("A").expect("a").name, "First");
    }

    #[test]
    fn styles_without_an_id_are_left_out() {
        let xml = styles_xml(
            r#"<w:style w:type="paragraph"><w:name w:val="Orphan"/></w:style><w:style w:type="paragraph" w:styleId=" "/><w:style w:type="paragraph" w:styleId="Normal"><w:name w:val="Normal"/></w:style>"#,
        );
        let catalog = extract_catalog("word/styles.xml", xml.as_bytes()).expect("catalog");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("Normal").expect("normal").name, "Normal");
        assert!(catalog.iter().all(|s| s.name != "Orphan"));
    }

    #[test]
    fn malformed_parts_are_rejected() {
        let wrong_root = format!(r#"<w:document xmlns:w="{WML_NS}"/>"#);
        for bad in ["<w:styles", wrong_root.as_str(), "<styles/>", ""] {
            assert!(
                matches!(
                    extract_catalog("word/styles.xml", bad.as_bytes()),
                    Err(TransplantError::StylePartMalformed { .. })
                ),
                "accepted: {bad}"
            );
        }
    }
}
