//! Full replacement of a style part's definitions with another part's.
//!
//! Works on raw events: every template `style` and the template's `docDefaults` are cloned
//! with all attributes and descendants, whether or not the catalog models them. Prefixes in
//! the clones are rebound onto the target's own declarations for the same namespace URIs.

use quick_xml::escape::escape;

use crate::docx::xml::{
    attr_value, set_attr, split_qname, XmlEvent, XmlPart, XmlSubtree, NamespaceScope, WordPart,
    MC_NS,
};

#[derive(Clone, Debug)]
pub struct MergeOutcome {
    pub xml: XmlPart,
    /// Target `style` elements dropped.
    pub removed: usize,
    /// Template `style` elements inserted.
    pub inserted: usize,
    /// Whether the template carried shared defaults into the output.
    pub defaults_replaced: bool,
    /// Namespace declarations added to the target root for prefixes the target did not bind.
    pub namespaces_added: Vec<(String, String)>,
}

fn is_blank(ev: &XmlEvent) -> bool {
    matches!(ev, XmlEvent::Text { text } if text.trim().is_empty())
}

/// Whitespace text event directly before the child at `index`, if any.
fn leading_blank(events: &[XmlEvent], index: usize, root: usize) -> Option<&XmlEvent> {
    if index > root + 1 && is_blank(&events[index - 1]) {
        Some(&events[index - 1])
    } else {
        None
    }
}

/// Removes every `style` and `docDefaults` child of the target's root, then inserts clones of
/// the template's. Defaults go right after the root start tag, styles at the end of the root,
/// so elements the target keeps (`latentStyles`) stay in schema order.
pub fn replace_definitions(target: &WordPart, template: &WordPart) -> anyhow::Result<MergeOutcome> {
    let names = &target.names;
    let events = &target.xml.events;
    let root = target.root();
    let (root_idx, root_end) = (root.index(), root.end());

    let mut dropped = vec![false; events.len()];
    let mut removed = 0usize;
    for child in root.children() {
        let is_style = names.is(child.name(), "style");
        if !is_style && !names.is(child.name(), "docDefaults") {
            continue;
        }
        if is_style {
            removed += 1;
        }
        let from = if leading_blank(events, child.index(), root_idx).is_some() {
            child.index() - 1
        } else {
            child.index()
        };
        dropped[from..=child.end()].fill(true);
    }

    let mut rebinder = Rebinder::new(&template.scope, &target.scope);
    let tnames = &template.names;
    let troot = template.root();
    let mut defaults_chunk: Vec<XmlEvent> = Vec::new();
    let mut styles_chunk: Vec<XmlEvent> = Vec::new();
    let mut inserted = 0usize;
    let mut defaults_replaced = false;
    for child in troot.children() {
        let chunk = if tnames.is(child.name(), "style") {
            inserted += 1;
            &mut styles_chunk
        } else if tnames.is(child.name(), "docDefaults") && !defaults_replaced {
            defaults_replaced = true;
            &mut defaults_chunk
        } else {
            continue;
        };
        if let Some(lead) = leading_blank(&template.xml.events, child.index(), troot.index()) {
            chunk.push(lead.clone());
        }
        let mut clone = child.clone_subtree();
        rebinder.rebind(&mut clone);
        chunk.extend(clone.events);
    }

    let mut root_start = match &events[root_idx] {
        XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs } => XmlEvent::Start {
            name: name.clone(),
            attrs: attrs.clone(),
        },
        other => anyhow::bail!("root index points at {other:?}"),
    };
    let root_name = root.name().to_string();
    let namespaces_added = rebinder.declare_on_root(&mut root_start, troot.attrs());

    let kept: Vec<XmlEvent> = ((root_idx + 1)..root_end)
        .filter(|&i| !dropped[i])
        .map(|i| events[i].clone())
        .collect();
    let split = match kept.last() {
        Some(last) if is_blank(last) => kept.len() - 1,
        _ => kept.len(),
    };

    let mut out = Vec::with_capacity(kept.len() + defaults_chunk.len() + styles_chunk.len() + 8);
    out.extend_from_slice(&events[..root_idx]);
    out.push(root_start);
    out.extend(defaults_chunk);
    out.extend_from_slice(&kept[..split]);
    out.extend(styles_chunk);
    out.extend_from_slice(&kept[split..]);
    out.push(XmlEvent::End { name: root_name });
    out.extend_from_slice(&events[root_end + 1..]);

    Ok(MergeOutcome {
        xml: XmlPart {
            name: target.xml.name.clone(),
            events: out,
        },
        removed,
        inserted,
        defaults_replaced,
        namespaces_added,
    })
}

/// Rewrites qualified names of cloned template nodes so they resolve, under the target root's
/// declarations, to the same namespace URIs they had under the template root's.
struct Rebinder<'a> {
    template: &'a NamespaceScope,
    target: NamespaceScope,
    /// (target prefix, uri, template prefix) for bindings the target root lacks.
    added: Vec<(String, String, String)>,
}

impl<'a> Rebinder<'a> {
    fn new(template: &'a NamespaceScope, target: &NamespaceScope) -> Self {
        Self {
            template,
            target: target.clone(),
            added: Vec::new(),
        }
    }

    fn rebind(&mut self, subtree: &mut XmlSubtree) {
        // Declarations made inside the clone itself travel with it and are left alone.
        let mut local: Vec<NamespaceScope> = vec![NamespaceScope::default()];
        let mut open: Vec<String> = Vec::new();
        for ev in subtree.events.iter_mut() {
            match ev {
                XmlEvent::Start { name, attrs } => {
                    let scope = local.last().cloned().unwrap_or_default().extended(attrs);
                    self.rebind_element(name, attrs, &scope);
                    open.push(name.clone());
                    local.push(scope);
                }
                XmlEvent::Empty { name, attrs } => {
                    let scope = local.last().cloned().unwrap_or_default().extended(attrs);
                    self.rebind_element(name, attrs, &scope);
                }
                XmlEvent::End { name } => {
                    local.pop();
                    if let Some(open_name) = open.pop() {
                        *name = open_name;
                    }
                }
                _ => {}
            }
        }
    }

    fn rebind_element(
        &mut self,
        name: &mut String,
        attrs: &mut [(String, String)],
        local: &NamespaceScope,
    ) {
        if let Some(mapped) = self.map_qname(name, local, false) {
            *name = mapped;
        }
        for (key, value) in attrs.iter_mut() {
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            let (prefix, local_part) = split_qname(key);
            let is_ignorable = local_part == "Ignorable"
                && !local.is_bound(prefix)
                && self.template.uri(prefix) == Some(MC_NS);
            if let Some(mapped) = self.map_qname(key, local, true) {
                *key = mapped;
            }
            if is_ignorable {
                let tokens: Vec<String> = value
                    .split_whitespace()
                    .map(|p| self.map_prefix(p, local, true).unwrap_or_else(|| p.to_string()))
                    .collect();
                *value = tokens.join(" ");
            }
        }
    }

    fn map_qname(&mut self, qname: &str, local: &NamespaceScope, is_attr: bool) -> Option<String> {
        let (prefix, local_part) = split_qname(qname);
        let mapped = self.map_prefix(prefix, local, is_attr)?;
        Some(if mapped.is_empty() {
            local_part.to_string()
        } else {
            format!("{mapped}:{local_part}")
        })
    }

    /// New prefix for `prefix`, or `None` when the name can stay as it is.
    fn map_prefix(&mut self, prefix: &str, local: &NamespaceScope, is_attr: bool) -> Option<String> {
        if prefix == "xml" || local.is_bound(prefix) || (prefix.is_empty() && is_attr) {
            return None;
        }
        let uri = self.template.uri(prefix)?.to_string();
        let mapped = self.target_prefix(&uri, prefix, is_attr);
        (mapped != prefix).then_some(mapped)
    }

    fn target_prefix(&mut self, uri: &str, preferred: &str, is_attr: bool) -> String {
        if let Some(p) = self.target.prefix_for(uri) {
            if !(p.is_empty() && is_attr) {
                return p.to_string();
            }
        }
        let mut candidate = if preferred.is_empty() {
            "ns0".to_string()
        } else {
            preferred.to_string()
        };
        let mut n = 0usize;
        while self.target.is_bound(&candidate) {
            candidate = format!("ns{n}");
            n += 1;
        }
        self.target.bind(&candidate, uri);
        self.added
            .push((candidate.clone(), uri.to_string(), preferred.to_string()));
        candidate
    }

    /// Declares the collected bindings on the target root. Prefixes the template root marks
    /// ignorable are marked ignorable on the target root too.
    fn declare_on_root(
        &mut self,
        root_start: &mut XmlEvent,
        template_root_attrs: &[(String, String)],
    ) -> Vec<(String, String)> {
        let template_ignorable: Vec<String> = template_root_attrs
            .iter()
            .find(|(k, _)| {
                let (p, l) = split_qname(k);
                l == "Ignorable" && self.template.uri(p) == Some(MC_NS)
            })
            .and_then(|(k, _)| attr_value(template_root_attrs, k))
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let newly_ignorable: Vec<String> = self
            .added
            .iter()
            .filter(|(_, _, from)| template_ignorable.iter().any(|t| t == from))
            .map(|(p, _, _)| p.clone())
            .collect();

        if !newly_ignorable.is_empty() {
            let mc = self.target_prefix(MC_NS, "mc", true);
            let key = format!("{mc}:Ignorable");
            let current = match &*root_start {
                XmlEvent::Start { attrs, .. } => attr_value(attrs, &key)
                    .map(|v| v.into_owned())
                    .unwrap_or_default(),
                _ => String::new(),
            };
            let mut tokens: Vec<String> = current.split_whitespace().map(str::to_string).collect();
            for p in newly_ignorable {
                if !tokens.contains(&p) {
                    tokens.push(p);
                }
            }
            self.push_declarations(root_start);
            set_attr(root_start, &key, &tokens.join(" "));
        } else {
            self.push_declarations(root_start);
        }
        self.added
            .iter()
            .map(|(p, uri, _)| (p.clone(), uri.clone()))
            .collect()
    }

    fn push_declarations(&self, root_start: &mut XmlEvent) {
        if let XmlEvent::Start { attrs, .. } = root_start {
            for (prefix, uri, _) in &self.added {
                attrs.push((format!("xmlns:{prefix}"), escape(uri.as_str()).into_owned()));
            }
        }
    }
}
