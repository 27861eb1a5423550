use std::borrow::Cow;

use anyhow::{anyhow, Context};
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;

pub const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const MC_NS: &str = "http://schemas.openxmlformats.org/markup-compatibility/2006";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

pub fn parse_xml_part(name: &str, xml_bytes: &[u8]) -> anyhow::Result<XmlPart> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut depth = 0usize;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("read xml event at byte {}", reader.buffer_position()))?;
        match ev {
            Event::Eof => break,
            Event::Decl(d) => {
                let version = bytes_to_string(d.version().context("decl version")?);
                let encoding = d
                    .encoding()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                let standalone = d
                    .standalone()
                    .map(|r| r.map(bytes_to_string))
                    .transpose()
                    .unwrap_or(None);
                events.push(XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                });
            }
            Event::Start(s) => {
                depth += 1;
                events.push(XmlEvent::Start {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::End(e) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("unexpected end tag"))?;
                events.push(XmlEvent::End {
                    name: bytes_to_string(e.name().as_ref()),
                });
            }
            Event::Empty(s) => {
                events.push(XmlEvent::Empty {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                });
            }
            Event::Text(t) => {
                let txt = t.unescape().context("unescape text")?.into_owned();
                events.push(XmlEvent::Text { text: txt });
            }
            Event::CData(t) => {
                let txt = bytes_to_string(t.into_inner());
                events.push(XmlEvent::CData { text: txt });
            }
            Event::Comment(t) => {
                let txt = bytes_to_string(t.into_inner());
                events.push(XmlEvent::Comment { text: txt });
            }
            Event::PI(t) => {
                let target = bytes_to_string(t.target());
                let content = bytes_to_string(t.content());
                events.push(XmlEvent::PI {
                    content: format!("{target}{content}"),
                });
            }
            Event::DocType(t) => {
                let txt = bytes_to_string(t.into_inner());
                events.push(XmlEvent::DocType { text: txt });
            }
        }
    }
    if depth != 0 {
        return Err(anyhow!(
            "unexpected end of document: {depth} element(s) left open"
        ));
    }

    Ok(XmlPart {
        name: name.to_string(),
        events,
    })
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        let key = bytes_to_string(a.key.as_ref());
        // Values stay raw (still escaped) so that character references such as `&#13;&#10;`
        // survive a round-trip; normalising them would change the attribute value.
        let val = bytes_to_string(a.value.as_ref());
        attrs.push((key, val));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

pub fn write_xml_part(part: &XmlPart) -> anyhow::Result<Vec<u8>> {
    write_events(&part.events)
}

pub fn write_events(events: &[XmlEvent]) -> anyhow::Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();

    fn escape_text_into(out: &mut Vec<u8>, text: &str) {
        for ch in text.chars() {
            match ch {
                '&' => out.extend_from_slice(b"&amp;"),
                '<' => out.extend_from_slice(b"&lt;"),
                '>' => out.extend_from_slice(b"&gt;"),
                _ => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    fn write_start_like(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
        out.extend_from_slice(b"<");
        out.extend_from_slice(name.as_bytes());
        // Attribute values are stored as raw (already-escaped) XML bytes. Do NOT escape again.
        for (k, v) in attrs {
            out.extend_from_slice(b" ");
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(b"=\"");
            out.extend_from_slice(v.as_bytes());
            out.extend_from_slice(b"\"");
        }
        if empty {
            out.extend_from_slice(b"/>");
        } else {
            out.extend_from_slice(b">");
        }
    }

    for ev in events {
        match ev {
            XmlEvent::Decl {
                version,
                encoding,
                standalone,
            } => {
                let d =
                    BytesDecl::new(version.as_str(), encoding.as_deref(), standalone.as_deref());
                let mut writer = quick_xml::Writer::new(Vec::new());
                writer.write_event(Event::Decl(d)).context("write decl")?;
                out.extend_from_slice(&writer.into_inner());
            }
            XmlEvent::Start { name, attrs } => {
                write_start_like(&mut out, name, attrs, false);
            }
            XmlEvent::End { name } => {
                out.extend_from_slice(b"</");
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(b">");
            }
            XmlEvent::Empty { name, attrs } => {
                write_start_like(&mut out, name, attrs, true);
            }
            XmlEvent::Text { text } => {
                escape_text_into(&mut out, text);
            }
            XmlEvent::CData { text } => {
                // CDATA must remain unescaped.
                out.extend_from_slice(b"<![CDATA[");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"]]>");
            }
            XmlEvent::Comment { text } => {
                out.extend_from_slice(b"<!--");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b"-->");
            }
            XmlEvent::PI { content } => {
                out.extend_from_slice(b"<?");
                out.extend_from_slice(content.as_bytes());
                out.extend_from_slice(b"?>");
            }
            XmlEvent::DocType { text } => {
                out.extend_from_slice(b"<!DOCTYPE");
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(b">");
            }
        }
    }

    Ok(out)
}

pub fn find_attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Attribute value with XML escapes resolved. Undecodable values are returned raw.
pub fn attr_value<'a>(attrs: &'a [(String, String)], key: &str) -> Option<Cow<'a, str>> {
    let raw = find_attr(attrs, key)?;
    Some(unescape(raw).unwrap_or(Cow::Borrowed(raw)))
}

/// Sets (or appends) an attribute on a start-like event. `value` is unescaped text.
pub fn set_attr(ev: &mut XmlEvent, key: &str, value: &str) {
    let raw = escape(value).into_owned();
    match ev {
        XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => {
            for (k, v) in attrs.iter_mut() {
                if k == key {
                    *v = raw;
                    return;
                }
            }
            attrs.push((key.to_string(), raw));
        }
        _ => {}
    }
}

pub fn split_qname(qname: &str) -> (&str, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", qname),
    }
}

pub fn local_name(qname: &str) -> &str {
    split_qname(qname).1
}

/// Index of the event closing the element opened at `start`.
/// For self-closing elements that is `start` itself.
pub fn element_end(events: &[XmlEvent], start: usize) -> Option<usize> {
    match events.get(start)? {
        XmlEvent::Empty { .. } => Some(start),
        XmlEvent::Start { .. } => {
            let mut depth = 0usize;
            for (idx, ev) in events.iter().enumerate().skip(start) {
                match ev {
                    XmlEvent::Start { .. } => depth += 1,
                    XmlEvent::End { .. } => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(idx);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

pub fn root_element(events: &[XmlEvent]) -> Option<usize> {
    events
        .iter()
        .position(|ev| matches!(ev, XmlEvent::Start { .. } | XmlEvent::Empty { .. }))
}

/// Read-only cursor over one element of an event stream.
#[derive(Clone, Copy, Debug)]
pub struct Element<'a> {
    events: &'a [XmlEvent],
    index: usize,
    end: usize,
}

impl<'a> Element<'a> {
    pub fn at(events: &'a [XmlEvent], index: usize) -> Option<Self> {
        let end = element_end(events, index)?;
        Some(Self { events, index, end })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn name(&self) -> &'a str {
        match &self.events[self.index] {
            XmlEvent::Start { name, .. } | XmlEvent::Empty { name, .. } => name,
            _ => "",
        }
    }

    pub fn attrs(&self) -> &'a [(String, String)] {
        match &self.events[self.index] {
            XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn attr(&self, key: &str) -> Option<Cow<'a, str>> {
        attr_value(self.attrs(), key)
    }

    pub fn children(&self) -> Children<'a> {
        Children {
            events: self.events,
            pos: self.index + 1,
            end: self.end,
        }
    }

    /// Direct text content (text and CDATA events that are immediate children).
    pub fn text(&self) -> String {
        let mut out = String::new();
        let mut depth = 0usize;
        for ev in &self.events[self.index + 1..self.end.max(self.index + 1)] {
            match ev {
                XmlEvent::Start { .. } => depth += 1,
                XmlEvent::End { .. } => depth = depth.saturating_sub(1),
                XmlEvent::Text { text } | XmlEvent::CData { text } if depth == 0 => {
                    out.push_str(text)
                }
                _ => {}
            }
        }
        out
    }

    /// Deep, owned copy of this element with all of its descendants.
    pub fn clone_subtree(&self) -> XmlSubtree {
        XmlSubtree {
            events: self.events[self.index..=self.end].to_vec(),
        }
    }
}

pub struct Children<'a> {
    events: &'a [XmlEvent],
    pos: usize,
    end: usize,
}

impl<'a> Iterator for Children<'a> {
    type Item = Element<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.end {
            match self.events[self.pos] {
                XmlEvent::Start { .. } | XmlEvent::Empty { .. } => {
                    let el = Element::at(self.events, self.pos)?;
                    self.pos = el.end + 1;
                    return Some(el);
                }
                _ => self.pos += 1,
            }
        }
        None
    }
}

/// A self-contained element tree detached from the part it was cloned from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlSubtree {
    pub events: Vec<XmlEvent>,
}

impl XmlSubtree {
    pub fn root(&self) -> Option<Element<'_>> {
        Element::at(&self.events, 0)
    }
}

/// Prefix -> namespace URI bindings in effect at some element. `""` is the default namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceScope {
    bindings: Vec<(String, String)>,
}

impl NamespaceScope {
    pub fn from_attrs(attrs: &[(String, String)]) -> Self {
        let mut scope = Self::default();
        scope.declare_from(attrs);
        scope
    }

    /// Scope of a nested element: inherits these bindings, overridden by the element's own.
    pub fn extended(&self, attrs: &[(String, String)]) -> Self {
        let mut scope = self.clone();
        scope.declare_from(attrs);
        scope
    }

    fn declare_from(&mut self, attrs: &[(String, String)]) {
        for (key, raw) in attrs {
            let prefix = if key == "xmlns" {
                ""
            } else if let Some(p) = key.strip_prefix("xmlns:") {
                p
            } else {
                continue;
            };
            let uri = unescape(raw).map(Cow::into_owned).unwrap_or_else(|_| raw.clone());
            self.bind(prefix, &uri);
        }
    }

    pub fn bind(&mut self, prefix: &str, uri: &str) {
        self.bindings.retain(|(p, _)| p != prefix);
        self.bindings.push((prefix.to_string(), uri.to_string()));
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some("http://www.w3.org/XML/1998/namespace");
        }
        self.bindings
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, u)| u.as_str())
    }

    /// First prefix bound to `uri`, preferring a named prefix over the default namespace.
    pub fn prefix_for(&self, uri: &str) -> Option<&str> {
        self.bindings
            .iter()
            .filter(|(_, u)| u == uri)
            .map(|(p, _)| p.as_str())
            .min_by_key(|p| p.is_empty())
    }

    pub fn is_bound(&self, prefix: &str) -> bool {
        self.bindings.iter().any(|(p, _)| p == prefix)
    }
}

/// Qualified-name helper for WordprocessingML elements of one part, whatever prefix the part
/// binds the main namespace to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordNames {
    prefix: String,
}

impl WordNames {
    pub fn resolve(scope: &NamespaceScope) -> Option<Self> {
        scope.prefix_for(WML_NS).map(|p| Self {
            prefix: p.to_string(),
        })
    }

    pub fn is(&self, qname: &str, local: &str) -> bool {
        let (prefix, name) = split_qname(qname);
        prefix == self.prefix && name == local
    }

    pub fn qualify(&self, local: &str) -> String {
        if self.prefix.is_empty() {
            local.to_string()
        } else {
            format!("{}:{local}", self.prefix)
        }
    }

    pub fn child<'a>(&self, parent: &Element<'a>, local: &str) -> Option<Element<'a>> {
        parent.children().find(|c| self.is(c.name(), local))
    }

    /// `w:val` of the named child, the usual shape of a WordprocessingML property.
    pub fn child_val<'a>(&self, parent: &Element<'a>, local: &str) -> Option<String> {
        self.child(parent, local)
            .and_then(|c| c.attr(&self.qualify("val")).map(Cow::into_owned))
    }
}

/// A parsed WordprocessingML part with its root element and namespace bindings resolved.
#[derive(Clone, Debug)]
pub struct WordPart {
    pub xml: XmlPart,
    pub scope: NamespaceScope,
    pub names: WordNames,
    pub root: usize,
}

impl WordPart {
    /// Parses `bytes` and checks that the root element is `root_local` in the main namespace.
    pub fn parse(part_name: &str, bytes: &[u8], root_local: &str) -> anyhow::Result<Self> {
        let xml = parse_xml_part(part_name, bytes)?;
        Self::from_xml(xml, root_local)
    }

    pub fn from_xml(xml: XmlPart, root_local: &str) -> anyhow::Result<Self> {
        let root = root_element(&xml.events).ok_or_else(|| anyhow!("no root element"))?;
        let root_el = Element::at(&xml.events, root).context("root element")?;
        let scope = NamespaceScope::from_attrs(root_el.attrs());
        let names = WordNames::resolve(&scope)
            .ok_or_else(|| anyhow!("root element does not bind {WML_NS}"))?;
        if !names.is(root_el.name(), root_local) {
            return Err(anyhow!(
                "root element is <{}>, expected <{}>",
                root_el.name(),
                names.qualify(root_local)
            ));
        }
        Ok(Self {
            xml,
            scope,
            names,
            root,
        })
    }

    pub fn root(&self) -> Element<'_> {
        Element {
            events: &self.xml.events,
            index: self.root,
            end: element_end(&self.xml.events, self.root).unwrap_or(self.root),
        }
    }
}
