//! XML reader. Picks the repeating element that forms a row — named by
//! the `#xml:element` selector or auto-detected as the most common
//! direct-child name at the deepest level with at least two repetitions.
//! Child elements become columns (nested ones dot-flattened); row
//! element attributes are prefixed with `@`.

use fsq_common::{FsqError, Result};

use crate::fetch::ByteSource;
use crate::html::decode_entities;
use crate::reader::ReaderContext;
use crate::table::StringTableReader;

pub fn open(
    bytes: ByteSource,
    element: Option<&str>,
    ctx: ReaderContext,
) -> Result<StringTableReader> {
    let source = bytes.display();
    let text = String::from_utf8_lossy(&bytes.fetch_all()?).into_owned();
    let root = parse_document(&text).map_err(|e| FsqError::Data(format!("{source}: {e}")))?;

    let row_tag = match element {
        Some(name) => name.to_string(),
        None => auto_detect_row_tag(&root).ok_or_else(|| {
            FsqError::Data(format!(
                "{source}: no repeating element found; use an #xml:element selector"
            ))
        })?,
    };

    let mut elements = Vec::new();
    collect_by_tag(&root, &row_tag, &mut elements);
    if elements.is_empty() {
        return Err(FsqError::Data(format!(
            "{source}: no <{row_tag}> elements found"
        )));
    }

    // Union of columns in first-appearance order.
    let mut columns: Vec<String> = Vec::new();
    let mut raw_rows: Vec<Vec<(String, String)>> = Vec::with_capacity(elements.len());
    for el in &elements {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (k, v) in &el.attrs {
            pairs.push((format!("@{k}"), v.clone()));
        }
        for child in &el.children {
            flatten(child, None, &mut pairs);
        }
        for (name, _) in &pairs {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
        raw_rows.push(pairs);
    }
    let records = raw_rows
        .into_iter()
        .map(|pairs| {
            columns
                .iter()
                .map(|c| pairs.iter().find(|(n, _)| n == c).map(|(_, v)| v.clone()))
                .collect()
        })
        .collect();
    Ok(StringTableReader::new(source, columns, records, ctx))
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

fn flatten(el: &Element, prefix: Option<&str>, out: &mut Vec<(String, String)>) {
    let name = match prefix {
        Some(p) => format!("{p}.{}", el.name),
        None => el.name.clone(),
    };
    if el.children.is_empty() {
        out.push((name, el.text.trim().to_string()));
    } else {
        for child in &el.children {
            flatten(child, Some(&name), out);
        }
    }
}

fn collect_by_tag<'a>(el: &'a Element, tag: &str, out: &mut Vec<&'a Element>) {
    for child in &el.children {
        if child.name == tag {
            out.push(child);
        } else {
            collect_by_tag(child, tag, out);
        }
    }
}

/// Deepest level wins; within a level, the most repeated child name.
fn auto_detect_row_tag(root: &Element) -> Option<String> {
    fn walk(el: &Element, depth: usize, best: &mut Option<(usize, usize, String)>) {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for child in &el.children {
            match counts.iter_mut().find(|(n, _)| *n == child.name) {
                Some((_, c)) => *c += 1,
                None => counts.push((&child.name, 1)),
            }
        }
        for (name, count) in counts {
            if count >= 2 {
                let better = match best {
                    None => true,
                    Some((d, c, _)) => depth > *d || (depth == *d && count > *c),
                };
                if better {
                    *best = Some((depth, count, name.to_string()));
                }
            }
        }
        for child in &el.children {
            walk(child, depth + 1, best);
        }
    }
    let mut best = None;
    walk(root, 0, &mut best);
    best.map(|(_, _, name)| name)
}

/// Minimal non-validating parser: elements, attributes, text, CDATA;
/// comments, processing instructions, and doctypes are skipped.
fn parse_document(text: &str) -> std::result::Result<Element, String> {
    let mut stack: Vec<Element> = vec![Element {
        name: "#document".into(),
        ..Default::default()
    }];
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            let end = text[i..].find('<').map(|j| i + j).unwrap_or(bytes.len());
            if let Some(top) = stack.last_mut() {
                top.text.push_str(&decode_entities(&text[i..end]));
            }
            i = end;
            continue;
        }
        if text[i..].starts_with("<!--") {
            i = text[i..].find("-->").map(|j| i + j + 3).ok_or("unterminated comment")?;
        } else if text[i..].starts_with("<![CDATA[") {
            let end = text[i..].find("]]>").map(|j| i + j).ok_or("unterminated CDATA")?;
            if let Some(top) = stack.last_mut() {
                top.text.push_str(&text[i + 9..end]);
            }
            i = end + 3;
        } else if text[i..].starts_with("<?") || text[i..].starts_with("<!") {
            i = text[i..].find('>').map(|j| i + j + 1).ok_or("unterminated declaration")?;
        } else if text[i..].starts_with("</") {
            let end = text[i..].find('>').map(|j| i + j).ok_or("unterminated closing tag")?;
            let name = text[i + 2..end].trim();
            let el = stack.pop().ok_or("closing tag without opener")?;
            if el.name != name {
                return Err(format!("mismatched </{}>, expected </{}>", name, el.name));
            }
            stack
                .last_mut()
                .ok_or("closing tag after document end")?
                .children
                .push(el);
            i = end + 1;
        } else {
            let end = text[i..].find('>').map(|j| i + j).ok_or("unterminated tag")?;
            let self_closing = end > i && bytes[end - 1] == b'/';
            let inner = text[i + 1..if self_closing { end - 1 } else { end }].trim();
            let (name, attr_text) = match inner.find(char::is_whitespace) {
                Some(j) => (&inner[..j], &inner[j..]),
                None => (inner, ""),
            };
            if name.is_empty() {
                return Err("empty tag name".into());
            }
            let el = Element {
                name: name.to_string(),
                attrs: parse_attrs(attr_text),
                ..Default::default()
            };
            if self_closing {
                stack
                    .last_mut()
                    .ok_or("element after document end")?
                    .children
                    .push(el);
            } else {
                stack.push(el);
            }
            i = end + 1;
        }
    }
    let mut doc = stack.pop().ok_or("empty document")?;
    if !stack.is_empty() {
        return Err(format!("unclosed element <{}>", doc.name));
    }
    if doc.name != "#document" {
        return Err(format!("unclosed element <{}>", doc.name));
    }
    if doc.children.len() != 1 {
        return Err("document must have exactly one root element".into());
    }
    Ok(doc.children.remove(0))
}

fn parse_attrs(text: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_string();
        let after = rest[eq + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            break;
        };
        let Some(close) = after[1..].find(quote) else { break };
        let value = decode_entities(&after[1..1 + close]);
        if !key.is_empty() {
            attrs.push((key, value));
        }
        rest = after[close + 2..].trim_start();
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use fsq_common::{DataType, Row, Value};
    use tempfile::TempDir;

    const FEED: &str = r#"<?xml version="1.0"?>
<data>
  <meta><generated>2024-01-01</generated></meta>
  <record id="1">
    <name>Alice</name>
    <age>30</age>
    <address><city>NYC</city></address>
  </record>
  <record id="2">
    <name>Bob &amp; Co</name>
    <age>25</age>
    <address><city>SF</city></address>
  </record>
</data>"#;

    fn xml_source(dir: &TempDir, content: &str) -> ByteSource {
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, content).unwrap();
        ByteSource::Local(path)
    }

    #[test]
    fn explicit_element_selector() {
        let dir = TempDir::new().unwrap();
        let mut r = open(xml_source(&dir, FEED), Some("record"), ReaderContext::default()).unwrap();
        let s = r.schema().unwrap();
        assert_eq!(s.names(), vec!["@id", "name", "age", "address.city"]);
        assert_eq!(s.data_type("age"), Some(DataType::Integer));
        let rows: Vec<Row> = Box::new(r)
            .rows()
            .unwrap()
            .collect::<fsq_common::Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("@id"), Some(&Value::Integer(1)));
        assert_eq!(rows[1].get("name"), Some(&Value::Str("Bob & Co".into())));
        assert_eq!(rows[1].get("address.city"), Some(&Value::Str("SF".into())));
    }

    #[test]
    fn auto_detects_repeating_element() {
        let dir = TempDir::new().unwrap();
        let mut r = open(xml_source(&dir, FEED), None, ReaderContext::default()).unwrap();
        let s = r.schema().unwrap();
        assert!(s.contains("name"), "{:?}", s.names());
    }

    #[test]
    fn self_closing_and_cdata() {
        let doc = r#"<root><r><a><![CDATA[x & y]]></a><b/></r><r><a>z</a><b/></r></root>"#;
        let dir = TempDir::new().unwrap();
        let mut r = open(xml_source(&dir, doc), Some("r"), ReaderContext::default()).unwrap();
        r.schema().unwrap();
        let rows: Vec<Row> = Box::new(r)
            .rows()
            .unwrap()
            .collect::<fsq_common::Result<_>>()
            .unwrap();
        assert_eq!(rows[0].get("a"), Some(&Value::Str("x & y".into())));
    }

    #[test]
    fn mismatched_tags_are_a_data_error() {
        let dir = TempDir::new().unwrap();
        let r = open(
            xml_source(&dir, "<a><b></a></b>"),
            None,
            ReaderContext::default(),
        );
        assert!(r.is_err());
    }
}
