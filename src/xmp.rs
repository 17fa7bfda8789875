//! XMP packets, read as a plain element tree for scanning.
//!
//! No RDF semantics are applied: every element becomes a key, repeated
//! siblings become a list, attributes (other than namespace declarations) become
//! entries of their element. That is enough to find text anywhere in a packet.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::metadata::{Fields, MetaValue};

/// PNG iTXt keyword carrying an XMP packet.
pub const PNG_XMP_KEYWORD: &str = "XML:com.adobe.xmp";

const PACKET_START: &[u8] = b"<x:xmpmeta";
const PACKET_END: &[u8] = b"</x:xmpmeta>";

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Locate an `<x:xmpmeta>` packet anywhere in a byte buffer.
pub fn find_packet(bytes: &[u8]) -> Option<&[u8]> {
    let start = find(bytes, PACKET_START)?;
    let len = find(&bytes[start..], PACKET_END)? + PACKET_END.len();
    Some(&bytes[start..start + len])
}

#[derive(Default)]
struct Node {
    children: BTreeMap<String, MetaValue>,
    text: String,
}

impl Node {
    fn open(e: &BytesStart<'_>) -> (String, Node) {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut node = Node::default();
        for attr in e.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            if let Ok(value) = attr.unescape_value() {
                node.add(key, MetaValue::Text(value.into_owned()));
            }
        }
        (name, node)
    }

    fn add(&mut self, key: String, value: MetaValue) {
        match self.children.remove(&key) {
            None => {
                self.children.insert(key, value);
            }
            Some(MetaValue::List(mut items)) => {
                items.push(value);
                self.children.insert(key, MetaValue::List(items));
            }
            Some(previous) => {
                self.children.insert(key, MetaValue::List(vec![previous, value]));
            }
        }
    }

    fn into_value(mut self) -> MetaValue {
        if self.children.is_empty() {
            return MetaValue::Text(self.text);
        }
        if !self.text.is_empty() {
            self.children.insert("#text".to_string(), MetaValue::Text(self.text));
        }
        MetaValue::Tree(self.children)
    }
}

/// Parse a packet into a field map keyed by top-level element name.
///
/// A packet that is not well-formed XML is kept whole as a single `packet`
/// string so it can still be scanned.
pub fn parse(packet: &[u8]) -> Fields {
    match parse_tree(packet) {
        Some(fields) => fields,
        None => {
            log::debug!("XMP packet is not well-formed; keeping it as raw text");
            let mut fields = Fields::new();
            fields.insert(
                "packet".to_string(),
                MetaValue::Text(String::from_utf8_lossy(packet).into_owned()),
            );
            fields
        }
    }
}

fn parse_tree(packet: &[u8]) -> Option<Fields> {
    let mut reader = Reader::from_reader(packet);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<(String, Node)> = vec![(String::new(), Node::default())];

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => stack.push(Node::open(e)),
            Ok(Event::Empty(ref e)) => {
                let (name, node) = Node::open(e);
                stack.last_mut()?.1.add(name, node.into_value());
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().ok()?;
                stack.last_mut()?.1.text.push_str(&text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                stack.last_mut()?.1.text.push_str(&text);
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return None;
                }
                let (name, node) = stack.pop()?;
                stack.last_mut()?.1.add(name, node.into_value());
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return None;
    }
    let (_, root) = stack.pop()?;
    Some(root.children)
}
