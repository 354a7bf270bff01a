//! DCM document reading
//!
//! Extracts the document view from the XML envelope: the `<HPS>` version,
//! the first `<Schema>` text, every `<Property>` pair and the first
//! `<Binary_data>` element's `<Vertices>`/`<Facets>` payloads. Everything
//! after the first match of a singleton element is ignored, matching the
//! reference reader.

use crate::error::{Error, Result};
use crate::model::{Document, Payload};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Default buffer capacity for XML parsing (4KB)
const XML_BUFFER_CAPACITY: usize = 4096;

/// Which element's text content is being captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Schema,
    Vertices,
    Facets,
}

/// Read the document view out of an XML string
pub fn read_document(xml: &str) -> Result<Document> {
    // DTD declarations can smuggle external entities; reject them outright.
    let probe = &xml.as_bytes()[..xml.len().min(2000)];
    if probe
        .windows(b"<!doctype".len())
        .any(|window| window.eq_ignore_ascii_case(b"<!doctype"))
    {
        return Err(Error::Xml("DTD declarations are not allowed".to_string()));
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut doc = Document::new();
    let mut buf = Vec::with_capacity(XML_BUFFER_CAPACITY);

    let mut capture = Capture::None;
    let mut seen_schema = false;
    let mut seen_binary_data = false;
    let mut in_binary_data = false;

    loop {
        let event = reader.read_event_into(&mut buf);
        // Self-closing elements produce no End event, so they must not arm
        // text capture.
        let has_content = matches!(event.as_ref(), Ok(Event::Start(_)));

        match event {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = e.name();
                let name = std::str::from_utf8(name.as_ref())
                    .map_err(|err| Error::Xml(err.to_string()))?
                    .to_string();

                match name.as_str() {
                    "HPS" if doc.version.is_empty() => {
                        let attrs = parse_attributes(e)?;
                        if let Some(version) = attrs.get("version") {
                            doc.version = version.clone();
                        }
                    }
                    "Schema" if !seen_schema => {
                        seen_schema = true;
                        if has_content {
                            capture = Capture::Schema;
                        }
                    }
                    "Property" => {
                        let attrs = parse_attributes(e)?;
                        if let (Some(prop_name), Some(value)) =
                            (attrs.get("name"), attrs.get("value"))
                        {
                            if !prop_name.is_empty() {
                                doc.properties.insert(prop_name.clone(), value.clone());
                            }
                        }
                    }
                    "Binary_data" if !seen_binary_data => {
                        seen_binary_data = true;
                        in_binary_data = has_content;
                    }
                    "Vertices" if in_binary_data && doc.vertices.is_none() => {
                        doc.vertices = Some(parse_payload(e, "vertex_count")?);
                        if has_content {
                            capture = Capture::Vertices;
                        }
                    }
                    "Facets" if in_binary_data && doc.facets.is_none() => {
                        doc.facets = Some(parse_payload(e, "facet_count")?);
                        if has_content {
                            capture = Capture::Facets;
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref t)) => {
                let text = t
                    .unescape()
                    .map_err(|err| Error::Xml(err.to_string()))?;
                match capture {
                    Capture::Schema => doc.schema.push_str(&text),
                    Capture::Vertices => {
                        if let Some(payload) = doc.vertices.as_mut() {
                            payload.text.push_str(&text);
                        }
                    }
                    Capture::Facets => {
                        if let Some(payload) = doc.facets.as_mut() {
                            payload.text.push_str(&text);
                        }
                    }
                    Capture::None => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.name();
                match name.as_ref() {
                    b"Schema" | b"Vertices" | b"Facets" => capture = Capture::None,
                    b"Binary_data" => in_binary_data = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(Error::Xml(err.to_string())),
        }
        buf.clear();
    }

    Ok(doc)
}

/// Read a payload element's declared metadata
fn parse_payload(e: &BytesStart, count_attr: &str) -> Result<Payload> {
    let attrs = parse_attributes(e)?;

    Ok(Payload {
        count: attrs.get(count_attr).and_then(|v| v.parse::<u32>().ok()),
        encoded_bytes: attrs
            .get("base64_encoded_bytes")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0),
        check_value: attrs.get("check_value").and_then(|v| v.parse::<u32>().ok()),
        text: String::new(),
    })
}

/// Parse attributes from an XML element into a map
fn parse_attributes(e: &BytesStart) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::with_capacity(8);

    for attr in e.attributes() {
        let attr = attr?;
        let key =
            std::str::from_utf8(attr.key.as_ref()).map_err(|err| Error::Xml(err.to_string()))?;
        let value =
            std::str::from_utf8(&attr.value).map_err(|err| Error::Xml(err.to_string()))?;
        attrs.insert(key.to_string(), value.to_string());
    }

    Ok(attrs)
}
