//! Response parsing and classification.
//!
//! Every response body is run through [`classify`] exactly once. Well-formed
//! XML becomes an [`XmlNode`] tree, anything else is handed back untouched as
//! raw bytes, and a document whose root has an `Error` child becomes a
//! [`ServiceError`].

use std::borrow::Cow;

use quick_xml::escape::escape;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{ErrorType, ServiceError};

/// Why a body could not be read as a single XML document
#[derive(Error, Debug)]
pub enum XmlParseError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("Invalid XML attribute: {0}")]
    Attribute(#[from] AttrError),
    #[error("Malformed XML document: {0}")]
    Structure(&'static str),
}

/// One element of a parsed XML document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlNode {
    /// Local name, without namespace prefix
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Concatenated character data directly under this element
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// Parses a complete document and returns its root element.
    ///
    /// # Errors
    ///
    /// Fails on syntax errors, on documents without a root element, with more
    /// than one root, with unclosed elements or with text outside the root.
    pub fn parse(body: &[u8]) -> Result<XmlNode, XmlParseError> {
        let mut reader = Reader::from_reader(body);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;
        let mut buf = Vec::new();

        loop {
            let event = reader.read_event_into(&mut buf)?;
            match event {
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(XmlParseError::Structure("more than one root element"));
                    }
                    stack.push(node_from_start(&reader, &start)?);
                }
                Event::Empty(start) => {
                    if root.is_some() {
                        return Err(XmlParseError::Structure("more than one root element"));
                    }
                    let node = node_from_start(&reader, &start)?;
                    attach(&mut stack, &mut root, node);
                }
                Event::End(_) => {
                    let mut node = stack
                        .pop()
                        .ok_or(XmlParseError::Structure("closing tag without opening tag"))?;
                    if !node.children.is_empty() && node.text.trim().is_empty() {
                        node.text.clear();
                    }
                    attach(&mut stack, &mut root, node);
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    append_text(&mut stack, &text)?;
                }
                Event::CData(data) => {
                    let data = data.into_inner();
                    let text = reader.decoder().decode(&data)?;
                    append_text(&mut stack, &text)?;
                }
                Event::Eof => break,
                // declarations, comments, processing instructions, doctype
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(XmlParseError::Structure("unclosed element"));
        }
        root.ok_or(XmlParseError::Structure("no root element"))
    }

    /// First direct child called `name`
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Text of the first direct child called `name`
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|child| child.text.as_str())
    }

    /// Follows `path` through first-match children, e.g. `["Error", "Code"]`.
    pub fn find(&self, path: &[&str]) -> Option<&XmlNode> {
        path.iter()
            .try_fold(self, |node, name| node.child(name))
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Serializes the element back to XML, escaping text and attribute values.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.text.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape(self.text.as_str()));
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Converts the element into a JSON value.
    ///
    /// A plain leaf becomes its text. Otherwise the result is an object with
    /// attributes under `@attributes`, text under `#text`, and one key per
    /// child name; repeated children are collected into an array.
    pub fn to_json(&self) -> Value {
        if self.attributes.is_empty() && self.children.is_empty() {
            return Value::String(self.text.clone());
        }

        let mut object = Map::new();
        if !self.attributes.is_empty() {
            let attributes = self
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            object.insert("@attributes".to_string(), Value::Object(attributes));
        }
        if !self.text.is_empty() {
            object.insert("#text".to_string(), Value::String(self.text.clone()));
        }
        for child in &self.children {
            let value = child.to_json();
            match object.get_mut(&child.name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    object.insert(child.name.clone(), value);
                }
            }
        }
        Value::Object(object)
    }
}

fn node_from_start(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<XmlNode, XmlParseError> {
    let local_name = start.local_name();
    let name = reader.decoder().decode(local_name.as_ref())?;
    let mut node = XmlNode::new(name);
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = reader.decoder().decode(attribute.key.as_ref())?;
        let value = attribute.decode_and_unescape_value(reader)?;
        node.attributes.push((key.into_owned(), value.into_owned()));
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

/// Text is kept as written, except whitespace-only runs next to child
/// elements, which are indentation.
fn append_text(stack: &mut [XmlNode], text: &str) -> Result<(), XmlParseError> {
    match stack.last_mut() {
        Some(node) if !node.children.is_empty() && text.trim().is_empty() => Ok(()),
        Some(node) => {
            node.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlParseError::Structure("text outside the root element")),
    }
}

/// Successful response content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Well-formed XML document
    Xml(XmlNode),
    /// Body that is not XML (reports, flat files, empty bodies), byte for byte
    Raw(Vec<u8>),
}

impl Payload {
    pub fn as_xml(&self) -> Option<&XmlNode> {
        match self {
            Payload::Xml(node) => Some(node),
            Payload::Raw(_) => None,
        }
    }

    pub fn into_xml(self) -> Option<XmlNode> {
        match self {
            Payload::Xml(node) => Some(node),
            Payload::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Payload::Raw(bytes) => Some(bytes),
            Payload::Xml(_) => None,
        }
    }

    /// Raw body as text, replacing invalid UTF-8
    pub fn raw_text(&self) -> Option<Cow<'_, str>> {
        self.as_raw().map(String::from_utf8_lossy)
    }
}

/// Decides whether a response body is a success payload or a service error.
///
/// A body that does not parse as XML is a success carrying the raw bytes.
/// Documents are decoded using the encoding named in their XML declaration
/// (UTF-8 when there is none); bytes invalid in that encoding make the body raw.
/// A parsed document whose root has an `Error` child is a service error; the
/// response headers are attached to it.
pub fn classify(body: &[u8], headers: &HeaderMap) -> Result<Payload, ServiceError> {
    let root = match XmlNode::parse(body) {
        Ok(root) => root,
        Err(err) => {
            tracing::debug!("Response body is not XML ({}), returning raw payload", err);
            return Ok(Payload::Raw(body.to_vec()));
        }
    };

    match root.child("Error") {
        Some(error) => Err(service_error(&root, error, headers)),
        None => Ok(Payload::Xml(root)),
    }
}

fn service_error(root: &XmlNode, error: &XmlNode, headers: &HeaderMap) -> ServiceError {
    let message = match error.child_text("Message") {
        Some(message) => message.to_string(),
        None => {
            tracing::warn!("Service error payload has no Message element");
            String::new()
        }
    };
    let error_type = error
        .child_text("Type")
        .and_then(|t| t.parse::<ErrorType>().ok());

    ServiceError::new(
        message,
        error_type,
        error.child_text("Code").map(str::to_string),
        root.child_text("RequestID").map(str::to_string),
        headers.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    const ERROR_BODY: &str = "<ErrorResponse><Error><Code>X</Code><Message>bad</Message></Error><RequestID>1</RequestID></ErrorResponse>";

    #[test]
    fn test_error_response_becomes_service_error() {
        let mut headers = HeaderMap::new();
        headers.insert("x-mws-request-id", HeaderValue::from_static("1"));

        let err = classify(ERROR_BODY.as_bytes(), &headers).unwrap_err();
        assert_eq!(err.message(), "bad");
        assert_eq!(err.code(), Some("X"));
        assert_eq!(err.request_id(), Some("1"));
        assert_eq!(err.error_type(), None);
        assert_eq!(err.headers()["x-mws-request-id"], "1");
    }

    #[test]
    fn test_error_type_is_read() {
        let body = r#"<?xml version="1.0"?>
<ErrorResponse xmlns="https://mws.amazonservices.com/Orders/2013-09-01">
  <Error>
    <Type>Sender</Type>
    <Code>InvalidParameterValue</Code>
    <Message>CreatedAfter date is in the future</Message>
  </Error>
  <RequestID>e71f72f3-1e3b-4e0c-9a3b-0f0e9a4d8e54</RequestID>
</ErrorResponse>"#;
        let err = classify(body.as_bytes(), &HeaderMap::new()).unwrap_err();
        assert_eq!(err.error_type(), Some(ErrorType::Sender));
        assert_eq!(err.code(), Some("InvalidParameterValue"));
        assert_eq!(err.message(), "CreatedAfter date is in the future");
        assert_eq!(err.request_id(), Some("e71f72f3-1e3b-4e0c-9a3b-0f0e9a4d8e54"));
    }

    #[test]
    fn test_error_without_message_has_empty_message() {
        let body = "<ErrorResponse><Error><Code>QuotaExceeded</Code></Error></ErrorResponse>";
        let err = classify(body.as_bytes(), &HeaderMap::new()).unwrap_err();
        assert_eq!(err.message(), "");
        assert_eq!(err.code(), Some("QuotaExceeded"));
        assert_eq!(err.request_id(), None);
    }

    #[test]
    fn test_non_xml_bodies_are_raw_success() {
        let bodies: [&[u8]; 4] = [b"", b"plain text", b"OrderId\tStatus\n123\tShipped\n", b"<unclosed>"];
        for body in bodies {
            let payload = classify(body, &HeaderMap::new()).unwrap();
            assert_eq!(payload, Payload::Raw(body.to_vec()));
        }
    }

    #[test]
    fn test_success_document_is_parsed() {
        let body = r#"<?xml version="1.0"?>
<GetServiceStatusResponse xmlns="https://mws.amazonservices.com/Orders/2013-09-01">
  <GetServiceStatusResult>
    <Status>GREEN</Status>
    <Timestamp>2024-01-01T11:00:00.000Z</Timestamp>
  </GetServiceStatusResult>
  <ResponseMetadata><RequestId>abc</RequestId></ResponseMetadata>
</GetServiceStatusResponse>"#;
        let payload = classify(body.as_bytes(), &HeaderMap::new()).unwrap();
        let root = payload.as_xml().unwrap();
        assert_eq!(root.name, "GetServiceStatusResponse");
        assert_eq!(
            root.attribute("xmlns"),
            Some("https://mws.amazonservices.com/Orders/2013-09-01")
        );
        assert_eq!(
            root.find(&["GetServiceStatusResult", "Status"]).map(|n| n.text.as_str()),
            Some("GREEN")
        );
        assert_eq!(
            root.find(&["ResponseMetadata", "RequestId"]).map(|n| n.text.as_str()),
            Some("abc")
        );
    }

    #[test]
    fn test_nested_error_element_is_not_a_service_error() {
        let body = "<Result><Item><Error>partial</Error></Item></Result>";
        let payload = classify(body.as_bytes(), &HeaderMap::new()).unwrap();
        assert!(payload.as_xml().is_some());
    }

    #[test]
    fn test_round_trip_through_xml() {
        let tree = XmlNode::new("ListOrdersResponse")
            .with_attribute("xmlns", "https://mws.amazonservices.com/Orders/2013-09-01")
            .with_child(
                XmlNode::new("ListOrdersResult")
                    .with_child(
                        XmlNode::new("Orders")
                            .with_child(XmlNode::new("Order").with_child(
                                XmlNode::new("AmazonOrderId").with_text("902-3159896-1390916"),
                            ))
                            .with_child(XmlNode::new("Order").with_child(
                                XmlNode::new("BuyerName").with_text("Jane & \"Co\" <Ltd>"),
                            )),
                    )
                    .with_child(XmlNode::new("NextToken")),
            );

        let payload = classify(tree.to_xml().as_bytes(), &HeaderMap::new()).unwrap();
        assert_eq!(payload.into_xml(), Some(tree));
    }

    #[test]
    fn test_padded_text_round_trips() {
        let tree = XmlNode::new("R")
            .with_child(XmlNode::new("Note").with_text("  two  spaces "))
            .with_child(XmlNode::new("Message").with_text(" "))
            .with_child(XmlNode::new("Line").with_text("\n tail\n"));

        let payload = classify(tree.to_xml().as_bytes(), &HeaderMap::new()).unwrap();
        assert_eq!(payload.into_xml(), Some(tree));
    }

    #[test]
    fn test_indentation_between_children_is_dropped() {
        let root = XmlNode::parse(b"<R>\n  <A> a </A>\n  <B/>\n</R>").unwrap();
        assert_eq!(root.text, "");
        assert_eq!(root.child_text("A"), Some(" a "));
        assert_eq!(root.child_text("B"), Some(""));

        let mixed = XmlNode::parse(b"<R>lead <A/> </R>").unwrap();
        assert_eq!(mixed.text, "lead ");
    }

    #[test]
    fn test_declared_latin1_document_is_parsed() {
        let body = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><Item name=\"Caf\xe9\"><Title>Cr\xe8me</Title></Item>";
        let root = classify(body, &HeaderMap::new()).unwrap().into_xml().unwrap();
        assert_eq!(root.attribute("name"), Some("Caf\u{e9}"));
        assert_eq!(root.child_text("Title"), Some("Cr\u{e8}me"));
    }

    #[test]
    fn test_cdata_is_text() {
        let root = XmlNode::parse(b"<Feed><![CDATA[a < b]]></Feed>").unwrap();
        assert_eq!(root.text, "a < b");
    }

    #[test]
    fn test_structural_errors() {
        assert!(XmlNode::parse(b"<a/><b/>").is_err());
        assert!(XmlNode::parse(b"<a><b></a>").is_err());
        assert!(XmlNode::parse(b"text<a/>").is_err());
        assert!(XmlNode::parse(b"   ").is_err());
    }

    #[test]
    fn test_to_json_groups_repeated_children() {
        let root = XmlNode::parse(
            b"<Orders count=\"2\"><Order><Id>1</Id></Order><Order><Id>2</Id></Order><Next>t</Next></Orders>",
        )
        .unwrap();
        let json = root.to_json();
        assert_eq!(json["@attributes"]["count"], "2");
        assert_eq!(json["Order"][0]["Id"], "1");
        assert_eq!(json["Order"][1]["Id"], "2");
        assert_eq!(json["Next"], "t");
    }

    #[test]
    fn test_raw_text() {
        let payload = Payload::Raw(b"report".to_vec());
        assert_eq!(payload.raw_text().as_deref(), Some("report"));
        assert!(payload.as_xml().is_none());
    }
}
