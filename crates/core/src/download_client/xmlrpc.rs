//! Minimal XML-RPC encoding and decoding.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlRpcValue {
    Int(i64),
    Bool(bool),
    Double(f64),
    String(String),
    Array(Vec<XmlRpcValue>),
    Struct(Vec<(String, XmlRpcValue)>),
    Nil,
}

impl XmlRpcValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            XmlRpcValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            XmlRpcValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[XmlRpcValue]> {
        match self {
            XmlRpcValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn member(&self, name: &str) -> Option<&XmlRpcValue> {
        match self {
            XmlRpcValue::Struct(members) => members.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    fn encode(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            XmlRpcValue::Int(i) => out.push_str(&format!("<i8>{}</i8>", i)),
            XmlRpcValue::Bool(b) => out.push_str(&format!("<boolean>{}</boolean>", u8::from(*b))),
            XmlRpcValue::Double(d) => out.push_str(&format!("<double>{}</double>", d)),
            XmlRpcValue::String(s) => out.push_str(&format!("<string>{}</string>", escape(s.as_str()))),
            XmlRpcValue::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.encode(out);
                }
                out.push_str("</data></array>");
            }
            XmlRpcValue::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str(&format!("<member><name>{}</name>", escape(name.as_str())));
                    value.encode(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            XmlRpcValue::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }
}

impl From<&str> for XmlRpcValue {
    fn from(s: &str) -> Self {
        XmlRpcValue::String(s.to_string())
    }
}

impl From<String> for XmlRpcValue {
    fn from(s: String) -> Self {
        XmlRpcValue::String(s)
    }
}

/// How a response failed to yield a value.
#[derive(Debug, PartialEq)]
pub enum ResponseError {
    Fault { code: i64, message: String },
    Malformed(String),
}

pub fn encode_call(method: &str, params: &[XmlRpcValue]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        param.encode(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn parse_tree(xml: &str) -> Result<Node, ResponseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = vec![Node::default()];
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(Node {
                name: String::from_utf8_lossy(e.local_name().as_ref()).to_string(),
                ..Node::default()
            }),
            Ok(Event::Empty(e)) => {
                let node = Node {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).to_string(),
                    ..Node::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| ResponseError::Malformed(err.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| ResponseError::Malformed("unbalanced tags".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => return Err(ResponseError::Malformed("unbalanced tags".to_string())),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ResponseError::Malformed(e.to_string())),
        }
    }

    if stack.len() != 1 {
        return Err(ResponseError::Malformed("unclosed element".to_string()));
    }
    stack
        .pop()
        .and_then(|root| root.children.into_iter().next())
        .ok_or_else(|| ResponseError::Malformed("empty document".to_string()))
}

fn decode_value(node: &Node) -> Result<XmlRpcValue, ResponseError> {
    let Some(typed) = node.children.first() else {
        // untyped <value> is a string
        return Ok(XmlRpcValue::String(node.text.clone()));
    };
    let bad = |what: &str| ResponseError::Malformed(format!("bad {}: {}", what, typed.text));

    Ok(match typed.name.as_str() {
        "i4" | "i8" | "int" => XmlRpcValue::Int(typed.text.trim().parse().map_err(|_| bad("int"))?),
        "boolean" => XmlRpcValue::Bool(typed.text.trim() == "1"),
        "double" => XmlRpcValue::Double(typed.text.trim().parse().map_err(|_| bad("double"))?),
        "string" | "base64" | "dateTime.iso8601" => XmlRpcValue::String(typed.text.clone()),
        "nil" => XmlRpcValue::Nil,
        "array" => {
            let values = typed
                .child("data")
                .map(|data| data.children.iter().filter(|c| c.name == "value").collect::<Vec<_>>())
                .unwrap_or_default();
            XmlRpcValue::Array(values.into_iter().map(decode_value).collect::<Result<_, _>>()?)
        }
        "struct" => {
            let mut members = Vec::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.child("name").map(|n| n.text.clone()).unwrap_or_default();
                let value = member
                    .child("value")
                    .ok_or_else(|| ResponseError::Malformed(format!("member {} has no value", name)))?;
                members.push((name, decode_value(value)?));
            }
            XmlRpcValue::Struct(members)
        }
        other => return Err(ResponseError::Malformed(format!("unknown type {}", other))),
    })
}

/// Decode a `methodResponse` into its single value or its fault.
pub fn parse_response(xml: &str) -> Result<XmlRpcValue, ResponseError> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(ResponseError::Malformed(format!("unexpected root <{}>", root.name)));
    }

    if let Some(fault) = root.child("fault") {
        let value = fault
            .child("value")
            .map(decode_value)
            .transpose()?
            .unwrap_or(XmlRpcValue::Nil);
        return Err(ResponseError::Fault {
            code: value.member("faultCode").and_then(XmlRpcValue::as_i64).unwrap_or(0),
            message: value
                .member("faultString")
                .and_then(XmlRpcValue::as_str)
                .unwrap_or("unknown fault")
                .to_string(),
        });
    }

    root.child("params")
        .and_then(|p| p.child("param"))
        .and_then(|p| p.child("value"))
        .map(decode_value)
        .unwrap_or(Ok(XmlRpcValue::Nil))
}
