//! YAML decoding and encoding.
//!
//! Decoding drives the `saphyr-parser` event stream directly so that aliases
//! and extra documents can be refused with explicit errors. Plain scalars are
//! resolved with the YAML 1.2 core schema plus RFC 3339 timestamps; quoted
//! and block scalars are always strings.
//!
//! Encoding writes block style with keys in insertion order. A string is
//! written plain only when the resolver above would read the same text back
//! as that string; anything else is double-quoted, so strings that look like
//! numbers, booleans or timestamps keep their type across a round trip.

use chrono::{DateTime, SecondsFormat};
use saphyr_parser::{Event, Parser, ScalarStyle};

use khist_node::{MapNode, Node, Scalar};

use crate::error::{CodecError, CodecResult};

/// Parse exactly one YAML document into a node tree.
///
/// An empty stream decodes to a null scalar.
pub fn from_yaml_str(text: &str) -> CodecResult<Node> {
    let mut builder = TreeBuilder::default();
    let mut documents = 0usize;

    for item in Parser::new_from_str(text) {
        let (event, _) = item.map_err(|e| CodecError::Yaml(e.to_string()))?;
        match event {
            Event::DocumentStart { .. } => {
                documents += 1;
                if documents > 1 {
                    return Err(CodecError::MultipleDocuments);
                }
            }
            Event::Alias(anchor) => return Err(CodecError::AliasNotSupported { anchor }),
            Event::Scalar(value, style, _, tag) => {
                let explicit_str = tag.as_ref().is_some_and(|t| t.suffix == "str");
                let raw: &str = &value;
                let scalar = if explicit_str || !matches!(style, ScalarStyle::Plain) {
                    Scalar::String(raw.to_string())
                } else {
                    resolve_plain(raw)
                };
                builder.scalar(raw, scalar)?;
            }
            Event::SequenceStart(..) => builder.open(Frame::Sequence(Vec::new())),
            Event::MappingStart(..) => builder.open(Frame::Map {
                map: MapNode::new(),
                pending_key: None,
            }),
            Event::SequenceEnd | Event::MappingEnd => builder.close()?,
            _ => {}
        }
    }

    Ok(builder.finish().unwrap_or_else(Node::null))
}

/// Render a node tree as a block-style YAML document.
pub fn to_yaml_string(node: &Node) -> CodecResult<String> {
    let mut out = String::new();
    match node {
        Node::Map(map) if !map.is_empty() => write_map(&mut out, map, 0, false),
        Node::Sequence(items) if !items.is_empty() => write_sequence(&mut out, items, 0, false),
        other => {
            out.push_str(&inline_text(other));
            out.push('\n');
        }
    }
    Ok(out)
}

/// Write map entries at `indent`. With `inline_first` the first entry
/// continues the current line, as after a sequence dash.
fn write_map(out: &mut String, map: &MapNode, indent: usize, inline_first: bool) {
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 || !inline_first {
            push_indent(out, indent);
        }
        out.push_str(&string_text(key));
        out.push(':');
        match value {
            Node::Map(inner) if !inner.is_empty() => {
                out.push('\n');
                write_map(out, inner, indent + 2, false);
            }
            Node::Sequence(items) if !items.is_empty() => {
                out.push('\n');
                write_sequence(out, items, indent, false);
            }
            other => {
                out.push(' ');
                out.push_str(&inline_text(other));
                out.push('\n');
            }
        }
    }
}

fn write_sequence(out: &mut String, items: &[Node], indent: usize, inline_first: bool) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 || !inline_first {
            push_indent(out, indent);
        }
        out.push_str("- ");
        match item {
            Node::Map(inner) if !inner.is_empty() => write_map(out, inner, indent + 2, true),
            Node::Sequence(inner) if !inner.is_empty() => {
                write_sequence(out, inner, indent + 2, true)
            }
            other => {
                out.push_str(&inline_text(other));
                out.push('\n');
            }
        }
    }
}

fn push_indent(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

/// Single-line text of a scalar or an empty collection.
fn inline_text(node: &Node) -> String {
    match node {
        Node::Scalar(scalar) => scalar_text(scalar),
        Node::Sequence(_) => "[]".to_string(),
        Node::Map(_) => "{}".to_string(),
    }
}

fn scalar_text(scalar: &Scalar) -> String {
    match scalar {
        Scalar::Null => "null".to_string(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) if f.is_nan() => ".nan".to_string(),
        Scalar::Float(f) if f.is_infinite() && *f > 0.0 => ".inf".to_string(),
        Scalar::Float(f) if f.is_infinite() => "-.inf".to_string(),
        // Debug keeps a fractional part or exponent, so the text stays a float.
        Scalar::Float(f) => format!("{f:?}"),
        Scalar::String(s) => string_text(s),
        Scalar::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    }
}

fn string_text(s: &str) -> String {
    if is_plain_safe(s) {
        s.to_string()
    } else {
        double_quoted(s)
    }
}

/// Whether `s` can be written as a plain scalar and read back as the same
/// string.
fn is_plain_safe(s: &str) -> bool {
    if s.is_empty() || s.trim() != s || s.starts_with("---") || s.starts_with("...") {
        return false;
    }
    let leading_ok = match s.as_bytes() {
        [b'-' | b'?' | b':', next, ..] => !next.is_ascii_whitespace(),
        [first, ..] => !b"-?:,[]{}#&*!|>'\"%@`".contains(first),
        [] => false,
    };
    leading_ok
        && !s.contains(": ")
        && !s.contains(" #")
        && !s.ends_with(':')
        && !s.chars().any(char::is_control)
        && matches!(resolve_plain(s), Scalar::String(_))
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

enum Frame {
    Sequence(Vec<Node>),
    Map {
        map: MapNode,
        pending_key: Option<String>,
    },
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
    root: Option<Node>,
}

impl TreeBuilder {
    fn open(&mut self, frame: Frame) {
        self.stack.push(frame);
    }

    fn close(&mut self) -> CodecResult<()> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| CodecError::Yaml("unbalanced collection end".into()))?;
        let node = match frame {
            Frame::Sequence(items) => Node::Sequence(items),
            Frame::Map { map, pending_key } => {
                if pending_key.is_some() {
                    return Err(CodecError::Yaml("mapping ended after a key".into()));
                }
                Node::Map(map)
            }
        };
        self.value(None, node)
    }

    fn scalar(&mut self, raw: &str, scalar: Scalar) -> CodecResult<()> {
        self.value(Some(raw), Node::Scalar(scalar))
    }

    /// Attach a completed node to the innermost open collection. `raw` is the
    /// source text for scalars, used verbatim when the node lands in key
    /// position.
    fn value(&mut self, raw: Option<&str>, node: Node) -> CodecResult<()> {
        match self.stack.last_mut() {
            None => {
                self.root = Some(node);
                Ok(())
            }
            Some(Frame::Sequence(items)) => {
                items.push(node);
                Ok(())
            }
            Some(Frame::Map { map, pending_key }) => match pending_key.take() {
                Some(key) => {
                    map.insert(key, node);
                    Ok(())
                }
                None => {
                    let key = raw.ok_or(CodecError::NonScalarKey)?;
                    if map.contains_key(key) {
                        return Err(CodecError::DuplicateKey {
                            key: key.to_string(),
                        });
                    }
                    *pending_key = Some(key.to_string());
                    Ok(())
                }
            },
        }
    }

    fn finish(self) -> Option<Node> {
        self.root
    }
}

/// Core-schema resolution of a plain scalar.
fn resolve_plain(raw: &str) -> Scalar {
    match raw {
        "" | "~" | "null" | "Null" | "NULL" => return Scalar::Null,
        "true" | "True" | "TRUE" => return Scalar::Bool(true),
        "false" | "False" | "FALSE" => return Scalar::Bool(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return Scalar::Float(f64::INFINITY);
        }
        "-.inf" | "-.Inf" | "-.INF" => return Scalar::Float(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return Scalar::Float(f64::NAN),
        _ => {}
    }

    if let Some(int) = parse_int(raw) {
        return int;
    }
    if looks_like_float(raw) {
        if let Ok(f) = raw.parse::<f64>() {
            return Scalar::Float(f);
        }
    }
    if raw.len() >= 20 && raw.as_bytes()[4] == b'-' {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Scalar::Timestamp(ts);
        }
    }
    Scalar::String(raw.to_string())
}

fn parse_int(raw: &str) -> Option<Scalar> {
    // `from_str_radix` accepts a sign, which the core schema does not allow
    // after the prefix.
    if let Some(hex) = raw.strip_prefix("0x") {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        return i64::from_str_radix(hex, 16).ok().map(Scalar::Int);
    }
    if let Some(oct) = raw.strip_prefix("0o") {
        if oct.is_empty() || !oct.bytes().all(|b| matches!(b, b'0'..=b'7')) {
            return None;
        }
        return i64::from_str_radix(oct, 8).ok().map(Scalar::Int);
    }
    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match raw.parse::<i64>() {
        Ok(i) => Some(Scalar::Int(i)),
        Err(_) => raw.parse::<f64>().ok().map(Scalar::Float),
    }
}

/// `[-+]? ( \. [0-9]+ | [0-9]+ ( \. [0-9]* )? ) ( [eE] [-+]? [0-9]+ )?`
fn looks_like_float(raw: &str) -> bool {
    let body = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    let mut parts = mantissa.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let frac = parts.next();
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    let mantissa_ok = match frac {
        Some(frac) => {
            all_digits(whole) && all_digits(frac) && (!whole.is_empty() || !frac.is_empty())
        }
        None => !whole.is_empty() && all_digits(whole),
    };
    let exponent_ok = match exponent {
        Some(exp) => {
            let exp = exp.strip_prefix(['-', '+']).unwrap_or(exp);
            !exp.is_empty() && all_digits(exp)
        }
        None => true,
    };

    mantissa_ok && exponent_ok && (frac.is_some() || exponent.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use khist_node::NodeType;

    #[test]
    fn decodes_nested_document_in_order() {
        let node = from_yaml_str(
            "metadata:\n  name: web\n  labels:\n    b: \"2\"\n    a: x\nspec:\n  replicas: 3\n  ports: [80, 443]\n",
        )
        .unwrap();
        let keys: Vec<&str> = node.as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["metadata", "spec"]);

        let labels = node.get("metadata").unwrap().get("labels").unwrap();
        assert_eq!(labels.as_map().unwrap().keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(labels.get("b"), Some(&Node::from("2")));

        let spec = node.get("spec").unwrap();
        assert_eq!(spec.get("replicas"), Some(&Node::from(3i64)));
        assert_eq!(spec.get("ports").unwrap().node_type(), NodeType::Sequence);
    }

    #[test]
    fn resolves_core_schema_scalars() {
        assert_eq!(resolve_plain("~"), Scalar::Null);
        assert_eq!(resolve_plain("True"), Scalar::Bool(true));
        assert_eq!(resolve_plain("-12"), Scalar::Int(-12));
        assert_eq!(resolve_plain("0x1f"), Scalar::Int(31));
        assert_eq!(resolve_plain("0o17"), Scalar::Int(15));
        assert_eq!(resolve_plain("1.5"), Scalar::Float(1.5));
        assert_eq!(resolve_plain("1e3"), Scalar::Float(1000.0));
        assert_eq!(resolve_plain(".5"), Scalar::Float(0.5));
        assert_eq!(resolve_plain("-.inf"), Scalar::Float(f64::NEG_INFINITY));
        assert_eq!(resolve_plain("yes"), Scalar::String("yes".into()));
        assert_eq!(resolve_plain("inf"), Scalar::String("inf".into()));
        assert_eq!(resolve_plain("1.2.3"), Scalar::String("1.2.3".into()));
        assert_eq!(resolve_plain("10Gi"), Scalar::String("10Gi".into()));
        assert!(matches!(
            resolve_plain("2024-01-02T03:04:05Z"),
            Scalar::Timestamp(_)
        ));
    }

    #[test]
    fn radix_prefixes_take_no_sign() {
        assert_eq!(resolve_plain("0x-1"), Scalar::String("0x-1".into()));
        assert_eq!(resolve_plain("0x+a"), Scalar::String("0x+a".into()));
        assert_eq!(resolve_plain("0o-7"), Scalar::String("0o-7".into()));
        assert_eq!(resolve_plain("0o8"), Scalar::String("0o8".into()));
        assert_eq!(resolve_plain("0x"), Scalar::String("0x".into()));
    }

    #[test]
    fn quoted_scalars_stay_strings() {
        let node = from_yaml_str("a: 'true'\nb: \"42\"\nc: !!str 7\n").unwrap();
        assert_eq!(node.get("a"), Some(&Node::from("true")));
        assert_eq!(node.get("b"), Some(&Node::from("42")));
        assert_eq!(node.get("c"), Some(&Node::from("7")));
    }

    #[test]
    fn keys_use_source_text() {
        let node = from_yaml_str("1: one\ntrue: yes\n").unwrap();
        let keys: Vec<&str> = node.as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["1", "true"]);
    }

    #[test]
    fn rejects_multiple_documents() {
        let err = from_yaml_str("a: 1\n---\nb: 2\n").unwrap_err();
        assert_eq!(err, CodecError::MultipleDocuments);
    }

    #[test]
    fn rejects_aliases() {
        let err = from_yaml_str("base: &b {x: 1}\ncopy: *b\n").unwrap_err();
        assert!(matches!(err, CodecError::AliasNotSupported { .. }));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = from_yaml_str("a: 1\na: 2\n").unwrap_err();
        assert_eq!(err, CodecError::DuplicateKey { key: "a".into() });
    }

    #[test]
    fn rejects_complex_keys() {
        let err = from_yaml_str("? [a, b]\n: c\n").unwrap_err();
        assert_eq!(err, CodecError::NonScalarKey);
    }

    #[test]
    fn malformed_input_is_an_error() {
        assert!(matches!(
            from_yaml_str("a: [1, 2\n"),
            Err(CodecError::Yaml(_))
        ));
    }

    #[test]
    fn empty_stream_is_null() {
        assert_eq!(from_yaml_str("").unwrap(), Node::null());
    }

    #[test]
    fn round_trip_through_emitter() {
        let text = "kind: Pod\nmetadata:\n  name: web\nspec:\n  replicas: 2\n  enabled: true\n  nothing: null\n  args:\n  - --a\n  - --b\n";
        let node = from_yaml_str(text).unwrap();
        let emitted = to_yaml_string(&node).unwrap();
        assert_eq!(from_yaml_str(&emitted).unwrap(), node);
        assert!(emitted.starts_with("kind: Pod\n"));
        assert!(emitted.contains("nothing: null"));
    }

    #[test]
    fn emitter_layout() {
        let text = "spec:\n  containers:\n  - name: app\n    args:\n    - --a\n  - name: side\n  empty: {}\n  none: []\n";
        assert_eq!(to_yaml_string(&from_yaml_str(text).unwrap()).unwrap(), text);

        let nested = "- - a\n  - b\n- c\n";
        assert_eq!(to_yaml_string(&from_yaml_str(nested).unwrap()).unwrap(), nested);
        assert_eq!(to_yaml_string(&Node::from(1.0)).unwrap(), "1.0\n");
    }

    #[test]
    fn lookalike_strings_keep_their_type() {
        let texts = [
            "2024-01-02T03:04:05Z",
            "2024-01-02T03:04:05.120000+02:00",
            "0x-1",
            "0x1f",
            "true",
            "null",
            "1e3",
            ".nan",
            "",
            " padded",
            "a: b",
            "- item",
            "#note",
            "key:",
            "it's \"quoted\"",
            "line\nbreak\ttab",
            "---",
        ];
        for text in texts {
            let node = Node::Map(std::iter::once((text.to_string(), Node::string(text))).collect());
            let emitted = to_yaml_string(&node).unwrap();
            assert_eq!(from_yaml_str(&emitted).unwrap(), node, "{emitted}");
        }
    }

    #[test]
    fn json_manifest_survives_yaml() {
        let node = crate::from_json_str(
            r#"{"metadata":{"creationTimestamp":"2024-05-01T10:00:00.123456Z","annotations":{"a":"1.0","b":"null"}},"spec":{"replicas":3,"ratio":1.0,"args":["--x","yes"]}}"#,
        )
        .unwrap();
        let emitted = to_yaml_string(&node).unwrap();
        assert!(emitted.contains("creationTimestamp: \"2024-05-01T10:00:00.123456Z\"\n"));
        assert_eq!(from_yaml_str(&emitted).unwrap(), node);
    }

    #[test]
    fn output_reads_back_with_serde_yaml() {
        let node = from_yaml_str("created: '2024-01-02T03:04:05Z'\nport: \"8080\"\nitems:\n- {name: a}\n").unwrap();
        let emitted = to_yaml_string(&node).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&emitted).unwrap();
        assert_eq!(value["created"].as_str(), Some("2024-01-02T03:04:05Z"));
        assert_eq!(value["port"].as_str(), Some("8080"));
        assert_eq!(value["items"][0]["name"].as_str(), Some("a"));
    }
}
