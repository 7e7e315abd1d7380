/// Immutable JSON values.
///
/// Values are reference-counted so that cloning a node's document is cheap
/// and sharing across subscribers never copies the underlying bytes.
/// Strings and numbers retain their original textual form: a string holds
/// its JSON-quoted, escaped representation exactly as written or parsed, and
/// a number holds the exact digits it was parsed from. Equality is
/// therefore structural on the serialised form, not on decoded values.
use std::sync::Arc;

/// An ordered object member: a JSON-quoted key and its value.
pub type Member = (Arc<str>, Value);

/// A JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Exact textual form of a JSON number, e.g. `"12.1e12"`.
    Number(Arc<str>),
    /// JSON-quoted, escaped text including the surrounding quotes.
    String(Arc<str>),
    /// Insertion-ordered member list.
    Object(Arc<Vec<Member>>),
    Array(Arc<Vec<Value>>),
}

const ESCAPE_TABLE: &[(char, &str)] = &[
    ('\"', "\\\""),
    ('\\', "\\\\"),
    ('/', "\\/"),
    ('\u{8}', "\\b"),
    ('\u{c}', "\\f"),
    ('\n', "\\n"),
    ('\r', "\\r"),
    ('\t', "\\t"),
];

fn escape_into(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        if let Some((_, esc)) = ESCAPE_TABLE.iter().find(|(c, _)| *c == ch) {
            out.push_str(esc);
        } else {
            out.push(ch);
        }
    }
    out.push('"');
}

impl Value {
    /// Build a string value from a plain Rust string, escaping it the way
    /// the parser would for a freshly constructed (not parsed) literal.
    pub fn string(s: impl AsRef<str>) -> Self {
        let mut out = String::with_capacity(s.as_ref().len() + 2);
        escape_into(s.as_ref(), &mut out);
        Value::String(Arc::from(out))
    }

    /// Build a string value from already-quoted, already-escaped text (as
    /// produced by the parser). `raw` must include the surrounding quotes.
    pub fn string_raw(raw: impl Into<Arc<str>>) -> Self {
        Value::String(raw.into())
    }

    pub fn number(n: i64) -> Self {
        Value::Number(Arc::from(n.to_string()))
    }

    pub fn number_f64(n: f64) -> Self {
        Value::Number(Arc::from(format!("{}", n)))
    }

    /// Build a number from raw digits, as produced by the parser.
    pub fn number_raw(raw: impl Into<Arc<str>>) -> Self {
        Value::Number(raw.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    /// Build an object from decoded (unquoted) key names, escaping each the
    /// way [`Value::string`] would.
    pub fn object(members: Vec<(impl AsRef<str>, Value)>) -> Self {
        let pairs = members
            .into_iter()
            .map(|(k, v)| {
                let mut quoted = String::with_capacity(k.as_ref().len() + 2);
                escape_into(k.as_ref(), &mut quoted);
                (Arc::from(quoted), v)
            })
            .collect::<Vec<_>>();
        Value::Object(Arc::new(pairs))
    }

    /// Build an object from already-quoted key text, as produced by the
    /// parser.
    pub fn object_raw_keys(pairs: Vec<Member>) -> Self {
        Value::Object(Arc::new(pairs))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn as_object(&self) -> Option<&[Member]> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Look up an object member by its JSON-quoted key text.
    pub fn get_quoted(&self, quoted_key: &str) -> Option<&Value> {
        self.as_object()?
            .iter()
            .find(|(k, _)| k.as_ref() == quoted_key)
            .map(|(_, v)| v)
    }

    /// Look up an object member by its decoded key name (convenience; keys
    /// built via [`Value::object`]/[`Value::string`] use the default
    /// escaping, so this matches the common case where a key contains no
    /// characters requiring escaping).
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut quoted = String::with_capacity(key.len() + 2);
        escape_into(key, &mut quoted);
        self.get_quoted(&quoted)
    }

    /// Collect the byte slices that, concatenated in order, form the
    /// canonical textual JSON for this value. No bytes are copied: every
    /// piece borrows either a `'static` punctuation literal or a slice of
    /// this value's own storage.
    pub fn write_segments<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Value::Null => out.push("null"),
            Value::Bool(true) => out.push("true"),
            Value::Bool(false) => out.push("false"),
            Value::Number(s) => out.push(s),
            Value::String(s) => out.push(s),
            Value::Array(items) => {
                out.push("[");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(",");
                    }
                    item.write_segments(out);
                }
                out.push("]");
            }
            Value::Object(members) => {
                out.push("{");
                for (i, (key, value)) in members.iter().enumerate() {
                    if i > 0 {
                        out.push(",");
                    }
                    out.push(key);
                    out.push(":");
                    value.write_segments(out);
                }
                out.push("}");
            }
        }
    }

    /// Canonical textual JSON for this value.
    pub fn serialize(&self) -> String {
        let mut segments = Vec::new();
        self.write_segments(&mut segments);
        segments.concat()
    }

    /// Byte length of [`Value::serialize`], computed independently of it so
    /// the two can be checked against one another as a testable identity.
    pub fn size(&self) -> usize {
        match self {
            Value::Null => 4,
            Value::Bool(true) => 4,
            Value::Bool(false) => 5,
            Value::Number(s) => s.len(),
            Value::String(s) => s.len(),
            Value::Array(items) => {
                let commas = items.len().saturating_sub(1);
                2 + commas + items.iter().map(Value::size).sum::<usize>()
            }
            Value::Object(members) => {
                let commas = members.len().saturating_sub(1);
                let member_bytes: usize = members
                    .iter()
                    .map(|(k, v)| k.len() + 1 /* colon */ + v.size())
                    .sum();
                2 + commas + member_bytes
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_matches_serialize_len() {
        let value = Value::array(vec![
            Value::array(vec![]),
            Value::number_raw("12.1e12"),
            Value::number_raw("21"),
            Value::string_raw("\"Hallo\\u1234\""),
            Value::object_raw_keys(vec![
                (Arc::from("\"a\""), Value::Bool(true)),
                (Arc::from("\"b\""), Value::Bool(false)),
            ]),
            Value::object_raw_keys(vec![]),
            Value::Null,
        ]);
        assert_eq!(value.size(), value.serialize().len());
    }

    #[test]
    fn scenario_1_round_trip_is_byte_identical() {
        let text = r#"[[],12.1e12,21,"Hallo\u1234",{"a":true,"b":false},{},null]"#;
        let value = crate::json::parser::parse_complete(text.as_bytes()).unwrap();
        assert_eq!(value.serialize(), text);
    }

    #[test]
    fn string_escapes_control_characters() {
        let v = Value::string("a\"b\\c/d\n");
        assert_eq!(v.serialize(), r#""a\"b\\c\/d\n""#);
    }

    #[test]
    fn get_looks_up_by_decoded_key() {
        let v = Value::object(vec![("a", Value::number(1))]);
        assert_eq!(v.get("a"), Some(&Value::number(1)));
        assert_eq!(v.get("missing"), None);
    }
}
