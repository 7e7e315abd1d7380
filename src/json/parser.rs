/// A streaming, resumable JSON parser.
///
/// The parser is a pushdown automaton: a stack of container frames
/// (`Frame::Object`/`Frame::Array`) plus a single in-progress scalar
/// (`Pending`). `feed` may be called any number of times with chunks of any
/// size; the parser carries state across calls so the result is identical
/// regardless of where chunk boundaries fall (see the `split_parse` test).
use crate::error::{PubsubError, PubsubResult};
use crate::json::value::Value;
use std::sync::Arc;

fn parse_error(msg: impl Into<String>) -> PubsubError {
    PubsubError::JsonParseError(msg.into())
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

/// Number sub-states. The four terminal ones are the only states in which a
/// non-numeric continuation character legally ends the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberState {
    Sign,
    LeadingZero,
    PreDot,
    Dot,
    PostDot,
    Exponent,
    ExponentSign,
    ExponentValue,
}

impl NumberState {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            NumberState::LeadingZero
                | NumberState::PreDot
                | NumberState::PostDot
                | NumberState::ExponentValue
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringState {
    Body,
    AfterBackslash,
    /// How many of the 4 required hex digits of a `\uXXXX` escape have been
    /// consumed so far.
    UnicodeHex(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteralKind {
    True,
    False,
    Null,
}

impl LiteralKind {
    fn text(self) -> &'static str {
        match self {
            LiteralKind::True => "true",
            LiteralKind::False => "false",
            LiteralKind::Null => "null",
        }
    }

    fn value(self) -> Value {
        match self {
            LiteralKind::True => Value::Bool(true),
            LiteralKind::False => Value::Bool(false),
            LiteralKind::Null => Value::Null,
        }
    }

    fn from_start(b: u8) -> Option<Self> {
        match b {
            b't' => Some(LiteralKind::True),
            b'f' => Some(LiteralKind::False),
            b'n' => Some(LiteralKind::Null),
            _ => None,
        }
    }
}

enum Pending {
    None,
    String {
        /// Raw bytes, including the opening quote. Kept as bytes (not a
        /// `String`) because UTF-8 multi-byte sequences arrive one byte at
        /// a time and must not be interpreted byte-by-byte as characters.
        raw: Vec<u8>,
        state: StringState,
        as_key: bool,
    },
    Number {
        raw: String,
        state: NumberState,
    },
    Literal {
        kind: LiteralKind,
        matched: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    /// Just opened: a value or `]` may follow.
    LeftBracket,
    /// After a comma: only a value may follow.
    AwaitingValue,
    /// A value was just parsed: `,` or `]` may follow.
    ValueParsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectState {
    /// Just opened: a key (quoted string) or `}` may follow.
    LeftBrace,
    /// After a comma: only a key may follow.
    AwaitingKey,
    /// A key was parsed: `:` must follow.
    MemberNameParsed,
    /// `:` was consumed: a value must follow.
    AwaitingValue,
    /// A member value was just parsed: `,` or `}` may follow.
    MemberValueParsed,
}

enum Frame {
    Array {
        items: Vec<Value>,
        state: ArrayState,
    },
    Object {
        pairs: Vec<(Arc<str>, Value)>,
        state: ObjectState,
        pending_key: Option<Arc<str>>,
    },
}

/// Streaming JSON parser. Feed it bytes with [`Parser::feed`] in any chunk
/// size, then call [`Parser::flush`] once the input is exhausted.
pub struct Parser {
    frames: Vec<Frame>,
    pending: Pending,
    root: Option<Value>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            frames: Vec::new(),
            pending: Pending::None,
            root: None,
        }
    }

    /// Feed a chunk of input. May be called repeatedly with chunks of any
    /// size; state is carried across calls.
    pub fn feed(&mut self, chunk: &[u8]) -> PubsubResult<()> {
        for &b in chunk {
            self.step(b)?;
        }
        Ok(())
    }

    /// Signal end of input. Finishes a trailing number if it is in a
    /// terminal sub-state, then requires the document to be complete:
    /// no open containers, no in-progress string/literal, and a root value
    /// parsed. Returns the parsed value on success.
    pub fn flush(mut self) -> PubsubResult<Value> {
        if let Pending::Number { ref raw, state } = self.pending {
            if state.is_terminal() {
                let value = Value::number_raw(raw.clone());
                self.pending = Pending::None;
                self.emit_value(value)?;
            } else {
                return Err(parse_error("truncated number"));
            }
        }

        if !matches!(self.pending, Pending::None) {
            return Err(parse_error("truncated value at end of input"));
        }
        if !self.frames.is_empty() {
            return Err(parse_error("unterminated object or array"));
        }
        self.root
            .ok_or_else(|| parse_error("no value parsed"))
    }

    fn step(&mut self, b: u8) -> PubsubResult<()> {
        // A number in progress takes priority: every byte is either a
        // continuation or ends the number (the non-continuing byte is then
        // re-dispatched against the enclosing context).
        if let Pending::Number { .. } = self.pending {
            return self.step_number(b);
        }
        if let Pending::String { .. } = self.pending {
            return self.step_string(b);
        }
        if let Pending::Literal { .. } = self.pending {
            return self.step_literal(b);
        }
        self.step_structural(b)
    }

    fn step_number(&mut self, b: u8) -> PubsubResult<()> {
        let (raw, state) = match &mut self.pending {
            Pending::Number { raw, state } => (raw, state),
            _ => unreachable!(),
        };

        let next = match (*state, b) {
            (NumberState::Sign, b'0') => Some(NumberState::LeadingZero),
            (NumberState::Sign, d) if is_digit(d) => Some(NumberState::PreDot),
            (NumberState::LeadingZero, b'.') => Some(NumberState::Dot),
            (NumberState::LeadingZero, b'e') | (NumberState::LeadingZero, b'E') => {
                Some(NumberState::Exponent)
            }
            (NumberState::PreDot, d) if is_digit(d) => Some(NumberState::PreDot),
            (NumberState::PreDot, b'.') => Some(NumberState::Dot),
            (NumberState::PreDot, b'e') | (NumberState::PreDot, b'E') => {
                Some(NumberState::Exponent)
            }
            (NumberState::Dot, d) if is_digit(d) => Some(NumberState::PostDot),
            (NumberState::PostDot, d) if is_digit(d) => Some(NumberState::PostDot),
            (NumberState::PostDot, b'e') | (NumberState::PostDot, b'E') => {
                Some(NumberState::Exponent)
            }
            (NumberState::Exponent, b'+') | (NumberState::Exponent, b'-') => {
                Some(NumberState::ExponentSign)
            }
            (NumberState::Exponent, d) if is_digit(d) => Some(NumberState::ExponentValue),
            (NumberState::ExponentSign, d) if is_digit(d) => Some(NumberState::ExponentValue),
            (NumberState::ExponentValue, d) if is_digit(d) => Some(NumberState::ExponentValue),
            _ => None,
        };

        if let Some(new_state) = next {
            raw.push(b as char);
            *state = new_state;
            return Ok(());
        }

        // Not a continuation: the number is complete only if we're in a
        // terminal sub-state; otherwise this is a malformed number.
        if !state.is_terminal() {
            return Err(parse_error(format!(
                "invalid number: '{}' followed by unexpected byte",
                raw
            )));
        }
        let value = Value::number_raw(std::mem::take(raw));
        self.pending = Pending::None;
        self.emit_value(value)?;
        self.step(b)
    }

    fn step_string(&mut self, b: u8) -> PubsubResult<()> {
        let (raw, state, as_key) = match &mut self.pending {
            Pending::String { raw, state, as_key } => (raw, state, *as_key),
            _ => unreachable!(),
        };

        match *state {
            StringState::Body => match b {
                b'"' => {
                    raw.push(b'"');
                    let bytes = std::mem::take(raw);
                    let text: Arc<str> = Arc::from(
                        String::from_utf8(bytes)
                            .map_err(|_| parse_error("invalid utf-8 in string"))?,
                    );
                    self.pending = Pending::None;
                    if as_key {
                        self.set_pending_key(text)?;
                    } else {
                        self.emit_value(Value::string_raw(text))?;
                    }
                }
                b'\\' => {
                    raw.push(b'\\');
                    *state = StringState::AfterBackslash;
                }
                _ => raw.push(b),
            },
            StringState::AfterBackslash => match b {
                b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' => {
                    raw.push(b);
                    *state = StringState::Body;
                }
                b'u' => {
                    raw.push(b'u');
                    *state = StringState::UnicodeHex(0);
                }
                _ => return Err(parse_error("invalid escape sequence")),
            },
            StringState::UnicodeHex(count) => {
                if !b.is_ascii_hexdigit() {
                    return Err(parse_error("invalid \\u escape"));
                }
                raw.push(b);
                if count + 1 == 4 {
                    *state = StringState::Body;
                } else {
                    *state = StringState::UnicodeHex(count + 1);
                }
            }
        }
        Ok(())
    }

    fn step_literal(&mut self, b: u8) -> PubsubResult<()> {
        let (kind, matched) = match &mut self.pending {
            Pending::Literal { kind, matched } => (*kind, matched),
            _ => unreachable!(),
        };
        let text = kind.text().as_bytes();
        if text[*matched] != b {
            return Err(parse_error(format!("invalid literal, expected '{}'", kind.text())));
        }
        *matched += 1;
        if *matched == text.len() {
            self.pending = Pending::None;
            self.emit_value(kind.value())?;
        }
        Ok(())
    }

    /// Dispatch a byte that starts (or structurally advances) a value,
    /// based on what the current frame expects.
    fn step_structural(&mut self, b: u8) -> PubsubResult<()> {
        if is_whitespace(b) {
            return Ok(());
        }

        match self.frames.last() {
            None => {
                if self.root.is_some() {
                    return Err(parse_error("unexpected trailing data"));
                }
                self.start_value(b)
            }
            Some(Frame::Array { state, .. }) => match state {
                ArrayState::LeftBracket => {
                    if b == b']' {
                        self.close_array()
                    } else {
                        self.start_value(b)
                    }
                }
                ArrayState::AwaitingValue => self.start_value(b),
                ArrayState::ValueParsed => match b {
                    b',' => {
                        if let Some(Frame::Array { state, .. }) = self.frames.last_mut() {
                            *state = ArrayState::AwaitingValue;
                        }
                        Ok(())
                    }
                    b']' => self.close_array(),
                    _ => Err(parse_error("expected ',' or ']' in array")),
                },
            },
            Some(Frame::Object { state, .. }) => match state {
                ObjectState::LeftBrace => {
                    if b == b'}' {
                        self.close_object()
                    } else if b == b'"' {
                        self.begin_string(true)
                    } else {
                        Err(parse_error("expected object key or '}'"))
                    }
                }
                ObjectState::AwaitingKey => {
                    if b == b'"' {
                        self.begin_string(true)
                    } else {
                        Err(parse_error("expected object key"))
                    }
                }
                ObjectState::MemberNameParsed => {
                    if b == b':' {
                        if let Some(Frame::Object { state, .. }) = self.frames.last_mut() {
                            *state = ObjectState::AwaitingValue;
                        }
                        Ok(())
                    } else {
                        Err(parse_error("expected ':' after object key"))
                    }
                }
                ObjectState::AwaitingValue => self.start_value(b),
                ObjectState::MemberValueParsed => match b {
                    b',' => {
                        if let Some(Frame::Object { state, .. }) = self.frames.last_mut() {
                            *state = ObjectState::AwaitingKey;
                        }
                        Ok(())
                    }
                    b'}' => self.close_object(),
                    _ => Err(parse_error("expected ',' or '}' in object")),
                },
            },
        }
    }

    fn start_value(&mut self, b: u8) -> PubsubResult<()> {
        match b {
            b'{' => {
                self.frames.push(Frame::Object {
                    pairs: Vec::new(),
                    state: ObjectState::LeftBrace,
                    pending_key: None,
                });
                Ok(())
            }
            b'[' => {
                self.frames.push(Frame::Array {
                    items: Vec::new(),
                    state: ArrayState::LeftBracket,
                });
                Ok(())
            }
            b'"' => self.begin_string(false),
            b'-' => {
                self.pending = Pending::Number {
                    raw: String::from("-"),
                    state: NumberState::Sign,
                };
                Ok(())
            }
            d if is_digit(d) => {
                let state = if d == b'0' {
                    NumberState::LeadingZero
                } else {
                    NumberState::PreDot
                };
                self.pending = Pending::Number {
                    raw: (d as char).to_string(),
                    state,
                };
                Ok(())
            }
            _ => {
                if let Some(kind) = LiteralKind::from_start(b) {
                    self.pending = Pending::Literal { kind, matched: 1 };
                    Ok(())
                } else {
                    Err(parse_error(format!("unexpected byte '{}'", b as char)))
                }
            }
        }
    }

    fn begin_string(&mut self, as_key: bool) -> PubsubResult<()> {
        self.pending = Pending::String {
            raw: vec![b'"'],
            state: StringState::Body,
            as_key,
        };
        Ok(())
    }

    fn set_pending_key(&mut self, key: Arc<str>) -> PubsubResult<()> {
        match self.frames.last_mut() {
            Some(Frame::Object {
                pending_key, state, ..
            }) => {
                *pending_key = Some(key);
                *state = ObjectState::MemberNameParsed;
                Ok(())
            }
            _ => Err(parse_error("object key parsed outside an object")),
        }
    }

    fn close_array(&mut self) -> PubsubResult<()> {
        let items = match self.frames.pop() {
            Some(Frame::Array { items, .. }) => items,
            _ => return Err(parse_error("unbalanced ']'")),
        };
        self.emit_value(Value::array(items))
    }

    fn close_object(&mut self) -> PubsubResult<()> {
        let pairs = match self.frames.pop() {
            Some(Frame::Object { pairs, .. }) => pairs,
            _ => return Err(parse_error("unbalanced '}'")),
        };
        self.emit_value(Value::object_raw_keys(pairs))
    }

    /// A value (scalar, array, or object) has just completed. Attach it to
    /// whatever is waiting for it: the enclosing array, the enclosing
    /// object's current member, or the document root.
    fn emit_value(&mut self, value: Value) -> PubsubResult<()> {
        match self.frames.last_mut() {
            None => {
                self.root = Some(value);
                Ok(())
            }
            Some(Frame::Array { items, state }) => {
                items.push(value);
                *state = ArrayState::ValueParsed;
                Ok(())
            }
            Some(Frame::Object {
                pairs,
                state,
                pending_key,
            }) => {
                let key = pending_key
                    .take()
                    .ok_or_else(|| parse_error("object value with no pending key"))?;
                pairs.push((key, value));
                *state = ObjectState::MemberValueParsed;
                Ok(())
            }
        }
    }
}

/// Parse a complete, single-chunk JSON document.
pub fn parse_complete(bytes: &[u8]) -> PubsubResult<Value> {
    let mut parser = Parser::new();
    parser.feed(bytes)?;
    parser.flush()
}

/// Parse a document delivered as two chunks, split at `at`. Used to verify
/// that chunk boundaries never change the result.
pub fn parse_split(bytes: &[u8], at: usize) -> PubsubResult<Value> {
    let mut parser = Parser::new();
    parser.feed(&bytes[..at])?;
    parser.feed(&bytes[at..])?;
    parser.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_value(s: &str) -> Value {
        parse_complete(s.as_bytes()).unwrap_or_else(|e| panic!("parse failed for {:?}: {}", s, e))
    }

    #[test]
    fn parses_scenario_1() {
        let text = r#"[[],12.1e12,21,"Hallo\u1234",{"a":true,"b":false},{},null]"#;
        let value = expect_value(text);
        assert_eq!(value.serialize(), text);
    }

    #[test]
    fn split_parse_matches_one_shot_at_every_offset() {
        let text = r#"[[],12.1e12,21,"Hallo\u1234",{"a":true,"b":false},{},null]"#;
        let whole = expect_value(text);
        for at in 0..=text.len() {
            let split = parse_split(text.as_bytes(), at).unwrap();
            assert_eq!(split, whole, "mismatch splitting at {}", at);
        }
    }

    #[test]
    fn whitespace_is_skipped_between_tokens() {
        let value = expect_value(" \t\r\n{ \"a\" : 1 , \"b\" : 2 } \t");
        assert_eq!(value.get("a"), Some(&Value::number(1)));
        assert_eq!(value.get("b"), Some(&Value::number(2)));
    }

    fn expect_invalid(s: &str) {
        match parse_complete(s.as_bytes()) {
            Ok(v) => panic!("expected parse error for {:?}, got {:?}", s, v),
            Err(_) => {}
        }
    }

    #[test]
    fn invalid_tokens_are_rejected() {
        for bad in [
            "a", "b", "-", "-0.", ".12", "-1223.", ".1", "0.00e", "-123.7e-", "0e", "0e+", "e",
        ] {
            expect_invalid(bad);
        }
    }

    #[test]
    fn feeding_byte_at_a_time_matches_one_shot() {
        let text = r#"{"nested":[1,2,3],"s":"with \"quotes\""}"#;
        let whole = expect_value(text);
        let mut parser = Parser::new();
        for &b in text.as_bytes() {
            parser.feed(&[b]).unwrap();
        }
        assert_eq!(parser.flush().unwrap(), whole);
    }
}
