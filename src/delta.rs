/// Minimal JSON edit scripts between two values, size-budgeted.
///
/// `delta(a, b, max_bytes)` computes a sequence of [`Op`]s that turns `a`
/// into `b`. Object fields are diffed by key; arrays are diffed with an
/// LCS-based edit script so that inserting, deleting or replacing a run of
/// elements costs roughly the size of the run, not the size of the whole
/// array. If the computed script (or, failing that, a full replacement)
/// does not fit the budget, `delta` reports failure and the caller falls
/// back to shipping the whole new value.
use crate::error::{PubsubError, PubsubResult};
use crate::json::Value;
use std::sync::Arc;

/// One segment of a path from the document root down to an edit site.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// An object member, identified by its JSON-quoted key text.
    Key(Arc<str>),
    /// An array element, identified by its 0-based index.
    Index(usize),
}

/// A single edit operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Add or replace the value at `path`.
    Set { path: Vec<Step>, value: Value },
    /// Remove the member or element identified by the last segment of
    /// `path`.
    Remove { path: Vec<Step> },
    /// Insert `value` into the array at `path` (the array itself, not one
    /// of its elements) before position `index`.
    Insert {
        path: Vec<Step>,
        index: usize,
        value: Value,
    },
}

fn apply_error(msg: impl Into<String>) -> PubsubError {
    PubsubError::DeltaApplyError(msg.into())
}

fn step_to_json(step: &Step) -> Value {
    match step {
        Step::Key(k) => Value::string_raw(k.clone()),
        Step::Index(i) => Value::number(*i as i64),
    }
}

fn path_to_json(path: &[Step]) -> Value {
    Value::array(path.iter().map(step_to_json).collect())
}

impl Op {
    /// JSON representation of this operation, as it would appear on the
    /// wire inside a delta array.
    pub fn to_json(&self) -> Value {
        match self {
            Op::Set { path, value } => Value::object(vec![
                ("op", Value::string("set")),
                ("path", path_to_json(path)),
                ("value", value.clone()),
            ]),
            Op::Remove { path } => Value::object(vec![
                ("op", Value::string("remove")),
                ("path", path_to_json(path)),
            ]),
            Op::Insert { path, index, value } => Value::object(vec![
                ("op", Value::string("insert")),
                ("path", path_to_json(path)),
                ("index", Value::number(*index as i64)),
                ("value", value.clone()),
            ]),
        }
    }

    /// Encoded byte size of this single operation.
    pub fn size(&self) -> usize {
        self.to_json().size()
    }
}

fn set_at(v: &Value, path: &[Step], value: Value) -> PubsubResult<Value> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(value);
    };
    match (head, v) {
        (Step::Key(k), Value::Object(members)) => {
            let mut new_members = (**members).clone();
            if let Some(pos) = new_members.iter().position(|(mk, _)| mk.as_ref() == k.as_ref()) {
                new_members[pos].1 = set_at(&new_members[pos].1, rest, value)?;
            } else if rest.is_empty() {
                new_members.push((k.clone(), value));
            } else {
                return Err(apply_error("set through a missing key"));
            }
            Ok(Value::object_raw_keys(new_members))
        }
        (Step::Index(i), Value::Array(items)) => {
            let mut new_items = (**items).clone();
            if *i < new_items.len() {
                new_items[*i] = set_at(&new_items[*i], rest, value)?;
            } else if *i == new_items.len() && rest.is_empty() {
                new_items.push(value);
            } else {
                return Err(apply_error("set array index out of range"));
            }
            Ok(Value::array(new_items))
        }
        _ => Err(apply_error("path segment does not match value shape")),
    }
}

fn remove_at(v: &Value, path: &[Step]) -> PubsubResult<Value> {
    let (head, rest) = path
        .split_first()
        .ok_or_else(|| apply_error("cannot remove the document root"))?;
    match (head, v) {
        (Step::Key(k), Value::Object(members)) => {
            let mut new_members = (**members).clone();
            let pos = new_members
                .iter()
                .position(|(mk, _)| mk.as_ref() == k.as_ref())
                .ok_or_else(|| apply_error("remove: missing key"))?;
            if rest.is_empty() {
                new_members.remove(pos);
            } else {
                new_members[pos].1 = remove_at(&new_members[pos].1, rest)?;
            }
            Ok(Value::object_raw_keys(new_members))
        }
        (Step::Index(i), Value::Array(items)) => {
            let mut new_items = (**items).clone();
            if *i >= new_items.len() {
                return Err(apply_error("remove: index out of range"));
            }
            if rest.is_empty() {
                new_items.remove(*i);
            } else {
                new_items[*i] = remove_at(&new_items[*i], rest)?;
            }
            Ok(Value::array(new_items))
        }
        _ => Err(apply_error("path segment does not match value shape")),
    }
}

fn insert_at(v: &Value, path: &[Step], index: usize, value: Value) -> PubsubResult<Value> {
    match path.split_first() {
        None => match v {
            Value::Array(items) => {
                let mut new_items = (**items).clone();
                if index > new_items.len() {
                    return Err(apply_error("insert index out of range"));
                }
                new_items.insert(index, value);
                Ok(Value::array(new_items))
            }
            _ => Err(apply_error("insert target is not an array")),
        },
        Some((Step::Key(k), rest)) => {
            let members = v
                .as_object()
                .ok_or_else(|| apply_error("path segment does not match value shape"))?;
            let mut new_members = members.to_vec();
            let pos = new_members
                .iter()
                .position(|(mk, _)| mk.as_ref() == k.as_ref())
                .ok_or_else(|| apply_error("insert: missing key"))?;
            new_members[pos].1 = insert_at(&new_members[pos].1, rest, index, value)?;
            Ok(Value::object_raw_keys(new_members))
        }
        Some((Step::Index(i), rest)) => {
            let items = v
                .as_array()
                .ok_or_else(|| apply_error("path segment does not match value shape"))?;
            let mut new_items = items.to_vec();
            if *i >= new_items.len() {
                return Err(apply_error("insert: index out of range"));
            }
            new_items[*i] = insert_at(&new_items[*i], rest, index, value)?;
            Ok(Value::array(new_items))
        }
    }
}

/// Apply one operation to `v`, returning the resulting value.
pub fn update(v: &Value, op: &Op) -> PubsubResult<Value> {
    match op {
        Op::Set { path, value } => set_at(v, path, value.clone()),
        Op::Remove { path } => remove_at(v, path),
        Op::Insert { path, index, value } => insert_at(v, path, *index, value.clone()),
    }
}

/// Apply a sequence of operations (as produced by [`delta`] or
/// concatenated from node history) in order.
pub fn apply_all(v: &Value, ops: &[Op]) -> PubsubResult<Value> {
    let mut current = v.clone();
    for op in ops {
        current = update(&current, op)?;
    }
    Ok(current)
}

/// Parse a delta array (as returned by `delta`/node history) back into
/// operations and apply them.
pub fn apply_ops_value(v: &Value, ops: &Value) -> PubsubResult<Value> {
    let ops = ops_from_array(ops)?;
    apply_all(v, &ops)
}

/// Parse a delta array back into its constituent operations, without
/// applying them. Used by the node store to concatenate history entries.
pub fn ops_from_array(ops: &Value) -> PubsubResult<Vec<Op>> {
    let items = ops
        .as_array()
        .ok_or_else(|| apply_error("delta is not an array"))?;
    items.iter().map(op_from_value).collect()
}

fn op_from_value(v: &Value) -> PubsubResult<Op> {
    let kind = v
        .get("op")
        .ok_or_else(|| apply_error("op object missing 'op'"))?;
    let path = path_from_value(v.get("path").ok_or_else(|| apply_error("op missing 'path'"))?)?;
    match kind {
        Value::String(s) if s.as_ref() == "\"set\"" => {
            let value = v
                .get("value")
                .ok_or_else(|| apply_error("set op missing 'value'"))?
                .clone();
            Ok(Op::Set { path, value })
        }
        Value::String(s) if s.as_ref() == "\"remove\"" => Ok(Op::Remove { path }),
        Value::String(s) if s.as_ref() == "\"insert\"" => {
            let index = match v.get("index") {
                Some(Value::Number(n)) => n
                    .parse::<usize>()
                    .map_err(|_| apply_error("insert op has non-integer index"))?,
                _ => return Err(apply_error("insert op missing 'index'")),
            };
            let value = v
                .get("value")
                .ok_or_else(|| apply_error("insert op missing 'value'"))?
                .clone();
            Ok(Op::Insert { path, index, value })
        }
        _ => Err(apply_error("op has unknown 'op' kind")),
    }
}

fn path_from_value(v: &Value) -> PubsubResult<Vec<Step>> {
    let items = v
        .as_array()
        .ok_or_else(|| apply_error("path is not an array"))?;
    items
        .iter()
        .map(|seg| match seg {
            Value::Number(n) => n
                .parse::<usize>()
                .map(Step::Index)
                .map_err(|_| apply_error("path index is not an integer")),
            Value::String(s) => Ok(Step::Key(s.clone())),
            _ => Err(apply_error("path segment is neither a string nor a number")),
        })
        .collect()
}

fn diff_into(old: &Value, new: &Value, path: &mut Vec<Step>, ops: &mut Vec<Op>) {
    if old == new {
        return;
    }
    match (old, new) {
        (Value::Object(old_members), Value::Object(new_members)) => {
            for (key, _) in old_members.iter() {
                if !new_members.iter().any(|(k, _)| k.as_ref() == key.as_ref()) {
                    let mut p = path.clone();
                    p.push(Step::Key(key.clone()));
                    ops.push(Op::Remove { path: p });
                }
            }
            for (key, new_value) in new_members.iter() {
                match old_members.iter().find(|(k, _)| k.as_ref() == key.as_ref()) {
                    None => {
                        let mut p = path.clone();
                        p.push(Step::Key(key.clone()));
                        ops.push(Op::Set {
                            path: p,
                            value: new_value.clone(),
                        });
                    }
                    Some((_, old_value)) if old_value != new_value => {
                        path.push(Step::Key(key.clone()));
                        diff_into(old_value, new_value, path, ops);
                        path.pop();
                    }
                    Some(_) => {}
                }
            }
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            diff_array(old_items, new_items, path, ops);
        }
        _ => {
            ops.push(Op::Set {
                path: path.clone(),
                value: new.clone(),
            });
        }
    }
}

/// Longest-common-subsequence edit script between two arrays: the minimal
/// set of index-addressed inserts and deletes that turns `old` into `new`.
/// Generated back-to-front so that each operation's index is still valid
/// when the whole script is applied in the order produced here: an edit at
/// a given position never shifts positions below it that a later-generated
/// (and therefore later-applied) operation still refers to.
fn diff_array(old: &[Value], new: &[Value], path: &mut Vec<Step>, ops: &mut Vec<Op>) {
    let n = old.len();
    let m = new.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in 0..n {
        for j in 0..m {
            lcs[i + 1][j + 1] = if old[i] == new[j] {
                lcs[i][j] + 1
            } else {
                lcs[i][j + 1].max(lcs[i + 1][j])
            };
        }
    }

    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old[i - 1] == new[j - 1] {
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || lcs[i][j - 1] >= lcs[i - 1][j]) {
            ops.push(Op::Insert {
                path: path.clone(),
                index: i,
                value: new[j - 1].clone(),
            });
            j -= 1;
        } else {
            let mut p = path.clone();
            p.push(Step::Index(i - 1));
            ops.push(Op::Remove { path: p });
            i -= 1;
        }
    }
}

/// Compute an edit script turning `a` into `b` that fits in `max_bytes`
/// once encoded as a JSON array. Returns `(true, ops_array)` on success, or
/// `(false, b.clone())` if no script — structural or a full replacement —
/// fits the budget.
pub fn delta(a: &Value, b: &Value, max_bytes: usize) -> (bool, Value) {
    if a == b {
        return (true, Value::array(vec![]));
    }

    let mut structural_ops = Vec::new();
    diff_into(a, b, &mut Vec::new(), &mut structural_ops);
    let structural = Value::array(structural_ops.iter().map(Op::to_json).collect());

    let full_replace = Value::array(vec![Op::Set {
        path: Vec::new(),
        value: b.clone(),
    }
    .to_json()]);

    let best = if full_replace.size() < structural.size() {
        full_replace
    } else {
        structural
    };

    if best.size() <= max_bytes {
        (true, best)
    } else {
        (false, b.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(values: &[i64]) -> Value {
        Value::array(values.iter().map(|n| Value::number(*n)).collect())
    }

    #[test]
    fn array_edits_are_minimal_and_correct() {
        let v1 = arr(&[1, 2, 3, 4, 5, 6, 7, 8, 10]);
        let v2 = arr(&[1, 3, 4, 5, 6, 7, 8, 10]);
        let v3 = arr(&[]);
        let v4 = arr(&[1]);

        let (ok, ops12) = delta(&v1, &v2, 1000);
        assert!(ok);
        assert_eq!(apply_ops_value(&v1, &ops12).unwrap(), v2);

        let (ok, ops23) = delta(&v2, &v3, 1_000_000);
        assert!(ok);
        assert_eq!(apply_ops_value(&v2, &ops23).unwrap(), v3);

        let (ok, ops34) = delta(&v3, &v4, 1_000_000);
        assert!(ok);
        assert_eq!(apply_ops_value(&v3, &ops34).unwrap(), v4);
    }

    #[test]
    fn object_field_diff_is_localized() {
        let a = Value::object(vec![("a", Value::number(1)), ("b", Value::number(2))]);
        let b = Value::object(vec![("a", Value::number(1)), ("b", Value::number(3))]);
        let (ok, ops) = delta(&a, &b, 1000);
        assert!(ok);
        assert_eq!(apply_ops_value(&a, &ops).unwrap(), b);
    }

    #[test]
    fn oversized_delta_falls_back_to_full_value() {
        let a = Value::array((0..50).map(Value::number).collect());
        let b = Value::array((0..50).map(|n| Value::number(n + 1)).collect());
        let (ok, value) = delta(&a, &b, 4);
        assert!(!ok);
        assert_eq!(value, b);
    }

    #[test]
    fn equal_values_produce_an_empty_ok_delta() {
        let v = Value::number(1);
        let (ok, ops) = delta(&v, &v, 0);
        assert!(ok);
        assert_eq!(ops, Value::array(vec![]));
    }
}
