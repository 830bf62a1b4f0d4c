//! Typed invocations of the protocol scripts.
//!
//! Each function runs one script through a [`ScriptExecutor`] and turns its
//! reply into Rust values. A reply that does not have the documented shape is
//! reported as [`ScriptError::Unparsable`].

use std::collections::BTreeSet;

use tracing::trace;
use vhash_backend::Reply;
use vhash_script::{Script, ScriptError, ScriptExecutor, ScriptResult};
use vhash_types::{FieldChange, RawValue};

use crate::keys::ObjectKeys;
use crate::scripts;

/// What one `set` or `clear` committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDiff {
    /// Object version after the mutation.
    pub version: u64,
    /// Changed fields, in argument order.
    pub changes: Vec<FieldChange>,
}

impl RawDiff {
    /// `true` if this mutation created the object.
    pub fn is_insert(&self) -> bool {
        self.version == 1
    }
}

/// Bump the object's version, creating it with `score` if absent.
pub fn touch(executor: &ScriptExecutor, keys: &ObjectKeys, score: f64) -> ScriptResult<u64> {
    let reply = executor.execute(&scripts::TOUCH, &keys.to_vec(), &[score.to_string()])?;
    reply
        .as_int()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| ScriptError::unparsable(scripts::TOUCH.name(), format!("expected a version, got {reply}")))
}

/// Write `fields_and_values` (alternating, already encoded). `None` if every
/// value was already stored.
pub fn set(
    executor: &ScriptExecutor,
    keys: &ObjectKeys,
    score: f64,
    fields_and_values: &[String],
) -> ScriptResult<Option<RawDiff>> {
    let mut args = Vec::with_capacity(fields_and_values.len() + 1);
    args.push(score.to_string());
    args.extend_from_slice(fields_and_values);
    let reply = executor.execute(&scripts::SET, &keys.to_vec(), &args)?;
    parse_diff(&scripts::SET, reply, DiffShape::Set)
}

/// Delete `fields`. `None` if none of them existed.
pub fn clear(
    executor: &ScriptExecutor,
    keys: &ObjectKeys,
    fields: &[String],
) -> ScriptResult<Option<RawDiff>> {
    let reply = executor.execute(&scripts::CLEAR, &keys.to_vec(), fields)?;
    parse_diff(&scripts::CLEAR, reply, DiffShape::Clear)
}

/// Delete the object. `true` if it existed.
pub fn checked_delete(executor: &ScriptExecutor, keys: &ObjectKeys) -> ScriptResult<bool> {
    let reply = executor.execute(&scripts::CHECKED_DELETE, &keys.to_vec(), &[])?;
    match reply.as_int() {
        Some(1) => Ok(true),
        Some(0) => Ok(false),
        _ => Err(ScriptError::unparsable(
            scripts::CHECKED_DELETE.name(),
            format!("expected 0 or 1, got {reply}"),
        )),
    }
}

/// Add `members` to the set at `key` unless any of them is already there.
///
/// Returns the members that were already present; empty means the merge
/// happened.
pub fn merge_into_set_if_distinct(
    executor: &ScriptExecutor,
    key: &str,
    members: &[String],
) -> ScriptResult<BTreeSet<String>> {
    let script = &scripts::MERGE_INTO_SET_IF_DISTINCT;
    let reply = executor.execute(script, &[key.to_string()], members)?;
    let items = reply
        .into_array()
        .ok_or_else(|| ScriptError::unparsable(script.name(), "expected an array reply"))?;
    items
        .into_iter()
        .map(|item| {
            item.into_opt_string()
                .ok_or_else(|| ScriptError::unparsable(script.name(), "expected member strings"))
        })
        .collect()
}

/// Write one hash field, returning its previous value.
pub fn hash_get_set(
    executor: &ScriptExecutor,
    key: &str,
    field: &str,
    value: &str,
) -> ScriptResult<Option<String>> {
    let script = &scripts::HASH_GET_SET;
    let reply = executor.execute(script, &[key.to_string()], &[field.to_string(), value.to_string()])?;
    match reply {
        Reply::Nil => Ok(None),
        Reply::Bulk(old) => Ok(Some(old)),
        other => Err(ScriptError::unparsable(
            script.name(),
            format!("expected a string or nil, got {other}"),
        )),
    }
}

#[derive(Clone, Copy)]
enum DiffShape {
    /// `[v, field, prev, new, ...]`
    Set,
    /// `[v, field, prev, ...]`
    Clear,
}

impl DiffShape {
    fn stride(self) -> usize {
        match self {
            Self::Set => 3,
            Self::Clear => 2,
        }
    }
}

fn parse_diff(script: &Script, reply: Reply, shape: DiffShape) -> ScriptResult<Option<RawDiff>> {
    let bad = |detail: String| ScriptError::unparsable(script.name(), detail);

    let items = reply
        .into_array()
        .ok_or_else(|| bad("expected an array reply".into()))?;
    let mut items = items.into_iter();
    let Some(head) = items.next() else {
        trace!(script = script.name(), "no field changed");
        return Ok(None);
    };
    let version = head
        .as_int()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| bad(format!("expected a version, got {head}")))?;

    let rest: Vec<Reply> = items.collect();
    let stride = shape.stride();
    if rest.is_empty() || rest.len() % stride != 0 {
        return Err(bad(format!(
            "{} trailing elements is not a multiple of {stride}",
            rest.len()
        )));
    }

    let mut changes = Vec::with_capacity(rest.len() / stride);
    for chunk in rest.chunks(stride) {
        let field = chunk[0]
            .as_str()
            .ok_or_else(|| bad(format!("expected a field name, got {}", chunk[0])))?;
        let before = RawValue::from(chunk[1].clone().into_opt_string());
        let change = match shape {
            DiffShape::Set => {
                let after = chunk[2]
                    .as_str()
                    .ok_or_else(|| bad(format!("expected a new value for {field}")))?;
                FieldChange::new(field, before, RawValue::Present(after.to_string()))
            }
            DiffShape::Clear => FieldChange::cleared(field, before),
        };
        changes.push(change);
    }
    Ok(Some(RawDiff { version, changes }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyLayout;
    use proptest::prelude::*;
    use std::sync::Arc;
    use vhash_backend::InMemoryBackend;
    use vhash_types::Notification;

    fn harness() -> (Arc<InMemoryBackend>, ScriptExecutor, ObjectKeys) {
        let backend = Arc::new(InMemoryBackend::new());
        crate::install(&backend);
        let executor = ScriptExecutor::new(backend.clone());
        (backend, executor, KeyLayout::default().object("user", "42"))
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn stored_version(backend: &InMemoryBackend) -> Option<String> {
        backend.with_keyspace(|ks| ks.hget("user:42", "v").unwrap())
    }

    #[test]
    fn object_lifecycle_scenario() {
        let (backend, executor, keys) = harness();

        let diff = set(&executor, &keys, 1.0, &strings(&["name", "\"Alice\""]))
            .unwrap()
            .unwrap();
        assert_eq!(diff.version, 1);
        assert!(diff.is_insert());
        assert_eq!(
            diff.changes,
            vec![FieldChange::new(
                "name",
                RawValue::Missing,
                RawValue::Present("\"Alice\"".into())
            )]
        );

        assert!(set(&executor, &keys, 2.0, &strings(&["name", "\"Alice\""]))
            .unwrap()
            .is_none());

        let diff = set(&executor, &keys, 3.0, &strings(&["name", "\"Bob\""]))
            .unwrap()
            .unwrap();
        assert_eq!(diff.version, 2);
        assert_eq!(diff.changes[0].before, RawValue::Present("\"Alice\"".into()));

        let diff = clear(&executor, &keys, &strings(&["name"])).unwrap().unwrap();
        assert_eq!(diff.version, 3);
        assert!(diff.changes[0].is_removal());

        assert!(checked_delete(&executor, &keys).unwrap());
        assert!(!checked_delete(&executor, &keys).unwrap());

        let published = backend.published_on("user.change");
        assert_eq!(
            published,
            vec![
                r#"{"42":{"name":"Alice","v":1}}"#,
                r#"{"42":{"name":"Bob","v":2}}"#,
                r#"{"42":{"name":null,"v":3}}"#,
                r#"{"42":null}"#,
            ]
        );
        assert!(Notification::parse(&published[3]).unwrap().is_tombstone());
    }

    #[test]
    fn creation_registers_collection_and_member() {
        let (backend, executor, keys) = harness();
        set(&executor, &keys, 17.0, &strings(&["name", "1"])).unwrap();
        backend.with_keyspace(|ks| {
            assert_eq!(ks.smembers("collections").unwrap(), vec!["user"]);
            assert_eq!(ks.zscore("user", "42").unwrap(), Some(17.0));
        });
    }

    #[test]
    fn touch_then_set_fires_one_creation() {
        let (backend, executor, keys) = harness();
        assert_eq!(touch(&executor, &keys, 1.0).unwrap(), 1);
        let diff = set(&executor, &keys, 1.0, &strings(&["name", "1"])).unwrap().unwrap();
        assert_eq!(diff.version, 2);
        assert!(!diff.is_insert());
        assert_eq!(backend.published_on("user.change").len(), 2);
    }

    #[test]
    fn internal_only_update_is_silent() {
        let (backend, executor, keys) = harness();
        set(&executor, &keys, 1.0, &strings(&["name", "1"])).unwrap();
        let diff = set(&executor, &keys, 1.0, &strings(&["_seen", "5"])).unwrap().unwrap();
        assert_eq!(diff.version, 2);
        assert!(diff.changes[0].is_internal());
        assert_eq!(backend.published_on("user.change").len(), 1);
    }

    #[test]
    fn internal_only_creation_still_announces() {
        let (backend, executor, keys) = harness();
        set(&executor, &keys, 1.0, &strings(&["_seen", "5"])).unwrap();
        assert_eq!(backend.published_on("user.change"), vec![r#"{"42":{"v":1}}"#]);
    }

    #[test]
    fn clear_of_missing_fields_changes_nothing() {
        let (backend, executor, keys) = harness();
        assert!(clear(&executor, &keys, &strings(&["ghost"])).unwrap().is_none());
        assert_eq!(stored_version(&backend), None);
    }

    #[test]
    fn merge_and_hash_get_set() {
        let (_backend, executor, _keys) = harness();
        assert!(merge_into_set_if_distinct(&executor, "tags", &strings(&["a", "b"]))
            .unwrap()
            .is_empty());
        let present = merge_into_set_if_distinct(&executor, "tags", &strings(&["b", "c", "b"])).unwrap();
        assert_eq!(present, BTreeSet::from(["b".to_string()]));

        assert_eq!(hash_get_set(&executor, "h", "f", "1").unwrap(), None);
        assert_eq!(hash_get_set(&executor, "h", "f", "2").unwrap(), Some("1".into()));
    }

    #[test]
    fn malformed_replies_are_unparsable() {
        let shapes = [
            Reply::Int(3),
            Reply::strings(["1", "name"]),
            Reply::strings(["x", "name", "a", "b"]),
            Reply::Array(vec![Reply::Bulk("1".into()), Reply::Int(9), Reply::Nil, Reply::Nil]),
        ];
        for reply in shapes {
            let err = parse_diff(&scripts::SET, reply.clone(), DiffShape::Set).unwrap_err();
            assert!(matches!(err, ScriptError::Unparsable { script: "set", .. }), "{reply}");
        }
    }

    #[test]
    fn clear_reply_parses_without_after_values() {
        let reply = Reply::Array(vec![
            Reply::Bulk("4".into()),
            Reply::Bulk("a".into()),
            Reply::Bulk("1".into()),
        ]);
        let diff = parse_diff(&scripts::CLEAR, reply, DiffShape::Clear).unwrap().unwrap();
        assert_eq!(diff.version, 4);
        assert_eq!(diff.changes, vec![FieldChange::cleared("a", RawValue::Present("1".into()))]);
    }

    proptest! {
        #[test]
        fn each_effective_set_bumps_version_once(
            values in proptest::collection::vec(0u8..4, 1..20)
        ) {
            let (backend, executor, keys) = harness();
            let mut expected = 0u64;
            let mut last: Option<u8> = None;
            for value in values {
                let diff = set(&executor, &keys, 1.0, &["n".to_string(), value.to_string()]).unwrap();
                if last == Some(value) {
                    prop_assert!(diff.is_none());
                } else {
                    expected += 1;
                    prop_assert_eq!(diff.map(|d| d.version), Some(expected));
                }
                last = Some(value);
            }
            prop_assert_eq!(stored_version(&backend), Some(expected.to_string()));
        }

        #[test]
        fn multi_field_set_is_one_version(
            fields in proptest::collection::btree_set("[a-z]{1,6}", 1..8)
        ) {
            let (_backend, executor, keys) = harness();
            let args: Vec<String> = fields
                .iter()
                .filter(|f| f.as_str() != "v")
                .flat_map(|f| [f.clone(), "true".to_string()])
                .collect();
            prop_assume!(!args.is_empty());
            let diff = set(&executor, &keys, 1.0, &args).unwrap().unwrap();
            prop_assert_eq!(diff.version, 1);
            prop_assert_eq!(diff.changes.len(), args.len() / 2);
        }
    }
}
