//! Native twins of the protocol scripts for [`InMemoryBackend`].
//!
//! Each procedure runs under the in-memory server's keyspace lock, so it is
//! as indivisible as the Lua body it mirrors.

use serde_json::{Map, Value};
use vhash_backend::{BackendError, BackendResult, InMemoryBackend, Keyspace, Reply};
use vhash_types::{is_internal_field, Notification, VERSION_FIELD};

use crate::scripts;

/// Register every protocol script with `backend`.
pub fn install(backend: &InMemoryBackend) {
    backend.register_procedure(scripts::TOUCH.body(), touch);
    backend.register_procedure(scripts::SET.body(), set);
    backend.register_procedure(scripts::CLEAR.body(), clear);
    backend.register_procedure(scripts::CHECKED_DELETE.body(), checked_delete);
    backend.register_procedure(
        scripts::MERGE_INTO_SET_IF_DISTINCT.body(),
        merge_into_set_if_distinct,
    );
    backend.register_procedure(scripts::HASH_GET_SET.body(), hash_get_set);
}

/// `KEYS` of an object script.
struct ObjectKeys<'a> {
    registry: &'a str,
    collection: &'a str,
    hash: &'a str,
    channel: &'a str,
}

impl<'a> ObjectKeys<'a> {
    fn parse(keys: &'a [String]) -> BackendResult<Self> {
        match keys {
            [registry, collection, hash, channel] => Ok(Self {
                registry,
                collection,
                hash,
                channel,
            }),
            _ => Err(BackendError::Command(format!(
                "ERR object script expects 4 keys, got {}",
                keys.len()
            ))),
        }
    }

    fn id(&self) -> &'a str {
        self.hash.get(self.collection.len() + 1..).unwrap_or_default()
    }
}

fn score(args: &[String]) -> BackendResult<f64> {
    let raw = args
        .first()
        .ok_or_else(|| BackendError::Command("ERR missing score argument".into()))?;
    raw.parse()
        .map_err(|_| BackendError::Command(format!("ERR value is not a valid float: {raw}")))
}

fn version(v: i64) -> BackendResult<u64> {
    u64::try_from(v).map_err(|_| BackendError::Command(format!("ERR negative version {v}")))
}

fn decode(field: &str, raw: &str) -> BackendResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| BackendError::Command(format!("ERR cannot decode {field}: {e}")))
}

fn touch(ks: &mut Keyspace, keys: &[String], args: &[String]) -> BackendResult<Reply> {
    let keys = ObjectKeys::parse(keys)?;
    let score = score(args)?;
    let v = ks.hincrby(keys.hash, VERSION_FIELD, 1)?;
    if v == 1 {
        ks.sadd(keys.registry, keys.collection)?;
        ks.zadd(keys.collection, score, keys.id())?;
        let payload = Notification::updated(keys.id(), 1, Map::new()).to_payload();
        ks.publish(keys.channel, payload);
    }
    Ok(Reply::Int(v))
}

fn set(ks: &mut Keyspace, keys: &[String], args: &[String]) -> BackendResult<Reply> {
    let keys = ObjectKeys::parse(keys)?;
    let score = score(args)?;
    let pairs = &args[1..];
    if pairs.len() % 2 != 0 {
        return Err(BackendError::Command(
            "ERR set expects field/value pairs".into(),
        ));
    }

    let mut changes = Vec::new();
    let mut update = Map::new();
    let mut publish = false;
    for pair in pairs.chunks(2) {
        let (field, value) = (&pair[0], &pair[1]);
        let prev = ks.hget(keys.hash, field)?;
        if prev.as_deref() == Some(value.as_str()) {
            continue;
        }
        if !is_internal_field(field) {
            update.insert(field.clone(), decode(field, value)?);
            publish = true;
        }
        ks.hset(keys.hash, field, value)?;
        changes.push(Reply::Bulk(field.clone()));
        changes.push(prev.map_or(Reply::Nil, Reply::Bulk));
        changes.push(Reply::Bulk(value.clone()));
    }
    if changes.is_empty() {
        return Ok(Reply::Array(changes));
    }

    let v = ks.hincrby(keys.hash, VERSION_FIELD, 1)?;
    if v == 1 {
        ks.zadd(keys.collection, score, keys.id())?;
        ks.sadd(keys.registry, keys.collection)?;
        publish = true;
    }
    if publish {
        let payload = Notification::updated(keys.id(), version(v)?, update).to_payload();
        ks.publish(keys.channel, payload);
    }
    changes.insert(0, Reply::Bulk(v.to_string()));
    Ok(Reply::Array(changes))
}

fn clear(ks: &mut Keyspace, keys: &[String], args: &[String]) -> BackendResult<Reply> {
    let keys = ObjectKeys::parse(keys)?;
    let mut cleared = Vec::new();
    let mut update = Map::new();
    for field in args {
        let Some(prev) = ks.hget(keys.hash, field)? else {
            continue;
        };
        ks.hdel(keys.hash, field)?;
        update.insert(field.clone(), Value::Null);
        cleared.push(Reply::Bulk(field.clone()));
        cleared.push(Reply::Bulk(prev));
    }
    if cleared.is_empty() {
        return Ok(Reply::Array(cleared));
    }

    let v = ks.hincrby(keys.hash, VERSION_FIELD, 1)?;
    let payload = Notification::updated(keys.id(), version(v)?, update).to_payload();
    ks.publish(keys.channel, payload);
    cleared.insert(0, Reply::Bulk(v.to_string()));
    Ok(Reply::Array(cleared))
}

fn checked_delete(ks: &mut Keyspace, keys: &[String], _args: &[String]) -> BackendResult<Reply> {
    let keys = ObjectKeys::parse(keys)?;
    if !ks.del(keys.hash) {
        return Ok(Reply::Int(0));
    }
    ks.zrem(keys.collection, keys.id())?;
    ks.publish(keys.channel, Notification::deleted(keys.id()).to_payload());
    Ok(Reply::Int(1))
}

fn merge_into_set_if_distinct(
    ks: &mut Keyspace,
    keys: &[String],
    args: &[String],
) -> BackendResult<Reply> {
    let [key] = keys else {
        return Err(BackendError::Command(
            "ERR merge-into-set-if-distinct expects 1 key".into(),
        ));
    };
    let mut present = Vec::new();
    for member in args {
        if ks.sismember(key, member)? {
            present.push(member.clone());
        }
    }
    if present.is_empty() {
        for member in args {
            ks.sadd(key, member)?;
        }
    }
    Ok(Reply::strings(present))
}

fn hash_get_set(ks: &mut Keyspace, keys: &[String], args: &[String]) -> BackendResult<Reply> {
    let ([key], [field, value]) = (keys, args) else {
        return Err(BackendError::Command(
            "ERR hash-get-set expects 1 key and 2 arguments".into(),
        ));
    };
    let old = ks.hget(key, field)?;
    ks.hset(key, field, value)?;
    Ok(old.map_or(Reply::Nil, Reply::Bulk))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn user_keys() -> Vec<String> {
        strings(&["collections", "user", "user:42", "user.change"])
    }

    #[test]
    fn touch_registers_on_creation_only() {
        let mut ks = Keyspace::new();
        assert_eq!(touch(&mut ks, &user_keys(), &strings(&["5"])).unwrap(), Reply::Int(1));
        assert_eq!(touch(&mut ks, &user_keys(), &strings(&["9"])).unwrap(), Reply::Int(2));

        assert_eq!(ks.smembers("collections").unwrap(), vec!["user"]);
        assert_eq!(ks.zscore("user", "42").unwrap(), Some(5.0));
        assert_eq!(ks.published_on("user.change"), vec![r#"{"42":{"v":1}}"#]);
    }

    #[test]
    fn set_reports_prev_and_new() {
        let mut ks = Keyspace::new();
        let reply = set(&mut ks, &user_keys(), &strings(&["1", "name", "\"Alice\""])).unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::Bulk("1".into()),
                Reply::Bulk("name".into()),
                Reply::Nil,
                Reply::Bulk("\"Alice\"".into()),
            ])
        );
    }

    #[test]
    fn set_hides_internal_fields_from_payload() {
        let mut ks = Keyspace::new();
        set(&mut ks, &user_keys(), &strings(&["1", "name", "1"])).unwrap();
        set(&mut ks, &user_keys(), &strings(&["1", "_seen", "2"])).unwrap();

        let published = ks.published_on("user.change");
        assert_eq!(published, vec![r#"{"42":{"name":1,"v":1}}"#]);
        assert_eq!(ks.hget("user:42", "v").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn set_rejects_undecodable_public_values() {
        let mut ks = Keyspace::new();
        let err = set(&mut ks, &user_keys(), &strings(&["1", "name", "not json"])).unwrap_err();
        assert!(matches!(err, BackendError::Command(_)));
    }

    #[test]
    fn set_rejects_bad_score() {
        let mut ks = Keyspace::new();
        let err = set(&mut ks, &user_keys(), &strings(&["soon", "a", "1"])).unwrap_err();
        assert!(matches!(err, BackendError::Command(_)));
    }

    #[test]
    fn clear_publishes_every_cleared_field() {
        let mut ks = Keyspace::new();
        set(&mut ks, &user_keys(), &strings(&["1", "name", "1", "_seen", "2"])).unwrap();
        let reply = clear(&mut ks, &user_keys(), &strings(&["_seen", "name", "absent"])).unwrap();

        assert_eq!(
            reply,
            Reply::Array(vec![
                Reply::Bulk("2".into()),
                Reply::Bulk("_seen".into()),
                Reply::Bulk("2".into()),
                Reply::Bulk("name".into()),
                Reply::Bulk("1".into()),
            ])
        );
        assert_eq!(
            ks.published_on("user.change").last().unwrap(),
            r#"{"42":{"_seen":null,"name":null,"v":2}}"#
        );
    }

    #[test]
    fn clear_of_absent_fields_is_silent() {
        let mut ks = Keyspace::new();
        let reply = clear(&mut ks, &user_keys(), &strings(&["x"])).unwrap();
        assert_eq!(reply, Reply::Array(vec![]));
        assert!(ks.published().is_empty());
        assert!(!ks.exists("user:42"));
    }

    #[test]
    fn checked_delete_reports_whether_it_removed() {
        let mut ks = Keyspace::new();
        touch(&mut ks, &user_keys(), &strings(&["1"])).unwrap();
        assert_eq!(checked_delete(&mut ks, &user_keys(), &[]).unwrap(), Reply::Int(1));
        assert_eq!(checked_delete(&mut ks, &user_keys(), &[]).unwrap(), Reply::Int(0));

        assert_eq!(ks.zcard("user").unwrap(), 0);
        assert_eq!(
            ks.published_on("user.change"),
            vec![r#"{"42":{"v":1}}"#, r#"{"42":null}"#]
        );
    }

    #[test]
    fn object_scripts_need_four_keys() {
        let mut ks = Keyspace::new();
        let err = touch(&mut ks, &strings(&["user:42"]), &strings(&["1"])).unwrap_err();
        assert!(matches!(err, BackendError::Command(_)));
    }

    #[test]
    fn merge_is_all_or_nothing() {
        let mut ks = Keyspace::new();
        let key = strings(&["tags"]);
        assert_eq!(
            merge_into_set_if_distinct(&mut ks, &key, &strings(&["a", "b"])).unwrap(),
            Reply::Array(vec![])
        );
        assert_eq!(
            merge_into_set_if_distinct(&mut ks, &key, &strings(&["c", "b"])).unwrap(),
            Reply::strings(["b"])
        );
        assert_eq!(ks.smembers("tags").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn hash_get_set_returns_previous() {
        let mut ks = Keyspace::new();
        let key = strings(&["h"]);
        assert_eq!(hash_get_set(&mut ks, &key, &strings(&["f", "1"])).unwrap(), Reply::Nil);
        assert_eq!(
            hash_get_set(&mut ks, &key, &strings(&["f", "2"])).unwrap(),
            Reply::Bulk("1".into())
        );
    }

    #[test]
    fn install_registers_all_scripts() {
        let backend = InMemoryBackend::new();
        install(&backend);
        for script in scripts::ALL {
            assert!(
                vhash_backend::Backend::script_load(&backend, script.body()).is_ok(),
                "{script} not installed"
            );
        }
    }
}
