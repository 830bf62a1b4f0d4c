//! Data structures of the in-memory server.
//!
//! [`Keyspace`] models the Redis types the object store touches: hashes,
//! sets and sorted sets, plus a log of published messages. Commands follow
//! Redis semantics, including deleting a key when its last element is
//! removed and rejecting commands against a key of another type.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::error::{BackendError, BackendResult};

/// Published messages kept by a [`Keyspace`] unless told otherwise.
pub const DEFAULT_PUBLISH_CAPACITY: usize = 1024;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Clone, Debug)]
enum Entry {
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    SortedSet(HashMap<String, f64>),
}

/// A message sent with `PUBLISH`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Published {
    pub channel: String,
    pub message: String,
}

/// The whole dataset of an in-memory server.
///
/// The publish log is a ring buffer: once it holds `publish_capacity`
/// messages, each new one evicts the oldest.
#[derive(Clone, Debug)]
pub struct Keyspace {
    entries: HashMap<String, Entry>,
    published: VecDeque<Published>,
    publish_capacity: usize,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::with_publish_capacity(DEFAULT_PUBLISH_CAPACITY)
    }
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty keyspace retaining at most `capacity` published messages.
    /// Zero disables retention.
    pub fn with_publish_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            published: VecDeque::with_capacity(capacity.min(DEFAULT_PUBLISH_CAPACITY)),
            publish_capacity: capacity,
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove a key of any type. Returns `true` if it existed.
    pub fn del(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ---- Hashes ----

    fn hash(&self, key: &str) -> BackendResult<Option<&BTreeMap<String, String>>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Hash(map)) => Ok(Some(map)),
            Some(_) => Err(BackendError::Command(WRONG_TYPE.into())),
        }
    }

    fn hash_mut(&mut self, key: &str) -> BackendResult<&mut BTreeMap<String, String>> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(BTreeMap::new()))
        {
            Entry::Hash(map) => Ok(map),
            _ => Err(BackendError::Command(WRONG_TYPE.into())),
        }
    }

    pub fn hget(&self, key: &str, field: &str) -> BackendResult<Option<String>> {
        Ok(self.hash(key)?.and_then(|map| map.get(field).cloned()))
    }

    pub fn hmget(&self, key: &str, fields: &[String]) -> BackendResult<Vec<Option<String>>> {
        let map = self.hash(key)?;
        Ok(fields
            .iter()
            .map(|f| map.and_then(|m| m.get(f).cloned()))
            .collect())
    }

    /// A copy of every field of a hash.
    pub fn hgetall(&self, key: &str) -> BackendResult<BTreeMap<String, String>> {
        Ok(self.hash(key)?.cloned().unwrap_or_default())
    }

    /// Returns `true` if the field was newly created.
    pub fn hset(&mut self, key: &str, field: &str, value: &str) -> BackendResult<bool> {
        let map = self.hash_mut(key)?;
        Ok(map.insert(field.to_string(), value.to_string()).is_none())
    }

    /// Returns `true` if the field existed.
    pub fn hdel(&mut self, key: &str, field: &str) -> BackendResult<bool> {
        let (removed, now_empty) = match self.entries.get_mut(key) {
            None => return Ok(false),
            Some(Entry::Hash(map)) => (map.remove(field).is_some(), map.is_empty()),
            Some(_) => return Err(BackendError::Command(WRONG_TYPE.into())),
        };
        if now_empty {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    pub fn hincrby(&mut self, key: &str, field: &str, by: i64) -> BackendResult<i64> {
        let map = self.hash_mut(key)?;
        let current = match map.get(field) {
            None => 0,
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                BackendError::Command("ERR hash value is not an integer".into())
            })?,
        };
        let next = current
            .checked_add(by)
            .ok_or_else(|| BackendError::Command("ERR increment or decrement would overflow".into()))?;
        map.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    // ---- Sets ----

    fn set(&self, key: &str) -> BackendResult<Option<&BTreeSet<String>>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Set(set)) => Ok(Some(set)),
            Some(_) => Err(BackendError::Command(WRONG_TYPE.into())),
        }
    }

    /// Returns `true` if the member was added.
    pub fn sadd(&mut self, key: &str, member: &str) -> BackendResult<bool> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()))
        {
            Entry::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(BackendError::Command(WRONG_TYPE.into())),
        }
    }

    pub fn sismember(&self, key: &str, member: &str) -> BackendResult<bool> {
        Ok(self.set(key)?.is_some_and(|s| s.contains(member)))
    }

    /// Members in lexicographic order.
    pub fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
        Ok(self
            .set(key)?
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    // ---- Sorted sets ----

    fn zset(&self, key: &str) -> BackendResult<Option<&HashMap<String, f64>>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::SortedSet(z)) => Ok(Some(z)),
            Some(_) => Err(BackendError::Command(WRONG_TYPE.into())),
        }
    }

    /// Add or update a member. Returns `true` if the member was added.
    pub fn zadd(&mut self, key: &str, score: f64, member: &str) -> BackendResult<bool> {
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::SortedSet(HashMap::new()))
        {
            Entry::SortedSet(z) => Ok(z.insert(member.to_string(), score).is_none()),
            _ => Err(BackendError::Command(WRONG_TYPE.into())),
        }
    }

    /// Returns `true` if the member existed.
    pub fn zrem(&mut self, key: &str, member: &str) -> BackendResult<bool> {
        let (removed, now_empty) = match self.entries.get_mut(key) {
            None => return Ok(false),
            Some(Entry::SortedSet(z)) => (z.remove(member).is_some(), z.is_empty()),
            Some(_) => return Err(BackendError::Command(WRONG_TYPE.into())),
        };
        if now_empty {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    pub fn zcard(&self, key: &str) -> BackendResult<u64> {
        Ok(self.zset(key)?.map_or(0, |z| z.len() as u64))
    }

    pub fn zscore(&self, key: &str, member: &str) -> BackendResult<Option<f64>> {
        Ok(self.zset(key)?.and_then(|z| z.get(member).copied()))
    }

    /// Members ordered by score, ties broken lexicographically, sliced with
    /// Redis index rules.
    pub fn zrange(&self, key: &str, start: i64, stop: i64) -> BackendResult<Vec<String>> {
        let Some(z) = self.zset(key)? else {
            return Ok(Vec::new());
        };
        let mut members: Vec<(&String, f64)> = z.iter().map(|(m, s)| (m, *s)).collect();
        members.sort_by(|(ma, sa), (mb, sb)| sa.total_cmp(sb).then_with(|| ma.cmp(mb)));

        let len = members.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if start > stop || start >= len {
            return Ok(Vec::new());
        }
        Ok(members[start as usize..=stop as usize]
            .iter()
            .map(|(m, _)| (*m).clone())
            .collect())
    }

    // ---- Pub/sub ----

    /// Record a published message. The in-memory server has no
    /// subscribers, so the receiver count is always zero.
    pub fn publish(&mut self, channel: &str, message: impl Into<String>) -> i64 {
        if self.publish_capacity == 0 {
            return 0;
        }
        while self.published.len() >= self.publish_capacity {
            self.published.pop_front();
        }
        self.published.push_back(Published {
            channel: channel.to_string(),
            message: message.into(),
        });
        0
    }

    /// Retained messages, oldest first.
    pub fn published(&self) -> Vec<Published> {
        self.published.iter().cloned().collect()
    }

    /// Take every retained message, oldest first, leaving the log empty.
    pub fn drain_published(&mut self) -> Vec<Published> {
        self.published.drain(..).collect()
    }

    /// Messages published on one channel, in order.
    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.published
            .iter()
            .filter(|p| p.channel == channel)
            .map(|p| p.message.clone())
            .collect()
    }
}
