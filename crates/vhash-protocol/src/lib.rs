//! Atomic update protocol for vhash.
//!
//! Objects are hashes with a version field `v`, grouped into collections.
//! Every mutation is one server-side script that reads, compares, writes,
//! bumps the version, records the diff and publishes a change notification
//! as a single indivisible step.
//!
//! # Scripts
//!
//! | Script | Effect | Reply |
//! |---|---|---|
//! | [`TOUCH`] | bump `v`; register the object on creation | new version |
//! | [`SET`] | write changed fields, bump `v` once | `[v, field, prev, new, ...]` or `[]` |
//! | [`CLEAR`] | delete present fields, bump `v` once | `[v, field, prev, ...]` or `[]` |
//! | [`CHECKED_DELETE`] | delete the hash and its membership | `1` / `0` |
//!
//! Every object script takes the keys laid out by [`ObjectKeys`]:
//! `[registry, collection, hash, channel]`. The object id is derived on the
//! server by stripping `"<collection>:"` from the hash key.
//!
//! Each script has a Lua body for Redis and a native twin in [`native`] for
//! the in-memory backend; [`install`] registers the twins.

pub mod keys;
pub mod native;
pub mod ops;
pub mod scripts;

pub use keys::{KeyLayout, ObjectKeys};
pub use native::install;
pub use ops::{checked_delete, clear, hash_get_set, merge_into_set_if_distinct, set, touch, RawDiff};
pub use scripts::{ALL, CHECKED_DELETE, CLEAR, HASH_GET_SET, MERGE_INTO_SET_IF_DISTINCT, SET, TOUCH};
