//! Foundation types for vhash, a versioned object store on a scripted
//! key-value backend.
//!
//! Every other vhash crate depends on `vhash-types`. The types here describe
//! what a mutation produced, independent of how it was executed.
//!
//! # Key Types
//!
//! - [`RawValue`]: a stored field value, or the explicit *missing* marker
//! - [`RawValues`]: ordered result of a batched field read
//! - [`FieldChange`]: one field's before/after pair inside a mutation
//! - [`ObjectRef`]: `"<collection>/<id>"` reference to an object
//! - [`Notification`]: payload published on a collection's change channel
//!
//! # Field naming
//!
//! The field [`VERSION_FIELD`] holds the per-object version counter. Fields
//! starting with [`INTERNAL_PREFIX`] are internal: they appear in diffs but
//! never in the published `set` payload.

pub mod change;
pub mod error;
pub mod notification;
pub mod reference;
pub mod value;

pub use change::FieldChange;
pub use error::{Result, TypeError};
pub use notification::{Notification, NotificationBody};
pub use reference::ObjectRef;
pub use value::{encode_value, RawValue, RawValues};

/// Reserved hash field holding the version counter.
pub const VERSION_FIELD: &str = "v";

/// Prefix marking a field as internal.
pub const INTERNAL_PREFIX: char = '_';

/// Field key under which change handlers receive every field.
pub const WILDCARD_FIELD: &str = "*";

/// Returns `true` if `field` is internal (excluded from `set` notifications).
pub fn is_internal_field(field: &str) -> bool {
    field.starts_with(INTERNAL_PREFIX)
}
