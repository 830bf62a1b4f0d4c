use crate::value::RawValue;

/// One field's transition inside a single atomic mutation.
///
/// For a `clear`, `after` is [`RawValue::Missing`]. For the first write of a
/// field, `before` is [`RawValue::Missing`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub before: RawValue,
    pub after: RawValue,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, before: RawValue, after: RawValue) -> Self {
        Self {
            field: field.into(),
            before,
            after,
        }
    }

    /// A change that removed the field.
    pub fn cleared(field: impl Into<String>, before: RawValue) -> Self {
        Self::new(field, before, RawValue::Missing)
    }

    /// Returns `true` if the field did not exist before this change.
    pub fn is_addition(&self) -> bool {
        self.before.is_missing() && self.after.is_present()
    }

    /// Returns `true` if the field no longer exists after this change.
    pub fn is_removal(&self) -> bool {
        self.after.is_missing()
    }

    pub fn is_internal(&self) -> bool {
        crate::is_internal_field(&self.field)
    }
}
