use std::fmt;

/// A server-side script: a stable name for diagnostics plus its body.
///
/// The body is the cache key for digests, so two scripts with the same body
/// share one server-side entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Script {
    name: &'static str,
    body: &'static str,
}

impl Script {
    pub const fn new(name: &'static str, body: &'static str) -> Self {
        Self { name, body }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn body(&self) -> &'static str {
        self.body
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("len", &self.body.len())
            .finish()
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
