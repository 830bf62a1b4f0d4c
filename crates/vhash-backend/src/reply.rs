use std::fmt;

/// A script or command reply.
///
/// Mirrors the subset of the Redis protocol that scripts produce: Lua
/// `false`/`nil` become [`Reply::Nil`], numbers become [`Reply::Int`],
/// strings become [`Reply::Bulk`], and tables become [`Reply::Array`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Int(i64),
    Bulk(String),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Integer value; a bulk string holding an integer also qualifies.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Bulk(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Bulk(s) => Some(s),
            _ => None,
        }
    }

    /// Bulk string as an owned option; `Nil` maps to `None`.
    pub fn into_opt_string(self) -> Option<String> {
        match self {
            Self::Bulk(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<Reply>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Build an array reply of bulk strings.
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(items.into_iter().map(|s| Self::Bulk(s.into())).collect())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "(nil)"),
            Self::Int(n) => write!(f, "(integer) {n}"),
            Self::Bulk(s) => write!(f, "{s:?}"),
            Self::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}
