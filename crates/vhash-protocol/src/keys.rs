//! Key naming for collections, objects and change channels.

/// Naming scheme for the keys behind collections and objects.
///
/// - registry set (configurable, default `collections`): every collection name
/// - `<collection>`: sorted set of member ids scored by insertion/activity
/// - `<collection>:<id>`: the object's hash
/// - `<collection>.change`: the collection's notification channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyLayout {
    registry: String,
}

impl KeyLayout {
    pub const DEFAULT_REGISTRY: &'static str = "collections";

    pub fn new(registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
        }
    }

    /// Key of the set listing every collection name.
    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn hash_key(&self, collection: &str, id: &str) -> String {
        format!("{collection}:{id}")
    }

    pub fn channel(&self, collection: &str) -> String {
        format!("{collection}.change")
    }

    /// All keys an object script needs.
    pub fn object(&self, collection: &str, id: &str) -> ObjectKeys {
        ObjectKeys {
            registry: self.registry.clone(),
            collection: collection.to_string(),
            hash: self.hash_key(collection, id),
            channel: self.channel(collection),
        }
    }
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REGISTRY)
    }
}

/// The `KEYS` vector of an object script, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKeys {
    pub registry: String,
    pub collection: String,
    pub hash: String,
    pub channel: String,
}

impl ObjectKeys {
    pub fn to_vec(&self) -> Vec<String> {
        vec![
            self.registry.clone(),
            self.collection.clone(),
            self.hash.clone(),
            self.channel.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let layout = KeyLayout::default();
        let keys = layout.object("user", "42");
        assert_eq!(
            keys.to_vec(),
            vec!["collections", "user", "user:42", "user.change"]
        );
    }

    #[test]
    fn custom_registry() {
        let layout = KeyLayout::new("app:types");
        assert_eq!(layout.registry(), "app:types");
        assert_eq!(layout.object("order", "7").registry, "app:types");
    }

    #[test]
    fn ids_may_contain_separators() {
        let layout = KeyLayout::default();
        assert_eq!(layout.hash_key("file", "a:b/c"), "file:a:b/c");
    }
}
