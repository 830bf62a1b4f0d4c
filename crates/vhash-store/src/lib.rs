//! Versioned object store for vhash.
//!
//! A [`Store`] owns one backend connection, the script digest cache and the
//! callback registries. Objects are reached through borrowed handles:
//!
//! - [`Dao`]: one object, with reads, versioned `set`/`clear`/`touch`, `delete`
//! - [`Index`]: one collection, with membership, count and ids
//!
//! Every successful mutation yields a [`Modification`] and is dispatched
//! synchronously to the handlers registered with [`Store::on_insert`],
//! [`Store::on_change`] and [`Store::on_delete`].
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use vhash_store::Store;
//!
//! # fn main() -> vhash_store::Result<()> {
//! let store = Store::in_memory()?;
//! store.on_change("user", "name", |dao, _field, before, after| {
//!     println!("{}: {before} -> {after}", dao.id());
//!     Ok(())
//! });
//!
//! let user = store.dao("user", "42");
//! user.set(&[json!("name"), json!("Alice")])?;
//! assert_eq!(user.get("name")?.decode::<String>()?, Some("Alice".into()));
//! store.close()?;
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod config;
pub mod dao;
pub mod error;
pub mod index;
pub mod lifecycle;
pub mod modification;
pub mod store;

pub use callbacks::{ChangeHandler, DeleteHandler, InsertHandler};
pub use config::StoreConfig;
pub use dao::Dao;
pub use error::{Result, StoreError};
pub use index::Index;
pub use lifecycle::{ShutdownLatch, Subsystem};
pub use modification::Modification;
pub use store::Store;
pub use vhash_backend::Reply;
pub use vhash_script::Script;
