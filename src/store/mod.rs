//! Store - the identity map and unit of work.
//!
//! A [`Store`] resolves records through a [`Persister`], keeps exactly one
//! [`Model`](crate::model::Model) per `(type, id)` and runs the commit state machine:
//! new models are created, models marked for deletion are deleted and dirty models are
//! updated. Created and updated models are re-read afterwards so server-assigned values
//! show up.
//!
//! ## Example
//!
//! ```ignore
//! use docmapper::store::{InMemoryPersister, Store};
//!
//! let store = Store::new(registry, InMemoryPersister::new());
//! let widget = store.create("widget", None)?;
//! widget.set("name", "A")?;
//! widget.save()?;
//!
//! let again = store.find("widget", widget.id())?;
//! assert!(again.ptr_eq(&widget));
//! ```

mod config;
mod events;
mod identity_map;
mod in_memory;
mod persister;
mod query;
mod record;
#[allow(clippy::module_inception)]
mod store;

pub use config::StoreConfig;
pub use events::LifecycleEvent;
pub use in_memory::InMemoryPersister;
pub use persister::{Persister, TYPE_PROPERTY};
pub use query::{Query, SortOrder};
pub use record::{PropertyMap, Record};
pub use store::Store;
