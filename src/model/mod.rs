//! Models - tracked records and the change trackers behind them.
//!
//! A [`Model`] wraps one record of a schema type. Attribute values live in a
//! [`Properties`] tracker, has-many relationships in a [`Collection`] (wrapped by
//! [`HasMany`] to support lazily-loaded inverse sides) and embeds in trackers of
//! [`EmbeddedModel`]. The trackers diff current state against the last load, so
//! [`Model::change_set`] reports only what changed.
//!
//! ## Example
//!
//! ```ignore
//! let widget = store.find("widget", "5")?;
//! widget.set("name", "B")?;
//! assert!(widget.is_dirty());
//! widget.save()?;
//! ```

mod change_set;
mod collection;
mod embedded;
mod key;
#[allow(clippy::module_inception)]
mod model;
mod properties;
mod state;

pub use change_set::{Change, ChangeSet};
pub use collection::{Collection, HasMany};
pub use embedded::EmbeddedModel;
pub use key::ModelKey;
pub use model::{Model, ModelContext};
pub use properties::Properties;
pub use state::ModelState;
