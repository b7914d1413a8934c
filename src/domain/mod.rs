//! # Domain Model
//!
//! Plain records for folders, paths and secrets plus the query descriptor
//! that every repository accepts.

pub mod entity;
pub mod folder;
pub mod list_params;
pub mod path;
pub mod secret;

pub use entity::{new_uid, normalize_field, Entity};
pub use folder::Folder;
pub use list_params::{DeletedMode, ListParams, SortKey, TimeRange};
pub use path::Path;
pub use secret::Secret;
