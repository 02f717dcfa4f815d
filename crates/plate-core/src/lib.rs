mod blocks;
mod config;
mod core;
mod dialog;
mod error;
mod marks;
mod node_view;
mod notify;
mod ops;
mod overlay;
mod plugin;
mod schema;
mod session;
mod snapshot;
mod suggestion;
mod table;
mod tabs;

pub use crate::blocks::*;
pub use crate::config::*;
pub use crate::core::*;
pub use crate::dialog::*;
pub use crate::error::*;
pub use crate::marks::*;
pub use crate::node_view::*;
pub use crate::notify::*;
pub use crate::ops::*;
pub use crate::overlay::*;
pub use crate::plugin::*;
pub use crate::schema::*;
pub use crate::session::*;
pub use crate::snapshot::*;
pub use crate::suggestion::*;
pub use crate::table::*;
pub use crate::tabs::*;
