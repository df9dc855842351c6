//! One module per RPC method family, dispatched from [`crate::daemon::dispatcher`].

pub mod calls;
pub mod files;
pub mod grep;
pub mod misc;
pub mod move_file;
pub mod proxies;
pub mod rename;
pub mod show;
pub mod type_hierarchy;
