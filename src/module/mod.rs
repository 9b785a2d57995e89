//! WordPress module directories: discovery, preparation, the link farm and
//! the synchronization pass that ties them together.

pub mod discovery;
pub mod farm;
pub mod prepare;
pub mod reconcile;

pub use discovery::{DirEntry, find_module_dirs, list_entries};
pub use farm::{FarmReport, rebuild_farm, unlink_module};
pub use prepare::prepare_module_dirs;
pub use reconcile::{MissingPolicy, ReconcileOptions, ReconcileReport, Reconciler};
