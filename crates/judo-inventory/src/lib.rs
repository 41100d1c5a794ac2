//! Target resolution: turns user-supplied host/group names into a flat,
//! deduplicated, ordered list of [`Host`]s.

mod host;
mod inventory;
mod seen;

pub use host::{Host, MasterState};
pub use inventory::Inventory;
pub use seen::SeenSet;
