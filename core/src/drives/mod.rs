// Volume discovery and volume-level operations
//
// - inventory.rs: enumerating mounted volumes (sysinfo) and resolving paths
// - trim.rs: TRIM and defragmentation hints via platform tools
// - privileges.rs: elevation probe for plans that need admin rights

pub mod inventory;
pub mod privileges;
pub mod trim;

pub use inventory::{resolve_disk, DiskInventory, StaticInventory, SysinfoInventory};
pub use privileges::is_elevated;
pub use trim::TrimOperations;
