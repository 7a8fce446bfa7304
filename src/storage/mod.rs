// Storage layer: per-site versioned values, the per-item FIFO locks owned
// by each site's lock table, and the data-item catalog.

pub mod catalog;
pub mod lock;
pub mod site;

pub use catalog::{parse_item_index, Catalog, DataItem};
pub use lock::{FifoLock, LockGrant, LockMode};
pub use site::{Site, SiteRead, SiteStatus, SiteWrite};
