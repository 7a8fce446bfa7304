// # Common Types
//
// Shared identifiers and fixed dimensions used across the engine modules.

// ============================================================================
// Type Aliases - Shared Identifiers
// ============================================================================

/// Logical time. The transaction manager owns a single monotonically
/// increasing clock; every observable event is stamped with its value.
pub type Timestamp = u64;

/// Globally unique, monotonically increasing operation identifier.
/// Assigned at queueing time; defines the FIFO dispatch order across all
/// transactions.
pub type OperationId = u64;

/// One-based site index (1..=SITE_COUNT).
pub type SiteId = usize;

/// Opaque transaction handle: an index into the manager's transaction
/// table. Lock holders, queues, and wait-for edges store these instead of
/// references so the object graph stays acyclic.
pub type TransactionId = usize;

// ============================================================================
// Fixed Dimensions
// ============================================================================

/// Number of storage sites.
pub const SITE_COUNT: usize = 10;

/// Number of data items (`x1` .. `x20`).
pub const ITEM_COUNT: u32 = 20;
