//! Data structures shared across capsules: an intrusive linked list used
//! for the header ring and reassembly table, and interior-mutability
//! cells used in place of heap allocation.

pub mod cells;
pub mod list;
