//! Combination allocator: picks free codes summing exactly to a target and
//! reserves them in one atomic step.

mod combination;
mod search;

pub use combination::{AllocationError, Basket, CombinationAllocator, DEFAULT_ALLOCATION_ATTEMPTS};
pub use search::find_exact_subset;
