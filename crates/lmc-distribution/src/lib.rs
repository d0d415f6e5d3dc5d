//! Splitting a selection of leads across callers.
//!
//! [`allocator`] turns typed values into per-agent counts, [`preview`] wraps
//! that in what the dialog shows, and [`executor`] cuts the selection into
//! slices and assigns them one call at a time.

pub mod allocator;
pub mod executor;
pub mod preview;

pub use allocator::{
    allocate, distribute_equally, equal_split, AgentShare, Allocation, AllocationEntry,
    AllocationMode, AllocationRequest,
};
pub use executor::{execute, plan_slices, AssignmentError, AssignmentSlice, ExecutionReport, PlanError};
pub use preview::{AllocationPreview, Balance, PercentBalance, PreviewRow};
