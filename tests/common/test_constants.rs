//! Shared constants for integration tests.
//!
//! Files under `tests/common/` are not test binaries of their own; pull them
//! into a top-level test with:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Instance type the scenarios launch when capacity is available.
pub const DEFAULT_INSTANCE_TYPE: &str = "gpu_1x_a6000";

/// Region the scenarios launch into.
pub const DEFAULT_REGION: &str = "us-east-1";
