//! Unit tests for the remote module.

mod fixtures;
mod util;
