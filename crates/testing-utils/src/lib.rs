//! # Batcher Testing Utils
//!
//! Shared testing utilities for the batch scheduler workspace.
//!
//! - **Mock collaborators**: in-memory launcher, target inspector, worker
//!   inventory, requirement estimator, completion sink and a manual clock
//! - **Test data builders**: snapshots, requirement sets and completion messages
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! batcher-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
