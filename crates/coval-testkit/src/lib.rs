//! # Coval Testkit
//!
//! Testing utilities for coval.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: deterministic agents, prebuilt group and account logs,
//!   a shared test clock and fast sync settings
//! - **Generators**: proptest strategies for IDs, known states, map
//!   operations and multi-batch logs
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use coval_testkit::generators::{log_from_params, LogParams};
//!
//! proptest! {
//!     #[test]
//!     fn chain_is_reproducible(params: LogParams) {
//!         let (agent, log) = log_from_params(&params).unwrap();
//!         let session = log.session(&agent.session).unwrap();
//!         prop_assert_eq!(session.recompute_hash().unwrap(), session.last_hash());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use coval_testkit::fixtures::{group_log, TestAgent};
//!
//! let admin = TestAgent::with_seed([7; 32]);
//! let group = group_log(&admin, 1).unwrap();
//! assert!(group.header().is_group());
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    account_log, allow_all_log, fast_sync_config, group_log, multi_agent_fixtures, owned_log,
    trusting_batch, wait_until, TestAgent, TestClock,
};
pub use generators::{log_from_params, LogParams};
