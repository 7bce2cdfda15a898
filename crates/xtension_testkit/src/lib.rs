//! # X-Tension Testkit
//!
//! Test utilities for the X-Tension bindings.
//!
//! This crate provides:
//! - An in-process mock host exporting every `XWF_*` function
//! - Fault injection and call recording for those functions
//! - Item tree fixtures with their expected paths
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xtension_testkit::prelude::*;
//!
//! #[test]
//! fn reads_case_title() {
//!     let host = MockHost::new()
//!         .case_property(CaseProperty::Title, "Case A")
//!         .bind()
//!         .unwrap();
//!     assert_eq!(host.case_properties().unwrap().title.as_deref(), Some("Case A"));
//! }
//! ```
//!
//! Mock state is thread-local: each test thread sees only the host it
//! installed.

#![warn(missing_docs)]

pub mod exports;
pub mod fixtures;
pub mod generators;
pub mod mock;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::mock::*;
}

pub use fixtures::*;
pub use generators::*;
pub use mock::*;
