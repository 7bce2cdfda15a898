//! # X-Tension Core
//!
//! Safe binding layer for the X-Ways Forensics X-Tension API.
//!
//! This crate provides:
//! - Resolution of the host's exported `XWF_*` functions into a typed table
//! - Scoped buffers and the growing retry for host functions that fill
//!   caller-provided memory
//! - Typed adapters for every host function, with its failure convention
//!   turned into a `Result`
//! - Tracking of volume, item, evidence and container handles
//! - The `XT_*` entry-point protocol, driven through the [`Extension`] trait
//! - A `tracing` writer that forwards events to the host's message window
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xtension_core::{BindingConfig, Extension, HostModule, Session};
//!
//! let module = HostModule::current()?;
//! let session = Session::start(module, BindingConfig::from_env()?, MyExtension, &caller)?;
//! ```

#![warn(missing_docs)]

pub mod abi;
pub mod adapters;
pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod host;
pub mod log;
pub mod symbols;
pub mod types;

pub use adapters::{
    Association, Block, CaseProperties, CopyRange, EvidenceProperties, Event, HashSlot, HashValue,
    ItemOffsets, ItemType, Progress, RasterImage, ReportTable, SearchRequest, SectorContents,
    VolumeInformation,
};
pub use buffer::{BufferLedger, BufferStats, ForeignBuffer, ScopedBuffer};
pub use config::{BindingConfig, Growth, GrowthPolicy};
pub use dispatch::{
    CallerContext, Extension, FinalizeOutcome, HitOutcome, ItemOutcome, Operation, PrepareOutcome,
    SearchHit, SearchPrepOutcome, SearchTerms, Session,
};
pub use error::{ErrorClass, Result, XwfError};
pub use handle::{Container, Evidence, Handle, HandleOrigin, HandleRegistry, HandleState, Item, Volume};
pub use host::Host;
pub use symbols::{FunctionTable, HostModule, SymbolSource, REQUIRED_SYMBOLS};
pub use types::{FileTime, ItemId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
