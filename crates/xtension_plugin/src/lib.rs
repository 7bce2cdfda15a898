//! # X-Tension Plugin
//!
//! The DLL the host loads.
//!
//! This crate provides:
//! - The exported `XT_*` entry points
//! - A process-wide [`Session`] created by `XT_Init` and dropped by `XT_Done`
//! - [`ItemReport`], the extension the entry points drive
//!
//! No panic crosses an entry point: each one catches unwinds and answers
//! the host with the most conservative code for that call.

#![warn(missing_docs)]
#![allow(non_snake_case)]

mod report;

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::{error, warn};
use xtension_core::abi::{CodePages, SearchHitInformation, SearchPreparationInformation};
use xtension_core::dispatch::{INIT_OK, INIT_REJECT};
use xtension_core::{BindingConfig, CallerContext, HostModule, Result, Session};

pub use report::{ItemReport, ReportFormat, VolumeSummary, DEFAULT_READ_LIMIT};

static SESSION: Mutex<Option<Session<ItemReport>>> = Mutex::new(None);

/// Runs `f` on the live session, or returns `fallback` when there is none or
/// `f` panics.
fn with_session(
    entry: &'static str,
    fallback: i32,
    f: impl FnOnce(&mut Session<ItemReport>) -> i32,
) -> i32 {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut session = SESSION.lock();
        match session.as_mut() {
            Some(session) => f(session),
            None => {
                warn!(entry, "entry point called without a session");
                fallback
            }
        }
    }));
    outcome.unwrap_or_else(|_| {
        error!(entry, "extension panicked");
        fallback
    })
}

fn start(version: u32, flags: u32) -> Result<Session<ItemReport>> {
    let caller = CallerContext::from_raw(version, flags);
    let config = BindingConfig::from_env()?;
    let module = HostModule::current()?;
    Session::start(module, config, ItemReport::new(ReportFormat::from_env()), &caller)
}

/// Binds the host. Returns 1, or -1 if the host lacks a required function.
#[no_mangle]
pub extern "system" fn XT_Init(
    version: u32,
    flags: u32,
    _main_window: *mut c_void,
    _reserved: *mut c_void,
) -> i32 {
    let started = panic::catch_unwind(|| start(version, flags));
    match started {
        Ok(Ok(session)) => {
            if let Some(previous) = SESSION.lock().replace(session) {
                warn!("XT_Init called twice; replacing the previous session");
                drop(previous);
            }
            INIT_OK
        }
        Ok(Err(err)) => {
            error!(%err, "binding failed");
            INIT_REJECT
        }
        Err(_) => INIT_REJECT,
    }
}

/// Unloads the extension.
#[no_mangle]
pub extern "system" fn XT_Done(_reserved: *mut c_void) -> i32 {
    let finished = panic::catch_unwind(|| {
        if let Some(session) = SESSION.lock().take() {
            session.done();
        }
    });
    if finished.is_err() {
        error!("extension panicked while unloading");
    }
    0
}

/// Describes the extension.
#[no_mangle]
pub extern "system" fn XT_About(_parent_window: *mut c_void, _reserved: *mut c_void) -> i32 {
    with_session("XT_About", 0, Session::about)
}

/// Starts an operation on a volume.
#[no_mangle]
pub extern "system" fn XT_Prepare(
    volume: *mut c_void,
    evidence: *mut c_void,
    action: u32,
    _reserved: *mut c_void,
) -> i32 {
    with_session("XT_Prepare", -3, |session| {
        session.prepare(volume as usize, evidence as usize, action as i32)
    })
}

/// Completes an operation on a volume.
#[no_mangle]
pub extern "system" fn XT_Finalize(
    volume: *mut c_void,
    evidence: *mut c_void,
    action: u32,
    _reserved: *mut c_void,
) -> i32 {
    with_session("XT_Finalize", 0, |session| {
        session.finalize(volume as usize, evidence as usize, action as i32)
    })
}

/// Processes one item.
#[no_mangle]
pub extern "system" fn XT_ProcessItem(item: i32, _reserved: *mut c_void) -> i32 {
    with_session("XT_ProcessItem", 0, |session| session.process_item(item))
}

/// Offers the search terms before a simultaneous search.
#[no_mangle]
pub extern "system" fn XT_PrepareSearch(
    info: *mut SearchPreparationInformation,
    pages: *const CodePages,
) -> i32 {
    // SAFETY: the host passes valid preparation data and code pages.
    with_session("XT_PrepareSearch", 0, |session| unsafe {
        session.prepare_search_raw(info, pages)
    })
}

/// Processes one search hit.
#[no_mangle]
pub extern "system" fn XT_ProcessSearchHit(info: *const SearchHitInformation) -> i32 {
    if info.is_null() {
        return 0;
    }
    // SAFETY: checked non-null; the host passes a valid hit for this call.
    let info = unsafe { info.read_unaligned() };
    with_session("XT_ProcessSearchHit", 0, |session| session.process_search_hit(&info))
}
