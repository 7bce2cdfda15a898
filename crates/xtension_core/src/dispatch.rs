//! The entry-point protocol.
//!
//! The host drives an extension through a fixed sequence of exported
//! functions: `XT_Init` once, then for each operation `XT_Prepare`, zero or
//! more `XT_ProcessItem` or `XT_ProcessSearchHit` calls and `XT_Finalize`,
//! and finally `XT_Done`. A [`Session`] turns that sequence into calls on an
//! [`Extension`], owns the [`Host`] they share and maps every outcome to the
//! integer code the host expects.
//!
//! Errors returned by the extension are logged and the operation continues.
//! Only a failure to bind the host stops the extension, by making `XT_Init`
//! return -1.

use std::thread::{self, ThreadId};

use tracing::{debug, error, info, warn};

use crate::abi::{CallerInformation, CodePages, SearchHitInformation, SearchPreparationInformation};
use crate::buffer::{from_wide_ptr, to_wide};
use crate::config::BindingConfig;
use crate::error::{Result, XwfError};
use crate::handle::{Evidence, Handle, Volume};
use crate::host::Host;
use crate::symbols::SymbolSource;
use crate::types::{ActionSource, CallerFlags, ItemId, PrepareFlags, SearchFlags};

/// `XT_Init` result that keeps the extension loaded.
pub const INIT_OK: i32 = 1;

/// `XT_Init` result that unloads the extension.
pub const INIT_REJECT: i32 = -1;

/// What the host told the extension about itself in `XT_Init`.
#[derive(Debug, Clone, Copy)]
pub struct CallerContext {
    /// Version, service release and language.
    pub info: CallerInformation,
    /// Calling program and mode.
    pub flags: CallerFlags,
}

impl CallerContext {
    /// Decodes the raw `XT_Init` arguments.
    pub fn from_raw(version: u32, flags: u32) -> Self {
        Self {
            info: CallerInformation::from_packed(version),
            flags: CallerFlags::from_bits(flags),
        }
    }

    /// Host version as "major.minor".
    pub fn version(&self) -> String {
        let version = self.info.version;
        format!("{}.{}", version / 100, version % 100)
    }
}

/// The operation announced by `XT_Prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Volume being processed, lent by the host.
    pub volume: Option<Handle<Volume>>,
    /// Evidence object of that volume, lent by the host.
    pub evidence: Option<Handle<Evidence>>,
    /// What started the operation.
    pub source: ActionSource,
}

/// Answer to `XT_Prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Continue; the flags select further callbacks.
    Proceed(PrepareFlags),
    /// No further calls for this volume, not even `XT_Finalize`.
    SkipVolume,
    /// Exclude this volume from the operation.
    ExcludeVolume,
    /// Do not use the extension for the rest of the operation.
    Withdraw,
    /// Stop the whole operation.
    StopOperation,
}

impl PrepareOutcome {
    /// The code returned to the host.
    pub fn code(self) -> i32 {
        match self {
            PrepareOutcome::Proceed(flags) => flags.bits() as i32,
            PrepareOutcome::SkipVolume => -1,
            PrepareOutcome::ExcludeVolume => -2,
            PrepareOutcome::Withdraw => -3,
            PrepareOutcome::StopOperation => -4,
        }
    }
}

/// Answer to `XT_ProcessItem`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemOutcome {
    /// Go on with the next item.
    #[default]
    Continue,
    /// Stop the operation.
    Stop,
    /// Skip the host's remaining refinement steps for this item.
    SkipRemaining,
}

impl ItemOutcome {
    /// The code returned to the host.
    pub fn code(self) -> i32 {
        match self {
            ItemOutcome::Continue => 0,
            ItemOutcome::Stop => -1,
            ItemOutcome::SkipRemaining => -2,
        }
    }
}

/// Answer to `XT_Finalize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalizeOutcome {
    /// Nothing to do.
    #[default]
    Done,
    /// Refresh the directory browser.
    Refresh,
}

impl FinalizeOutcome {
    /// The code returned to the host.
    pub fn code(self) -> i32 {
        match self {
            FinalizeOutcome::Done => 0,
            FinalizeOutcome::Refresh => 1,
        }
    }
}

/// Answer to `XT_PrepareSearch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPrepOutcome {
    /// Terms left as they were.
    #[default]
    Unchanged,
    /// Terms were adjusted.
    Adjusted,
    /// Unselect the extension for this search.
    Reject,
}

impl SearchPrepOutcome {
    /// The code returned to the host.
    pub fn code(self) -> i32 {
        match self {
            SearchPrepOutcome::Unchanged => 0,
            SearchPrepOutcome::Adjusted => 1,
            SearchPrepOutcome::Reject => -1,
        }
    }
}

/// Answer to `XT_ProcessSearchHit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitOutcome {
    /// Keep searching.
    #[default]
    Continue,
    /// Abort the search.
    Abort,
    /// Keep searching without further calls.
    StopCalling,
}

impl HitOutcome {
    /// The code returned to the host.
    pub fn code(self) -> i32 {
        match self {
            HitOutcome::Continue => 0,
            HitOutcome::Abort => -1,
            HitOutcome::StopCalling => -2,
        }
    }
}

/// Search terms offered to `XT_PrepareSearch`, editable by the extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchTerms {
    /// One term per entry.
    pub terms: Vec<String>,
    /// Current search options.
    pub flags: SearchFlags,
    /// Active code pages.
    pub code_pages: Vec<u16>,
    capacity: usize,
}

impl SearchTerms {
    /// Terms with room for `capacity` UTF-16 units including the terminator.
    pub fn new(terms: Vec<String>, capacity: usize) -> Self {
        Self {
            terms,
            capacity,
            ..Self::default()
        }
    }

    /// Decodes the host's preparation data.
    ///
    /// # Safety
    ///
    /// `info.search_terms` must be null or point to `info.buffer_len`
    /// writable units; `pages` must be null or valid.
    pub unsafe fn from_raw(info: &SearchPreparationInformation, pages: *const CodePages) -> Self {
        let capacity = info.buffer_len as usize;
        // SAFETY: the buffer holds at most `capacity` readable units.
        let text = unsafe { from_wide_ptr(info.search_terms, capacity) }.unwrap_or_default();
        let code_pages = if pages.is_null() {
            Vec::new()
        } else {
            // SAFETY: checked non-null; the caller guarantees validity.
            let pages = unsafe { pages.read_unaligned() };
            let slots = pages.code_pages;
            slots.iter().copied().filter(|page| *page != 0).collect()
        };
        Self {
            terms: split_terms(&text),
            flags: SearchFlags::from_bits(info.flags),
            code_pages,
            capacity,
        }
    }

    /// Room in the host buffer, in UTF-16 units.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The terms as the host stores them.
    pub fn encode(&self) -> Result<Vec<u16>> {
        let encoded = to_wide(&self.terms.join("\r\n"))?;
        if encoded.len() > self.capacity {
            return Err(XwfError::invalid(format!(
                "search terms need {} units, buffer holds {}",
                encoded.len(),
                self.capacity
            )));
        }
        Ok(encoded)
    }

    /// Writes the terms back into the host's buffer.
    ///
    /// # Safety
    ///
    /// As for [`SearchTerms::from_raw`].
    pub unsafe fn write_back(&self, info: &SearchPreparationInformation) -> Result<()> {
        let target = info.search_terms;
        if target.is_null() {
            return Err(XwfError::invalid("host provided no search term buffer"));
        }
        let encoded = self.encode()?;
        // SAFETY: `encode` checked the length against the host's capacity.
        unsafe { std::ptr::copy_nonoverlapping(encoded.as_ptr(), target, encoded.len()) };
        Ok(())
    }
}

fn split_terms(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|term| term.trim_end_matches('\r'))
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

/// A search hit reported to `XT_ProcessSearchHit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    /// Item containing the hit.
    pub item: Option<ItemId>,
    /// Offset within the item.
    pub relative_offset: Option<i64>,
    /// Offset within the volume.
    pub absolute_offset: Option<i64>,
    /// Id of the matching search term.
    pub term_id: u16,
    /// Hit length in bytes.
    pub length: u16,
    /// Code page of the hit.
    pub code_page: u16,
    /// Hit flags.
    pub flags: u16,
}

impl From<&SearchHitInformation> for SearchHit {
    fn from(info: &SearchHitInformation) -> Self {
        let info = *info;
        let (relative_offset, absolute_offset) = (info.relative_offset, info.absolute_offset);
        Self {
            item: ItemId::from_host(i64::from(info.item_id)),
            relative_offset: (relative_offset >= 0).then_some(relative_offset),
            absolute_offset: (absolute_offset >= 0).then_some(absolute_offset),
            term_id: info.search_term_id,
            length: info.length,
            code_page: info.code_page,
            flags: info.flags,
        }
    }
}

/// The behaviour of an extension. Every method but [`Extension::name`] has
/// a default that accepts and does nothing.
#[allow(unused_variables)]
pub trait Extension {
    /// Name shown in diagnostics.
    fn name(&self) -> &str;

    /// Called once the host is bound.
    fn init(&mut self, host: &mut Host, caller: &CallerContext) -> Result<()> {
        Ok(())
    }

    /// Describes the extension to the user.
    fn about(&mut self, host: &mut Host) -> Result<()> {
        Ok(())
    }

    /// An operation starts on a volume.
    fn prepare(&mut self, host: &mut Host, operation: &Operation) -> Result<PrepareOutcome> {
        Ok(PrepareOutcome::Proceed(PrepareFlags::empty()))
    }

    /// Processes one item.
    fn process_item(&mut self, host: &mut Host, operation: &Operation, item: ItemId) -> Result<ItemOutcome> {
        Ok(ItemOutcome::Continue)
    }

    /// The operation on the volume completed.
    fn finalize(&mut self, host: &mut Host, operation: &Operation) -> Result<FinalizeOutcome> {
        Ok(FinalizeOutcome::Done)
    }

    /// A search is about to start.
    fn prepare_search(&mut self, host: &mut Host, terms: &mut SearchTerms) -> Result<SearchPrepOutcome> {
        Ok(SearchPrepOutcome::Unchanged)
    }

    /// Processes one search hit.
    fn process_search_hit(&mut self, host: &mut Host, hit: &SearchHit) -> Result<HitOutcome> {
        Ok(HitOutcome::Continue)
    }

    /// The extension is about to be unloaded.
    fn done(&mut self, host: &mut Host) {}
}

/// A bound host driving one extension.
pub struct Session<E> {
    host: Host,
    extension: E,
    owner: ThreadId,
    operation: Option<Operation>,
}

impl<E: Extension> Session<E> {
    /// Binds the host and initializes the extension: the work of `XT_Init`.
    ///
    /// The calling thread becomes the only thread the session accepts calls from.
    pub fn start<S>(source: S, config: BindingConfig, mut extension: E, caller: &CallerContext) -> Result<Self>
    where
        S: SymbolSource + Send + 'static,
    {
        let mut host = Host::bind(source, config)?;
        info!(
            extension = extension.name(),
            host_version = %caller.version(),
            flags = caller.flags.bits(),
            "extension initialized"
        );
        extension.init(&mut host, caller)?;
        Ok(Self {
            host,
            extension,
            owner: thread::current().id(),
            operation: None,
        })
    }

    /// The bound host.
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// The bound host, mutably.
    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    /// The extension.
    pub fn extension(&self) -> &E {
        &self.extension
    }

    /// The operation in progress, if any.
    pub fn operation(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }

    fn check_thread(&self, entry: &'static str) -> Result<()> {
        if thread::current().id() == self.owner {
            Ok(())
        } else {
            error!(entry, "entry point called from a foreign thread");
            Err(XwfError::WrongThread)
        }
    }

    fn report(&self, entry: &'static str, err: &XwfError) {
        error!(entry, extension = self.extension.name(), %err, class = ?err.class(), "extension call failed");
    }

    /// `XT_About`.
    pub fn about(&mut self) -> i32 {
        if self.check_thread("XT_About").is_ok() {
            if let Err(err) = self.extension.about(&mut self.host) {
                self.report("XT_About", &err);
            }
        }
        0
    }

    /// `XT_Prepare`. `volume` and `evidence` are raw host handles, 0 for none.
    pub fn prepare(&mut self, volume: usize, evidence: usize, action: i32) -> i32 {
        if self.check_thread("XT_Prepare").is_err() {
            return PrepareOutcome::Withdraw.code();
        }
        if self.operation.take().is_some() {
            warn!("operation started before the previous one was finalized");
            self.host.end_operation();
        }
        let operation = match self.begin(volume, evidence, action) {
            Ok(operation) => operation,
            Err(err) => {
                self.report("XT_Prepare", &err);
                self.host.end_operation();
                return PrepareOutcome::Withdraw.code();
            }
        };
        let outcome = match self.extension.prepare(&mut self.host, &operation) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.report("XT_Prepare", &err);
                PrepareOutcome::Proceed(PrepareFlags::empty())
            }
        };
        debug!(?operation, ?outcome, "prepared");
        if matches!(outcome, PrepareOutcome::Proceed(_)) {
            self.operation = Some(operation);
        } else {
            self.host.end_operation();
        }
        outcome.code()
    }

    fn begin(&mut self, volume: usize, evidence: usize, action: i32) -> Result<Operation> {
        let source = ActionSource::from_raw(action)
            .ok_or_else(|| XwfError::invalid(format!("unknown action source {action}")))?;
        let volume = match volume {
            0 => None,
            raw => Some(self.host.adopt_volume(raw)?),
        };
        let evidence = match evidence {
            0 => None,
            raw => Some(self.host.adopt_evidence(raw)?),
        };
        Ok(Operation {
            volume,
            evidence,
            source,
        })
    }

    /// `XT_ProcessItem`.
    pub fn process_item(&mut self, item: i32) -> i32 {
        if self.check_thread("XT_ProcessItem").is_err() {
            return ItemOutcome::Stop.code();
        }
        let Some(operation) = self.operation else {
            self.report("XT_ProcessItem", &XwfError::NotInitialized);
            return ItemOutcome::Continue.code();
        };
        let outcome = ItemId::new(item)
            .and_then(|item| self.extension.process_item(&mut self.host, &operation, item));
        match outcome {
            Ok(outcome) => outcome.code(),
            Err(err) => {
                self.report("XT_ProcessItem", &err);
                if err.is_fatal() {
                    ItemOutcome::Stop.code()
                } else {
                    ItemOutcome::Continue.code()
                }
            }
        }
    }

    /// `XT_Finalize`. Retires the handles lent for the operation.
    pub fn finalize(&mut self, volume: usize, evidence: usize, action: i32) -> i32 {
        if self.check_thread("XT_Finalize").is_err() {
            return FinalizeOutcome::Done.code();
        }
        let operation = match self.operation.take() {
            Some(operation) => Ok(operation),
            None => self.begin(volume, evidence, action),
        };
        let outcome = operation.and_then(|operation| self.extension.finalize(&mut self.host, &operation));
        let retired = self.host.end_operation();
        debug!(retired, stats = ?self.host.buffer_stats(), "operation finalized");
        match outcome {
            Ok(outcome) => outcome.code(),
            Err(err) => {
                self.report("XT_Finalize", &err);
                FinalizeOutcome::Done.code()
            }
        }
    }

    /// `XT_PrepareSearch` with decoded terms.
    pub fn prepare_search(&mut self, terms: &mut SearchTerms) -> i32 {
        if self.check_thread("XT_PrepareSearch").is_err() {
            return SearchPrepOutcome::Reject.code();
        }
        match self.extension.prepare_search(&mut self.host, terms) {
            Ok(outcome) => outcome.code(),
            Err(err) => {
                self.report("XT_PrepareSearch", &err);
                SearchPrepOutcome::Unchanged.code()
            }
        }
    }

    /// `XT_PrepareSearch` on the host's raw arguments.
    ///
    /// Adjusted terms are written back; if they do not fit, the host's terms
    /// are left untouched and the call reports no change.
    ///
    /// # Safety
    ///
    /// `info` must be null or valid; its term buffer and `pages` as for
    /// [`SearchTerms::from_raw`].
    pub unsafe fn prepare_search_raw(
        &mut self,
        info: *mut SearchPreparationInformation,
        pages: *const CodePages,
    ) -> i32 {
        if info.is_null() {
            self.report("XT_PrepareSearch", &XwfError::invalid("null search preparation data"));
            return SearchPrepOutcome::Unchanged.code();
        }
        // SAFETY: checked non-null; the caller guarantees validity.
        let info = unsafe { info.read_unaligned() };
        // SAFETY: upheld by the caller.
        let mut terms = unsafe { SearchTerms::from_raw(&info, pages) };
        let code = self.prepare_search(&mut terms);
        if code == SearchPrepOutcome::Adjusted.code() {
            // SAFETY: upheld by the caller.
            if let Err(err) = unsafe { terms.write_back(&info) } {
                self.report("XT_PrepareSearch", &err);
                return SearchPrepOutcome::Unchanged.code();
            }
        }
        code
    }

    /// `XT_ProcessSearchHit`.
    pub fn process_search_hit(&mut self, info: &SearchHitInformation) -> i32 {
        if self.check_thread("XT_ProcessSearchHit").is_err() {
            return HitOutcome::StopCalling.code();
        }
        let hit = SearchHit::from(info);
        match self.extension.process_search_hit(&mut self.host, &hit) {
            Ok(outcome) => outcome.code(),
            Err(err) => {
                self.report("XT_ProcessSearchHit", &err);
                HitOutcome::Continue.code()
            }
        }
    }

    /// `XT_Done`. Consumes the session and returns the extension.
    pub fn done(mut self) -> E {
        if self.check_thread("XT_Done").is_ok() {
            self.extension.done(&mut self.host);
        }
        self.host.end_operation();
        let stats = self.host.buffer_stats();
        if !stats.is_balanced() {
            warn!(?stats, "buffers outstanding at unload");
        }
        info!(extension = self.extension.name(), "extension unloaded");
        self.extension
    }
}

impl<E: Extension> std::fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("extension", &self.extension.name())
            .field("host", &self.host)
            .field("operation", &self.operation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_codes_match_host_protocol() {
        let flags = PrepareFlags::PROCESS_ITEMS | PrepareFlags::MAY_CREATE_ITEMS;
        assert_eq!(PrepareOutcome::Proceed(flags).code(), 5);
        assert_eq!(PrepareOutcome::Proceed(PrepareFlags::empty()).code(), 0);
        assert_eq!(PrepareOutcome::SkipVolume.code(), -1);
        assert_eq!(PrepareOutcome::StopOperation.code(), -4);
        assert_eq!(ItemOutcome::SkipRemaining.code(), -2);
        assert_eq!(FinalizeOutcome::Refresh.code(), 1);
        assert_eq!(SearchPrepOutcome::Reject.code(), -1);
        assert_eq!(HitOutcome::StopCalling.code(), -2);
    }

    #[test]
    fn caller_version_is_formatted() {
        let caller = CallerContext::from_raw(0x07F6_0201, 0x01);
        assert_eq!(caller.version(), "20.38");
        assert!(caller.flags.contains(CallerFlags::FORENSICS));
    }

    #[test]
    fn search_terms_split_on_line_breaks() {
        assert_eq!(split_terms("alpha\r\nbeta\n\ngamma"), vec!["alpha", "beta", "gamma"]);
        assert!(split_terms("").is_empty());
    }

    #[test]
    fn search_terms_round_trip_through_host_buffer() {
        let mut buffer = vec![0u16; 32];
        let initial = to_wide("one\r\ntwo").unwrap();
        buffer[..initial.len()].copy_from_slice(&initial);
        let info = SearchPreparationInformation {
            size: 0,
            search_terms: buffer.as_mut_ptr(),
            buffer_len: 32,
            flags: SearchFlags::CASE_SENSITIVE.bits(),
        };
        let mut terms = unsafe { SearchTerms::from_raw(&info, std::ptr::null()) };
        assert_eq!(terms.terms, vec!["one", "two"]);
        assert!(terms.flags.contains(SearchFlags::CASE_SENSITIVE));

        terms.terms.push("three".to_string());
        unsafe { terms.write_back(&info) }.unwrap();
        let written = unsafe { from_wide_ptr(buffer.as_ptr(), 32) }.unwrap();
        assert_eq!(written, "one\r\ntwo\r\nthree");

        terms.terms.push("x".repeat(40));
        assert!(terms.encode().is_err());
    }

    #[test]
    fn search_hit_decodes_missing_offsets() {
        let info = SearchHitInformation {
            size: 0,
            item_id: 12,
            relative_offset: 40,
            absolute_offset: -1,
            optional_hit: std::ptr::null(),
            search_term_id: 3,
            length: 5,
            code_page: 1252,
            flags: 0,
        };
        let hit = SearchHit::from(&info);
        assert_eq!(hit.item, ItemId::from_host(12));
        assert_eq!(hit.relative_offset, Some(40));
        assert_eq!(hit.absolute_offset, None);
        assert_eq!(hit.term_id, 3);
    }
}
