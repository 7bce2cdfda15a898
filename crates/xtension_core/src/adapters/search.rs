//! Searches, search terms and events.

use std::ffi::CString;
use std::ptr;

use crate::abi::{struct_size, CodePages, EventInformation, SearchInformation};
use crate::buffer::{from_wide_ptr, to_wide, to_wide_name};
use crate::error::{Result, XwfError};
use crate::handle::{Evidence, Handle};
use crate::host::Host;
use crate::types::{FileTime, ItemId, SearchFlags, SearchTermFlags};

/// Most code pages a single search accepts.
const MAX_CODE_PAGES: usize = 5;

/// Delimiter between search terms.
const TERM_DELIMITER: &str = "\r\n";

/// A simultaneous search to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    /// Terms to search for; each must be non-empty and single-line.
    pub terms: Vec<String>,
    /// Search options.
    pub flags: SearchFlags,
    /// Search window in bytes, 0 for the host default.
    pub window_length: u32,
    /// Code pages to search in, at most five; empty for the host default.
    pub code_pages: Vec<u16>,
}

impl SearchRequest {
    /// A request for `terms` with default options.
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            terms: terms.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    fn joined_terms(&self) -> Result<String> {
        if self.terms.is_empty() {
            return Err(XwfError::invalid("search without terms"));
        }
        if let Some(term) = self
            .terms
            .iter()
            .find(|term| term.is_empty() || term.contains(['\r', '\n']))
        {
            return Err(XwfError::invalid(format!("invalid search term {term:?}")));
        }
        Ok(self.terms.join(TERM_DELIMITER))
    }

    fn code_pages(&self) -> Result<Option<CodePages>> {
        if self.code_pages.is_empty() {
            return Ok(None);
        }
        if self.code_pages.len() > MAX_CODE_PAGES {
            return Err(XwfError::invalid(format!(
                "{} code pages given, at most {MAX_CODE_PAGES} allowed",
                self.code_pages.len()
            )));
        }
        let mut pages = CodePages {
            size: struct_size::<CodePages>(),
            code_pages: [0; MAX_CODE_PAGES],
        };
        let mut slots = pages.code_pages;
        slots[..self.code_pages.len()].copy_from_slice(&self.code_pages);
        pages.code_pages = slots;
        Ok(Some(pages))
    }
}

/// An event for the case's event list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Evidence object the event belongs to.
    pub evidence: Handle<Evidence>,
    /// Host event type.
    pub event_type: u32,
    /// Host event flags.
    pub flags: u32,
    /// When the event happened.
    pub timestamp: FileTime,
    /// Related item.
    pub item: Option<ItemId>,
    /// Offset of the timestamp within the item.
    pub offset: Option<i64>,
    /// Short description; the host keeps at most 255 bytes.
    pub description: Option<String>,
}

impl Host {
    /// Runs a simultaneous search over the active snapshot.
    ///
    /// Convention: a negative result is a sentinel failure.
    pub fn search(&self, request: &SearchRequest) -> Result<i32> {
        let terms = to_wide(&request.joined_terms()?)?;
        let mut pages = request.code_pages()?;
        let mut info = SearchInformation {
            size: struct_size::<SearchInformation>(),
            volume: ptr::null_mut(),
            search_terms: terms.as_ptr(),
            flags: request.flags.bits(),
            window_length: request.window_length,
        };
        let info_ptr = ptr::addr_of_mut!(info);
        let pages_ptr = pages.as_mut().map_or(ptr::null_mut(), |pages| pages as *mut CodePages);
        let result = self.invoke("XWF_Search", request, || unsafe {
            (self.table.search)(info_ptr, pages_ptr)
        })?;
        if result < 0 {
            return Err(XwfError::sentinel("XWF_Search", format!("returned {result}")));
        }
        Ok(result)
    }

    /// Text of a search term.
    ///
    /// Convention: null means no such term and yields `None`.
    pub fn search_term(&self, id: u32) -> Result<Option<String>> {
        let id = i32::try_from(id).map_err(|_| XwfError::invalid(format!("search term id {id} out of range")))?;
        let term = self.invoke("XWF_GetSearchTerm", &id, || unsafe {
            (self.table.get_search_term)(id, ptr::null_mut())
        })?;
        // SAFETY: the host returns null or a terminated term it keeps alive.
        Ok(unsafe { from_wide_ptr(term, self.config.max_string_units) })
    }

    /// Number of search terms in the case.
    ///
    /// Convention: id -1 makes the host return the count in place of a pointer.
    pub fn search_term_count(&self) -> Result<u32> {
        let count = self.invoke("XWF_GetSearchTerm", &-1, || unsafe {
            (self.table.get_search_term)(-1, ptr::null_mut())
        })?;
        Ok(u32::try_from(count as usize).unwrap_or(u32::MAX))
    }

    /// Adds a search term to the case and returns its id.
    ///
    /// Convention: a negative id is a sentinel failure.
    pub fn add_search_term(&self, term: &str, flags: SearchTermFlags) -> Result<u32> {
        let wide = to_wide_name("search term", term)?;
        let id = self.invoke("XWF_AddSearchTerm", &(term, flags), || unsafe {
            (self.table.add_search_term)(wide.as_ptr(), flags.bits())
        })?;
        u32::try_from(id)
            .map_err(|_| XwfError::sentinel("XWF_AddSearchTerm", format!("returned {id} for {term:?}")))
    }

    /// Adds an event to the case.
    ///
    /// Returns false if the host ignored the event.
    ///
    /// Convention: 0 is a sentinel failure, 1 added, 2 ignored.
    pub fn add_event(&self, event: &Event) -> Result<bool> {
        self.handles.ensure_open(event.evidence)?;
        let description = event
            .description
            .as_deref()
            .map(CString::new)
            .transpose()
            .map_err(|_| XwfError::invalid("event description contains an embedded NUL"))?;
        let mut info = EventInformation {
            size: struct_size::<EventInformation>() as u32,
            evidence: event.evidence.as_ptr(),
            event_type: event.event_type,
            flags: event.flags,
            timestamp: event.timestamp.0,
            item_id: event.item.map_or(-1, ItemId::get),
            offset: event.offset.unwrap_or(-1),
            description: description.as_ref().map_or(ptr::null(), |text| text.as_ptr().cast()),
        };
        let info_ptr = ptr::addr_of_mut!(info);
        let result = self.invoke("XWF_AddEvent", event, || unsafe { (self.table.add_event)(info_ptr) })?;
        match result {
            1 => Ok(true),
            2 => Ok(false),
            other => Err(XwfError::sentinel("XWF_AddEvent", format!("returned {other}"))),
        }
    }
}
