//! Raw declarations of the values that cross the host boundary.
//!
//! Everything here mirrors the host's C layout exactly. Safe wrappers live in
//! [`crate::types`] and the adapters.

use std::ffi::c_void;

/// Opaque host object (volume, item, evidence object or container).
#[repr(C)]
pub struct XwfObject {
    _private: [u8; 0],
}

/// Raw handle as passed across the boundary.
pub type RawHandle = *mut XwfObject;

/// Win32 `BOOL`.
pub type Bool = i32;

/// Win32 `TRUE`.
pub const TRUE: Bool = 1;

/// Win32 `FALSE`.
pub const FALSE: Bool = 0;

/// Version information passed to `XT_Init`.
#[repr(C, packed(1))]
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerInformation {
    /// Interface language of the host.
    pub language: u8,
    /// Service release of the host.
    pub service_release: u8,
    /// Host version times 100 (e.g. 2030 for 20.3).
    pub version: i16,
}

impl CallerInformation {
    /// Unpacks the 32-bit value the host passes by value.
    pub fn from_packed(raw: u32) -> Self {
        let [language, service_release, lo, hi] = raw.to_le_bytes();
        Self {
            language,
            service_release,
            version: i16::from_le_bytes([lo, hi]),
        }
    }
}

/// Search hit passed to `XT_ProcessSearchHit`.
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct SearchHitInformation {
    /// Size of this structure.
    pub size: i32,
    /// Item containing the hit.
    pub item_id: i32,
    /// Offset relative to the item, or -1.
    pub relative_offset: i64,
    /// Offset relative to the volume, or -1.
    pub absolute_offset: i64,
    /// Optional pointer to the hit in memory.
    pub optional_hit: *const c_void,
    /// Search term id.
    pub search_term_id: u16,
    /// Hit length in bytes.
    pub length: u16,
    /// Code page of the hit.
    pub code_page: u16,
    /// Hit flags.
    pub flags: u16,
}

/// Search preparation data passed to `XT_PrepareSearch`.
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct SearchPreparationInformation {
    /// Size of this structure.
    pub size: i32,
    /// Line-break delimited search terms, modifiable in place.
    pub search_terms: *mut u16,
    /// Capacity of `search_terms` in characters.
    pub buffer_len: u32,
    /// Search flags.
    pub flags: u32,
}

/// Code pages of a search.
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy, Default)]
pub struct CodePages {
    /// Size of this structure.
    pub size: i32,
    /// Code pages, unused slots are zero.
    pub code_pages: [u16; 5],
}

/// Arguments of `XWF_Search`.
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct SearchInformation {
    /// Size of this structure.
    pub size: i32,
    /// Must be null.
    pub volume: RawHandle,
    /// Line-break delimited search terms.
    pub search_terms: *const u16,
    /// Search options.
    pub flags: u32,
    /// Search window length, 0 for the default.
    pub window_length: u32,
}

/// Arguments of `XWF_AddEvent`.
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct EventInformation {
    /// Size of this structure.
    pub size: u32,
    /// Evidence object the event belongs to.
    pub evidence: RawHandle,
    /// Event type.
    pub event_type: u32,
    /// Event flags.
    pub flags: u32,
    /// FILETIME of the event.
    pub timestamp: i64,
    /// Related item, or -1.
    pub item_id: i32,
    /// Offset of the timestamp, or -1.
    pub offset: i64,
    /// Optional ASCII/UTF-8 description, truncated by the host after 255 bytes.
    pub description: *const u8,
}

/// Arguments and results of `XWF_GetRasterImage`.
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct RasterImageInformation {
    /// Size of this structure.
    pub size: u32,
    /// Item to render.
    pub item_id: i32,
    /// Open handle of that item.
    pub item: RawHandle,
    /// Rendering options.
    pub flags: u32,
    /// Requested or resulting width.
    pub width: u32,
    /// Requested or resulting height.
    pub height: u32,
    /// Size of the returned buffer in bytes.
    pub result_size: u32,
}

/// One entry of the list returned by `XWF_GetEvObjReportTableAssocs`.
#[repr(C, packed(2))]
#[derive(Debug, Clone, Copy)]
pub struct ReportTableAssoc {
    /// Report table id.
    pub table_id: u16,
    /// Associated item.
    pub item_id: i32,
}

/// `size_of` as the `i32` the host expects in `size` fields.
pub(crate) fn struct_size<T>() -> i32 {
    std::mem::size_of::<T>() as i32
}
