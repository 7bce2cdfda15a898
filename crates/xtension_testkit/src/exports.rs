//! The mock host functions.
//!
//! Each function has exactly the signature the binding resolves, counts its
//! calls and panics when a fault is configured for it. The panic unwinds out
//! of the `system-unwind` frame like a fault raised inside the real host.

use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::ptr;

use xtension_core::abi::{
    Bool, CodePages, EventInformation, RasterImageInformation, RawHandle, ReportTableAssoc,
    SearchInformation, FALSE, TRUE,
};
use xtension_core::buffer::from_wide_ptr;
use xtension_core::types::{CreateFileFlags, EvidenceProperty, ItemInfo, OutputFlags, UserInputFlags};

use crate::mock::{
    enter, evidence_handle, with_state, Allocation, Message, MockEvidence, MockItem, MockVolume,
    RecordedEvent, RecordedSearch, EVIDENCE_VOLUME_BASE, REPORT_TABLE_CAPACITY,
};

const VOLUME_NAME_UNITS: usize = 256;
const SECTOR_DESCRIPTION_UNITS: usize = 512;
const EVIDENCE_TEXT_UNITS: usize = 128;
const MAX_INPUT_UNITS: usize = 1 << 20;

unsafe fn read_wide(text: *const u16) -> Option<String> {
    from_wide_ptr(text, MAX_INPUT_UNITS)
}

/// Copies as much of `text` as fits, always terminating.
unsafe fn write_wide(out: *mut u16, capacity: usize, text: &str) -> usize {
    if out.is_null() || capacity == 0 {
        return 0;
    }
    let units: Vec<u16> = text.encode_utf16().collect();
    let written = units.len().min(capacity - 1);
    ptr::copy_nonoverlapping(units.as_ptr(), out, written);
    *out.add(written) = 0;
    written
}

fn handle_of(raw: usize) -> RawHandle {
    raw as RawHandle
}

unsafe extern "system-unwind" fn get_size(handle: RawHandle, selector: *mut c_void) -> i64 {
    enter("XWF_GetSize");
    let raw = handle as usize;
    let logical = selector as usize == 1;
    with_state(|state| {
        if let Some(volume) = state.volumes.get(&raw) {
            return volume.size;
        }
        match state.open_item(raw) {
            Some(item) if logical => item.contents.len() as i64,
            Some(item) => (item.contents.len() as i64 + 511) / 512 * 512,
            None => -1,
        }
    })
}

unsafe extern "system-unwind" fn get_volume_name(volume: RawHandle, out: *mut u16, _kind: u32) {
    enter("XWF_GetVolumeName");
    let name = with_state(|state| state.volumes.get(&(volume as usize)).map(|v| v.name.clone()));
    write_wide(out, VOLUME_NAME_UNITS, name.as_deref().unwrap_or(""));
}

unsafe extern "system-unwind" fn get_volume_information(
    volume: RawHandle,
    file_system: *mut i32,
    bytes_per_sector: *mut u32,
    sectors_per_cluster: *mut u32,
    cluster_count: *mut i64,
    first_cluster_sector: *mut i64,
) {
    enter("XWF_GetVolumeInformation");
    let found = with_state(|state| state.volumes.get(&(volume as usize)).cloned());
    let (fs, size) = found.map_or((0, 0), |v| (v.file_system, v.size));
    *file_system = fs;
    *bytes_per_sector = 512;
    *sectors_per_cluster = 8;
    *cluster_count = size / 4096;
    *first_cluster_sector = 2048;
}

unsafe extern "system-unwind" fn get_block(_volume: RawHandle, start: *mut i64, end: *mut i64) -> Bool {
    enter("XWF_GetBlock");
    match with_state(|state| state.block) {
        Some((first, last)) => {
            *start = first;
            *end = last;
            TRUE
        }
        None => {
            *start = -1;
            *end = -1;
            FALSE
        }
    }
}

unsafe extern "system-unwind" fn set_block(_volume: RawHandle, start: i64, end: i64) -> Bool {
    enter("XWF_SetBlock");
    with_state(|state| state.block = Some((start, end)));
    TRUE
}

unsafe extern "system-unwind" fn get_sector_contents(
    _volume: RawHandle,
    sector: i64,
    out: *mut u16,
    item: *mut i32,
) -> Bool {
    enter("XWF_GetSectorContents");
    let owner = with_state(|state| {
        state
            .sector_owners
            .get(&sector)
            .and_then(|id| state.items.get(id).map(|item| (*id, item.name.clone())))
    });
    match owner {
        Some((id, name)) => {
            write_wide(out, SECTOR_DESCRIPTION_UNITS, &name);
            *item = id;
            TRUE
        }
        None => {
            write_wide(out, SECTOR_DESCRIPTION_UNITS, "Free space");
            *item = -1;
            FALSE
        }
    }
}

unsafe extern "system-unwind" fn open_item(volume: RawHandle, id: i32, _flags: u32) -> RawHandle {
    enter("XWF_OpenItem");
    with_state(|state| {
        let openable = state.volumes.contains_key(&(volume as usize))
            && state.items.get(&id).is_some_and(|item| !item.unopenable);
        if !openable {
            return ptr::null_mut();
        }
        let raw = state.allocate_handle();
        state.open_items.insert(raw, id);
        handle_of(raw)
    })
}

unsafe extern "system-unwind" fn close(handle: RawHandle) {
    enter("XWF_Close");
    with_state(|state| {
        state.open_items.remove(&(handle as usize));
        state.closed.push(handle as usize);
    });
}

unsafe extern "system-unwind" fn read(handle: RawHandle, offset: i64, out: *mut u8, len: u32) -> u32 {
    enter("XWF_Read");
    let chunk = with_state(|state| {
        let raw = handle as usize;
        if let Some(item) = state.open_item(raw) {
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(item.contents.len());
            let end = start.saturating_add(len as usize).min(item.contents.len());
            return item.contents[start..end].to_vec();
        }
        match state.volumes.get(&raw) {
            Some(volume) => {
                let remaining = (volume.size - offset).max(0) as usize;
                vec![0; remaining.min(len as usize)]
            }
            None => Vec::new(),
        }
    });
    ptr::copy_nonoverlapping(chunk.as_ptr(), out, chunk.len());
    chunk.len() as u32
}

unsafe extern "system-unwind" fn select_volume_snapshot(volume: RawHandle) {
    enter("XWF_SelectVolumeSnapshot");
    with_state(|state| state.selected_snapshot = Some(volume as usize));
}

unsafe extern "system-unwind" fn get_vs_prop(property: i32, buffer: *mut c_void) -> i64 {
    enter("XWF_GetVSProp");
    let selector = if buffer.is_null() {
        0
    } else {
        i32::from(*buffer.cast::<u8>())
    };
    with_state(|state| match property {
        10 => state.special_items.get(&selector).map_or(-1, |id| i64::from(*id)),
        20 => i64::from(state.snapshot_hashes[0]),
        21 => i64::from(state.snapshot_hashes[1]),
        _ => -1,
    })
}

unsafe extern "system-unwind" fn get_item_count(_reserved: *mut c_void) -> u32 {
    enter("XWF_GetItemCount");
    with_state(|state| state.items.len() as u32)
}

unsafe extern "system-unwind" fn get_file_count(directory: i32) -> u32 {
    enter("XWF_GetFileCount");
    with_state(|state| state.items.values().filter(|item| item.parent == directory).count() as u32)
}

unsafe extern "system-unwind" fn get_case_prop(
    _reserved: *mut c_void,
    property: i32,
    buffer: *mut c_void,
    len: i32,
) -> i64 {
    enter("XWF_GetCaseProp");
    let value = with_state(|state| state.case.get(&property).cloned());
    match value {
        Some(value) => write_wide(buffer.cast(), usize::try_from(len).unwrap_or(0), &value) as i64,
        None => -1,
    }
}

unsafe extern "system-unwind" fn get_first_ev_obj(_reserved: *mut c_void) -> RawHandle {
    enter("XWF_GetFirstEvObj");
    with_state(|state| {
        if state.evidence.is_empty() {
            ptr::null_mut()
        } else {
            handle_of(evidence_handle(0))
        }
    })
}

unsafe extern "system-unwind" fn get_next_ev_obj(previous: RawHandle, _reserved: *mut c_void) -> RawHandle {
    enter("XWF_GetNextEvObj");
    with_state(|state| match state.evidence_index(previous as usize) {
        Some(index) if index + 1 < state.evidence.len() => handle_of(evidence_handle(index + 1)),
        _ => ptr::null_mut(),
    })
}

unsafe extern "system-unwind" fn get_ev_obj(id: u32) -> RawHandle {
    enter("XWF_GetEvObj");
    with_state(|state| {
        state
            .evidence
            .iter()
            .position(|evidence| evidence.id == id)
            .map_or(ptr::null_mut(), |index| handle_of(evidence_handle(index)))
    })
}

unsafe extern "system-unwind" fn create_ev_obj(
    category: u32,
    disk: i32,
    path: *const u16,
    _reserved: *mut c_void,
) -> RawHandle {
    enter("XWF_CreateEvObj");
    let path = read_wide(path);
    if category < 4 && path.is_none() {
        return ptr::null_mut();
    }
    let title = path.unwrap_or_else(|| format!("Disk {disk}"));
    with_state(|state| {
        let id = state.evidence.iter().map(|evidence| evidence.id).max().unwrap_or(0) + 1;
        state.evidence.push(MockEvidence::new(id, title));
        handle_of(evidence_handle(state.evidence.len() - 1))
    })
}

unsafe extern "system-unwind" fn open_ev_obj(evidence: RawHandle, _flags: u32) -> RawHandle {
    enter("XWF_OpenEvObj");
    with_state(|state| {
        let Some(index) = state.evidence_index(evidence as usize) else {
            return ptr::null_mut();
        };
        let raw = EVIDENCE_VOLUME_BASE + (evidence as usize - evidence_handle(0));
        let name = state.evidence[index].volume_name.clone();
        state.volumes.insert(
            raw,
            MockVolume {
                name,
                size: 64 * 1024 * 1024,
                file_system: -1,
            },
        );
        handle_of(raw)
    })
}

unsafe extern "system-unwind" fn close_ev_obj(evidence: RawHandle) {
    enter("XWF_CloseEvObj");
    with_state(|state| {
        let raw = EVIDENCE_VOLUME_BASE + (evidence as usize).saturating_sub(evidence_handle(0));
        state.volumes.remove(&raw);
        state.closed.push(evidence as usize);
    });
}

unsafe extern "system-unwind" fn get_ev_obj_prop(evidence: RawHandle, property: u32, buffer: *mut c_void) -> i64 {
    enter("XWF_GetEvObjProp");
    let found = with_state(|state| {
        state
            .evidence_index(evidence as usize)
            .map(|index| state.evidence[index].clone())
    });
    let Some(evidence) = found else {
        return -1;
    };
    let digest = |hash: &Option<(i32, Vec<u8>)>| {
        let Some((_, digest)) = hash else {
            return 0;
        };
        let len = digest.len().min(EVIDENCE_TEXT_UNITS * 2);
        ptr::copy_nonoverlapping(digest.as_ptr(), buffer.cast::<u8>(), len);
        len as i64
    };
    use EvidenceProperty as P;
    match EvidenceProperty::from_raw(property) {
        Some(P::Title | P::InternalName | P::Description | P::ExaminerComments) => {
            match evidence.texts.get(&property) {
                Some(text) => with_state(|state| state.keep_wide(text)) as usize as i64,
                None => 0,
            }
        }
        Some(P::ExtendedTitle | P::AbbreviatedTitle | P::InternallyUsedDirectory | P::OutputDirectory) => {
            let text = evidence.texts.get(&property).map_or("", String::as_str);
            write_wide(buffer.cast(), EVIDENCE_TEXT_UNITS, text) as i64
        }
        Some(P::HashType) => evidence.hash.as_ref().map_or(0, |(kind, _)| i64::from(*kind)),
        Some(P::HashType2) => evidence.hash2.as_ref().map_or(0, |(kind, _)| i64::from(*kind)),
        Some(P::HashValue) => digest(&evidence.hash),
        Some(P::HashValue2) => digest(&evidence.hash2),
        _ => evidence.numbers.get(&property).copied().unwrap_or(0),
    }
}

unsafe extern "system-unwind" fn get_ev_obj_report_table_assocs(
    evidence: RawHandle,
    _flags: u32,
    count: *mut i32,
) -> *const c_void {
    enter("XWF_GetEvObjReportTableAssocs");
    with_state(|state| {
        let assocs = state
            .evidence_index(evidence as usize)
            .map(|index| state.evidence[index].report_assocs.clone())
            .unwrap_or_default();
        *count = assocs.len() as i32;
        if assocs.is_empty() {
            return ptr::null();
        }
        let list: Box<[ReportTableAssoc]> = assocs
            .into_iter()
            .map(|(table_id, item_id)| ReportTableAssoc { table_id, item_id })
            .collect();
        let list_ptr = list.as_ptr().cast::<c_void>();
        state.assoc_lists.push(list);
        list_ptr
    })
}

unsafe extern "system-unwind" fn get_report_table_info(
    _reserved: *mut c_void,
    id: i32,
    optional: *mut i32,
) -> *const u16 {
    enter("XWF_GetReportTableInfo");
    if id == -1 {
        if !optional.is_null() {
            *optional = REPORT_TABLE_CAPACITY;
        }
        return ptr::null();
    }
    with_state(|state| {
        let name = usize::try_from(id).ok().and_then(|id| state.report_tables.get(id).cloned());
        name.map_or(ptr::null(), |name| state.keep_wide(&name))
    })
}

fn default_parent(state: &crate::mock::MockState) -> i32 {
    if state.items.contains_key(&0) {
        0
    } else {
        -1
    }
}

unsafe extern "system-unwind" fn create_item(name: *const u16, _flags: u32) -> i32 {
    enter("XWF_CreateItem");
    match read_wide(name).filter(|name| !name.is_empty()) {
        Some(name) => with_state(|state| {
            let parent = default_parent(state);
            state.allocate_item(MockItem::directory(name, parent))
        }),
        None => -1,
    }
}

unsafe extern "system-unwind" fn create_file(
    name: *const u16,
    flags: u32,
    parent: i32,
    source: *const c_void,
) -> i32 {
    enter("XWF_CreateFile");
    let Some(name) = read_wide(name).filter(|name| !name.is_empty()) else {
        return -1;
    };
    let mut item = MockItem::file(name, parent, Vec::new());
    if CreateFileFlags::from_bits(flags).contains(CreateFileFlags::ATTACH_EXTERNAL_FILE) {
        match read_wide(source.cast()) {
            Some(path) => item.extracted = Some(path),
            None => return -1,
        }
    }
    with_state(|state| {
        if item.parent >= 0 && !state.items.contains_key(&item.parent) {
            item.parent = default_parent(state);
        }
        state.allocate_item(item)
    })
}

unsafe extern "system-unwind" fn get_item_name(id: i32) -> *const u16 {
    enter("XWF_GetItemName");
    with_state(|state| {
        let name = state.items.get(&id).map(|item| item.name.clone());
        name.map_or(ptr::null(), |name| state.keep_wide(&name))
    })
}

unsafe extern "system-unwind" fn get_item_size(id: i32) -> i64 {
    enter("XWF_GetItemSize");
    with_state(|state| state.items.get(&id).map_or(-1, |item| item.size))
}

unsafe extern "system-unwind" fn set_item_size(id: i32, size: i64) {
    enter("XWF_SetItemSize");
    with_state(|state| {
        if let Some(item) = state.items.get_mut(&id) {
            item.size = size;
        }
    });
}

unsafe extern "system-unwind" fn get_item_ofs(id: i32, definition: *mut i64, start_sector: *mut i64) {
    enter("XWF_GetItemOfs");
    let (def, start) = with_state(|state| state.items.get(&id).map_or((-1, -1), |item| item.offsets));
    *definition = def;
    *start_sector = start;
}

unsafe extern "system-unwind" fn set_item_ofs(id: i32, definition: i64, start_sector: i64) {
    enter("XWF_SetItemOfs");
    with_state(|state| {
        if let Some(item) = state.items.get_mut(&id) {
            item.offsets = (definition, start_sector);
        }
    });
}

unsafe extern "system-unwind" fn get_item_information(id: i32, info: i32, success: *mut Bool) -> i64 {
    enter("XWF_GetItemInformation");
    let value = with_state(|state| {
        state
            .items
            .get(&id)
            .and_then(|item| item.information.get(&info).copied())
    });
    if !success.is_null() {
        *success = if value.is_some() { TRUE } else { FALSE };
    }
    value.unwrap_or(0)
}

unsafe extern "system-unwind" fn set_item_information(id: i32, info: i32, value: i64) -> Bool {
    enter("XWF_SetItemInformation");
    with_state(|state| {
        let Some(item) = state.items.get_mut(&id) else {
            return FALSE;
        };
        let flags = ItemInfo::Flags.raw();
        match ItemInfo::from_raw(info) {
            Some(ItemInfo::SetFlags) => *item.information.entry(flags).or_default() |= value,
            Some(ItemInfo::RemoveFlags) => *item.information.entry(flags).or_default() &= !value,
            _ => {
                item.information.insert(info, value);
            }
        }
        TRUE
    })
}

unsafe extern "system-unwind" fn get_item_type(id: i32, out: *mut u16, len: u32) -> i32 {
    enter("XWF_GetItemType");
    let found = with_state(|state| {
        state
            .items
            .get(&id)
            .map(|item| (item.type_description.clone(), item.category))
    });
    let (description, category) = found.unwrap_or_default();
    write_wide(out, len as usize, &description);
    if description.is_empty() && category == 0 {
        -1
    } else {
        category
    }
}

unsafe extern "system-unwind" fn set_item_type(id: i32, description: *const u16, category: i32) {
    enter("XWF_SetItemType");
    let description = read_wide(description).unwrap_or_default();
    with_state(|state| {
        if let Some(item) = state.items.get_mut(&id) {
            item.type_description = description;
            item.category = category;
        }
    });
}

unsafe extern "system-unwind" fn get_item_parent(id: i32) -> i32 {
    enter("XWF_GetItemParent");
    with_state(|state| state.items.get(&id).map_or(-1, |item| item.parent))
}

unsafe extern "system-unwind" fn set_item_parent(child: i32, parent: i32) {
    enter("XWF_SetItemParent");
    with_state(|state| {
        if let Some(item) = state.items.get_mut(&child) {
            item.parent = parent;
        }
    });
}

unsafe extern "system-unwind" fn get_report_table_assocs(id: i32, out: *mut u16, len: i32) -> i32 {
    enter("XWF_GetReportTableAssocs");
    let tables = with_state(|state| {
        state.assoc_requests.push(len);
        state.items.get(&id).map(|item| item.report_tables.clone()).unwrap_or_default()
    });
    if tables.is_empty() {
        return 0;
    }
    write_wide(out, usize::try_from(len).unwrap_or(0), &tables.join(", "));
    tables.len() as i32
}

unsafe extern "system-unwind" fn add_to_report_table(id: i32, name: *const u16, _flags: u32) -> i32 {
    enter("XWF_AddToReportTable");
    let Some(name) = read_wide(name).filter(|name| !name.is_empty()) else {
        return 0;
    };
    with_state(|state| {
        if !state.report_tables.contains(&name) {
            state.report_tables.push(name.clone());
        }
        let Some(item) = state.items.get_mut(&id) else {
            return 0;
        };
        if item.report_tables.contains(&name) {
            2
        } else {
            item.report_tables.push(name);
            1
        }
    })
}

fn combine(existing: &mut Option<String>, text: String, mode: u32) {
    *existing = Some(match (existing.take(), mode) {
        (Some(old), 1) => old + &text,
        (Some(old), 2) => format!("{old}\n{text}"),
        _ => text,
    });
}

unsafe extern "system-unwind" fn get_comment(id: i32) -> *const u16 {
    enter("XWF_GetComment");
    with_state(|state| {
        let text = state.items.get(&id).and_then(|item| item.comment.clone());
        text.map_or(ptr::null(), |text| state.keep_wide(&text))
    })
}

unsafe extern "system-unwind" fn add_comment(id: i32, text: *const u16, mode: u32) -> Bool {
    enter("XWF_AddComment");
    let text = read_wide(text).unwrap_or_default();
    with_state(|state| match state.items.get_mut(&id) {
        Some(item) => {
            combine(&mut item.comment, text, mode);
            TRUE
        }
        None => FALSE,
    })
}

unsafe extern "system-unwind" fn get_extracted_metadata(id: i32) -> *const u16 {
    enter("XWF_GetExtractedMetadata");
    with_state(|state| {
        let text = state.items.get(&id).and_then(|item| item.extracted.clone());
        text.map_or(ptr::null(), |text| state.keep_wide(&text))
    })
}

unsafe extern "system-unwind" fn add_extracted_metadata(id: i32, text: *const u16, mode: u32) -> Bool {
    enter("XWF_AddExtractedMetadata");
    let text = read_wide(text).unwrap_or_default();
    with_state(|state| match state.items.get_mut(&id) {
        Some(item) => {
            combine(&mut item.extracted, text, mode);
            TRUE
        }
        None => FALSE,
    })
}

unsafe extern "system-unwind" fn get_hash_value(id: i32, buffer: *mut u8) -> Bool {
    enter("XWF_GetHashValue");
    let selector = ptr::read_unaligned(buffer.cast::<u32>());
    let digest = with_state(|state| {
        let slot = usize::try_from(selector).ok()?.checked_sub(1)?;
        state.items.get(&id)?.hashes.get(slot)?.clone()
    });
    match digest {
        Some(digest) => {
            ptr::copy_nonoverlapping(digest.as_ptr(), buffer, digest.len());
            TRUE
        }
        None => FALSE,
    }
}

unsafe extern "system-unwind" fn get_metadata(id: i32, _item: RawHandle) -> *mut c_void {
    enter("XWF_GetMetadata");
    with_state(|state| {
        let Some(text) = state.items.get(&id).and_then(|item| item.metadata.clone()) else {
            return ptr::null_mut();
        };
        let mut units: Box<[u16]> = text.encode_utf16().chain(std::iter::once(0)).collect();
        let address = units.as_mut_ptr().cast::<c_void>();
        state.allocations.insert(address as usize, Allocation::Wide(units));
        address
    })
}

unsafe extern "system-unwind" fn get_raster_image(info: *mut RasterImageInformation) -> *mut c_void {
    enter("XWF_GetRasterImage");
    let mut request = ptr::read_unaligned(info);
    let id = request.item_id;
    let renderable = with_state(|state| state.items.get(&id).is_some_and(|item| !item.contents.is_empty()));
    if !renderable {
        return ptr::null_mut();
    }
    let width = if request.width == 0 { 16 } else { request.width };
    let height = if request.height == 0 { 16 } else { request.height };
    let mut pixels: Box<[u8]> = vec![0x7f; (width * height * 3) as usize].into_boxed_slice();
    request.width = width;
    request.height = height;
    request.result_size = pixels.len() as u32;
    ptr::write_unaligned(info, request);
    let address = pixels.as_mut_ptr().cast::<c_void>();
    with_state(|state| state.allocations.insert(address as usize, Allocation::Bytes(pixels)));
    address
}

unsafe extern "system-unwind" fn search(info: *mut SearchInformation, pages: *mut CodePages) -> i32 {
    enter("XWF_Search");
    let request = ptr::read_unaligned(info);
    let terms = read_wide(request.search_terms).unwrap_or_default();
    let code_pages = if pages.is_null() {
        Vec::new()
    } else {
        let pages = ptr::read_unaligned(pages);
        let slots = pages.code_pages;
        slots.into_iter().filter(|page| *page != 0).collect()
    };
    let count = terms.split("\r\n").count() as i32;
    with_state(|state| {
        state.searches.push(RecordedSearch {
            terms,
            flags: request.flags,
            code_pages,
        });
    });
    count
}

unsafe extern "system-unwind" fn get_search_term(id: i32, _reserved: *mut c_void) -> *const u16 {
    enter("XWF_GetSearchTerm");
    with_state(|state| {
        if id == -1 {
            return state.search_terms.len() as *const u16;
        }
        let term = usize::try_from(id).ok().and_then(|id| state.search_terms.get(id).cloned());
        term.map_or(ptr::null(), |term| state.keep_wide(&term))
    })
}

unsafe extern "system-unwind" fn add_search_term(term: *const u16, _flags: u32) -> i32 {
    enter("XWF_AddSearchTerm");
    let Some(term) = read_wide(term).filter(|term| !term.is_empty()) else {
        return -1;
    };
    with_state(|state| {
        let id = match state.search_terms.iter().position(|existing| *existing == term) {
            Some(id) => id,
            None => {
                state.search_terms.push(term);
                state.search_terms.len() - 1
            }
        };
        id as i32
    })
}

unsafe extern "system-unwind" fn add_event(info: *mut EventInformation) -> i32 {
    enter("XWF_AddEvent");
    let event = ptr::read_unaligned(info);
    let description_ptr = event.description;
    let description = (!description_ptr.is_null())
        .then(|| CStr::from_ptr(description_ptr.cast()).to_string_lossy().into_owned());
    let evidence = event.evidence as usize;
    with_state(|state| {
        if state.evidence_index(evidence).is_none() {
            return 0;
        }
        state.events.push(RecordedEvent {
            evidence,
            event_type: event.event_type,
            timestamp: event.timestamp,
            item: event.item_id,
            description,
        });
        1
    })
}

unsafe extern "system-unwind" fn create_container(path: *const u16, _flags: u32, _reserved: *mut c_void) -> RawHandle {
    enter("XWF_CreateContainer");
    if read_wide(path).filter(|path| !path.is_empty()).is_none() {
        return ptr::null_mut();
    }
    with_state(|state| {
        let raw = state.allocate_handle();
        state.containers.insert(raw, Vec::new());
        handle_of(raw)
    })
}

unsafe extern "system-unwind" fn copy_to_container(
    container: RawHandle,
    item: RawHandle,
    _flags: u32,
    _mode: u32,
    _start: i64,
    _end: i64,
    _reserved: *mut c_void,
) -> i32 {
    enter("XWF_CopyToContainer");
    with_state(|state| {
        let Some(id) = state.open_items.get(&(item as usize)).copied() else {
            return 1;
        };
        match state.containers.get_mut(&(container as usize)) {
            Some(contents) => {
                contents.push(id);
                0
            }
            None => 1,
        }
    })
}

unsafe extern "system-unwind" fn close_container(container: RawHandle, _reserved: *mut c_void) -> i32 {
    enter("XWF_CloseContainer");
    with_state(|state| {
        state.closed.push(container as usize);
        i32::from(state.containers.contains_key(&(container as usize)))
    })
}

unsafe extern "system-unwind" fn output_message(message: *const c_void, flags: u32) {
    enter("XWF_OutputMessage");
    let text = if OutputFlags::from_bits(flags).contains(OutputFlags::ANSI) {
        CStr::from_ptr(message.cast()).to_string_lossy().into_owned()
    } else {
        read_wide(message.cast()).unwrap_or_default()
    };
    with_state(|state| state.messages.push(Message { text, flags }));
}

unsafe extern "system-unwind" fn get_user_input(_prompt: *const u16, out: *mut u16, len: u32, flags: u32) -> i64 {
    enter("XWF_GetUserInput");
    if UserInputFlags::from_bits(flags).contains(UserInputFlags::POSITIVE_NUMBER) {
        return with_state(|state| state.user_number.unwrap_or(-1));
    }
    match with_state(|state| state.user_input.clone()) {
        Some(text) => write_wide(out, len as usize, &text) as i64,
        None => -1,
    }
}

unsafe extern "system-unwind" fn show_progress(caption: *const u16, _flags: u32) {
    enter("XWF_ShowProgress");
    let caption = read_wide(caption);
    with_state(|state| {
        state.progress_visible = true;
        state.progress_percent = 0;
        state.progress_description = caption;
    });
}

unsafe extern "system-unwind" fn set_progress_percentage(percent: u32) {
    enter("XWF_SetProgressPercentage");
    with_state(|state| state.progress_percent = percent);
}

unsafe extern "system-unwind" fn set_progress_description(text: *const u16) {
    enter("XWF_SetProgressDescription");
    let text = read_wide(text);
    with_state(|state| state.progress_description = text);
}

unsafe extern "system-unwind" fn should_stop() -> Bool {
    enter("XWF_ShouldStop");
    with_state(|state| if state.should_stop { TRUE } else { FALSE })
}

unsafe extern "system-unwind" fn hide_progress() {
    enter("XWF_HideProgress");
    with_state(|state| state.progress_visible = false);
}

unsafe extern "system-unwind" fn release_mem(buffer: *mut c_void) -> Bool {
    enter("XWF_ReleaseMem");
    with_state(|state| {
        if state.allocations.remove(&(buffer as usize)).is_some() {
            state.releases += 1;
            TRUE
        } else {
            FALSE
        }
    })
}

/// Address of every mock host function, by symbol name.
pub fn table() -> HashMap<String, usize> {
    let entries: [(&str, usize); 60] = [
        ("XWF_GetSize", get_size as usize),
        ("XWF_GetVolumeName", get_volume_name as usize),
        ("XWF_GetVolumeInformation", get_volume_information as usize),
        ("XWF_GetBlock", get_block as usize),
        ("XWF_SetBlock", set_block as usize),
        ("XWF_GetSectorContents", get_sector_contents as usize),
        ("XWF_OpenItem", open_item as usize),
        ("XWF_Close", close as usize),
        ("XWF_Read", read as usize),
        ("XWF_SelectVolumeSnapshot", select_volume_snapshot as usize),
        ("XWF_GetVSProp", get_vs_prop as usize),
        ("XWF_GetItemCount", get_item_count as usize),
        ("XWF_GetFileCount", get_file_count as usize),
        ("XWF_GetCaseProp", get_case_prop as usize),
        ("XWF_GetFirstEvObj", get_first_ev_obj as usize),
        ("XWF_GetNextEvObj", get_next_ev_obj as usize),
        ("XWF_GetEvObj", get_ev_obj as usize),
        ("XWF_CreateEvObj", create_ev_obj as usize),
        ("XWF_OpenEvObj", open_ev_obj as usize),
        ("XWF_CloseEvObj", close_ev_obj as usize),
        ("XWF_GetEvObjProp", get_ev_obj_prop as usize),
        ("XWF_GetEvObjReportTableAssocs", get_ev_obj_report_table_assocs as usize),
        ("XWF_GetReportTableInfo", get_report_table_info as usize),
        ("XWF_CreateItem", create_item as usize),
        ("XWF_CreateFile", create_file as usize),
        ("XWF_GetItemName", get_item_name as usize),
        ("XWF_GetItemSize", get_item_size as usize),
        ("XWF_SetItemSize", set_item_size as usize),
        ("XWF_GetItemOfs", get_item_ofs as usize),
        ("XWF_SetItemOfs", set_item_ofs as usize),
        ("XWF_GetItemInformation", get_item_information as usize),
        ("XWF_SetItemInformation", set_item_information as usize),
        ("XWF_GetItemType", get_item_type as usize),
        ("XWF_SetItemType", set_item_type as usize),
        ("XWF_GetItemParent", get_item_parent as usize),
        ("XWF_SetItemParent", set_item_parent as usize),
        ("XWF_GetReportTableAssocs", get_report_table_assocs as usize),
        ("XWF_AddToReportTable", add_to_report_table as usize),
        ("XWF_GetComment", get_comment as usize),
        ("XWF_AddComment", add_comment as usize),
        ("XWF_GetExtractedMetadata", get_extracted_metadata as usize),
        ("XWF_AddExtractedMetadata", add_extracted_metadata as usize),
        ("XWF_GetHashValue", get_hash_value as usize),
        ("XWF_GetMetadata", get_metadata as usize),
        ("XWF_GetRasterImage", get_raster_image as usize),
        ("XWF_Search", search as usize),
        ("XWF_GetSearchTerm", get_search_term as usize),
        ("XWF_AddSearchTerm", add_search_term as usize),
        ("XWF_AddEvent", add_event as usize),
        ("XWF_CreateContainer", create_container as usize),
        ("XWF_CopyToContainer", copy_to_container as usize),
        ("XWF_CloseContainer", close_container as usize),
        ("XWF_OutputMessage", output_message as usize),
        ("XWF_GetUserInput", get_user_input as usize),
        ("XWF_ShowProgress", show_progress as usize),
        ("XWF_SetProgressPercentage", set_progress_percentage as usize),
        ("XWF_SetProgressDescription", set_progress_description as usize),
        ("XWF_ShouldStop", should_stop as usize),
        ("XWF_HideProgress", hide_progress as usize),
        ("XWF_ReleaseMem", release_mem as usize),
    ];
    entries
        .into_iter()
        .map(|(name, address)| (name.to_string(), address))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtension_core::REQUIRED_SYMBOLS;

    #[test]
    fn table_covers_every_required_symbol() {
        let table = table();
        assert_eq!(table.len(), REQUIRED_SYMBOLS.len());
        for symbol in REQUIRED_SYMBOLS {
            assert!(table.contains_key(*symbol), "{symbol} not mocked");
        }
    }

    #[test]
    fn write_wide_truncates_and_terminates() {
        let mut buffer = [0xFFFFu16; 4];
        let written = unsafe { write_wide(buffer.as_mut_ptr(), buffer.len(), "abcdef") };
        assert_eq!(written, 3);
        assert_eq!(buffer, [u16::from(b'a'), u16::from(b'b'), u16::from(b'c'), 0]);
    }
}
