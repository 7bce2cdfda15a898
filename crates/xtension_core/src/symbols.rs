//! Resolution of the host's exported functions.
//!
//! The host is the process that loaded this library. Its exports are looked up
//! once, by name, and converted into a [`FunctionTable`] of typed function
//! pointers. Resolution is all-or-nothing: a table never contains a missing
//! entry.
//!
//! Every function pointer uses the `system-unwind` ABI so that a fault raised
//! as an unwind inside the host call can be caught by the adapter that made it.

use std::collections::HashMap;
use std::ffi::{c_void, OsStr};
use std::fmt;
use std::ptr::NonNull;

use tracing::{debug, info};

use crate::abi::{
    Bool, CodePages, EventInformation, RasterImageInformation, RawHandle, SearchInformation,
};
use crate::error::{Result, XwfError};

/// Anything symbols can be looked up in.
pub trait SymbolSource {
    /// Returns the address of `symbol`, or `None` if it is not exported.
    fn lookup(&self, symbol: &str) -> Option<NonNull<c_void>>;

    /// Human-readable description used in logs.
    fn describe(&self) -> String {
        "symbol source".to_string()
    }
}

impl SymbolSource for HashMap<String, usize> {
    fn lookup(&self, symbol: &str) -> Option<NonNull<c_void>> {
        self.get(symbol)
            .and_then(|address| NonNull::new(*address as *mut c_void))
    }

    fn describe(&self) -> String {
        format!("table of {} symbols", self.len())
    }
}

/// A loaded host module.
pub struct HostModule {
    library: libloading::Library,
    origin: String,
}

impl HostModule {
    /// Binds the main module of the running process, which is the host.
    pub fn current() -> Result<Self> {
        #[cfg(windows)]
        let library: libloading::Library = libloading::os::windows::Library::this()
            .map_err(|e| XwfError::HostModuleUnavailable(e.to_string()))?
            .into();
        #[cfg(unix)]
        let library: libloading::Library = libloading::os::unix::Library::this().into();

        Ok(Self {
            library,
            origin: "current process".to_string(),
        })
    }

    /// Loads a module from disk.
    pub fn open(path: impl AsRef<OsStr>) -> Result<Self> {
        let path = path.as_ref();
        // SAFETY: loading a module runs its initialisers; callers choose the path.
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| XwfError::HostModuleUnavailable(format!("{}: {e}", path.to_string_lossy())))?;
        Ok(Self {
            library,
            origin: path.to_string_lossy().into_owned(),
        })
    }
}

impl SymbolSource for HostModule {
    fn lookup(&self, symbol: &str) -> Option<NonNull<c_void>> {
        // SAFETY: the address is only reinterpreted as a function pointer by
        // `FunctionTable::resolve`, which knows the signature.
        let address = unsafe { self.library.get::<*mut c_void>(symbol.as_bytes()) }.ok()?;
        NonNull::new(*address)
    }

    fn describe(&self) -> String {
        self.origin.clone()
    }
}

impl fmt::Debug for HostModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostModule")
            .field("origin", &self.origin)
            .finish()
    }
}

/// `XWF_ReleaseMem`.
pub type ReleaseMemFn = unsafe extern "system-unwind" fn(*mut c_void) -> Bool;

/// `XWF_OutputMessage`.
pub type OutputMessageFn = unsafe extern "system-unwind" fn(*const c_void, u32);

macro_rules! function_table {
    ($( $(#[$doc:meta])* $field:ident = $symbol:literal : $ty:ty; )*) => {
        /// Typed host functions, resolved once and immutable afterwards.
        #[derive(Clone, Copy)]
        pub struct FunctionTable {
            $( $(#[$doc])* pub $field: $ty, )*
        }

        /// Every symbol a [`FunctionTable`] requires, in resolution order.
        pub const REQUIRED_SYMBOLS: &[&str] = &[$($symbol),*];

        impl FunctionTable {
            /// Resolves every required symbol from `source`.
            ///
            /// Fails on the first missing symbol; no partial table is ever built.
            pub fn resolve<S: SymbolSource + ?Sized>(source: &S) -> Result<Self> {
                let table = Self {
                    $( $field: {
                        let address = source
                            .lookup($symbol)
                            .ok_or(XwfError::SymbolNotFound { symbol: $symbol })?;
                        // SAFETY: the host exports `$symbol` with exactly this signature.
                        unsafe { std::mem::transmute::<*mut c_void, $ty>(address.as_ptr()) }
                    }, )*
                };
                info!(
                    source = %source.describe(),
                    symbols = REQUIRED_SYMBOLS.len(),
                    "host function table resolved"
                );
                Ok(table)
            }

            /// Address of a resolved symbol, by name.
            pub fn address_of(&self, symbol: &str) -> Option<usize> {
                match symbol {
                    $( $symbol => Some(self.$field as usize), )*
                    _ => None,
                }
            }
        }
    };
}

function_table! {
    /// `XWF_GetSize(hVolumeOrItem, lpOptional)`.
    get_size = "XWF_GetSize": unsafe extern "system-unwind" fn(RawHandle, *mut c_void) -> i64;
    /// `XWF_GetVolumeName(hVolume, lpString, nType)`.
    get_volume_name = "XWF_GetVolumeName": unsafe extern "system-unwind" fn(RawHandle, *mut u16, u32);
    /// `XWF_GetVolumeInformation(hVolume, lpFileSystem, nBytesPerSector, nSectorsPerCluster, nClusterCount, nFirstClusterSectorNo)`.
    get_volume_information = "XWF_GetVolumeInformation":
        unsafe extern "system-unwind" fn(RawHandle, *mut i32, *mut u32, *mut u32, *mut i64, *mut i64);
    /// `XWF_GetBlock(hVolume, lpStartOfs, lpEndOfs)`.
    get_block = "XWF_GetBlock": unsafe extern "system-unwind" fn(RawHandle, *mut i64, *mut i64) -> Bool;
    /// `XWF_SetBlock(hVolume, nStartOfs, nEndOfs)`.
    set_block = "XWF_SetBlock": unsafe extern "system-unwind" fn(RawHandle, i64, i64) -> Bool;
    /// `XWF_GetSectorContents(hVolume, nSectorNo, lpDescr, lpItemID)`.
    get_sector_contents = "XWF_GetSectorContents":
        unsafe extern "system-unwind" fn(RawHandle, i64, *mut u16, *mut i32) -> Bool;
    /// `XWF_OpenItem(hVolume, nItemID, nFlags)`.
    open_item = "XWF_OpenItem": unsafe extern "system-unwind" fn(RawHandle, i32, u32) -> RawHandle;
    /// `XWF_Close(hVolumeOrItem)`.
    close = "XWF_Close": unsafe extern "system-unwind" fn(RawHandle);
    /// `XWF_Read(hVolumeOrItem, nOffset, lpBuffer, nNumberOfBytesToRead)`.
    read = "XWF_Read": unsafe extern "system-unwind" fn(RawHandle, i64, *mut u8, u32) -> u32;
    /// `XWF_SelectVolumeSnapshot(hVolume)`.
    select_volume_snapshot = "XWF_SelectVolumeSnapshot": unsafe extern "system-unwind" fn(RawHandle);
    /// `XWF_GetVSProp(nPropType, pBuffer)`.
    get_vs_prop = "XWF_GetVSProp": unsafe extern "system-unwind" fn(i32, *mut c_void) -> i64;
    /// `XWF_GetItemCount(pReserved)`.
    get_item_count = "XWF_GetItemCount": unsafe extern "system-unwind" fn(*mut c_void) -> u32;
    /// `XWF_GetFileCount(nDirID)`.
    get_file_count = "XWF_GetFileCount": unsafe extern "system-unwind" fn(i32) -> u32;
    /// `XWF_GetCaseProp(pReserved, nPropType, pBuffer, nBufLen)`.
    get_case_prop = "XWF_GetCaseProp": unsafe extern "system-unwind" fn(*mut c_void, i32, *mut c_void, i32) -> i64;
    /// `XWF_GetFirstEvObj(pReserved)`.
    get_first_ev_obj = "XWF_GetFirstEvObj": unsafe extern "system-unwind" fn(*mut c_void) -> RawHandle;
    /// `XWF_GetNextEvObj(hPrevEvidence, pReserved)`.
    get_next_ev_obj = "XWF_GetNextEvObj": unsafe extern "system-unwind" fn(RawHandle, *mut c_void) -> RawHandle;
    /// `XWF_GetEvObj(nEvObjID)`.
    get_ev_obj = "XWF_GetEvObj": unsafe extern "system-unwind" fn(u32) -> RawHandle;
    /// `XWF_CreateEvObj(nType, nDiskID, lpPath, pReserved)`.
    create_ev_obj = "XWF_CreateEvObj":
        unsafe extern "system-unwind" fn(u32, i32, *const u16, *mut c_void) -> RawHandle;
    /// `XWF_OpenEvObj(hEvidence, nFlags)`.
    open_ev_obj = "XWF_OpenEvObj": unsafe extern "system-unwind" fn(RawHandle, u32) -> RawHandle;
    /// `XWF_CloseEvObj(hEvidence)`.
    close_ev_obj = "XWF_CloseEvObj": unsafe extern "system-unwind" fn(RawHandle);
    /// `XWF_GetEvObjProp(hEvidence, nPropType, lpBuffer)`.
    get_ev_obj_prop = "XWF_GetEvObjProp": unsafe extern "system-unwind" fn(RawHandle, u32, *mut c_void) -> i64;
    /// `XWF_GetEvObjReportTableAssocs(hEvidence, nFlags, lpValue)`.
    get_ev_obj_report_table_assocs = "XWF_GetEvObjReportTableAssocs":
        unsafe extern "system-unwind" fn(RawHandle, u32, *mut i32) -> *const c_void;
    /// `XWF_GetReportTableInfo(pReserved, nReportTableID, lpOptional)`.
    get_report_table_info = "XWF_GetReportTableInfo":
        unsafe extern "system-unwind" fn(*mut c_void, i32, *mut i32) -> *const u16;
    /// `XWF_CreateItem(lpName, nCreationFlags)`.
    create_item = "XWF_CreateItem": unsafe extern "system-unwind" fn(*const u16, u32) -> i32;
    /// `XWF_CreateFile(pName, nCreationFlags, nParentItemID, pSourceInfo)`.
    create_file = "XWF_CreateFile":
        unsafe extern "system-unwind" fn(*const u16, u32, i32, *const c_void) -> i32;
    /// `XWF_GetItemName(nItemID)`.
    get_item_name = "XWF_GetItemName": unsafe extern "system-unwind" fn(i32) -> *const u16;
    /// `XWF_GetItemSize(nItemID)`.
    get_item_size = "XWF_GetItemSize": unsafe extern "system-unwind" fn(i32) -> i64;
    /// `XWF_SetItemSize(nItemID, nSize)`.
    set_item_size = "XWF_SetItemSize": unsafe extern "system-unwind" fn(i32, i64);
    /// `XWF_GetItemOfs(nItemID, lpDefOfs, lpStartSector)`.
    get_item_ofs = "XWF_GetItemOfs": unsafe extern "system-unwind" fn(i32, *mut i64, *mut i64);
    /// `XWF_SetItemOfs(nItemID, nDefOfs, nStartSector)`.
    set_item_ofs = "XWF_SetItemOfs": unsafe extern "system-unwind" fn(i32, i64, i64);
    /// `XWF_GetItemInformation(nItemID, nInfoType, lpSuccess)`.
    get_item_information = "XWF_GetItemInformation":
        unsafe extern "system-unwind" fn(i32, i32, *mut Bool) -> i64;
    /// `XWF_SetItemInformation(nItemID, nInfoType, nInfoValue)`.
    set_item_information = "XWF_SetItemInformation": unsafe extern "system-unwind" fn(i32, i32, i64) -> Bool;
    /// `XWF_GetItemType(nItemID, lpTypeDescr, nBufferLenAndFlags)`.
    get_item_type = "XWF_GetItemType": unsafe extern "system-unwind" fn(i32, *mut u16, u32) -> i32;
    /// `XWF_SetItemType(nItemID, lpTypeDescr, nTypeStatus)`.
    set_item_type = "XWF_SetItemType": unsafe extern "system-unwind" fn(i32, *const u16, i32);
    /// `XWF_GetItemParent(nItemID)`.
    get_item_parent = "XWF_GetItemParent": unsafe extern "system-unwind" fn(i32) -> i32;
    /// `XWF_SetItemParent(nChildItemID, nParentItemID)`.
    set_item_parent = "XWF_SetItemParent": unsafe extern "system-unwind" fn(i32, i32);
    /// `XWF_GetReportTableAssocs(nItemID, lpBuffer, nBufferLen)`.
    get_report_table_assocs = "XWF_GetReportTableAssocs":
        unsafe extern "system-unwind" fn(i32, *mut u16, i32) -> i32;
    /// `XWF_AddToReportTable(nItemID, lpReportTableName, nFlags)`.
    add_to_report_table = "XWF_AddToReportTable": unsafe extern "system-unwind" fn(i32, *const u16, u32) -> i32;
    /// `XWF_GetComment(nItemID)`.
    get_comment = "XWF_GetComment": unsafe extern "system-unwind" fn(i32) -> *const u16;
    /// `XWF_AddComment(nItemID, lpComment, nFlagsHowToAdd)`.
    add_comment = "XWF_AddComment": unsafe extern "system-unwind" fn(i32, *const u16, u32) -> Bool;
    /// `XWF_GetExtractedMetadata(nItemID)`.
    get_extracted_metadata = "XWF_GetExtractedMetadata": unsafe extern "system-unwind" fn(i32) -> *const u16;
    /// `XWF_AddExtractedMetadata(nItemID, lpComment, nFlagsHowToAdd)`.
    add_extracted_metadata = "XWF_AddExtractedMetadata":
        unsafe extern "system-unwind" fn(i32, *const u16, u32) -> Bool;
    /// `XWF_GetHashValue(nItemID, lpBuffer)`.
    get_hash_value = "XWF_GetHashValue": unsafe extern "system-unwind" fn(i32, *mut u8) -> Bool;
    /// `XWF_GetMetadata(nItemID, hItem)`; the result is released with `XWF_ReleaseMem`.
    get_metadata = "XWF_GetMetadata": unsafe extern "system-unwind" fn(i32, RawHandle) -> *mut c_void;
    /// `XWF_GetRasterImage(pRIInfo)`; the result is released with `XWF_ReleaseMem`.
    get_raster_image = "XWF_GetRasterImage":
        unsafe extern "system-unwind" fn(*mut RasterImageInformation) -> *mut c_void;
    /// `XWF_Search(pSInfo, pCPages)`.
    search = "XWF_Search": unsafe extern "system-unwind" fn(*mut SearchInformation, *mut CodePages) -> i32;
    /// `XWF_GetSearchTerm(nSearchTermID, pReserved)`.
    get_search_term = "XWF_GetSearchTerm": unsafe extern "system-unwind" fn(i32, *mut c_void) -> *const u16;
    /// `XWF_AddSearchTerm(lpSearchTermName, nFlags)`.
    add_search_term = "XWF_AddSearchTerm": unsafe extern "system-unwind" fn(*const u16, u32) -> i32;
    /// `XWF_AddEvent(pEvt)`.
    add_event = "XWF_AddEvent": unsafe extern "system-unwind" fn(*mut EventInformation) -> i32;
    /// `XWF_CreateContainer(lpFileName, nFlags, pReserved)`.
    create_container = "XWF_CreateContainer":
        unsafe extern "system-unwind" fn(*const u16, u32, *mut c_void) -> RawHandle;
    /// `XWF_CopyToContainer(hContainer, hItem, nFlags, nMode, nStartOfs, nEndOfs, pReserved)`.
    copy_to_container = "XWF_CopyToContainer":
        unsafe extern "system-unwind" fn(RawHandle, RawHandle, u32, u32, i64, i64, *mut c_void) -> i32;
    /// `XWF_CloseContainer(hContainer, pReserved)`.
    close_container = "XWF_CloseContainer": unsafe extern "system-unwind" fn(RawHandle, *mut c_void) -> i32;
    /// `XWF_OutputMessage(lpMessage, nFlags)`.
    output_message = "XWF_OutputMessage": OutputMessageFn;
    /// `XWF_GetUserInput(lpMessage, lpBuffer, nBufferLen, nFlags)`.
    get_user_input = "XWF_GetUserInput":
        unsafe extern "system-unwind" fn(*const u16, *mut u16, u32, u32) -> i64;
    /// `XWF_ShowProgress(lpCaption, nFlags)`.
    show_progress = "XWF_ShowProgress": unsafe extern "system-unwind" fn(*const u16, u32);
    /// `XWF_SetProgressPercentage(nPercent)`.
    set_progress_percentage = "XWF_SetProgressPercentage": unsafe extern "system-unwind" fn(u32);
    /// `XWF_SetProgressDescription(lpStr)`.
    set_progress_description = "XWF_SetProgressDescription": unsafe extern "system-unwind" fn(*const u16);
    /// `XWF_ShouldStop()`.
    should_stop = "XWF_ShouldStop": unsafe extern "system-unwind" fn() -> Bool;
    /// `XWF_HideProgress()`.
    hide_progress = "XWF_HideProgress": unsafe extern "system-unwind" fn();
    /// `XWF_ReleaseMem(lpBuffer)`.
    release_mem = "XWF_ReleaseMem": ReleaseMemFn;
}

impl FunctionTable {
    /// Lists every required symbol `source` does not export.
    pub fn missing<S: SymbolSource + ?Sized>(source: &S) -> Vec<&'static str> {
        let missing: Vec<_> = REQUIRED_SYMBOLS
            .iter()
            .copied()
            .filter(|symbol| source.lookup(symbol).is_none())
            .collect();
        debug!(missing = missing.len(), "probed host symbols");
        missing
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTable")
            .field("symbols", &REQUIRED_SYMBOLS.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "system-unwind" fn placeholder() {}

    fn full_source() -> HashMap<String, usize> {
        REQUIRED_SYMBOLS
            .iter()
            .enumerate()
            .map(|(i, name)| ((*name).to_string(), placeholder as usize + i))
            .collect()
    }

    #[test]
    fn required_symbols_are_unique() {
        let mut names: Vec<_> = REQUIRED_SYMBOLS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), REQUIRED_SYMBOLS.len());
        assert!(REQUIRED_SYMBOLS.iter().all(|name| name.starts_with("XWF_")));
        assert!(REQUIRED_SYMBOLS.contains(&"XWF_ReleaseMem"));
    }

    #[test]
    fn resolve_populates_every_entry() {
        let source = full_source();
        let table = FunctionTable::resolve(&source).unwrap();
        for name in REQUIRED_SYMBOLS {
            assert_eq!(table.address_of(name), source.get(*name).copied());
        }
        assert_eq!(table.address_of("XWF_Unknown"), None);
        assert!(FunctionTable::missing(&source).is_empty());
    }

    #[test]
    fn resolve_fails_on_any_missing_symbol() {
        for missing in REQUIRED_SYMBOLS {
            let mut source = full_source();
            source.remove(*missing);
            match FunctionTable::resolve(&source) {
                Err(XwfError::SymbolNotFound { symbol }) => assert_eq!(symbol, *missing),
                other => panic!("expected missing {missing}, got {other:?}"),
            }
            assert_eq!(FunctionTable::missing(&source), vec![*missing]);
        }
    }

    #[test]
    fn null_address_counts_as_missing() {
        let mut source = full_source();
        source.insert("XWF_Read".to_string(), 0);
        assert!(matches!(
            FunctionTable::resolve(&source),
            Err(XwfError::SymbolNotFound { symbol: "XWF_Read" })
        ));
    }

    #[test]
    fn missing_module_is_reported() {
        let err = HostModule::open("/nonexistent/xtension-host-module").unwrap_err();
        assert!(matches!(err, XwfError::HostModuleUnavailable(_)));
    }
}
