//! The case and its evidence objects.

use std::collections::HashSet;
use std::ffi::c_void;
use std::ptr;

use tracing::{debug, warn};

use crate::abi::{RawHandle, ReportTableAssoc};
use crate::buffer::{from_wide_ptr, to_wide};
use crate::error::{Result, XwfError};
use crate::handle::{Evidence, Handle, Volume};
use crate::host::Host;
use crate::types::{
    AssocFlags, CaseProperty, EvidenceKind, EvidenceProperty, FileSystem, FileTime, HashType,
    ItemId,
};

/// Capacity of each case property buffer, in characters.
const CASE_PROPERTY_UNITS: usize = 1024;

/// Capacity of each evidence property text buffer, in characters.
const EVIDENCE_TEXT_UNITS: usize = 128;

/// The string properties of the active case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CaseProperties {
    /// Case title.
    pub title: Option<String>,
    /// Examiner name.
    pub examiner: Option<String>,
    /// Path of the case file.
    pub file_path: Option<String>,
    /// Case directory.
    pub directory: Option<String>,
}

/// A hash type together with its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HashValue {
    /// Algorithm.
    pub kind: HashType,
    /// Raw digest bytes.
    pub digest: Vec<u8>,
}

impl HashValue {
    /// Lowercase hexadecimal digest.
    pub fn to_hex(&self) -> String {
        self.digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

/// Every property of an evidence object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EvidenceProperties {
    /// Evidence object number.
    pub object_number: i64,
    /// Evidence object id.
    pub object_id: i64,
    /// Id of the parent object, 0 for none.
    pub parent_object_id: i64,
    /// Title.
    pub title: Option<String>,
    /// Extended title.
    pub extended_title: String,
    /// Abbreviated title.
    pub abbreviated_title: String,
    /// Internal name.
    pub internal_name: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Examiner comments.
    pub examiner_comments: Option<String>,
    /// Directory the host uses internally.
    pub internally_used_directory: String,
    /// Output directory.
    pub output_directory: String,
    /// Size in bytes.
    pub size_in_bytes: i64,
    /// Number of items in the volume snapshot.
    pub volume_snapshot_file_count: i64,
    /// Evidence flags.
    pub flags: i64,
    /// `None` for codes this crate does not know.
    pub file_system: Option<FileSystem>,
    /// Primary hash, absent when the host reports no hash type.
    pub hash: Option<HashValue>,
    /// Secondary hash, absent when the host reports no hash type.
    pub hash2: Option<HashValue>,
    /// Creation time.
    pub creation_time: Option<FileTime>,
    /// Modification time.
    pub modification_time: Option<FileTime>,
}

/// A report table of the case.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReportTable {
    /// Table id.
    pub id: u16,
    /// Table name.
    pub name: String,
}

impl Host {
    /// Reads one case property.
    ///
    /// Convention: a negative length, or an empty string, means the case has
    /// no such property and yields `None`.
    pub fn case_property(&self, property: CaseProperty) -> Result<Option<String>> {
        let mut buffer = self.buffers.wide(CASE_PROPERTY_UNITS);
        let out = buffer.as_mut_ptr();
        let units = buffer.len_i32();
        let len = self.invoke("XWF_GetCaseProp", &property, || unsafe {
            (self.table.get_case_prop)(ptr::null_mut(), property.raw(), out.cast(), units)
        })?;
        if len < 0 {
            return Ok(None);
        }
        let value = buffer.to_string_lossy();
        Ok((!value.is_empty()).then_some(value))
    }

    /// Reads every case property.
    pub fn case_properties(&self) -> Result<CaseProperties> {
        Ok(CaseProperties {
            title: self.case_property(CaseProperty::Title)?,
            examiner: self.case_property(CaseProperty::Examiner)?,
            file_path: self.case_property(CaseProperty::FilePath)?,
            directory: self.case_property(CaseProperty::Directory)?,
        })
    }

    /// Enumerates the evidence objects of the case.
    ///
    /// The objects are lent by the host and retired when the operation ends.
    /// Enumeration stops at a null handle or at the first handle seen twice.
    pub fn evidence_objects(&mut self) -> Result<Vec<Handle<Evidence>>> {
        let mut objects = Vec::new();
        let mut seen = HashSet::new();
        let mut raw = self.invoke("XWF_GetFirstEvObj", &(), || unsafe {
            (self.table.get_first_ev_obj)(ptr::null_mut())
        })?;
        while !raw.is_null() {
            if !seen.insert(raw as usize) {
                warn!(raw = raw as usize, "evidence enumeration repeated a handle");
                break;
            }
            objects.push(self.handles.adopt(raw as usize)?);
            let previous = raw;
            raw = self.invoke("XWF_GetNextEvObj", &(previous as usize), || unsafe {
                (self.table.get_next_ev_obj)(previous, ptr::null_mut())
            })?;
        }
        debug!(count = objects.len(), "enumerated evidence objects");
        Ok(objects)
    }

    /// Looks up an evidence object by id.
    ///
    /// Convention: null means no such object and yields `None`.
    pub fn evidence(&mut self, id: u32) -> Result<Option<Handle<Evidence>>> {
        let raw = self.invoke("XWF_GetEvObj", &id, || unsafe { (self.table.get_ev_obj)(id) })?;
        if raw.is_null() {
            return Ok(None);
        }
        self.handles.adopt(raw as usize).map(Some)
    }

    /// Adds evidence to the case and returns the first object created.
    ///
    /// Convention: a null handle is a sentinel failure.
    pub fn create_evidence(
        &mut self,
        kind: EvidenceKind,
        path: Option<&str>,
    ) -> Result<Handle<Evidence>> {
        let wide_path = match (kind.needs_path(), path) {
            (true, None) | (true, Some("")) => {
                return Err(XwfError::invalid(format!("{kind:?} evidence requires a path")));
            }
            (true, Some(path)) => Some(to_wide(path)?),
            (false, _) => None,
        };
        let (category, disk) = kind.category_and_disk()?;
        let path_ptr = wide_path.as_ref().map_or(ptr::null(), |path| path.as_ptr());
        let raw = self.invoke("XWF_CreateEvObj", &(kind, path), || unsafe {
            (self.table.create_ev_obj)(category, disk, path_ptr, ptr::null_mut())
        })?;
        if raw.is_null() {
            return Err(XwfError::sentinel("XWF_CreateEvObj", format!("{kind:?} not created")));
        }
        self.handles.adopt(raw as usize)
    }

    /// Opens an evidence object and returns the volume it represents.
    ///
    /// The volume is closed by [`Host::close_evidence`], or by
    /// [`Host::end_operation`] when the evidence object is lent.
    ///
    /// Convention: a null handle is a sentinel failure.
    pub fn open_evidence(&mut self, evidence: Handle<Evidence>, flags: u32) -> Result<Handle<Volume>> {
        self.handles.ensure_open(evidence)?;
        let raw = self.invoke("XWF_OpenEvObj", &(evidence, flags), || unsafe {
            (self.table.open_ev_obj)(evidence.as_ptr(), flags)
        })?;
        if raw.is_null() {
            return Err(XwfError::sentinel("XWF_OpenEvObj", "no volume returned"));
        }
        self.handles.register_child(raw as usize, evidence)
    }

    /// Closes an evidence object opened through [`Host::open_evidence`].
    ///
    /// Does nothing if the object was never opened through this binding.
    pub fn close_evidence(&mut self, evidence: Handle<Evidence>) -> Result<()> {
        self.handles.ensure_open(evidence)?;
        if !self.handles.has_children(evidence) {
            debug!(?evidence, "evidence object not opened, nothing to close");
            return Ok(());
        }
        let closed = self.invoke("XWF_CloseEvObj", &evidence, || unsafe {
            (self.table.close_ev_obj)(evidence.as_ptr());
        });
        self.handles.close_children(evidence);
        closed
    }

    fn ev_prop(&self, evidence: Handle<Evidence>, property: EvidenceProperty, buffer: *mut c_void) -> Result<i64> {
        self.invoke("XWF_GetEvObjProp", &(evidence, property), || unsafe {
            (self.table.get_ev_obj_prop)(evidence.as_ptr(), property.raw(), buffer)
        })
    }

    /// Reads a numeric evidence property.
    pub fn evidence_number(&self, evidence: Handle<Evidence>, property: EvidenceProperty) -> Result<i64> {
        self.handles.ensure_open(evidence)?;
        self.ev_prop(evidence, property, ptr::null_mut())
    }

    /// Reads a string property the host returns as a pointer to its own memory.
    pub fn evidence_owned_text(
        &self,
        evidence: Handle<Evidence>,
        property: EvidenceProperty,
    ) -> Result<Option<String>> {
        self.handles.ensure_open(evidence)?;
        let address = self.ev_prop(evidence, property, ptr::null_mut())?;
        // SAFETY: for pointer-valued properties the host returns a terminated
        // string it keeps alive; reads are bounded by the configuration.
        Ok(unsafe { from_wide_ptr(address as usize as *const u16, self.config.max_string_units) })
    }

    /// Reads a string property the host writes into a caller buffer.
    pub fn evidence_text(&self, evidence: Handle<Evidence>, property: EvidenceProperty) -> Result<String> {
        self.handles.ensure_open(evidence)?;
        let mut buffer = self.buffers.wide(EVIDENCE_TEXT_UNITS);
        self.ev_prop(evidence, property, buffer.as_mut_ptr().cast())?;
        Ok(buffer.to_string_lossy())
    }

    /// Reads one of the two hashes of an evidence object.
    ///
    /// Convention: hash type 0 means "no hash"; the value is then absent and
    /// the host is not asked for it.
    pub fn evidence_hash(&self, evidence: Handle<Evidence>, secondary: bool) -> Result<Option<HashValue>> {
        self.handles.ensure_open(evidence)?;
        let (type_prop, value_prop) = if secondary {
            (EvidenceProperty::HashType2, EvidenceProperty::HashValue2)
        } else {
            (EvidenceProperty::HashType, EvidenceProperty::HashValue)
        };
        let code = self.ev_prop(evidence, type_prop, ptr::null_mut())?;
        let Some(kind) = HashType::defined(code) else {
            return Ok(None);
        };
        let mut buffer = self.buffers.bytes(EVIDENCE_TEXT_UNITS * 2);
        let len = self.ev_prop(evidence, value_prop, buffer.as_mut_ptr().cast())?;
        let len = usize::try_from(len).unwrap_or(0).min(buffer.len());
        if len == 0 {
            return Err(XwfError::sentinel("XWF_GetEvObjProp", format!("empty {kind:?} digest")));
        }
        Ok(Some(HashValue {
            kind,
            digest: buffer[..len].to_vec(),
        }))
    }

    /// Reads every property of an evidence object.
    pub fn evidence_properties(&self, evidence: Handle<Evidence>) -> Result<EvidenceProperties> {
        use EvidenceProperty as P;
        let number = |property| self.evidence_number(evidence, property);
        Ok(EvidenceProperties {
            object_number: number(P::ObjectNumber)?,
            object_id: number(P::ObjectId)?,
            parent_object_id: number(P::ParentObjectId)?,
            title: self.evidence_owned_text(evidence, P::Title)?,
            extended_title: self.evidence_text(evidence, P::ExtendedTitle)?,
            abbreviated_title: self.evidence_text(evidence, P::AbbreviatedTitle)?,
            internal_name: self.evidence_owned_text(evidence, P::InternalName)?,
            description: self.evidence_owned_text(evidence, P::Description)?,
            examiner_comments: self.evidence_owned_text(evidence, P::ExaminerComments)?,
            internally_used_directory: self.evidence_text(evidence, P::InternallyUsedDirectory)?,
            output_directory: self.evidence_text(evidence, P::OutputDirectory)?,
            size_in_bytes: number(P::SizeInBytes)?,
            volume_snapshot_file_count: number(P::VolumeSnapshotFileCount)?,
            flags: number(P::Flags)?,
            file_system: i32::try_from(number(P::FileSystem)?)
                .ok()
                .and_then(FileSystem::from_raw),
            hash: self.evidence_hash(evidence, false)?,
            hash2: self.evidence_hash(evidence, true)?,
            creation_time: FileTime::non_zero(number(P::CreationTime)?),
            modification_time: FileTime::non_zero(number(P::ModificationTime)?),
        })
    }

    /// Lists the report table associations of every item of an evidence object.
    ///
    /// Convention: null means the list is unavailable and yields an empty list.
    /// The list belongs to the host and is only copied.
    pub fn evidence_report_table_assocs(
        &self,
        evidence: Handle<Evidence>,
        flags: AssocFlags,
    ) -> Result<Vec<(u16, ItemId)>> {
        self.handles.ensure_open(evidence)?;
        let mut count = 0i32;
        let list = self.invoke("XWF_GetEvObjReportTableAssocs", &(evidence, flags), || unsafe {
            (self.table.get_ev_obj_report_table_assocs)(evidence.as_ptr(), flags.bits(), &mut count)
        })?;
        if list.is_null() || count <= 0 {
            return Ok(Vec::new());
        }
        let entries = list.cast::<ReportTableAssoc>();
        let mut assocs = Vec::with_capacity(count as usize);
        for index in 0..count as usize {
            // SAFETY: the host reports `count` packed entries at `list`.
            let entry = unsafe { ptr::read_unaligned(entries.add(index)) };
            let table_id = entry.table_id;
            match ItemId::from_host(i64::from(entry.item_id)) {
                Some(item) => assocs.push((table_id, item)),
                None => debug!(table_id, "skipping association without an item"),
            }
        }
        Ok(assocs)
    }

    /// Name of a report table.
    ///
    /// Convention: null means the table does not exist and yields `None`.
    pub fn report_table_name(&self, id: u16) -> Result<Option<String>> {
        let name = self.invoke("XWF_GetReportTableInfo", &id, || unsafe {
            (self.table.get_report_table_info)(ptr::null_mut(), i32::from(id), ptr::null_mut())
        })?;
        // SAFETY: the host returns null or a terminated name it keeps alive.
        Ok(unsafe { from_wide_ptr(name, self.config.max_string_units) })
    }

    /// Maximum number of report tables the host supports.
    pub fn report_table_capacity(&self) -> Result<u16> {
        let mut capacity = 0i32;
        self.invoke("XWF_GetReportTableInfo", &-1, || unsafe {
            (self.table.get_report_table_info)(ptr::null_mut(), -1, &mut capacity)
        })?;
        Ok(u16::try_from(capacity.max(0)).unwrap_or(u16::MAX))
    }

    /// Every existing report table.
    pub fn report_tables(&self) -> Result<Vec<ReportTable>> {
        let mut tables = Vec::new();
        for id in 0..self.report_table_capacity()? {
            if let Some(name) = self.report_table_name(id)? {
                tables.push(ReportTable { id, name });
            }
        }
        Ok(tables)
    }

    pub(crate) fn raw_or_null<K: crate::handle::HandleKind>(handle: Option<Handle<K>>) -> RawHandle {
        handle.map_or(ptr::null_mut(), Handle::as_ptr)
    }
}
