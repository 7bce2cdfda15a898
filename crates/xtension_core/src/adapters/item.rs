//! Items of the active volume snapshot.

use std::collections::HashSet;
use std::ffi::c_void;
use std::ptr;

use tracing::{debug, trace};

use crate::abi::{struct_size, RasterImageInformation};
use crate::adapters::case::HashValue;
use crate::adapters::{split_list, truthy};
use crate::buffer::{from_wide_ptr, to_wide, to_wide_name};
use crate::error::{Result, XwfError};
use crate::handle::{Handle, Item};
use crate::host::Host;
use crate::types::{
    CommentMode, CreateFileFlags, CreateItemFlags, FileTime, HashType, ItemId, ItemInfo,
    RasterFlags, ReportTableFlags, TypeCategory, VsProperty,
};

/// Capacity of the type description buffer, in characters.
const ITEM_TYPE_UNITS: usize = 1024;

/// Hash buffer size; large enough for every digest the host produces.
const HASH_BUFFER_BYTES: usize = 64;

/// Offset value meaning "not available".
const OFFSET_UNAVAILABLE: i64 = 0xFFFF_FFFF;

/// Result of adding an item to a report table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// The item was newly associated.
    New,
    /// The item was already associated.
    Existing,
}

/// Which of the snapshot's two hashes to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashSlot {
    /// First hash.
    #[default]
    Primary,
    /// Second hash.
    Secondary,
}

impl HashSlot {
    const fn selector(self) -> u32 {
        match self {
            HashSlot::Primary => 1,
            HashSlot::Secondary => 2,
        }
    }

    const fn property(self) -> VsProperty {
        match self {
            HashSlot::Primary => VsProperty::HashType1,
            HashSlot::Secondary => VsProperty::HashType2,
        }
    }
}

/// Where an item is defined and where its data starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ItemOffsets {
    /// Offset of the file system structure defining the item.
    pub definition: Option<i64>,
    /// Volume offset where a carved item starts.
    pub carved: Option<i64>,
    /// Sector where the item's data starts.
    pub start_sector: Option<i64>,
}

/// Detected type of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ItemType {
    /// Type description, e.g. "jpg".
    pub description: String,
    /// Detection status; `None` for codes this crate does not know.
    pub category: Option<TypeCategory>,
}

/// A rendered raster image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel data in the layout the flags asked for.
    pub data: Vec<u8>,
}

impl Host {
    /// Creates a new item in the active snapshot.
    ///
    /// Convention: -1 is a sentinel failure.
    pub fn create_item(&self, name: &str, flags: CreateItemFlags) -> Result<ItemId> {
        let wide = to_wide_name("item name", name)?;
        let id = self.invoke("XWF_CreateItem", &(name, flags), || unsafe {
            (self.table.create_item)(wide.as_ptr(), flags.bits())
        })?;
        ItemId::from_host(i64::from(id))
            .ok_or_else(|| XwfError::sentinel("XWF_CreateItem", format!("returned {id}")))
    }

    /// Creates a file item, optionally attaching an external file as its data.
    ///
    /// Convention: -1 is a sentinel failure.
    pub fn create_file(
        &self,
        name: &str,
        mut flags: CreateFileFlags,
        parent: Option<ItemId>,
        external: Option<&str>,
    ) -> Result<ItemId> {
        let wide = to_wide_name("file name", name)?;
        let source = match external {
            Some(path) => {
                flags |= CreateFileFlags::ATTACH_EXTERNAL_FILE;
                Some(to_wide_name("external file path", path)?)
            }
            None => {
                if flags.contains(CreateFileFlags::ATTACH_EXTERNAL_FILE) {
                    return Err(XwfError::invalid("attaching an external file requires its path"));
                }
                None
            }
        };
        let source_ptr: *const c_void = source.as_ref().map_or(ptr::null(), |path| path.as_ptr().cast());
        let parent_id = parent.map_or(-1, ItemId::get);
        let id = self.invoke("XWF_CreateFile", &(name, flags, parent, external), || unsafe {
            (self.table.create_file)(wide.as_ptr(), flags.bits(), parent_id, source_ptr)
        })?;
        ItemId::from_host(i64::from(id))
            .ok_or_else(|| XwfError::sentinel("XWF_CreateFile", format!("returned {id}")))
    }

    /// Name of an item.
    ///
    /// Convention: null is a sentinel failure.
    pub fn item_name(&self, item: ItemId) -> Result<String> {
        let name = self.invoke("XWF_GetItemName", &item, || unsafe {
            (self.table.get_item_name)(item.get())
        })?;
        // SAFETY: the host returns null or a terminated name it keeps alive.
        unsafe { from_wide_ptr(name, self.config.max_string_units) }
            .ok_or_else(|| XwfError::sentinel("XWF_GetItemName", format!("no name for item {item}")))
    }

    /// Size of an item in bytes.
    ///
    /// Convention: -1 means unknown and yields `None`.
    pub fn item_size(&self, item: ItemId) -> Result<Option<i64>> {
        let size = self.invoke("XWF_GetItemSize", &item, || unsafe {
            (self.table.get_item_size)(item.get())
        })?;
        Ok((size >= 0).then_some(size))
    }

    /// Sets the size of an item; `None` marks it unknown.
    pub fn set_item_size(&self, item: ItemId, size: Option<i64>) -> Result<()> {
        let raw = match size {
            Some(size) if size < 0 => {
                return Err(XwfError::invalid(format!("negative item size {size}")));
            }
            Some(size) => size,
            None => -1,
        };
        self.invoke("XWF_SetItemSize", &(item, size), || unsafe {
            (self.table.set_item_size)(item.get(), raw);
        })
    }

    /// Where an item is defined and where its data starts.
    ///
    /// Convention: a negative definition offset is the negated start of a
    /// carved item; -1 and `0xFFFFFFFF` mean not available.
    pub fn item_offsets(&self, item: ItemId) -> Result<ItemOffsets> {
        let mut definition = -1i64;
        let mut start_sector = -1i64;
        self.invoke("XWF_GetItemOfs", &item, || unsafe {
            (self.table.get_item_ofs)(item.get(), &mut definition, &mut start_sector);
        })?;
        let (definition, carved) = match definition {
            -1 | OFFSET_UNAVAILABLE => (None, None),
            offset if offset < 0 => (None, Some(-offset)),
            offset => (Some(offset), None),
        };
        Ok(ItemOffsets {
            definition,
            carved,
            start_sector: (start_sector >= 0 && start_sector != OFFSET_UNAVAILABLE)
                .then_some(start_sector),
        })
    }

    /// Sets where an item is defined and where its data starts.
    ///
    /// Exactly one of `definition` and `carved` must be given.
    pub fn set_item_offsets(&self, item: ItemId, offsets: ItemOffsets) -> Result<()> {
        let definition = match (offsets.definition, offsets.carved) {
            (Some(offset), None) if offset >= 0 => offset,
            (None, Some(offset)) if offset > 1 => -offset,
            _ => {
                return Err(XwfError::invalid(format!(
                    "offsets {offsets:?} need exactly one valid definition or carved offset"
                )));
            }
        };
        let start_sector = offsets.start_sector.unwrap_or(-1);
        self.invoke("XWF_SetItemOfs", &(item, offsets), || unsafe {
            (self.table.set_item_ofs)(item.get(), definition, start_sector);
        })
    }

    /// Reads a numeric item property.
    ///
    /// Convention: the success flag written by the host; `FALSE` yields `None`.
    pub fn item_information(&self, item: ItemId, info: ItemInfo) -> Result<Option<i64>> {
        if matches!(info, ItemInfo::SetFlags | ItemInfo::RemoveFlags) {
            return Err(XwfError::invalid(format!("{info:?} can only be written")));
        }
        let mut success = 0;
        let value = self.invoke("XWF_GetItemInformation", &(item, info), || unsafe {
            (self.table.get_item_information)(item.get(), info.raw(), &mut success)
        })?;
        Ok(truthy(success).then_some(value))
    }

    /// Reads a timestamp of an item.
    ///
    /// Convention: as [`Host::item_information`]; zero means not set.
    pub fn item_time(&self, item: ItemId, info: ItemInfo) -> Result<Option<FileTime>> {
        if !info.is_timestamp() {
            return Err(XwfError::invalid(format!("{info:?} is not a timestamp")));
        }
        Ok(self.item_information(item, info)?.and_then(FileTime::non_zero))
    }

    /// Writes a numeric item property.
    ///
    /// Convention: the host's `BOOL` is returned as is.
    pub fn set_item_information(&self, item: ItemId, info: ItemInfo, value: i64) -> Result<bool> {
        let set = self.invoke("XWF_SetItemInformation", &(item, info, value), || unsafe {
            (self.table.set_item_information)(item.get(), info.raw(), value)
        })?;
        Ok(truthy(set))
    }

    /// Detected type of an item.
    ///
    /// Convention: the return value is the category; -1 means detection failed.
    pub fn item_type(&self, item: ItemId) -> Result<ItemType> {
        let mut buffer = self.buffers.wide(ITEM_TYPE_UNITS);
        let out = buffer.as_mut_ptr();
        let units = buffer.len_u32();
        let category = self.invoke("XWF_GetItemType", &item, || unsafe {
            (self.table.get_item_type)(item.get(), out, units)
        })?;
        Ok(ItemType {
            description: buffer.to_string_lossy(),
            category: TypeCategory::from_raw(category),
        })
    }

    /// Sets the type of an item.
    pub fn set_item_type(&self, item: ItemId, description: &str, category: TypeCategory) -> Result<()> {
        let wide = to_wide(description)?;
        self.invoke("XWF_SetItemType", &(item, description, category), || unsafe {
            (self.table.set_item_type)(item.get(), wide.as_ptr(), category.raw());
        })
    }

    /// Parent of an item.
    ///
    /// Convention: -1 means the item is the root directory and yields `None`.
    pub fn item_parent(&self, item: ItemId) -> Result<Option<ItemId>> {
        let parent = self.invoke("XWF_GetItemParent", &item, || unsafe {
            (self.table.get_item_parent)(item.get())
        })?;
        Ok(ItemId::from_host(i64::from(parent)))
    }

    /// Moves an item below another.
    pub fn set_item_parent(&self, child: ItemId, parent: ItemId) -> Result<()> {
        if child == parent {
            return Err(XwfError::invalid(format!("item {child} cannot be its own parent")));
        }
        self.invoke("XWF_SetItemParent", &(child, parent), || unsafe {
            (self.table.set_item_parent)(child.get(), parent.get());
        })
    }

    /// Full path of an item, built from its chain of parents.
    ///
    /// Every component is preceded by the configured separator. The root
    /// directory contributes no component, so the root's own path is empty.
    /// A chain that revisits an item fails with [`XwfError::ParentCycle`]; one
    /// longer than the configured depth fails with [`XwfError::PathTooDeep`].
    pub fn full_path(&self, item: ItemId) -> Result<String> {
        let depth = self.config.max_path_depth;
        let mut names = Vec::new();
        let mut visited = HashSet::new();
        let mut current = item;
        while let Some(parent) = self.item_parent(current)? {
            if !visited.insert(current) {
                return Err(XwfError::ParentCycle { item: item.get() });
            }
            if names.len() == depth {
                return Err(XwfError::PathTooDeep {
                    item: item.get(),
                    depth,
                });
            }
            names.push(self.item_name(current)?);
            current = parent;
        }
        let separator = self.config.path_separator;
        let path = names.iter().rev().fold(String::new(), |mut path, name| {
            path.push(separator);
            path.push_str(name);
            path
        });
        trace!(%item, %path, "reconstructed path");
        Ok(path)
    }

    /// Names of the report tables an item is associated with.
    ///
    /// Uses the growing-retry protocol. A count of zero or less yields an
    /// empty list.
    pub fn report_table_assocs(&self, item: ItemId) -> Result<Vec<String>> {
        let listed = self.buffers.grow_until_terminated(
            "XWF_GetReportTableAssocs",
            &self.config.growth,
            |buffer| {
                let out = buffer.as_mut_ptr();
                let units = buffer.len_i32();
                let count = self.invoke("XWF_GetReportTableAssocs", &(item, units), || unsafe {
                    (self.table.get_report_table_assocs)(item.get(), out, units)
                })?;
                Ok(i64::from(count))
            },
        )?;
        Ok(listed.as_deref().map(split_list).unwrap_or_default())
    }

    /// Associates an item with a report table, creating the table if needed.
    ///
    /// Convention: 0 is a sentinel failure, 1 a new and 2 an existing association.
    pub fn add_to_report_table(
        &self,
        item: ItemId,
        table: &str,
        flags: ReportTableFlags,
    ) -> Result<Association> {
        let wide = to_wide_name("report table name", table)?;
        let result = self.invoke("XWF_AddToReportTable", &(item, table, flags), || unsafe {
            (self.table.add_to_report_table)(item.get(), wide.as_ptr(), flags.bits())
        })?;
        match result {
            1 => Ok(Association::New),
            2 => Ok(Association::Existing),
            other => Err(XwfError::sentinel(
                "XWF_AddToReportTable",
                format!("returned {other} for table {table:?}"),
            )),
        }
    }

    /// Comment of an item.
    ///
    /// Convention: null means no comment and yields `None`.
    pub fn comment(&self, item: ItemId) -> Result<Option<String>> {
        let text = self.invoke("XWF_GetComment", &item, || unsafe {
            (self.table.get_comment)(item.get())
        })?;
        // SAFETY: the host returns null or a terminated string it keeps alive.
        Ok(unsafe { from_wide_ptr(text, self.config.max_string_units) })
    }

    /// Adds a comment to an item.
    ///
    /// Convention: the host's `BOOL` is returned as is.
    pub fn add_comment(&self, item: ItemId, text: &str, mode: CommentMode) -> Result<bool> {
        let wide = to_wide(text)?;
        let added = self.invoke("XWF_AddComment", &(item, mode), || unsafe {
            (self.table.add_comment)(item.get(), wide.as_ptr(), mode.raw())
        })?;
        Ok(truthy(added))
    }

    /// Metadata text extracted from an item.
    ///
    /// Convention: null means none and yields `None`.
    pub fn extracted_metadata(&self, item: ItemId) -> Result<Option<String>> {
        let text = self.invoke("XWF_GetExtractedMetadata", &item, || unsafe {
            (self.table.get_extracted_metadata)(item.get())
        })?;
        // SAFETY: the host returns null or a terminated string it keeps alive.
        Ok(unsafe { from_wide_ptr(text, self.config.max_string_units) })
    }

    /// Adds extracted metadata text to an item.
    ///
    /// Convention: the host's `BOOL` is returned as is.
    pub fn add_extracted_metadata(&self, item: ItemId, text: &str, mode: CommentMode) -> Result<bool> {
        let wide = to_wide(text)?;
        let added = self.invoke("XWF_AddExtractedMetadata", &(item, mode), || unsafe {
            (self.table.add_extracted_metadata)(item.get(), wide.as_ptr(), mode.raw())
        })?;
        Ok(truthy(added))
    }

    /// A hash of an item, if the snapshot has one computed.
    ///
    /// The digest length follows the snapshot's hash type for `slot`.
    ///
    /// Convention: `FALSE` means no hash value and yields `None`.
    pub fn hash_value(&self, item: ItemId, slot: HashSlot) -> Result<Option<HashValue>> {
        let code = self.invoke("XWF_GetVSProp", &slot.property(), || unsafe {
            (self.table.get_vs_prop)(slot.property().raw(), ptr::null_mut())
        })?;
        let Some(kind) = HashType::defined(code) else {
            debug!(%item, ?slot, "snapshot has no hash of this kind");
            return Ok(None);
        };
        let mut buffer = self.buffers.bytes(HASH_BUFFER_BYTES);
        buffer[..4].copy_from_slice(&slot.selector().to_le_bytes());
        let out = buffer.as_mut_ptr();
        let found = self.invoke("XWF_GetHashValue", &(item, slot), || unsafe {
            (self.table.get_hash_value)(item.get(), out)
        })?;
        if !truthy(found) {
            return Ok(None);
        }
        Ok(Some(HashValue {
            kind,
            digest: buffer[..kind.digest_len()].to_vec(),
        }))
    }

    /// Metadata of an item as prepared by the host.
    ///
    /// `handle` may be an open handle of the same item, which spares the host
    /// from opening it again. The host allocates the text and it is handed back
    /// through `XWF_ReleaseMem`.
    ///
    /// Convention: null means no metadata and yields `None`.
    pub fn metadata(&self, item: ItemId, handle: Option<Handle<Item>>) -> Result<Option<String>> {
        if let Some(handle) = handle {
            self.handles.ensure_open(handle)?;
        }
        let raw = Self::raw_or_null(handle);
        let text = self.invoke("XWF_GetMetadata", &(item, handle), || unsafe {
            (self.table.get_metadata)(item.get(), raw)
        })?;
        let Some(text) = self.buffers.adopt_foreign(text, self.table.release_mem) else {
            return Ok(None);
        };
        // SAFETY: the host returns a terminated UTF-16 string.
        Ok(Some(unsafe { text.wide_string(self.config.max_string_units) }))
    }

    /// Renders a picture item as a raster image.
    ///
    /// A zero `width` or `height` leaves that dimension to the host. The image
    /// is allocated by the host and handed back through `XWF_ReleaseMem`.
    ///
    /// Convention: null means the item cannot be rendered and yields `None`.
    pub fn raster_image(
        &self,
        item: ItemId,
        handle: Handle<Item>,
        flags: RasterFlags,
        width: u32,
        height: u32,
    ) -> Result<Option<RasterImage>> {
        self.handles.ensure_open(handle)?;
        let mut info = RasterImageInformation {
            size: struct_size::<RasterImageInformation>() as u32,
            item_id: item.get(),
            item: handle.as_ptr(),
            flags: flags.bits(),
            width,
            height,
            result_size: 0,
        };
        let info_ptr = ptr::addr_of_mut!(info);
        let image = self.invoke("XWF_GetRasterImage", &(item, flags), || unsafe {
            (self.table.get_raster_image)(info_ptr)
        })?;
        let Some(image) = self.buffers.adopt_foreign(image, self.table.release_mem) else {
            return Ok(None);
        };
        let (width, height, result_size) = (info.width, info.height, info.result_size);
        // SAFETY: the host reports the size of the buffer it returned.
        let data = unsafe { image.to_vec(result_size as usize) };
        Ok(Some(RasterImage {
            width,
            height,
            data,
        }))
    }
}
