//! Volumes, item handles and the volume snapshot.

use std::ffi::c_void;
use std::ptr;

use tracing::debug;

use crate::adapters::truthy;
use crate::error::{Result, XwfError};
use crate::handle::{CloseAction, Handle, Item, Readable, Volume};
use crate::host::Host;
use crate::types::{FileSystem, HashType, ItemId, OpenFlags, SizeKind, SpecialItem, VolumeNameKind, VsProperty};

/// Capacity of the volume name buffer, in characters.
const VOLUME_NAME_UNITS: usize = 256;

/// Capacity of the sector description buffer, in characters.
const SECTOR_DESCRIPTION_UNITS: usize = 512;

/// Geometry of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VolumeInformation {
    /// File system, `Unknown` for codes this crate does not know.
    pub file_system: FileSystem,
    /// Bytes per sector.
    pub bytes_per_sector: u32,
    /// Sectors per cluster.
    pub sectors_per_cluster: u32,
    /// Number of clusters.
    pub cluster_count: i64,
    /// Sector number of the first cluster.
    pub first_cluster_sector: i64,
}

/// A selected block in a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Block {
    /// First byte.
    pub start: i64,
    /// End offset.
    pub end: i64,
}

/// What occupies a sector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SectorContents {
    /// Host description of the sector.
    pub description: String,
    /// Item the sector is allocated to.
    pub item: Option<ItemId>,
    /// Whether the host reported the sector as allocated.
    pub allocated: bool,
}

impl Host {
    /// Size of a volume or item.
    ///
    /// Convention: a negative return is a sentinel failure.
    pub fn size<K: Readable>(&self, handle: Handle<K>, kind: SizeKind) -> Result<i64> {
        self.handles.ensure_open(handle)?;
        // The selector travels in the pointer-sized optional argument.
        let selector = kind.raw() as *mut c_void;
        let size = self.invoke("XWF_GetSize", &(handle, kind), || unsafe {
            (self.table.get_size)(handle.as_ptr(), selector)
        })?;
        if size < 0 {
            return Err(XwfError::sentinel("XWF_GetSize", format!("returned {size}")));
        }
        Ok(size)
    }

    /// Physical size of a volume or item.
    pub fn physical_size<K: Readable>(&self, handle: Handle<K>) -> Result<i64> {
        self.size(handle, SizeKind::default())
    }

    /// Name of a volume.
    ///
    /// Convention: none; the host always fills the fixed buffer.
    pub fn volume_name(&self, volume: Handle<Volume>, kind: VolumeNameKind) -> Result<String> {
        self.handles.ensure_open(volume)?;
        let mut buffer = self.buffers.wide(VOLUME_NAME_UNITS);
        let out = buffer.as_mut_ptr();
        self.invoke("XWF_GetVolumeName", &(volume, kind), || unsafe {
            (self.table.get_volume_name)(volume.as_ptr(), out, kind.raw());
        })?;
        Ok(buffer.to_string_lossy())
    }

    /// Geometry and file system of a volume.
    ///
    /// Convention: none; out parameters are always written.
    pub fn volume_information(&self, volume: Handle<Volume>) -> Result<VolumeInformation> {
        self.handles.ensure_open(volume)?;
        let mut file_system = 0i32;
        let mut bytes_per_sector = 0u32;
        let mut sectors_per_cluster = 0u32;
        let mut cluster_count = 0i64;
        let mut first_cluster_sector = 0i64;
        self.invoke("XWF_GetVolumeInformation", &volume, || unsafe {
            (self.table.get_volume_information)(
                volume.as_ptr(),
                &mut file_system,
                &mut bytes_per_sector,
                &mut sectors_per_cluster,
                &mut cluster_count,
                &mut first_cluster_sector,
            );
        })?;
        let known = FileSystem::from_raw(file_system);
        if known.is_none() {
            debug!(code = file_system, "unrecognised file system code");
        }
        Ok(VolumeInformation {
            file_system: known.unwrap_or(FileSystem::Unknown),
            bytes_per_sector,
            sectors_per_cluster,
            cluster_count,
            first_cluster_sector,
        })
    }

    /// The block currently selected in a volume.
    ///
    /// Convention: `FALSE` means no block is defined and yields `None`.
    pub fn block(&self, volume: Handle<Volume>) -> Result<Option<Block>> {
        self.handles.ensure_open(volume)?;
        let mut start = 0i64;
        let mut end = 0i64;
        let defined = self.invoke("XWF_GetBlock", &volume, || unsafe {
            (self.table.get_block)(volume.as_ptr(), &mut start, &mut end)
        })?;
        Ok(truthy(defined).then_some(Block { start, end }))
    }

    /// Selects a block in a volume.
    ///
    /// Convention: the host's `BOOL` is returned as is.
    pub fn set_block(&self, volume: Handle<Volume>, block: Block) -> Result<bool> {
        self.handles.ensure_open(volume)?;
        if block.start < 0 || block.end < block.start {
            return Err(XwfError::invalid(format!(
                "block {}..{} is not a valid range",
                block.start, block.end
            )));
        }
        let set = self.invoke("XWF_SetBlock", &(volume, block), || unsafe {
            (self.table.set_block)(volume.as_ptr(), block.start, block.end)
        })?;
        Ok(truthy(set))
    }

    /// Describes what occupies a sector.
    ///
    /// Convention: the host's `BOOL` is reported as [`SectorContents::allocated`];
    /// a negative item id means no item.
    pub fn sector_contents(&self, volume: Handle<Volume>, sector: i64) -> Result<SectorContents> {
        self.handles.ensure_open(volume)?;
        if sector < 0 {
            return Err(XwfError::invalid(format!("negative sector number {sector}")));
        }
        let mut buffer = self.buffers.wide(SECTOR_DESCRIPTION_UNITS);
        let out = buffer.as_mut_ptr();
        let mut item = -1i32;
        let allocated = self.invoke("XWF_GetSectorContents", &(volume, sector), || unsafe {
            (self.table.get_sector_contents)(volume.as_ptr(), sector, out, &mut item)
        })?;
        Ok(SectorContents {
            description: buffer.to_string_lossy(),
            item: ItemId::from_host(i64::from(item)),
            allocated: truthy(allocated),
        })
    }

    /// Opens an item of a volume.
    ///
    /// Convention: a null handle is a sentinel failure.
    pub fn open_item(
        &mut self,
        volume: Handle<Volume>,
        item: ItemId,
        flags: OpenFlags,
    ) -> Result<Handle<Item>> {
        self.handles.ensure_open(volume)?;
        let raw = self.invoke("XWF_OpenItem", &(volume, item, flags), || unsafe {
            (self.table.open_item)(volume.as_ptr(), item.get(), flags.bits())
        })?;
        if raw.is_null() {
            return Err(XwfError::sentinel(
                "XWF_OpenItem",
                format!("no handle for item {item}"),
            ));
        }
        self.handles.register_open(raw as usize)
    }

    /// Closes an item handle.
    ///
    /// Closing an Unopened or already Closed handle succeeds without calling the host.
    pub fn close_item(&mut self, item: Handle<Item>) -> Result<()> {
        match self.handles.close_action(item)? {
            CloseAction::NoOp => {
                debug!(?item, "close of a handle that is not open");
                Ok(())
            }
            CloseAction::Forward => {
                let closed = self.invoke("XWF_Close", &item, || unsafe {
                    (self.table.close)(item.as_ptr());
                });
                self.handles.mark_closed(item);
                closed
            }
        }
    }

    /// Reads up to `len` bytes at `offset`.
    ///
    /// Requests larger than the configured chunk are split. The result is
    /// shorter than `len` when the host returns fewer bytes than requested.
    ///
    /// Convention: the host returns the number of bytes read; zero ends the read.
    pub fn read<K: Readable>(&self, handle: Handle<K>, offset: i64, len: usize) -> Result<Vec<u8>> {
        self.handles.ensure_open(handle)?;
        if offset < 0 {
            return Err(XwfError::invalid(format!("negative read offset {offset}")));
        }
        let chunk = self.config.read_chunk as usize;
        let mut data = Vec::with_capacity(len.min(chunk));
        let mut position = offset;
        while data.len() < len {
            let want = (len - data.len()).min(chunk);
            let mut buffer = self.buffers.bytes(want);
            let out = buffer.as_mut_ptr();
            let request = buffer.len_u32();
            let got = self.invoke("XWF_Read", &(handle, position, request), || unsafe {
                (self.table.read)(handle.as_ptr(), position, out, request)
            })?;
            let got = (got as usize).min(want);
            data.extend_from_slice(&buffer[..got]);
            if got < want {
                break;
            }
            position += got as i64;
        }
        Ok(data)
    }

    /// Reads the logical contents of an item, at most `limit` bytes.
    pub fn read_contents(&self, item: Handle<Item>, limit: usize) -> Result<Vec<u8>> {
        let size = self.size(item, SizeKind::Logical)?;
        let len = usize::try_from(size).unwrap_or(usize::MAX).min(limit);
        self.read(item, 0, len)
    }

    /// Makes the snapshot of `volume` the one item adapters refer to.
    pub fn select_volume_snapshot(&self, volume: Handle<Volume>) -> Result<()> {
        self.handles.ensure_open(volume)?;
        self.invoke("XWF_SelectVolumeSnapshot", &volume, || unsafe {
            (self.table.select_volume_snapshot)(volume.as_ptr());
        })
    }

    fn vs_prop(&self, property: VsProperty, buffer: *mut c_void) -> Result<i64> {
        self.invoke("XWF_GetVSProp", &property, || unsafe {
            (self.table.get_vs_prop)(property.raw(), buffer)
        })
    }

    /// Id of a special item of the selected snapshot.
    ///
    /// Convention: a negative id means the item does not exist.
    pub fn special_item(&self, which: SpecialItem) -> Result<Option<ItemId>> {
        let mut selector = which.raw() as u8;
        let id = self.vs_prop(VsProperty::SpecialItemId, ptr::addr_of_mut!(selector).cast())?;
        Ok(ItemId::from_host(id))
    }

    /// Primary and secondary hash types of the selected snapshot.
    ///
    /// Convention: code 0 means no hash was computed and yields `None`.
    pub fn snapshot_hash_types(&self) -> Result<(Option<HashType>, Option<HashType>)> {
        let primary = self.vs_prop(VsProperty::HashType1, ptr::null_mut())?;
        let secondary = self.vs_prop(VsProperty::HashType2, ptr::null_mut())?;
        Ok((HashType::defined(primary), HashType::defined(secondary)))
    }

    /// Number of items in the selected snapshot.
    pub fn item_count(&self) -> Result<u32> {
        self.invoke("XWF_GetItemCount", &(), || unsafe {
            (self.table.get_item_count)(ptr::null_mut())
        })
    }

    /// Number of items below a directory.
    pub fn file_count(&self, directory: ItemId) -> Result<u32> {
        self.invoke("XWF_GetFileCount", &directory, || unsafe {
            (self.table.get_file_count)(directory.get())
        })
    }
}
