//! Typed views of the host's selectors, flag words and values.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Result, XwfError};

/// Declares an enum whose variants map one-to-one onto host integer codes.
macro_rules! host_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $repr:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )*
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            /// Returns the host code.
            pub const fn raw(self) -> $repr {
                match self {
                    $( $name::$variant => $value, )*
                }
            }

            /// Looks up a host code.
            pub fn from_raw(raw: $repr) -> Option<Self> {
                match raw {
                    $( v if v == $value => Some($name::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

/// Declares a flag word newtype with named bits.
macro_rules! host_flags {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $repr:ty {
            $( $(#[$fmeta:meta])* const $flag:ident = $value:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        $vis struct $name($repr);

        impl $name {
            $( $(#[$fmeta])* pub const $flag: Self = Self($value); )*

            /// No bits set.
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Wraps a raw flag word, keeping unknown bits.
            pub const fn from_bits(bits: $repr) -> Self {
                Self(bits)
            }

            /// Returns the raw flag word.
            pub const fn bits(self) -> $repr {
                self.0
            }

            /// Returns true if every bit of `other` is set.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Returns a copy with the bits of `other` cleared.
            #[must_use]
            pub const fn without(self, other: Self) -> Self {
                Self(self.0 & !other.0)
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

host_enum! {
    /// Which size `XWF_GetSize` reports.
    #[derive(Default)]
    pub enum SizeKind: usize {
        /// Physical size.
        #[default]
        Physical = 0,
        /// Logical size.
        Logical = 1,
        /// Valid data length.
        ValidDataLength = 2,
    }
}

host_enum! {
    /// Format of the name returned by `XWF_GetVolumeName`.
    pub enum VolumeNameKind: u32 {
        /// Host naming style 1.
        Standard = 1,
        /// Host naming style 2.
        Detailed = 2,
        /// Host naming style 3.
        Short = 3,
    }
}

host_enum! {
    /// File system of a volume.
    pub enum FileSystem: i32 {
        /// Not recognised.
        Unknown = 0,
        /// FAT12.
        Fat12 = 1,
        /// FAT16.
        Fat16 = 2,
        /// FAT32.
        Fat32 = 3,
        /// exFAT.
        ExFat = 4,
        /// UDF.
        Udf = 5,
        /// X-Ways file system.
        Xwfs = 6,
        /// Accessed through the operating system.
        ViaOs = 7,
        /// CDFS.
        Cdfs = 8,
        /// Main memory.
        MainMemory = 9,
        /// NTFS.
        Ntfs = -1,
        /// HPFS.
        Hpfs = -2,
        /// Ext2.
        Ext2 = -3,
        /// Ext3.
        Ext3 = -4,
        /// ReiserFS.
        ReiserFs = -5,
        /// Reiser4.
        Reiser4 = -6,
        /// Ext4.
        Ext4 = -7,
        /// JFS.
        Jfs = -9,
        /// XFS.
        Xfs = -10,
        /// UFS.
        Ufs = -11,
        /// HFS.
        Hfs = -12,
        /// HFS+.
        HfsPlus = -13,
        /// NTFS behind BitLocker.
        NtfsBitlocker = -15,
        /// Physical disk with partitions.
        PartitionedDisk = -16,
    }
}

host_enum! {
    /// Hash algorithms known to the host. Code 0 means "undefined" and has no variant.
    pub enum HashType: i32 {
        /// 8-bit checksum.
        Cs8 = 1,
        /// 16-bit checksum.
        Cs16 = 2,
        /// 32-bit checksum.
        Cs32 = 3,
        /// 64-bit checksum.
        Cs64 = 4,
        /// CRC16.
        Crc16 = 5,
        /// CRC32.
        Crc32 = 6,
        /// MD5.
        Md5 = 7,
        /// SHA-1.
        Sha1 = 8,
        /// SHA-256.
        Sha256 = 9,
        /// RIPEMD-128.
        Ripemd128 = 11,
        /// RIPEMD-160.
        Ripemd160 = 12,
        /// MD4.
        Md4 = 13,
        /// eDonkey.
        Ed2k = 14,
        /// Adler-32.
        Adler32 = 15,
        /// Tiger tree hash.
        TigerTree = 16,
        /// Tiger/128.
        Tiger128 = 17,
        /// Tiger/160.
        Tiger160 = 18,
        /// Tiger/192.
        Tiger192 = 19,
    }
}

impl HashType {
    /// Digest length in bytes.
    pub const fn digest_len(self) -> usize {
        match self {
            HashType::Cs8 => 1,
            HashType::Cs16 | HashType::Crc16 => 2,
            HashType::Cs32 | HashType::Crc32 | HashType::Adler32 => 4,
            HashType::Cs64 => 8,
            HashType::Md5
            | HashType::Md4
            | HashType::Ed2k
            | HashType::Ripemd128
            | HashType::Tiger128 => 16,
            HashType::Sha1 | HashType::Ripemd160 | HashType::Tiger160 => 20,
            HashType::TigerTree | HashType::Tiger192 => 24,
            HashType::Sha256 => 32,
        }
    }

    /// Maps a host code, treating "undefined" and unknown codes as absent.
    pub fn defined(raw: i64) -> Option<Self> {
        i32::try_from(raw).ok().and_then(Self::from_raw)
    }
}

host_enum! {
    /// How confident the host is about an item's type.
    pub enum TypeCategory: i32 {
        /// Type detection failed.
        Error = -1,
        /// Not verified.
        NotVerified = 0,
        /// Too small to verify.
        TooSmall = 1,
        /// Totally unknown.
        TotallyUnknown = 2,
        /// Confirmed.
        Confirmed = 3,
        /// Not confirmed.
        NotConfirmed = 4,
        /// Newly identified.
        NewlyIdentified = 5,
    }
}

host_enum! {
    /// Case-level string properties.
    pub enum CaseProperty: i32 {
        /// Case title.
        Title = 1,
        /// Examiner name.
        Examiner = 3,
        /// Path of the case file.
        FilePath = 5,
        /// Case directory.
        Directory = 6,
    }
}

host_enum! {
    /// Properties of an evidence object.
    pub enum EvidenceProperty: u32 {
        /// Evidence object number.
        ObjectNumber = 0,
        /// Evidence object id.
        ObjectId = 1,
        /// Id of the parent evidence object.
        ParentObjectId = 2,
        /// Title (host-owned string).
        Title = 6,
        /// Extended title (buffer).
        ExtendedTitle = 7,
        /// Abbreviated title (buffer).
        AbbreviatedTitle = 8,
        /// Internal name (host-owned string).
        InternalName = 9,
        /// Description (host-owned string).
        Description = 10,
        /// Examiner comments (host-owned string).
        ExaminerComments = 11,
        /// Internally used directory (buffer).
        InternallyUsedDirectory = 12,
        /// Output directory (buffer).
        OutputDirectory = 13,
        /// Size in bytes.
        SizeInBytes = 16,
        /// Number of items in the volume snapshot.
        VolumeSnapshotFileCount = 17,
        /// Evidence flags.
        Flags = 18,
        /// File system code.
        FileSystem = 19,
        /// Primary hash type.
        HashType = 20,
        /// Primary hash value (buffer).
        HashValue = 21,
        /// Creation time (FILETIME).
        CreationTime = 32,
        /// Modification time (FILETIME).
        ModificationTime = 33,
        /// Secondary hash type.
        HashType2 = 40,
        /// Secondary hash value (buffer).
        HashValue2 = 41,
    }
}

host_enum! {
    /// Numeric item properties read with `XWF_GetItemInformation`.
    pub enum ItemInfo: i32 {
        /// Id in the original file system.
        OriginalId = 1,
        /// Attributes.
        Attributes = 2,
        /// Item flags.
        Flags = 3,
        /// Deletion status.
        Deletion = 4,
        /// Classification.
        Classification = 5,
        /// Hard link count.
        LinkCount = 6,
        /// Skin colour percentage.
        ColorAnalysis = 7,
        /// Number of contained files.
        FileCount = 11,
        /// Offset of an embedded item in its parent.
        EmbeddedOffset = 16,
        /// Creation time.
        CreationTime = 32,
        /// Modification time.
        ModificationTime = 33,
        /// Last access time.
        LastAccessTime = 34,
        /// Entry modification time.
        EntryModificationTime = 35,
        /// Deletion time.
        DeletionTime = 36,
        /// Internal creation time.
        InternalCreationTime = 37,
        /// Set flag bits (write only).
        SetFlags = 64,
        /// Remove flag bits (write only).
        RemoveFlags = 65,
    }
}

impl ItemInfo {
    /// Returns true for the FILETIME-valued properties.
    pub const fn is_timestamp(self) -> bool {
        matches!(
            self,
            ItemInfo::CreationTime
                | ItemInfo::ModificationTime
                | ItemInfo::LastAccessTime
                | ItemInfo::EntryModificationTime
                | ItemInfo::DeletionTime
                | ItemInfo::InternalCreationTime
        )
    }
}

host_enum! {
    /// Volume snapshot properties read with `XWF_GetVSProp`.
    pub enum VsProperty: i32 {
        /// Id of a special item, selected by [`SpecialItem`].
        SpecialItemId = 10,
        /// Primary hash type of the snapshot.
        HashType1 = 20,
        /// Secondary hash type of the snapshot.
        HashType2 = 21,
    }
}

host_enum! {
    /// Special items of a volume snapshot.
    pub enum SpecialItem: i32 {
        /// Root directory.
        RootDirectory = 1,
        /// "Path unknown" directory.
        PathUnknown = 2,
        /// Carved files directory.
        CarvedFiles = 4,
        /// Free space file.
        FreeSpace = 5,
        /// System Volume Information directory.
        SystemVolumeInformation = 11,
        /// Windows search index database.
        WindowsEdb = 12,
    }
}

host_enum! {
    /// Operation that triggered the extension.
    pub enum ActionSource: i32 {
        /// Tools menu.
        MainMenu = 0,
        /// Volume snapshot refinement.
        VolumeSnapshotRefinement = 1,
        /// Logical simultaneous search.
        LogicalSearch = 2,
        /// Physical simultaneous search.
        PhysicalSearch = 3,
        /// Directory browser context menu.
        DirectoryBrowserMenu = 4,
        /// Search hit list context menu.
        SearchHitMenu = 5,
    }
}

host_enum! {
    /// How new comment or metadata text combines with existing text.
    pub enum CommentMode: u32 {
        /// Replace existing text.
        Replace = 0,
        /// Append to existing text.
        Append = 1,
        /// Append on a new line.
        AppendLine = 2,
    }
}

host_enum! {
    /// What `XWF_CopyToContainer` copies.
    pub enum CopyMode: u32 {
        /// Logical contents.
        Logical = 0,
        /// Physical contents.
        Physical = 1,
        /// Logical contents and slack separately.
        LogicalAndSlack = 2,
        /// Slack only.
        Slack = 3,
        /// A byte range only.
        Range = 4,
        /// Metadata only.
        Metadata = 5,
    }
}

/// Kind of evidence object to add to the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    /// Disk image file.
    DiskImage,
    /// Memory dump file.
    MemoryDump,
    /// Directory.
    Directory,
    /// Single file.
    File,
    /// Partition by drive letter.
    DriveLetter(char),
    /// Physical disk, numbered from 1.
    PhysicalDisk(u8),
}

impl EvidenceKind {
    /// Returns true if the kind is backed by a path that must be supplied.
    pub const fn needs_path(self) -> bool {
        matches!(
            self,
            EvidenceKind::DiskImage
                | EvidenceKind::MemoryDump
                | EvidenceKind::Directory
                | EvidenceKind::File
        )
    }

    /// Host category code and disk id for `XWF_CreateEvObj`.
    pub fn category_and_disk(self) -> Result<(u32, i32)> {
        Ok(match self {
            EvidenceKind::File => (0, 0),
            EvidenceKind::DiskImage => (1, 0),
            EvidenceKind::MemoryDump => (2, 0),
            EvidenceKind::Directory => (3, 0),
            EvidenceKind::DriveLetter(letter) => {
                let letter = letter.to_ascii_uppercase();
                if !letter.is_ascii_uppercase() {
                    return Err(XwfError::invalid(format!("{letter:?} is not a drive letter")));
                }
                (4, i32::from(letter as u8 - b'A') + 1)
            }
            EvidenceKind::PhysicalDisk(number) => {
                if number == 0 {
                    return Err(XwfError::invalid("physical disks are numbered from 1"));
                }
                (4, -2 - i32::from(number))
            }
        })
    }
}

host_flags! {
    /// Options of `XWF_OutputMessage`.
    pub struct OutputFlags: u32 {
        /// Do not end the line.
        const NO_LINE_BREAK = 0x01;
        /// Do not record the message in the error log.
        const DO_NOT_LOG_ERROR = 0x02;
        /// The text is 8-bit rather than UTF-16.
        const ANSI = 0x04;
    }
}

host_flags! {
    /// Options of `XWF_OpenItem`.
    pub struct OpenFlags: u32 {
        /// Include file slack.
        const WITH_SLACK = 0x01;
        /// Do not report read errors.
        const SUPPRESS_ERRORS = 0x02;
        /// Prefer alternative data if present.
        const PREFER_ALTERNATIVE = 0x08;
        /// Open alternative data only.
        const OPEN_ALTERNATIVE = 0x10;
    }
}

host_flags! {
    /// Options of `XWF_CreateItem`.
    pub struct CreateItemFlags: u32 {
        /// More items follow shortly.
        const MORE_ITEMS_EXPECTED = 0x01;
    }
}

host_flags! {
    /// Options of `XWF_CreateFile`.
    pub struct CreateFileFlags: u32 {
        /// More items follow shortly.
        const MORE_ITEMS_EXPECTED = 0x01;
        /// Contents are an excerpt of the parent.
        const EXCERPT_FROM_PARENT = 0x02;
        /// Contents come from an external file.
        const ATTACH_EXTERNAL_FILE = 0x04;
        /// Keep the external file after attaching it.
        const KEEP_EXTERNAL_FILE = 0x08;
    }
}

host_flags! {
    /// Options of `XWF_AddToReportTable`.
    pub struct ReportTableFlags: u32 {
        /// Table is owned by the application.
        const CREATED_BY_APPLICATION = 0x01;
        /// Include the table in reports.
        const INCLUDE_IN_REPORT = 0x02;
        /// Offer the table for filtering.
        const FILTERING = 0x04;
        /// Allow later manual associations.
        const MANUAL_ASSOCIATIONS = 0x08;
    }
}

host_flags! {
    /// Options of `XWF_ShowProgress`.
    pub struct ProgressFlags: u32 {
        /// Show in the window only.
        const WINDOW_ONLY = 0x01;
        /// The user cannot interrupt.
        const DISALLOW_INTERRUPT = 0x02;
        /// Show without delay.
        const SHOW_IMMEDIATELY = 0x04;
        /// Ask twice before aborting.
        const DOUBLE_CONFIRM_ABORT = 0x08;
        /// Do not log the operation.
        const PREVENT_LOGGING = 0x10;
    }
}

host_flags! {
    /// Options of `XWF_Search`.
    pub struct SearchFlags: u32 {
        /// Logical instead of physical search.
        const LOGICAL = 0x0000_0001;
        /// Tagged objects only.
        const TAGGED_ONLY = 0x0000_0004;
        /// Case sensitive.
        const CASE_SENSITIVE = 0x0000_0010;
        /// Whole words only.
        const WHOLE_WORDS = 0x0000_0020;
        /// GREP syntax.
        const GREP = 0x0000_0040;
        /// Allow overlapping hits.
        const OVERLAPPING = 0x0000_0080;
        /// Cover slack space.
        const SLACK = 0x0000_0100;
        /// One hit per file.
        const ONE_HIT_PER_FILE = 0x0000_1000;
        /// Omit directories.
        const OMIT_DIRECTORIES = 0x0010_0000;
        /// Call back for every hit.
        const CALLBACK_PER_HIT = 0x0100_0000;
        /// Show the hit list when done.
        const DISPLAY_HITS = 0x0400_0000;
    }
}

host_flags! {
    /// Options of `XWF_AddSearchTerm`.
    pub struct SearchTermFlags: u32 {
        /// Reuse an identical existing term.
        const REUSE_EXISTING = 0x01;
        /// Mark the term as user-created.
        const USER_TERM = 0x02;
    }
}

host_flags! {
    /// Options of `XWF_CreateContainer`.
    pub struct ContainerFlags: u32 {
        /// Open an existing container.
        const OPEN = 0x0000_0001;
        /// Container format 2.
        const XWFS2 = 0x0000_0002;
        /// Evidence object names become the top directory level.
        const TOP_LEVEL = 0x0000_0008;
        /// Include directory data.
        const DIRECTORY_DATA = 0x0000_0010;
        /// Pass on comments.
        const ALL_COMMENTS = 0x0000_0800;
    }
}

host_flags! {
    /// Options of `XWF_CopyToContainer`.
    pub struct CopyFlags: u32 {
        /// Recreate the original path.
        const RECREATE_PATH = 0x01;
        /// Include parent item data.
        const PARENT_DATA = 0x02;
        /// Store the hash value.
        const STORE_HASH = 0x04;
    }
}

host_flags! {
    /// Options of `XWF_GetRasterImage`.
    pub struct RasterFlags: u32 {
        /// Buffer starts with a bitmap header.
        const BITMAP_HEADER = 0x01;
        /// Align lines on 4-byte boundaries.
        const ALIGN_LINES = 0x02;
        /// Flip vertically in memory.
        const FLIP_VERTICAL = 0x04;
        /// Standard BMP layout.
        const STANDARD_BMP = 0x07;
    }
}

host_flags! {
    /// Options of `XWF_GetUserInput`.
    pub struct UserInputFlags: u32 {
        /// Expect a positive integer.
        const POSITIVE_NUMBER = 0x01;
        /// Accept empty input.
        const EMPTY_ALLOWED = 0x02;
        /// Mask the input.
        const PASSWORD = 0x10;
    }
}

host_flags! {
    /// Options of `XWF_GetEvObjReportTableAssocs`.
    pub struct AssocFlags: u32 {
        /// Sort the list by item id.
        const SORTED_BY_ITEM = 0x01;
    }
}

host_flags! {
    /// Return value of `XT_Prepare` asking for further callbacks.
    pub struct PrepareFlags: u32 {
        /// Call `XT_ProcessItem` for every item.
        const PROCESS_ITEMS = 0x01;
        /// Run after the host's own refinement steps.
        const AFTER_REFINEMENTS = 0x02;
        /// The extension may create new items.
        const MAY_CREATE_ITEMS = 0x04;
    }
}

host_flags! {
    /// Capabilities announced in `XT_Init`.
    pub struct CallerFlags: u32 {
        /// X-Ways Forensics.
        const FORENSICS = 0x01;
        /// WinHex.
        const WINHEX = 0x02;
        /// X-Ways Investigator.
        const INVESTIGATOR = 0x04;
        /// Beta version.
        const BETA = 0x08;
        /// Quick API compatibility check only.
        const QUICK_CHECK = 0x20;
        /// Only `XT_About` will be called.
        const ABOUT_ONLY = 0x40;
    }
}

/// Windows FILETIME: 100-nanosecond ticks since 1601-01-01 UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileTime(pub i64);

impl FileTime {
    const TICKS_PER_SECOND: i64 = 10_000_000;
    const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

    /// Returns `None` for zero, which the host uses for "not set".
    pub const fn non_zero(ticks: i64) -> Option<Self> {
        if ticks == 0 {
            None
        } else {
            Some(Self(ticks))
        }
    }

    /// Converts to `SystemTime`.
    pub fn to_system_time(self) -> Option<SystemTime> {
        let since_unix = self.0.checked_sub(Self::UNIX_EPOCH_TICKS)?;
        let secs = since_unix.div_euclid(Self::TICKS_PER_SECOND);
        let nanos = (since_unix.rem_euclid(Self::TICKS_PER_SECOND) * 100) as u32;
        if secs >= 0 {
            UNIX_EPOCH.checked_add(Duration::new(secs as u64, nanos))
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(secs.unsigned_abs()))?
                .checked_add(Duration::from_nanos(u64::from(nanos)))
        }
    }

    /// Converts from `SystemTime`.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        let ticks = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_nanos() / 100).ok()?,
            Err(before) => -i64::try_from(before.duration().as_nanos() / 100).ok()?,
        };
        ticks.checked_add(Self::UNIX_EPOCH_TICKS).map(Self)
    }

    /// Seconds since the Unix epoch.
    pub fn unix_seconds(self) -> i64 {
        (self.0 - Self::UNIX_EPOCH_TICKS).div_euclid(Self::TICKS_PER_SECOND)
    }
}

/// Id of an item in the active volume snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ItemId(i32);

impl ItemId {
    /// Creates an item id, rejecting negative values.
    pub fn new(id: i32) -> Result<Self> {
        if id < 0 {
            return Err(XwfError::invalid(format!("malformed item id {id}")));
        }
        Ok(Self(id))
    }

    /// Maps a host return value, treating negative values as "none".
    pub fn from_host(id: i64) -> Option<Self> {
        i32::try_from(id).ok().filter(|id| *id >= 0).map(Self)
    }

    /// Returns the raw id.
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i32> for ItemId {
    type Error = XwfError;

    fn try_from(id: i32) -> Result<Self> {
        Self::new(id)
    }
}
