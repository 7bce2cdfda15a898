//! Typed adapters against the mock host.

use xtension_core::types::{
    CaseProperty, CommentMode, ContainerFlags, CopyFlags, CopyMode, CreateFileFlags,
    CreateItemFlags, EvidenceKind, EvidenceProperty, HashType, ItemInfo, OpenFlags, OutputFlags,
    ProgressFlags, ReportTableFlags, SearchTermFlags, SizeKind, SpecialItem, TypeCategory,
    UserInputFlags, VolumeNameKind,
};
use xtension_core::{
    Association, Block, CopyRange, Event, FileTime, HashSlot, Host, ItemId, SearchRequest, XwfError,
};
use xtension_testkit::prelude::*;

fn id(raw: i32) -> ItemId {
    ItemId::new(raw).unwrap()
}

fn sample_host() -> Host {
    MockHost::new().tree(&ItemTree::sample()).bind().unwrap()
}

#[test]
fn case_properties_round_trip() {
    let host = MockHost::new()
        .case_property(CaseProperty::Title, "Case A")
        .case_property(CaseProperty::Examiner, "J. Doe")
        .case_property(CaseProperty::FilePath, "C:\\cases\\a.xfc")
        .case_property(CaseProperty::Directory, "C:\\cases\\a")
        .bind()
        .unwrap();

    let props = host.case_properties().unwrap();
    assert_eq!(props.title.as_deref(), Some("Case A"));
    assert_eq!(props.examiner.as_deref(), Some("J. Doe"));
    assert_eq!(props.file_path.as_deref(), Some("C:\\cases\\a.xfc"));
    assert_eq!(props.directory.as_deref(), Some("C:\\cases\\a"));
    assert_eq!(calls("XWF_GetCaseProp"), 4);

    let stats = host.buffer_stats();
    assert_eq!(stats.acquired, 4);
    assert!(stats.is_balanced());
    assert_eq!(stats.bytes_in_use, 0);
}

#[test]
fn missing_case_property_is_none() {
    let host = MockHost::new()
        .case_property(CaseProperty::Title, "Case A")
        .bind()
        .unwrap();
    assert_eq!(host.case_property(CaseProperty::Examiner).unwrap(), None);
    assert!(host.buffer_stats().is_balanced());
}

#[test]
fn volume_queries() {
    let mut host = MockHost::new().bind().unwrap();
    let volume = host.adopt_volume(VOLUME).unwrap();

    assert_eq!(
        host.volume_name(volume, VolumeNameKind::Standard).unwrap(),
        "C: (Partition 1)"
    );
    let info = host.volume_information(volume).unwrap();
    assert_eq!(info.bytes_per_sector, 512);
    assert_eq!(info.sectors_per_cluster, 8);
    assert_eq!(info.cluster_count, 512 * 1024 * 1024 / 4096);
    assert_eq!(host.size(volume, SizeKind::Physical).unwrap(), 512 * 1024 * 1024);

    assert_eq!(host.block(volume).unwrap(), None);
    let block = Block { start: 4096, end: 8192 };
    assert!(host.set_block(volume, block).unwrap());
    assert_eq!(host.block(volume).unwrap(), Some(block));
    assert!(matches!(
        host.set_block(volume, Block { start: 10, end: 5 }),
        Err(XwfError::InvalidArgument(_))
    ));
    assert_eq!(calls("XWF_SetBlock"), 1);
}

#[test]
fn sector_contents_report_owner() {
    let mut host = MockHost::new()
        .tree(&ItemTree::sample())
        .sector_owner(2048, 4)
        .bind()
        .unwrap();
    let volume = host.adopt_volume(VOLUME).unwrap();

    let owned = host.sector_contents(volume, 2048).unwrap();
    assert!(owned.allocated);
    assert_eq!(owned.item, Some(id(4)));
    assert_eq!(owned.description, "report.docx");

    let free = host.sector_contents(volume, 7).unwrap();
    assert!(!free.allocated);
    assert_eq!(free.item, None);

    assert!(host.sector_contents(volume, -1).is_err());
}

#[test]
fn item_contents_are_read_in_chunks() {
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let tree = ItemTree::sample().add_file(7, ROOT, "big.bin", &payload);
    let mut host = MockHost::new()
        .tree(&tree)
        .bind_with(xtension_core::BindingConfig::new().read_chunk(4096))
        .unwrap();
    let volume = host.adopt_volume(VOLUME).unwrap();

    let item = host.open_item(volume, id(7), OpenFlags::empty()).unwrap();
    assert_eq!(host.size(item, SizeKind::Logical).unwrap(), 10_000);
    assert_eq!(host.read_contents(item, usize::MAX).unwrap(), payload);
    assert_eq!(calls("XWF_Read"), 3);

    assert_eq!(host.read(item, 9_990, 100).unwrap(), payload[9_990..].to_vec());
    assert_eq!(host.read_contents(item, 16).unwrap(), payload[..16].to_vec());
    assert!(host.read(item, -1, 1).is_err());

    host.close_item(item).unwrap();
    assert_eq!(open_item_handles(), 0);
    assert!(host.buffer_stats().is_balanced());
}

#[test]
fn unopenable_item_is_a_sentinel() {
    let mut unopenable = MockItem::file("locked.db", ROOT, b"x".to_vec());
    unopenable.unopenable = true;
    let mut host = MockHost::new()
        .tree(&ItemTree::new().with_item(1, unopenable))
        .bind()
        .unwrap();
    let volume = host.adopt_volume(VOLUME).unwrap();
    assert!(matches!(
        host.open_item(volume, id(1), OpenFlags::empty()),
        Err(XwfError::Sentinel { symbol: "XWF_OpenItem", .. })
    ));
    assert_eq!(host.handles().open_count(), 1);
}

#[test]
fn item_properties() {
    let host = sample_host();
    assert_eq!(host.item_name(id(4)).unwrap(), "report.docx");
    assert!(matches!(
        host.item_name(id(99)),
        Err(XwfError::Sentinel { symbol: "XWF_GetItemName", .. })
    ));
    assert_eq!(host.item_size(id(5)).unwrap(), Some(26));
    host.set_item_size(id(5), None).unwrap();
    assert_eq!(host.item_size(id(5)).unwrap(), None);
    assert!(host.set_item_size(id(5), Some(-4)).is_err());

    let kind = host.item_type(id(4)).unwrap();
    assert_eq!(kind.description, "txt");
    assert_eq!(kind.category, Some(TypeCategory::Confirmed));
    host.set_item_type(id(4), "docx", TypeCategory::NewlyIdentified).unwrap();
    let kind = host.item_type(id(4)).unwrap();
    assert_eq!(kind.description, "docx");
    assert_eq!(kind.category, Some(TypeCategory::NewlyIdentified));

    assert_eq!(host.item_parent(id(4)).unwrap(), Some(id(3)));
    assert_eq!(host.item_parent(id(ROOT)).unwrap(), None);
    host.set_item_parent(id(5), id(6)).unwrap();
    assert_eq!(host.item_parent(id(5)).unwrap(), Some(id(6)));
    assert!(host.set_item_parent(id(5), id(5)).is_err());

    assert_eq!(host.item_count().unwrap(), 7);
    assert_eq!(host.file_count(id(2)).unwrap(), 2);
    assert!(host.buffer_stats().is_balanced());
}

#[test]
fn item_information_and_flags() {
    let host = sample_host();
    assert_eq!(host.item_information(id(4), ItemInfo::Flags).unwrap(), None);
    assert!(host.set_item_information(id(4), ItemInfo::SetFlags, 0x11).unwrap());
    assert!(host.set_item_information(id(4), ItemInfo::RemoveFlags, 0x01).unwrap());
    assert_eq!(host.item_information(id(4), ItemInfo::Flags).unwrap(), Some(0x10));
    assert!(host.item_information(id(4), ItemInfo::SetFlags).is_err());
    assert!(!host.set_item_information(id(99), ItemInfo::Flags, 1).unwrap());
}

#[test]
fn item_offsets() {
    let host = sample_host();
    let offsets = host.item_offsets(id(4)).unwrap();
    assert_eq!(offsets.definition, None);
    assert_eq!(offsets.start_sector, None);

    let carved = xtension_core::ItemOffsets {
        definition: None,
        carved: Some(1_048_576),
        start_sector: Some(2048),
    };
    host.set_item_offsets(id(4), carved).unwrap();
    assert_eq!(host.item_offsets(id(4)).unwrap(), carved);

    let ambiguous = xtension_core::ItemOffsets {
        definition: Some(0),
        carved: Some(512),
        start_sector: None,
    };
    assert!(host.set_item_offsets(id(4), ambiguous).is_err());
}

#[test]
fn created_items_join_the_snapshot() {
    let host = sample_host();
    let dir = host.create_item("Carved", CreateItemFlags::empty()).unwrap();
    assert_eq!(host.item_name(dir).unwrap(), "Carved");
    assert!(matches!(
        host.create_item("", CreateItemFlags::empty()),
        Err(XwfError::InvalidArgument(_))
    ));
    assert_eq!(calls("XWF_CreateItem"), 1);

    let file = host
        .create_file("extracted.bin", CreateFileFlags::empty(), Some(dir), Some("C:\\temp\\x.bin"))
        .unwrap();
    assert_eq!(host.item_parent(file).unwrap(), Some(dir));
    assert_eq!(item(file.get()).unwrap().extracted.as_deref(), Some("C:\\temp\\x.bin"));
    assert!(host
        .create_file("orphan", CreateFileFlags::ATTACH_EXTERNAL_FILE, None, None)
        .is_err());
}

#[test]
fn comments_and_extracted_metadata() {
    let host = sample_host();
    assert_eq!(host.comment(id(4)).unwrap(), None);
    assert!(host.add_comment(id(4), "first", CommentMode::Replace).unwrap());
    assert!(host.add_comment(id(4), "second", CommentMode::AppendLine).unwrap());
    assert_eq!(host.comment(id(4)).unwrap().as_deref(), Some("first\nsecond"));
    assert!(!host.add_comment(id(99), "x", CommentMode::Append).unwrap());

    assert!(host.add_extracted_metadata(id(5), "Author: A", CommentMode::Replace).unwrap());
    assert!(host.add_extracted_metadata(id(5), "; B", CommentMode::Append).unwrap());
    assert_eq!(host.extracted_metadata(id(5)).unwrap().as_deref(), Some("Author: A; B"));
    assert!(host.add_comment(id(4), "nul\0inside", CommentMode::Replace).is_err());
}

#[test]
fn report_tables() {
    let host = MockHost::new()
        .tree(&ItemTree::sample())
        .report_table("Pictures")
        .bind()
        .unwrap();

    assert_eq!(host.add_to_report_table(id(4), "Notable", ReportTableFlags::empty()).unwrap(), Association::New);
    assert_eq!(host.add_to_report_table(id(4), "Notable", ReportTableFlags::empty()).unwrap(), Association::Existing);
    assert_eq!(host.add_to_report_table(id(4), "Pictures", ReportTableFlags::empty()).unwrap(), Association::New);
    assert!(matches!(
        host.add_to_report_table(id(99), "Notable", ReportTableFlags::empty()),
        Err(XwfError::Sentinel { .. })
    ));

    assert_eq!(host.report_table_assocs(id(4)).unwrap(), vec!["Notable", "Pictures"]);
    assert!(host.report_table_assocs(id(5)).unwrap().is_empty());

    assert_eq!(host.report_table_capacity().unwrap(), REPORT_TABLE_CAPACITY as u16);
    let tables = host.report_tables().unwrap();
    let names: Vec<_> = tables.iter().map(|table| table.name.as_str()).collect();
    assert_eq!(names, vec!["Pictures", "Notable"]);
    assert_eq!(tables[1].id, 1);
    assert_eq!(host.report_table_name(15).unwrap(), None);
    assert!(host.buffer_stats().is_balanced());
}

#[test]
fn hash_values_follow_snapshot_hash_types() {
    let md5: Vec<u8> = (0..16).collect();
    let sha1: Vec<u8> = (100..120).collect();
    let mut hashed = MockItem::file("hashed.bin", ROOT, b"abc".to_vec());
    hashed.hashes = [Some(md5.clone()), Some(sha1.clone())];
    let host = MockHost::new()
        .tree(&ItemTree::new().with_item(1, hashed))
        .snapshot_hashes(HashType::Md5.raw(), HashType::Sha1.raw())
        .bind()
        .unwrap();

    assert_eq!(
        host.snapshot_hash_types().unwrap(),
        (Some(HashType::Md5), Some(HashType::Sha1))
    );
    let primary = host.hash_value(id(1), HashSlot::Primary).unwrap().unwrap();
    assert_eq!(primary.kind, HashType::Md5);
    assert_eq!(primary.digest, md5);
    assert_eq!(primary.to_hex(), "000102030405060708090a0b0c0d0e0f");
    let secondary = host.hash_value(id(1), HashSlot::Secondary).unwrap().unwrap();
    assert_eq!(secondary.digest, sha1);
    assert_eq!(host.hash_value(id(ROOT), HashSlot::Primary).unwrap(), None);
}

#[test]
fn no_snapshot_hash_skips_the_host() {
    let host = sample_host();
    assert_eq!(host.hash_value(id(4), HashSlot::Primary).unwrap(), None);
    assert_eq!(calls("XWF_GetHashValue"), 0);
}

#[test]
fn special_items() {
    let host = MockHost::new()
        .tree(&ItemTree::sample())
        .special_item(SpecialItem::RootDirectory.raw(), ROOT)
        .bind()
        .unwrap();
    assert_eq!(host.special_item(SpecialItem::RootDirectory).unwrap(), Some(id(ROOT)));
    assert_eq!(host.special_item(SpecialItem::CarvedFiles).unwrap(), None);
}

#[test]
fn host_allocated_metadata_is_released() {
    let mut described = MockItem::file("photo.jpg", ROOT, b"\xFF\xD8\xFF".to_vec());
    described.metadata = Some("Camera: X100".to_string());
    let mut host = MockHost::new()
        .tree(&ItemTree::new().with_item(1, described))
        .bind()
        .unwrap();

    assert_eq!(host.metadata(id(1), None).unwrap().as_deref(), Some("Camera: X100"));
    assert_eq!(host.metadata(id(ROOT), None).unwrap(), None);

    let volume = host.adopt_volume(VOLUME).unwrap();
    let handle = host.open_item(volume, id(1), OpenFlags::empty()).unwrap();
    let image = host
        .raster_image(id(1), handle, xtension_core::types::RasterFlags::empty(), 0, 0)
        .unwrap()
        .unwrap();
    assert_eq!((image.width, image.height), (16, 16));
    assert_eq!(image.data.len(), 16 * 16 * 3);
    host.close_item(handle).unwrap();

    let stats = host.buffer_stats();
    assert_eq!(stats.foreign_acquired, 2);
    assert_eq!(stats.foreign_released, 2);
    assert_eq!(releases(), 2);
    assert_eq!(outstanding_allocations(), 0);
    assert_eq!(outstanding_bytes(), 0);
}

#[test]
fn evidence_properties() {
    let mut evidence = MockEvidence::new(7, "Laptop");
    evidence.texts.insert(EvidenceProperty::Description.raw(), "Seized 2024-03-01".to_string());
    evidence.texts.insert(EvidenceProperty::ExtendedTitle.raw(), "Laptop, Partition 2".to_string());
    evidence.numbers.insert(EvidenceProperty::SizeInBytes.raw(), 256 * 1024 * 1024 * 1024);
    evidence.numbers.insert(EvidenceProperty::CreationTime.raw(), 133_000_000_000_000_000);
    evidence.hash = Some((HashType::Sha256.raw(), vec![0xAB; 32]));
    let mut host = MockHost::new().evidence(evidence).bind().unwrap();

    let objects = host.evidence_objects().unwrap();
    assert_eq!(objects.len(), 1);
    let props = host.evidence_properties(objects[0]).unwrap();
    assert_eq!(props.object_id, 7);
    assert_eq!(props.title.as_deref(), Some("Laptop"));
    assert_eq!(props.description.as_deref(), Some("Seized 2024-03-01"));
    assert_eq!(props.internal_name, None);
    assert_eq!(props.extended_title, "Laptop, Partition 2");
    assert_eq!(props.abbreviated_title, "");
    assert_eq!(props.size_in_bytes, 256 * 1024 * 1024 * 1024);
    assert_eq!(props.creation_time, Some(FileTime(133_000_000_000_000_000)));
    assert_eq!(props.modification_time, None);
    let hash = props.hash.unwrap();
    assert_eq!(hash.kind, HashType::Sha256);
    assert_eq!(hash.digest, vec![0xAB; 32]);
    assert_eq!(props.hash2, None);
    assert!(host.buffer_stats().is_balanced());
}

#[test]
fn evidence_lookup_open_and_close() {
    let mut host = MockHost::new()
        .evidence(MockEvidence::new(1, "Disk 1"))
        .evidence(MockEvidence::new(2, "Disk 2"))
        .bind()
        .unwrap();

    let second = host.evidence(2).unwrap().unwrap();
    assert_eq!(host.evidence(9).unwrap(), None);

    // Closing an object that was never opened does not reach the host.
    host.close_evidence(second).unwrap();
    assert_eq!(calls("XWF_CloseEvObj"), 0);

    let volume = host.open_evidence(second, 0).unwrap();
    assert_eq!(host.volume_name(volume, VolumeNameKind::Standard).unwrap(), "Disk 2");
    host.close_evidence(second).unwrap();
    assert_eq!(calls("XWF_CloseEvObj"), 1);
    assert!(matches!(
        host.volume_name(volume, VolumeNameKind::Standard),
        Err(XwfError::InvalidHandle { .. })
    ));
}

#[test]
fn evidence_creation_validates_paths() {
    let mut host = MockHost::new().bind().unwrap();
    assert!(matches!(
        host.create_evidence(EvidenceKind::DiskImage, None),
        Err(XwfError::InvalidArgument(_))
    ));
    assert_eq!(calls("XWF_CreateEvObj"), 0);

    let image = host
        .create_evidence(EvidenceKind::DiskImage, Some("D:\\images\\disk.e01"))
        .unwrap();
    let title = host.evidence_owned_text(image, EvidenceProperty::Title).unwrap();
    assert_eq!(title.as_deref(), Some("D:\\images\\disk.e01"));

    let drive = host.create_evidence(EvidenceKind::DriveLetter('e'), None).unwrap();
    let title = host.evidence_owned_text(drive, EvidenceProperty::Title).unwrap();
    assert_eq!(title.as_deref(), Some("Disk 5"));
}

#[test]
fn evidence_report_table_assocs_are_copied() {
    let mut evidence = MockEvidence::new(1, "Phone");
    evidence.report_assocs = vec![(0, 12), (3, 40), (1, -1)];
    let mut host = MockHost::new().evidence(evidence).bind().unwrap();
    let objects = host.evidence_objects().unwrap();

    let assocs = host
        .evidence_report_table_assocs(objects[0], xtension_core::types::AssocFlags::empty())
        .unwrap();
    assert_eq!(assocs, vec![(0, id(12)), (3, id(40))]);
}

#[test]
fn search_terms_and_search() {
    let host = MockHost::new().search_term("invoice").bind().unwrap();
    assert_eq!(host.search_term_count().unwrap(), 1);
    assert_eq!(host.add_search_term("payroll", SearchTermFlags::empty()).unwrap(), 1);
    assert_eq!(host.add_search_term("invoice", SearchTermFlags::empty()).unwrap(), 0);
    assert_eq!(host.search_term(1).unwrap().as_deref(), Some("payroll"));
    assert_eq!(host.search_term(5).unwrap(), None);
    assert!(host.add_search_term("", SearchTermFlags::empty()).is_err());

    let mut request = SearchRequest::new(["invoice", "payroll"]);
    request.code_pages = vec![1252, 65001];
    assert_eq!(host.search(&request).unwrap(), 2);
    let recorded = searches();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].terms, "invoice\r\npayroll");
    assert_eq!(recorded[0].code_pages, vec![1252, 65001]);

    assert!(host.search(&SearchRequest::new(["two\nlines"])).is_err());
    assert_eq!(calls("XWF_Search"), 1);
}

#[test]
fn events_need_a_known_evidence_object() {
    let mut host = MockHost::new()
        .tree(&ItemTree::sample())
        .evidence(MockEvidence::new(1, "Disk"))
        .bind()
        .unwrap();
    let evidence = host.evidence_objects().unwrap()[0];
    let event = Event {
        evidence,
        event_type: 0,
        flags: 0,
        timestamp: FileTime(133_000_000_000_000_000),
        item: Some(id(4)),
        offset: None,
        description: Some("document printed".to_string()),
    };
    assert!(host.add_event(&event).unwrap());
    let recorded = events();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].item, 4);
    assert_eq!(recorded[0].description.as_deref(), Some("document printed"));

    let bad = Event {
        description: Some("nul\0".to_string()),
        ..event
    };
    assert!(matches!(host.add_event(&bad), Err(XwfError::InvalidArgument(_))));
}

#[test]
fn containers_collect_copied_items() {
    let mut host = sample_host();
    let volume = host.adopt_volume(VOLUME).unwrap();
    let container = host.create_container("C:\\out\\export.ctr", ContainerFlags::empty()).unwrap();
    let item = host.open_item(volume, id(4), OpenFlags::empty()).unwrap();

    host.copy_to_container(container, item, CopyFlags::RECREATE_PATH, CopyMode::Logical, None)
        .unwrap();
    assert!(host
        .copy_to_container(container, item, CopyFlags::empty(), CopyMode::Range, None)
        .is_err());
    host.copy_to_container(
        container,
        item,
        CopyFlags::empty(),
        CopyMode::Range,
        Some(CopyRange { start: 0, end: 4 }),
    )
    .unwrap();
    assert_eq!(container_contents(container.raw()), Some(vec![4, 4]));

    host.close_item(item).unwrap();
    host.close_container(container).unwrap();
    host.close_container(container).unwrap();
    assert_eq!(calls("XWF_CloseContainer"), 1);
    assert!(host.create_container("", ContainerFlags::empty()).is_err());
}

#[test]
fn messages_and_user_input() {
    let host = MockHost::new()
        .user_input(Some("case-42"))
        .user_number(Some(17))
        .bind()
        .unwrap();

    host.output("indented", 1, OutputFlags::empty()).unwrap();
    host.output("narrow", 0, OutputFlags::ANSI).unwrap();
    let lines: Vec<_> = messages().into_iter().map(|message| message.text).collect();
    assert!(lines.contains(&"    indented".to_string()));
    assert!(lines.contains(&"narrow".to_string()));

    assert_eq!(
        host.user_input("Case number?", UserInputFlags::empty()).unwrap().as_deref(),
        Some("case-42")
    );
    assert_eq!(host.user_number("How many?").unwrap(), Some(17));
    assert!(host.user_input("n", UserInputFlags::POSITIVE_NUMBER).is_err());
}

#[test]
fn cancelled_user_input_is_none() {
    let host = MockHost::new().bind().unwrap();
    assert_eq!(host.user_input("Name?", UserInputFlags::empty()).unwrap(), None);
    assert_eq!(host.user_number("How many?").unwrap(), None);
}

#[test]
fn progress_is_hidden_on_drop() {
    let host = MockHost::new().stop_requested().bind().unwrap();
    {
        let progress = host.show_progress("Hashing", ProgressFlags::empty()).unwrap();
        progress.set_percentage(40).unwrap();
        progress.set_description("file 4 of 10").unwrap();
        assert!(progress.set_percentage(101).is_err());
        assert!(progress.should_stop().unwrap());
        assert_eq!(
            xtension_testkit::progress(),
            (true, 40, Some("file 4 of 10".to_string()))
        );
    }
    assert!(!xtension_testkit::progress().0);
}

#[test]
fn snapshot_selection_is_forwarded() {
    let mut host = MockHost::new().bind().unwrap();
    let volume = host.adopt_volume(VOLUME).unwrap();
    host.select_volume_snapshot(volume).unwrap();
    assert_eq!(selected_snapshot(), Some(VOLUME));
}
