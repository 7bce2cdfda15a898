//! State of the in-process mock host.
//!
//! The mock host keeps its state in a thread-local so the host functions in
//! [`crate::exports`] can be plain `extern "system-unwind"` functions, exactly
//! like the real ones. [`MockHost`] builds a state, installs it for the
//! current thread and hands out the symbol source serving those functions.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ffi::c_void;
use std::ptr::NonNull;

use xtension_core::abi::ReportTableAssoc;
use xtension_core::types::{CaseProperty, EvidenceProperty, TypeCategory};
use xtension_core::{BindingConfig, Host, Result, SymbolSource};

use crate::exports;
use crate::fixtures::ItemTree;

/// Handle of the volume every mock starts with.
pub const VOLUME: usize = 0x1000;

/// Capacity the mock reports for report tables.
pub const REPORT_TABLE_CAPACITY: i32 = 16;

pub(crate) const EVIDENCE_BASE: usize = 0x2000;
pub(crate) const EVIDENCE_VOLUME_BASE: usize = 0x5000;
const HANDLE_BASE: usize = 0x10_0000;
const HANDLE_STEP: usize = 0x10;

/// An item of the mock snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockItem {
    /// Item name.
    pub name: String,
    /// Parent id, -1 for the root directory.
    pub parent: i32,
    /// Reported size, -1 for unknown.
    pub size: i64,
    /// Contents served by `XWF_Read`.
    pub contents: Vec<u8>,
    /// Type description.
    pub type_description: String,
    /// Type category code.
    pub category: i32,
    /// Comment text.
    pub comment: Option<String>,
    /// Extracted metadata text.
    pub extracted: Option<String>,
    /// Metadata served by `XWF_GetMetadata`.
    pub metadata: Option<String>,
    /// Names of associated report tables.
    pub report_tables: Vec<String>,
    /// Primary and secondary digests.
    pub hashes: [Option<Vec<u8>>; 2],
    /// Values served by `XWF_GetItemInformation`.
    pub information: HashMap<i32, i64>,
    /// Definition offset and start sector.
    pub offsets: (i64, i64),
    /// Whether `XWF_OpenItem` refuses the item.
    pub unopenable: bool,
}

impl MockItem {
    /// A directory.
    pub fn directory(name: impl Into<String>, parent: i32) -> Self {
        Self {
            name: name.into(),
            parent,
            size: 0,
            contents: Vec::new(),
            type_description: String::new(),
            category: TypeCategory::NotVerified.raw(),
            comment: None,
            extracted: None,
            metadata: None,
            report_tables: Vec::new(),
            hashes: [None, None],
            information: HashMap::new(),
            offsets: (-1, -1),
            unopenable: false,
        }
    }

    /// A file with contents.
    pub fn file(name: impl Into<String>, parent: i32, contents: impl Into<Vec<u8>>) -> Self {
        let contents = contents.into();
        Self {
            size: contents.len() as i64,
            contents,
            type_description: "txt".to_string(),
            category: TypeCategory::Confirmed.raw(),
            ..Self::directory(name, parent)
        }
    }
}

/// An evidence object of the mock case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockEvidence {
    /// Evidence object id.
    pub id: u32,
    /// Numeric properties by code.
    pub numbers: HashMap<u32, i64>,
    /// String properties by code, served either as host-owned pointers or
    /// written into the caller's buffer depending on the property.
    pub texts: HashMap<u32, String>,
    /// Primary hash type and digest.
    pub hash: Option<(i32, Vec<u8>)>,
    /// Secondary hash type and digest.
    pub hash2: Option<(i32, Vec<u8>)>,
    /// Report table associations as (table id, item id).
    pub report_assocs: Vec<(u16, i32)>,
    /// Name of the volume opened from this object.
    pub volume_name: String,
}

impl MockEvidence {
    /// An evidence object with an id and title.
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        let title = title.into();
        let mut texts = HashMap::new();
        texts.insert(EvidenceProperty::Title.raw(), title.clone());
        Self {
            id,
            numbers: HashMap::from([(EvidenceProperty::ObjectId.raw(), i64::from(id))]),
            texts,
            volume_name: title,
            ..Self::default()
        }
    }
}

/// A volume known to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockVolume {
    /// Volume name.
    pub name: String,
    /// Size in bytes.
    pub size: i64,
    /// File system code.
    pub file_system: i32,
}

#[derive(Debug)]
pub(crate) enum Allocation {
    Wide(Box<[u16]>),
    Bytes(Box<[u8]>),
}

impl Allocation {
    fn byte_len(&self) -> usize {
        match self {
            Allocation::Wide(units) => units.len() * 2,
            Allocation::Bytes(bytes) => bytes.len(),
        }
    }
}

/// A message written through `XWF_OutputMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Decoded text.
    pub text: String,
    /// Flags passed with it.
    pub flags: u32,
}

/// A search started through `XWF_Search`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSearch {
    /// Terms as passed.
    pub terms: String,
    /// Search flags.
    pub flags: u32,
    /// Non-zero code pages.
    pub code_pages: Vec<u16>,
}

/// An event added through `XWF_AddEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Evidence handle.
    pub evidence: usize,
    /// Event type.
    pub event_type: u32,
    /// Timestamp.
    pub timestamp: i64,
    /// Item id, -1 for none.
    pub item: i32,
    /// Description.
    pub description: Option<String>,
}

/// Everything the mock host knows and has recorded.
#[derive(Debug, Default)]
pub struct MockState {
    pub(crate) items: BTreeMap<i32, MockItem>,
    pub(crate) volumes: HashMap<usize, MockVolume>,
    pub(crate) evidence: Vec<MockEvidence>,
    pub(crate) case: HashMap<i32, String>,
    pub(crate) report_tables: Vec<String>,
    pub(crate) search_terms: Vec<String>,
    pub(crate) snapshot_hashes: [i32; 2],
    pub(crate) special_items: HashMap<i32, i32>,
    pub(crate) block: Option<(i64, i64)>,
    pub(crate) sector_owners: HashMap<i64, i32>,
    pub(crate) user_input: Option<String>,
    pub(crate) user_number: Option<i64>,
    pub(crate) should_stop: bool,
    pub(crate) progress_visible: bool,
    pub(crate) progress_percent: u32,
    pub(crate) progress_description: Option<String>,
    pub(crate) open_items: HashMap<usize, i32>,
    pub(crate) containers: HashMap<usize, Vec<i32>>,
    pub(crate) closed: Vec<usize>,
    pub(crate) selected_snapshot: Option<usize>,
    pub(crate) calls: HashMap<&'static str, usize>,
    pub(crate) faults: HashSet<String>,
    pub(crate) messages: Vec<Message>,
    pub(crate) assoc_requests: Vec<i32>,
    pub(crate) searches: Vec<RecordedSearch>,
    pub(crate) events: Vec<RecordedEvent>,
    pub(crate) allocations: HashMap<usize, Allocation>,
    pub(crate) releases: usize,
    pub(crate) strings: Vec<Box<[u16]>>,
    pub(crate) assoc_lists: Vec<Box<[ReportTableAssoc]>>,
    next_handle: usize,
    next_item: i32,
}

impl MockState {
    pub(crate) fn allocate_handle(&mut self) -> usize {
        self.next_handle += 1;
        HANDLE_BASE + self.next_handle * HANDLE_STEP
    }

    pub(crate) fn allocate_item(&mut self, item: MockItem) -> i32 {
        let id = self
            .next_item
            .max(self.items.keys().next_back().map_or(0, |last| last + 1));
        self.next_item = id + 1;
        self.items.insert(id, item);
        id
    }

    /// Keeps a wide copy of `text` alive until the state is replaced.
    pub(crate) fn keep_wide(&mut self, text: &str) -> *const u16 {
        let units: Box<[u16]> = text.encode_utf16().chain(std::iter::once(0)).collect();
        let ptr = units.as_ptr();
        self.strings.push(units);
        ptr
    }

    pub(crate) fn evidence_index(&self, raw: usize) -> Option<usize> {
        let offset = raw.checked_sub(EVIDENCE_BASE)?;
        let index = offset / HANDLE_STEP;
        (offset % HANDLE_STEP == 0 && index < self.evidence.len()).then_some(index)
    }

    /// Item id behind an open item handle.
    pub(crate) fn open_item(&self, raw: usize) -> Option<&MockItem> {
        self.open_items.get(&raw).and_then(|id| self.items.get(id))
    }
}

pub(crate) fn evidence_handle(index: usize) -> usize {
    EVIDENCE_BASE + index * HANDLE_STEP
}

thread_local! {
    static STATE: RefCell<MockState> = RefCell::new(MockState::default());
}

/// Runs `f` on the current thread's mock state.
pub fn with_state<R>(f: impl FnOnce(&mut MockState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// Counts a call and simulates a fault if one is configured for `symbol`.
pub(crate) fn enter(symbol: &'static str) {
    let fault = with_state(|state| {
        *state.calls.entry(symbol).or_default() += 1;
        state.faults.contains(symbol)
    });
    if fault {
        tracing::debug!(symbol, "simulating host fault");
        panic!("access violation in {symbol}");
    }
}

/// Symbol source serving the mock host functions.
#[derive(Debug, Clone)]
pub struct MockSymbols {
    table: HashMap<String, usize>,
}

impl MockSymbols {
    /// Every mock host function.
    pub fn all() -> Self {
        Self {
            table: exports::table(),
        }
    }

    /// Removes a symbol, as if the host did not export it.
    #[must_use]
    pub fn without(mut self, symbol: &str) -> Self {
        self.table.remove(symbol);
        self
    }

    /// Number of symbols served.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if no symbol is served.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl SymbolSource for MockSymbols {
    fn lookup(&self, symbol: &str) -> Option<NonNull<c_void>> {
        self.table
            .get(symbol)
            .and_then(|address| NonNull::new(*address as *mut c_void))
    }

    fn describe(&self) -> String {
        "mock host".to_string()
    }
}

/// Builder for the mock host of the current thread.
#[derive(Debug)]
pub struct MockHost {
    state: MockState,
    missing: Vec<String>,
}

impl MockHost {
    /// A host with one volume and no items.
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.volumes.insert(
            VOLUME,
            MockVolume {
                name: "C: (Partition 1)".to_string(),
                size: 512 * 1024 * 1024,
                file_system: -1,
            },
        );
        Self {
            state,
            missing: Vec::new(),
        }
    }

    /// Sets a case property.
    #[must_use]
    pub fn case_property(mut self, property: CaseProperty, value: impl Into<String>) -> Self {
        self.state.case.insert(property.raw(), value.into());
        self
    }

    /// Adds an item under a fixed id.
    #[must_use]
    pub fn item(mut self, id: i32, item: MockItem) -> Self {
        self.state.items.insert(id, item);
        self
    }

    /// Adds every item of a tree.
    #[must_use]
    pub fn tree(mut self, tree: &ItemTree) -> Self {
        self.state
            .items
            .extend(tree.items().iter().map(|(id, item)| (*id, item.clone())));
        self
    }

    /// Adds an evidence object.
    #[must_use]
    pub fn evidence(mut self, evidence: MockEvidence) -> Self {
        self.state.evidence.push(evidence);
        self
    }

    /// Adds a report table.
    #[must_use]
    pub fn report_table(mut self, name: impl Into<String>) -> Self {
        self.state.report_tables.push(name.into());
        self
    }

    /// Adds a search term.
    #[must_use]
    pub fn search_term(mut self, term: impl Into<String>) -> Self {
        self.state.search_terms.push(term.into());
        self
    }

    /// Sets the snapshot hash type codes, 0 for none.
    #[must_use]
    pub fn snapshot_hashes(mut self, primary: i32, secondary: i32) -> Self {
        self.state.snapshot_hashes = [primary, secondary];
        self
    }

    /// Sets the id of a special item.
    #[must_use]
    pub fn special_item(mut self, selector: i32, id: i32) -> Self {
        self.state.special_items.insert(selector, id);
        self
    }

    /// Marks a sector as allocated to an item.
    #[must_use]
    pub fn sector_owner(mut self, sector: i64, item: i32) -> Self {
        self.state.sector_owners.insert(sector, item);
        self
    }

    /// Sets the text the user "types", `None` for cancel.
    #[must_use]
    pub fn user_input(mut self, text: Option<&str>) -> Self {
        self.state.user_input = text.map(str::to_string);
        self
    }

    /// Sets the number the user "enters", `None` for cancel.
    #[must_use]
    pub fn user_number(mut self, number: Option<i64>) -> Self {
        self.state.user_number = number;
        self
    }

    /// Makes `XWF_ShouldStop` report an abort request.
    #[must_use]
    pub fn stop_requested(mut self) -> Self {
        self.state.should_stop = true;
        self
    }

    /// Makes every call to `symbol` fault.
    #[must_use]
    pub fn fault(mut self, symbol: &str) -> Self {
        self.state.faults.insert(symbol.to_string());
        self
    }

    /// Leaves `symbol` out of the symbol source.
    #[must_use]
    pub fn missing(mut self, symbol: &str) -> Self {
        self.missing.push(symbol.to_string());
        self
    }

    /// Installs the state for the current thread and returns the symbols.
    pub fn install(self) -> MockSymbols {
        let Self { state, missing } = self;
        with_state(|current| *current = state);
        missing
            .iter()
            .fold(MockSymbols::all(), |symbols, symbol| symbols.without(symbol))
    }

    /// Installs the state and binds a host to it.
    pub fn bind(self) -> Result<Host> {
        self.bind_with(BindingConfig::default())
    }

    /// Installs the state and binds a host with `config`.
    pub fn bind_with(self, config: BindingConfig) -> Result<Host> {
        Host::bind(self.install(), config)
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

/// Calls made to `symbol` since the mock was installed.
pub fn calls(symbol: &str) -> usize {
    with_state(|state| state.calls.get(symbol).copied().unwrap_or(0))
}

/// Total calls made to any symbol.
pub fn total_calls() -> usize {
    with_state(|state| state.calls.values().sum())
}

/// Starts or stops faulting `symbol`.
pub fn set_fault(symbol: &str, fault: bool) {
    with_state(|state| {
        if fault {
            state.faults.insert(symbol.to_string());
        } else {
            state.faults.remove(symbol);
        }
    });
}

/// Messages written so far.
pub fn messages() -> Vec<Message> {
    with_state(|state| state.messages.clone())
}

/// Buffer lengths passed to `XWF_GetReportTableAssocs`, in characters.
pub fn assoc_requests() -> Vec<i32> {
    with_state(|state| state.assoc_requests.clone())
}

/// Host allocations not yet handed back through `XWF_ReleaseMem`.
pub fn outstanding_allocations() -> usize {
    with_state(|state| state.allocations.len())
}

/// Bytes held by host allocations not yet released.
pub fn outstanding_bytes() -> usize {
    with_state(|state| state.allocations.values().map(Allocation::byte_len).sum())
}

/// Successful `XWF_ReleaseMem` calls.
pub fn releases() -> usize {
    with_state(|state| state.releases)
}

/// Raw handles closed through the host, in order.
pub fn closed_handles() -> Vec<usize> {
    with_state(|state| state.closed.clone())
}

/// Number of item handles the host currently has open.
pub fn open_item_handles() -> usize {
    with_state(|state| state.open_items.len())
}

/// Items copied into a container.
pub fn container_contents(container: usize) -> Option<Vec<i32>> {
    with_state(|state| state.containers.get(&container).cloned())
}

/// Searches started so far.
pub fn searches() -> Vec<RecordedSearch> {
    with_state(|state| state.searches.clone())
}

/// Events added so far.
pub fn events() -> Vec<RecordedEvent> {
    with_state(|state| state.events.clone())
}

/// Whether the progress indicator is visible, and its percentage and description.
pub fn progress() -> (bool, u32, Option<String>) {
    with_state(|state| {
        (
            state.progress_visible,
            state.progress_percent,
            state.progress_description.clone(),
        )
    })
}

/// A snapshot of an item as the host currently sees it.
pub fn item(id: i32) -> Option<MockItem> {
    with_state(|state| state.items.get(&id).cloned())
}

/// Names of the report tables that exist.
pub fn report_tables() -> Vec<String> {
    with_state(|state| state.report_tables.clone())
}

/// Selected block, if any.
pub fn block() -> Option<(i64, i64)> {
    with_state(|state| state.block)
}

/// Volume whose snapshot is selected.
pub fn selected_snapshot() -> Option<usize> {
    with_state(|state| state.selected_snapshot)
}

/// Search terms known to the case.
pub fn search_terms() -> Vec<String> {
    with_state(|state| state.search_terms.clone())
}
