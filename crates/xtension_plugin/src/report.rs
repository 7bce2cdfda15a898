//! The reference extension: reports every item of a volume.

use serde::Serialize;
use tracing::{info, warn};
use xtension_core::types::{OpenFlags, PrepareFlags, VolumeNameKind};
use xtension_core::{
    BufferStats, CallerContext, Extension, FinalizeOutcome, Host, ItemId, ItemOutcome, Operation,
    PrepareOutcome, Result, XwfError,
};

/// Bytes read from each item at most.
pub const DEFAULT_READ_LIMIT: usize = 1 << 20;

/// How summaries are written to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// One human-readable line.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl ReportFormat {
    /// Reads `XTENSION_REPORT`; anything but `json` selects text.
    pub fn from_env() -> Self {
        std::env::var("XTENSION_REPORT")
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    /// Parses a format name.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            ReportFormat::Json
        } else {
            ReportFormat::Text
        }
    }
}

/// What was seen on one volume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeSummary {
    /// Volume name, if one was available.
    pub volume: Option<String>,
    /// Items processed.
    pub items: u64,
    /// Items whose contents could not be read.
    pub unreadable: u64,
    /// Bytes read across all items.
    pub bytes_read: u64,
    /// Buffer counters at the end of the operation.
    pub buffers: BufferStats,
}

impl VolumeSummary {
    fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => serde_json::to_string(self)
                .map_err(|e| XwfError::invalid(format!("summary not serializable: {e}"))),
            ReportFormat::Text => Ok(format!(
                "{}: {} items, {} unreadable, {} bytes read, {} buffers outstanding (peak {} bytes)",
                self.volume.as_deref().unwrap_or("(no volume)"),
                self.items,
                self.unreadable,
                self.bytes_read,
                self.buffers.outstanding(),
                self.buffers.peak_bytes,
            )),
        }
    }
}

/// Logs name, path, type and size of each item and reads its contents.
#[derive(Debug)]
pub struct ItemReport {
    format: ReportFormat,
    read_limit: usize,
    current: VolumeSummary,
    summaries: Vec<VolumeSummary>,
}

impl ItemReport {
    /// A report in the given format.
    pub fn new(format: ReportFormat) -> Self {
        Self {
            format,
            read_limit: DEFAULT_READ_LIMIT,
            current: VolumeSummary::default(),
            summaries: Vec::new(),
        }
    }

    /// Caps the bytes read per item.
    #[must_use]
    pub fn read_limit(mut self, bytes: usize) -> Self {
        self.read_limit = bytes;
        self
    }

    /// Summaries of every finalized volume.
    pub fn summaries(&self) -> &[VolumeSummary] {
        &self.summaries
    }

    fn read_item(&self, host: &mut Host, operation: &Operation, item: ItemId) -> Result<usize> {
        let Some(volume) = operation.volume else {
            return Ok(0);
        };
        let handle = host.open_item(volume, item, OpenFlags::empty())?;
        let contents = host.read_contents(handle, self.read_limit);
        host.close_item(handle)?;
        Ok(contents?.len())
    }
}

impl Default for ItemReport {
    fn default() -> Self {
        Self::new(ReportFormat::default())
    }
}

impl Extension for ItemReport {
    fn name(&self) -> &str {
        "item report"
    }

    fn init(&mut self, host: &mut Host, caller: &CallerContext) -> Result<()> {
        if !xtension_core::log::install(host)? {
            warn!("a log subscriber was already installed");
        }
        info!(version = %caller.version(), format = ?self.format, "item report ready");
        Ok(())
    }

    fn about(&mut self, host: &mut Host) -> Result<()> {
        host.message(&format!(
            "Item report {}: logs name, path, type and size of every item and reads its contents.",
            xtension_core::VERSION
        ))
    }

    fn prepare(&mut self, host: &mut Host, operation: &Operation) -> Result<PrepareOutcome> {
        self.current = VolumeSummary::default();
        let Some(volume) = operation.volume else {
            return Ok(PrepareOutcome::Proceed(PrepareFlags::empty()));
        };
        self.current.volume = Some(host.volume_name(volume, VolumeNameKind::Standard)?);
        Ok(PrepareOutcome::Proceed(PrepareFlags::PROCESS_ITEMS))
    }

    fn process_item(&mut self, host: &mut Host, operation: &Operation, item: ItemId) -> Result<ItemOutcome> {
        if host.should_stop()? {
            return Ok(ItemOutcome::Stop);
        }
        self.current.items += 1;
        let name = host.item_name(item)?;
        let path = host.full_path(item)?;
        let kind = host.item_type(item)?;
        let size = host.item_size(item)?;
        info!(%item, %name, %path, kind = %kind.description, ?size, "item");

        match self.read_item(host, operation, item) {
            Ok(read) => {
                self.current.bytes_read += read as u64;
                info!(%item, read, "item contents read");
            }
            Err(err) => {
                self.current.unreadable += 1;
                warn!(%item, %err, "failed to read item contents");
            }
        }
        Ok(ItemOutcome::Continue)
    }

    fn finalize(&mut self, host: &mut Host, _operation: &Operation) -> Result<FinalizeOutcome> {
        let mut summary = std::mem::take(&mut self.current);
        summary.buffers = host.buffer_stats();
        let line = summary.render(self.format)?;
        self.summaries.push(summary);
        host.message(&line)?;
        Ok(FinalizeOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_parsed_case_insensitively() {
        assert_eq!(ReportFormat::parse("JSON"), ReportFormat::Json);
        assert_eq!(ReportFormat::parse(" json\n"), ReportFormat::Json);
        assert_eq!(ReportFormat::parse("text"), ReportFormat::Text);
        assert_eq!(ReportFormat::parse(""), ReportFormat::Text);
    }

    #[test]
    fn summary_renders_as_json_line() {
        let summary = VolumeSummary {
            volume: Some("C:".to_string()),
            items: 3,
            unreadable: 1,
            bytes_read: 42,
            buffers: BufferStats::default(),
        };
        let line = summary.render(ReportFormat::Json).unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["volume"], "C:");
        assert_eq!(value["items"], 3);
        assert_eq!(value["buffers"]["acquired"], 0);
    }

    #[test]
    fn summary_renders_as_text() {
        let line = VolumeSummary::default().render(ReportFormat::Text).unwrap();
        assert!(line.starts_with("(no volume): 0 items"));
    }
}
