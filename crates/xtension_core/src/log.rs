//! Routing `tracing` output into the host's message window.
//!
//! [`HostWriter`] is a [`MakeWriter`] whose writers collect one formatted
//! event and hand it to `XWF_OutputMessage` when dropped. It only holds the
//! function pointer, so it can live in a global subscriber while the
//! [`Host`] itself stays on the host's thread.

use std::io;
use std::panic::{self, AssertUnwindSafe};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, XwfError};
use crate::host::Host;
use crate::symbols::OutputMessageFn;
use crate::types::OutputFlags;

/// Creates writers that forward to `XWF_OutputMessage`.
#[derive(Clone, Copy)]
pub struct HostWriter {
    output: OutputMessageFn,
    flags: OutputFlags,
}

impl HostWriter {
    /// A writer for `host`, honouring its error-log setting.
    pub fn new(host: &Host) -> Self {
        let mut flags = OutputFlags::empty();
        if host.config.suppress_error_log {
            flags |= OutputFlags::DO_NOT_LOG_ERROR;
        }
        Self {
            output: host.table.output_message,
            flags,
        }
    }
}

impl std::fmt::Debug for HostWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostWriter").field("flags", &self.flags).finish()
    }
}

impl<'a> MakeWriter<'a> for HostWriter {
    type Writer = HostLine;

    fn make_writer(&'a self) -> Self::Writer {
        HostLine {
            output: self.output,
            flags: self.flags,
            pending: Vec::new(),
        }
    }
}

/// One event's worth of output.
pub struct HostLine {
    output: OutputMessageFn,
    flags: OutputFlags,
    pending: Vec<u8>,
}

impl HostLine {
    fn emit(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        for line in text.lines().filter(|line| !line.is_empty()) {
            let wide: Vec<u16> = line
                .encode_utf16()
                .map(|unit| if unit == 0 { u16::from(b' ') } else { unit })
                .chain(std::iter::once(0))
                .collect();
            let output = self.output;
            let flags = self.flags.bits();
            // A faulting host cannot report its own fault; the line is dropped.
            let _ = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
                output(wide.as_ptr().cast(), flags);
            }));
        }
    }
}

impl io::Write for HostLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit();
        Ok(())
    }
}

impl Drop for HostLine {
    fn drop(&mut self) {
        self.emit();
    }
}

/// Parses a filter directive such as `info` or `xtension_core=debug`.
pub fn filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| XwfError::invalid(format!("log filter {directive:?}: {e}")))
}

/// Installs a global subscriber that writes to the host's message window.
///
/// Returns `false` if a global subscriber was already installed.
pub fn install(host: &Host) -> Result<bool> {
    let filter = filter(&host.config.log_filter)?;
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(HostWriter::new(host))
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .try_init()
        .is_ok();
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;

    thread_local! {
        static LINES: RefCell<Vec<(String, u32)>> = const { RefCell::new(Vec::new()) };
    }

    unsafe extern "system-unwind" fn capture(text: *const std::ffi::c_void, flags: u32) {
        let line = unsafe { crate::buffer::from_wide_ptr(text.cast(), 4096) }.unwrap_or_default();
        LINES.with(|lines| lines.borrow_mut().push((line, flags)));
    }

    unsafe extern "system-unwind" fn faulting(_: *const std::ffi::c_void, _: u32) {
        panic!("host crashed");
    }

    fn writer(output: OutputMessageFn) -> HostWriter {
        HostWriter {
            output,
            flags: OutputFlags::DO_NOT_LOG_ERROR,
        }
    }

    #[test]
    fn each_line_becomes_one_message() {
        LINES.with(|lines| lines.borrow_mut().clear());
        let writer = writer(capture);
        {
            let mut line = writer.make_writer();
            line.write_all(b" INFO processed item\n").unwrap();
            line.write_all(b"second\n\n").unwrap();
        }
        let lines = LINES.with(|lines| lines.borrow().clone());
        assert_eq!(
            lines,
            vec![
                (" INFO processed item".to_string(), 0x02),
                ("second".to_string(), 0x02),
            ]
        );
    }

    #[test]
    fn faulting_output_is_contained() {
        let writer = writer(faulting);
        let mut line = writer.make_writer();
        line.write_all(b"lost\n").unwrap();
        line.flush().unwrap();
    }

    #[test]
    fn bad_filter_is_rejected() {
        assert!(filter("info").is_ok());
        assert!(filter("xtension_core=notalevel").is_err());
    }
}
