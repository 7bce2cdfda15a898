//! Evidence file containers.

use std::ptr;

use tracing::{debug, info};

use crate::buffer::to_wide_name;
use crate::error::{Result, XwfError};
use crate::handle::{CloseAction, Container, Handle, Item};
use crate::host::Host;
use crate::types::{ContainerFlags, CopyFlags, CopyMode};

/// Byte range copied in [`CopyMode::Range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRange {
    /// First byte.
    pub start: i64,
    /// End offset, exclusive.
    pub end: i64,
}

impl Host {
    /// Creates a new container, or opens an existing one with [`ContainerFlags::OPEN`].
    ///
    /// Convention: a null handle is a sentinel failure.
    pub fn create_container(&mut self, path: &str, flags: ContainerFlags) -> Result<Handle<Container>> {
        let wide = to_wide_name("container path", path)?;
        let raw = self.invoke("XWF_CreateContainer", &(path, flags), || unsafe {
            (self.table.create_container)(wide.as_ptr(), flags.bits(), ptr::null_mut())
        })?;
        if raw.is_null() {
            return Err(XwfError::sentinel("XWF_CreateContainer", format!("cannot create {path:?}")));
        }
        info!(path, "container opened");
        self.handles.register_open(raw as usize)
    }

    /// Copies an opened item into a container.
    ///
    /// `range` is required for [`CopyMode::Range`] and rejected otherwise.
    ///
    /// Convention: 0 is success; anything else is a host error code.
    pub fn copy_to_container(
        &self,
        container: Handle<Container>,
        item: Handle<Item>,
        flags: CopyFlags,
        mode: CopyMode,
        range: Option<CopyRange>,
    ) -> Result<()> {
        self.handles.ensure_open(container)?;
        self.handles.ensure_open(item)?;
        let (start, end) = match (mode, range) {
            (CopyMode::Range, Some(range)) if range.start >= 0 && range.start < range.end => {
                (range.start, range.end)
            }
            (CopyMode::Range, _) => {
                return Err(XwfError::invalid(format!("range copy needs a valid range, got {range:?}")));
            }
            (_, Some(_)) => {
                return Err(XwfError::invalid(format!("{mode:?} copy does not take a range")));
            }
            (_, None) => (-1, -1),
        };
        let code = self.invoke("XWF_CopyToContainer", &(container, item, flags, mode, range), || unsafe {
            (self.table.copy_to_container)(
                container.as_ptr(),
                item.as_ptr(),
                flags.bits(),
                mode.raw(),
                start,
                end,
                ptr::null_mut(),
            )
        })?;
        if code != 0 {
            return Err(XwfError::sentinel("XWF_CopyToContainer", format!("error code {code}")));
        }
        Ok(())
    }

    /// Closes a container.
    ///
    /// The handle is Closed afterwards even if the host reports failure.
    /// Closing an Unopened or Closed container does nothing.
    ///
    /// Convention: 1 is success.
    pub fn close_container(&mut self, container: Handle<Container>) -> Result<()> {
        if self.handles.close_action(container)? == CloseAction::NoOp {
            debug!(?container, "close of a container that is not open");
            return Ok(());
        }
        let result = self.invoke("XWF_CloseContainer", &container, || unsafe {
            (self.table.close_container)(container.as_ptr(), ptr::null_mut())
        });
        self.handles.mark_closed(container);
        match result? {
            1 => Ok(()),
            other => Err(XwfError::sentinel("XWF_CloseContainer", format!("returned {other}"))),
        }
    }
}
