//! Messages, user input and the progress indicator.

use std::ffi::{c_void, CString};

use tracing::warn;

use crate::adapters::truthy;
use crate::buffer::to_wide;
use crate::error::{Result, XwfError};
use crate::host::Host;
use crate::types::{OutputFlags, ProgressFlags, UserInputFlags};

/// Capacity of the user input buffer, in characters.
const USER_INPUT_UNITS: usize = 1024;

/// Spaces per indentation level.
const INDENT_WIDTH: usize = 4;

/// Indents `message` by `level` steps.
fn indented(message: &str, level: usize) -> String {
    let mut line = " ".repeat(level * INDENT_WIDTH);
    line.push_str(message);
    line
}

impl Host {
    /// Writes a line to the host's message window.
    ///
    /// With [`OutputFlags::ANSI`] the text is passed as 8-bit characters,
    /// otherwise as UTF-16. If the configuration suppresses error logging,
    /// [`OutputFlags::DO_NOT_LOG_ERROR`] is added.
    pub fn output(&self, message: &str, level: usize, mut flags: OutputFlags) -> Result<()> {
        if self.config.suppress_error_log {
            flags |= OutputFlags::DO_NOT_LOG_ERROR;
        }
        let line = indented(message, level);
        if flags.contains(OutputFlags::ANSI) {
            let text = CString::new(line)
                .map_err(|_| XwfError::invalid("message contains an embedded NUL"))?;
            let text_ptr: *const c_void = text.as_ptr().cast();
            self.invoke("XWF_OutputMessage", &flags, || unsafe {
                (self.table.output_message)(text_ptr, flags.bits());
            })
        } else {
            let text = to_wide(&line)?;
            let text_ptr: *const c_void = text.as_ptr().cast();
            self.invoke("XWF_OutputMessage", &flags, || unsafe {
                (self.table.output_message)(text_ptr, flags.bits());
            })
        }
    }

    /// Writes an unindented line.
    pub fn message(&self, message: &str) -> Result<()> {
        self.output(message, 0, OutputFlags::empty())
    }

    /// Asks the user for text.
    ///
    /// Convention: a negative result means the user cancelled and yields `None`.
    pub fn user_input(&self, prompt: &str, flags: UserInputFlags) -> Result<Option<String>> {
        if flags.contains(UserInputFlags::POSITIVE_NUMBER) {
            return Err(XwfError::invalid("use user_number for numeric input"));
        }
        let wide = to_wide(prompt)?;
        let mut buffer = self.buffers.wide(USER_INPUT_UNITS);
        let out = buffer.as_mut_ptr();
        let units = buffer.len_u32();
        let result = self.invoke("XWF_GetUserInput", &(prompt, flags), || unsafe {
            (self.table.get_user_input)(wide.as_ptr(), out, units, flags.bits())
        })?;
        if result < 0 {
            return Ok(None);
        }
        Ok(Some(buffer.to_string_lossy()))
    }

    /// Asks the user for a positive integer.
    ///
    /// Convention: the number is the return value; a negative result means
    /// the user cancelled and yields `None`.
    pub fn user_number(&self, prompt: &str) -> Result<Option<u64>> {
        let wide = to_wide(prompt)?;
        let mut buffer = self.buffers.wide(USER_INPUT_UNITS);
        let out = buffer.as_mut_ptr();
        let units = buffer.len_u32();
        let flags = UserInputFlags::POSITIVE_NUMBER;
        let result = self.invoke("XWF_GetUserInput", &(prompt, flags), || unsafe {
            (self.table.get_user_input)(wide.as_ptr(), out, units, flags.bits())
        })?;
        Ok(u64::try_from(result).ok())
    }

    /// Shows the progress indicator until the returned guard drops.
    pub fn show_progress(&self, caption: &str, flags: ProgressFlags) -> Result<Progress<'_>> {
        let wide = to_wide(caption)?;
        self.invoke("XWF_ShowProgress", &(caption, flags), || unsafe {
            (self.table.show_progress)(wide.as_ptr(), flags.bits());
        })?;
        Ok(Progress { host: self })
    }

    /// Returns true if the user asked to abort the running operation.
    pub fn should_stop(&self) -> Result<bool> {
        let stop = self.invoke("XWF_ShouldStop", &(), || unsafe { (self.table.should_stop)() })?;
        Ok(truthy(stop))
    }
}

/// A visible progress indicator, hidden on drop.
#[derive(Debug)]
pub struct Progress<'h> {
    host: &'h Host,
}

impl Progress<'_> {
    /// Sets the completion percentage, 0 to 100.
    pub fn set_percentage(&self, percent: u32) -> Result<()> {
        if percent > 100 {
            return Err(XwfError::invalid(format!("progress of {percent}%")));
        }
        self.host.invoke("XWF_SetProgressPercentage", &percent, || unsafe {
            (self.host.table.set_progress_percentage)(percent);
        })
    }

    /// Sets the description line.
    pub fn set_description(&self, text: &str) -> Result<()> {
        let wide = to_wide(text)?;
        self.host.invoke("XWF_SetProgressDescription", &text, || unsafe {
            (self.host.table.set_progress_description)(wide.as_ptr());
        })
    }

    /// Returns true if the user asked to abort.
    pub fn should_stop(&self) -> Result<bool> {
        self.host.should_stop()
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        let hidden = self.host.invoke("XWF_HideProgress", &(), || unsafe {
            (self.host.table.hide_progress)();
        });
        if let Err(err) = hidden {
            warn!(%err, "progress indicator not hidden");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indentation_is_four_spaces_per_level() {
        assert_eq!(indented("x", 0), "x");
        assert_eq!(indented("x", 2), "        x");
    }
}
