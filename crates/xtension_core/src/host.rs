//! The binding context.
//!
//! A [`Host`] owns everything one binding needs: the resolved function
//! table, the module it came from, configuration, buffer accounting and the
//! handle registry. It is created once by [`Host::bind`] and passed
//! explicitly to every adapter and entry point. It is `Send` but not `Sync`:
//! the host drives extensions from one thread at a time.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::{error, trace, warn};

use crate::buffer::{BufferLedger, BufferStats};
use crate::config::BindingConfig;
use crate::error::{Result, XwfError};
use crate::handle::{Evidence, Handle, HandleRegistry, Volume};
use crate::symbols::{FunctionTable, SymbolSource};

/// A bound host.
pub struct Host {
    pub(crate) table: FunctionTable,
    pub(crate) config: BindingConfig,
    pub(crate) buffers: BufferLedger,
    pub(crate) handles: HandleRegistry,
    // Keeps the module, and with it every resolved address, alive.
    source: Box<dyn SymbolSource + Send>,
}

impl Host {
    /// Resolves the function table from `source` and builds the context.
    ///
    /// This is the only fallible step that is fatal for an extension.
    pub fn bind<S>(source: S, config: BindingConfig) -> Result<Self>
    where
        S: SymbolSource + Send + 'static,
    {
        config.validate()?;
        let table = FunctionTable::resolve(&source)?;
        Ok(Self {
            table,
            config,
            buffers: BufferLedger::new(),
            handles: HandleRegistry::new(),
            source: Box::new(source),
        })
    }

    /// The resolved function table.
    pub fn table(&self) -> &FunctionTable {
        &self.table
    }

    /// The configuration in effect.
    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Buffer counters.
    pub fn buffer_stats(&self) -> BufferStats {
        self.buffers.stats()
    }

    /// The handle registry.
    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    /// Description of the module the table was resolved from.
    pub fn origin(&self) -> String {
        self.source.describe()
    }

    /// Registers the volume the host passed to the current operation.
    pub fn adopt_volume(&mut self, raw: usize) -> Result<Handle<Volume>> {
        self.handles.adopt(raw)
    }

    /// Registers an evidence object the host passed to the current operation.
    pub fn adopt_evidence(&mut self, raw: usize) -> Result<Handle<Evidence>> {
        self.handles.adopt(raw)
    }

    /// Retires every handle lent for the current operation and returns how
    /// many there were.
    ///
    /// Lent evidence objects that were opened through
    /// [`Host::open_evidence`] are closed on the host first, which also
    /// closes their volumes.
    pub fn end_operation(&mut self) -> usize {
        for evidence in self.handles.lent_parents::<Evidence>() {
            if let Err(err) = self.close_evidence(evidence) {
                warn!(?evidence, %err, "closing evidence object failed");
            }
        }
        self.handles.release_lent()
    }

    /// Makes one host call, turning a fault that unwinds out of it into an error.
    ///
    /// `args` is only formatted when the call is traced or faults.
    pub(crate) fn invoke<R>(
        &self,
        symbol: &'static str,
        args: &dyn fmt::Debug,
        call: impl FnOnce() -> R,
    ) -> Result<R> {
        trace!(symbol, ?args, "host call");
        panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
            let message = fault_message(payload.as_ref());
            error!(symbol, ?args, %message, "host call faulted");
            XwfError::ForeignFault { symbol, message }
        })
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("origin", &self.source.describe())
            .field("buffers", &self.buffers.stats())
            .field("open_handles", &self.handles.open_count())
            .finish_non_exhaustive()
    }
}

fn fault_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown fault".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("access violation");
        assert_eq!(fault_message(payload.as_ref()), "access violation");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bad handle"));
        assert_eq!(fault_message(payload.as_ref()), "bad handle");
        let payload: Box<dyn Any + Send> = Box::new(17u8);
        assert_eq!(fault_message(payload.as_ref()), "unknown fault");
    }

    #[test]
    fn bind_fails_without_symbols() {
        let source = std::collections::HashMap::<String, usize>::new();
        let err = Host::bind(source, BindingConfig::default()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn bind_rejects_invalid_config() {
        let source = std::collections::HashMap::<String, usize>::new();
        let err = Host::bind(source, BindingConfig::new().max_path_depth(0)).unwrap_err();
        assert!(matches!(err, XwfError::InvalidArgument(_)));
    }
}
