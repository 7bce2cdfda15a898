//! Lifecycle tracking for host handles.
//!
//! A [`Handle`] is a typed token for a host object. The [`HandleRegistry`]
//! records which tokens are currently open so adapters can refuse calls on
//! handles that were never opened or are already closed, without ever
//! touching the host.
//!
//! Every registration takes a fresh generation from a registry-wide counter
//! and closed handles are dropped from the registry. If the host hands out
//! an address again after it was closed, tokens from the earlier lifetime
//! stay closed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::num::NonZeroUsize;

use tracing::debug;

use crate::abi::RawHandle;
use crate::error::{Result, XwfError};

/// A kind of host object.
pub trait HandleKind {
    /// Name used in diagnostics.
    const NAME: &'static str;
}

/// Kinds that `XWF_GetSize` and `XWF_Read` accept.
pub trait Readable: HandleKind {}

/// A volume.
#[derive(Debug)]
pub enum Volume {}

/// An opened item.
#[derive(Debug)]
pub enum Item {}

/// An evidence object.
#[derive(Debug)]
pub enum Evidence {}

/// An output container.
#[derive(Debug)]
pub enum Container {}

impl HandleKind for Volume {
    const NAME: &'static str = "volume";
}

impl HandleKind for Item {
    const NAME: &'static str = "item";
}

impl HandleKind for Evidence {
    const NAME: &'static str = "evidence";
}

impl HandleKind for Container {
    const NAME: &'static str = "container";
}

impl Readable for Volume {}
impl Readable for Item {}

/// Lifecycle state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Never returned by an open call.
    Unopened,
    /// Usable.
    Open,
    /// Closed; never usable again.
    Closed,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleState::Unopened => "unopened",
            HandleState::Open => "open",
            HandleState::Closed => "closed",
        })
    }
}

/// Who is responsible for closing a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOrigin {
    /// Lent by the host for the current operation; never closed by the binding.
    Host,
    /// Returned by an open or create call made through the binding.
    Opened,
}

/// Typed token for a host object.
pub struct Handle<K> {
    raw: NonZeroUsize,
    generation: u64,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind> Handle<K> {
    /// Wraps a raw handle that has not been registered.
    ///
    /// Such a token is Unopened: adapters reject it until an open call or
    /// [`HandleRegistry::adopt`] produces a registered token.
    pub fn from_raw(raw: usize) -> Result<Self> {
        let raw = NonZeroUsize::new(raw)
            .ok_or_else(|| XwfError::invalid(format!("zero {} handle", K::NAME)))?;
        Ok(Self {
            raw,
            generation: 0,
            _kind: PhantomData,
        })
    }

    /// The raw value.
    pub fn raw(self) -> usize {
        self.raw.get()
    }

    /// The value passed to host functions.
    pub fn as_ptr(self) -> RawHandle {
        self.raw.get() as RawHandle
    }
}

impl<K> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw && self.generation == other.generation
    }
}

impl<K> Eq for Handle<K> {}

impl<K> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
        self.generation.hash(state);
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x}#{})", K::NAME, self.raw, self.generation)
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: &'static str,
    generation: u64,
    origin: HandleOrigin,
    parent: Option<usize>,
}

/// What a close request should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Forward the close to the host.
    Forward,
    /// Nothing to do; the handle is Unopened or already Closed.
    NoOp,
}

/// Tracks the handles that are currently open.
///
/// Only open handles have an entry. A token whose entry is gone, or whose
/// generation no longer matches, is Closed.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    entries: HashMap<usize, Entry>,
    last_generation: u64,
}

impl HandleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert<K: HandleKind>(
        &mut self,
        raw: usize,
        origin: HandleOrigin,
        parent: Option<usize>,
    ) -> Result<Handle<K>> {
        let mut handle = Handle::<K>::from_raw(raw)?;
        if let Some(entry) = self.entries.get(&raw) {
            if entry.kind == K::NAME && entry.origin == origin {
                handle.generation = entry.generation;
                return Ok(handle);
            }
            return Err(XwfError::invalid(format!(
                "host returned {raw:#x} as a {}, but it is an open {}",
                K::NAME,
                entry.kind
            )));
        }
        self.last_generation += 1;
        let generation = self.last_generation;
        self.entries.insert(
            raw,
            Entry {
                kind: K::NAME,
                generation,
                origin,
                parent,
            },
        );
        handle.generation = generation;
        debug!(kind = K::NAME, raw, generation, ?origin, "handle opened");
        Ok(handle)
    }

    fn entry<K: HandleKind>(&self, handle: Handle<K>) -> Option<&Entry> {
        self.entries
            .get(&handle.raw())
            .filter(|entry| handle.generation != 0 && entry.generation == handle.generation)
    }

    /// Registers a handle lent by the host for the current operation.
    ///
    /// Adopting a handle that is already open as a lent handle returns the
    /// existing token.
    pub fn adopt<K: HandleKind>(&mut self, raw: usize) -> Result<Handle<K>> {
        self.insert(raw, HandleOrigin::Host, None)
    }

    /// Registers a handle returned by a successful open call.
    pub fn register_open<K: HandleKind>(&mut self, raw: usize) -> Result<Handle<K>> {
        self.insert(raw, HandleOrigin::Opened, None)
    }

    /// Registers a handle opened on behalf of another handle.
    ///
    /// Closing `parent` through [`HandleRegistry::close_children`] closes it.
    pub fn register_child<K: HandleKind, P: HandleKind>(
        &mut self,
        raw: usize,
        parent: Handle<P>,
    ) -> Result<Handle<K>> {
        self.insert(raw, HandleOrigin::Opened, Some(parent.raw()))
    }

    /// Current state of a token.
    pub fn state<K: HandleKind>(&self, handle: Handle<K>) -> HandleState {
        if handle.generation == 0 {
            HandleState::Unopened
        } else if self.entry(handle).is_some() {
            HandleState::Open
        } else {
            HandleState::Closed
        }
    }

    /// Who owns an open token, if it is open.
    pub fn origin<K: HandleKind>(&self, handle: Handle<K>) -> Option<HandleOrigin> {
        self.entry(handle).map(|entry| entry.origin)
    }

    /// Fails unless the token is Open.
    pub fn ensure_open<K: HandleKind>(&self, handle: Handle<K>) -> Result<()> {
        match self.state(handle) {
            HandleState::Open => Ok(()),
            state => Err(XwfError::InvalidHandle {
                kind: K::NAME,
                raw: handle.raw(),
                state,
            }),
        }
    }

    /// Decides what closing a token should do.
    ///
    /// Closing an Unopened or Closed token is a no-op. Closing a handle lent
    /// by the host is rejected.
    pub fn close_action<K: HandleKind>(&self, handle: Handle<K>) -> Result<CloseAction> {
        match self.origin(handle) {
            Some(HandleOrigin::Host) => Err(XwfError::invalid(format!(
                "{} handle {:#x} is owned by the host",
                K::NAME,
                handle.raw()
            ))),
            Some(HandleOrigin::Opened) => Ok(CloseAction::Forward),
            None => Ok(CloseAction::NoOp),
        }
    }

    /// Marks an open token Closed.
    pub fn mark_closed<K: HandleKind>(&mut self, handle: Handle<K>) {
        if self.entry(handle).is_some() {
            self.entries.remove(&handle.raw());
            debug!(kind = K::NAME, raw = handle.raw(), "handle closed");
        }
    }

    /// Returns true if `parent` has open children.
    pub fn has_children<P: HandleKind>(&self, parent: Handle<P>) -> bool {
        self.entries
            .values()
            .any(|entry| entry.parent == Some(parent.raw()))
    }

    /// Marks every open child of `parent` Closed and returns how many there were.
    pub fn close_children<P: HandleKind>(&mut self, parent: Handle<P>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.parent != Some(parent.raw()));
        before - self.entries.len()
    }

    /// Lent handles of kind `K` that still have open children.
    pub fn lent_parents<K: HandleKind>(&self) -> Vec<Handle<K>> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.kind == K::NAME && entry.origin == HandleOrigin::Host)
            .filter(|(raw, _)| self.entries.values().any(|child| child.parent == Some(**raw)))
            .filter_map(|(raw, entry)| {
                let mut handle = Handle::<K>::from_raw(*raw).ok()?;
                handle.generation = entry.generation;
                Some(handle)
            })
            .collect()
    }

    /// Retires every handle lent by the host, along with anything still open
    /// on their behalf, and returns how many lent handles there were.
    ///
    /// Called when an operation ends.
    pub fn release_lent(&mut self) -> usize {
        let lent: HashSet<usize> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.origin == HandleOrigin::Host)
            .map(|(raw, _)| *raw)
            .collect();
        self.entries.retain(|raw, entry| {
            !lent.contains(raw) && !entry.parent.is_some_and(|parent| lent.contains(&parent))
        });
        lent.len()
    }

    /// Number of open handles of any kind.
    pub fn open_count(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_handle_is_rejected() {
        assert!(Handle::<Item>::from_raw(0).is_err());
    }

    #[test]
    fn unregistered_token_is_unopened() {
        let registry = HandleRegistry::new();
        let handle = Handle::<Item>::from_raw(0x10).unwrap();
        assert_eq!(registry.state(handle), HandleState::Unopened);
        assert!(matches!(
            registry.ensure_open(handle),
            Err(XwfError::InvalidHandle {
                state: HandleState::Unopened,
                ..
            })
        ));
        assert_eq!(registry.close_action(handle).unwrap(), CloseAction::NoOp);
    }

    #[test]
    fn open_close_cycle() {
        let mut registry = HandleRegistry::new();
        let handle = registry.register_open::<Item>(0x10).unwrap();
        assert!(registry.ensure_open(handle).is_ok());
        assert_eq!(registry.close_action(handle).unwrap(), CloseAction::Forward);

        registry.mark_closed(handle);
        assert_eq!(registry.state(handle), HandleState::Closed);
        assert!(registry.ensure_open(handle).is_err());
        assert_eq!(registry.close_action(handle).unwrap(), CloseAction::NoOp);
        assert_eq!(registry.open_count(), 0);
    }

    #[test]
    fn reused_address_does_not_revive_stale_token() {
        let mut registry = HandleRegistry::new();
        let first = registry.register_open::<Item>(0x20).unwrap();
        registry.mark_closed(first);
        let second = registry.register_open::<Item>(0x20).unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.state(first), HandleState::Closed);
        assert_eq!(registry.state(second), HandleState::Open);

        // Closing the stale token must not touch the new one.
        registry.mark_closed(first);
        assert_eq!(registry.state(second), HandleState::Open);
    }

    #[test]
    fn two_opens_are_independent() {
        let mut registry = HandleRegistry::new();
        let a = registry.register_open::<Item>(0x30).unwrap();
        let b = registry.register_open::<Item>(0x40).unwrap();
        registry.mark_closed(a);
        assert_eq!(registry.state(a), HandleState::Closed);
        assert_eq!(registry.state(b), HandleState::Open);
    }

    #[test]
    fn kind_confusion_is_rejected() {
        let mut registry = HandleRegistry::new();
        registry.register_open::<Item>(0x50).unwrap();
        assert!(registry.register_open::<Container>(0x50).is_err());
    }

    #[test]
    fn lent_handles_cannot_be_closed_but_are_retired() {
        let mut registry = HandleRegistry::new();
        let volume = registry.adopt::<Volume>(0x60).unwrap();
        assert_eq!(registry.origin(volume), Some(HandleOrigin::Host));
        assert!(registry.close_action(volume).is_err());
        assert_eq!(registry.adopt::<Volume>(0x60).unwrap(), volume);

        assert_eq!(registry.release_lent(), 1);
        assert_eq!(registry.state(volume), HandleState::Closed);
    }

    #[test]
    fn children_close_with_parent() {
        let mut registry = HandleRegistry::new();
        let evidence = registry.adopt::<Evidence>(0x70).unwrap();
        let volume = registry.register_child::<Volume, _>(0x80, evidence).unwrap();
        assert!(registry.has_children(evidence));
        assert_eq!(registry.close_children(evidence), 1);
        assert_eq!(registry.state(volume), HandleState::Closed);
        assert!(!registry.has_children(evidence));
        assert_eq!(registry.state(evidence), HandleState::Open);
    }

    #[test]
    fn retiring_a_lent_parent_retires_its_children() {
        let mut registry = HandleRegistry::new();
        let evidence = registry.adopt::<Evidence>(0x90).unwrap();
        let volume = registry.register_child::<Volume, _>(0xa0, evidence).unwrap();
        assert_eq!(registry.lent_parents::<Evidence>(), vec![evidence]);
        assert!(registry.lent_parents::<Volume>().is_empty());

        assert_eq!(registry.release_lent(), 1);
        assert_eq!(registry.state(evidence), HandleState::Closed);
        assert_eq!(registry.state(volume), HandleState::Closed);
        assert!(registry.entries.is_empty());
    }

    #[test]
    fn closed_handles_leave_the_registry() {
        let mut registry = HandleRegistry::new();
        let mut handles = Vec::new();
        for raw in 1..=10_000usize {
            let handle = registry.register_open::<Item>(raw * 0x10).unwrap();
            registry.mark_closed(handle);
            handles.push(handle);
        }
        assert!(registry.entries.is_empty());
        assert_eq!(registry.open_count(), 0);
        assert!(handles
            .iter()
            .all(|handle| registry.state(*handle) == HandleState::Closed));

        let volume = registry.adopt::<Volume>(0x20).unwrap();
        let evidence = registry.adopt::<Evidence>(0x30).unwrap();
        registry.register_child::<Volume, _>(0x40, evidence).unwrap();
        registry.close_children(evidence);
        registry.release_lent();
        assert!(registry.entries.is_empty());
        assert_eq!(registry.state(volume), HandleState::Closed);
    }
}
