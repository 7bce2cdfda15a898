//! Memory exchanged with the host.
//!
//! Two ownership paths exist and never mix:
//!
//! - [`ScopedBuffer`]: memory this crate allocates for a call's output. It is
//!   released when the guard drops, on every exit path including a fault
//!   unwinding out of the host call.
//! - [`ForeignBuffer`]: memory the host allocated and expects back through
//!   `XWF_ReleaseMem`. It is released only through that function.
//!
//! Both are counted by a [`BufferLedger`] so tests can check that every
//! acquisition is matched by exactly one release.

use std::cell::Cell;
use std::ffi::c_void;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;

use tracing::{debug, error, warn};

use crate::abi::FALSE;
use crate::config::GrowthPolicy;
use crate::error::{Result, XwfError};
use crate::symbols::ReleaseMemFn;

/// Snapshot of a [`BufferLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BufferStats {
    /// Buffers allocated by the binding.
    pub acquired: u64,
    /// Buffers allocated by the binding and released again.
    pub released: u64,
    /// Host-allocated buffers taken over.
    pub foreign_acquired: u64,
    /// Host-allocated buffers handed back through `XWF_ReleaseMem`.
    pub foreign_released: u64,
    /// Bytes currently held in binding-owned buffers.
    pub bytes_in_use: usize,
    /// Largest value `bytes_in_use` has reached.
    pub peak_bytes: usize,
}

impl BufferStats {
    /// Buffers of either kind not yet released.
    pub fn outstanding(&self) -> u64 {
        (self.acquired - self.released) + (self.foreign_acquired - self.foreign_released)
    }

    /// Returns true if every acquisition has been released.
    pub fn is_balanced(&self) -> bool {
        self.outstanding() == 0
    }
}

/// Counts buffer acquisitions and releases for one binding.
#[derive(Debug, Default)]
pub struct BufferLedger {
    acquired: Cell<u64>,
    released: Cell<u64>,
    foreign_acquired: Cell<u64>,
    foreign_released: Cell<u64>,
    bytes_in_use: Cell<usize>,
    peak_bytes: Cell<usize>,
}

impl BufferLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current counters.
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            acquired: self.acquired.get(),
            released: self.released.get(),
            foreign_acquired: self.foreign_acquired.get(),
            foreign_released: self.foreign_released.get(),
            bytes_in_use: self.bytes_in_use.get(),
            peak_bytes: self.peak_bytes.get(),
        }
    }

    /// Allocates a zeroed buffer of `len` elements.
    pub fn acquire<T: Copy + Default>(&self, len: usize) -> ScopedBuffer<'_, T> {
        let data = vec![T::default(); len];
        let bytes = std::mem::size_of_val(data.as_slice());
        self.acquired.set(self.acquired.get() + 1);
        let in_use = self.bytes_in_use.get() + bytes;
        self.bytes_in_use.set(in_use);
        self.peak_bytes.set(self.peak_bytes.get().max(in_use));
        ScopedBuffer { data, ledger: self }
    }

    /// Allocates a UTF-16 buffer of `units` characters.
    pub fn wide(&self, units: usize) -> ScopedBuffer<'_, u16> {
        self.acquire(units)
    }

    /// Allocates a byte buffer.
    pub fn bytes(&self, len: usize) -> ScopedBuffer<'_, u8> {
        self.acquire(len)
    }

    /// Takes ownership of memory the host allocated.
    ///
    /// Returns `None` for a null pointer.
    pub fn adopt_foreign(
        &self,
        ptr: *mut c_void,
        release: ReleaseMemFn,
    ) -> Option<ForeignBuffer<'_>> {
        let ptr = NonNull::new(ptr)?;
        self.foreign_acquired.set(self.foreign_acquired.get() + 1);
        Some(ForeignBuffer {
            ptr,
            release,
            ledger: self,
        })
    }

    fn release(&self, bytes: usize) {
        self.released.set(self.released.get() + 1);
        self.bytes_in_use.set(self.bytes_in_use.get() - bytes);
    }

    /// Runs the growing-retry protocol for a UTF-16 output of unknown length.
    ///
    /// `fill` performs one host call against the buffer it is given and
    /// returns the call's count. A count of zero or less means "no data" and
    /// ends the protocol with `Ok(None)`. Otherwise the buffer must contain a
    /// terminator before its last slot; a terminator in the last slot, or none
    /// at all, is treated as truncation and the call is retried with a larger
    /// buffer until `policy` forbids further growth.
    pub fn grow_until_terminated<F>(
        &self,
        symbol: &'static str,
        policy: &GrowthPolicy,
        mut fill: F,
    ) -> Result<Option<String>>
    where
        F: FnMut(&mut ScopedBuffer<'_, u16>) -> Result<i64>,
    {
        let mut size = policy.initial_bytes;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            {
                let mut buffer = self.wide(size / 2);
                let count = fill(&mut buffer)?;
                if count <= 0 {
                    debug!(symbol, attempts, count, "no data");
                    return Ok(None);
                }
                if let Some(end) = terminator(&buffer) {
                    if end + 1 < buffer.len() {
                        return Ok(Some(String::from_utf16_lossy(&buffer[..end])));
                    }
                }
            }
            match policy.next(size) {
                Some(next) => {
                    debug!(symbol, from = size, to = next, "output may be truncated, growing buffer");
                    size = next;
                }
                None => {
                    warn!(symbol, attempts, limit = policy.ceiling_bytes, "buffer ceiling reached");
                    return Err(XwfError::BufferLimit {
                        symbol,
                        limit: policy.ceiling_bytes,
                        attempts,
                    });
                }
            }
        }
    }
}

/// Binding-owned output buffer, released on drop.
#[derive(Debug)]
pub struct ScopedBuffer<'l, T: Copy + Default> {
    data: Vec<T>,
    ledger: &'l BufferLedger,
}

impl<T: Copy + Default> ScopedBuffer<'_, T> {
    /// Pointer handed to the host.
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.data.as_mut_ptr()
    }

    /// Capacity in elements as the host's `LONG`.
    pub fn len_i32(&self) -> i32 {
        i32::try_from(self.data.len()).unwrap_or(i32::MAX)
    }

    /// Capacity in elements as the host's `DWORD`.
    pub fn len_u32(&self) -> u32 {
        u32::try_from(self.data.len()).unwrap_or(u32::MAX)
    }

    /// Size in bytes.
    pub fn byte_len(&self) -> usize {
        std::mem::size_of_val(self.data.as_slice())
    }
}

impl ScopedBuffer<'_, u16> {
    /// Decodes the contents up to the first terminator.
    pub fn to_string_lossy(&self) -> String {
        from_wide(&self.data)
    }
}

impl<T: Copy + Default> Deref for ScopedBuffer<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T: Copy + Default> DerefMut for ScopedBuffer<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Copy + Default> Drop for ScopedBuffer<'_, T> {
    fn drop(&mut self) {
        self.ledger.release(self.byte_len());
    }
}

/// Host-allocated memory, handed back through `XWF_ReleaseMem` on drop.
pub struct ForeignBuffer<'l> {
    ptr: NonNull<c_void>,
    release: ReleaseMemFn,
    ledger: &'l BufferLedger,
}

impl ForeignBuffer<'_> {
    /// The host pointer.
    pub fn as_ptr(&self) -> *const c_void {
        self.ptr.as_ptr()
    }

    /// Decodes the memory as a terminated UTF-16 string.
    ///
    /// # Safety
    ///
    /// The memory must hold a terminated UTF-16 string or at least
    /// `max_units` readable units.
    pub unsafe fn wide_string(&self, max_units: usize) -> String {
        // SAFETY: upheld by the caller.
        unsafe { from_wide_ptr(self.ptr.as_ptr().cast(), max_units) }.unwrap_or_default()
    }

    /// Copies `len` bytes out of the memory.
    ///
    /// # Safety
    ///
    /// At least `len` bytes must be readable.
    pub unsafe fn to_vec(&self, len: usize) -> Vec<u8> {
        // SAFETY: upheld by the caller.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), len) }.to_vec()
    }
}

impl Drop for ForeignBuffer<'_> {
    fn drop(&mut self) {
        let release = self.release;
        let ptr = self.ptr.as_ptr();
        // SAFETY: the pointer came from the host and is released exactly once.
        match panic::catch_unwind(AssertUnwindSafe(|| unsafe { release(ptr) })) {
            Ok(FALSE) => warn!(?ptr, "XWF_ReleaseMem reported failure"),
            Ok(_) => {}
            Err(_) => error!(?ptr, "XWF_ReleaseMem faulted"),
        }
        self.ledger
            .foreign_released
            .set(self.ledger.foreign_released.get() + 1);
    }
}

impl std::fmt::Debug for ForeignBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignBuffer").field("ptr", &self.ptr).finish()
    }
}

/// Position of the first NUL unit.
pub fn terminator(units: &[u16]) -> Option<usize> {
    units.iter().position(|&unit| unit == 0)
}

/// Decodes UTF-16 up to the first NUL, replacing invalid sequences.
pub fn from_wide(units: &[u16]) -> String {
    let end = terminator(units).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Encodes `text` as terminated UTF-16.
pub fn to_wide(text: &str) -> Result<Vec<u16>> {
    if text.contains('\0') {
        return Err(XwfError::invalid("string contains an embedded NUL"));
    }
    Ok(text.encode_utf16().chain(std::iter::once(0)).collect())
}

/// Encodes a required, non-empty name.
pub fn to_wide_name(what: &str, text: &str) -> Result<Vec<u16>> {
    if text.is_empty() {
        return Err(XwfError::invalid(format!("{what} must not be empty")));
    }
    to_wide(text)
}

/// Decodes a terminated UTF-16 string owned by the host.
///
/// Returns `None` for a null pointer. Scanning stops after `max_units` units.
///
/// # Safety
///
/// `ptr` must be null or point to a terminated UTF-16 string or to at least
/// `max_units` readable units.
pub unsafe fn from_wide_ptr(ptr: *const u16, max_units: usize) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let mut len = 0;
    // SAFETY: upheld by the caller; reads stop at the terminator or the bound.
    while len < max_units && unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    // SAFETY: `len` units were just read.
    let units = unsafe { std::slice::from_raw_parts(ptr, len) };
    Some(String::from_utf16_lossy(units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Growth;
    use proptest::prelude::*;

    fn write_payload(buffer: &mut [u16], payload: &[u16]) -> i64 {
        let n = payload.len().min(buffer.len());
        buffer[..n].copy_from_slice(&payload[..n]);
        payload.len() as i64
    }

    fn terminated(text: &str) -> Vec<u16> {
        to_wide(text).unwrap()
    }

    #[test]
    fn scoped_buffers_are_counted() {
        let ledger = BufferLedger::new();
        {
            let a = ledger.wide(64);
            let b = ledger.bytes(10);
            assert_eq!(a.byte_len(), 128);
            assert_eq!(b.len(), 10);
            let stats = ledger.stats();
            assert_eq!(stats.acquired, 2);
            assert_eq!(stats.bytes_in_use, 138);
            assert_eq!(stats.outstanding(), 2);
        }
        let stats = ledger.stats();
        assert_eq!(stats.released, 2);
        assert_eq!(stats.bytes_in_use, 0);
        assert_eq!(stats.peak_bytes, 138);
        assert!(stats.is_balanced());
    }

    #[test]
    fn scoped_buffer_released_during_unwind() {
        let ledger = BufferLedger::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _buffer = ledger.wide(32);
            panic!("simulated fault");
        }));
        assert!(result.is_err());
        assert!(ledger.stats().is_balanced());
    }

    #[test]
    fn wide_round_trip() {
        assert_eq!(from_wide(&terminated("Case A")), "Case A");
        assert_eq!(from_wide(&[0x41, 0x42]), "AB");
        assert_eq!(from_wide(&[0]), "");
        assert!(to_wide("a\0b").is_err());
        assert!(to_wide_name("item name", "").is_err());
    }

    #[test]
    fn wide_pointer_respects_bound() {
        let units = terminated("abcdef");
        let decoded = unsafe { from_wide_ptr(units.as_ptr(), 3) };
        assert_eq!(decoded.as_deref(), Some("abc"));
        let decoded = unsafe { from_wide_ptr(units.as_ptr(), 100) };
        assert_eq!(decoded.as_deref(), Some("abcdef"));
        assert_eq!(unsafe { from_wide_ptr(std::ptr::null(), 10) }, None);
    }

    #[test]
    fn growth_returns_none_without_retry_on_empty_count() {
        let ledger = BufferLedger::new();
        let mut calls = 0;
        let result = ledger
            .grow_until_terminated("XWF_Test", &GrowthPolicy::default(), |_| {
                calls += 1;
                Ok(0)
            })
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(calls, 1);
        assert!(ledger.stats().is_balanced());
    }

    #[test]
    fn growth_stops_at_first_terminated_attempt() {
        let ledger = BufferLedger::new();
        let text = "x".repeat(149);
        let payload = terminated(&text);
        let mut sizes = Vec::new();
        let result = ledger
            .grow_until_terminated("XWF_Test", &GrowthPolicy::default(), |buffer| {
                sizes.push(buffer.byte_len());
                Ok(write_payload(buffer, &payload))
            })
            .unwrap();
        assert_eq!(result.as_deref(), Some(text.as_str()));
        assert_eq!(sizes, vec![128, 256, 512]);
        assert_eq!(ledger.stats().acquired, 3);
        assert!(ledger.stats().is_balanced());
    }

    #[test]
    fn terminator_in_last_slot_counts_as_truncation() {
        let ledger = BufferLedger::new();
        // 63 characters plus NUL exactly fill the first 128-byte buffer.
        let payload = terminated(&"y".repeat(63));
        let mut calls = 0;
        let result = ledger
            .grow_until_terminated("XWF_Test", &GrowthPolicy::default(), |buffer| {
                calls += 1;
                Ok(write_payload(buffer, &payload))
            })
            .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(result.map(|s| s.len()), Some(63));
    }

    #[test]
    fn always_full_output_hits_ceiling() {
        let ledger = BufferLedger::new();
        let policy = GrowthPolicy::default();
        let mut calls = 0;
        let err = ledger
            .grow_until_terminated("XWF_Test", &policy, |buffer| {
                calls += 1;
                buffer.fill(u16::from(b'z'));
                Ok(i64::from(buffer.len_i32()))
            })
            .unwrap_err();
        assert!(matches!(
            err,
            XwfError::BufferLimit {
                attempts: 10,
                limit: 65536,
                ..
            }
        ));
        assert_eq!(calls, policy.max_attempts());
        assert!(ledger.stats().is_balanced());
        assert_eq!(ledger.stats().peak_bytes, 65536);
    }

    #[test]
    fn fill_error_releases_buffer() {
        let ledger = BufferLedger::new();
        let err = ledger
            .grow_until_terminated("XWF_Test", &GrowthPolicy::default(), |_| {
                Err(XwfError::sentinel("XWF_Test", "boom"))
            })
            .unwrap_err();
        assert!(matches!(err, XwfError::Sentinel { .. }));
        assert!(ledger.stats().is_balanced());
    }

    #[test]
    fn linear_growth() {
        let ledger = BufferLedger::new();
        let policy = GrowthPolicy {
            initial_bytes: 128,
            strategy: Growth::Linear(128),
            ceiling_bytes: 1024,
        };
        let payload = terminated(&"q".repeat(100));
        let mut sizes = Vec::new();
        ledger
            .grow_until_terminated("XWF_Test", &policy, |buffer| {
                sizes.push(buffer.byte_len());
                Ok(write_payload(buffer, &payload))
            })
            .unwrap();
        assert_eq!(sizes, vec![128, 256]);
    }

    proptest! {
        #[test]
        fn growth_attempts_match_payload_length(len in 0usize..40_000) {
            let ledger = BufferLedger::new();
            let policy = GrowthPolicy::default();
            let text: String = "w".repeat(len);
            let payload = terminated(&text);
            let mut calls = 0u32;
            let result = ledger.grow_until_terminated("XWF_Test", &policy, |buffer| {
                calls += 1;
                Ok(write_payload(buffer, &payload))
            });

            // The terminator sits at index `len` and must land before the last slot.
            let mut expected = 1u32;
            let mut bytes = policy.initial_bytes;
            while bytes / 2 < len + 2 {
                match policy.next(bytes) {
                    Some(next) => { bytes = next; expected += 1; }
                    None => break,
                }
            }
            if bytes / 2 >= len + 2 {
                prop_assert_eq!(result.unwrap(), Some(text));
            } else {
                let is_limit = matches!(result, Err(XwfError::BufferLimit { .. }));
                prop_assert!(is_limit);
            }
            prop_assert_eq!(calls, expected);
            prop_assert!(ledger.stats().is_balanced());
        }
    }
}
