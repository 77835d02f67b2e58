//! Kernel modules and their output buffers.

use std::os::raw::c_int;
use std::path::Path;

use kiln_sql::{RecordLayout, RecordView};

use crate::error::LoadResult;
use crate::loader::{open_with, ModuleHandle};
use crate::page::PageModule;

type KernelFn = unsafe extern "C" fn(*const u8, c_int, *mut u8, c_int) -> c_int;

/// Engine-owned buffer a kernel writes its results into.
///
/// Backed by `u64` words so every element starts 8-byte aligned, which
/// covers the alignment of every generated result struct.
pub struct OutputBuffer {
    words: Vec<u64>,
    layout: RecordLayout,
    capacity: usize,
}

impl OutputBuffer {
    /// Allocates a zeroed buffer for `capacity` elements of `layout`.
    pub fn new(layout: RecordLayout, capacity: usize) -> Self {
        let bytes = layout.size() * capacity;
        Self {
            words: vec![0u64; bytes.div_ceil(8)],
            layout,
            capacity,
        }
    }

    /// Number of elements the buffer holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Element layout.
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// The buffer as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.layout.size() * self.capacity;
        // SAFETY: `words` holds at least `len` initialized bytes and u8 has
        // no alignment requirement.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), len) }
    }

    /// Element `index`, decoded through the layout.
    pub fn record(&self, index: usize) -> Option<RecordView<'_>> {
        if index >= self.capacity {
            return None;
        }
        let size = self.layout.size();
        RecordView::new(&self.as_bytes()[index * size..(index + 1) * size], &self.layout)
    }

    /// Pointer to element `index` (one past the end is allowed).
    fn slot_ptr(&mut self, index: usize) -> *mut u8 {
        let offset = index.min(self.capacity) * self.layout.size();
        // SAFETY: `offset` is within the allocation or one past its end.
        unsafe { self.words.as_mut_ptr().cast::<u8>().add(offset) }
    }
}

/// A loaded query kernel.
pub struct KernelModule {
    handle: ModuleHandle,
    entry: KernelFn,
    name: String,
}

impl KernelModule {
    /// Loads the kernel module at `path` and resolves its entry point `name`.
    pub fn open(path: &Path, name: &str) -> LoadResult<Self> {
        let (handle, entry) = open_with(path, |handle| {
            // SAFETY: generated kernels have exactly this signature.
            unsafe { handle.resolve::<KernelFn>(name) }
        })?;
        Ok(Self {
            handle,
            entry,
            name: name.to_string(),
        })
    }

    /// Entry point name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the kernel over every record of `page`, writing at most
    /// `max_out` results starting at element `offset` of `out`.
    ///
    /// Returns the kernel's match count. For COUNT kernels this is the
    /// number of matches in the page regardless of `max_out`.
    pub fn invoke(
        &self,
        page: &PageModule,
        out: &mut OutputBuffer,
        offset: usize,
        max_out: usize,
    ) -> usize {
        let records = page.first_record();
        if records.is_null() {
            return 0;
        }

        let n = c_int::try_from(page.count()).unwrap_or(c_int::MAX);
        let room = out.capacity().saturating_sub(offset);
        let max_out = c_int::try_from(max_out.min(room)).unwrap_or(c_int::MAX);
        let slot = out.slot_ptr(offset);

        // SAFETY: `records` points at `n` records of the page layout, owned by
        // the loaded page; `slot` has room for `max_out` result elements and
        // the kernel writes no more than that.
        let matched = unsafe { (self.entry)(records, n, slot, max_out) };
        usize::try_from(matched).unwrap_or(0)
    }

    /// Unloads the module.
    pub fn unload(mut self) -> LoadResult<()> {
        self.handle.unload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_sql::{DataType, Row, Value};

    #[test]
    fn test_output_buffer_alignment_and_size() {
        let layout = RecordLayout::from_fields([("flag", DataType::Boolean), ("x", DataType::Float)]);
        let buffer = OutputBuffer::new(layout, 3);
        assert_eq!(buffer.capacity(), 3);
        assert_eq!(buffer.as_bytes().len(), 48);
        assert_eq!(buffer.as_bytes().as_ptr() as usize % 8, 0);
        assert!(buffer.record(3).is_none());
    }

    #[test]
    fn test_output_buffer_records() {
        let layout = RecordLayout::single_int("count");
        let mut buffer = OutputBuffer::new(layout.clone(), 2);
        let encoded = layout.encode(&Row::new(vec![Value::Int(42)]));
        // Simulate a kernel writing element 1.
        unsafe {
            std::ptr::copy_nonoverlapping(encoded.as_ptr(), buffer.slot_ptr(1), encoded.len());
        }
        assert_eq!(buffer.record(0).unwrap().int(0), Some(0));
        assert_eq!(buffer.record(1).unwrap().int(0), Some(42));
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = OutputBuffer::new(RecordLayout::single_int("count"), 0);
        assert!(buffer.as_bytes().is_empty());
        assert!(buffer.record(0).is_none());
    }
}
