//! Memory-mapped perf ring buffer
//!
//! The first page of the mapping is the `perf_event_mmap_page` control page;
//! the data area follows. The kernel advances `data_head`, we advance
//! `data_tail`. Records that straddle the end of the data area are copied
//! into a scratch buffer so handlers always see one contiguous slice.

#![allow(unsafe_code)] // raw access to the kernel-shared control page

use std::fs::File;
use std::io;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::{MmapOptions, MmapRaw};
use perf_event_open_sys::bindings::perf_event_mmap_page;

use super::{RawRecord, RingBuffer, HEADER_SIZE};

pub struct MmapRing {
    map: MmapRaw,
    data_offset: usize,
    /// Power of two.
    data_size: usize,
    /// Read position inside the current epoch.
    start: u64,
    /// Producer position snapshotted by `read_init`.
    end: u64,
    scratch: Vec<u8>,
}

#[must_use]
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).unwrap_or(4096)
}

impl MmapRing {
    /// Map the control page plus `pages` data pages of a perf descriptor.
    ///
    /// # Errors
    /// Returns the OS error of the mapping.
    pub fn new(file: &File, pages: usize) -> io::Result<Self> {
        let page = page_size();
        let map = MmapOptions::new().len(page * (pages + 1)).map_raw(file)?;
        Ok(Self::from_raw(map, page))
    }

    /// Wrap an existing mapping whose first page is a control page.
    pub(crate) fn from_raw(map: MmapRaw, page: usize) -> Self {
        let header = map.as_mut_ptr().cast::<perf_event_mmap_page>();
        // SAFETY: the mapping is at least one page long and the control page
        // layout is fixed by the kernel ABI
        let (offset, size) = unsafe { ((*header).data_offset, (*header).data_size) };
        let (data_offset, data_size) = if size == 0 {
            // Kernels before 4.1 leave these zero: data starts at page 1.
            (page, map.len() - page)
        } else {
            (usize::try_from(offset).unwrap_or(page), usize::try_from(size).unwrap_or(0))
        };
        Self { map, data_offset, data_size, start: 0, end: 0, scratch: Vec::new() }
    }

    fn header(&self) -> *mut perf_event_mmap_page {
        self.map.as_mut_ptr().cast()
    }

    fn head(&self) -> u64 {
        // SAFETY: data_head is an aligned u64 inside the live mapping
        let head = unsafe { &*ptr::addr_of!((*self.header()).data_head).cast::<AtomicU64>() };
        head.load(Ordering::Acquire)
    }

    fn tail(&self) -> &AtomicU64 {
        // SAFETY: data_tail is an aligned u64 inside the live mapping
        unsafe { &*ptr::addr_of!((*self.header()).data_tail).cast::<AtomicU64>() }
    }

    fn data(&self) -> *const u8 {
        // SAFETY: data_offset lies within the mapping
        unsafe { self.map.as_ptr().add(self.data_offset) }
    }

    /// Copy `out.len()` bytes starting at ring offset `off`, wrapping.
    fn copy_out(&self, off: usize, out: &mut [u8]) {
        let first = out.len().min(self.data_size - off);
        // SAFETY: both ranges are inside the data area
        unsafe {
            ptr::copy_nonoverlapping(self.data().add(off), out.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(self.data(), out.as_mut_ptr().add(first), out.len() - first);
        }
    }
}

impl RingBuffer for MmapRing {
    fn read_init(&mut self) -> bool {
        self.start = self.tail().load(Ordering::Relaxed);
        self.end = self.head();
        self.start != self.end
    }

    fn read_event(&mut self) -> Option<RawRecord<'_>> {
        let available = self.end.wrapping_sub(self.start);
        if available < HEADER_SIZE as u64 || self.data_size == 0 {
            return None;
        }

        let mask = self.data_size - 1;
        #[allow(clippy::cast_possible_truncation)]
        let off = (self.start as usize) & mask;

        let mut header = [0u8; HEADER_SIZE];
        self.copy_out(off, &mut header);
        let kind = u32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
        let misc = u16::from_ne_bytes([header[4], header[5]]);
        let size = usize::from(u16::from_ne_bytes([header[6], header[7]]));
        if size < HEADER_SIZE || size as u64 > available {
            // Corrupt or partially written: drop the rest of this epoch.
            self.start = self.end;
            return None;
        }

        self.start += size as u64;
        if off + size <= self.data_size {
            // SAFETY: the record lies inside the data area and the kernel
            // does not overwrite it before we move data_tail past it
            let bytes = unsafe { slice::from_raw_parts(self.data().add(off), size) };
            Some(RawRecord { kind, misc, bytes })
        } else {
            let mut scratch = std::mem::take(&mut self.scratch);
            scratch.resize(size, 0);
            self.copy_out(off, &mut scratch);
            self.scratch = scratch;
            Some(RawRecord { kind, misc, bytes: &self.scratch[..size] })
        }
    }

    fn consume(&mut self) {
        self.tail().store(self.start, Ordering::Release);
    }

    fn read_done(&mut self) {
        self.consume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 4096;

    /// Anonymous mapping laid out like a perf ring with one data page.
    fn fake_ring() -> MmapRing {
        let map = MmapOptions::new().len(PAGE * 2).map_anon().unwrap();
        let map = MmapRaw::from(map);
        let header = map.as_mut_ptr().cast::<perf_event_mmap_page>();
        unsafe {
            (*header).data_offset = PAGE as u64;
            (*header).data_size = PAGE as u64;
        }
        MmapRing::from_raw(map, PAGE)
    }

    /// Write a record of `size` bytes at absolute position `pos` and
    /// advance data_head to its end.
    fn produce(ring: &MmapRing, pos: u64, kind: u32, size: u16, fill: u8) {
        let mut record = vec![fill; usize::from(size)];
        record[0..4].copy_from_slice(&kind.to_ne_bytes());
        record[4..6].copy_from_slice(&0u16.to_ne_bytes());
        record[6..8].copy_from_slice(&size.to_ne_bytes());
        let data = unsafe { ring.map.as_mut_ptr().add(ring.data_offset) };
        for (i, byte) in record.iter().enumerate() {
            let off = (pos as usize + i) & (ring.data_size - 1);
            unsafe { *data.add(off) = *byte };
        }
        unsafe { (*ring.header()).data_head = pos + u64::from(size) };
    }

    #[test]
    fn test_empty_ring_has_nothing_to_read() {
        let mut ring = fake_ring();
        assert!(!ring.read_init());
        assert!(ring.read_event().is_none());
    }

    #[test]
    fn test_drain_consumes_each_record_once() {
        let mut ring = fake_ring();
        produce(&ring, 0, 3, 16, 0xaa);
        produce(&ring, 16, 4, 24, 0xbb);

        assert!(ring.read_init());
        let mut kinds = Vec::new();
        while let Some(record) = ring.read_event() {
            kinds.push((record.kind, record.bytes.len()));
            ring.consume();
        }
        ring.read_done();
        assert_eq!(kinds, vec![(3, 16), (4, 24)]);
        assert_eq!(ring.tail().load(Ordering::Relaxed), 40);

        // Nothing new was produced: the next epoch is empty.
        assert!(!ring.read_init());
    }

    #[test]
    fn test_record_wrapping_the_data_area_is_contiguous() {
        let mut ring = fake_ring();
        let pos = (PAGE - 8) as u64;
        ring.tail().store(pos, Ordering::Relaxed);
        produce(&ring, pos, 9, 32, 0x5c);

        assert!(ring.read_init());
        let record = ring.read_event().expect("wrapped record");
        assert_eq!(record.kind, 9);
        assert_eq!(record.bytes.len(), 32);
        assert!(record.bytes[8..].iter().all(|b| *b == 0x5c));
        ring.consume();
        assert!(ring.read_event().is_none());
    }
}
