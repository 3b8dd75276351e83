use crate::ffi::deref_offset;

// https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L344
//
// With `PERF_FORMAT_TOTAL_TIME_ENABLED | PERF_FORMAT_TOTAL_TIME_RUNNING |
// PERF_FORMAT_ID | PERF_FORMAT_GROUP` a group-leader read yields:
//
// struct read_format {
//     u64 nr;
//     u64 time_enabled;
//     u64 time_running;
//     { u64 value; u64 id; } cntr[nr];
// };
const GROUP_HEADER_SIZE: usize = 3 * size_of::<u64>();
const GROUP_ENTRY_SIZE: usize = 2 * size_of::<u64>();

/// One `{value, id}` pair from a group read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountEntry {
    pub value: u64,
    pub id: u64,
}

/// Reusable destination for group-leader reads.
///
/// Holds the raw bytes the kernel wrote on the last `read(2)` and exposes
/// them through the grouped read format above. One buffer exists per event
/// group and is sized at open time for `nr` events, so a full read is always
/// `24 + 16 * nr` bytes.
pub struct GroupReadBuffer {
    buf: Vec<u8>,
}

impl GroupReadBuffer {
    pub fn new(event_count: usize) -> Self {
        Self {
            buf: vec![0; GROUP_HEADER_SIZE + event_count * GROUP_ENTRY_SIZE],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Expected byte count of a full group read.
    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// The number of events in the group, as reported by the kernel.
    pub fn nr(&self) -> u64 {
        let mut ptr = self.buf.as_ptr();
        unsafe { deref_offset(&mut ptr) }
    }

    pub fn time_enabled(&self) -> u64 {
        let mut ptr = self.buf.as_ptr();
        unsafe {
            deref_offset::<u64>(&mut ptr);
            deref_offset(&mut ptr)
        }
    }

    pub fn time_running(&self) -> u64 {
        let mut ptr = self.buf.as_ptr();
        unsafe {
            deref_offset::<u64>(&mut ptr);
            deref_offset::<u64>(&mut ptr);
            deref_offset(&mut ptr)
        }
    }

    /// Count entry by group slot, `None` past the kernel-reported `nr`.
    pub fn entry(&self, idx: usize) -> Option<CountEntry> {
        if idx as u64 >= self.nr() {
            return None;
        }
        let offset = GROUP_HEADER_SIZE + idx * GROUP_ENTRY_SIZE;
        if offset + GROUP_ENTRY_SIZE > self.buf.len() {
            return None;
        }
        let mut ptr = self.buf[offset..].as_ptr();
        let value = unsafe { deref_offset(&mut ptr) };
        let id = unsafe { deref_offset(&mut ptr) };
        Some(CountEntry { value, id })
    }
}

// Single-event read with `PERF_FORMAT_TOTAL_TIME_ENABLED |
// PERF_FORMAT_TOTAL_TIME_RUNNING | PERF_FORMAT_ID`:
//
// struct read_format {
//     u64 value;
//     u64 time_enabled;
//     u64 time_running;
//     u64 id;
// };
const SINGLE_SIZE: usize = 4 * size_of::<u64>();

/// Destination for non-grouped reads, used by the counter detector to
/// compare `time_enabled` against `time_running` per probe.
pub struct SingleReadBuffer {
    buf: [u8; SINGLE_SIZE],
}

impl SingleReadBuffer {
    pub fn new() -> Self {
        Self {
            buf: [0; SINGLE_SIZE],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    fn field(&self, idx: usize) -> u64 {
        let mut ptr = self.buf[idx * size_of::<u64>()..].as_ptr();
        unsafe { deref_offset(&mut ptr) }
    }

    pub fn value(&self) -> u64 {
        self.field(0)
    }

    pub fn time_enabled(&self) -> u64 {
        self.field(1)
    }

    pub fn time_running(&self) -> u64 {
        self.field(2)
    }

    pub fn id(&self) -> u64 {
        self.field(3)
    }
}

impl Default for SingleReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}
