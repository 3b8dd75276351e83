pub mod buf;

use std::fs::File;
use std::io::{self, ErrorKind};
use std::os::fd::AsRawFd;

use thiserror::Error;
use tracing::warn;

use crate::catalog::Catalog;
use crate::ffi::{bindings as b, syscall, Attr};

use buf::GroupReadBuffer;

/// What a scheduler's counters are attached to.
///
/// The kernel addresses a counter by a `(pid, cpu)` pair where exactly one
/// side is a wildcard: system-wide measurement pins one CPU and watches all
/// processes, per-process measurement pins one pid and follows it across
/// CPUs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    /// All processes on one CPU.
    Cpu(u32),
    /// One process on any CPU.
    Process(u32),
}

impl Target {
    pub(crate) fn pid(&self) -> i32 {
        match self {
            Target::Cpu(_) => -1,
            Target::Process(pid) => *pid as i32,
        }
    }

    pub(crate) fn cpu(&self) -> i32 {
        match self {
            Target::Cpu(cpu) => *cpu as i32,
            Target::Process(_) => -1,
        }
    }
}

#[derive(Error, Debug)]
#[error("failed to open event {name} (0x{encoding:x}) for {target:?}")]
pub struct OpenError {
    name: &'static str,
    encoding: u64,
    target: Target,
    #[source]
    source: io::Error,
}

/// Counter-group lifecycle. Groups open disabled; from there only the
/// transition methods move them between running and paused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GroupState {
    Opened,
    Enabled,
    Disabled,
}

/// One catalog group opened against the kernel: the leader counter, its
/// sibling counters, and the buffer its grouped reads land in.
struct CounterGroup {
    leader: File,
    // Siblings are never touched individually, but dropping them closes the
    // kernel handles, so they are owned here alongside the leader.
    #[allow(dead_code)]
    siblings: Vec<File>,
    read_buf: GroupReadBuffer,
    state: GroupState,
}

impl CounterGroup {
    fn enable(&mut self) -> io::Result<()> {
        syscall::ioctl_enable(&self.leader, b::PERF_IOC_FLAG_GROUP)?;
        self.state = GroupState::Enabled;
        Ok(())
    }

    fn disable(&mut self) -> io::Result<()> {
        if self.state != GroupState::Enabled {
            return Ok(());
        }
        syscall::ioctl_disable(&self.leader, b::PERF_IOC_FLAG_GROUP)?;
        self.state = GroupState::Disabled;
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        syscall::ioctl_reset(&self.leader, b::PERF_IOC_FLAG_GROUP)
    }
}

/// Rotates the catalog's event groups over the PMU for a single target.
///
/// Every catalog group is opened as a kernel counter group (fixed events
/// first, then the group's schedulable events) at construction time and
/// stays open until the scheduler is dropped. At any moment at most one
/// group, the active group, is counting; [`switch_to_next_group`]
/// [Self::switch_to_next_group] hands the hardware to the next one.
///
/// For system-wide measurement each CPU gets its own scheduler instance.
pub struct EventScheduler<'a> {
    catalog: &'a Catalog,
    target: Target,
    groups: Vec<CounterGroup>,
    active_idx: usize,
}

impl<'a> EventScheduler<'a> {
    /// Opens counters for every catalog group. On any failure everything
    /// opened so far is closed and the error names the offending event.
    pub fn open(catalog: &'a Catalog, target: Target) -> Result<Self, OpenError> {
        let mut groups = Vec::with_capacity(catalog.group_count());
        for group_idx in 0..catalog.group_count() {
            groups.push(open_group(catalog, target, group_idx)?);
        }
        Ok(Self {
            catalog,
            target,
            groups,
            active_idx: 0,
        })
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn active_group_idx(&self) -> usize {
        self.active_idx
    }

    /// Clears the counts of every group. Called once before measurement
    /// starts.
    pub fn reset_all_groups(&mut self) -> io::Result<()> {
        for group in &mut self.groups {
            group.reset()?;
        }
        Ok(())
    }

    pub fn enable_active_group(&mut self) -> io::Result<()> {
        self.groups[self.active_idx].enable()
    }

    pub fn disable_active_group(&mut self) -> io::Result<()> {
        self.groups[self.active_idx].disable()
    }

    fn reset_active_group(&mut self) -> io::Result<()> {
        self.groups[self.active_idx].reset()
    }

    /// Hands the PMU to the next group: disable the active group, advance,
    /// reset the new group's counts, enable it.
    ///
    /// A failure to disable is only a warning — the rotation still proceeds
    /// so one stuck ioctl does not starve the remaining groups. Reset or
    /// enable failures surface to the caller. With a single group this
    /// degenerates to reset-and-enable in place.
    pub fn switch_to_next_group(&mut self) -> io::Result<()> {
        if self.groups.is_empty() {
            return Err(ErrorKind::InvalidInput.into());
        }
        if self.groups.len() > 1 {
            if let Err(e) = self.disable_active_group() {
                warn!(
                    group_idx = self.active_idx,
                    scope = ?self.target,
                    error = %e,
                    "failed to stop the active group, switching anyway",
                );
            }
            self.active_idx = (self.active_idx + 1) % self.groups.len();
        }
        self.reset_active_group()?;
        self.enable_active_group()
    }

    /// Reads the active group's counts into its buffer with a single
    /// syscall. Returns the byte count; a short read is reported but left
    /// to the caller to interpret via [`GroupReadBuffer::nr`].
    pub fn read_active_group(&mut self) -> io::Result<usize> {
        let group = &mut self.groups[self.active_idx];
        let bytes = syscall::read(&group.leader, group.read_buf.as_mut_slice())?;
        if bytes != group.read_buf.size() {
            warn!(
                bytes,
                expected = group.read_buf.size(),
                group_idx = self.active_idx,
                "short group read",
            );
        }
        Ok(bytes)
    }

    /// The buffer filled by the last [`read_active_group`][Self::read_active_group].
    pub fn active_read_buf(&self) -> &GroupReadBuffer {
        &self.groups[self.active_idx].read_buf
    }

    /// The schedulable events of the active group (fixed events excluded).
    pub fn active_group_events(&self) -> &[crate::catalog::Event] {
        self.catalog.group(self.active_idx).unwrap_or(&[])
    }
}

fn open_group(
    catalog: &Catalog,
    target: Target,
    group_idx: usize,
) -> Result<CounterGroup, OpenError> {
    let schedulable = catalog.group(group_idx).unwrap_or(&[]);
    let mut leader: Option<File> = None;
    let mut siblings = Vec::with_capacity(catalog.events_in_group(group_idx).saturating_sub(1));

    for event in catalog.fixed_events().iter().chain(schedulable) {
        let is_leader = leader.is_none();
        let group_fd = leader.as_ref().map_or(-1, File::as_raw_fd);
        let mut attr = group_event_attr(event.encoding, is_leader);
        let file = syscall::perf_event_open(
            &mut attr,
            target.pid(),
            target.cpu(),
            group_fd,
            b::PERF_FLAG_FD_CLOEXEC as u64,
        )
        .map_err(|source| OpenError {
            name: event.name,
            encoding: event.encoding,
            target,
            source,
        })?;
        match leader {
            None => leader = Some(file),
            Some(_) => siblings.push(file),
        }
    }

    // Validated catalogs have no empty groups, and fixed events are opened
    // in every group anyway.
    let leader = leader.expect("group must contain at least one event");
    let read_buf = GroupReadBuffer::new(catalog.events_in_group(group_idx));

    Ok(CounterGroup {
        leader,
        siblings,
        read_buf,
        state: GroupState::Opened,
    })
}

fn group_event_attr(encoding: u64, is_leader: bool) -> Attr {
    let mut attr = Attr {
        size: size_of::<Attr>() as _,
        ..Default::default()
    };
    attr.type_ = b::PERF_TYPE_RAW;
    attr.config = encoding;
    attr.read_format = (b::PERF_FORMAT_TOTAL_TIME_ENABLED
        | b::PERF_FORMAT_TOTAL_TIME_RUNNING
        | b::PERF_FORMAT_ID
        | b::PERF_FORMAT_GROUP) as u64;
    // The leader opens disabled and gates the whole group: siblings open
    // enabled but do not count until the leader runs.
    attr.set_disabled(is_leader as u64);
    attr
}
