mod cortex_x4;
mod oryon;
#[cfg(test)]
mod test;

use clap::ValueEnum;
use thiserror::Error;

/// A PMU event as the kernel sees it: a raw selector plus the names we
/// report it under.
#[derive(Clone, Copy, Debug)]
pub struct Event {
    pub name: &'static str,
    pub description: &'static str,
    pub encoding: u64,
}

/// CPU models with a shipped event catalog.
///
/// The catalog (and the derived-metric formulas in the reporter) vary per
/// model; everything else is model-independent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CpuModel {
    Oryon,
    CortexX4,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("the catalog has no fixed events")]
    NoFixedEvents,
    #[error("the catalog has no event groups")]
    NoGroups,
    #[error("event group {0} is empty")]
    EmptyGroup(usize),
}

/// The per-model event configuration: fixed events measured in every group,
/// and candidate groups of schedulable events.
///
/// The catalog is loaded once at startup and, apart from one optional
/// [`adaptive_grouping`][Catalog::adaptive_grouping] rewrite before any
/// counters are opened, never mutated.
pub struct Catalog {
    fixed: Vec<Event>,
    groups: Vec<Vec<Event>>,
}

impl Catalog {
    /// Builds a catalog from explicit tables. The shipped per-model tables
    /// come from [`for_model`][Self::for_model]; this is the entry point for
    /// supplying your own.
    pub fn new(fixed: Vec<Event>, groups: Vec<Vec<Event>>) -> Self {
        Self { fixed, groups }
    }

    pub fn for_model(model: CpuModel) -> Self {
        match model {
            CpuModel::Oryon => oryon::catalog(),
            CpuModel::CortexX4 => cortex_x4::catalog(),
        }
    }

    /// A catalog is usable only if every group can contribute counts.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.fixed.is_empty() {
            return Err(CatalogError::NoFixedEvents);
        }
        if self.groups.is_empty() {
            return Err(CatalogError::NoGroups);
        }
        for (idx, group) in self.groups.iter().enumerate() {
            if group.is_empty() {
                return Err(CatalogError::EmptyGroup(idx));
            }
        }
        Ok(())
    }

    pub fn fixed_events(&self) -> &[Event] {
        &self.fixed
    }

    pub fn groups(&self) -> &[Vec<Event>] {
        &self.groups
    }

    pub fn group(&self, idx: usize) -> Option<&[Event]> {
        self.groups.get(idx).map(Vec::as_slice)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total events opened per group: the fixed events are inserted at the
    /// head of every group so each group self-contains its reference counts.
    pub fn events_in_group(&self, group_idx: usize) -> usize {
        self.fixed.len() + self.groups.get(group_idx).map_or(0, Vec::len)
    }

    /// Event by group and slot, where slots `0..fixed.len()` are the fixed
    /// events and the rest index into the group.
    pub fn event(&self, group_idx: usize, slot: usize) -> Option<&Event> {
        let group = self.groups.get(group_idx)?;
        if slot < self.fixed.len() {
            self.fixed.get(slot)
        } else {
            group.get(slot - self.fixed.len())
        }
    }

    /// Greedy smallest-first group merging.
    ///
    /// Repeatedly takes the smallest group and merges it with the partner
    /// yielding the smallest union (by distinct encoding), as long as that
    /// union still fits in `budget` schedulable counters. Fewer groups means
    /// fewer rotation slices, so each event is live for a larger share of
    /// the measurement window.
    ///
    /// `budget` is the detected programmable-counter capacity minus the
    /// fixed-event count.
    pub fn adaptive_grouping(&mut self, budget: usize) {
        loop {
            if self.groups.len() < 2 {
                break;
            }

            let mut smallest = 0;
            for i in 1..self.groups.len() {
                if self.groups[i].len() < self.groups[smallest].len() {
                    smallest = i;
                }
            }

            let mut partner = usize::MAX;
            let mut union_size = usize::MAX;
            for i in 0..self.groups.len() {
                if i == smallest {
                    continue;
                }
                // Ties go to the later candidate.
                let current = union_by_encoding(&self.groups[smallest], &self.groups[i]).len();
                if current <= union_size {
                    union_size = current;
                    partner = i;
                }
            }

            if union_size > budget {
                break;
            }

            let merged = union_by_encoding(&self.groups[smallest], &self.groups[partner]);
            let (lo, hi) = if smallest < partner {
                (smallest, partner)
            } else {
                (partner, smallest)
            };
            self.groups.remove(hi);
            self.groups.remove(lo);
            self.groups.push(merged);
        }
    }
}

/// Set union over the events' raw encodings. Two events with the same
/// encoding occupy the same hardware slot, so one representative survives,
/// taken from the first operand.
pub fn union_by_encoding(a: &[Event], b: &[Event]) -> Vec<Event> {
    let mut merged: Vec<Event> = a.iter().chain(b.iter()).copied().collect();
    // Stable sort keeps `a`'s copy in front of `b`'s on equal encodings.
    merged.sort_by_key(|event| event.encoding);
    merged.dedup_by_key(|event| event.encoding);
    merged
}
