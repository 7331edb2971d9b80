use crate::source::EventSourceFd;

use std::collections::VecDeque;

/// Descriptors awaiting dispatch, most urgent first.
///
/// Entries are ordered by the priority of their owning source, lower
/// values first. Equal priorities keep arrival order: a new entry goes
/// after every entry of equal or more urgent priority.
#[derive(Default)]
pub(crate) struct PendingQueue {
    entries: VecDeque<EventSourceFd>,
}

impl PendingQueue {
    /// Inserts `fd` at its priority position.
    pub(crate) fn insert(&mut self, fd: EventSourceFd) {
        let priority = fd.priority();
        let index = self
            .entries
            .iter()
            .position(|queued| queued.priority() > priority)
            .unwrap_or(self.entries.len());

        self.entries.insert(index, fd);
    }

    /// Returns the most urgent entry.
    pub(crate) fn front(&self) -> Option<EventSourceFd> {
        self.entries.front().cloned()
    }

    /// Removes `fd` if queued. Returns whether it was.
    pub(crate) fn remove(&mut self, fd: &EventSourceFd) -> bool {
        match self.entries.iter().position(|queued| queued == fd) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = EventSourceFd> + '_ {
        self.entries.drain(..)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
