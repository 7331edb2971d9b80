/// A simple slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and
/// returns stable indices that can be reused after removal.
///
/// The reactor uses it to map poller tokens back to the descriptor
/// records they were registered for. Lookups are checked: a token
/// whose slot was released yields `None` instead of a stale value.
pub(crate) struct Slab<T> {
    /// Storage for items, `None` marking a free slot.
    entries: Vec<Option<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with `size` preallocated free slots.
    pub(crate) fn new(size: usize) -> Self {
        let entries = (0..size).map(|_| None).collect();
        let free = (0..size).rev().collect();

        Self { entries, free }
    }

    /// Inserts a value into the slab and returns its index.
    ///
    /// If a free slot is available, it is reused.
    /// Otherwise, the slab grows exponentially.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                let len = self.entries.len();
                let new_len = if len == 0 { 1 } else { 2 * len };

                self.entries.resize_with(new_len, || None);
                self.free.extend(((len + 1)..new_len).rev());

                len
            }
        };

        self.entries[index] = Some(item);

        index
    }

    /// Removes and returns the value stored at `index`.
    ///
    /// Returns `None` if the index is out of range or the slot is free.
    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.entries.get_mut(index)?.take()?;
        self.free.push(index);

        Some(item)
    }

    /// Returns a reference to the value at `index`, if the slot is in use.
    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)?.as_ref()
    }

    /// Iterates over all occupied slots.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (i, item)))
    }
}
