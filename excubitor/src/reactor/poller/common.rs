use bitflags::bitflags;

bitflags! {
    /// A set of readiness conditions.
    ///
    /// The same type describes what a descriptor is subscribed to (its
    /// *interest*) and what the poller reported for it (its *ready* mask).
    /// [`ERROR`](Self::ERROR) and [`HANGUP`](Self::HANGUP) are always
    /// reported by the kernel and never need to be requested.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Interest: u32 {
        /// Data is available for reading.
        const READABLE = 1 << 0;
        /// Writing will not block.
        const WRITABLE = 1 << 1;
        /// Out-of-band or priority data is available.
        const PRIORITY = 1 << 2;
        /// An error condition happened on the descriptor.
        const ERROR = 1 << 3;
        /// The peer hung up.
        const HANGUP = 1 << 4;
        /// The peer shut down its writing half.
        const READ_HANGUP = 1 << 5;
    }
}

impl Interest {
    /// No condition.
    pub const NONE: Interest = Interest::empty();

    pub const fn is_readable(self) -> bool {
        self.intersects(Self::READABLE)
    }

    pub const fn is_writable(self) -> bool {
        self.intersects(Self::WRITABLE)
    }

    pub const fn is_error(self) -> bool {
        self.intersects(Self::ERROR)
    }

    pub const fn is_hangup(self) -> bool {
        self.intersects(Self::HANGUP.union(Self::READ_HANGUP))
    }
}
