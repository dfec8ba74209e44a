//! Core types for the replication layer.

use std::fmt;

/// A simulation tick number.
///
/// Ticks are monotonically increasing identifiers for fixed simulation steps.
/// Host ticks tag every update; the client clock is compared against them to
/// decide when a buffered update may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(u32);

impl Tick {
    /// Creates a new tick.
    #[must_use]
    pub const fn new(tick: u32) -> Self {
        Self(tick)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if this tick is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// The following tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// This tick moved back by `ticks`, stopping at zero.
    #[must_use]
    pub const fn saturating_sub(self, ticks: u32) -> Self {
        Self(self.0.saturating_sub(ticks))
    }
}

impl From<u32> for Tick {
    fn from(tick: u32) -> Self {
        Self(tick)
    }
}

impl From<Tick> for u32 {
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one connected client on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClientId(u32);

impl ClientId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_new() {
        let tick = Tick::new(100);
        assert_eq!(tick.raw(), 100);
        assert!(!tick.is_zero());
        assert!(Tick::default().is_zero());
    }

    #[test]
    fn tick_conversions() {
        let tick: Tick = 42u32.into();
        let raw: u32 = tick.into();
        assert_eq!(raw, 42);
    }

    #[test]
    fn tick_ordering() {
        assert!(Tick::new(1) < Tick::new(2));
        assert!(Tick::new(2) >= Tick::new(2));
    }

    #[test]
    fn tick_arithmetic() {
        assert_eq!(Tick::new(7).next(), Tick::new(8));
        assert_eq!(Tick::new(u32::MAX).next(), Tick::new(0));
        assert_eq!(Tick::new(3).saturating_sub(5), Tick::new(0));
        assert_eq!(Tick::new(10).saturating_sub(4), Tick::new(6));
    }

    #[test]
    fn tick_const() {
        const TICK: Tick = Tick::new(42);
        assert_eq!(TICK.raw(), 42);
    }

    #[test]
    fn client_id_display() {
        assert_eq!(ClientId::new(3).to_string(), "client-3");
        assert_eq!(ClientId::new(3).raw(), 3);
    }
}
