//! Time-related types based on the radio's system time
//!
//! The radio counts time in 40-bit ticks of 1/(128*499.2*10^6) seconds
//! (about 15.65 ps). Three views of that counter exist in a ranging exchange:
//!
//! - [`Instant`] and [`Duration`], the full 40-bit values read from the
//!   timestamp registers.
//! - [`WireTimestamp`], the low 32 bits of an `Instant`, which is all the
//!   Final frame has room for.
//! - [`DelayedTime`], the 32-bit delayed-transmit register, which holds bits
//!   8..40 of the transmit time.

use core::ops::{Add, Sub};

#[cfg(feature = "defmt")]
use defmt::Format;

/// The maximum value of 40-bit system time stamps.
pub const TIME_MAX: u64 = 0xffffffffff;

/// Represents an instant in time
///
/// Internally uses the same 40-bit timestamps that the radio uses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates a new instance of `Instant`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if it
    /// isn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dstwr::time::{
    ///     TIME_MAX,
    ///     Instant,
    /// };
    ///
    /// let valid_instant   = Instant::new(TIME_MAX);
    /// let invalid_instant = Instant::new(TIME_MAX + 1);
    ///
    /// assert!(valid_instant.is_some());
    /// assert!(invalid_instant.is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        } else {
            None
        }
    }

    /// Creates an `Instant` from any `u64`, discarding the bits above 40
    ///
    /// This is what the hardware counter itself does when it overflows.
    pub fn wrapping(value: u64) -> Self {
        Instant(value & TIME_MAX)
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the amount of time passed between the two `Instant`s
    ///
    /// Assumes that `&self` represents a later time than the argument
    /// `earlier`. Please make sure that this is the case, as this method has no
    /// way of knowing (timestamps can overflow, so comparing the numerical
    /// value of the timestamp doesn't tell anything about order).
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dstwr::time::{
    ///     TIME_MAX,
    ///     Instant,
    /// };
    ///
    /// // `unwrap`ing here is okay, since we're passing constants that we know
    /// // are in the valid range.
    /// let instant_1 = Instant::new(TIME_MAX - 50).unwrap();
    /// let instant_2 = Instant::new(TIME_MAX).unwrap();
    /// let instant_3 = Instant::new(49).unwrap();
    ///
    /// // Works as expected, if the later timestamp is larger than the earlier
    /// // one.
    /// let duration = instant_2.duration_since(instant_1);
    /// assert_eq!(duration.value(), 50);
    ///
    /// // Still works as expected, if the later timestamp is the numerically
    /// // smaller value.
    /// let duration = instant_3.duration_since(instant_2);
    /// assert_eq!(duration.value(), 50);
    /// ```
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration(self.0.wrapping_sub(earlier.0) & TIME_MAX)
    }

    /// Truncates this instant to the 32 bits carried on the wire
    pub fn to_wire(&self) -> WireTimestamp {
        WireTimestamp(self.0 as u32)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Both operands hold 40-bit numbers, so the sum can't overflow a u64.
        Instant((self.0 + rhs.0) & TIME_MAX)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Self::Output {
        Instant(self.0.wrapping_sub(rhs.0) & TIME_MAX)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Self::Output {
        self.duration_since(rhs)
    }
}

impl From<WireTimestamp> for Instant {
    /// Widens a wire timestamp; the upper 8 bits are unknown and set to zero
    fn from(wire: WireTimestamp) -> Self {
        Instant(wire.0 as u64)
    }
}

/// A duration between two instants in radio system time
///
/// Internally uses the same 40-bit timestamps that the radio uses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a new instance of `Duration`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if it
    /// isn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dstwr::time::{
    ///     TIME_MAX,
    ///     Duration,
    /// };
    ///
    /// let valid_duration   = Duration::new(TIME_MAX);
    /// let invalid_duration = Duration::new(TIME_MAX + 1);
    ///
    /// assert!(valid_duration.is_some());
    /// assert!(invalid_duration.is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        } else {
            None
        }
    }

    /// Creates a `Duration` from a number of UWB microseconds
    ///
    /// A UWB microsecond (UUS) is 512/499.2 µs. DecaWave radios express their
    /// timeouts and reply delays in that unit. The conversion factor to ticks
    /// depends on the hardware (63898 for the DW3000).
    ///
    /// `uus` and `ticks_per_uus` take up at most 32 bits each, so the product
    /// fits a u64. It wraps at 40 bits, see [`Config::validate`] for the
    /// range a turnaround has to stay in.
    ///
    /// [`Config::validate`]: crate::Config::validate
    pub fn from_uus(uus: u32, ticks_per_uus: u32) -> Self {
        Duration((uus as u64 * ticks_per_uus as u64) & TIME_MAX)
    }

    /// Creates a `Duration` from a 16-bit antenna delay register value
    pub fn from_antenna_delay(delay: u16) -> Self {
        Duration(delay.into())
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// The low 32 bits of a 40-bit timestamp
///
/// The Final frame carries timestamps in this form. Since the turnaround
/// delays of an exchange are in the order of milliseconds and 2^32 ticks are
/// about 67 ms, differences between wire timestamps are still unambiguous.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct WireTimestamp(u32);

impl WireTimestamp {
    /// Creates a wire timestamp from its raw value
    pub const fn new(value: u32) -> Self {
        WireTimestamp(value)
    }

    /// Returns the raw 32-bit value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the signed number of ticks from `earlier` to `self`
    ///
    /// The subtraction is done modulo 2^32, so a counter wrap between the two
    /// captures still yields the small positive duration. A negative result
    /// means `earlier` was actually captured later, which never happens within
    /// one valid exchange.
    ///
    /// ``` rust
    /// use dstwr::time::WireTimestamp;
    ///
    /// let before_wrap = WireTimestamp::new(u32::MAX - 9);
    /// let after_wrap = WireTimestamp::new(20);
    ///
    /// assert_eq!(after_wrap.elapsed_since(before_wrap), 30);
    /// assert_eq!(before_wrap.elapsed_since(after_wrap), -30);
    /// ```
    pub fn elapsed_since(&self, earlier: WireTimestamp) -> i64 {
        self.0.wrapping_sub(earlier.0) as i32 as i64
    }
}

impl From<Instant> for WireTimestamp {
    fn from(instant: Instant) -> Self {
        instant.to_wire()
    }
}

/// Value of the delayed transmit register
///
/// The register holds bits 8 to 39 of the transmit time, and the radio ignores
/// its lowest bit, so a delayed transmission starts on a 512-tick boundary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct DelayedTime(u32);

impl DelayedTime {
    /// The delayed transmit time closest to (at or before) `instant`
    pub fn at(instant: Instant) -> Self {
        DelayedTime((instant.value() >> 8) as u32)
    }

    /// Returns the raw register value
    pub fn register_value(&self) -> u32 {
        self.0
    }

    /// The transmit timestamp the radio will report for this transmission
    ///
    /// The radio starts on the register value with the lowest bit cleared and
    /// adds the TX antenna delay to the timestamp it reports, so the time can be
    /// embedded in a frame before the frame is sent.
    pub fn tx_timestamp(&self, tx_antenna_delay: Duration) -> Instant {
        Instant(((self.0 & !1) as u64) << 8) + tx_antenna_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_add_duration() {
        let instant = Instant::new(0).unwrap();
        let duration = Duration::new(1).unwrap();

        let result = instant + duration;

        assert_eq!(result.value(), 1);
    }

    #[test]
    fn instant_add_duration_wraps() {
        let instant = Instant::new(TIME_MAX - 1).unwrap();
        let duration = Duration::new(5).unwrap();

        assert_eq!((instant + duration).value(), 3);
    }

    #[test]
    fn instant_sub_duration() {
        let instant = Instant::new(1).unwrap();
        let duration = Duration::new(1).unwrap();

        let result = instant - duration;

        assert_eq!(result.value(), 0);
    }

    #[test]
    fn instant_sub_duration_wraps() {
        let instant = Instant::new(2).unwrap();
        let duration = Duration::new(5).unwrap();

        assert_eq!((instant - duration).value(), TIME_MAX - 2);
    }

    #[test]
    fn instant_sub_instant() {
        let instant_1 = Instant::new(1).unwrap();
        let instant_2 = Instant::new(0).unwrap();

        let result = instant_1 - instant_2;

        assert_eq!(result.value(), 1);
    }

    #[test]
    fn instant_duration_since() {
        let instant_1 = Instant::new(1).unwrap();
        let instant_2 = Instant::new(0).unwrap();

        let result = instant_1.duration_since(instant_2);

        assert_eq!(result.value(), 1);
    }

    #[test]
    fn duration_since_straddles_counter_maximum() {
        let earlier = Instant::new(TIME_MAX - 999).unwrap();
        let later = Instant::wrapping(TIME_MAX + 1 + 500);

        assert_eq!(later.value(), 500);
        assert_eq!(later.duration_since(earlier).value(), 1500);
    }

    #[test]
    fn wire_elapsed_straddles_32_bit_boundary() {
        let earlier = Instant::new(0x01_ffff_ff00).unwrap();
        let later = earlier + Duration::new(0x200).unwrap();

        assert_eq!(later.value(), 0x02_0000_0100);
        assert_eq!(later.to_wire().elapsed_since(earlier.to_wire()), 0x200);
    }

    #[test]
    fn duration_from_uus() {
        let duration = Duration::from_uus(3400, 63898);

        assert_eq!(duration.value(), 217_253_200);
    }

    #[test]
    fn delayed_time_reconstructs_tx_timestamp() {
        let rx = Instant::new(0x12_3456_789a).unwrap();
        let dx = DelayedTime::at(rx);

        assert_eq!(dx.register_value(), 0x1234_5678);

        let antenna = Duration::from_antenna_delay(16385);
        let tx = dx.tx_timestamp(antenna);

        assert_eq!(tx.value(), 0x12_3456_7800 + 16385);
    }

    #[test]
    fn delayed_time_ignores_lowest_register_bit() {
        let dx = DelayedTime::at(Instant::new(0x1_0000_0180).unwrap());

        assert_eq!(dx.register_value(), 0x0100_0001);
        assert_eq!(dx.tx_timestamp(Duration::default()).value(), 0x1_0000_0000);
    }
}
