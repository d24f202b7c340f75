//! Double-sided two-way ranging estimator
//!
//! A ranging round is made up of three messages:
//!
//! ```text
//!   Initiator                      Responder
//!      | tx1 ------- Poll -------> rx1 |
//!      | rx2 <----- Response ----- tx2 |
//!      | tx3 ------- Final ------> rx3 |
//! ```
//!
//! Each node measures one round-trip time and one reply time on its own clock.
//! Combining the four intervals as
//!
//! ```text
//!   tof = (round_a * round_b - reply_a * reply_b)
//!       / (round_a + round_b + reply_a + reply_b)
//! ```
//!
//! cancels the first-order error caused by the two clocks running at slightly
//! different rates, without the clocks being synchronized.
//!
//! Please note that the result is only as good as the antenna delay
//! calibration of both radios. Uncalibrated nodes will report a constant
//! offset on top of the real distance.

#[cfg(feature = "defmt")]
use defmt::Format;

use crate::time::{Instant, WireTimestamp};

/// The six timestamps of one completed exchange
///
/// `tx1`, `rx2` and `tx3` are taken on the Initiator's clock and have crossed
/// the air inside the Final frame, so only their low 32 bits are known.
/// `rx1`, `tx2` and `rx3` are the Responder's own 40-bit captures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangingResult {
    /// Initiator sends the Poll
    pub tx1: Instant,
    /// Responder receives the Poll
    pub rx1: Instant,
    /// Responder sends the Response
    pub tx2: Instant,
    /// Initiator receives the Response
    pub rx2: Instant,
    /// Initiator sends the Final
    pub tx3: Instant,
    /// Responder receives the Final
    pub rx3: Instant,
}

/// The four intervals DS-TWR is computed from, in ticks
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct Intervals {
    /// `rx2 - tx1`, the Initiator's round trip
    pub round_a: i64,
    /// `tx2 - rx1`, the Responder's reply time
    pub reply_a: i64,
    /// `rx3 - tx2`, the Responder's round trip
    pub round_b: i64,
    /// `tx3 - rx2`, the Initiator's reply time
    pub reply_b: i64,
}

impl RangingResult {
    /// Computes the four intervals
    ///
    /// Every timestamp is reduced to the 32 bits that travel on the wire
    /// before subtracting, so all six share one wraparound modulus.
    pub fn intervals(&self) -> Intervals {
        let elapsed = |later: Instant, earlier: Instant| {
            WireTimestamp::from(later).elapsed_since(WireTimestamp::from(earlier))
        };

        Intervals {
            round_a: elapsed(self.rx2, self.tx1),
            reply_a: elapsed(self.tx2, self.rx1),
            round_b: elapsed(self.rx3, self.tx2),
            reply_b: elapsed(self.tx3, self.rx2),
        }
    }

    /// Computes the time of flight in ticks
    pub fn time_of_flight(&self) -> Result<TimeOfFlight, EstimatorError> {
        self.intervals().time_of_flight()
    }

    /// Computes the distance between both nodes in meters
    pub fn distance(&self, calibration: &Calibration) -> Result<f64, EstimatorError> {
        let distance = self.time_of_flight()?.distance(calibration);

        if !distance.is_finite() {
            return Err(EstimatorError::NonFiniteResult);
        }

        Ok(distance)
    }
}

impl Intervals {
    /// Applies the DS-TWR formula
    ///
    /// Rejects the intervals if their sum isn't positive, which only happens
    /// with corrupted timestamps.
    pub fn time_of_flight(&self) -> Result<TimeOfFlight, EstimatorError> {
        // Intervals taken from wire timestamps are sign-extended 32-bit
        // values, but the fields are public and may hold anything.
        let rtt_product = self.round_a as i128 * self.round_b as i128;
        let rt_product = self.reply_a as i128 * self.reply_b as i128;
        let sum = self.round_a as i128
            + self.round_b as i128
            + self.reply_a as i128
            + self.reply_b as i128;

        if sum <= 0 {
            return Err(EstimatorError::NonPositiveDenominator);
        }

        let ticks = (rtt_product - rt_product) as f64 / sum as f64;

        if !ticks.is_finite() {
            return Err(EstimatorError::NonFiniteResult);
        }

        Ok(TimeOfFlight(ticks))
    }
}

/// A one-way time of flight, in (fractional) ticks
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeOfFlight(pub f64);

impl TimeOfFlight {
    /// Returns the time of flight in ticks
    pub fn ticks(&self) -> f64 {
        self.0
    }

    /// Converts the time of flight to seconds
    pub fn seconds(&self, calibration: &Calibration) -> f64 {
        self.0 * calibration.tick_duration_s
    }

    /// Converts the time of flight to a distance in meters
    pub fn distance(&self, calibration: &Calibration) -> f64 {
        self.seconds(calibration) * calibration.propagation_speed
    }
}

/// Calibration parameters of a node
///
/// None of these are protocol constants. The antenna delays in particular
/// differ from device to device and should be measured for every radio.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calibration {
    /// TX antenna delay in ticks, added by the radio to transmit timestamps
    pub tx_antenna_delay: u16,
    /// RX antenna delay in ticks, subtracted by the radio from receive
    /// timestamps
    pub rx_antenna_delay: u16,
    /// Duration of one tick in seconds
    pub tick_duration_s: f64,
    /// Speed of the radio signal in meters per second
    ///
    /// Slightly below the speed of light in vacuum.
    pub propagation_speed: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            tx_antenna_delay: 16385,
            rx_antenna_delay: 16385,
            tick_duration_s: 1.0 / (128.0 * 499.2e6),
            propagation_speed: 299_702_547.0,
        }
    }
}

/// Returned when a set of timestamps can't produce a distance
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EstimatorError {
    /// The sum of round-trip and reply times is zero or negative
    NonPositiveDenominator,
    /// The computation produced an infinite or NaN value
    NonFiniteResult,
}
