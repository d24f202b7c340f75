//! Configuration structs for a ranging session
//!
//! This module houses the datastructures that control who ranges with whom,
//! how long each node waits before replying, how timestamps are converted to a
//! distance, and what happens when an exchange fails. The whole [`Config`] is
//! handed to [`Session::new`] once and treated as read-only afterwards.
//!
//! The defaults match the firmware this protocol was first deployed with, so
//! two nodes built with `Config::default()` can range with each other.
//!
//! [`Session::new`]: crate::hl::Session::new

use smoltcp::wire::{Ieee802154Address, Ieee802154Pan};

#[cfg(feature = "defmt")]
use defmt::Format;

use crate::{hl::Role, ranging::Calibration, time::Duration, Error};

/// Everything a node needs to know before it can range
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Network identifier and the fixed pair of node addresses
    pub addressing: Addressing,
    /// Delays and timeouts
    pub timing: Timing,
    /// Antenna delays and the constants the distance estimator needs
    pub calibration: Calibration,
    /// What to do after a failed exchange
    pub retry: RetryPolicy,
}

impl Config {
    /// Checks that the configuration can be used for ranging
    ///
    /// Returns [`Error::InvalidConfiguration`] if a conversion factor or
    /// delay is zero, if both roles share an address, if a calibration
    /// constant isn't positive, or if the turnaround delay is so long that
    /// intervals no longer fit the wire timestamps.
    pub fn validate<E>(&self) -> Result<(), Error<E>> {
        let timing = &self.timing;
        let calibration = &self.calibration;

        if timing.ticks_per_uus == 0 || timing.turnaround_uus == 0 {
            return Err(Error::InvalidConfiguration);
        }
        if self.addressing.initiator == self.addressing.responder {
            return Err(Error::InvalidConfiguration);
        }
        if !(calibration.tick_duration_s > 0.0) || !(calibration.propagation_speed > 0.0) {
            return Err(Error::InvalidConfiguration);
        }
        let turnaround_ticks = timing.turnaround_uus as u64 * timing.ticks_per_uus as u64;
        if turnaround_ticks >= i32::MAX as u64 {
            return Err(Error::InvalidConfiguration);
        }
        if let Some(0) = self.retry.max_attempts {
            return Err(Error::InvalidConfiguration);
        }

        Ok(())
    }
}

/// Network identifier and node addresses
///
/// Exactly one Initiator/Responder pair ranges on a network, so both addresses
/// are fixed here.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Addressing {
    /// The PAN identifier both nodes use
    pub network_id: u16,
    /// Short address of the node that sends the Poll
    pub initiator: u16,
    /// Short address of the node that answers it
    pub responder: u16,
}

impl Default for Addressing {
    fn default() -> Self {
        Addressing {
            network_id: 0xDECA,
            initiator: 0x4556,
            responder: 0x4157,
        }
    }
}

impl Addressing {
    /// Returns the network id as an IEEE 802.15.4 PAN
    pub fn pan(&self) -> Ieee802154Pan {
        Ieee802154Pan(self.network_id)
    }

    /// Returns the short address of the node playing `role`
    pub fn address_of(&self, role: Role) -> Ieee802154Address {
        let short = match role {
            Role::Initiator => self.initiator,
            Role::Responder => self.responder,
        };

        Ieee802154Address::Short(short.to_be_bytes())
    }

    /// Returns the own and the peer address for a node playing `role`
    pub fn link(&self, role: Role) -> Link {
        Link {
            network_id: self.pan(),
            own: self.address_of(role),
            peer: self.address_of(role.peer()),
        }
    }
}

/// The addresses seen from one end of the exchange
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Link {
    /// The PAN both nodes are on
    pub network_id: Ieee802154Pan,
    /// This node's address
    pub own: Ieee802154Address,
    /// The other node's address
    pub peer: Ieee802154Address,
}

/// Delays and timeouts
///
/// All of these are written to the radio once, at startup, except for the
/// turnaround delay which the state machine adds to every receive timestamp.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timing {
    /// Delay between receiving a frame and sending the reply, in UUS
    pub turnaround_uus: u32,
    /// Ticks per UWB microsecond
    pub ticks_per_uus: u32,
    /// Delay between the end of a transmission and the receiver turning on
    /// when a response is expected, in UUS
    pub rx_after_tx_delay_uus: u32,
    /// Receive timeout in UUS. Zero disables it.
    pub rx_timeout_uus: u32,
    /// Preamble detection timeout, in preamble acquisition chunks
    pub preamble_timeout_pac: u16,
    /// Time the Initiator waits between two rounds, in milliseconds
    pub ranging_interval_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            turnaround_uus: 3400,
            ticks_per_uus: 63898,
            rx_after_tx_delay_uus: 700,
            rx_timeout_uus: 0,
            preamble_timeout_pac: 65000,
            ranging_interval_ms: 1000,
        }
    }
}

impl Timing {
    /// The turnaround delay in ticks
    pub fn turnaround(&self) -> Duration {
        Duration::from_uus(self.turnaround_uus, self.ticks_per_uus)
    }
}

/// Policy for failed exchanges
///
/// The default retries forever and right away. Bounding the attempts is
/// mostly useful for tests and for nodes that should give up on an absent
/// peer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Number of consecutive failures after which the session halts.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before restarting after a failure
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Returns true if `failures` consecutive failures exhaust the policy
    pub fn is_exhausted(&self, failures: u32) -> bool {
        matches!(self.max_attempts, Some(max) if failures >= max)
    }
}

/// Backoff curve between retries
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Backoff {
    /// Restart right away
    #[default]
    None,
    /// Always wait the same time
    Fixed {
        /// Delay in milliseconds
        delay_ms: u32,
    },
    /// Wait `step_ms` longer after every consecutive failure, up to `max_ms`
    Linear {
        /// Increment per failure in milliseconds
        step_ms: u32,
        /// Upper bound in milliseconds
        max_ms: u32,
    },
}

impl Backoff {
    /// Delay before the retry that follows the `failures`-th consecutive failure
    pub fn delay_ms(&self, failures: u32) -> u32 {
        match *self {
            Backoff::None => 0,
            Backoff::Fixed { delay_ms } => delay_ms,
            Backoff::Linear { step_ms, max_ms } => step_ms.saturating_mul(failures).min(max_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate::<()>().is_ok());
    }

    #[test]
    fn default_addresses_match_wire_bytes() {
        let addressing = Addressing::default();

        assert_eq!(
            addressing.address_of(Role::Initiator),
            Ieee802154Address::Short([0x45, 0x56])
        );
        assert_eq!(
            addressing.link(Role::Responder),
            Link {
                network_id: Ieee802154Pan(0xDECA),
                own: Ieee802154Address::Short([0x41, 0x57]),
                peer: Ieee802154Address::Short([0x45, 0x56]),
            }
        );
    }

    #[test]
    fn rejects_shared_address() {
        let mut config = Config::default();
        config.addressing.responder = config.addressing.initiator;

        assert!(matches!(
            config.validate::<()>(),
            Err(Error::InvalidConfiguration)
        ));
    }

    #[test]
    fn rejects_zero_conversion_factor() {
        let mut config = Config::default();
        config.timing.ticks_per_uus = 0;

        assert!(config.validate::<()>().is_err());
    }

    #[test]
    fn rejects_turnaround_beyond_wire_range() {
        let mut config = Config::default();
        config.timing.turnaround_uus = 40_000;

        assert!(config.validate::<()>().is_err());
    }

    #[test]
    fn rejects_turnaround_that_wraps_the_clock() {
        let mut config = Config::default();
        config.timing.turnaround_uus = 17_207_402;

        // The 40-bit duration wraps around to a short delay.
        assert!(config.timing.turnaround().value() < i32::MAX as u64);
        assert!(matches!(
            config.validate::<()>(),
            Err(Error::InvalidConfiguration)
        ));
    }

    #[test]
    fn rejects_non_positive_calibration() {
        let mut config = Config::default();
        config.calibration.propagation_speed = 0.0;

        assert!(config.validate::<()>().is_err());
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut config = Config::default();
        config.retry.max_attempts = Some(0);

        assert!(config.validate::<()>().is_err());
    }

    #[test]
    fn backoff_curves() {
        assert_eq!(Backoff::None.delay_ms(3), 0);
        assert_eq!(Backoff::Fixed { delay_ms: 20 }.delay_ms(3), 20);

        let linear = Backoff::Linear {
            step_ms: 10,
            max_ms: 25,
        };
        assert_eq!(linear.delay_ms(1), 10);
        assert_eq!(linear.delay_ms(2), 20);
        assert_eq!(linear.delay_ms(3), 25);
    }

    #[test]
    fn retry_policy_exhaustion() {
        let unbounded = RetryPolicy::default();
        assert!(!unbounded.is_exhausted(u32::MAX));

        let bounded = RetryPolicy {
            max_attempts: Some(3),
            backoff: Backoff::None,
        };
        assert!(!bounded.is_exhausted(2));
        assert!(bounded.is_exhausted(3));
    }
}
