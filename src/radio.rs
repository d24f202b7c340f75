//! The radio interface the ranging state machine is driven through
//!
//! This is the narrow slice of a UWB transceiver driver that DS-TWR needs:
//! loading and sending frames (right away or at a precise time), receiving
//! them, and reading back the timestamps the radio captured. Channel and PHY
//! setup, SPI access and interrupt wiring stay with the driver implementing
//! [`Radio`].
//!
//! Events reach the state machine in one of two ways. In the interrupt-driven
//! realization, the application's interrupt handler translates the radio's
//! status flags into a [`RadioEvent`] and passes it to
//! [`Session::handle_event`]. In the polling realization, the radio also
//! implements [`PollingRadio`] and the session busy-waits on it.
//!
//! [`Session::handle_event`]: crate::hl::Session::handle_event

use core::fmt;

#[cfg(feature = "defmt")]
use defmt::Format;

use crate::{
    time::{DelayedTime, Instant},
    Config,
};

/// When a loaded frame is sent
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum TxMode {
    /// As soon as possible
    Immediate,
    /// At the time set with [`Radio::set_delayed_transmit_time`]
    Delayed,
}

/// The four conditions the radio signals to the state machine
///
/// `RxGood`, `RxTimeout` and `RxError` are mutually exclusive ways for a
/// receive operation to end.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum RadioEvent {
    /// A frame has been sent
    TxDone,
    /// A frame with a valid FCS has been received
    RxGood,
    /// Nothing was received before the receive or preamble timeout expired
    RxTimeout,
    /// A frame was received but corrupted (PHY header, Reed Solomon, FCS, ...)
    RxError,
}

/// Which events the radio raises
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct Interrupts {
    /// Transmit complete
    pub tx_done: bool,
    /// Good frame received
    pub rx_good: bool,
    /// Receive timed out
    pub rx_timeout: bool,
    /// Receive failed
    pub rx_error: bool,
}

impl Interrupts {
    /// Only receive events
    pub const RECEIVE: Interrupts = Interrupts {
        tx_done: false,
        rx_good: true,
        rx_timeout: true,
        rx_error: true,
    };

    /// Only transmit complete
    pub const TRANSMIT: Interrupts = Interrupts {
        tx_done: true,
        rx_good: false,
        rx_timeout: false,
        rx_error: false,
    };

    /// Every event
    pub const ALL: Interrupts = Interrupts {
        tx_done: true,
        rx_good: true,
        rx_timeout: true,
        rx_error: true,
    };

    /// Returns true if `event` is raised with this mask
    pub fn raises(&self, event: RadioEvent) -> bool {
        match event {
            RadioEvent::TxDone => self.tx_done,
            RadioEvent::RxGood => self.rx_good,
            RadioEvent::RxTimeout => self.rx_timeout,
            RadioEvent::RxError => self.rx_error,
        }
    }
}

/// A UWB transceiver, as seen by the ranging state machine
///
/// Implementations are expected to be thin wrappers around a device driver.
/// Any method may fail with `Self::Error`; the state machine treats a failure
/// during an exchange like a lost frame and starts over.
pub trait Radio {
    /// The error type of the underlying driver
    type Error: fmt::Debug;

    /// Applies the parameters that are written once at startup
    ///
    /// That is the antenna delays, the delay between the end of a
    /// transmission and the receiver turning on, the receive timeout and the
    /// preamble detection timeout. A failure here is fatal.
    fn configure(&mut self, config: &Config) -> Result<(), Self::Error>;

    /// Selects the events the radio raises
    fn set_interrupts(&mut self, interrupts: Interrupts) -> Result<(), Self::Error>;

    /// Copies `data` into the transmit buffer at `offset`
    fn write_frame_data(&mut self, data: &[u8], offset: u16) -> Result<(), Self::Error>;

    /// Sets the length of the next frame, including the FCS, and whether it
    /// is a ranging frame
    fn write_frame_control(&mut self, len: u16, ranging: bool) -> Result<(), Self::Error>;

    /// Sets the time at which the next delayed transmission starts
    fn set_delayed_transmit_time(&mut self, time: DelayedTime) -> Result<(), Self::Error>;

    /// Starts sending the loaded frame
    ///
    /// With `response_expected`, the receiver turns on by itself once the
    /// frame is out. Returns an error if the radio rejects the request, for
    /// example because a delayed transmit time has already passed.
    fn start_transmit(&mut self, mode: TxMode, response_expected: bool)
        -> Result<(), Self::Error>;

    /// Turns the receiver on right away
    fn enable_receive(&mut self) -> Result<(), Self::Error>;

    /// Returns the length of the last received frame, including the FCS
    fn read_frame_length(&mut self) -> Result<u16, Self::Error>;

    /// Copies the last received frame into `buffer`
    ///
    /// Copies `buffer.len()` bytes at most.
    fn read_frame_data(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Returns the timestamp of the last transmission
    fn read_tx_timestamp(&mut self) -> Result<Instant, Self::Error>;

    /// Returns the timestamp of the last reception
    fn read_rx_timestamp(&mut self) -> Result<Instant, Self::Error>;
}

/// A radio that can be asked for its next event instead of interrupting
pub trait PollingRadio: Radio {
    /// Returns the next event, or `WouldBlock` if nothing happened yet
    ///
    /// Reading an event clears it. Only events enabled with
    /// [`Radio::set_interrupts`] are returned.
    fn poll_event(&mut self) -> nb::Result<RadioEvent, Self::Error>;
}

impl<R: Radio + ?Sized> Radio for &mut R {
    type Error = R::Error;

    fn configure(&mut self, config: &Config) -> Result<(), Self::Error> {
        (**self).configure(config)
    }

    fn set_interrupts(&mut self, interrupts: Interrupts) -> Result<(), Self::Error> {
        (**self).set_interrupts(interrupts)
    }

    fn write_frame_data(&mut self, data: &[u8], offset: u16) -> Result<(), Self::Error> {
        (**self).write_frame_data(data, offset)
    }

    fn write_frame_control(&mut self, len: u16, ranging: bool) -> Result<(), Self::Error> {
        (**self).write_frame_control(len, ranging)
    }

    fn set_delayed_transmit_time(&mut self, time: DelayedTime) -> Result<(), Self::Error> {
        (**self).set_delayed_transmit_time(time)
    }

    fn start_transmit(
        &mut self,
        mode: TxMode,
        response_expected: bool,
    ) -> Result<(), Self::Error> {
        (**self).start_transmit(mode, response_expected)
    }

    fn enable_receive(&mut self) -> Result<(), Self::Error> {
        (**self).enable_receive()
    }

    fn read_frame_length(&mut self) -> Result<u16, Self::Error> {
        (**self).read_frame_length()
    }

    fn read_frame_data(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        (**self).read_frame_data(buffer)
    }

    fn read_tx_timestamp(&mut self) -> Result<Instant, Self::Error> {
        (**self).read_tx_timestamp()
    }

    fn read_rx_timestamp(&mut self) -> Result<Instant, Self::Error> {
        (**self).read_rx_timestamp()
    }
}

impl<R: PollingRadio + ?Sized> PollingRadio for &mut R {
    fn poll_event(&mut self) -> nb::Result<RadioEvent, Self::Error> {
        (**self).poll_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_masks() {
        assert!(Interrupts::RECEIVE.raises(RadioEvent::RxTimeout));
        assert!(!Interrupts::RECEIVE.raises(RadioEvent::TxDone));
        assert!(Interrupts::TRANSMIT.raises(RadioEvent::TxDone));
        assert!(!Interrupts::TRANSMIT.raises(RadioEvent::RxGood));
        assert!(!Interrupts::default().raises(RadioEvent::RxError));
    }
}
