//! A radio that lives in memory, for tests
//!
//! [`MockRadio`] records what the state machine asks of it, can be told to
//! reject transmissions, and hands out scripted events when polled. [`Air`]
//! carries frames between two mock radios with a fixed time of flight, each
//! radio counting time on its own offset clock.

use std::collections::VecDeque;

use crate::{
    frame::FCS_LEN,
    hl::RangingHandler,
    radio::{Interrupts, PollingRadio, Radio, RadioEvent, TxMode},
    ranging::RangingResult,
    time::{DelayedTime, Duration, Instant},
    Config,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MockError {
    Configuration,
    Rejected,
    Bus,
    NoEvent,
}

/// A frame the radio accepted for sending
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Transmission {
    /// The frame without FCS
    pub bytes: Vec<u8>,
    pub mode: TxMode,
    pub delayed: Option<DelayedTime>,
    pub response_expected: bool,
}

#[derive(Debug, Default)]
pub(crate) struct MockRadio {
    pub configured: Option<Config>,
    pub fail_configure: bool,
    pub fail_reads: bool,
    pub interrupts: Interrupts,

    tx_buffer: Vec<u8>,
    tx_len: usize,
    delayed: Option<DelayedTime>,

    /// Everything sent, oldest first
    pub sent: Vec<Transmission>,
    /// Accepted but not yet carried by the [`Air`]
    pub pending: Option<Transmission>,
    /// How many of the next transmit requests are rejected
    pub reject_transmits: usize,
    pub rejected: usize,

    pub rx_enabled: bool,
    /// The last received frame, FCS included
    pub rx_frame: Vec<u8>,
    pub rx_timestamp: Instant,
    pub tx_timestamp: Instant,

    /// Events returned by `poll_event`
    pub events: VecDeque<RadioEvent>,
    /// Frames that arrive with the polled `RxGood` events, in order
    pub inbox: VecDeque<(Vec<u8>, Instant)>,
    /// Offset of this radio's clock from the air's, in ticks
    pub clock_offset: u64,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretends a frame arrived at `timestamp`
    pub fn receive(&mut self, frame: &[u8], timestamp: Instant) {
        self.rx_frame = frame.to_vec();
        self.rx_frame.extend_from_slice(&[0; FCS_LEN]);
        self.rx_timestamp = timestamp;
        self.rx_enabled = false;
    }

    fn tx_antenna_delay(&self) -> Duration {
        let delay = self
            .configured
            .map(|config| config.calibration.tx_antenna_delay)
            .unwrap_or_default();

        Duration::from_antenna_delay(delay)
    }

    fn check_bus(&self) -> Result<(), MockError> {
        if self.fail_reads {
            Err(MockError::Bus)
        } else {
            Ok(())
        }
    }
}

impl Radio for MockRadio {
    type Error = MockError;

    fn configure(&mut self, config: &Config) -> Result<(), Self::Error> {
        if self.fail_configure {
            return Err(MockError::Configuration);
        }

        self.configured = Some(*config);
        Ok(())
    }

    fn set_interrupts(&mut self, interrupts: Interrupts) -> Result<(), Self::Error> {
        self.interrupts = interrupts;
        Ok(())
    }

    fn write_frame_data(&mut self, data: &[u8], offset: u16) -> Result<(), Self::Error> {
        let offset = usize::from(offset);
        self.tx_buffer.resize(offset + data.len(), 0);
        self.tx_buffer[offset..].copy_from_slice(data);
        Ok(())
    }

    fn write_frame_control(&mut self, len: u16, ranging: bool) -> Result<(), Self::Error> {
        assert!(ranging);
        self.tx_len = usize::from(len) - FCS_LEN;
        Ok(())
    }

    fn set_delayed_transmit_time(&mut self, time: DelayedTime) -> Result<(), Self::Error> {
        self.delayed = Some(time);
        Ok(())
    }

    fn start_transmit(
        &mut self,
        mode: TxMode,
        response_expected: bool,
    ) -> Result<(), Self::Error> {
        if self.reject_transmits > 0 {
            self.reject_transmits -= 1;
            self.rejected += 1;
            return Err(MockError::Rejected);
        }

        let transmission = Transmission {
            bytes: self.tx_buffer[..self.tx_len].to_vec(),
            mode,
            delayed: match mode {
                TxMode::Immediate => None,
                TxMode::Delayed => self.delayed,
            },
            response_expected,
        };

        self.sent.push(transmission.clone());
        self.pending = Some(transmission);
        self.rx_enabled = response_expected;

        Ok(())
    }

    fn enable_receive(&mut self) -> Result<(), Self::Error> {
        self.rx_enabled = true;
        Ok(())
    }

    fn read_frame_length(&mut self) -> Result<u16, Self::Error> {
        self.check_bus()?;
        Ok(self.rx_frame.len() as u16)
    }

    fn read_frame_data(&mut self, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.check_bus()?;
        let len = buffer.len().min(self.rx_frame.len());
        buffer[..len].copy_from_slice(&self.rx_frame[..len]);
        Ok(())
    }

    fn read_tx_timestamp(&mut self) -> Result<Instant, Self::Error> {
        self.check_bus()?;
        Ok(self.tx_timestamp)
    }

    fn read_rx_timestamp(&mut self) -> Result<Instant, Self::Error> {
        self.check_bus()?;
        Ok(self.rx_timestamp)
    }
}

impl PollingRadio for MockRadio {
    fn poll_event(&mut self) -> nb::Result<RadioEvent, Self::Error> {
        while let Some(event) = self.events.pop_front() {
            if !self.interrupts.raises(event) {
                continue;
            }

            if event == RadioEvent::RxGood {
                if let Some((frame, timestamp)) = self.inbox.pop_front() {
                    self.receive(&frame, timestamp);
                }
            }

            return Ok(event);
        }

        Err(nb::Error::Other(MockError::NoEvent))
    }
}

/// The events the two ends of a transmission see
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Delivery {
    pub to_sender: Option<RadioEvent>,
    pub to_receiver: Option<RadioEvent>,
}

/// Carries frames between two [`MockRadio`]s
#[derive(Debug, Default)]
pub(crate) struct Air {
    /// Global time in ticks
    pub now: u64,
    /// One-way time of flight in ticks
    pub time_of_flight: u64,
    /// How many of the next frames get lost
    pub drop_next: usize,
}

impl Air {
    pub fn new(time_of_flight: u64) -> Self {
        Air {
            now: 0,
            time_of_flight,
            drop_next: 0,
        }
    }

    /// Moves the frame `sender` is sending to `receiver`
    ///
    /// Returns `None` if `sender` has nothing to send. A lost frame times out
    /// every receiver that is waiting, the sender's first.
    pub fn carry(&mut self, sender: &mut MockRadio, receiver: &mut MockRadio) -> Option<Delivery> {
        let transmission = sender.pending.take()?;

        let local_now = Instant::wrapping(self.now + sender.clock_offset);
        let tx = match transmission.delayed {
            Some(time) => time.tx_timestamp(sender.tx_antenna_delay()),
            None => local_now,
        };
        let world_tx = self.now + tx.duration_since(local_now).value();
        sender.tx_timestamp = tx;
        self.now = world_tx + self.time_of_flight;

        if self.drop_next > 0 {
            self.drop_next -= 1;

            return Some(Delivery {
                to_sender: time_out(sender),
                to_receiver: time_out(receiver),
            });
        }

        let to_sender = sender
            .interrupts
            .raises(RadioEvent::TxDone)
            .then_some(RadioEvent::TxDone);

        let to_receiver = if receiver.rx_enabled && receiver.interrupts.rx_good {
            receiver.receive(
                &transmission.bytes,
                Instant::wrapping(self.now + receiver.clock_offset),
            );
            Some(RadioEvent::RxGood)
        } else {
            None
        };

        Some(Delivery {
            to_sender,
            to_receiver,
        })
    }
}

fn time_out(radio: &mut MockRadio) -> Option<RadioEvent> {
    if radio.rx_enabled && radio.interrupts.rx_timeout {
        radio.rx_enabled = false;
        Some(RadioEvent::RxTimeout)
    } else {
        None
    }
}

/// Remembers what the session reported
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub rounds: usize,
    pub results: Vec<RangingResult>,
}

impl RangingHandler for Recorder {
    fn round_complete(&mut self) {
        self.rounds += 1;
    }

    fn result_available(&mut self, result: RangingResult) {
        self.results.push(result);
    }
}
