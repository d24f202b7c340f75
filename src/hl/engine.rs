//! The part of the state machine both roles share
//!
//! Initiator and Responder follow the same pattern: validate the expected
//! frame, capture timestamps, schedule the next delayed transmission, and on
//! any failure fall back to the base state and start over. The role-specific
//! steps live behind [`Protocol`]; [`Engine`] adds failure accounting and the
//! retry policy on top.

use core::{fmt, num::Wrapping};

use log::{debug, trace, warn};

use super::{error::Fault, Phase, Progress, RangingHandler, Role};
use crate::{
    configs::{Link, RetryPolicy},
    frame::{self, Frame, FCS_LEN, MAX_FRAME_LEN},
    radio::{Interrupts, Radio, RadioEvent, TxMode},
    Config,
};

/// What a role does with an event
pub(crate) enum Step<S> {
    /// The exchange goes on in the given state
    Continue(S),
    /// The exchange is complete and the handler has been notified
    Complete,
    /// The event doesn't concern the current state
    Ignore,
}

/// The steps of one role in an exchange
pub(crate) trait Protocol: Copy + fmt::Debug {
    /// Whether the role goes back to its base state by itself after a
    /// completed exchange, or waits to be resumed
    const REARM_AFTER_COMPLETION: bool;

    /// Puts the radio in the role's base state
    fn begin<R: Radio>(port: &mut Port<'_, R>) -> Result<Self, Fault<R::Error>>;

    /// Reacts to a radio event
    fn advance<R: Radio, H: RangingHandler>(
        self,
        event: RadioEvent,
        port: &mut Port<'_, R>,
        handler: &mut H,
    ) -> Result<Step<Self>, Fault<R::Error>>;

    /// The phase reported while in this state
    fn phase(&self) -> Phase;
}

/// Everything a role touches during an exchange
pub(crate) struct Port<'a, R> {
    pub radio: &'a mut R,
    pub config: &'a Config,
    pub link: Link,
    seq: &'a mut Wrapping<u8>,
    buffer: &'a mut [u8; MAX_FRAME_LEN],
}

impl<'a, R: Radio> Port<'a, R> {
    pub fn new(
        radio: &'a mut R,
        config: &'a Config,
        seq: &'a mut Wrapping<u8>,
        buffer: &'a mut [u8; MAX_FRAME_LEN],
        role: Role,
    ) -> Self {
        Port {
            radio,
            config,
            link: config.addressing.link(role),
            seq,
            buffer,
        }
    }

    /// Returns the sequence number for the next transmission
    pub fn next_sequence(&mut self) -> u8 {
        let seq = self.seq.0;
        *self.seq += Wrapping(1);
        seq
    }

    pub fn set_interrupts(&mut self, interrupts: Interrupts) -> Result<(), Fault<R::Error>> {
        self.radio.set_interrupts(interrupts)?;
        Ok(())
    }

    /// Loads `frame` into the radio and starts sending it
    pub fn transmit<F: Frame>(
        &mut self,
        frame: F,
        mode: TxMode,
        response_expected: bool,
    ) -> Result<(), Fault<R::Error>> {
        let len = frame.encode(&mut self.buffer[..]).map_err(Fault::Encode)?;

        self.radio.write_frame_data(&self.buffer[..len], 0)?;
        self.radio
            .write_frame_control((len + FCS_LEN) as u16, true)?;
        self.radio
            .start_transmit(mode, response_expected)
            .map_err(Fault::TransmitRejected)
    }

    /// Reads the received frame and checks that it's the expected one
    pub fn receive<F: Frame>(&mut self) -> Result<F, Fault<R::Error>> {
        let len = usize::from(self.radio.read_frame_length()?).min(MAX_FRAME_LEN);
        let bytes = &mut self.buffer[..len];

        self.radio.read_frame_data(bytes)?;

        frame::validate::<F>(bytes, &self.link).ok_or(Fault::Foreign)
    }
}

/// Where the engine stands between and during exchanges
#[derive(Clone, Copy, Debug)]
enum Stage<P> {
    Idle,
    Active(P),
    BackingOff { delay_ms: u32 },
    Halted,
}

/// One role plus its failure accounting
#[derive(Debug)]
pub(crate) struct Engine<P> {
    stage: Stage<P>,
    failures: u32,
}

impl<P: Protocol> Engine<P> {
    pub fn new() -> Self {
        Engine {
            stage: Stage::Idle,
            failures: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.stage {
            Stage::Idle => Phase::Idle,
            Stage::Active(state) => state.phase(),
            Stage::BackingOff { .. } => Phase::BackingOff,
            Stage::Halted => Phase::Halted,
        }
    }

    /// Returns the progress to report if the engine is parked
    pub fn parked(&self) -> Option<Progress> {
        match self.stage {
            Stage::BackingOff { delay_ms } => Some(Progress::Backoff { delay_ms }),
            Stage::Halted => Some(Progress::Exhausted),
            Stage::Idle | Stage::Active(_) => None,
        }
    }

    /// Number of consecutive failures in the current round
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Starts a new exchange if none is in flight
    pub fn resume<R: Radio>(&mut self, port: &mut Port<'_, R>) -> Progress {
        match self.stage {
            Stage::Idle | Stage::BackingOff { .. } => self.begin(port),
            Stage::Halted => Progress::Exhausted,
            Stage::Active(_) => Progress::Ignored,
        }
    }

    pub fn handle_event<R: Radio, H: RangingHandler>(
        &mut self,
        event: RadioEvent,
        port: &mut Port<'_, R>,
        handler: &mut H,
    ) -> Progress {
        let Stage::Active(state) = self.stage else {
            trace!("ignoring {:?} while {:?}", event, self.phase());
            return Progress::Ignored;
        };

        match state.advance(event, port, handler) {
            Ok(Step::Continue(next)) => {
                self.stage = Stage::Active(next);
                Progress::Waiting
            }
            Ok(Step::Ignore) => {
                trace!("ignoring {:?} while {:?}", event, state.phase());
                Progress::Ignored
            }
            Ok(Step::Complete) => {
                self.failures = 0;
                self.stage = Stage::Idle;

                if P::REARM_AFTER_COMPLETION {
                    self.begin(port);
                }

                Progress::Completed
            }
            Err(fault) => match self.fail(fault, &port.config.retry) {
                Some(progress) => progress,
                None => self.begin(port),
            },
        }
    }

    fn begin<R: Radio>(&mut self, port: &mut Port<'_, R>) -> Progress {
        loop {
            match P::begin(port) {
                Ok(state) => {
                    self.stage = Stage::Active(state);
                    return Progress::Waiting;
                }
                Err(fault) => {
                    if let Some(progress) = self.fail(fault, &port.config.retry) {
                        return progress;
                    }
                }
            }
        }
    }

    /// Counts a failure and parks the engine if the policy says so
    fn fail<E: fmt::Debug>(&mut self, fault: Fault<E>, policy: &RetryPolicy) -> Option<Progress> {
        self.failures = self.failures.saturating_add(1);
        debug!("exchange failed: {:?} ({} in a row)", fault, self.failures);

        if policy.is_exhausted(self.failures) {
            warn!("giving up after {} failed attempts", self.failures);
            self.stage = Stage::Halted;
            return Some(Progress::Exhausted);
        }

        let delay_ms = policy.backoff.delay_ms(self.failures);
        if delay_ms > 0 {
            self.stage = Stage::BackingOff { delay_ms };
            return Some(Progress::Backoff { delay_ms });
        }

        None
    }
}
