//! The ranging session
//!
//! The entry point to this API is the [`Session`] struct. It owns the radio,
//! the configuration and the handler that is told about completed exchanges,
//! and runs one of the two [`Role`]s on top of them.
//!
//! A session doesn't wait for anything by itself. In an interrupt-driven
//! setup, the interrupt handler translates the radio's status into a
//! [`RadioEvent`] and calls [`Session::handle_event`]. If the radio implements
//! [`PollingRadio`], [`Session::poll`] busy-waits for the next event instead,
//! and [`range_periodically`] and [`serve`] run the usual main loops.
//!
//! [`PollingRadio`]: crate::radio::PollingRadio

use core::{fmt, num::Wrapping};

#[cfg(feature = "defmt")]
use defmt::Format;

pub use error::*;
pub use polling::*;

use self::{
    engine::{Engine, Port},
    initiator::Initiator,
    responder::Responder,
};
use crate::{
    frame::MAX_FRAME_LEN,
    radio::{Radio, RadioEvent},
    ranging::RangingResult,
    Config,
};

mod engine;
mod error;
mod initiator;
mod polling;
mod responder;

/// The part a node plays in the exchange
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    /// Sends the Poll and the Final
    Initiator,
    /// Sends the Response and computes the result
    Responder,
}

impl Role {
    /// The role on the other end of the exchange
    pub fn peer(&self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }
}

/// Where a session currently stands
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Phase {
    /// No role has been started
    Stopped,
    /// Initiator only: the last round is complete, waiting for
    /// [`Session::resume`]
    Idle,
    /// Initiator only: the Poll is out, waiting for the Response
    AwaitingResponse,
    /// Initiator only: the Final is scheduled, waiting for it to be sent
    AwaitingFinalSent,
    /// Responder only: waiting for a Poll
    Listening,
    /// Responder only: the Response is scheduled, waiting for the Final
    AwaitingFinal,
    /// An exchange failed and the retry policy asks for a pause. Call
    /// [`Session::resume`] once it's over.
    BackingOff,
    /// The retry policy gave up
    Halted,
}

/// What happened as a result of an event
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Progress {
    /// The exchange is in flight
    Waiting,
    /// An exchange completed and the handler has been called
    Completed,
    /// An exchange failed and the session waits for [`Session::resume`]
    Backoff {
        /// How long to wait before resuming
        delay_ms: u32,
    },
    /// The retry policy gave up
    Exhausted,
    /// The event didn't concern the current phase
    Ignored,
}

/// Receives the outcome of completed exchanges
///
/// Both methods are called exactly once per completed exchange and never for
/// a failed one. Only one of them applies to a given role.
pub trait RangingHandler {
    /// The Initiator's Final has been sent
    fn round_complete(&mut self) {}

    /// The Responder has collected all six timestamps of an exchange
    fn result_available(&mut self, result: RangingResult) {
        let _ = result;
    }
}

/// Does nothing
impl RangingHandler for () {}

impl<H: RangingHandler + ?Sized> RangingHandler for &mut H {
    fn round_complete(&mut self) {
        (**self).round_complete()
    }

    fn result_available(&mut self, result: RangingResult) {
        (**self).result_available(result)
    }
}

/// A [`RangingHandler`] made of two closures
///
/// ``` rust
/// use dstwr::{
///     hl::{Callbacks, RangingHandler},
///     ranging::RangingResult,
/// };
///
/// let mut rounds = 0;
/// let mut handler = Callbacks {
///     round_complete: || rounds += 1,
///     result_available: |_: RangingResult| {},
/// };
///
/// handler.round_complete();
/// drop(handler);
///
/// assert_eq!(rounds, 1);
/// ```
pub struct Callbacks<C, A> {
    /// Called by the Initiator
    pub round_complete: C,
    /// Called by the Responder
    pub result_available: A,
}

impl<C, A> RangingHandler for Callbacks<C, A>
where
    C: FnMut(),
    A: FnMut(RangingResult),
{
    fn round_complete(&mut self) {
        (self.round_complete)()
    }

    fn result_available(&mut self, result: RangingResult) {
        (self.result_available)(result)
    }
}

#[derive(Debug)]
enum RoleEngine {
    Initiator(Engine<Initiator>),
    Responder(Engine<Responder>),
}

/// A node taking part in DS-TWR
///
/// Holds everything that lives as long as the ranging subsystem: the radio,
/// the configuration, the handler and the node's sequence counter. The
/// counter is shared by both roles and goes up by one for every frame sent.
pub struct Session<R, H = ()> {
    radio: R,
    config: Config,
    handler: H,
    seq: Wrapping<u8>,
    buffer: [u8; MAX_FRAME_LEN],
    engine: Option<RoleEngine>,
}

// Can't be derived without putting requirements on `R` and `H`.
impl<R, H> fmt::Debug for Session<R, H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Session {{ role: {:?}, phase: {:?}, seq: {}, .. }}",
            self.role(),
            self.phase(),
            self.seq
        )
    }
}

impl<R, H> Session<R, H>
where
    R: Radio,
    H: RangingHandler,
{
    /// Validates `config` and writes it to the radio
    ///
    /// Fails with [`Error::InvalidConfiguration`] or
    /// [`Error::InitializationFailed`]. The session doesn't start ranging
    /// until [`Session::start`] is called.
    pub fn new(mut radio: R, config: Config, handler: H) -> Result<Self, Error<R::Error>> {
        config.validate()?;
        radio
            .configure(&config)
            .map_err(Error::InitializationFailed)?;

        Ok(Session {
            radio,
            config,
            handler,
            seq: Wrapping(0),
            buffer: [0; MAX_FRAME_LEN],
            engine: None,
        })
    }

    /// Starts playing `role`
    ///
    /// The Initiator sends its first Poll right away, the Responder turns on
    /// its receiver. Any exchange in flight is abandoned, and the failure
    /// count starts from zero.
    pub fn start(&mut self, role: Role) -> Result<Progress, Error<R::Error>> {
        log::debug!("starting as {:?} at sequence number {}", role, self.seq);

        self.engine = Some(match role {
            Role::Initiator => RoleEngine::Initiator(Engine::new()),
            Role::Responder => RoleEngine::Responder(Engine::new()),
        });

        self.resume()
    }

    /// Feeds a radio event to the state machine
    pub fn handle_event(&mut self, event: RadioEvent) -> Result<Progress, Error<R::Error>> {
        self.drive(|engine, port, handler| engine.handle_event(event, port, handler))
    }

    /// Starts the next exchange
    ///
    /// Applies to an Initiator whose last round completed, and to any role
    /// that is backing off. Does nothing while an exchange is in flight, and
    /// reports [`Progress::Exhausted`] once the session has halted.
    pub fn resume(&mut self) -> Result<Progress, Error<R::Error>> {
        self.drive(|engine, port, _| engine.resume(port))
    }

    fn drive<F>(&mut self, f: F) -> Result<Progress, Error<R::Error>>
    where
        F: FnOnce(&mut dyn Drive<R, H>, &mut Port<'_, R>, &mut H) -> Progress,
    {
        let Session {
            radio,
            config,
            handler,
            seq,
            buffer,
            engine,
        } = self;

        let engine: &mut dyn Drive<R, H> = match engine {
            Some(RoleEngine::Initiator(engine)) => engine,
            Some(RoleEngine::Responder(engine)) => engine,
            None => return Err(Error::NotStarted),
        };

        let mut port = Port::new(radio, config, seq, buffer, engine.role());

        Ok(f(engine, &mut port, handler))
    }
}

impl<R, H> Session<R, H> {
    /// The role this session plays, if started
    pub fn role(&self) -> Option<Role> {
        match self.engine {
            Some(RoleEngine::Initiator(_)) => Some(Role::Initiator),
            Some(RoleEngine::Responder(_)) => Some(Role::Responder),
            None => None,
        }
    }

    /// Returns the current phase
    pub fn phase(&self) -> Phase {
        match &self.engine {
            Some(RoleEngine::Initiator(engine)) => engine.phase(),
            Some(RoleEngine::Responder(engine)) => engine.phase(),
            None => Phase::Stopped,
        }
    }

    /// Returns the sequence number the next frame will carry
    pub fn sequence(&self) -> u8 {
        self.seq.0
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of consecutive failed attempts in the current round
    pub fn failures(&self) -> u32 {
        match &self.engine {
            Some(RoleEngine::Initiator(engine)) => engine.failures(),
            Some(RoleEngine::Responder(engine)) => engine.failures(),
            None => 0,
        }
    }

    /// Gives access to the radio
    ///
    /// Changing the radio's state behind the session's back breaks the
    /// exchange in flight.
    pub fn radio(&mut self) -> &mut R {
        &mut self.radio
    }

    /// Gives access to the handler
    pub fn handler(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Ends the session and hands back the radio and the handler
    pub fn release(self) -> (R, H) {
        (self.radio, self.handler)
    }

    /// Progress to report while no exchange can go on by itself
    pub(crate) fn parked(&self) -> Option<Progress> {
        match &self.engine {
            Some(RoleEngine::Initiator(engine)) => engine.parked(),
            Some(RoleEngine::Responder(engine)) => engine.parked(),
            None => None,
        }
    }
}

/// Erases the role of an engine, so the session can drive either
trait Drive<R: Radio, H: RangingHandler> {
    fn role(&self) -> Role;
    fn resume(&mut self, port: &mut Port<'_, R>) -> Progress;
    fn handle_event(&mut self, event: RadioEvent, port: &mut Port<'_, R>, handler: &mut H)
        -> Progress;
}

impl<R: Radio, H: RangingHandler> Drive<R, H> for Engine<Initiator> {
    fn role(&self) -> Role {
        Role::Initiator
    }

    fn resume(&mut self, port: &mut Port<'_, R>) -> Progress {
        Engine::resume(self, port)
    }

    fn handle_event(
        &mut self,
        event: RadioEvent,
        port: &mut Port<'_, R>,
        handler: &mut H,
    ) -> Progress {
        Engine::handle_event(self, event, port, handler)
    }
}

impl<R: Radio, H: RangingHandler> Drive<R, H> for Engine<Responder> {
    fn role(&self) -> Role {
        Role::Responder
    }

    fn resume(&mut self, port: &mut Port<'_, R>) -> Progress {
        Engine::resume(self, port)
    }

    fn handle_event(
        &mut self,
        event: RadioEvent,
        port: &mut Port<'_, R>,
        handler: &mut H,
    ) -> Progress {
        Engine::handle_event(self, event, port, handler)
    }
}
