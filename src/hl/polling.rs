//! Busy-waiting realization and the session main loops
//!
//! Everything here drives the same state machine as
//! [`Session::handle_event`], only the events come from
//! [`PollingRadio::poll_event`] instead of an interrupt handler.

use log::{info, warn};

use super::{Error, Phase, Progress, RangingHandler, Role, Session};
use crate::{
    block,
    hal_type::delay::DelayNs,
    maybe_async_attr,
    radio::PollingRadio,
    ranging::RangingResult,
};

impl<R, H> Session<R, H>
where
    R: PollingRadio,
    H: RangingHandler,
{
    /// Waits for the next radio event and handles it
    pub fn poll(&mut self) -> Result<Progress, Error<R::Error>> {
        if self.role().is_none() {
            return Err(Error::NotStarted);
        }

        let event = block!(self.radio().poll_event()).map_err(Error::Radio)?;
        self.handle_event(event)
    }

    /// Handles events until the exchange in flight completes, or the retry
    /// policy parks the session
    ///
    /// Returns right away if the session is already parked, and with
    /// [`Progress::Ignored`] if it is an Initiator waiting to be resumed.
    pub fn run_until_settled(&mut self) -> Result<Progress, Error<R::Error>> {
        loop {
            if let Some(progress) = self.parked() {
                return Ok(progress);
            }
            if self.phase() == Phase::Idle {
                return Ok(Progress::Ignored);
            }

            match self.poll()? {
                Progress::Waiting | Progress::Ignored => continue,
                settled => return Ok(settled),
            }
        }
    }
}

/// Runs `rounds` ranging rounds as the Initiator
///
/// Starts the session if necessary, then waits the configured ranging
/// interval between rounds and the backoff delay after failures. Returns the
/// number of completed rounds, or [`Error::RetriesExhausted`] if the retry
/// policy gives up first.
#[maybe_async_attr]
pub async fn range_periodically<R, H, D>(
    session: &mut Session<R, H>,
    delay: &mut D,
    rounds: usize,
) -> Result<usize, Error<R::Error>>
where
    R: PollingRadio,
    H: RangingHandler,
    D: DelayNs,
{
    if session.role() != Some(Role::Initiator) {
        session.start(Role::Initiator)?;
    }

    let interval_ms = session.config().timing.ranging_interval_ms;
    let mut completed = 0;

    while completed < rounds {
        if session.phase() == Phase::Idle {
            session.resume()?;
        }

        match session.run_until_settled()? {
            Progress::Completed => {
                completed += 1;

                if completed < rounds {
                    delay.delay_ms(interval_ms).await;
                }
            }
            Progress::Backoff { delay_ms } => {
                delay.delay_ms(delay_ms).await;
                session.resume()?;
            }
            Progress::Exhausted => {
                warn!("ranging stopped after {} rounds", completed);
                return Err(Error::RetriesExhausted);
            }
            Progress::Waiting | Progress::Ignored => {}
        }
    }

    Ok(completed)
}

/// Answers exchanges as the Responder until `results` distances have been
/// computed
///
/// Every result is turned into a distance with the session's calibration and
/// passed to `on_distance`. Results the estimator rejects are logged and
/// dropped. Returns [`Error::RetriesExhausted`] if the retry policy gives up
/// first.
#[maybe_async_attr]
pub async fn serve<R, D, F>(
    session: &mut Session<R, Latest>,
    delay: &mut D,
    results: usize,
    mut on_distance: F,
) -> Result<usize, Error<R::Error>>
where
    R: PollingRadio,
    D: DelayNs,
    F: FnMut(RangingResult, f64),
{
    if session.role() != Some(Role::Responder) {
        session.start(Role::Responder)?;
    }

    let calibration = session.config().calibration;
    let mut served = 0;

    while served < results {
        match session.run_until_settled()? {
            Progress::Completed => {
                let Some(result) = session.handler().0.take() else {
                    continue;
                };

                match result.distance(&calibration) {
                    Ok(distance) => {
                        info!("distance: {} m", distance);
                        on_distance(result, distance);
                        served += 1;
                    }
                    Err(error) => warn!("discarding result: {:?}", error),
                }
            }
            Progress::Backoff { delay_ms } => {
                delay.delay_ms(delay_ms).await;
                session.resume()?;
            }
            Progress::Exhausted => {
                warn!("stopped serving after {} results", served);
                return Err(Error::RetriesExhausted);
            }
            Progress::Waiting | Progress::Ignored => {}
        }
    }

    Ok(served)
}

/// Keeps the last result for [`serve`]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Latest(pub Option<RangingResult>);

impl RangingHandler for Latest {
    fn result_available(&mut self, result: RangingResult) {
        self.0 = Some(result);
    }
}
