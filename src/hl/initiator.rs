use log::debug;

use super::{
    engine::{Port, Protocol, Step},
    error::Fault,
    Phase, RangingHandler,
};
use crate::{
    frame::{FinalFrame, PollFrame, ResponseFrame},
    radio::{Interrupts, Radio, RadioEvent, TxMode},
    time::{DelayedTime, Duration},
};

/// The node that starts the exchange
///
/// Sends the Poll, answers the Response with the Final, and reports the round
/// as complete once the Final is out. It never sees the result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Initiator {
    AwaitingResponse,
    AwaitingFinalSent,
}

impl Protocol for Initiator {
    const REARM_AFTER_COMPLETION: bool = false;

    fn begin<R: Radio>(port: &mut Port<'_, R>) -> Result<Self, Fault<R::Error>> {
        port.set_interrupts(Interrupts::RECEIVE)?;

        let seq = port.next_sequence();
        let poll = PollFrame::new(&port.link, seq);
        port.transmit(poll, TxMode::Immediate, true)?;
        debug!("poll #{} sent", seq);

        Ok(Initiator::AwaitingResponse)
    }

    fn advance<R: Radio, H: RangingHandler>(
        self,
        event: RadioEvent,
        port: &mut Port<'_, R>,
        handler: &mut H,
    ) -> Result<Step<Self>, Fault<R::Error>> {
        match (self, event) {
            (Initiator::AwaitingResponse, RadioEvent::RxGood) => {
                port.receive::<ResponseFrame>()?;

                let tx1 = port.radio.read_tx_timestamp()?;
                let rx2 = port.radio.read_rx_timestamp()?;

                let timing = &port.config.timing;
                let antenna = Duration::from_antenna_delay(port.config.calibration.tx_antenna_delay);
                let send_at = DelayedTime::at(rx2 + timing.turnaround());
                let tx3 = send_at.tx_timestamp(antenna);

                port.radio.set_delayed_transmit_time(send_at)?;

                let seq = port.next_sequence();
                let frame = FinalFrame::new(
                    &port.link,
                    seq,
                    tx1.to_wire(),
                    rx2.to_wire(),
                    tx3.to_wire(),
                );

                port.set_interrupts(Interrupts::TRANSMIT)?;
                port.transmit(frame, TxMode::Delayed, false)?;
                debug!("final #{} scheduled", seq);

                Ok(Step::Continue(Initiator::AwaitingFinalSent))
            }
            (Initiator::AwaitingResponse, RadioEvent::RxTimeout) => Err(Fault::ReceiveTimeout),
            (Initiator::AwaitingResponse, RadioEvent::RxError) => Err(Fault::ReceiveError),
            (Initiator::AwaitingFinalSent, RadioEvent::TxDone) => {
                debug!("round complete");
                handler.round_complete();

                Ok(Step::Complete)
            }
            _ => Ok(Step::Ignore),
        }
    }

    fn phase(&self) -> Phase {
        match self {
            Initiator::AwaitingResponse => Phase::AwaitingResponse,
            Initiator::AwaitingFinalSent => Phase::AwaitingFinalSent,
        }
    }
}
