use log::debug;

use super::{
    engine::{Port, Protocol, Step},
    error::Fault,
    Phase, RangingHandler,
};
use crate::{
    frame::{FinalFrame, PollFrame, ResponseFrame},
    radio::{Interrupts, Radio, RadioEvent, TxMode},
    ranging::RangingResult,
    time::{DelayedTime, Instant},
};

/// The node that answers the exchange and ends up with the result
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Responder {
    Listening,
    AwaitingFinal {
        /// When the Poll arrived, on this node's clock
        rx1: Instant,
    },
}

impl Protocol for Responder {
    const REARM_AFTER_COMPLETION: bool = true;

    fn begin<R: Radio>(port: &mut Port<'_, R>) -> Result<Self, Fault<R::Error>> {
        port.set_interrupts(Interrupts::RECEIVE)?;
        port.radio.enable_receive()?;

        Ok(Responder::Listening)
    }

    fn advance<R: Radio, H: RangingHandler>(
        self,
        event: RadioEvent,
        port: &mut Port<'_, R>,
        handler: &mut H,
    ) -> Result<Step<Self>, Fault<R::Error>> {
        match (self, event) {
            (Responder::Listening, RadioEvent::RxGood) => {
                let poll = port.receive::<PollFrame>()?;
                let rx1 = port.radio.read_rx_timestamp()?;

                let send_at = DelayedTime::at(rx1 + port.config.timing.turnaround());
                port.radio.set_delayed_transmit_time(send_at)?;

                let seq = port.next_sequence();
                let response = ResponseFrame::new(&port.link, seq);
                port.transmit(response, TxMode::Delayed, true)?;
                debug!("poll #{} answered with #{}", poll.header.sequence, seq);

                Ok(Step::Continue(Responder::AwaitingFinal { rx1 }))
            }
            (Responder::AwaitingFinal { rx1 }, RadioEvent::RxGood) => {
                let last = port.receive::<FinalFrame>()?;
                let tx2 = port.radio.read_tx_timestamp()?;
                let rx3 = port.radio.read_rx_timestamp()?;

                debug!("final #{} received", last.header.sequence);
                handler.result_available(RangingResult {
                    tx1: last.tx1.into(),
                    rx1,
                    tx2,
                    rx2: last.rx2.into(),
                    tx3: last.tx3.into(),
                    rx3,
                });

                Ok(Step::Complete)
            }
            (_, RadioEvent::RxTimeout) => Err(Fault::ReceiveTimeout),
            (_, RadioEvent::RxError) => Err(Fault::ReceiveError),
            (_, RadioEvent::TxDone) => Ok(Step::Ignore),
        }
    }

    fn phase(&self) -> Phase {
        match self {
            Responder::Listening => Phase::Listening,
            Responder::AwaitingFinal { .. } => Phase::AwaitingFinal,
        }
    }
}
