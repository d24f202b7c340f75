//! Double-sided two-way ranging (DS-TWR) over UWB radios
//!
//! Two nodes measure the distance between them by exchanging three frames
//! (Poll, Response, Final) and timestamping each one on their own clock. The
//! six timestamps are combined so that the difference in clock rates cancels
//! out, and neither node needs to be synchronized with the other.
//!
//! The recommended way to use this crate is the [high-level interface], built
//! around [`Session`]. It runs on any radio that implements the [`Radio`]
//! trait, which is a thin layer over a driver such as `dw3000-ng`. The
//! [frame codec] and the [estimator] can be used on their own as well.
//!
//! This crate is `no_std` and doesn't allocate. Enable the `async` feature
//! (on by default) to get `async` session loops on top of
//! [`embedded-hal-async`], or disable it to get blocking ones on top of
//! [`embedded-hal`].
//!
//! [high-level interface]: hl/index.html
//! [frame codec]: frame/index.html
//! [estimator]: ranging/index.html
//! [`Radio`]: radio::Radio
//! [`embedded-hal`]: https://crates.io/crates/embedded-hal
//! [`embedded-hal-async`]: https://crates.io/crates/embedded-hal-async
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "async")]
use maybe_async::must_be_async as maybe_async_attr;
#[cfg(not(feature = "async"))]
use maybe_async::must_be_sync as maybe_async_attr;

#[cfg(not(feature = "async"))]
use embedded_hal as hal_type;
#[cfg(feature = "async")]
use embedded_hal_async as hal_type;

pub mod configs;
pub mod frame;
pub mod hl;
pub mod radio;
pub mod ranging;
pub mod time;

#[cfg(test)]
mod mock;

/// Redirection of nb::block
pub mod block {
    pub use nb::block;
}

pub use crate::{
    block::block,
    configs::Config,
    hl::{range_periodically, serve, Error, Phase, Progress, RangingHandler, Role, Session},
    radio::{PollingRadio, Radio, RadioEvent},
    ranging::RangingResult,
};
