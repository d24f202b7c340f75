use core::fmt;
use core::fmt::{Display, Formatter};

#[cfg(feature = "defmt")]
use defmt::Format;

use crate::ranging::EstimatorError;

/// An error that can occur while setting up or driving a ranging session
///
/// Failed exchanges are not errors. They are recovered inside the session
/// according to its [`RetryPolicy`], and only show up here once the policy
/// gives up.
///
/// [`RetryPolicy`]: crate::configs::RetryPolicy
pub enum Error<E> {
    /// The radio failed outside of an exchange
    Radio(E),

    /// The radio rejected its startup configuration
    ///
    /// This is fatal. The node never starts ranging.
    InitializationFailed(E),

    /// The configuration was not valid
    InvalidConfiguration,

    /// Frame could not be encoded or decoded
    Frame(byte::Error),

    /// A set of timestamps could not be turned into a distance
    Estimator(EstimatorError),

    /// The retry policy gave up after too many consecutive failures
    RetriesExhausted,

    /// The session has no role yet, see [`Session::start`]
    ///
    /// [`Session::start`]: crate::hl::Session::start
    NotStarted,
}

impl<E> From<byte::Error> for Error<E> {
    fn from(error: byte::Error) -> Self {
        Error::Frame(error)
    }
}

impl<E> From<EstimatorError> for Error<E> {
    fn from(error: EstimatorError) -> Self {
        Error::Estimator(error)
    }
}

impl<E> Display for Error<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl<E> std::error::Error for Error<E> where E: fmt::Debug {}

// We can't derive this implementation, as `byte::Error` has no `PartialEq`
// and we don't want to require more than `Debug` from the radio error.
impl<E> fmt::Debug for Error<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Radio(error) => write!(f, "Radio({:?})", error),
            Error::InitializationFailed(error) => write!(f, "InitializationFailed({:?})", error),
            Error::InvalidConfiguration => write!(f, "InvalidConfiguration"),
            Error::Frame(error) => write!(f, "Frame({:?})", error),
            Error::Estimator(error) => write!(f, "Estimator({:?})", error),
            Error::RetriesExhausted => write!(f, "RetriesExhausted"),
            Error::NotStarted => write!(f, "NotStarted"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<E> Format for Error<E>
where
    E: defmt::Format,
{
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Radio(error) => defmt::write!(f, "Radio({:?})", error),
            Error::InitializationFailed(error) => {
                defmt::write!(f, "InitializationFailed({:?})", error)
            }
            Error::InvalidConfiguration => defmt::write!(f, "InvalidConfiguration"),
            Error::Frame(error) => defmt::write!(f, "Frame({:?})", defmt::Debug2Format(error)),
            Error::Estimator(error) => defmt::write!(f, "Estimator({:?})", error),
            Error::RetriesExhausted => defmt::write!(f, "RetriesExhausted"),
            Error::NotStarted => defmt::write!(f, "NotStarted"),
        }
    }
}

/// Why a single exchange failed
///
/// Faults never leave the session. They are logged, counted against the
/// retry policy, and the role goes back to its base state.
pub(crate) enum Fault<E> {
    /// A frame arrived that isn't the one the role waits for
    Foreign,

    /// The receive or preamble timeout expired
    ReceiveTimeout,

    /// The radio received a corrupted frame
    ReceiveError,

    /// The radio refused to start a transmission
    TransmitRejected(E),

    /// The radio failed while being read or written
    Radio(E),

    /// A frame could not be serialized into the transmit buffer
    Encode(byte::Error),
}

impl<E> From<E> for Fault<E> {
    fn from(error: E) -> Self {
        Fault::Radio(error)
    }
}

// The payloads only ever end up in the log.
impl<E> fmt::Debug for Fault<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Fault::Foreign => write!(f, "Foreign"),
            Fault::ReceiveTimeout => write!(f, "ReceiveTimeout"),
            Fault::ReceiveError => write!(f, "ReceiveError"),
            Fault::TransmitRejected(error) => write!(f, "TransmitRejected({:?})", error),
            Fault::Radio(error) => write!(f, "Radio({:?})", error),
            Fault::Encode(error) => write!(f, "Encode({:?})", error),
        }
    }
}
