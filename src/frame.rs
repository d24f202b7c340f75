//! Wire format of the ranging frames
//!
//! All three frames start with the same 10-byte header, which happens to be a
//! valid IEEE 802.15.4 data frame header with PAN ID compression and short
//! addresses. The radio appends the 2-byte FCS on its own.
//!
//! ```text
//!  0      2     3         5       7       9          10
//!  +------+-----+---------+-------+-------+----------+----------------+
//!  | 0x8841 | seq | network | dst | src   | function | payload ...    |
//!  +------+-----+---------+-------+-------+----------+----------------+
//! ```
//!
//! Multi-byte fields are little-endian and there is no padding.
//!
//! Decoding a buffer into a frame of the wrong kind is not an error. Use
//! [`validate`] to find out whether a buffer holds the frame a node is waiting
//! for; everything else is noise on the channel.

use byte::{
    ctx::{Endian, LE},
    BytesExt as _, TryRead, TryWrite,
};
use smoltcp::wire::{Ieee802154Address, Ieee802154Pan};

#[cfg(feature = "defmt")]
use defmt::Format;

use crate::{configs::Link, time::WireTimestamp};

/// Frame control of every ranging frame
///
/// Data frame, PAN ID compression, short destination and source addresses,
/// IEEE 802.15.4-2003.
pub const FRAME_CONTROL: u16 = 0x8841;

/// Length of the frame check sequence the radio appends
pub const FCS_LEN: usize = 2;

/// Activity code carried by the Response
pub const RESPONSE_ACTIVITY: u8 = 0x02;

/// The size of the largest ranging frame
pub const MAX_FRAME_LEN: usize = FinalFrame::LEN;

/// Identifies the stage of the exchange a frame belongs to
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[repr(u8)]
pub enum FunctionCode {
    /// Message 1, Initiator to Responder
    Poll = 0x21,
    /// Message 2, Responder to Initiator
    Response = 0x10,
    /// Message 3, Initiator to Responder
    Final = 0x23,
}

impl FunctionCode {
    /// Returns the function code for a raw byte, if there is one
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x21 => Some(FunctionCode::Poll),
            0x10 => Some(FunctionCode::Response),
            0x23 => Some(FunctionCode::Final),
            _ => None,
        }
    }
}

/// The header shared by all ranging frames
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    /// Always [`FRAME_CONTROL`] in a valid frame
    pub frame_control: u16,
    /// Per-node transmission counter. Advisory only.
    pub sequence: u8,
    /// The PAN the frame was sent on
    pub network_id: Ieee802154Pan,
    /// Recipient
    pub destination: Ieee802154Address,
    /// Sender
    pub source: Ieee802154Address,
    /// Raw function code, see [`FunctionCode`]
    pub function: u8,
}

impl Header {
    /// Length of the header on the wire
    pub const LEN: usize = 10;

    /// Creates the header of a frame sent over `link`
    pub fn new(link: &Link, sequence: u8, function: FunctionCode) -> Self {
        Header {
            frame_control: FRAME_CONTROL,
            sequence,
            network_id: link.network_id,
            destination: link.peer,
            source: link.own,
            function: function as u8,
        }
    }

    /// Returns true if this header was sent by the peer of `link`, to this
    /// node, with the given function code
    pub fn matches(&self, link: &Link, function: FunctionCode) -> bool {
        self.frame_control == FRAME_CONTROL
            && self.network_id == link.network_id
            && self.destination == link.own
            && self.source == link.peer
            && self.function == function as u8
    }
}

impl<'a> TryRead<'a, Endian> for Header {
    fn try_read(bytes: &'a [u8], endian: Endian) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;

        let frame_control = bytes.read_with::<u16>(offset, endian)?;
        let sequence = read_u8(bytes, offset)?;
        let network_id = Ieee802154Pan(bytes.read_with::<u16>(offset, endian)?);
        let destination = short_address(bytes.read_with::<u16>(offset, endian)?);
        let source = short_address(bytes.read_with::<u16>(offset, endian)?);
        let function = read_u8(bytes, offset)?;

        Ok((
            Header {
                frame_control,
                sequence,
                network_id,
                destination,
                source,
                function,
            },
            *offset,
        ))
    }
}

impl TryWrite<Endian> for Header {
    fn try_write(self, bytes: &mut [u8], endian: Endian) -> byte::Result<usize> {
        let offset = &mut 0;

        bytes.write_with::<u16>(offset, self.frame_control, endian)?;
        write_u8(bytes, offset, self.sequence)?;
        bytes.write_with::<u16>(offset, self.network_id.0, endian)?;
        bytes.write_with::<u16>(offset, short_value(self.destination)?, endian)?;
        bytes.write_with::<u16>(offset, short_value(self.source)?, endian)?;
        write_u8(bytes, offset, self.function)?;

        Ok(*offset)
    }
}

/// Implemented by the three ranging frames
pub trait Frame: Sized + Copy + for<'a> TryRead<'a, Endian> + TryWrite<Endian> {
    /// The stage this frame belongs to
    const FUNCTION: FunctionCode;

    /// The length of the whole frame, excluding the FCS
    const LEN: usize;

    /// Returns the frame's header
    fn header(&self) -> &Header;

    /// Checks the fields beyond the header that identify the frame
    fn payload_matches(&self) -> bool {
        true
    }

    /// Serializes the frame into `buffer` and returns the number of bytes
    /// written
    fn encode(self, buffer: &mut [u8]) -> byte::Result<usize> {
        let offset = &mut 0;
        buffer.write_with(offset, self, LE)?;
        Ok(*offset)
    }

    /// Deserializes a frame of this type without checking its contents
    fn decode(bytes: &[u8]) -> byte::Result<Self> {
        bytes.read_with(&mut 0, LE)
    }
}

/// Returns the frame held in `bytes`, if it is the frame `link`'s owner is
/// waiting for
///
/// The buffer must be at least `F::LEN` bytes long, and the frame control,
/// network id, addresses and function code (plus the activity code of a
/// Response) must all be what the receiving node expects. Any mismatch yields
/// `None`.
pub fn validate<F: Frame>(bytes: &[u8], link: &Link) -> Option<F> {
    if bytes.len() < F::LEN {
        return None;
    }

    let frame = F::decode(bytes).ok()?;

    if frame.header().matches(link, F::FUNCTION) && frame.payload_matches() {
        Some(frame)
    } else {
        None
    }
}

/// Message 1: starts an exchange
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollFrame {
    /// The frame header
    pub header: Header,
}

impl PollFrame {
    /// Creates a Poll addressed to `link`'s peer
    pub fn new(link: &Link, sequence: u8) -> Self {
        PollFrame {
            header: Header::new(link, sequence, FunctionCode::Poll),
        }
    }
}

impl<'a> TryRead<'a, Endian> for PollFrame {
    fn try_read(bytes: &'a [u8], endian: Endian) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        let header = bytes.read_with::<Header>(offset, endian)?;

        Ok((PollFrame { header }, *offset))
    }
}

impl TryWrite<Endian> for PollFrame {
    fn try_write(self, bytes: &mut [u8], endian: Endian) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write_with(offset, self.header, endian)?;

        Ok(*offset)
    }
}

impl Frame for PollFrame {
    const FUNCTION: FunctionCode = FunctionCode::Poll;
    const LEN: usize = Header::LEN;

    fn header(&self) -> &Header {
        &self.header
    }
}

/// Message 2: the Responder's reply
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResponseFrame {
    /// The frame header
    pub header: Header,
    /// Confirms the exchange stage, [`RESPONSE_ACTIVITY`] when valid
    pub activity: u8,
}

impl ResponseFrame {
    /// Creates a Response addressed to `link`'s peer
    pub fn new(link: &Link, sequence: u8) -> Self {
        ResponseFrame {
            header: Header::new(link, sequence, FunctionCode::Response),
            activity: RESPONSE_ACTIVITY,
        }
    }
}

impl<'a> TryRead<'a, Endian> for ResponseFrame {
    fn try_read(bytes: &'a [u8], endian: Endian) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        let header = bytes.read_with::<Header>(offset, endian)?;
        let activity = read_u8(bytes, offset)?;

        Ok((ResponseFrame { header, activity }, *offset))
    }
}

impl TryWrite<Endian> for ResponseFrame {
    fn try_write(self, bytes: &mut [u8], endian: Endian) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write_with(offset, self.header, endian)?;
        write_u8(bytes, offset, self.activity)?;

        Ok(*offset)
    }
}

impl Frame for ResponseFrame {
    const FUNCTION: FunctionCode = FunctionCode::Response;
    const LEN: usize = Header::LEN + 1;

    fn header(&self) -> &Header {
        &self.header
    }

    fn payload_matches(&self) -> bool {
        self.activity == RESPONSE_ACTIVITY
    }
}

/// Message 3: closes the exchange and hands the Initiator's timestamps to the
/// Responder
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FinalFrame {
    /// The frame header
    pub header: Header,
    /// When the Initiator sent the Poll
    pub tx1: WireTimestamp,
    /// When the Initiator received the Response
    pub rx2: WireTimestamp,
    /// When the Initiator sends this frame
    pub tx3: WireTimestamp,
}

impl FinalFrame {
    /// Creates a Final addressed to `link`'s peer
    pub fn new(
        link: &Link,
        sequence: u8,
        tx1: WireTimestamp,
        rx2: WireTimestamp,
        tx3: WireTimestamp,
    ) -> Self {
        FinalFrame {
            header: Header::new(link, sequence, FunctionCode::Final),
            tx1,
            rx2,
            tx3,
        }
    }
}

impl<'a> TryRead<'a, Endian> for FinalFrame {
    fn try_read(bytes: &'a [u8], endian: Endian) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;
        let header = bytes.read_with::<Header>(offset, endian)?;
        let tx1 = WireTimestamp::new(bytes.read_with::<u32>(offset, endian)?);
        let rx2 = WireTimestamp::new(bytes.read_with::<u32>(offset, endian)?);
        let tx3 = WireTimestamp::new(bytes.read_with::<u32>(offset, endian)?);

        Ok((
            FinalFrame {
                header,
                tx1,
                rx2,
                tx3,
            },
            *offset,
        ))
    }
}

impl TryWrite<Endian> for FinalFrame {
    fn try_write(self, bytes: &mut [u8], endian: Endian) -> byte::Result<usize> {
        let offset = &mut 0;
        bytes.write_with(offset, self.header, endian)?;
        bytes.write_with::<u32>(offset, self.tx1.value(), endian)?;
        bytes.write_with::<u32>(offset, self.rx2.value(), endian)?;
        bytes.write_with::<u32>(offset, self.tx3.value(), endian)?;

        Ok(*offset)
    }
}

impl Frame for FinalFrame {
    const FUNCTION: FunctionCode = FunctionCode::Final;
    const LEN: usize = Header::LEN + 12;

    fn header(&self) -> &Header {
        &self.header
    }
}

fn read_u8(bytes: &[u8], offset: &mut usize) -> byte::Result<u8> {
    let value = *bytes.get(*offset).ok_or(byte::Error::Incomplete)?;
    *offset += 1;
    Ok(value)
}

fn write_u8(bytes: &mut [u8], offset: &mut usize, value: u8) -> byte::Result<()> {
    let slot = bytes.get_mut(*offset).ok_or(byte::Error::Incomplete)?;
    *slot = value;
    *offset += 1;
    Ok(())
}

// Short addresses are held in big-endian order, like the radio's PANADR
// register is read, and sent little-endian like every other field.
fn short_address(value: u16) -> Ieee802154Address {
    Ieee802154Address::Short(value.to_be_bytes())
}

fn short_value(address: Ieee802154Address) -> byte::Result<u16> {
    match address {
        Ieee802154Address::Short(bytes) => Ok(u16::from_be_bytes(bytes)),
        _ => Err(byte::Error::BadInput {
            err: "ranging frames only carry short addresses",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{configs::Addressing, hl::Role};

    fn links() -> (Link, Link) {
        let addressing = Addressing::default();
        (
            addressing.link(Role::Initiator),
            addressing.link(Role::Responder),
        )
    }

    #[test]
    fn poll_wire_layout() {
        let (initiator, _) = links();
        let mut buffer = [0; MAX_FRAME_LEN];

        let len = PollFrame::new(&initiator, 7).encode(&mut buffer).unwrap();

        assert_eq!(len, PollFrame::LEN);
        assert_eq!(
            &buffer[..len],
            &[0x41, 0x88, 7, 0xCA, 0xDE, b'W', b'A', b'V', b'E', 0x21]
        );
    }

    #[test]
    fn response_wire_layout() {
        let (_, responder) = links();
        let mut buffer = [0; MAX_FRAME_LEN];

        let len = ResponseFrame::new(&responder, 0)
            .encode(&mut buffer)
            .unwrap();

        assert_eq!(
            &buffer[..len],
            &[0x41, 0x88, 0, 0xCA, 0xDE, b'V', b'E', b'W', b'A', 0x10, 0x02]
        );
    }

    #[test]
    fn final_wire_layout() {
        let (initiator, _) = links();
        let mut buffer = [0; MAX_FRAME_LEN];

        let frame = FinalFrame::new(
            &initiator,
            3,
            WireTimestamp::new(0x04030201),
            WireTimestamp::new(0x08070605),
            WireTimestamp::new(0x0c0b0a09),
        );
        let len = frame.encode(&mut buffer).unwrap();

        assert_eq!(len, 22);
        assert_eq!(&buffer[9..], &[0x23, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn frames_survive_validation() {
        let (initiator, responder) = links();
        let mut buffer = [0; MAX_FRAME_LEN];

        let poll = PollFrame::new(&initiator, 255);
        let len = poll.encode(&mut buffer).unwrap();
        assert_eq!(validate::<PollFrame>(&buffer[..len], &responder), Some(poll));

        let response = ResponseFrame::new(&responder, 1);
        let len = response.encode(&mut buffer).unwrap();
        assert_eq!(
            validate::<ResponseFrame>(&buffer[..len], &initiator),
            Some(response)
        );

        let last = FinalFrame::new(
            &initiator,
            2,
            WireTimestamp::new(u32::MAX),
            WireTimestamp::new(0),
            WireTimestamp::new(0x8000_0000),
        );
        let len = last.encode(&mut buffer).unwrap();
        assert_eq!(validate::<FinalFrame>(&buffer[..len], &responder), Some(last));
    }

    #[test]
    fn trailing_fcs_is_ignored() {
        let (initiator, responder) = links();
        let mut buffer = [0xAA; MAX_FRAME_LEN];

        let len = PollFrame::new(&initiator, 0).encode(&mut buffer).unwrap();

        assert!(validate::<PollFrame>(&buffer[..len + FCS_LEN], &responder).is_some());
    }

    #[test]
    fn short_buffer_is_not_a_frame() {
        let (initiator, _) = links();
        let mut buffer = [0; MAX_FRAME_LEN];

        let len = ResponseFrame::new(&initiator, 0).encode(&mut buffer).unwrap();

        assert!(validate::<ResponseFrame>(&buffer[..len - 1], &initiator).is_none());
        assert!(ResponseFrame::decode(&buffer[..len - 1]).is_err());
    }

    #[test]
    fn single_field_mutations_are_rejected() {
        let (initiator, responder) = links();
        let original = ResponseFrame::new(&responder, 9);

        let mutations: [fn(&mut ResponseFrame); 6] = [
            |f| f.header.frame_control ^= 0x0001,
            |f| f.header.network_id = Ieee802154Pan(0xCAFE),
            |f| f.header.destination = Ieee802154Address::Short([0x12, 0x34]),
            |f| f.header.source = Ieee802154Address::Short([0x45, 0x56]),
            |f| f.header.function = FunctionCode::Final as u8,
            |f| f.activity = 0x03,
        ];

        for mutate in mutations {
            let mut frame = original;
            mutate(&mut frame);

            let mut buffer = [0; MAX_FRAME_LEN];
            let len = frame.encode(&mut buffer).unwrap();

            assert_eq!(
                validate::<ResponseFrame>(&buffer[..len], &initiator),
                None,
                "{:?}",
                frame
            );
        }
    }

    #[test]
    fn frame_kinds_do_not_cross_validate() {
        let (initiator, responder) = links();
        let mut buffer = [0; MAX_FRAME_LEN];

        let len = FinalFrame::new(
            &initiator,
            0,
            WireTimestamp::default(),
            WireTimestamp::default(),
            WireTimestamp::default(),
        )
        .encode(&mut buffer)
        .unwrap();

        assert!(validate::<PollFrame>(&buffer[..len], &responder).is_none());
        assert!(validate::<FinalFrame>(&buffer[..len], &initiator).is_none());
    }

    #[test]
    fn extended_addresses_cannot_be_encoded() {
        let (initiator, _) = links();
        let mut poll = PollFrame::new(&initiator, 0);
        poll.header.destination = Ieee802154Address::Extended([1; 8]);

        let mut buffer = [0; MAX_FRAME_LEN];
        assert!(poll.encode(&mut buffer).is_err());
    }

    #[test]
    fn function_codes() {
        assert_eq!(FunctionCode::from_u8(0x21), Some(FunctionCode::Poll));
        assert_eq!(FunctionCode::from_u8(0x10), Some(FunctionCode::Response));
        assert_eq!(FunctionCode::from_u8(0x23), Some(FunctionCode::Final));
        assert_eq!(FunctionCode::from_u8(0x22), None);
    }
}
