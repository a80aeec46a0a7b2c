//! Minimal SMPP 3.4 PDU codec: just enough of a transmitter to bind, submit
//! one short message, answer `enquire_link`, and unbind.
//!
//! Every PDU is a 16-octet big-endian header
//! `(command_length, command_id, command_status, sequence_number)` followed
//! by a body of C-octet strings and single-octet integers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const HEADER_LEN: usize = 16;
/// Upper bound on accepted frames. Anything larger is treated as garbage.
pub const MAX_PDU_LEN: usize = 64 * 1024;
/// `short_message` is length-prefixed by a single octet; 255 is reserved.
pub const MAX_SHORT_MESSAGE: usize = 254;
pub const INTERFACE_VERSION: u8 = 0x34;

pub const GENERIC_NACK: u32 = 0x8000_0000;
pub const BIND_TRANSMITTER: u32 = 0x0000_0002;
pub const BIND_TRANSMITTER_RESP: u32 = 0x8000_0002;
pub const SUBMIT_SM: u32 = 0x0000_0004;
pub const SUBMIT_SM_RESP: u32 = 0x8000_0004;
pub const UNBIND: u32 = 0x0000_0006;
pub const UNBIND_RESP: u32 = 0x8000_0006;
pub const ENQUIRE_LINK: u32 = 0x0000_0015;
pub const ENQUIRE_LINK_RESP: u32 = 0x8000_0015;

/// `command_status` for a request the ESME does not handle.
pub const ESME_RINVCMDID: u32 = 0x0000_0003;

const RESPONSE_BIT: u32 = 0x8000_0000;

// Type of number / numbering plan indicator.
const TON_UNKNOWN: u8 = 0x00;
const TON_INTERNATIONAL: u8 = 0x01;
const NPI_UNKNOWN: u8 = 0x00;

// C-octet field sizes including the terminating NUL.
const SYSTEM_ID_MAX: usize = 16;
const PASSWORD_MAX: usize = 9;
const SYSTEM_TYPE_MAX: usize = 13;
const SERVICE_TYPE_MAX: usize = 6;
const ADDRESS_MAX: usize = 21;

#[derive(Debug, thiserror::Error)]
pub enum SmppError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out talking to the SMSC")]
    Timeout,
    #[error("malformed pdu: {0}")]
    Malformed(&'static str),
    #[error("{field} is longer than {max} octets")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("message is {0} octets, limit is {MAX_SHORT_MESSAGE}")]
    MessageTooLong(usize),
    #[error("unexpected command 0x{actual:08x}, expected 0x{expected:08x}")]
    UnexpectedCommand { expected: u32, actual: u32 },
    #[error("response sequence {actual} does not match request {expected}")]
    SequenceMismatch { expected: u32, actual: u32 },
    #[error("SMSC rejected command 0x{command_id:08x} with status 0x{status:08x}")]
    Rejected { command_id: u32, status: u32 },
}

/// One framed PDU. The body is kept raw; typed bodies decode from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub command_id: u32,
    pub command_status: u32,
    pub sequence_number: u32,
    pub body: Bytes,
}

impl Pdu {
    pub fn request(command_id: u32, sequence_number: u32, body: Bytes) -> Self {
        Self {
            command_id,
            command_status: 0,
            sequence_number,
            body,
        }
    }

    /// Response to `self` with the same sequence number.
    pub fn response(&self, command_status: u32, body: Bytes) -> Self {
        Self {
            command_id: self.command_id | RESPONSE_BIT,
            command_status,
            sequence_number: self.sequence_number,
            body,
        }
    }

    pub fn is_response(&self) -> bool {
        self.command_id & RESPONSE_BIT != 0
    }

    pub fn encode(&self) -> Bytes {
        let len = HEADER_LEN + self.body.len();
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u32(len as u32);
        buf.put_u32(self.command_id);
        buf.put_u32(self.command_status);
        buf.put_u32(self.sequence_number);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Split one complete frame off the front of `buf`.
    /// `Ok(None)` means more bytes are needed.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, SmppError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if !(HEADER_LEN..=MAX_PDU_LEN).contains(&len) {
            return Err(SmppError::Malformed("command_length out of range"));
        }
        if buf.len() < len {
            return Ok(None);
        }
        let mut frame = buf.split_to(len).freeze();
        frame.advance(4);
        let command_id = frame.get_u32();
        let command_status = frame.get_u32();
        let sequence_number = frame.get_u32();
        Ok(Some(Self {
            command_id,
            command_status,
            sequence_number,
            body: frame,
        }))
    }
}

/// `bind_transmitter` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindTransmitter {
    pub system_id: String,
    pub password: String,
    pub system_type: String,
}

impl BindTransmitter {
    pub fn encode(&self) -> Result<Bytes, SmppError> {
        let mut buf = BytesMut::new();
        put_c_octet(&mut buf, "system_id", &self.system_id, SYSTEM_ID_MAX)?;
        put_c_octet(&mut buf, "password", &self.password, PASSWORD_MAX)?;
        put_c_octet(&mut buf, "system_type", &self.system_type, SYSTEM_TYPE_MAX)?;
        buf.put_u8(INTERFACE_VERSION);
        buf.put_u8(TON_UNKNOWN);
        buf.put_u8(NPI_UNKNOWN);
        // address_range
        buf.put_u8(0);
        Ok(buf.freeze())
    }

    pub fn decode(mut body: Bytes) -> Result<Self, SmppError> {
        let system_id = get_c_octet(&mut body)?;
        let password = get_c_octet(&mut body)?;
        let system_type = get_c_octet(&mut body)?;
        Ok(Self {
            system_id,
            password,
            system_type,
        })
    }
}

/// `submit_sm` body for a single short message between international numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitSm {
    pub service_type: String,
    pub source_addr: String,
    pub destination_addr: String,
    pub short_message: Bytes,
}

impl SubmitSm {
    pub fn encode(&self) -> Result<Bytes, SmppError> {
        if self.short_message.len() > MAX_SHORT_MESSAGE {
            return Err(SmppError::MessageTooLong(self.short_message.len()));
        }
        let mut buf = BytesMut::new();
        put_c_octet(&mut buf, "service_type", &self.service_type, SERVICE_TYPE_MAX)?;
        buf.put_u8(TON_INTERNATIONAL);
        buf.put_u8(NPI_UNKNOWN);
        put_c_octet(&mut buf, "source_addr", &self.source_addr, ADDRESS_MAX)?;
        buf.put_u8(TON_INTERNATIONAL);
        buf.put_u8(NPI_UNKNOWN);
        put_c_octet(
            &mut buf,
            "destination_addr",
            &self.destination_addr,
            ADDRESS_MAX,
        )?;
        buf.put_u8(0); // esm_class
        buf.put_u8(0); // protocol_id
        buf.put_u8(1); // priority_flag
        buf.put_u8(0); // schedule_delivery_time: immediate
        buf.put_u8(0); // validity_period: SMSC default
        buf.put_u8(0); // registered_delivery
        buf.put_u8(0); // replace_if_present_flag
        buf.put_u8(0); // data_coding: SMSC default alphabet
        buf.put_u8(0); // sm_default_msg_id
        buf.put_u8(self.short_message.len() as u8);
        buf.put_slice(&self.short_message);
        Ok(buf.freeze())
    }

    pub fn decode(mut body: Bytes) -> Result<Self, SmppError> {
        let service_type = get_c_octet(&mut body)?;
        skip(&mut body, 2)?;
        let source_addr = get_c_octet(&mut body)?;
        skip(&mut body, 2)?;
        let destination_addr = get_c_octet(&mut body)?;
        skip(&mut body, 3)?;
        get_c_octet(&mut body)?;
        get_c_octet(&mut body)?;
        skip(&mut body, 4)?;
        let sm_length = get_u8(&mut body)? as usize;
        if body.remaining() < sm_length {
            return Err(SmppError::Malformed("short_message truncated"));
        }
        let short_message = body.split_to(sm_length);
        Ok(Self {
            service_type,
            source_addr,
            destination_addr,
            short_message,
        })
    }
}

/// First C-octet string of a response body (`system_id` or `message_id`).
/// Error responses may carry an empty body, which yields an empty string.
pub fn response_id(body: &Bytes) -> Result<String, SmppError> {
    if body.is_empty() {
        return Ok(String::new());
    }
    get_c_octet(&mut body.clone())
}

pub fn c_octet(value: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(value.len() + 1);
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
    buf.freeze()
}

fn put_c_octet(
    buf: &mut BytesMut,
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), SmppError> {
    if value.len() + 1 > max {
        return Err(SmppError::FieldTooLong { field, max: max - 1 });
    }
    if value.bytes().any(|b| b == 0) {
        return Err(SmppError::Malformed("NUL inside C-octet string"));
    }
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
    Ok(())
}

fn get_c_octet(buf: &mut Bytes) -> Result<String, SmppError> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(SmppError::Malformed("unterminated C-octet string"))?;
    let raw = buf.split_to(end);
    buf.advance(1);
    String::from_utf8(raw.to_vec()).map_err(|_| SmppError::Malformed("C-octet string is not UTF-8"))
}

fn get_u8(buf: &mut Bytes) -> Result<u8, SmppError> {
    if !buf.has_remaining() {
        return Err(SmppError::Malformed("body truncated"));
    }
    Ok(buf.get_u8())
}

fn skip(buf: &mut Bytes, n: usize) -> Result<(), SmppError> {
    if buf.remaining() < n {
        return Err(SmppError::Malformed("body truncated"));
    }
    buf.advance(n);
    Ok(())
}
