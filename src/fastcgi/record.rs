//! FastCGI record encoding and decoding.
//!
//! Every record starts with an 8-byte header:
//! ```text
//! ┌─────────┬──────┬────────────┬────────────────┬─────────┬──────────┐
//! │ Version │ Type │ Request ID │ Content Length │ Padding │ Reserved │
//! │ 1 byte  │1 byte│ uint16 BE  │ uint16 BE      │ 1 byte  │ 1 byte   │
//! └─────────┴──────┴────────────┴────────────────┴─────────┴──────────┘
//! ```
//!
//! Content follows the header, then `padding` zero bytes.

use bytes::Bytes;

use crate::error::{FuncwireError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// The only protocol version.
pub const VERSION_1: u8 = 1;

/// Largest content a single record can carry.
pub const MAX_CONTENT_LENGTH: usize = 65535;

/// Request ID of management records.
pub const NULL_REQUEST_ID: u16 = 0;

/// Outgoing records are padded to a multiple of this.
pub const PADDING_ALIGN: usize = 8;

/// Flags of a `BEGIN_REQUEST` body.
pub mod flags {
    /// Keep the connection open after the response.
    pub const KEEP_CONN: u8 = 0b0000_0001;
}

/// Record type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    BeginRequest,
    AbortRequest,
    EndRequest,
    Params,
    Stdin,
    Stdout,
    Stderr,
    Data,
    GetValues,
    GetValuesResult,
    UnknownType,
    /// Any type this side does not know.
    Other(u8),
}

impl RecordType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::BeginRequest,
            2 => Self::AbortRequest,
            3 => Self::EndRequest,
            4 => Self::Params,
            5 => Self::Stdin,
            6 => Self::Stdout,
            7 => Self::Stderr,
            8 => Self::Data,
            9 => Self::GetValues,
            10 => Self::GetValuesResult,
            11 => Self::UnknownType,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::BeginRequest => 1,
            Self::AbortRequest => 2,
            Self::EndRequest => 3,
            Self::Params => 4,
            Self::Stdin => 5,
            Self::Stdout => 6,
            Self::Stderr => 7,
            Self::Data => 8,
            Self::GetValues => 9,
            Self::GetValuesResult => 10,
            Self::UnknownType => 11,
            Self::Other(other) => *other,
        }
    }
}

/// Role requested by `BEGIN_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Responder,
    Authorizer,
    Filter,
    Other(u16),
}

impl Role {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::Responder,
            2 => Self::Authorizer,
            3 => Self::Filter,
            other => Self::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Responder => 1,
            Self::Authorizer => 2,
            Self::Filter => 3,
            Self::Other(other) => *other,
        }
    }
}

/// Protocol status of `END_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProtocolStatus {
    RequestComplete = 0,
    CantMultiplexConnection = 1,
    Overloaded = 2,
    UnknownRole = 3,
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub record_type: RecordType,
    pub request_id: u16,
    pub content_length: u16,
    pub padding_length: u8,
}

impl Header {
    /// Create a version 1 header, padded so the record ends on an 8-byte
    /// boundary.
    pub fn new(record_type: RecordType, request_id: u16, content_length: u16) -> Self {
        Self {
            version: VERSION_1,
            record_type,
            request_id,
            content_length,
            padding_length: padding_for(content_length as usize),
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use funcwire::fastcgi::{Header, RecordType};
    ///
    /// let header = Header::new(RecordType::Stdout, 1, 5);
    /// assert_eq!(header.encode(), [1, 6, 0, 1, 0, 5, 3, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.version;
        buf[1] = self.record_type.as_u8();
        buf[2..4].copy_from_slice(&self.request_id.to_be_bytes());
        buf[4..6].copy_from_slice(&self.content_length.to_be_bytes());
        buf[6] = self.padding_length;
        buf
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: buf[0],
            record_type: RecordType::from_u8(buf[1]),
            request_id: u16::from_be_bytes([buf[2], buf[3]]),
            content_length: u16::from_be_bytes([buf[4], buf[5]]),
            padding_length: buf[6],
        })
    }

    /// Reject versions other than 1.
    pub fn validate(&self) -> Result<()> {
        if self.version != VERSION_1 {
            return Err(FuncwireError::Protocol(format!(
                "invalid header version {}",
                self.version
            )));
        }
        Ok(())
    }

    /// Check if this is a management record.
    #[inline]
    pub fn is_management(&self) -> bool {
        self.request_id == NULL_REQUEST_ID
    }

    /// Content plus padding that follows the header.
    #[inline]
    pub fn body_length(&self) -> usize {
        self.content_length as usize + self.padding_length as usize
    }
}

/// Padding needed after `content_length` bytes of content.
#[inline]
pub fn padding_for(content_length: usize) -> u8 {
    ((PADDING_ALIGN - content_length % PADDING_ALIGN) % PADDING_ALIGN) as u8
}

/// A complete record with padding removed.
#[derive(Debug, Clone)]
pub struct Record {
    pub header: Header,
    pub content: Bytes,
}

impl Record {
    pub fn new(header: Header, content: Bytes) -> Self {
        Self { header, content }
    }

    #[inline]
    pub fn record_type(&self) -> RecordType {
        self.header.record_type
    }

    #[inline]
    pub fn request_id(&self) -> u16 {
        self.header.request_id
    }
}

/// Body of `BEGIN_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginRequestBody {
    pub role: Role,
    pub flags: u8,
}

impl BeginRequestBody {
    pub const SIZE: usize = 8;

    pub fn decode(content: &[u8]) -> Result<Self> {
        if content.len() < Self::SIZE {
            return Err(FuncwireError::Protocol(format!(
                "BEGIN_REQUEST body is {} bytes, expected {}",
                content.len(),
                Self::SIZE
            )));
        }
        Ok(Self {
            role: Role::from_u16(u16::from_be_bytes([content[0], content[1]])),
            flags: content[2],
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.role.as_u16().to_be_bytes());
        buf[2] = self.flags;
        buf
    }

    #[inline]
    pub fn keep_conn(&self) -> bool {
        self.flags & flags::KEEP_CONN != 0
    }
}

/// Body of `END_REQUEST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndRequestBody {
    pub app_status: u32,
    pub protocol_status: ProtocolStatus,
}

impl EndRequestBody {
    pub const SIZE: usize = 8;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.app_status.to_be_bytes());
        buf[4] = self.protocol_status as u8;
        buf
    }
}

/// Body of `UNKNOWN_TYPE`, echoing the type that was not understood.
pub fn unknown_type_body(record_type: RecordType) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0] = record_type.as_u8();
    buf
}
