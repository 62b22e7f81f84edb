//! OpenPGP packet framing.
//!
//! This module reads RFC 4880 packet headers in both the old and the new
//! format, including partial and indeterminate body lengths, and hands out
//! packet bodies either whole or as streaming readers. Typed packet bodies
//! live in the submodules.

use crate::error::{OracleError, Result};
use crate::validation::{Validator, MAX_PACKET_SIZE};
use std::io::{self, Read};

pub mod key;
pub mod message;
pub mod signature;

pub use key::{Fingerprint, KeyId, PublicKeyAlgorithm, PublicKeyPacket, SecretKeyPacket};
pub use message::{
    CompressionAlgorithm, LiteralDataHeader, OnePassSignaturePacket, PublicKeyEncryptedSessionKey,
};
pub use signature::{KeyFlags, SignaturePacket, SignatureType, Subpacket, SubpacketType};

/// PGP packet types defined in RFC 4880
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Public-Key Encrypted Session Key Packet
    PublicKeyEncryptedSessionKey = 1,
    /// Signature Packet
    Signature = 2,
    /// Symmetric-Key Encrypted Session Key Packet
    SymmetricKeyEncryptedSessionKey = 3,
    /// One-Pass Signature Packet
    OnePassSignature = 4,
    /// Secret-Key Packet
    SecretKey = 5,
    /// Public-Key Packet
    PublicKey = 6,
    /// Secret-Subkey Packet
    SecretSubkey = 7,
    /// Compressed Data Packet
    CompressedData = 8,
    /// Symmetrically Encrypted Data Packet
    SymmetricallyEncryptedData = 9,
    /// Marker Packet
    Marker = 10,
    /// Literal Data Packet
    LiteralData = 11,
    /// Trust Packet
    Trust = 12,
    /// User ID Packet
    UserId = 13,
    /// Public-Subkey Packet
    PublicSubkey = 14,
    /// User Attribute Packet
    UserAttribute = 17,
    /// Sym. Encrypted and Integrity Protected Data Packet
    SymEncryptedIntegrityProtectedData = 18,
    /// Modification Detection Code Packet
    ModificationDetectionCode = 19,
}

impl PacketType {
    /// Convert packet type to byte value
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Convert byte value to packet type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::PublicKeyEncryptedSessionKey),
            2 => Some(Self::Signature),
            3 => Some(Self::SymmetricKeyEncryptedSessionKey),
            4 => Some(Self::OnePassSignature),
            5 => Some(Self::SecretKey),
            6 => Some(Self::PublicKey),
            7 => Some(Self::SecretSubkey),
            8 => Some(Self::CompressedData),
            9 => Some(Self::SymmetricallyEncryptedData),
            10 => Some(Self::Marker),
            11 => Some(Self::LiteralData),
            12 => Some(Self::Trust),
            13 => Some(Self::UserId),
            14 => Some(Self::PublicSubkey),
            17 => Some(Self::UserAttribute),
            18 => Some(Self::SymEncryptedIntegrityProtectedData),
            19 => Some(Self::ModificationDetectionCode),
            _ => None,
        }
    }
}

/// How the length of a packet body is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    /// The body is exactly this many bytes
    Fixed(usize),
    /// The body starts with a chunk of this many bytes and more chunks follow
    Partial(usize),
    /// The body extends to the end of the enclosing stream
    Indeterminate,
}

/// PGP packet header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    /// Raw packet tag
    pub tag: u8,
    /// Packet body length
    pub length: BodyLength,
    /// Whether this uses new packet format
    pub new_format: bool,
}

impl PacketHeader {
    /// Create a new-format header with a fixed body length
    pub fn new(packet_type: PacketType, length: usize) -> Self {
        Self {
            tag: packet_type.to_byte(),
            length: BodyLength::Fixed(length),
            new_format: true,
        }
    }

    /// The packet type, if the tag is one this crate knows about
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_byte(self.tag)
    }

    /// Serialize a new-format header with a fixed length.
    ///
    /// Only fixed lengths can be written; partial and indeterminate lengths
    /// are a property of how a body is streamed, not of the header alone.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let length = match self.length {
            BodyLength::Fixed(length) => length,
            _ => return Err(OracleError::packet("Only fixed lengths can be serialized")),
        };
        let mut bytes = vec![0xC0 | (self.tag & 0x3F)];
        if length < 192 {
            bytes.push(length as u8);
        } else if length < 8384 {
            let encoded = length - 192;
            bytes.push(192 + (encoded >> 8) as u8);
            bytes.push((encoded & 0xFF) as u8);
        } else {
            let length = u32::try_from(length)
                .map_err(|_| OracleError::packet("Packet length exceeds 32 bits"))?;
            bytes.push(0xFF);
            bytes.extend_from_slice(&length.to_be_bytes());
        }
        Ok(bytes)
    }

    /// Parse a packet header from the start of `data`, returning the header
    /// and the number of bytes it occupied.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        let mut cursor = data;
        let header = Self::read_from(&mut cursor)?
            .ok_or_else(|| OracleError::validation("Empty packet header"))?;
        Ok((header, data.len() - cursor.len()))
    }

    /// Read a packet header from a stream. Returns `None` on a clean end of
    /// stream before the first header byte.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Self>> {
        let mut first = [0u8; 1];
        loop {
            match reader.read(&mut first) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let first_byte = first[0];

        if (first_byte & 0x80) == 0 {
            return Err(OracleError::packet(format!(
                "Invalid packet header byte {:#04x}: MSB not set",
                first_byte
            )));
        }

        if (first_byte & 0x40) != 0 {
            let tag = first_byte & 0x3F;
            let length = read_new_format_length(reader)?;
            Ok(Some(Self {
                tag,
                length,
                new_format: true,
            }))
        } else {
            let tag = (first_byte >> 2) & 0x0F;
            let length = match first_byte & 0x03 {
                0 => BodyLength::Fixed(read_u8(reader)? as usize),
                1 => {
                    let mut buf = [0u8; 2];
                    read_exact(reader, &mut buf)?;
                    BodyLength::Fixed(u16::from_be_bytes(buf) as usize)
                }
                2 => {
                    let mut buf = [0u8; 4];
                    read_exact(reader, &mut buf)?;
                    let len = u32::from_be_bytes(buf) as usize;
                    Validator::validate_packet_size(len)?;
                    BodyLength::Fixed(len)
                }
                _ => BodyLength::Indeterminate,
            };
            Ok(Some(Self {
                tag,
                length,
                new_format: false,
            }))
        }
    }
}

/// A complete PGP packet with header and body
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header
    pub header: PacketHeader,
    /// Packet body data
    pub body: Vec<u8>,
}

impl Packet {
    /// Create a new packet
    pub fn new(packet_type: PacketType, body: Vec<u8>) -> Self {
        let header = PacketHeader::new(packet_type, body.len());
        Self { header, body }
    }

    /// The packet type, if known
    pub fn packet_type(&self) -> Option<PacketType> {
        self.header.packet_type()
    }

    /// Serialize packet to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let header = PacketHeader {
            tag: self.header.tag,
            length: BodyLength::Fixed(self.body.len()),
            new_format: true,
        };
        let mut bytes = header.to_bytes()?;
        bytes.extend_from_slice(&self.body);
        Ok(bytes)
    }

    /// Parse the first packet in `data`
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        PacketReader::new(data)
            .next_packet()?
            .ok_or_else(|| OracleError::packet("No packet found"))
    }

    /// Parse every packet in `data`
    pub fn parse_all(data: &[u8]) -> Result<Vec<Self>> {
        let mut reader = PacketReader::new(data);
        let mut packets = Vec::new();
        while let Some(packet) = reader.next_packet()? {
            packets.push(packet);
        }
        Ok(packets)
    }
}

/// Sequential packet reader over any byte stream
pub struct PacketReader<R> {
    inner: R,
    packets_read: usize,
}

impl<R: Read> PacketReader<R> {
    /// Wrap a stream of concatenated packets
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            packets_read: 0,
        }
    }

    /// Read the next packet header. The previous packet's body must have
    /// been fully consumed.
    pub fn next_header(&mut self) -> Result<Option<PacketHeader>> {
        let header = PacketHeader::read_from(&mut self.inner)?;
        if header.is_some() {
            self.packets_read += 1;
            Validator::validate_packet_count(self.packets_read)?;
        }
        Ok(header)
    }

    /// Streaming reader over the body described by `header`
    pub fn body(&mut self, header: &PacketHeader) -> BodyReader<'_, R> {
        BodyReader::new(&mut self.inner, header.length)
    }

    /// Read the whole body described by `header` into memory
    pub fn read_body(&mut self, header: &PacketHeader) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        self.body(header)
            .take(MAX_PACKET_SIZE as u64 + 1)
            .read_to_end(&mut body)
            .map_err(truncation_to_packet_error)?;
        Validator::validate_packet_size(body.len())?;
        Ok(body)
    }

    /// Discard the body described by `header`
    pub fn skip_body(&mut self, header: &PacketHeader) -> Result<()> {
        io::copy(&mut self.body(header), &mut io::sink()).map_err(truncation_to_packet_error)?;
        Ok(())
    }

    /// Read the next complete packet
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        match self.next_header()? {
            Some(header) => {
                let body = self.read_body(&header)?;
                Ok(Some(Packet { header, body }))
            }
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Last,
    MoreFollow,
    ToEnd,
}

/// Reader over one packet body, reassembling partial-length chunks
pub struct BodyReader<'a, R> {
    inner: &'a mut R,
    remaining: usize,
    state: ChunkState,
}

impl<'a, R: Read> BodyReader<'a, R> {
    fn new(inner: &'a mut R, length: BodyLength) -> Self {
        let (remaining, state) = match length {
            BodyLength::Fixed(n) => (n, ChunkState::Last),
            BodyLength::Partial(n) => (n, ChunkState::MoreFollow),
            BodyLength::Indeterminate => (0, ChunkState::ToEnd),
        };
        Self {
            inner,
            remaining,
            state,
        }
    }
}

impl<R: Read> Read for BodyReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.state == ChunkState::ToEnd {
                return self.inner.read(buf);
            }
            if self.remaining > 0 {
                let want = buf.len().min(self.remaining);
                let got = self.inner.read(&mut buf[..want])?;
                if got == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "packet body truncated",
                    ));
                }
                self.remaining -= got;
                return Ok(got);
            }
            if self.state == ChunkState::Last {
                return Ok(0);
            }
            let next = read_new_format_length(&mut *self.inner)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
            match next {
                BodyLength::Fixed(n) => {
                    self.remaining = n;
                    self.state = ChunkState::Last;
                }
                BodyLength::Partial(n) => {
                    self.remaining = n;
                }
                BodyLength::Indeterminate => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "indeterminate length inside partial body",
                    ))
                }
            }
        }
    }
}

/// User ID packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdPacket {
    /// Raw packet body, as hashed by certifications
    pub raw: Vec<u8>,
}

impl UserIdPacket {
    /// Parse from packet body bytes with validation
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Validator::validate_user_id(data)?;
        Ok(Self { raw: data.to_vec() })
    }

    /// The User ID as text, replacing invalid UTF-8
    pub fn user_id(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// Read a new-format body length
fn read_new_format_length<R: Read + ?Sized>(reader: &mut R) -> Result<BodyLength> {
    let first = read_u8(reader)?;
    let length = match first {
        0..=191 => BodyLength::Fixed(first as usize),
        192..=223 => {
            let second = read_u8(reader)?;
            BodyLength::Fixed(((first as usize - 192) << 8) + second as usize + 192)
        }
        224..=254 => BodyLength::Partial(1usize << (first & 0x1F)),
        255 => {
            let mut buf = [0u8; 4];
            read_exact(reader, &mut buf)?;
            let len = u32::from_be_bytes(buf) as usize;
            Validator::validate_packet_size(len)?;
            BodyLength::Fixed(len)
        }
    };
    Ok(length)
}

fn read_u8<R: Read + ?Sized>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf)?;
    Ok(buf[0])
}

fn read_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => OracleError::packet("Truncated packet header"),
            _ => e.into(),
        })
}

/// Convert stream truncation and malformed chunk errors into packet errors
pub(crate) fn truncation_to_packet_error(e: io::Error) -> OracleError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
            OracleError::packet(format!("Malformed packet body: {}", e))
        }
        _ => e.into(),
    }
}

/// Read a multiprecision integer starting at `offset`, returning the raw
/// bytes (length prefix included) and the offset just past it.
pub(crate) fn read_mpi(data: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let bits = Validator::validate_u16_from_bytes(data, offset)? as usize;
    let len = bits.div_ceil(8);
    let end = offset + 2 + len;
    Validator::validate_slice_extraction(data, offset, 2 + len)?;
    Ok((&data[offset..end], end))
}
