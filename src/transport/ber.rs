//! Minimal BER codec for LDAPv3 bind operations
//!
//! Only the handful of shapes needed for a SASL bind round trip are
//! implemented: definite-length TLVs, INTEGER/ENUMERATED, OCTET STRING,
//! and the BindRequest/BindResponse envelopes.

use crate::{ProbeError, Result};

pub(crate) const TAG_SEQUENCE: u8 = 0x30;
pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_OCTET_STRING: u8 = 0x04;
pub(crate) const TAG_ENUMERATED: u8 = 0x0A;
/// [APPLICATION 0] BindRequest
pub(crate) const TAG_BIND_REQUEST: u8 = 0x60;
/// [APPLICATION 1] BindResponse
pub(crate) const TAG_BIND_RESPONSE: u8 = 0x61;
/// [3] SaslCredentials inside a BindRequest
pub(crate) const TAG_SASL_CREDENTIALS: u8 = 0xA3;
/// [7] serverSaslCreds inside a BindResponse
pub(crate) const TAG_SERVER_SASL_CREDS: u8 = 0x87;

/// Append one definite-length TLV
pub(crate) fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    write_length(out, content.len());
    out.extend_from_slice(content);
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}

/// Encode a SASL BindRequest wrapped in an LDAPMessage
pub(crate) fn encode_sasl_bind_request(
    message_id: i32,
    dn: &str,
    mechanism: &str,
    credentials: &[u8],
) -> Vec<u8> {
    let mut sasl = Vec::new();
    write_tlv(&mut sasl, TAG_OCTET_STRING, mechanism.as_bytes());
    write_tlv(&mut sasl, TAG_OCTET_STRING, credentials);

    let mut bind = Vec::new();
    write_tlv(&mut bind, TAG_INTEGER, &[0x03]); // LDAP version 3
    write_tlv(&mut bind, TAG_OCTET_STRING, dn.as_bytes());
    write_tlv(&mut bind, TAG_SASL_CREDENTIALS, &sasl);

    let mut body = Vec::new();
    write_tlv(&mut body, TAG_INTEGER, &encode_integer(message_id));
    write_tlv(&mut body, TAG_BIND_REQUEST, &bind);

    let mut message = Vec::new();
    write_tlv(&mut message, TAG_SEQUENCE, &body);
    message
}

fn encode_integer(value: i32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 3 && bytes[start] == 0 && bytes[start + 1] & 0x80 == 0 {
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Decoded BindResponse fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BindResponse {
    pub message_id: i32,
    pub result_code: u32,
    pub matched_dn: String,
    pub diagnostic_message: String,
    pub server_sasl_creds: Option<Vec<u8>>,
}

/// Cursor over BER content
pub(crate) struct BerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read the next TLV, returning its tag and content slice
    pub(crate) fn read_tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let tag = *self
            .data
            .get(self.pos)
            .ok_or_else(|| malformed("unexpected end of message"))?;
        self.pos += 1;

        let first = *self
            .data
            .get(self.pos)
            .ok_or_else(|| malformed("truncated length"))?;
        self.pos += 1;

        let len = if first & 0x80 == 0 {
            first as usize
        } else {
            let count = (first & 0x7F) as usize;
            if count == 0 || count > 4 {
                return Err(malformed("unsupported length encoding"));
            }
            let mut len = 0usize;
            for _ in 0..count {
                let b = *self
                    .data
                    .get(self.pos)
                    .ok_or_else(|| malformed("truncated length"))?;
                self.pos += 1;
                len = (len << 8) | b as usize;
            }
            len
        };

        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| malformed("content length out of bounds"))?;
        let content = &self.data[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    pub(crate) fn expect(&mut self, expected: u8) -> Result<&'a [u8]> {
        let (tag, content) = self.read_tlv()?;
        if tag != expected {
            return Err(malformed(&format!(
                "expected tag 0x{:02X}, found 0x{:02X}",
                expected, tag
            )));
        }
        Ok(content)
    }

    pub(crate) fn read_integer(&mut self, tag: u8) -> Result<i64> {
        let content = self.expect(tag)?;
        if content.is_empty() || content.len() > 8 {
            return Err(malformed("integer of unsupported width"));
        }
        let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
        for &b in content {
            value = (value << 8) | b as i64;
        }
        Ok(value)
    }
}

fn malformed(detail: &str) -> ProbeError {
    ProbeError::Protocol(format!("malformed BER message: {}", detail))
}

/// Decode one LDAPMessage holding a BindResponse
pub(crate) fn decode_bind_response(message: &[u8]) -> Result<BindResponse> {
    let mut outer = BerReader::new(message);
    let body = outer.expect(TAG_SEQUENCE)?;

    let mut reader = BerReader::new(body);
    let message_id = reader.read_integer(TAG_INTEGER)? as i32;
    let bind = reader.expect(TAG_BIND_RESPONSE)?;

    let mut fields = BerReader::new(bind);
    let result_code = fields.read_integer(TAG_ENUMERATED)? as u32;
    let matched_dn = String::from_utf8_lossy(fields.expect(TAG_OCTET_STRING)?).into_owned();
    let diagnostic_message =
        String::from_utf8_lossy(fields.expect(TAG_OCTET_STRING)?).into_owned();

    let mut server_sasl_creds = None;
    while !fields.is_empty() {
        match fields.peek_tag() {
            Some(TAG_SERVER_SASL_CREDS) => {
                server_sasl_creds = Some(fields.expect(TAG_SERVER_SASL_CREDS)?.to_vec());
            }
            // Referrals and controls are irrelevant to bind probing
            _ => {
                fields.read_tlv()?;
            }
        }
    }

    Ok(BindResponse {
        message_id,
        result_code,
        matched_dn,
        diagnostic_message,
        server_sasl_creds,
    })
}
