//! NTLMSSP CHALLENGE parsing for host metadata
//!
//! An SMB session setup response embeds an NTLMSSP CHALLENGE inside its
//! SPNEGO blob. Its target info AV pairs leak the host's NetBIOS and DNS
//! identity, forest name, and boot-relative timestamp; the version field
//! leaks the OS build. All of it is collected without authenticating.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, TimeZone, Utc};

use crate::context::ntlm::NegotiateFlags;
use crate::{ProbeError, Result};

const NTLMSSP_SIGNATURE: &[u8; 8] = b"NTLMSSP\0";
const WINDOWS_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Identity and version information harvested from a CHALLENGE
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HostMetadata {
    pub netbios_computer_name: Option<String>,
    pub netbios_domain_name: Option<String>,
    pub dns_computer_name: Option<String>,
    pub dns_domain_name: Option<String>,
    pub dns_tree_name: Option<String>,
    /// Major.minor OS version from the NTLMSSP version field
    pub os_version: Option<String>,
    pub os_build_number: Option<u16>,
    /// Server clock at challenge generation
    pub challenge_timestamp: Option<DateTime<Utc>>,
    /// Native OS string from the SMBv1 session setup response
    pub native_os: Option<String>,
    pub native_lan_manager: Option<String>,
}

/// Locate an embedded NTLMSSP message in a larger buffer
pub(crate) fn find_ntlmssp(buf: &[u8]) -> Option<&[u8]> {
    buf.windows(8)
        .position(|w| w == NTLMSSP_SIGNATURE)
        .map(|pos| &buf[pos..])
}

/// Parse host metadata out of an NTLMSSP CHALLENGE message.
///
/// Unknown AV pair types are skipped; a truncated pair list yields
/// whatever was decodable before the damage. Parsing the same buffer
/// twice returns identical metadata.
pub fn parse_challenge_metadata(ntlm: &[u8]) -> Result<HostMetadata> {
    if ntlm.len() < 48 || &ntlm[0..8] != NTLMSSP_SIGNATURE {
        return Err(ProbeError::Protocol(
            "buffer does not hold an NTLMSSP message".to_string(),
        ));
    }
    if LittleEndian::read_u32(&ntlm[8..12]) != 2 {
        return Err(ProbeError::Protocol(
            "NTLMSSP message is not a CHALLENGE".to_string(),
        ));
    }

    let mut metadata = HostMetadata::default();
    let flags = NegotiateFlags::from_bits_retain(LittleEndian::read_u32(&ntlm[20..24]));

    // The version field sits right before the payload area referenced by
    // the target name offset
    let target_name_offset = LittleEndian::read_u32(&ntlm[16..20]) as usize;
    if flags.contains(NegotiateFlags::VERSION)
        && target_name_offset >= 56
        && target_name_offset <= ntlm.len()
    {
        let version = &ntlm[target_name_offset - 8..target_name_offset - 4];
        metadata.os_version = Some(format!("{}.{}", version[0], version[1]));
        metadata.os_build_number = Some(LittleEndian::read_u16(&version[2..4]));
    }

    let info_len = LittleEndian::read_u16(&ntlm[40..42]) as usize;
    let info_offset = LittleEndian::read_u32(&ntlm[44..48]) as usize;
    let Some(target_info) = info_offset
        .checked_add(info_len)
        .filter(|&end| end <= ntlm.len())
        .map(|end| &ntlm[info_offset..end])
    else {
        return Ok(metadata);
    };

    for (av_id, value) in lenient_av_pairs(target_info) {
        match av_id {
            0x0001 => metadata.netbios_computer_name = Some(from_utf16le(&value)),
            0x0002 => metadata.netbios_domain_name = Some(from_utf16le(&value)),
            0x0003 => metadata.dns_computer_name = Some(from_utf16le(&value)),
            0x0004 => metadata.dns_domain_name = Some(from_utf16le(&value)),
            0x0005 => metadata.dns_tree_name = Some(from_utf16le(&value)),
            0x0007 if value.len() == 8 => {
                metadata.challenge_timestamp =
                    filetime_to_datetime(LittleEndian::read_u64(&value));
            }
            _ => {}
        }
    }

    Ok(metadata)
}

/// AV pair walk that keeps whatever precedes a truncation instead of
/// discarding the whole list
fn lenient_av_pairs(data: &[u8]) -> Vec<(u16, Vec<u8>)> {
    let mut pairs = Vec::new();
    let mut off = 0usize;
    while off + 4 <= data.len() {
        let av_id = LittleEndian::read_u16(&data[off..off + 2]);
        let av_len = LittleEndian::read_u16(&data[off + 2..off + 4]) as usize;
        off += 4;
        if av_id == 0 {
            break;
        }
        let Some(end) = off.checked_add(av_len).filter(|&end| end <= data.len()) else {
            break;
        };
        pairs.push((av_id, data[off..end].to_vec()));
        off = end;
    }
    pairs
}

/// Native OS and LanMan strings trailing the security blob of an SMBv1
/// session setup response. `buf` is the full frame including the NetBIOS
/// prefix.
pub(crate) fn parse_native_strings(buf: &[u8]) -> Option<(String, String)> {
    if buf.len() < 47 {
        return None;
    }
    let blob_len = LittleEndian::read_u16(&buf[43..45]) as usize;

    // The strings start right after the blob, sometimes behind one byte
    // of alignment padding
    for start in [blob_len + 47, blob_len + 48] {
        if start >= buf.len() {
            continue;
        }
        let decoded = from_utf16le(&buf[start..]);
        let mut parts = decoded.split('\0').filter(|s| !s.is_empty());
        if let (Some(os), Some(lanman)) = (parts.next(), parts.next()) {
            if os.to_lowercase().contains("windows") {
                return Some((os.to_string(), lanman.to_string()));
            }
        }
    }
    None
}

pub(crate) fn from_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(LittleEndian::read_u16)
        .collect();
    String::from_utf16_lossy(&units)
}

fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    let secs = (filetime / 10_000_000) as i64 - WINDOWS_EPOCH_OFFSET_SECS;
    let nanos = ((filetime % 10_000_000) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}
