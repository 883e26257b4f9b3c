//! SMB request builders for signing and dialect negotiation
//!
//! Builds the handful of frames the prober sends: NetBIOS session setup,
//! SMBv1 negotiate and session setup, and their SMBv2 counterparts. The
//! field values reproduce the exchange Windows clients emit, which keeps
//! old servers from rejecting the probe before signing is revealed.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::context::ntlm::NegotiateFlags;
use crate::transport::ber::write_tlv;

/// SMB1 command codes used by the prober
const SMB1_COM_NEGOTIATE: u8 = 0x72;
const SMB1_COM_SESSION_SETUP_ANDX: u8 = 0x73;

/// SMB2 command codes
const SMB2_NEGOTIATE: u16 = 0x0000;
const SMB2_SESSION_SETUP: u16 = 0x0001;

/// SPNEGO OID 1.3.6.1.5.5.2
const SPNEGO_OID: [u8; 6] = [0x2B, 0x06, 0x01, 0x05, 0x05, 0x02];
/// NTLMSSP mechanism OID 1.3.6.1.4.1.311.2.2.10
const NTLMSSP_MECH_OID: [u8; 10] = [0x2B, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x02, 0x0A];

/// Dialects offered when probing SMBv1
const SMB1_DIALECTS: [&str; 6] = [
    "PC NETWORK PROGRAM 1.0",
    "LANMAN1.0",
    "Windows for Workgroups 3.1a",
    "LM1.2X002",
    "LANMAN2.1",
    "NT LM 0.12",
];

/// Dialects offered when discovering SMBv2 support through an SMB1 frame
const SMB2_DISCOVERY_DIALECTS: [&str; 3] = ["NT LM 0.12", "SMB 2.002", "SMB 2.???"];

/// Native OS / LanMan strings reported in the SMBv1 session setup
const NATIVE_OS: &str = "Windows Server 2003 3790 Service Pack 2";
const NATIVE_LAN_MANAGER: &str = "Windows Server 2003 5.2";

/// Prefix a payload with the 4-byte NetBIOS session message header
fn netbios_frame(payload: Vec<u8>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(0x00);
    frame.push(((payload.len() >> 16) & 0xFF) as u8);
    frame.push(((payload.len() >> 8) & 0xFF) as u8);
    frame.push((payload.len() & 0xFF) as u8);
    frame.extend_from_slice(&payload);
    frame
}

/// First-level encode a 16-byte NetBIOS name (each byte becomes two
/// characters in the 'A'..'P' alphabet)
fn netbios_encode_name(name: &[u8; 16]) -> [u8; 32] {
    let mut encoded = [0u8; 32];
    for (i, &b) in name.iter().enumerate() {
        encoded[2 * i] = b'A' + (b >> 4);
        encoded[2 * i + 1] = b'A' + (b & 0x0F);
    }
    encoded
}

/// NetBIOS session request required on port 139 before any SMB traffic.
/// Targets the wildcard `*SMBSERVER` name.
pub fn netbios_session_request() -> Vec<u8> {
    let mut called = [b' '; 16];
    called[..10].copy_from_slice(b"*SMBSERVER");
    let mut calling = [b' '; 16];
    calling[15] = 0x00;

    let mut body = Vec::with_capacity(68);
    body.push(0x20);
    body.extend_from_slice(&netbios_encode_name(&called));
    body.push(0x00);
    body.push(0x20);
    body.extend_from_slice(&netbios_encode_name(&calling));
    body.push(0x00);

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.push(0x81);
    frame.push(0x00);
    frame.push(((body.len() >> 8) & 0xFF) as u8);
    frame.push((body.len() & 0xFF) as u8);
    frame.extend_from_slice(&body);
    frame
}

/// 32-byte SMB1 message header
struct Smb1Header {
    command: u8,
    flags: u8,
    flags2: u16,
    tid: u16,
    pid: u16,
    uid: u16,
    mid: u16,
}

impl Smb1Header {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"\xFFSMB");
        out.push(self.command);
        out.extend_from_slice(&[0x00; 4]); // status
        out.push(self.flags);
        out.write_u16::<LittleEndian>(self.flags2).unwrap();
        out.extend_from_slice(&[0x00; 2]); // PID high
        out.extend_from_slice(&[0x00; 8]); // signature
        out.extend_from_slice(&[0x00; 2]); // reserved
        out.write_u16::<LittleEndian>(self.tid).unwrap();
        out.write_u16::<LittleEndian>(self.pid).unwrap();
        out.write_u16::<LittleEndian>(self.uid).unwrap();
        out.write_u16::<LittleEndian>(self.mid).unwrap();
    }
}

fn smb1_negotiate(header: Smb1Header, dialects: &[&str]) -> Vec<u8> {
    let mut msg = Vec::new();
    header.write(&mut msg);
    msg.push(0x00); // word count

    let mut data = Vec::new();
    for dialect in dialects {
        data.push(0x02); // buffer format: dialect
        data.extend_from_slice(dialect.as_bytes());
        data.push(0x00);
    }
    msg.write_u16::<LittleEndian>(data.len() as u16).unwrap();
    msg.extend_from_slice(&data);

    netbios_frame(msg)
}

/// SMBv1 negotiate offering classic dialects only
pub fn smb1_negotiate_request() -> Vec<u8> {
    smb1_negotiate(
        Smb1Header {
            command: SMB1_COM_NEGOTIATE,
            flags: 0x18,
            flags2: 0xC853,
            tid: 0x0000,
            pid: 0xFEFF,
            uid: 0x0000,
            mid: 0x0000,
        },
        &SMB1_DIALECTS,
    )
}

/// SMB1-framed negotiate offering SMB2 dialects, the fallback path for
/// servers that refuse SMBv1
pub fn smb2_discovery_request() -> Vec<u8> {
    smb1_negotiate(
        Smb1Header {
            command: SMB1_COM_NEGOTIATE,
            flags: 0x18,
            flags2: 0x4801,
            tid: 0xFFFF,
            pid: 0x03AC,
            uid: 0x0000,
            mid: 0x0000,
        },
        &SMB2_DISCOVERY_DIALECTS,
    )
}

/// Wrap an NTLMSSP token in a SPNEGO NegTokenInit
pub fn spnego_neg_token_init(mech_token: &[u8]) -> Vec<u8> {
    let mut mech_types = Vec::new();
    write_tlv(&mut mech_types, 0x06, &NTLMSSP_MECH_OID);
    let mut mech_type_list = Vec::new();
    write_tlv(&mut mech_type_list, 0x30, &mech_types);

    let mut token_field = Vec::new();
    write_tlv(&mut token_field, 0x04, mech_token);

    let mut init_fields = Vec::new();
    write_tlv(&mut init_fields, 0xA0, &mech_type_list);
    write_tlv(&mut init_fields, 0xA2, &token_field);
    let mut init = Vec::new();
    write_tlv(&mut init, 0x30, &init_fields);

    let mut neg_token = Vec::new();
    write_tlv(&mut neg_token, 0xA0, &init);

    let mut content = Vec::new();
    write_tlv(&mut content, 0x06, &SPNEGO_OID);
    content.extend_from_slice(&neg_token);

    let mut out = Vec::new();
    write_tlv(&mut out, 0x60, &content);
    out
}

/// NTLMSSP NEGOTIATE for the SMBv1 path, carrying an OS version field
pub fn ntlmssp_negotiate_v1() -> Vec<u8> {
    let flags = NegotiateFlags::UNICODE
        | NegotiateFlags::OEM
        | NegotiateFlags::REQUEST_TARGET
        | NegotiateFlags::NTLM
        | NegotiateFlags::ALWAYS_SIGN
        | NegotiateFlags::EXTENDED_SESSION_SECURITY
        | NegotiateFlags::VERSION
        | NegotiateFlags::KEY_128
        | NegotiateFlags::KEY_56;

    let mut msg = Vec::with_capacity(40);
    msg.extend_from_slice(b"NTLMSSP\0");
    msg.write_u32::<LittleEndian>(1).unwrap();
    msg.write_u32::<LittleEndian>(flags.bits()).unwrap();
    msg.extend_from_slice(&[0x00; 8]); // domain field
    msg.extend_from_slice(&[0x00; 8]); // workstation field
    msg.extend_from_slice(&[0x05, 0x02, 0xCE, 0x0E, 0x00, 0x00, 0x00, 0x0F]); // version 5.2.3790
    msg
}

/// NTLMSSP NEGOTIATE for the SMBv2 path. The flags mirror whether the
/// server demanded signing in its negotiate response.
pub fn ntlmssp_negotiate_v2(signing_required: bool) -> Vec<u8> {
    let mut flags = NegotiateFlags::UNICODE
        | NegotiateFlags::REQUEST_TARGET
        | NegotiateFlags::ALWAYS_SIGN
        | NegotiateFlags::EXTENDED_SESSION_SECURITY
        | NegotiateFlags::KEY_128
        | NegotiateFlags::KEY_56;
    if signing_required {
        flags |= NegotiateFlags::SIGN | NegotiateFlags::NTLM;
    }

    let mut msg = Vec::with_capacity(32);
    msg.extend_from_slice(b"NTLMSSP\0");
    msg.write_u32::<LittleEndian>(1).unwrap();
    msg.write_u32::<LittleEndian>(flags.bits()).unwrap();
    msg.extend_from_slice(&[0x00; 8]); // domain field
    msg.extend_from_slice(&[0x00; 8]); // workstation field
    msg
}

/// SMBv1 session setup carrying a SPNEGO security blob
pub fn smb1_session_setup_request(security_blob: &[u8]) -> Vec<u8> {
    let mut native = Vec::new();
    native.push(0x00); // pad to align the unicode strings
    for s in [NATIVE_OS, NATIVE_LAN_MANAGER] {
        for unit in s.encode_utf16() {
            native.write_u16::<LittleEndian>(unit).unwrap();
        }
        native.extend_from_slice(&[0x00, 0x00]); // terminator
        native.extend_from_slice(&[0x00, 0x00]);
    }

    let byte_count = security_blob.len() + native.len();
    // header + word count + 12 parameter words + byte count field
    let message_len = 32 + 1 + 24 + 2 + byte_count;

    let mut msg = Vec::with_capacity(message_len);
    Smb1Header {
        command: SMB1_COM_SESSION_SETUP_ANDX,
        flags: 0x18,
        flags2: 0xC807,
        tid: 0x0000,
        pid: 0xFEFF,
        uid: 0x0000,
        mid: 0x0040,
    }
    .write(&mut msg);

    msg.push(0x0C); // word count
    msg.push(0xFF); // AndXCommand: none
    msg.push(0x00); // AndXReserved
    msg.write_u16::<LittleEndian>(message_len as u16).unwrap(); // AndXOffset
    msg.write_u16::<LittleEndian>(0x4104).unwrap(); // MaxBufferSize
    msg.write_u16::<LittleEndian>(0x0032).unwrap(); // MaxMpxCount
    msg.write_u16::<LittleEndian>(0x0000).unwrap(); // VcNumber
    msg.write_u32::<LittleEndian>(0x0000_0000).unwrap(); // SessionKey
    msg.write_u16::<LittleEndian>(security_blob.len() as u16)
        .unwrap();
    msg.write_u32::<LittleEndian>(0x0000_0000).unwrap(); // reserved
    msg.write_u32::<LittleEndian>(0xA000_00D4).unwrap(); // capabilities
    msg.write_u16::<LittleEndian>(byte_count as u16).unwrap();
    msg.extend_from_slice(security_blob);
    msg.extend_from_slice(&native);

    netbios_frame(msg)
}

/// 64-byte SMB2 sync header
struct Smb2Header {
    command: u16,
    message_id: u64,
}

impl Smb2Header {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"\xFESMB");
        out.write_u16::<LittleEndian>(64).unwrap(); // structure size
        out.write_u16::<LittleEndian>(1).unwrap(); // credit charge
        out.extend_from_slice(&[0x00; 4]); // status
        out.write_u16::<LittleEndian>(self.command).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap(); // credits requested
        out.extend_from_slice(&[0x00; 4]); // flags
        out.extend_from_slice(&[0x00; 4]); // next command
        out.write_u64::<LittleEndian>(self.message_id).unwrap();
        out.extend_from_slice(&[0x00; 4]); // reserved
        out.extend_from_slice(&[0x00; 4]); // tree id
        out.extend_from_slice(&[0x00; 8]); // session id
        out.extend_from_slice(&[0x00; 16]); // signature
    }
}

/// Native SMB2 negotiate offering dialects 2.0.2 and 2.1
pub fn smb2_negotiate_request() -> Vec<u8> {
    let mut msg = Vec::with_capacity(104);
    Smb2Header {
        command: SMB2_NEGOTIATE,
        message_id: 1,
    }
    .write(&mut msg);

    msg.write_u16::<LittleEndian>(36).unwrap(); // structure size
    msg.write_u16::<LittleEndian>(2).unwrap(); // dialect count
    msg.write_u16::<LittleEndian>(0x0001).unwrap(); // security mode: signing enabled
    msg.write_u16::<LittleEndian>(0).unwrap(); // reserved
    msg.write_u32::<LittleEndian>(0x0000_0040).unwrap(); // capabilities
    msg.extend_from_slice(&[0x00; 16]); // client guid
    msg.extend_from_slice(&[0x00; 8]); // client start time
    msg.write_u16::<LittleEndian>(0x0202).unwrap();
    msg.write_u16::<LittleEndian>(0x0210).unwrap();

    netbios_frame(msg)
}

/// SMB2 session setup carrying a SPNEGO security blob
pub fn smb2_session_setup_request(security_blob: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(88 + security_blob.len());
    Smb2Header {
        command: SMB2_SESSION_SETUP,
        message_id: 2,
    }
    .write(&mut msg);

    msg.write_u16::<LittleEndian>(25).unwrap(); // structure size
    msg.push(0x00); // flags
    msg.push(0x01); // security mode: signing enabled
    msg.write_u32::<LittleEndian>(0).unwrap(); // capabilities
    msg.write_u32::<LittleEndian>(0).unwrap(); // channel
    msg.write_u16::<LittleEndian>(88).unwrap(); // security buffer offset
    msg.write_u16::<LittleEndian>(security_blob.len() as u16)
        .unwrap();
    msg.extend_from_slice(&[0x00; 8]); // previous session id
    msg.extend_from_slice(security_blob);

    netbios_frame(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netbios_session_request_frame() {
        let frame = netbios_session_request();
        assert_eq!(frame.len(), 72);
        assert_eq!(&frame[..4], &[0x81, 0x00, 0x00, 0x44]);
        // "*SMBSERVER" first-level encoded
        assert_eq!(&frame[5..13], b"CKFDENEC");
        // calling name ends with the encoded NUL byte
        assert_eq!(&frame[69..72], b"AA\x00");
    }

    #[test]
    fn test_smb1_negotiate_layout() {
        let frame = smb1_negotiate_request();
        assert_eq!(&frame[..4], &[0x00, 0x00, 0x00, 0x85]);
        assert_eq!(&frame[4..8], b"\xFFSMB");
        assert_eq!(frame[8], 0x72);
        assert_eq!(frame[13], 0x18);
        assert_eq!(&frame[14..16], &[0x53, 0xC8]);
        // PID
        assert_eq!(&frame[30..32], &[0xFF, 0xFE]);
        // byte count covers all six dialect entries
        assert_eq!(&frame[37..39], &[0x62, 0x00]);
        assert_eq!(&frame[39..41], &[0x02, b'P']);
        assert!(frame.ends_with(b"NT LM 0.12\0"));
    }

    #[test]
    fn test_smb2_discovery_layout() {
        let frame = smb2_discovery_request();
        assert_eq!(&frame[..4], &[0x00, 0x00, 0x00, 0x45]);
        assert_eq!(frame[8], 0x72);
        assert_eq!(&frame[14..16], &[0x01, 0x48]);
        assert_eq!(&frame[28..30], &[0xFF, 0xFF]);
        assert_eq!(&frame[30..32], &[0xAC, 0x03]);
        assert!(frame.ends_with(b"SMB 2.???\0"));
    }

    #[test]
    fn test_spnego_wrapper_lengths() {
        let token = ntlmssp_negotiate_v1();
        assert_eq!(token.len(), 40);
        let blob = spnego_neg_token_init(&token);
        assert_eq!(blob.len(), 74);
        assert_eq!(&blob[..2], &[0x60, 0x48]);
        assert_eq!(&blob[2..4], &[0x06, 0x06]);
        // inner token is carried unmodified
        assert!(blob.windows(token.len()).any(|w| w == &token[..]));

        let token = ntlmssp_negotiate_v2(true);
        assert_eq!(token.len(), 32);
        let blob = spnego_neg_token_init(&token);
        assert_eq!(blob.len(), 66);
        assert_eq!(&blob[..2], &[0x60, 0x40]);
    }

    #[test]
    fn test_ntlmssp_negotiate_flags() {
        let v1 = ntlmssp_negotiate_v1();
        assert_eq!(&v1[12..16], &[0x07, 0x82, 0x08, 0xA2]);
        assert_eq!(&v1[32..40], &[0x05, 0x02, 0xCE, 0x0E, 0x00, 0x00, 0x00, 0x0F]);

        let signing = ntlmssp_negotiate_v2(true);
        assert_eq!(&signing[12..16], &[0x15, 0x82, 0x08, 0xA0]);
        let relaxed = ntlmssp_negotiate_v2(false);
        assert_eq!(&relaxed[12..16], &[0x05, 0x80, 0x08, 0xA0]);
    }

    #[test]
    fn test_smb1_session_setup_layout() {
        let blob = spnego_neg_token_init(&ntlmssp_negotiate_v1());
        let frame = smb1_session_setup_request(&blob);
        assert_eq!(&frame[..4], &[0x00, 0x00, 0x01, 0x0A]);
        assert_eq!(frame.len(), 270);
        assert_eq!(frame[8], 0x73);
        assert_eq!(&frame[14..16], &[0x07, 0xC8]);
        // word count and AndX offset
        assert_eq!(frame[36], 0x0C);
        assert_eq!(&frame[39..41], &[0x0A, 0x01]);
        // security blob length
        assert_eq!(&frame[51..53], &[0x4A, 0x00]);
        // byte count: blob + pad + native strings
        assert_eq!(&frame[61..63], &[0xCF, 0x00]);
        assert_eq!(frame[63], 0x60);
    }

    #[test]
    fn test_smb2_negotiate_layout() {
        let frame = smb2_negotiate_request();
        assert_eq!(&frame[..4], &[0x00, 0x00, 0x00, 0x68]);
        assert_eq!(&frame[4..8], b"\xFESMB");
        // structure size and dialect count
        assert_eq!(&frame[68..72], &[0x24, 0x00, 0x02, 0x00]);
        assert!(frame.ends_with(&[0x02, 0x02, 0x10, 0x02]));
    }

    #[test]
    fn test_smb2_session_setup_layout() {
        let blob = spnego_neg_token_init(&ntlmssp_negotiate_v2(false));
        let frame = smb2_session_setup_request(&blob);
        assert_eq!(&frame[..4], &[0x00, 0x00, 0x00, 0x9A]);
        // command: session setup, message id 2
        assert_eq!(&frame[16..18], &[0x01, 0x00]);
        assert_eq!(frame[32], 0x02);
        // security buffer offset 88, length 66
        assert_eq!(&frame[80..84], &[0x58, 0x00, 0x42, 0x00]);
        // blob begins right at the stated offset
        assert_eq!(frame[4 + 88], 0x60);
    }
}
