//! Shared fixtures for the mock-server tests
#![allow(dead_code)]

/// Opt-in log output via RUST_LOG, safe to call repeatedly
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn utf16le(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// AV pair list with the EOL terminator appended
pub fn av_pairs(pairs: &[(u16, Vec<u8>)]) -> Vec<u8> {
    let mut data = Vec::new();
    for (av_id, value) in pairs {
        data.extend_from_slice(&av_id.to_le_bytes());
        data.extend_from_slice(&(value.len() as u16).to_le_bytes());
        data.extend_from_slice(value);
    }
    data.extend_from_slice(&[0x00; 4]);
    data
}

/// NTLMSSP CHALLENGE the way a domain-joined server would answer an
/// anonymous NEGOTIATE: unicode, NTLM, extended session security and a
/// target info block naming the host
pub fn type2_challenge() -> Vec<u8> {
    let target_info = av_pairs(&[
        (2, utf16le("CORP")),
        (1, utf16le("DC01")),
        (4, utf16le("corp.local")),
        (3, utf16le("dc01.corp.local")),
    ]);

    let mut msg = Vec::new();
    msg.extend_from_slice(b"NTLMSSP\0");
    msg.extend_from_slice(&2u32.to_le_bytes());
    // TargetName: empty, pointed past the fixed header
    msg.extend_from_slice(&0u16.to_le_bytes());
    msg.extend_from_slice(&0u16.to_le_bytes());
    msg.extend_from_slice(&56u32.to_le_bytes());
    // UNICODE | REQUEST_TARGET | NTLM | EXTENDED_SESSION_SECURITY | TARGET_INFO
    msg.extend_from_slice(&0x0088_0205u32.to_le_bytes());
    msg.extend_from_slice(&[0x11; 8]); // server challenge
    msg.extend_from_slice(&[0x00; 8]); // reserved
    msg.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
    msg.extend_from_slice(&(target_info.len() as u16).to_le_bytes());
    msg.extend_from_slice(&56u32.to_le_bytes());
    msg.extend_from_slice(&[0x00; 8]); // version field, unused
    msg.extend_from_slice(&target_info);
    msg
}

/// A local port that is almost certainly closed: bind an ephemeral port,
/// note it, and release it
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
