//! Enrollment endpoint probing against a scripted HTTP server

mod common;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use relayprobe::{
    CaEnrollmentScanner, ProbeConfig, ProbeOutcome, ProbeVariant, VulnerabilityStatus,
};

/// Serve one scripted response per connection, closing after each
async fn serve_scripted(listener: TcpListener, responses: Vec<String>) {
    for response in responses {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let mut total = 0;
        loop {
            let n = socket.read(&mut buf[total..]).await.unwrap();
            if n == 0 {
                break;
            }
            total += n;
            if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    }
}

fn response(status: &str, extra_headers: &[String]) -> String {
    let mut out = format!("HTTP/1.1 {}\r\n", status);
    for header in extra_headers {
        out.push_str(header);
        out.push_str("\r\n");
    }
    out.push_str("Content-Length: 0\r\nConnection: close\r\n\r\n");
    out
}

fn config() -> ProbeConfig {
    common::init_logging();
    ProbeConfig::new().with_timeout(5_000)
}

#[tokio::test]
async fn test_plain_http_handshake_accepted_is_vulnerable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let challenge = BASE64.encode(common::type2_challenge());
    tokio::spawn(serve_scripted(
        listener,
        vec![
            // scheme discovery
            response("401 Unauthorized", &["WWW-Authenticate: NTLM".to_string()]),
            // NEGOTIATE leg answered with a CHALLENGE
            response(
                "401 Unauthorized",
                &[format!("WWW-Authenticate: NTLM {}", challenge)],
            ),
            // AUTHENTICATE accepted
            response("200 OK", &[]),
        ],
    ));

    let scanner = CaEnrollmentScanner::new("127.0.0.1", "CORP-CA", config());
    let url = format!("http://127.0.0.1:{}/certsrv/", port);
    let finding = scanner.scan_endpoint(&url, ProbeVariant::HttpPlain).await;

    assert_eq!(finding.endpoint, url);
    assert_eq!(finding.variant, ProbeVariant::HttpPlain);
    assert_eq!(finding.outcome, ProbeOutcome::Success);
    assert!(finding.status.is_vulnerable(), "got {:?}", finding.status);
}

#[tokio::test]
async fn test_rejected_final_leg_with_bad_bindings_is_not_vulnerable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let challenge = BASE64.encode(common::type2_challenge());
    tokio::spawn(serve_scripted(
        listener,
        vec![
            response("401 Unauthorized", &["WWW-Authenticate: Negotiate".to_string()]),
            response(
                "401 Unauthorized",
                &[format!("WWW-Authenticate: Negotiate {}", challenge)],
            ),
            // AUTHENTICATE with the broken bindings bounced
            response("401 Unauthorized", &[]),
        ],
    ));

    let scanner = CaEnrollmentScanner::new("127.0.0.1", "CORP-CA", config());
    let url = format!("http://127.0.0.1:{}/certsrv/", port);
    let finding = scanner
        .scan_endpoint(&url, ProbeVariant::HttpsBadChannelBinding)
        .await;

    assert_eq!(
        finding.status,
        VulnerabilityStatus::not_vulnerable("channel binding is enforced")
    );
    // The handshake itself completed but the final leg was bounced
    assert_eq!(
        finding.outcome,
        ProbeOutcome::AuthRequiredButFailed {
            reason: "HTTP status 401".to_string()
        }
    );
}

#[tokio::test]
async fn test_endpoint_answering_200_without_auth_is_indeterminate() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    // The endpoint never solicits authentication at all
    tokio::spawn(serve_scripted(listener, vec![response("200 OK", &[])]));

    let scanner = CaEnrollmentScanner::new("127.0.0.1", "CORP-CA", config());
    let url = format!("http://127.0.0.1:{}/certsrv/", port);
    let finding = scanner.scan_endpoint(&url, ProbeVariant::HttpPlain).await;

    assert_eq!(
        finding.status,
        VulnerabilityStatus::indeterminate("endpoint did not request authentication")
    );
}

#[tokio::test]
async fn test_discovery_rejects_unsolicited_200() {
    use relayprobe::transport::http::HttpTransport;
    use relayprobe::ProbeError;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(serve_scripted(listener, vec![response("200 OK", &[])]));

    let url = url::Url::parse(&format!("http://127.0.0.1:{}/certsrv/", port)).unwrap();
    let err = HttpTransport::discover_supported_schemes(&url, config().timeout_duration())
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::AuthNotSolicited(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_forbidden_endpoints_are_not_vulnerable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(serve_scripted(
        listener,
        vec![response("403 Forbidden", &[]), response("403 Forbidden", &[])],
    ));

    let scanner = CaEnrollmentScanner::new("127.0.0.1", "CORP-CA", config());
    for path in ["/certsrv/", "/CORP-CA_CES_Kerberos/service.svc"] {
        let url = format!("http://127.0.0.1:{}{}", port, path);
        let finding = scanner.scan_endpoint(&url, ProbeVariant::HttpPlain).await;
        assert!(
            matches!(finding.status, VulnerabilityStatus::NotVulnerable { .. }),
            "{}: got {:?}",
            path,
            finding.status
        );
        assert!(!finding.status.is_vulnerable());
    }
}

#[tokio::test]
async fn test_missing_endpoint_is_not_vulnerable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(serve_scripted(
        listener,
        vec![response("404 Not Found", &[])],
    ));

    let scanner = CaEnrollmentScanner::new("127.0.0.1", "CORP-CA", config());
    let url = format!("http://127.0.0.1:{}/certsrv/", port);
    let finding = scanner.scan_endpoint(&url, ProbeVariant::HttpPlain).await;

    assert_eq!(
        finding.status,
        VulnerabilityStatus::not_vulnerable("endpoint not present")
    );
}

#[tokio::test]
async fn test_endpoint_without_ntlm_scheme_is_not_vulnerable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(serve_scripted(
        listener,
        vec![response(
            "401 Unauthorized",
            &["WWW-Authenticate: Basic realm=\"certsrv\"".to_string()],
        )],
    ));

    let scanner = CaEnrollmentScanner::new("127.0.0.1", "CORP-CA", config());
    let url = format!("http://127.0.0.1:{}/certsrv/", port);
    let finding = scanner.scan_endpoint(&url, ProbeVariant::HttpPlain).await;

    assert_eq!(
        finding.status,
        VulnerabilityStatus::not_vulnerable("no NTLM challenge offered")
    );
}
