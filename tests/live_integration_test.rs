//! Live integration tests against a real FTP(S) server.
//!
//! These tests are disabled by default. Enable with:
//! ```text
//! cargo test --test live_integration_test --features live-tests -- --test-threads=1
//! ```
//!
//! Required environment variables:
//! - FTP_HOST: server hostname
//! - FTP_PORT: server port (default: 21)
//! - FTP_USER: username (default: anonymous)
//! - FTP_PASS: password (default: guest@example.com)
//! - FTP_REMOTE_DIR: a directory the account may list/write into (default: /)
//! - FTP_TLS: set to "1" to negotiate explicit FTPS via `AUTH TLS`

#![cfg(feature = "live-tests")]

use ftp_rs::{Client, ClientConfig, TransferType};

fn get_test_config() -> (String, u16, String, String, String, bool) {
    let host = std::env::var("FTP_HOST").expect("FTP_HOST not set");
    let port = std::env::var("FTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(21);
    let user = std::env::var("FTP_USER").unwrap_or_else(|_| "anonymous".to_string());
    let pass =
        std::env::var("FTP_PASS").unwrap_or_else(|_| "guest@example.com".to_string());
    let dir = std::env::var("FTP_REMOTE_DIR").unwrap_or_else(|_| "/".to_string());
    let tls = std::env::var("FTP_TLS").map(|v| v == "1").unwrap_or(false);
    (host, port, user, pass, dir, tls)
}

fn connected_client(tls: bool) -> Client {
    let config = if tls {
        ClientConfig::explicit_tls(ftp_rs::tls::insecure_client_config())
    } else {
        ClientConfig::plain()
    };
    Client::new(config)
}

#[test]
fn live_connect_and_login() {
    let (host, port, user, pass, _, tls) = get_test_config();
    let mut client = connected_client(tls);
    let replies = client
        .connect(&host, port, Some(&user), &pass)
        .expect("connect failed");
    assert!(replies.is_positive(), "{}", replies.status_string());
    assert!(client.is_connected());
    client.disconnect(true).unwrap();
}

#[test]
fn live_list_remote_directory() {
    let (host, port, user, pass, dir, tls) = get_test_config();
    let mut client = connected_client(tls);
    client.connect(&host, port, Some(&user), &pass).unwrap();
    let (replies, _entries) = client
        .get_file_list(Some(&dir), false)
        .expect("LIST failed");
    assert!(replies.is_positive(), "{}", replies.status_string());
    client.disconnect(true).unwrap();
}

#[test]
fn live_upload_download_roundtrip() {
    let (host, port, user, pass, dir, tls) = get_test_config();
    let mut client = connected_client(tls);
    client.connect(&host, port, Some(&user), &pass).unwrap();
    client.set_transfer_type(TransferType::Binary).unwrap();

    let remote_path = format!("{}/ftp-rs-live-test.tmp", dir.trim_end_matches('/'));
    let payload = b"ftp-rs live integration test payload".to_vec();

    let mut source = std::io::Cursor::new(payload.clone());
    let upload = client
        .upload(&mut source, &remote_path, false, None)
        .expect("STOR failed");
    assert!(upload.is_positive(), "{}", upload.status_string());

    let mut sink = Vec::new();
    let download = client
        .download(&mut sink, &remote_path, None)
        .expect("RETR failed");
    assert!(download.is_positive(), "{}", download.status_string());
    assert_eq!(sink, payload);

    let _ = client.delete(&remote_path);
    client.disconnect(true).unwrap();
}
