mod util;

use std::time::{Duration, Instant};

use ssltool::chain::{self, CertificateDetail, PublicKeyAlgorithm, RetrieveOptions};
use ssltool::error::SslToolError;

#[test]
fn unreachable_port_fails_to_connect() {
    let result = chain::retrieve("127.0.0.1:0", &RetrieveOptions::default());
    assert!(
        matches!(result, Err(SslToolError::ConnectFailed(_))),
        "{result:?}"
    );
}

#[test]
fn untrusted_chain_fails_verification_but_is_returned_insecurely() {
    let test_chain = util::generate_chain();
    let addr = util::spawn_tls_server(&test_chain);
    let address = addr.to_string();

    let verified = chain::retrieve(&address, &RetrieveOptions::default());
    assert!(
        matches!(verified, Err(SslToolError::HandshakeFailed(_))),
        "{verified:?}"
    );

    let options = RetrieveOptions::builder().verify_peer(false).build();
    let details = chain::retrieve(&address, &options).unwrap();
    assert_eq!(details.len(), 2);
    assert_eq!(details[0].raw_bytes, test_chain.leaf.as_ref());
    assert_eq!(details[1].raw_bytes, test_chain.root.as_ref());
}

#[test]
fn expired_leaf_fails_verification_but_is_returned_insecurely() {
    let test_chain = util::generate_expired_chain();
    let addr = util::spawn_tls_server(&test_chain);
    let address = addr.to_string();

    let options = RetrieveOptions::builder()
        .extra_roots(vec![test_chain.root.clone()])
        .build();
    let verified = chain::retrieve(&address, &options);
    assert!(
        matches!(verified, Err(SslToolError::HandshakeFailed(_))),
        "{verified:?}"
    );

    let options = RetrieveOptions::builder()
        .extra_roots(vec![test_chain.root.clone()])
        .verify_peer(false)
        .build();
    let details = chain::retrieve(&address, &options).unwrap();
    assert_eq!(details[0].raw_bytes, test_chain.leaf.as_ref());
    assert!(!details[0].is_valid_at(time::OffsetDateTime::now_utc()));
}

#[test]
fn trusted_chain_is_leaf_first() {
    let test_chain = util::generate_chain();
    let addr = util::spawn_tls_server(&test_chain);

    let options = RetrieveOptions::builder()
        .extra_roots(vec![test_chain.root.clone()])
        .build();
    let details = chain::retrieve(&addr.to_string(), &options).unwrap();

    assert_eq!(details.len(), 2);
    let (leaf, root) = (&details[0], &details[1]);
    assert_eq!(leaf.dns_names, vec!["localhost".to_string()]);
    assert!(leaf.subject.contains("CN=localhost"));
    assert_eq!(leaf.issuer, root.subject);
    assert!(root.subject.contains(util::ROOT_COMMON_NAME));
    assert_eq!(leaf.public_key_algorithm, PublicKeyAlgorithm::Ecdsa);
}

#[test]
fn server_name_override_is_verified() {
    let test_chain = util::generate_chain();
    let addr = util::spawn_tls_server(&test_chain);

    let options = RetrieveOptions::builder()
        .extra_roots(vec![test_chain.root.clone()])
        .server_name("localhost".to_string())
        .build();
    assert!(chain::retrieve(&addr.to_string(), &options).is_ok());

    let options = RetrieveOptions::builder()
        .extra_roots(vec![test_chain.root.clone()])
        .server_name("not-localhost.example".to_string())
        .build();
    let result = chain::retrieve(&addr.to_string(), &options);
    assert!(
        matches!(result, Err(SslToolError::HandshakeFailed(_))),
        "{result:?}"
    );
}

#[test]
fn silent_server_times_out() {
    let (_listener, addr) = util::spawn_silent_server();
    let timeout = Duration::from_millis(300);
    let options = RetrieveOptions::builder().timeout(timeout).build();

    let started = Instant::now();
    let result = chain::retrieve(&addr.to_string(), &options);
    assert!(
        matches!(result, Err(SslToolError::ConnectionTimeout(t)) if t == timeout),
        "{result:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn zero_timeout_expires_before_name_resolution() {
    let options = RetrieveOptions::builder().timeout(Duration::ZERO).build();
    let result = chain::retrieve("localhost:443", &options);
    assert!(
        matches!(result, Err(SslToolError::ConnectionTimeout(t)) if t.is_zero()),
        "{result:?}"
    );
}

#[test]
fn retrieved_certificate_pem_round_trip() {
    let test_chain = util::generate_chain();
    let addr = util::spawn_tls_server(&test_chain);
    let options = RetrieveOptions::builder().verify_peer(false).build();
    let details = chain::retrieve(&addr.to_string(), &options).unwrap();

    for detail in &details {
        let pem = chain::encode_to_pem(detail).unwrap();
        let decoded = CertificateDetail::from_pem(&pem).unwrap();
        assert_eq!(decoded.serial_number, detail.serial_number);
        assert_eq!(decoded.not_before, detail.not_before);
        assert_eq!(decoded.not_after, detail.not_after);
        assert_eq!(decoded.dns_names, detail.dns_names);
    }
}
