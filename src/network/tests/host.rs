use crate::network::host::make_name;
use crate::network::HostKey;

#[test]
fn test_new_builds_canonical_name() {
    let key = HostKey::new("10.0.0.1", 6379);

    assert_eq!("10.0.0.1", key.ip());
    assert_eq!(6379, key.port());
    assert_eq!("10.0.0.1:6379", key.name());
}

#[test]
fn test_make_name_formats_port() {
    assert_eq!("127.0.0.1:7000", make_name("127.0.0.1", 7000));
    assert_eq!("host:0", make_name("host", 0));
}

#[test]
fn test_parse_valid_pair() {
    let key = HostKey::parse("10.0.0.2:6380").unwrap();

    assert_eq!("10.0.0.2", key.ip());
    assert_eq!(6380, key.port());
    assert_eq!("10.0.0.2:6380", key.name());
}

#[test]
fn test_parse_tolerates_leading_whitespace() {
    let key = HostKey::parse("  10.0.0.2:6380").unwrap();

    assert_eq!("10.0.0.2", key.ip());
}

#[test]
fn test_parse_splits_on_last_colon() {
    let key = HostKey::parse("::1:6379").unwrap();

    assert_eq!("::1", key.ip());
    assert_eq!(6379, key.port());
}

#[test]
fn test_parse_rejects_missing_parts() {
    assert!(HostKey::parse("10.0.0.2").is_none());
    assert!(HostKey::parse(":6379").is_none());
    assert!(HostKey::parse("10.0.0.2:").is_none());
    assert!(HostKey::parse("10.0.0.2:notaport").is_none());
    assert!(HostKey::parse("10.0.0.2:99999").is_none());
}

#[test]
fn test_equality_is_by_name() {
    assert_eq!(HostKey::new("10.0.0.1", 6379), HostKey::parse("10.0.0.1:6379").unwrap());
    assert_ne!(HostKey::new("10.0.0.1", 6379), HostKey::new("10.0.0.1", 6380));
}

#[test]
fn test_display_is_the_name() {
    assert_eq!("10.0.0.1:6379", HostKey::new("10.0.0.1", 6379).to_string());
}
