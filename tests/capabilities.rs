use scylla_rust_admin::server::server_info;

#[test]
fn server_info_contains_expected_metadata() {
    let info = server_info();
    assert_eq!(info.name, "scylla-rust-admin");
    assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
}
