use std::net::Ipv4Addr;
use std::path::PathBuf;

use buildpool::hosts_file::HostsInfoFile;

fn ip(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("buildpool-hosts-{}-{}", std::process::id(), name))
}

fn write_file(name: &str, contents: &str) -> PathBuf {
    let path = temp_path(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_missing_file_yields_defaults() {
    let hosts = HostsInfoFile::new(temp_path("does-not-exist"));
    assert_eq!(hosts.declared(ip("10.0.0.1")), (1, 1));
}

#[test]
fn test_declared_capacity_lookup() {
    let path = write_file(
        "lookup",
        "10.0.0.1 2 3\n10.0.0.2 8 5\n",
    );
    let hosts = HostsInfoFile::new(path);

    assert_eq!(hosts.declared(ip("10.0.0.1")), (2, 3));
    assert_eq!(hosts.declared(ip("10.0.0.2")), (8, 5));
    assert_eq!(hosts.declared(ip("10.0.0.3")), (1, 1));
}

#[test]
fn test_comments_and_blank_lines_are_skipped() {
    let path = write_file(
        "comments",
        "# compile farm\n\n10.0.0.1 4 2  # big box\n   \n",
    );
    let hosts = HostsInfoFile::new(path);

    assert_eq!(hosts.declared(ip("10.0.0.1")), (4, 2));
}

#[test]
fn test_malformed_lines_are_skipped() {
    let path = write_file(
        "malformed",
        "10.0.0.1 2\nnot-an-ip 2 3\n10.0.0.2 0 3\n10.0.0.3 2 3\n",
    );
    let hosts = HostsInfoFile::new(path);

    assert_eq!(hosts.declared(ip("10.0.0.1")), (1, 1));
    assert_eq!(hosts.declared(ip("10.0.0.2")), (1, 1));
    assert_eq!(hosts.declared(ip("10.0.0.3")), (2, 3));
}

#[test]
fn test_file_created_after_startup_is_picked_up() {
    let path = temp_path("late");
    let _ = std::fs::remove_file(&path);
    let hosts = HostsInfoFile::new(path.clone());

    assert_eq!(hosts.declared(ip("10.0.0.1")), (1, 1));

    std::fs::write(&path, "10.0.0.1 2 3\n").unwrap();
    assert_eq!(hosts.declared(ip("10.0.0.1")), (2, 3));
}
