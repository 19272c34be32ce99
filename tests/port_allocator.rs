//! Port allocator tests: broadcast, node selectors, auto-offset arithmetic
//! and error cases.

use k3d::ports::allocate;
use k3d::{ClusterError, Protocol};

fn nodes() -> Vec<String> {
    vec![
        "c-server".to_string(),
        "c-worker-0".to_string(),
        "c-worker-1".to_string(),
    ]
}

fn specs(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn broadcast_without_offset_maps_every_node() {
    let table = allocate(&specs(&["8080:80"]), &nodes(), 0).expect("allocate");
    for node in nodes() {
        let bindings = &table[&node];
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].host_port, 8080);
        assert_eq!(bindings[0].container_port, 80);
        assert_eq!(bindings[0].protocol, Protocol::Tcp);
    }
}

#[test]
fn broadcast_with_offset_staggers_host_ports() {
    let table = allocate(&specs(&["8080:80"]), &nodes(), 10).expect("allocate");
    assert_eq!(table["c-server"][0].host_port, 8080);
    assert_eq!(table["c-worker-0"][0].host_port, 8090);
    assert_eq!(table["c-worker-1"][0].host_port, 8100);
    // Container port is never shifted.
    assert!(table.values().all(|b| b[0].container_port == 80));
}

#[test]
fn single_port_maps_to_itself() {
    let table = allocate(&specs(&["6443"]), &nodes(), 0).expect("allocate");
    assert_eq!(table["c-server"][0].host_port, 6443);
    assert_eq!(table["c-server"][0].container_port, 6443);
}

#[test]
fn host_ip_and_protocol_are_parsed() {
    let table = allocate(&specs(&["127.0.0.1:8080:80", "53:53/udp"]), &nodes(), 0)
        .expect("allocate");
    let bindings = &table["c-server"];
    assert_eq!(bindings[0].host_ip.as_deref(), Some("127.0.0.1"));
    assert_eq!(bindings[1].protocol, Protocol::Udp);
    assert_eq!(bindings[1].host_port, 53);
}

#[test]
fn selector_scopes_spec_to_named_nodes() {
    let table = allocate(&specs(&["9090:90@c-worker-1"]), &nodes(), 0).expect("allocate");
    assert_eq!(table.len(), 1);
    assert_eq!(table["c-worker-1"][0].host_port, 9090);
}

#[test]
fn selector_matches_name_fragment() {
    let table =
        allocate(&specs(&["9090:90@worker-0", "7070:70@server"]), &nodes(), 0).expect("allocate");
    assert_eq!(table["c-worker-0"][0].host_port, 9090);
    assert_eq!(table["c-server"][0].host_port, 7070);
}

#[test]
fn single_node_scoped_spec_ignores_auto_offset() {
    // Offset only applies when a spec expands to multiple nodes.
    let table = allocate(&specs(&["9090:90@c-worker-1"]), &nodes(), 10).expect("allocate");
    assert_eq!(table["c-worker-1"][0].host_port, 9090);
}

#[test]
fn multi_node_scoped_spec_staggers_host_ports() {
    // A selector-scoped spec landing on several nodes gets the same per-index
    // stagger as a broadcast one, otherwise every target would fight over the
    // same host port.
    let table =
        allocate(&specs(&["9090:90@worker-0@worker-1"]), &nodes(), 10).expect("allocate");
    assert_eq!(table.len(), 2);
    assert_eq!(table["c-worker-0"][0].host_port, 9090);
    assert_eq!(table["c-worker-1"][0].host_port, 9100);
    assert_ne!(
        table["c-worker-0"][0].host_port,
        table["c-worker-1"][0].host_port
    );
}

#[test]
fn non_numeric_port_is_a_parse_error() {
    let err = allocate(&specs(&["abc:80"]), &nodes(), 0).unwrap_err();
    assert!(matches!(err, ClusterError::PortParse(_)), "{err}");
}

#[test]
fn unresolvable_selector_is_a_parse_error() {
    let err = allocate(&specs(&["8080:80@no-such-node"]), &nodes(), 0).unwrap_err();
    assert!(matches!(err, ClusterError::PortParse(_)), "{err}");
}

#[test]
fn unknown_protocol_is_a_parse_error() {
    let err = allocate(&specs(&["8080:80/sctp"]), &nodes(), 0).unwrap_err();
    assert!(matches!(err, ClusterError::PortParse(_)), "{err}");
}

#[test]
fn colliding_specs_are_a_conflict() {
    let err = allocate(&specs(&["8080:80", "8080:443"]), &nodes(), 0).unwrap_err();
    assert!(matches!(err, ClusterError::PortConflict(_)), "{err}");
}

#[test]
fn same_port_different_protocol_is_no_conflict() {
    let table = allocate(&specs(&["53:53", "53:53/udp"]), &nodes(), 0).expect("allocate");
    assert_eq!(table["c-server"].len(), 2);
}

#[test]
fn offset_resolves_would_be_collisions() {
    // Two broadcast specs 10 apart would collide on worker nodes without the
    // offset shifting them apart per node index; with distinct bases they
    // stay distinct.
    let table = allocate(&specs(&["8080:80", "9090:90"]), &nodes(), 10).expect("allocate");
    assert_eq!(table["c-worker-1"][0].host_port, 8100);
    assert_eq!(table["c-worker-1"][1].host_port, 9110);
}
