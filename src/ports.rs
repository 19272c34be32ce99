//! Port allocator: expands user port-mapping expressions into a per-node
//! binding table.
//!
//! Expression syntax: `[ip:]host-port[:container-port][/protocol][@node]...`
//! An expression without `@node` selectors is broadcast to every node; with
//! selectors it applies only to the named nodes. A selector may be the full
//! container name or a trailing fragment of it (`worker-0`, `server`).
//!
//! When an expression expands to more than one node and the auto-offset is
//! non-zero, each target's effective host port is `base + offset * index`,
//! with the first target (the server, for broadcast) at index 0. This lets
//! one expression publish a port from several nodes without host-port
//! collisions.

use std::collections::{HashMap, HashSet};

use crate::error::ClusterError;
use crate::spec::{PortBinding, Protocol};

/// Resolve port mapping expressions against a node name list.
///
/// Returns a table of bindings keyed by node name; nodes no expression
/// resolves to are absent from the table. Fails with `PortParse` on a
/// malformed expression or unresolvable selector and with `PortConflict`
/// when two expressions land on the same (host port, protocol) pair of one
/// node after offsets are applied.
pub fn allocate(
    port_specs: &[String],
    node_names: &[String],
    auto_offset: u16,
) -> Result<HashMap<String, Vec<PortBinding>>, ClusterError> {
    let mut table: HashMap<String, Vec<PortBinding>> = HashMap::new();

    for spec in port_specs {
        let parsed = parse_port_spec(spec)?;
        let targets = resolve_nodes(&parsed.selectors, node_names, spec)?;
        // The offset disambiguates host ports only when one expression lands
        // on several nodes; a single-target expression keeps its base port.
        let stagger = targets.len() > 1 && auto_offset > 0;

        for (index, node) in targets.iter().enumerate() {
            let mut binding = parsed.binding.clone();
            if stagger {
                let shifted =
                    binding.host_port as u32 + auto_offset as u32 * index as u32;
                binding.host_port = u16::try_from(shifted).map_err(|_| {
                    ClusterError::PortParse(format!(
                        "host port overflow applying offset {auto_offset} to [{spec}]"
                    ))
                })?;
            }
            table.entry(node.clone()).or_default().push(binding);
        }
    }

    check_conflicts(&table)?;
    Ok(table)
}

struct ParsedSpec {
    binding: PortBinding,
    selectors: Vec<String>,
}

fn parse_port_spec(spec: &str) -> Result<ParsedSpec, ClusterError> {
    // Split off @node selectors first, then the /protocol suffix.
    let mut parts = spec.split('@');
    let expr = parts.next().unwrap_or_default();
    let selectors: Vec<String> = parts.map(str::to_string).collect();
    if selectors.iter().any(String::is_empty) {
        return Err(ClusterError::PortParse(format!(
            "empty node selector in [{spec}]"
        )));
    }

    let (expr, protocol) = match expr.split_once('/') {
        Some((expr, "tcp")) => (expr, Protocol::Tcp),
        Some((expr, "udp")) => (expr, Protocol::Udp),
        Some((_, other)) => {
            return Err(ClusterError::PortParse(format!(
                "unknown protocol [{other}] in [{spec}]"
            )))
        }
        None => (expr, Protocol::Tcp),
    };

    let parse_port = |s: &str| -> Result<u16, ClusterError> {
        s.parse()
            .map_err(|_| ClusterError::PortParse(format!("non-numeric port [{s}] in [{spec}]")))
    };

    let segments: Vec<&str> = expr.split(':').collect();
    let (host_ip, host_port, container_port) = match segments.as_slice() {
        [port] => (None, parse_port(port)?, parse_port(port)?),
        [host, container] => (None, parse_port(host)?, parse_port(container)?),
        [ip, host, container] => (
            Some(ip.to_string()),
            parse_port(host)?,
            parse_port(container)?,
        ),
        _ => {
            return Err(ClusterError::PortParse(format!(
                "expected [ip:]host-port[:container-port] in [{spec}]"
            )))
        }
    };

    Ok(ParsedSpec {
        binding: PortBinding {
            host_ip,
            host_port,
            container_port,
            protocol,
        },
        selectors,
    })
}

/// Resolve selectors to node names, preserving node list order. No selectors
/// means broadcast to every node.
fn resolve_nodes(
    selectors: &[String],
    node_names: &[String],
    spec: &str,
) -> Result<Vec<String>, ClusterError> {
    if selectors.is_empty() {
        return Ok(node_names.to_vec());
    }
    let mut targets = Vec::new();
    for selector in selectors {
        let matched = node_names
            .iter()
            .find(|n| *n == selector || n.ends_with(&format!("-{selector}")))
            .ok_or_else(|| {
                ClusterError::PortParse(format!(
                    "node selector [{selector}] in [{spec}] matches no node"
                ))
            })?;
        if !targets.contains(matched) {
            targets.push(matched.clone());
        }
    }
    Ok(targets)
}

fn check_conflicts(table: &HashMap<String, Vec<PortBinding>>) -> Result<(), ClusterError> {
    for (node, bindings) in table {
        let mut seen = HashSet::new();
        for binding in bindings {
            if !seen.insert((binding.host_port, binding.protocol)) {
                return Err(ClusterError::PortConflict(format!(
                    "host port {}/{} mapped twice on node {node}",
                    binding.host_port, binding.protocol
                )));
            }
        }
    }
    Ok(())
}
