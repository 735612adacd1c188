//! OS attribute collection. Every reader degrades to an empty or absent
//! value instead of failing.

use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use tracing::debug;

/// Gets the machine hostname.
pub(super) fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// MAC addresses of interfaces that carry a non-loopback IPv4 address.
pub(super) fn ipv4_macs() -> Vec<String> {
    match NetworkInterface::show() {
        Ok(interfaces) => external_ipv4_macs(&interfaces),
        Err(e) => {
            debug!(error = %e, "Network interface enumeration failed");
            Vec::new()
        }
    }
}

/// Filters an interface listing down to sorted, unique, lowercase MACs.
///
/// An interface listed once per address contributes its MAC once.
fn external_ipv4_macs(interfaces: &[NetworkInterface]) -> Vec<String> {
    let mut macs: Vec<String> = interfaces
        .iter()
        .filter(|iface| !iface.internal)
        .filter(|iface| {
            iface
                .addr
                .iter()
                .any(|addr| matches!(addr, Addr::V4(v4) if !v4.ip.is_loopback()))
        })
        .filter_map(|iface| iface.mac_addr.as_deref())
        .map(|mac| mac.to_ascii_lowercase())
        .filter(|mac| mac != "00:00:00:00:00:00")
        .collect();

    macs.sort();
    macs.dedup();
    macs
}

/// Processor ID and machine GUID.
#[cfg(windows)]
pub(super) fn windows_ids() -> (Option<String>, Option<String>) {
    (windows::processor_id(), windows::machine_guid())
}

/// Processor ID and machine GUID; never present off Windows.
#[cfg(not(windows))]
pub(super) fn windows_ids() -> (Option<String>, Option<String>) {
    (None, None)
}

#[cfg(windows)]
mod windows {
    use super::run_with_timeout;
    use tracing::debug;

    pub(super) fn processor_id() -> Option<String> {
        let output = run_with_timeout("wmic", &["cpu", "get", "ProcessorId"])?;
        output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .nth(1)
            .map(str::to_string)
    }

    pub(super) fn machine_guid() -> Option<String> {
        match machine_uid::get() {
            Ok(guid) => Some(guid.trim().to_string()).filter(|g| !g.is_empty()),
            Err(e) => {
                debug!(error = %e, "MachineGuid unavailable");
                None
            }
        }
    }
}

/// Runs `program` and returns its stdout, or `None` on failure or after
/// the query timeout.
#[cfg(any(windows, test))]
fn run_with_timeout(program: &str, args: &[&str]) -> Option<String> {
    use std::io::Read;
    use std::process::{Command, Stdio};
    use std::thread;
    use std::time::{Duration, Instant};

    const QUERY_TIMEOUT: Duration = Duration::from_secs(3);
    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| debug!(program, error = %e, "Hardware query failed to start"))
        .ok()?;

    // Drain stdout while waiting so a full pipe cannot stall the child.
    let mut stdout = child.stdout.take()?;
    let reader = thread::spawn(move || {
        let mut out = String::new();
        stdout.read_to_string(&mut out).ok().map(|_| out)
    });

    let deadline = Instant::now() + QUERY_TIMEOUT;
    let succeeded = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.success(),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) | Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                debug!(program, "Hardware query timed out");
                break false;
            }
        }
    };

    let output = reader.join().ok().flatten();
    if succeeded {
        output
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn v4(name: &str, ip: Ipv4Addr, mac: &str) -> NetworkInterface {
        NetworkInterface::new_afinet(name, ip, None, None, 0, false)
            .with_mac_addr(Some(mac.to_string()))
    }

    #[test]
    fn test_hostname_not_empty() {
        assert!(!host_name().is_empty());
    }

    #[test]
    fn test_mac_filter_rules() {
        let link_local = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
        let v6_only = NetworkInterface::new_afinet6("wlan0", link_local, None, None, 1, false)
            .with_mac_addr(Some("3c:22:fb:00:00:02".to_string()));

        // Two IPv4 addresses on one interface, listed both ways.
        let mut multi = v4("eth0", Ipv4Addr::new(192, 168, 1, 20), "A4:83:E7:11:22:33");
        multi
            .addr
            .extend(v4("eth0", Ipv4Addr::new(10, 0, 0, 5), "").addr);
        let repeated = v4("eth0", Ipv4Addr::new(172, 16, 0, 9), "a4:83:e7:11:22:33");

        let interfaces = vec![
            v6_only,
            v4("lo", Ipv4Addr::LOCALHOST, "00:1a:2b:3c:4d:5e"),
            multi,
            repeated,
            v4("tun0", Ipv4Addr::new(10, 8, 0, 2), "00:00:00:00:00:00"),
            v4("eth1", Ipv4Addr::new(192, 168, 2, 7), "00:1b:21:aa:bb:cc"),
        ];

        assert_eq!(
            external_ipv4_macs(&interfaces),
            vec![
                "00:1b:21:aa:bb:cc".to_string(),
                "a4:83:e7:11:22:33".to_string()
            ]
        );
    }

    #[test]
    fn test_mac_filter_skips_internal_and_macless() {
        let internal =
            NetworkInterface::new_afinet("lo0", Ipv4Addr::new(192, 168, 9, 9), None, None, 0, true)
                .with_mac_addr(Some("02:00:00:00:00:01".to_string()));
        let macless =
            NetworkInterface::new_afinet("ppp0", Ipv4Addr::new(100, 64, 0, 1), None, None, 0, false);

        assert!(external_ipv4_macs(&[internal, macless]).is_empty());
    }

    #[test]
    fn test_macs_are_lowercase() {
        for mac in ipv4_macs() {
            assert_eq!(mac, mac.to_ascii_lowercase());
            assert_ne!(mac, "00:00:00:00:00:00");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_query_output_larger_than_pipe_buffer() {
        let output = run_with_timeout("sh", &["-c", "head -c 200000 /dev/zero | tr '\\0' a"])
            .expect("query output");
        assert_eq!(output.len(), 200_000);
        assert!(output.bytes().all(|b| b == b'a'));
    }

    #[cfg(unix)]
    #[test]
    fn test_query_failure_is_none() {
        assert_eq!(run_with_timeout("sh", &["-c", "echo partial; exit 1"]), None);
        assert_eq!(run_with_timeout("no-such-hardware-query", &[]), None);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_no_windows_ids_elsewhere() {
        assert_eq!(windows_ids(), (None, None));
    }
}
