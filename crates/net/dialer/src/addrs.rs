//! Address filtering applied before dialing.

use std::collections::HashSet;

use libp2p::multiaddr::Protocol;

use cairn_primitives::Multiaddr;

/// Whether `addr` is worth handing to the transport.
///
/// Rejects empty addresses, unspecified IPs, IPv6 link-local addresses and
/// anything not rooted in an IP, DNS or in-memory component.
pub fn is_usable(addr: &Multiaddr) -> bool {
    match addr.iter().next() {
        Some(Protocol::Ip4(ip)) => !ip.is_unspecified(),
        Some(Protocol::Ip6(ip)) => {
            !ip.is_unspecified() && ip.segments().first().is_none_or(|s| s & 0xffc0 != 0xfe80)
        }
        Some(
            Protocol::Dns(_)
            | Protocol::Dns4(_)
            | Protocol::Dns6(_)
            | Protocol::Dnsaddr(_)
            | Protocol::Memory(_),
        ) => true,
        _ => false,
    }
}

/// Keep usable addresses, dropping duplicates while preserving order.
pub fn filter_usable(addrs: impl IntoIterator<Item = Multiaddr>) -> Vec<Multiaddr> {
    let mut seen = HashSet::new();
    addrs
        .into_iter()
        .filter(|a| is_usable(a) && seen.insert(a.clone()))
        .collect()
}

/// Remove every address in `exclude` from `addrs`.
pub fn subtract(addrs: Vec<Multiaddr>, exclude: &[Multiaddr]) -> Vec<Multiaddr> {
    if exclude.is_empty() {
        return addrs;
    }
    addrs.into_iter().filter(|a| !exclude.contains(a)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ma(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_is_usable() {
        assert!(is_usable(&ma("/ip4/192.168.1.10/tcp/4001")));
        assert!(is_usable(&ma("/ip6/2001:db8::1/tcp/4001")));
        assert!(is_usable(&ma("/dns4/node.example.org/tcp/4001")));
        assert!(is_usable(&ma("/memory/7")));

        assert!(!is_usable(&Multiaddr::empty()));
        assert!(!is_usable(&ma("/ip4/0.0.0.0/tcp/4001")));
        assert!(!is_usable(&ma("/ip6/::/tcp/4001")));
        assert!(!is_usable(&ma("/ip6/fe80::1/tcp/4001")));
        assert!(!is_usable(&ma("/tcp/4001")));
    }

    #[test]
    fn test_filter_usable_dedups_in_order() {
        let addrs = vec![
            ma("/ip4/10.0.0.2/tcp/1"),
            ma("/ip4/0.0.0.0/tcp/1"),
            ma("/ip4/10.0.0.1/tcp/1"),
            ma("/ip4/10.0.0.2/tcp/1"),
        ];
        assert_eq!(
            filter_usable(addrs),
            vec![ma("/ip4/10.0.0.2/tcp/1"), ma("/ip4/10.0.0.1/tcp/1")]
        );
    }

    #[test]
    fn test_subtract() {
        let addrs = vec![ma("/memory/1"), ma("/memory/2"), ma("/memory/3")];
        let own = [ma("/memory/2")];
        assert_eq!(
            subtract(addrs.clone(), &own),
            vec![ma("/memory/1"), ma("/memory/3")]
        );
        assert_eq!(subtract(addrs.clone(), &[]), addrs);
    }
}
