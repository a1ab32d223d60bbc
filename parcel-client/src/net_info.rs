//! Local IPv4 addresses and the direct-connection candidate ordering
//! heuristic. See spec §4.5.6.

/// Enumerates this host's local IPv4 addresses, in OS-reported order.
pub fn local_ip_addresses() -> Vec<String> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            tracing::warn!("could not enumerate local addresses: {err}");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter_map(|iface| match iface.addr.ip() {
            std::net::IpAddr::V4(ip) => Some(ip.to_string()),
            std::net::IpAddr::V6(_) => None,
        })
        .collect()
}

fn is_lan_looking(ip: &str) -> bool {
    ip.starts_with("192.168.") || ip.starts_with("10.")
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Orders `candidates` by the longest common prefix against any LAN-looking
/// local address, descending. Candidates with no match against any
/// LAN-looking local IP sort after those with a match, but are not dropped.
pub fn sort_by_lan_affinity(candidates: &mut [String], local_ips: &[String]) {
    let lan_locals: Vec<&String> = local_ips.iter().filter(|ip| is_lan_looking(ip)).collect();

    let score = |candidate: &str| -> usize {
        lan_locals
            .iter()
            .map(|local| common_prefix_len(local, candidate))
            .max()
            .unwrap_or(0)
    };

    candidates.sort_by_key(|candidate| std::cmp::Reverse(score(candidate)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_lan_looking_candidate_first() {
        let local_ips = vec!["192.168.1.5".to_string()];
        let mut candidates =
            vec!["8.8.8.8".to_string(), "192.168.1.9".to_string(), "10.0.0.2".to_string()];

        sort_by_lan_affinity(&mut candidates, &local_ips);

        assert_eq!(candidates[0], "192.168.1.9");
    }

    #[test]
    fn non_lan_local_ip_does_not_bias_ordering() {
        let local_ips = vec!["203.0.113.5".to_string()];
        let mut candidates = vec!["192.168.1.9".to_string(), "203.0.113.9".to_string()];

        let before = candidates.clone();
        sort_by_lan_affinity(&mut candidates, &local_ips);

        // Neither candidate scores above 0 since the local IP isn't
        // LAN-looking, so the stable sort preserves input order.
        assert_eq!(candidates, before);
    }
}
