use core::fmt;

/// Canonical identity of one cluster node.
///
/// The `ip:port` name is what redirect replies carry and what the connection
/// registry is keyed by, so it is precomputed once and reused for every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey {
    ip: String,
    port: u16,
    name: String,
}

impl HostKey {
    pub fn new(ip: &str, port: u16) -> Self {
        HostKey {
            ip: ip.to_string(),
            port,
            name: make_name(ip, port),
        }
    }

    /// Parses an `ip:port` pair as found in MOVED/ASK replies.
    ///
    /// Leading whitespace is tolerated. The split is on the last colon so that
    /// bracketless IPv6 addresses at least keep their port intact.
    pub fn parse(name: &str) -> Option<Self> {
        let trimmed = name.trim_start();
        let (ip, port) = trimmed.rsplit_once(':')?;
        if ip.is_empty() {
            return None;
        }

        Some(HostKey::new(ip, port.parse::<u16>().ok()?))
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The `ip:port` connection map key
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub(crate) fn make_name(ip: &str, port: u16) -> String {
    let mut name = String::with_capacity(ip.len() + 6);
    name.push_str(ip);
    name.push(':');
    name.push_str(&port.to_string());
    name
}
