//! Parsers for `/proc/net/tcp{,6}`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use anyhow::{bail, Context, Result};

/// `st` column value for TCP_LISTEN.
const TCP_LISTEN: u8 = 0x0A;

/// One row of a `/proc/net/tcp` table, trimmed to what ownership needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub state: u8,
    pub inode: u64,
}

impl SocketEntry {
    pub fn is_listening(&self) -> bool {
        self.state == TCP_LISTEN
    }
}

/// Decode a kernel address column: 8 hex chars for IPv4, 32 for IPv6.
///
/// The kernel prints each 32-bit word in host (little-endian) order.
pub fn decode_addr(hex: &str) -> Result<IpAddr> {
    let words = match hex.len() {
        8 | 32 => hex.len() / 8,
        n => bail!("address column has {} hex chars, expected 8 or 32", n),
    };

    let mut octets = Vec::with_capacity(words * 4);
    for i in 0..words {
        let word = u32::from_str_radix(&hex[i * 8..(i + 1) * 8], 16)
            .with_context(|| format!("bad address word in {}", hex))?;
        octets.extend_from_slice(&word.to_le_bytes());
    }

    Ok(match octets.len() {
        4 => IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])),
        _ => {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&octets);
            IpAddr::V6(Ipv6Addr::from(bytes))
        }
    })
}

pub fn decode_port(hex: &str) -> Result<u16> {
    u16::from_str_radix(hex, 16).with_context(|| format!("bad port column {}", hex))
}

pub fn parse_socket_line(line: &str) -> Result<SocketEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 10 {
        bail!("socket line has {} fields", fields.len());
    }

    let (addr, port) = fields[1]
        .split_once(':')
        .context("local address without port")?;

    Ok(SocketEntry {
        local_addr: decode_addr(addr)?,
        local_port: decode_port(port)?,
        state: u8::from_str_radix(fields[3], 16).context("bad state column")?,
        inode: fields[9].parse().context("bad inode column")?,
    })
}

/// Listening sockets in one table. The header and malformed rows are skipped.
pub fn listening_sockets(content: &str) -> Vec<SocketEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| parse_socket_line(line).ok())
        .filter(SocketEntry::is_listening)
        .collect()
}

/// Render an address the way bind addresses are shown to users.
pub fn display_addr(addr: &IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";

    #[test]
    fn test_decode_addr_v4() {
        assert_eq!(
            decode_addr("0100007F").unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
        assert_eq!(
            decode_addr("0501A8C0").unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5))
        );
        assert_eq!(
            decode_addr("00000000").unwrap(),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        );
    }

    #[test]
    fn test_decode_addr_v6() {
        assert_eq!(
            decode_addr("00000000000000000000000001000000").unwrap(),
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        );
        assert_eq!(
            decode_addr("00000000000000000000000000000000").unwrap(),
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        );
    }

    #[test]
    fn test_decode_addr_bad_length() {
        assert!(decode_addr("0100").is_err());
    }

    #[test]
    fn test_decode_port() {
        assert_eq!(decode_port("1F90").unwrap(), 8080);
        assert_eq!(decode_port("01BB").unwrap(), 443);
    }

    #[test]
    fn test_parse_listen_line() {
        let line = "   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000   500        0 12345 1 0000000000000000 100 0 0 10 0";
        let entry = parse_socket_line(line).unwrap();
        assert_eq!(entry.local_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(entry.local_port, 8080);
        assert_eq!(entry.inode, 12345);
        assert!(entry.is_listening());
    }

    #[test]
    fn test_listening_sockets_skips_established() {
        let content = format!(
            "{}\n{}\n{}\n",
            HEADER,
            "   0: 00000000:0050 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 111 1 0000000000000000 100 0 0 10 0",
            "   1: 0100007F:0050 0501A8C0:D431 01 00000000:00000000 00:00000000 00000000   500        0 222 1 0000000000000000 100 0 0 10 0",
        );
        let sockets = listening_sockets(&content);
        assert_eq!(sockets.len(), 1);
        assert_eq!(sockets[0].local_port, 80);
        assert_eq!(sockets[0].inode, 111);
    }

    #[test]
    fn test_listening_sockets_ignores_garbage() {
        let content = format!("{}\nnot a socket line\n", HEADER);
        assert!(listening_sockets(&content).is_empty());
    }

    #[test]
    fn test_display_addr_unwraps_mapped_v4() {
        let mapped = decode_addr("0000000000000000FFFF00000100007F").unwrap();
        assert_eq!(display_addr(&mapped), "127.0.0.1");
        assert_eq!(display_addr(&IpAddr::V6(Ipv6Addr::UNSPECIFIED)), "::");
    }
}
