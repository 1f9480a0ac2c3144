/*!
The SSDP client is a *control point*.
It must **not** bind to UDP port 1900.

* A device listens on 0.0.0.0:1900 for M-SEARCH discovery.
* If a local device and this client both bind on 1900 (even with SO_REUSEPORT) the kernel
  load-balances incoming datagrams between sockets, and NOTIFY / HTTP 200 messages are
  lost randomly.

The client binds an ephemeral port, sends M-SEARCH and receives the unicast replies.
It still joins the multicast group so that NOTIFY messages reach it when the network allows.
*/

use super::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Délai de lecture : borne le temps de réaction à une demande d'arrêt.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Événements SSDP intéressants pour un control point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsdpEvent {
    Alive {
        usn: String,
        nt: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
    ByeBye {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    SearchResponse {
        usn: String,
        st: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
}

/// Client SSDP pour envoyer des M-SEARCH et écouter les annonces
pub struct SsdpClient {
    socket: UdpSocket,
}

impl SsdpClient {
    /// Crée un nouveau client SSDP
    pub fn new() -> std::io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
        socket2.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(READ_TIMEOUT))?;
        socket.set_multicast_loop_v4(true)?;

        for iface in get_if_addrs::get_if_addrs()? {
            if let IpAddr::V4(ipv4) = iface.ip() {
                if ipv4.is_loopback() {
                    continue;
                }
                match socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &ipv4) {
                    Ok(()) => debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4),
                    Err(e) => warn!(
                        "SSDP: failed to join {} on {}: {}",
                        SSDP_MULTICAST_ADDR, ipv4, e
                    ),
                }
            }
        }

        info!(local_addr = ?socket.local_addr().ok(), "SSDP client ready");

        Ok(Self { socket })
    }

    /// Envoie un M-SEARCH pour un type donné
    pub fn send_msearch(&self, st: &str, mx: u32) -> std::io::Result<()> {
        let mx = mx.max(1); // MX doit être >= 1
        let msg = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             USER-AGENT: PMOBrowser SSDP Client\r\n\
             \r\n",
            SSDP_MULTICAST_ADDR, SSDP_PORT, mx, st
        );

        let addr = SocketAddr::V4(SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT));

        match self.socket.send_to(msg.as_bytes(), addr) {
            Ok(_) => {
                debug!(st, mx, "M-SEARCH sent");
                trace!("M-SEARCH payload:\n{}", msg);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to send M-SEARCH: {}", e);
                Err(e)
            }
        }
    }

    /// Boucle de réception bloquante, jusqu'à ce que `running` passe à `false`.
    pub fn run_event_loop<F>(&self, running: &AtomicBool, mut on_event: F)
    where
        F: FnMut(SsdpEvent),
    {
        let mut buf = [0u8; 8192];
        while running.load(Ordering::Acquire) {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    let data = String::from_utf8_lossy(&buf[..n]);
                    if let Some(event) = parse_message(&data, from) {
                        trace!("SSDP event from {}: {:?}", from, event);
                        on_event(event);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(e) => {
                    warn!("SSDP client read error: {}", e);
                }
            }
        }
        debug!("SSDP event loop stopped");
    }
}

fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpEvent> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    if upper.starts_with("NOTIFY ") {
        handle_notify(&headers, from)
    } else if upper.starts_with("HTTP/") && upper.contains(" 200") {
        handle_search_response(&headers, from)
    } else {
        // M-SEARCH d'un autre control point, ou message inconnu
        trace!("Ignoring SSDP message from {}: {}", from, first_line);
        None
    }
}

fn handle_notify(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.to_string();
    let usn = headers.get("USN")?.to_string();

    match nts.as_str() {
        "ssdp:alive" => {
            let Some(location) = headers.get("LOCATION") else {
                trace!("NOTIFY ssdp:alive from {} missing LOCATION header", from);
                return None;
            };
            Some(SsdpEvent::Alive {
                usn,
                nt,
                location: location.to_string(),
                server: server_header(headers),
                max_age: parse_max_age(headers.get("CACHE-CONTROL")),
                from,
            })
        }
        "ssdp:byebye" => Some(SsdpEvent::ByeBye { usn, nt, from }),
        _ => {
            trace!("Unknown NTS value from {}: {}", from, nts);
            None
        }
    }
}

fn handle_search_response(
    headers: &HashMap<String, String>,
    from: SocketAddr,
) -> Option<SsdpEvent> {
    let (Some(st), Some(usn), Some(location)) = (
        headers.get("ST"),
        headers.get("USN"),
        headers.get("LOCATION"),
    ) else {
        trace!("M-SEARCH response from {} missing ST/USN/LOCATION", from);
        return None;
    };

    Some(SsdpEvent::SearchResponse {
        usn: usn.to_string(),
        st: st.to_string(),
        location: location.to_string(),
        server: server_header(headers),
        max_age: parse_max_age(headers.get("CACHE-CONTROL")),
        from,
    })
}

fn server_header(headers: &HashMap<String, String>) -> String {
    headers
        .get("SERVER")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string())
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();

        // Empty line marks end of headers
        if line.is_empty() {
            break;
        }

        // Split on first ':' only (values may contain ':')
        let Some((name, value)) = line.split_once(':') else {
            trace!("Skipping line without colon: '{}'", line);
            continue;
        };

        let name = name.trim().to_ascii_uppercase();
        let value = value.trim();
        if !name.is_empty() && !value.is_empty() {
            headers.insert(name, value.to_string());
        }
    }
    headers
}

fn parse_max_age(value: Option<&String>) -> u32 {
    if let Some(v) = value {
        let lower = v.to_ascii_lowercase();
        if let Some(idx) = lower.find("max-age") {
            let after_key = &v[idx + "max-age".len()..];
            let after_eq = after_key.trim_start().trim_start_matches('=').trim_start();
            let digits: String = after_eq
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(age) = digits.parse::<u32>() {
                return age;
            }
        }
        trace!(
            "Could not parse max-age from CACHE-CONTROL: '{}', using default {}",
            v, MAX_AGE
        );
    }
    MAX_AGE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> SocketAddr {
        "192.168.1.20:1900".parse().unwrap()
    }

    #[test]
    fn test_parse_search_response() {
        let msg = "HTTP/1.1 200 OK\r\n\
                   CACHE-CONTROL: max-age = 900\r\n\
                   LOCATION: http://192.168.1.20:8200/rootDesc.xml\r\n\
                   SERVER: Linux/5.10 DLNADOC/1.50 UPnP/1.0 MiniDLNA/1.3.0\r\n\
                   ST: urn:schemas-upnp-org:device:MediaServer:1\r\n\
                   USN: uuid:4d696e69::urn:schemas-upnp-org:device:MediaServer:1\r\n\
                   \r\n";

        let event = parse_message(msg, from()).unwrap();
        match event {
            SsdpEvent::SearchResponse {
                st,
                location,
                max_age,
                ..
            } => {
                assert_eq!(st, "urn:schemas-upnp-org:device:MediaServer:1");
                assert_eq!(location, "http://192.168.1.20:8200/rootDesc.xml");
                assert_eq!(max_age, 900);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_notify_alive_and_byebye() {
        let alive = "NOTIFY * HTTP/1.1\r\n\
                     HOST: 239.255.255.250:1900\r\n\
                     NT: urn:schemas-upnp-org:device:MediaServer:1\r\n\
                     NTS: ssdp:alive\r\n\
                     location: http://192.168.1.20:8200/rootDesc.xml\r\n\
                     USN: uuid:abcd::urn:schemas-upnp-org:device:MediaServer:1\r\n\
                     \r\n";
        match parse_message(alive, from()).unwrap() {
            SsdpEvent::Alive {
                server, max_age, ..
            } => {
                assert_eq!(server, "Unknown");
                assert_eq!(max_age, MAX_AGE);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let byebye = "NOTIFY * HTTP/1.1\r\n\
                      NT: urn:schemas-upnp-org:device:MediaServer:1\r\n\
                      NTS: ssdp:byebye\r\n\
                      USN: uuid:abcd::urn:schemas-upnp-org:device:MediaServer:1\r\n\
                      \r\n";
        assert!(matches!(
            parse_message(byebye, from()),
            Some(SsdpEvent::ByeBye { .. })
        ));
    }

    #[test]
    fn test_ignores_msearch_and_incomplete_messages() {
        let msearch = "M-SEARCH * HTTP/1.1\r\nST: ssdp:all\r\n\r\n";
        assert!(parse_message(msearch, from()).is_none());

        let no_location = "HTTP/1.1 200 OK\r\nST: upnp:rootdevice\r\nUSN: uuid:x\r\n\r\n";
        assert!(parse_message(no_location, from()).is_none());
    }
}
