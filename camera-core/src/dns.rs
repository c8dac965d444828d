/// Captive-portal resolver: every A query is answered with the access point's
/// own address. Runs on a non-blocking UDP socket so the supervisor can poll it.
use heapless::Vec;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use crate::network::NameService;

pub const DNS_PORT: u16 = 53;
/// Classic UDP DNS limit.
pub const MAX_PACKET: usize = 512;
pub const ANSWER_TTL_SECS: u32 = 60;

const HEADER_LEN: usize = 12;
const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_RD: u16 = 0x0100;
const FLAG_RA: u16 = 0x0080;
const OPCODE_MASK: u16 = 0x7800;

fn read_u16(buf: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*buf.get(at)?, *buf.get(at + 1)?]))
}

/// Length of the first question (name + type + class), or `None` if malformed.
fn question_len(query: &[u8]) -> Option<usize> {
    let mut pos = HEADER_LEN;
    loop {
        let label = *query.get(pos)? as usize;
        pos += 1;
        if label == 0 {
            break;
        }
        // Compression pointers are not legal in a question name
        if label > 63 {
            return None;
        }
        pos += label;
    }
    let end = pos + 4;
    (end <= query.len()).then(|| end - HEADER_LEN)
}

/// Build the redirect answer for `query`. Returns `None` for packets that
/// should be dropped: responses, non-standard opcodes, empty or malformed
/// questions.
pub fn redirect_response(query: &[u8], address: Ipv4Addr) -> Option<Vec<u8, MAX_PACKET>> {
    let flags = read_u16(query, 2)?;
    let qdcount = read_u16(query, 4)?;
    if flags & FLAG_QR != 0 || flags & OPCODE_MASK != 0 || qdcount == 0 {
        return None;
    }

    let qlen = question_len(query)?;
    let question = &query[HEADER_LEN..HEADER_LEN + qlen];
    let qtype = read_u16(question, qlen - 4)?;
    let qclass = read_u16(question, qlen - 2)?;
    let answer = qclass == CLASS_IN && (qtype == TYPE_A || qtype == TYPE_ANY);

    let mut out: Vec<u8, MAX_PACKET> = Vec::new();
    let response_flags = FLAG_QR | FLAG_AA | FLAG_RA | (flags & FLAG_RD);
    out.extend_from_slice(&query[0..2]).ok()?;
    out.extend_from_slice(&response_flags.to_be_bytes()).ok()?;
    out.extend_from_slice(&1u16.to_be_bytes()).ok()?;
    out.extend_from_slice(&u16::from(answer).to_be_bytes()).ok()?;
    out.extend_from_slice(&[0, 0, 0, 0]).ok()?;
    out.extend_from_slice(question).ok()?;

    if answer {
        // Name is a pointer back to the question at offset 12
        out.extend_from_slice(&[0xC0, 0x0C]).ok()?;
        out.extend_from_slice(&TYPE_A.to_be_bytes()).ok()?;
        out.extend_from_slice(&CLASS_IN.to_be_bytes()).ok()?;
        out.extend_from_slice(&ANSWER_TTL_SECS.to_be_bytes()).ok()?;
        out.extend_from_slice(&4u16.to_be_bytes()).ok()?;
        out.extend_from_slice(&address.octets()).ok()?;
    }

    Some(out)
}

pub struct CaptiveDns {
    socket: UdpSocket,
    address: Ipv4Addr,
    answered: u64,
    dropped: u64,
}

impl CaptiveDns {
    /// Bind on the standard DNS port on every interface.
    pub fn bind(address: Ipv4Addr) -> io::Result<Self> {
        Self::bind_to(SocketAddr::from(([0, 0, 0, 0], DNS_PORT)), address)
    }

    pub fn bind_to(local: SocketAddr, address: Ipv4Addr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            address,
            answered: 0,
            dropped: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn answered(&self) -> u64 {
        self.answered
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl NameService for CaptiveDns {
    fn service_one(&mut self) -> io::Result<bool> {
        let mut buf = [0u8; MAX_PACKET];
        let (len, peer) = match self.socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(e),
        };

        match redirect_response(&buf[..len], self.address) {
            Some(response) => {
                self.socket.send_to(&response, peer)?;
                self.answered += 1;
                log::trace!("DNS: redirected query from {}", peer);
            }
            None => {
                self.dropped += 1;
                log::debug!("DNS: dropped {} byte packet from {}", len, peer);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const AP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

    /// Standard query for `name` with the given type, RD set.
    fn query(id: u16, name: &str, qtype: u16) -> std::vec::Vec<u8> {
        let mut q = std::vec::Vec::new();
        q.extend_from_slice(&id.to_be_bytes());
        q.extend_from_slice(&0x0100u16.to_be_bytes());
        q.extend_from_slice(&[0, 1, 0, 0, 0, 0, 0, 0]);
        for label in name.split('.') {
            q.push(label.len() as u8);
            q.extend_from_slice(label.as_bytes());
        }
        q.push(0);
        q.extend_from_slice(&qtype.to_be_bytes());
        q.extend_from_slice(&CLASS_IN.to_be_bytes());
        q
    }

    #[test]
    fn test_a_query_gets_ap_address() {
        let q = query(0xBEEF, "connectivitycheck.gstatic.com", TYPE_A);
        let r = redirect_response(&q, AP).unwrap();

        assert_eq!(&r[0..2], &[0xBE, 0xEF]);
        let flags = u16::from_be_bytes([r[2], r[3]]);
        assert_ne!(flags & FLAG_QR, 0);
        assert_ne!(flags & FLAG_RD, 0);
        assert_eq!(flags & 0x000F, 0, "rcode must be NOERROR");
        assert_eq!(&r[4..8], &[0, 1, 0, 1]);
        // Question echoed back
        assert_eq!(&r[HEADER_LEN..q.len()], &q[HEADER_LEN..]);
        // Answer ends with TTL, rdlength and the address
        let tail = &r[r.len() - 10..];
        assert_eq!(&tail[0..4], &ANSWER_TTL_SECS.to_be_bytes());
        assert_eq!(&tail[4..6], &[0, 4]);
        assert_eq!(&tail[6..], &[192, 168, 4, 1]);
    }

    #[test]
    fn test_aaaa_query_gets_empty_answer() {
        let q = query(7, "example.com", 28);
        let r = redirect_response(&q, AP).unwrap();
        assert_eq!(&r[6..8], &[0, 0]);
        assert_eq!(r.len(), q.len());
    }

    #[test]
    fn test_drops_responses_and_garbage() {
        let mut q = query(1, "a.b", TYPE_A);
        q[2] |= 0x80;
        assert!(redirect_response(&q, AP).is_none());

        assert!(redirect_response(&[0u8; 5], AP).is_none());

        let mut truncated = query(2, "example.com", TYPE_A);
        truncated.truncate(truncated.len() - 3);
        assert!(redirect_response(&truncated, AP).is_none());

        // Compression pointer inside the question
        let mut pointer = query(3, "x", TYPE_A);
        pointer[HEADER_LEN] = 0xC0;
        assert!(redirect_response(&pointer, AP).is_none());
    }

    #[test]
    fn test_non_standard_opcode_dropped() {
        let mut q = query(4, "a.b", TYPE_A);
        q[2] |= 0x28; // opcode 5 (UPDATE)
        assert!(redirect_response(&q, AP).is_none());
    }

    #[test]
    fn test_socket_services_one_request_at_a_time() {
        let mut dns = CaptiveDns::bind_to("127.0.0.1:0".parse().unwrap(), AP).unwrap();
        let server = dns.local_addr().unwrap();

        // Nothing queued: returns immediately
        assert!(!dns.service_one().unwrap());

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        client.send_to(&query(10, "portal.local", TYPE_A), server).unwrap();
        client.send_to(&query(11, "other.local", TYPE_A), server).unwrap();

        let mut served = 0;
        for _ in 0..200 {
            if dns.service_one().unwrap() {
                served += 1;
                if served == 1 {
                    // First call handles exactly the first datagram
                    assert_eq!(dns.answered(), 1);
                }
            }
            if served == 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(served, 2);

        let mut buf = [0u8; MAX_PACKET];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[0..2], &10u16.to_be_bytes());
        assert_eq!(&buf[len - 4..len], &[192, 168, 4, 1]);
    }
}
