//! UDP transport socket
//!
//! One socket per session, configured for unicast, broadcast or multicast.
//! `close()` may be called from any thread while another thread is blocked
//! in `recv`. The socket is never shut down underneath the receiver: the
//! blocked call wakes at its next read-timeout tick, sees the closed flag
//! and returns [`NetworkError::Cancelled`] instead of a network failure.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::{CastConfig, CastMode};
use crate::error::NetworkError;

/// Datagram endpoint owned by one pipeline session
#[derive(Debug)]
pub struct TransportSocket {
    socket: UdpSocket,
    mode: CastMode,
    /// Where `send` delivers; `None` on receiving sockets
    destination: Option<SocketAddr>,
    /// Multicast group this socket joined
    group: Option<Ipv4Addr>,
    /// Interface the group was joined on
    interface: Ipv4Addr,
    /// Cleared once the group has been left
    member: AtomicBool,
    closed: AtomicBool,
}

fn new_socket(addr: &SocketAddr) -> Result<Socket, NetworkError> {
    Socket::new(Domain::for_address(*addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))
}

fn unspecified_for(addr: &SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

fn join_group(socket: &Socket, group: Ipv4Addr, interface: Ipv4Addr) -> Result<(), NetworkError> {
    socket
        .join_multicast_v4(&group, &interface)
        .map_err(|e| NetworkError::Multicast(format!("join {} on {}: {}", group, interface, e)))
}

impl TransportSocket {
    /// Socket for sending to the configured destination
    pub fn open_sender(cast: &CastConfig) -> Result<Self, NetworkError> {
        let destination = cast.destination();
        let socket = new_socket(&destination)?;

        socket
            .bind(&SockAddr::from(unspecified_for(&destination)))
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

        let mut group = None;
        match cast.mode {
            CastMode::Unicast => {}
            CastMode::Broadcast => {
                socket
                    .set_broadcast(true)
                    .map_err(|e| NetworkError::SocketOption(format!("broadcast: {}", e)))?;
            }
            CastMode::Multicast => {
                if !cast.multicast_interface.is_unspecified() {
                    socket
                        .set_multicast_if_v4(&cast.multicast_interface)
                        .map_err(|e| NetworkError::SocketOption(format!("multicast interface: {}", e)))?;
                }
                socket
                    .set_multicast_loop_v4(true)
                    .map_err(|e| NetworkError::SocketOption(format!("multicast loop: {}", e)))?;
                join_group(&socket, cast.multicast_addr, cast.multicast_interface)?;
                group = Some(cast.multicast_addr);
            }
        }

        tracing::debug!("Sender socket ready ({} to {})", cast.mode, destination);

        Ok(Self {
            socket: socket.into(),
            mode: cast.mode,
            destination: Some(destination),
            group,
            interface: cast.multicast_interface,
            member: AtomicBool::new(group.is_some()),
            closed: AtomicBool::new(false),
        })
    }

    /// Socket listening on the configured port
    ///
    /// Receives wake up at least every `poll` so callers can re-check
    /// their state.
    pub fn open_receiver(cast: &CastConfig, poll: Duration) -> Result<Self, NetworkError> {
        let listen = cast.listen_addr();
        let socket = new_socket(&listen)?;

        socket
            .set_reuse_address(true)
            .map_err(|e| NetworkError::SocketOption(format!("reuse address: {}", e)))?;
        socket
            .bind(&SockAddr::from(listen))
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", listen, e)))?;

        let mut group = None;
        match cast.mode {
            CastMode::Unicast => {}
            CastMode::Broadcast => {
                socket
                    .set_broadcast(true)
                    .map_err(|e| NetworkError::SocketOption(format!("broadcast: {}", e)))?;
            }
            CastMode::Multicast => {
                join_group(&socket, cast.multicast_addr, cast.multicast_interface)?;
                group = Some(cast.multicast_addr);
            }
        }

        socket
            .set_read_timeout(Some(poll))
            .map_err(|e| NetworkError::SocketOption(format!("read timeout: {}", e)))?;

        tracing::debug!("Receiver socket bound to {} ({})", listen, cast.mode);

        Ok(Self {
            socket: socket.into(),
            mode: cast.mode,
            destination: None,
            group,
            interface: cast.multicast_interface,
            member: AtomicBool::new(group.is_some()),
            closed: AtomicBool::new(false),
        })
    }

    /// Send one datagram to the configured destination
    pub fn send(&self, packet: &[u8]) -> Result<usize, NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::Cancelled);
        }
        let destination = self
            .destination
            .ok_or_else(|| NetworkError::SendFailed("socket has no destination".into()))?;

        match self.socket.send_to(packet, destination) {
            Ok(sent) => Ok(sent),
            Err(_) if self.is_closed() => Err(NetworkError::Cancelled),
            Err(e) => Err(NetworkError::SendFailed(e.to_string())),
        }
    }

    /// Receive one datagram into `buf`; returns its length and source
    pub fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::Cancelled);
        }

        match self.socket.recv_from(buf) {
            Ok(_) if self.is_closed() => Err(NetworkError::Cancelled),
            Ok(received) => Ok(received),
            Err(_) if self.is_closed() => Err(NetworkError::Cancelled),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(NetworkError::Timeout)
            }
            Err(e) => Err(NetworkError::ReceiveFailed(e.to_string())),
        }
    }

    /// Mark the socket closed and leave any multicast group
    ///
    /// A thread blocked in `recv` returns [`NetworkError::Cancelled`] within
    /// one read-timeout tick. The descriptor itself is released on drop.
    /// Calling it more than once is harmless.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.leave_group();
    }

    fn leave_group(&self) {
        let Some(group) = self.group else {
            tracing::trace!("No multicast group to leave");
            return;
        };
        match self.socket.leave_multicast_v4(&group, &self.interface) {
            Ok(()) => {
                self.member.store(false, Ordering::SeqCst);
                tracing::debug!("Left multicast group {}", group);
            }
            Err(e) => tracing::debug!("Leaving multicast group {}: {}", group, e),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> CastMode {
        self.mode
    }

    pub fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }

    /// Multicast group joined by this socket
    pub fn group(&self) -> Option<Ipv4Addr> {
        self.group
    }

    /// Whether the socket still belongs to its multicast group
    pub fn is_member(&self) -> bool {
        self.member.load(Ordering::SeqCst)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.socket
            .local_addr()
            .map_err(|e| NetworkError::SocketOption(e.to_string()))
    }
}

impl Drop for TransportSocket {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn loopback_pair() -> (TransportSocket, TransportSocket) {
        let mut cast = CastConfig::default();
        cast.bind_addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
        cast.port = 0;
        let receiver = TransportSocket::open_receiver(&cast, Duration::from_millis(50)).unwrap();
        cast.port = receiver.local_addr().unwrap().port();

        let sender = TransportSocket::open_sender(&cast).unwrap();
        (sender, receiver)
    }

    #[test]
    fn test_unicast_loopback() {
        let (sender, receiver) = loopback_pair();
        assert_eq!(sender.send(&[1, 2, 3, 4, 5]).unwrap(), 5);

        let mut buf = [0u8; 16];
        let (len, from) = receiver.recv(&mut buf).unwrap();
        assert_eq!(len, 5);
        assert_eq!(&buf[..5], &[1, 2, 3, 4, 5]);
        assert_eq!(from.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_recv_times_out() {
        let (_sender, receiver) = loopback_pair();
        let mut buf = [0u8; 16];
        assert!(matches!(receiver.recv(&mut buf), Err(NetworkError::Timeout)));
    }

    #[test]
    fn test_close_cancels_blocked_recv() {
        let (_sender, receiver) = loopback_pair();
        let receiver = Arc::new(receiver);

        let blocked = receiver.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 16];
            let started = Instant::now();
            loop {
                match blocked.recv(&mut buf) {
                    Err(NetworkError::Timeout) => continue,
                    other => return (other.map(|_| ()), started.elapsed()),
                }
            }
        });

        thread::sleep(Duration::from_millis(30));
        receiver.close();

        let (result, elapsed) = handle.join().unwrap();
        assert!(matches!(result, Err(NetworkError::Cancelled)));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_send_after_close() {
        let (sender, _receiver) = loopback_pair();
        sender.close();
        sender.close();
        assert!(matches!(sender.send(&[0]), Err(NetworkError::Cancelled)));
    }

    #[test]
    fn test_receiver_cannot_send() {
        let (_sender, receiver) = loopback_pair();
        assert!(matches!(receiver.send(&[0]), Err(NetworkError::SendFailed(_))));
    }

    fn recv_within(socket: &TransportSocket, buf: &mut [u8]) -> (usize, SocketAddr) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match socket.recv(buf) {
                Err(NetworkError::Timeout) if Instant::now() < deadline => continue,
                other => return other.unwrap(),
            }
        }
    }

    #[test]
    fn test_blocked_recv_survives_repeated_close() {
        let (_sender, receiver) = loopback_pair();
        let receiver = Arc::new(receiver);

        let blocked = receiver.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 16];
            let mut timeouts = 0;
            loop {
                match blocked.recv(&mut buf) {
                    Err(NetworkError::Timeout) => timeouts += 1,
                    Err(NetworkError::Cancelled) => return timeouts,
                    other => panic!("unexpected receive result: {:?}", other),
                }
            }
        });

        thread::sleep(Duration::from_millis(80));
        receiver.close();
        receiver.close();

        // The receiving thread returns normally instead of dying inside recv_from
        let timeouts = handle.join().unwrap();
        assert!(timeouts >= 1);
        let mut buf = [0u8; 16];
        assert!(matches!(receiver.recv(&mut buf), Err(NetworkError::Cancelled)));
    }

    #[test]
    fn test_broadcast_loopback() {
        let mut cast = CastConfig::default();
        cast.mode = CastMode::Broadcast;
        cast.broadcast_addr = Ipv4Addr::new(127, 255, 255, 255);
        cast.bind_addr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        cast.port = 0;

        let receiver = TransportSocket::open_receiver(&cast, Duration::from_millis(50)).unwrap();
        cast.port = receiver.local_addr().unwrap().port();
        let sender = TransportSocket::open_sender(&cast).unwrap();

        assert_eq!(sender.mode(), CastMode::Broadcast);
        assert_eq!(
            sender.destination(),
            Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 255, 255, 255)), cast.port))
        );
        assert!(socket2::SockRef::from(&sender.socket).broadcast().unwrap());
        assert!(socket2::SockRef::from(&receiver.socket).broadcast().unwrap());
        assert!(sender.group().is_none());

        assert_eq!(sender.send(&[9, 8, 7]).unwrap(), 3);
        let mut buf = [0u8; 16];
        let (len, _) = recv_within(&receiver, &mut buf);
        assert_eq!(&buf[..len], &[9, 8, 7]);
    }

    #[test]
    fn test_multicast_loopback_and_leave() {
        let mut cast = CastConfig::default();
        cast.mode = CastMode::Multicast;
        cast.multicast_addr = Ipv4Addr::new(239, 255, 20, 77);
        cast.multicast_interface = Ipv4Addr::LOCALHOST;
        cast.bind_addr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        cast.port = 0;

        let receiver = TransportSocket::open_receiver(&cast, Duration::from_millis(50)).unwrap();
        cast.port = receiver.local_addr().unwrap().port();
        let sender = TransportSocket::open_sender(&cast).unwrap();

        assert_eq!(receiver.group(), Some(cast.multicast_addr));
        assert!(receiver.is_member());
        assert!(sender.is_member());

        assert_eq!(sender.send(&[4, 2]).unwrap(), 2);
        let mut buf = [0u8; 16];
        let (len, _) = recv_within(&receiver, &mut buf);
        assert_eq!(&buf[..len], &[4, 2]);

        receiver.close();
        assert!(!receiver.is_member());
        assert!(matches!(receiver.recv(&mut buf), Err(NetworkError::Cancelled)));

        // Leaving twice is benign
        receiver.close();
        assert!(!receiver.is_member());
    }

    #[test]
    fn test_close_without_group_is_benign() {
        let (_sender, receiver) = loopback_pair();
        assert!(receiver.group().is_none());
        assert!(!receiver.is_member());
        receiver.close();
        assert!(receiver.is_closed());
    }
}
