use crate::server::Transport;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    io,
    net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket},
};
use thiserror::Error;
use tokio::net::UdpSocket as TokioUdpSocket;

/// Defines all possible errors for socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to enable broadcast on socket")]
    SetBroadcast(#[source] io::Error),

    #[error("Failed to set SO_BINDTODEVICE on interface '{interface}'")]
    BindToDevice {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind socket to port {port}")]
    BindSocket {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set SO_REUSEADDR on socket")]
    SetReuseAddress(#[source] io::Error),

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to convert socket to TokioUdpSocket")]
    ConvertToTokio(#[source] io::Error),

    #[allow(dead_code)]
    #[error("Binding to a specific device is not implemented on this platform")]
    NotImplemented,
}

/// Creates the server's `tokio::net::UdpSocket` on `0.0.0.0:port`.
///
/// Broadcast is enabled so replies can reach clients that have no address
/// yet. When `interface` is given the socket only sees traffic from that
/// device.
pub fn new_tokio_socket_bound_to_device(
    interface: Option<&str>,
    port: u16,
) -> Result<TokioUdpSocket, SocketError> {
    let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(SocketError::CreateSocket)?;

    socket2
        .set_broadcast(true)
        .map_err(SocketError::SetBroadcast)?;

    socket2
        .set_reuse_address(true)
        .map_err(SocketError::SetReuseAddress)?;

    if let Some(interface) = interface {
        bind_to_device(&socket2, interface)?;
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket2
        .bind(&addr.into())
        .map_err(|source| SocketError::BindSocket { port, source })?;

    let std_socket: StdUdpSocket = socket2.into();
    std_socket
        .set_nonblocking(true)
        .map_err(SocketError::SetNonBlocking)?;
    TokioUdpSocket::from_std(std_socket).map_err(SocketError::ConvertToTokio)
}

#[cfg(target_os = "linux")]
fn bind_to_device(socket: &Socket, interface: &str) -> Result<(), SocketError> {
    use std::os::fd::AsRawFd;

    // SAFETY: the descriptor is owned by `socket` and the option value is the
    // interface name with its exact length.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            interface.as_ptr() as *const libc::c_void,
            interface.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(SocketError::BindToDevice {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Fallback for non-Linux systems where `SO_BINDTODEVICE` is not available.
#[cfg(not(target_os = "linux"))]
fn bind_to_device(_socket: &Socket, _interface: &str) -> Result<(), SocketError> {
    Err(SocketError::NotImplemented)
}

impl Transport for TokioUdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        TokioUdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        TokioUdpSocket::send_to(self, buf, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let socket = new_tokio_socket_bound_to_device(None, 0).unwrap();
        let local = socket.local_addr().unwrap();
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_transport_round_trip() {
        let server = new_tokio_socket_bound_to_device(None, 0).unwrap();
        let port = server.local_addr().unwrap().port();
        let client = TokioUdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(b"ping", ("127.0.0.1", port)).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, peer) = Transport::recv_from(&server, &mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(peer, client.local_addr().unwrap());

        Transport::send_to(&server, b"pong", peer).await.unwrap();
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"pong");
    }
}
