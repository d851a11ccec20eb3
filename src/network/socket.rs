use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::core::{Error, Result};

/// Binds a UDP socket that shares its port and accepts broadcast datagrams
pub fn bind_udp(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| Error::transport(format!("Failed to create socket: {}", e)))?;

    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .map_err(|e| Error::transport(format!("Failed to bind {}: {}", addr, e)))?;

    UdpSocket::from_std(socket.into())
        .map_err(|e| Error::transport(format!("Failed to register socket: {}", e)))
}
