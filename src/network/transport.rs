use log::debug;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::error::TransportError;
use crate::protocol::messages::Advertisement;

pub const RECV_BUFFER_SIZE: usize = 8192;
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// UDP endpoint shared by the receive loop and the advertisement task.
/// Sending from the listening socket makes the datagram's source address
/// equal to this router's configured `(ip, port)`.
#[derive(Debug, Clone)]
pub struct Transport {
    socket: Arc<UdpSocket>,
    send_timeout: Duration,
}

impl Transport {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self {
            socket: Arc::new(socket),
            send_timeout: SEND_TIMEOUT,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Receive)
    }

    pub async fn send(&self, to: SocketAddr, advertisement: &Advertisement) -> Result<(), TransportError> {
        let payload = advertisement.encode()?;
        match tokio::time::timeout(self.send_timeout, self.socket.send_to(&payload, to)).await {
            Ok(Ok(_)) => {
                debug!(
                    "Sent vector with {} destinations to {}",
                    advertisement.vector.len(),
                    to
                );
                Ok(())
            }
            Ok(Err(source)) => Err(TransportError::Send { addr: to, source }),
            Err(_) => Err(TransportError::SendTimeout(to)),
        }
    }

    /// Waits for the next datagram. Cancel-safe, so it can sit in a
    /// `select!` next to a shutdown signal.
    pub async fn recv<'a>(&self, buf: &'a mut [u8]) -> Result<(&'a [u8], SocketAddr), TransportError> {
        let (len, from) = self
            .socket
            .recv_from(buf)
            .await
            .map_err(TransportError::Receive)?;
        Ok((&buf[..len], from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn datagram_carries_sender_address() {
        let a = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = Transport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let advertisement = Advertisement::new("r1".into(), BTreeMap::from([("r1".to_string(), 0)]));

        a.send(b.local_addr().unwrap(), &advertisement).await.unwrap();

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (payload, from) = b.recv(&mut buf).await.unwrap();
        assert_eq!(from, a.local_addr().unwrap());
        assert_eq!(Advertisement::decode(payload).unwrap(), advertisement);
    }
}
