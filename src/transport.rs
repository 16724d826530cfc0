use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};

/// This is an abstraction for consuming received datagrams, introduced to
///  decouple the socket layer from message handling and to facilitate mocking
///  the I/O part away for testing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatagramHandler: Send + Sync + 'static {
    async fn on_datagram(&self, data: &[u8], sender_port: u16);
}

/// max UDP payload - receive buffers are sized so a datagram is never truncated
const RECV_BUF_SIZE: usize = 65536;

/// Fire-and-forget datagram endpoint on the loopback interface. At most one
///  listen socket is bound at a time; sends go through the listen socket when
///  one is bound (so the receiver sees the listen port as the sender port) and
///  through a lazily created ephemeral socket otherwise.
pub struct UdpTransport {
    bound: Option<BoundSocket>,
    send_socket: Option<Arc<UdpSocket>>,
}

struct BoundSocket {
    socket: Arc<UdpSocket>,
    port: u16,
    recv_handle: JoinHandle<()>,
}

impl Drop for BoundSocket {
    fn drop(&mut self) {
        self.recv_handle.abort();
    }
}

impl UdpTransport {
    pub fn new() -> UdpTransport {
        UdpTransport {
            bound: None,
            send_socket: None,
        }
    }

    /// Binds the loopback listen socket and spawns the receive task that feeds
    ///  `handler`. Port 0 asks the OS for an ephemeral port; [Self::bound_port]
    ///  reports the actual one.
    pub async fn bind(&mut self, port: u16, handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()> {
        if let Some(bound) = &self.bound {
            bail!("already bound to port {}", bound.port);
        }

        let socket = bind_reusable_loopback(port)?;
        let port = socket.local_addr()?.port();
        let socket = Arc::new(socket);

        let recv_handle = tokio::spawn(recv_loop(socket.clone(), handler));

        info!("listening on 127.0.0.1:{}", port);
        self.bound = Some(BoundSocket {
            socket,
            port,
            recv_handle,
        });
        Ok(())
    }

    /// Closes the listen socket and stops its receive task. Safe to call when
    ///  not bound.
    pub fn unbind(&mut self) {
        if let Some(bound) = self.bound.take() {
            info!("closing listen socket on port {}", bound.port);
        }
    }

    /// Sends one datagram to 127.0.0.1:dest_port, fire and forget: a local OS
    ///  error is reported, the absence of a listener on the destination port is
    ///  not.
    pub async fn send(&mut self, data: &[u8], dest_port: u16) -> anyhow::Result<()> {
        let socket = match (&self.bound, &self.send_socket) {
            (Some(bound), _) => bound.socket.clone(),
            (None, Some(send_socket)) => send_socket.clone(),
            (None, None) => {
                let socket = Arc::new(UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?);
                self.send_socket = Some(socket.clone());
                socket
            }
        };

        let to = SocketAddr::from((Ipv4Addr::LOCALHOST, dest_port));
        trace!("sending datagram, len {} to {:?}", data.len(), to);
        socket.send_to(data, to).await?;
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn bound_port(&self) -> Option<u16> {
        self.bound.as_ref().map(|b| b.port)
    }
}

/// The listen socket allows address reuse so a link can be torn down and
///  rebound without waiting for the old binding to age out.
fn bind_reusable_loopback(port: u16) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    let addr: SockAddr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port).into();
    socket.bind(&addr)?;

    Ok(UdpSocket::from_std(socket.into())?)
}

/// Waits for readiness, then drains every queued datagram before going back to
///  sleep, dispatching them to the handler in arrival order.
async fn recv_loop(socket: Arc<UdpSocket>, handler: Arc<dyn DatagramHandler>) {
    let mut buf = vec![0u8; RECV_BUF_SIZE];
    loop {
        if let Err(e) = socket.readable().await {
            error!("error waiting on datagram socket: {}", e);
            return;
        }

        loop {
            match socket.try_recv_from(&mut buf) {
                Ok((len, from)) => {
                    trace!("received datagram, len {} from {:?}", len, from);
                    handler.on_datagram(&buf[..len], from.port()).await;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("error receiving datagram: {}", e);
                    break;
                }
            }
        }
    }
}
