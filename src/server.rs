//! # HTTP 服务器
//!
//! 在双栈端口上接受连接，用 hyper 的 auto builder（HTTP/1 + HTTP/2）把每个请求交给
//! [`MuxService`]。通过 [`new_server`] 返回的 `Sender` 触发优雅关闭。

use std::{io, net::SocketAddr, time::Duration};

use axum::body::Body;
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful::GracefulShutdown},
};
use log::{info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tower::ServiceExt;

use crate::{DynError, service::MuxService};

const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Server {
    pub port: u16,
    service: MuxService,
    graceful_timeout: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// 创建服务器，向返回的 `Sender` 发送消息即开始优雅关闭
pub fn new_server(port: u16, service: MuxService) -> (Server, mpsc::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server = Server {
        port,
        service,
        graceful_timeout: GRACEFUL_SHUTDOWN_TIMEOUT,
        shutdown_rx,
    };
    (server, shutdown_tx)
}

impl Server {
    /// 关闭时等待已有连接结束的最长时间
    pub fn with_graceful_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_timeout = timeout;
        self
    }

    pub async fn run(self) -> Result<(), io::Error> {
        let listener = create_dual_stack_listener(self.port).await?;
        info!("listening on port {}", self.port);
        self.serve(listener).await
    }

    /// 在已绑定的 listener 上服务，直到收到关闭消息
    pub async fn serve(mut self, listener: TcpListener) -> Result<(), io::Error> {
        let builder = auto::Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("start graceful shutdown!");
                    drop(listener);
                    break;
                }
                conn = listener.accept() => {
                    match conn {
                        Ok((stream, peer)) => handle_connection(stream, peer, &self.service, &builder, &graceful),
                        Err(e) => warn!("accept error:{e}"),
                    }
                }
            }
        }
        tokio::select! {
            _ = graceful.shutdown() => {
                info!("Gracefully shutdown!");
            },
            _ = tokio::time::sleep(self.graceful_timeout) => {
                info!("Waited {:?} for graceful shutdown, aborting...", self.graceful_timeout);
            }
        }
        Ok(())
    }
}

fn handle_connection(
    stream: TcpStream, peer: SocketAddr, service: &MuxService, builder: &auto::Builder<TokioExecutor>, graceful: &GracefulShutdown,
) {
    let service = service.clone();
    let hyper_service =
        hyper::service::service_fn(move |request: http::Request<Incoming>| service.clone().oneshot(request.map(Body::new)));

    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), hyper_service);
    let conn = graceful.watch(conn.into_owned());

    tokio::spawn(async move {
        if let Err(err) = conn.await {
            handle_hyper_error(peer, err);
        }
        log::debug!("connection dropped: {}", PeerFormat(&peer));
    });
}

fn handle_hyper_error(peer: SocketAddr, http_err: DynError) {
    use std::error::Error;
    match http_err.downcast_ref::<hyper::Error>() {
        Some(hyper_err) => {
            let level = if hyper_err.is_user() { log::Level::Warn } else { log::Level::Debug };
            let source = hyper_err.source().unwrap_or(hyper_err);
            log::log!(
                level,
                "[hyper {}]: {:?} from {}",
                if hyper_err.is_user() { "user" } else { "system" },
                source,
                PeerFormat(&peer)
            );
        }
        None => match http_err.downcast_ref::<io::Error>() {
            Some(io_err) => warn!("[hyper io]: [{}] {} from {}", io_err.kind(), io_err, PeerFormat(&peer)),
            None => warn!("[hyper]: {} from {}", http_err, PeerFormat(&peer)),
        },
    }
}

/// ipv4-mapped 地址按 ipv4 显示
struct PeerFormat<'a>(&'a SocketAddr);

impl std::fmt::Display for PeerFormat<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0.ip().to_canonical(), self.0.port())
    }
}

/// 同时监听 ipv4 和 ipv6 的 listener
pub async fn create_dual_stack_listener(port: u16) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    #[cfg(not(windows))]
    socket.set_reuse_address(true)?; // 快速重启
    socket.set_only_v6(false)?;
    let addr = SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 0], port));
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    let std_listener = std::net::TcpListener::from(socket);
    std_listener.set_nonblocking(true)?;
    TcpListener::from_std(std_listener)
}

#[cfg(unix)]
pub async fn wait_signal() -> Result<(), DynError> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut terminate_signal = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = terminate_signal.recv() => {
            info!("receive terminate signal");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("receive ctrl_c signal");
        },
    };
    Ok(())
}

#[cfg(windows)]
pub async fn wait_signal() -> Result<(), DynError> {
    let _ = tokio::signal::ctrl_c().await;
    info!("receive ctrl_c signal");
    Ok(())
}
