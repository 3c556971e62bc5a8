use std::io;
use std::sync::Arc;
use std::time::Duration;

use beacon_core::callbacks::ServerCallbacks;
use beacon_core::config::{EndpointAddr, ServerConfig};
use beacon_core::connection::ConnectionId;
use beacon_core::error::{ServerError, classify_bind_error};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::watch;

use crate::channel::ListeningChannel;
use crate::pipeline::{AnyStream, PipelineFactory};
use crate::util::{ResolvedTarget, resolve_bind_target};

/// 监听套接字：TCP 或 Unix 域，对接受循环暴露统一的 `accept`。
#[derive(Debug)]
enum AnyListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl AnyListener {
    /// 监听套接字的本地地址。
    fn local_endpoint(&self) -> io::Result<EndpointAddr> {
        match self {
            AnyListener::Tcp(listener) => listener.local_addr().map(EndpointAddr::from),
            #[cfg(unix)]
            AnyListener::Unix(listener) => {
                let addr = listener.local_addr()?;
                Ok(EndpointAddr::Unix(
                    addr.as_pathname().map(|path| path.to_owned()),
                ))
            }
        }
    }

    /// 接受一条入站连接，返回流与(本端, 对端)地址。
    async fn accept(&self) -> io::Result<(AnyStream, EndpointAddr, EndpointAddr)> {
        match self {
            AnyListener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                let local = stream
                    .local_addr()
                    .map(EndpointAddr::from)
                    .unwrap_or_else(|_| EndpointAddr::from(peer));
                Ok((AnyStream::Tcp(stream), local, EndpointAddr::from(peer)))
            }
            #[cfg(unix)]
            AnyListener::Unix(listener) => {
                let (stream, peer) = listener.accept().await?;
                let local = self.local_endpoint()?;
                let peer = EndpointAddr::Unix(peer.as_pathname().map(|path| path.to_owned()));
                Ok((AnyStream::Unix(stream), local, peer))
            }
        }
    }
}

/// 服务端引导：持有监听配置与回调面，执行一次绑定并启动接受循环。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“配置 → 套接字 → 接受循环 → 链路工厂”的装配过程收敛为单一
///   入口，门面与测试都经由同一条引导路径；
/// - 套接字构造走 `socket2`，监听积压与 `SO_REUSEADDR` 在绑定前显式
///   落地，而非依赖运行时默认值。
///
/// ## 逻辑 (How)
/// - 解析绑定目标（含 DNS），构造非阻塞套接字并应用选项，`listen`
///   之后移交 Tokio 监听器；
/// - 成功路径 spawn 接受循环任务并返回 [`ListeningChannel`]；失败
///   路径返回归类后的 [`ServerError`]，不留任何后台任务。
///
/// ## 契约 (What)
/// - `bind` 对其调用方是一次完整的“绑定或失败”：返回成功即已在
///   接受连接，本地地址可回显（临时端口场景含内核分配的端口）；
/// - 每条被接受的连接按 [`PipelineFactory`] 的固定顺序装配链路；
/// - **前置条件**：在 Tokio 运行时内调用。
///
/// ## 注意事项 (Trade-offs)
/// - 接受失败不终止循环：资源耗尽类瞬断退避 50ms 后重试，其余记录
///   后继续，避免单次故障拖垮监听器。
pub struct ServerBootstrap {
    config: ServerConfig,
    callbacks: Arc<ServerCallbacks>,
}

impl ServerBootstrap {
    /// 聚合配置与回调面，构造一次性的引导器。
    pub fn new(config: ServerConfig, callbacks: Arc<ServerCallbacks>) -> Self {
        Self { config, callbacks }
    }

    /// 执行绑定；成功返回正在接受连接的监听通道。
    pub async fn bind(self) -> Result<ListeningChannel, ServerError> {
        let target_text = self.config.bind().to_string();
        let listener = match resolve_bind_target(self.config.bind()).await? {
            ResolvedTarget::Ip(addr) => {
                let socket = Socket::new(
                    Domain::for_address(addr),
                    Type::STREAM,
                    Some(Protocol::TCP),
                )
                .map_err(|err| classify_bind_error("socket", &target_text, err))?;
                if self.config.reuse_address() {
                    socket
                        .set_reuse_address(true)
                        .map_err(|err| classify_bind_error("configure", &target_text, err))?;
                }
                socket
                    .set_nonblocking(true)
                    .map_err(|err| classify_bind_error("configure", &target_text, err))?;
                socket
                    .bind(&addr.into())
                    .map_err(|err| classify_bind_error("bind", &target_text, err))?;
                socket
                    .listen(listen_backlog(self.config.backlog()))
                    .map_err(|err| classify_bind_error("listen", &target_text, err))?;
                let listener = TcpListener::from_std(socket.into())
                    .map_err(|err| ServerError::Reactor {
                        reason: err.to_string(),
                    })?;
                AnyListener::Tcp(listener)
            }
            #[cfg(unix)]
            ResolvedTarget::Unix(path) => {
                let socket = Socket::new(Domain::UNIX, Type::STREAM, None)
                    .map_err(|err| classify_bind_error("socket", &target_text, err))?;
                socket
                    .set_nonblocking(true)
                    .map_err(|err| classify_bind_error("configure", &target_text, err))?;
                let addr = socket2::SockAddr::unix(&path)
                    .map_err(|err| classify_bind_error("bind", &target_text, err))?;
                socket
                    .bind(&addr)
                    .map_err(|err| classify_bind_error("bind", &target_text, err))?;
                socket
                    .listen(listen_backlog(self.config.backlog()))
                    .map_err(|err| classify_bind_error("listen", &target_text, err))?;
                let listener = UnixListener::from_std(socket.into())
                    .map_err(|err| ServerError::Reactor {
                        reason: err.to_string(),
                    })?;
                AnyListener::Unix(listener)
            }
        };

        let local_addr = listener
            .local_endpoint()
            .map_err(|err| classify_bind_error("local_addr", &target_text, err))?;

        let (close_tx, close_rx) = watch::channel(false);
        let (closed_tx, closed_rx) = watch::channel(false);
        let accepted_options = AcceptedOptions {
            no_delay: self.config.no_delay(),
            reuse_address: self.config.reuse_address(),
        };
        let pipeline = PipelineFactory::new(&self.config, self.callbacks);
        let loop_addr = local_addr.clone();
        tokio::spawn(accept_loop(
            listener,
            loop_addr,
            accepted_options,
            pipeline,
            close_rx,
            closed_tx,
        ));

        tracing::info!(addr = %local_addr, "server bound and accepting");
        Ok(ListeningChannel::new(local_addr, close_tx, closed_rx))
    }
}

fn listen_backlog(configured: u32) -> i32 {
    configured.min(i32::MAX as u32) as i32
}

/// 应用在被接受套接字上的选项快照。
#[derive(Clone, Copy, Debug)]
struct AcceptedOptions {
    no_delay: bool,
    reuse_address: bool,
}

impl AcceptedOptions {
    /// 在被接受的 TCP 套接字上落地 `TCP_NODELAY` 与 `SO_REUSEADDR`；
    /// 选项失败不致命，记录后继续。
    fn apply(&self, stream: &AnyStream, peer: &EndpointAddr) {
        if let AnyStream::Tcp(tcp) = stream {
            if self.no_delay
                && let Err(err) = tcp.set_nodelay(true)
            {
                tracing::warn!(peer = %peer, error = %err, "failed to set TCP_NODELAY");
            }
            if self.reuse_address
                && let Err(err) = SockRef::from(tcp).set_reuse_address(true)
            {
                tracing::warn!(peer = %peer, error = %err, "failed to set SO_REUSEADDR");
            }
        }
    }
}

/// 接受循环：逐条接受连接并装配链路，直到收到关闭请求或全部监听
/// 通道句柄消失。
async fn accept_loop(
    listener: AnyListener,
    local_addr: EndpointAddr,
    accepted_options: AcceptedOptions,
    pipeline: PipelineFactory,
    mut close_rx: watch::Receiver<bool>,
    closed_tx: watch::Sender<bool>,
) {
    let mut next_id = 0u64;
    loop {
        tokio::select! {
            changed = close_rx.changed() => {
                // 关闭请求，或全部句柄被丢弃——两者都停止接受
                if changed.is_err() || *close_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, local, peer)) => {
                    accepted_options.apply(&stream, &peer);
                    let id = ConnectionId::new(next_id);
                    next_id += 1;
                    tracing::debug!(id = %id, peer = %peer, "accepted connection");
                    pipeline.install(id, stream, local, peer);
                }
                Err(err) => {
                    tracing::warn!(addr = %local_addr, error = %err, "accept failed");
                    if is_resource_exhaustion(&err) {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        }
    }
    let _ = closed_tx.send(true);
    tracing::info!(addr = %local_addr, "listener stopped");
}

/// 文件描述符或内存耗尽类错误：瞬断，退避后重试接受。
fn is_resource_exhaustion(err: &io::Error) -> bool {
    // 23/24 对应 ENFILE/EMFILE
    err.kind() == io::ErrorKind::OutOfMemory || matches!(err.raw_os_error(), Some(23 | 24))
}
