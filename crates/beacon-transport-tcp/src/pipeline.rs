use std::io;
use std::sync::Arc;

use beacon_core::backpressure::BackpressureGuard;
use beacon_core::callbacks::ServerCallbacks;
use beacon_core::config::{EndpointAddr, ServerConfig};
use beacon_core::connection::ConnectionId;
use beacon_core::error::{ConnectionError, classify_connection_error};
use beacon_core::recv_buffer::{AdaptiveRecvBuffer, RecvBufferConfig};
use beacon_core::WriteWatermarks;
use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::channel::TcpConnection;

/// 被接受连接的字节流：TCP 或 Unix 域，二者对 IO 任务暴露同一组
/// 就绪/读/写原语。
#[derive(Debug)]
pub(crate) enum AnyStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AnyStream {
    /// 等待读就绪。
    async fn readable(&self) -> io::Result<()> {
        match self {
            AnyStream::Tcp(stream) => stream.readable().await,
            #[cfg(unix)]
            AnyStream::Unix(stream) => stream.readable().await,
        }
    }

    /// 非阻塞读一段数据；无数据可读时返回 `WouldBlock`。
    fn try_read_buf(&self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            AnyStream::Tcp(stream) => stream.try_read_buf(buf),
            #[cfg(unix)]
            AnyStream::Unix(stream) => stream.try_read_buf(buf),
        }
    }

    /// 将整段缓冲写入套接字。
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            AnyStream::Tcp(stream) => stream.write_all(buf).await,
            #[cfg(unix)]
            AnyStream::Unix(stream) => stream.write_all(buf).await,
        }
    }
}

/// 每连接的链路装配工厂：按固定顺序安装背压守卫与读分发器，并
/// 启动连接的 IO 任务。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 接受循环只负责拿到套接字；连接侧的组件装配与任务启动收敛在
///   此处，保证每条连接的链路结构一致；
/// - 装配顺序固定且承载语义：背压守卫先于读分发器构造并挂入连接，
///   首个入站字节即处于流控视野之内；颠倒顺序会让分发器的回调
///   绕开守卫间接施压，语义不等价。
///
/// ## 契约 (What)
/// - 工厂自身无连接态，仅持有只读共享的回调面与配置快照，可安全
///   服务任意数量的接受事件；
/// - `install` 返回连接句柄，IO 任务随 `tokio::spawn` 立即开始驱动。
#[derive(Clone)]
pub(crate) struct PipelineFactory {
    callbacks: Arc<ServerCallbacks>,
    watermarks: WriteWatermarks,
    recv_config: RecvBufferConfig,
    max_messages_per_read: usize,
}

impl PipelineFactory {
    pub(crate) fn new(config: &ServerConfig, callbacks: Arc<ServerCallbacks>) -> Self {
        Self {
            callbacks,
            watermarks: config.write_watermarks(),
            recv_config: config.recv_buffer(),
            max_messages_per_read: config.max_messages_per_read(),
        }
    }

    /// 为一条新接受的连接装配链路并启动其 IO 任务。
    pub(crate) fn install(
        &self,
        id: ConnectionId,
        stream: AnyStream,
        local_addr: EndpointAddr,
        peer_addr: EndpointAddr,
    ) -> TcpConnection {
        // 顺序固定：守卫先行，分发器在后
        let guard = BackpressureGuard::new(self.watermarks);
        let connection = TcpConnection::new(id, local_addr, peer_addr, guard);
        let handler = ConnectionHandler::new(Arc::clone(&self.callbacks));
        let recv = AdaptiveRecvBuffer::new(self.recv_config);
        tokio::spawn(run_connection(
            stream,
            connection.clone(),
            handler,
            recv,
            self.max_messages_per_read,
        ));
        connection
    }
}

/// 读分发器：把入站字节交给消费方回调，在批次边界统一刷新出站
/// 队列，错误路径上观测后关闭连接。
///
/// # 教案式注释
///
/// ## 契约 (What)
/// - `on_data`：缓冲原样转交 `on_read`，所有权仅覆盖回调的同步执行
///   期；消费方需要留存时自行克隆（`Bytes` 克隆为浅拷贝）；
/// - `on_read_complete`：每个读批次触发一次，按入队顺序把出站队列
///   全部刷出（聚集写），并逐段驱动守卫排水与 `on_write` 观测回调；
/// - `on_error`：先调用服务级 `on_error` 回调，再无条件关闭连接；
///   连接错误既不静默吞掉，也不放任连接悬挂。
pub(crate) struct ConnectionHandler {
    callbacks: Arc<ServerCallbacks>,
}

impl ConnectionHandler {
    pub(crate) fn new(callbacks: Arc<ServerCallbacks>) -> Self {
        Self { callbacks }
    }

    /// 将一段入站字节转交消费方。
    fn on_data(&self, connection: &TcpConnection, data: bytes::Bytes) -> Result<(), ConnectionError> {
        (self.callbacks.on_read())(connection, data)
    }

    /// 批次收尾：刷新出站队列直至排空。
    async fn on_read_complete(
        &self,
        connection: &TcpConnection,
        stream: &mut AnyStream,
    ) -> Result<(), ConnectionError> {
        loop {
            let batch = connection.drain_queue();
            if batch.is_empty() {
                return Ok(());
            }
            for buf in batch {
                stream
                    .write_all(&buf)
                    .await
                    .map_err(|err| classify_connection_error(true, err))?;
                connection.mark_drained(buf.len());
                if let Some(on_write) = self.callbacks.on_write() {
                    on_write(connection, &buf);
                }
            }
        }
    }

    /// 错误收尾：观测一次，随后连接必然关闭。
    fn on_error(&self, connection: &TcpConnection, cause: ConnectionError) {
        tracing::warn!(
            id = %beacon_core::Connection::id(connection),
            code = cause.code(),
            error = %cause,
            "closing connection after error"
        );
        (self.callbacks.on_error())(&cause);
        connection.mark_closed();
    }
}

/// 连接 IO 任务主体：批量读、批次边界刷新、关闭与错误收尾。
///
/// 单连接的全部回调都在本任务上串行执行，天然保证到达序与无并发
/// 重入；任务退出即释放套接字。
pub(crate) async fn run_connection(
    mut stream: AnyStream,
    connection: TcpConnection,
    handler: ConnectionHandler,
    recv: AdaptiveRecvBuffer,
    max_messages_per_read: usize,
) {
    let id = beacon_core::Connection::id(&connection);
    match drive(&mut stream, &connection, &handler, recv, max_messages_per_read).await {
        Ok(()) => {
            tracing::debug!(id = %id, "connection finished");
        }
        Err(cause) => handler.on_error(&connection, cause),
    }
    connection.mark_closed();
}

async fn drive(
    stream: &mut AnyStream,
    connection: &TcpConnection,
    handler: &ConnectionHandler,
    mut recv: AdaptiveRecvBuffer,
    max_messages_per_read: usize,
) -> Result<(), ConnectionError> {
    loop {
        if connection.is_closing() {
            // 显式关闭：先尽力刷出已排队的数据
            handler.on_read_complete(connection, stream).await?;
            return Ok(());
        }

        tokio::select! {
            _ = connection.close_requested() => {
                handler.on_read_complete(connection, stream).await?;
                return Ok(());
            }
            ready = stream.readable() => {
                ready.map_err(|err| classify_connection_error(false, err))?;
            }
        }

        // 单轮就绪事件内最多连续读 max_messages_per_read 次，之后
        // 统一刷新，兼顾吞吐与公平
        let mut eof = false;
        let mut delivered = 0;
        while delivered < max_messages_per_read {
            let mut buf = BytesMut::with_capacity(recv.next_capacity());
            match stream.try_read_buf(&mut buf) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(n) => {
                    recv.record(n);
                    delivered += 1;
                    handler.on_data(connection, buf.freeze())?;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(classify_connection_error(false, err)),
            }
        }

        handler.on_read_complete(connection, stream).await?;

        if eof {
            // 对端 EOF：出站已刷出，正常收尾
            return Ok(());
        }
    }
}
