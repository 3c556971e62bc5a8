use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use beacon_core::backpressure::BackpressureGuard;
use beacon_core::config::EndpointAddr;
use beacon_core::connection::{Connection, ConnectionId};
use beacon_core::error::ConnectionError;
use bytes::Bytes;
use tokio::sync::{Notify, watch};

/// 已绑定监听套接字的句柄：查询地址、发起关闭、等待停止信号。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把“监听中的服务器”物化为可克隆的轻量句柄：地址回显服务于
///   临时端口场景，停止信号让关闭在任意任务中可等待、可测试；
/// - 旧式“在关闭 Future 上永久阻塞”的写法被替换为 `watch` 承载的
///   长生命周期完成信号，与启动 Future 彻底解耦。
///
/// ## 逻辑 (How)
/// - `close` 经 `watch` 通知接受循环退出，幂等；
/// - `closed` 等待接受循环落笔的完成标记；循环因任何原因退出（显式
///   关闭、句柄全部消失、任务消亡）都会使该信号触发；
/// - 句柄克隆共享同一底层监听器，任意克隆皆可关闭。
///
/// ## 契约 (What)
/// - **后置条件**：`close` 只停止接受新连接；既有连接继续运行直至
///   各自独立关闭；
/// - 一旦绑定成功，监听器保持绑定直至显式关闭或全部句柄被丢弃，
///   不存在隐式重绑。
///
/// ## 注意事项 (Trade-offs)
/// - 全部句柄（含门面缓存的那份）被丢弃时，接受循环视同收到关闭
///   请求并退出，避免产生无主的常驻监听器。
#[derive(Clone, Debug)]
pub struct ListeningChannel {
    local_addr: EndpointAddr,
    close_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl ListeningChannel {
    pub(crate) fn new(
        local_addr: EndpointAddr,
        close_tx: watch::Sender<bool>,
        closed_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            local_addr,
            close_tx,
            closed_rx,
        }
    }

    /// 监听套接字的本地地址（临时端口场景回显内核分配的端口）。
    pub fn local_addr(&self) -> &EndpointAddr {
        &self.local_addr
    }

    /// 请求停止接受新连接（幂等）。
    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }

    /// 监听器是否已经停止。
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// 等待监听器停止（任何原因）。
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            // 发送端消失等价于循环已退出
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// 出站队列与背压守卫：二者共用一把锁，保证“排队/排水”计数与状态
/// 切换的原子观测。
#[derive(Debug)]
struct FlowControl {
    queue: VecDeque<Bytes>,
    guard: BackpressureGuard,
}

#[derive(Debug)]
struct ConnectionShared {
    id: ConnectionId,
    local_addr: EndpointAddr,
    peer_addr: EndpointAddr,
    flow: Mutex<FlowControl>,
    closing: AtomicBool,
    close_signal: Notify,
}

/// 单条已接受连接的句柄，实现契约层的 [`Connection`]。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 连接状态（标识、地址、出站队列、背压守卫）与套接字资源分离：
///   句柄可被消费方克隆持有，流本身始终由所属 IO 任务独占，避免
///   句柄生命周期拖住套接字；
/// - 写入只做入队，落盘统一发生在读批次边界，由同一 IO 任务串行
///   执行（聚集写）。
///
/// ## 契约 (What)
/// - `write`：关闭后返回 [`ConnectionError::Closed`]；入队时驱动背压
///   守卫，越过高水位即进入节流态；
/// - `close`：幂等；IO 任务在下一个批次边界尽力刷出已排队数据后
///   关闭套接字；
/// - 回调始终运行在该连接的 IO 任务上，单连接内保持全序。
#[derive(Clone, Debug)]
pub struct TcpConnection {
    shared: Arc<ConnectionShared>,
}

impl TcpConnection {
    pub(crate) fn new(
        id: ConnectionId,
        local_addr: EndpointAddr,
        peer_addr: EndpointAddr,
        guard: BackpressureGuard,
    ) -> Self {
        Self {
            shared: Arc::new(ConnectionShared {
                id,
                local_addr,
                peer_addr,
                flow: Mutex::new(FlowControl {
                    queue: VecDeque::new(),
                    guard,
                }),
                closing: AtomicBool::new(false),
                close_signal: Notify::new(),
            }),
        }
    }

    /// 是否已请求关闭。
    pub(crate) fn is_closing(&self) -> bool {
        self.shared.closing.load(Ordering::Acquire)
    }

    /// 等待关闭请求；`close` 在无等待者时也会留存一枚许可，保证
    /// 信号不丢失。
    pub(crate) async fn close_requested(&self) {
        self.shared.close_signal.notified().await;
    }

    /// 取走当前全部排队的出站数据（保持入队顺序）。
    pub(crate) fn drain_queue(&self) -> VecDeque<Bytes> {
        let mut flow = self
            .shared
            .flow
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut flow.queue)
    }

    /// 记录一段出站字节已经落盘，驱动守卫的恢复边沿。
    pub(crate) fn mark_drained(&self, bytes: usize) {
        let mut flow = self
            .shared
            .flow
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = flow.guard.on_drained(bytes) {
            tracing::debug!(
                id = %self.shared.id,
                state = %state,
                "outbound drained below the low watermark"
            );
        }
    }

    /// 当前是否处于节流态（出站积压越过高水位且尚未排空）。
    pub(crate) fn is_throttled(&self) -> bool {
        self.shared
            .flow
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .guard
            .is_throttled()
    }

    /// 标记连接进入关闭流程；IO 任务收尾时调用，确保其后的 `write`
    /// 一律返回 `Closed`。
    pub(crate) fn mark_closed(&self) {
        self.shared.closing.store(true, Ordering::Release);
    }
}

impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.shared.id
    }

    fn local_addr(&self) -> &EndpointAddr {
        &self.shared.local_addr
    }

    fn peer_addr(&self) -> &EndpointAddr {
        &self.shared.peer_addr
    }

    fn write(&self, data: Bytes) -> Result<(), ConnectionError> {
        if self.is_closing() {
            return Err(ConnectionError::Closed);
        }
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len();
        let mut flow = self
            .shared
            .flow
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        flow.queue.push_back(data);
        if let Some(state) = flow.guard.on_queued(len) {
            tracing::debug!(
                id = %self.shared.id,
                state = %state,
                queued = flow.guard.queued_bytes(),
                "outbound queue crossed the high watermark"
            );
        }
        Ok(())
    }

    fn close(&self) {
        if !self.shared.closing.swap(true, Ordering::AcqRel) {
            self.shared.close_signal.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::backpressure::WriteWatermarks;
    use std::net::{Ipv4Addr, SocketAddr};

    fn connection() -> TcpConnection {
        let addr: SocketAddr = (Ipv4Addr::LOCALHOST, 0).into();
        TcpConnection::new(
            ConnectionId::new(1),
            addr.into(),
            addr.into(),
            BackpressureGuard::new(WriteWatermarks::new(4, 8)),
        )
    }

    /// 写入按入队顺序排队，排空后队列清零。
    #[test]
    fn writes_queue_in_order() {
        let conn = connection();
        conn.write(Bytes::from_static(b"one")).expect("queue one");
        conn.write(Bytes::from_static(b"two")).expect("queue two");

        let drained: Vec<Bytes> = conn.drain_queue().into();
        assert_eq!(drained, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        assert!(conn.drain_queue().is_empty(), "二次取走应为空");
    }

    /// 越过高水位进入节流态，排水后恢复。
    #[test]
    fn queueing_past_high_watermark_throttles() {
        let conn = connection();
        conn.write(Bytes::from_static(b"0123456789")).expect("queue");
        assert!(conn.is_throttled(), "10 字节越过高水位 8 必须节流");

        let _ = conn.drain_queue();
        conn.mark_drained(10);
        assert!(!conn.is_throttled(), "全量排空后必须恢复读取");
    }

    /// 关闭后的写入返回 `Closed`，关闭本身幂等。
    #[test]
    fn write_after_close_is_rejected() {
        let conn = connection();
        conn.close();
        conn.close();
        match conn.write(Bytes::from_static(b"late")) {
            Err(ConnectionError::Closed) => {}
            other => panic!("expected Closed, got {other:?}"),
        }
    }
}
