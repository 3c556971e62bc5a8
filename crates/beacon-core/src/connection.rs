use std::fmt;

use bytes::Bytes;

use crate::config::EndpointAddr;
use crate::error::ConnectionError;

/// 连接标识：监听器内单调递增，生命周期内唯一，关闭后不复用。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// 以原始序号构造标识。
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 读取原始序号。
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// 单条入站连接的对象层契约，回调以 `&dyn Connection` 视角操作连接。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 回调面只依赖本契约而非具体传输类型，使核心 crate 保持运行时
///   无关，传输实现（TCP/Unix）在各自 crate 内提供具体类型；
/// - 连接句柄与套接字资源分离：句柄承载状态与出站队列，IO 任务独占
///   流本身，避免生命周期互相纠缠。
///
/// ## 契约 (What)
/// - `write`：把字节追加到出站队列，实际落盘由所属 IO 任务在读批次
///   边界统一刷新（聚集写）；对已关闭连接返回
///   [`ConnectionError::Closed`]；
/// - `close`：请求关闭连接，幂等；已排队的出站数据会在关闭前尽力
///   刷出（错误路径除外）；
/// - `local_addr` / `peer_addr`：结构化地址元数据；
/// - **前置条件**：实现必须 `Send + Sync`，句柄可被消费方克隆持有；
/// - **后置条件**：`write` 成功仅代表入队成功，不代表对端已接收。
///
/// ## 注意事项 (Trade-offs)
/// - 入队写配合批次刷新以摊薄系统调用成本；需要立即落盘的场景应在
///   协议层自行设计批次边界，而非绕过队列。
pub trait Connection: Send + Sync {
    /// 连接标识。
    fn id(&self) -> ConnectionId;

    /// 本端地址。
    fn local_addr(&self) -> &EndpointAddr;

    /// 对端地址。
    fn peer_addr(&self) -> &EndpointAddr;

    /// 将出站字节追加到连接的出站队列。
    fn write(&self, data: Bytes) -> Result<(), ConnectionError>;

    /// 请求关闭连接（幂等）。
    fn close(&self);
}
