//! 监听配置与地址模型：绑定目标、结构化端点地址与服务端配置快照。

use std::fmt;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;

use crate::backpressure::WriteWatermarks;
use crate::recv_buffer::RecvBufferConfig;

/// 监听绑定目标：IP 主机/端口，或 Unix 域套接字路径。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 两种绑定模式互斥，以枚举在类型层面固化该约束，杜绝“同时给出
///   host/port 与路径”的非法组合；
/// - 主机名在绑定阶段才解析，允许配置层保持纯数据。
///
/// ## 契约 (What)
/// - `Ip`：`host` 为主机名或 IP 字面量，空串表示绑定全部网卡；`port`
///   取值 `0..=65535`，0 表示由内核挑选临时端口；
/// - `Unix`：`path` 为套接字文件路径，仅在 Unix 平台可用。
///
/// ## 注意事项 (Trade-offs)
/// - 主机名解析失败属于绑定期错误（`Resolve`），不在构造期校验，
///   以免配置构造变成异步操作。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindTarget {
    /// IP 绑定模式。
    Ip { host: String, port: u16 },
    /// Unix 域套接字绑定模式。
    #[cfg(unix)]
    Unix { path: PathBuf },
}

impl BindTarget {
    /// 构造 IP 绑定目标。
    pub fn ip(host: impl Into<String>, port: u16) -> Self {
        BindTarget::Ip {
            host: host.into(),
            port,
        }
    }

    /// 构造 Unix 域套接字绑定目标。
    #[cfg(unix)]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        BindTarget::Unix { path: path.into() }
    }
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindTarget::Ip { host, port } if host.is_empty() => write!(f, "*:{port}"),
            BindTarget::Ip { host, port } => write!(f, "{host}:{port}"),
            #[cfg(unix)]
            BindTarget::Unix { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

/// 结构化端点地址，覆盖 IP 与 Unix 两个地址族。
///
/// 绑定成功后经由监听通道回显（临时端口场景可据此取得内核分配的
/// 具体端口）；每条连接的本地/对端地址同样以该类型暴露。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointAddr {
    /// IP 地址族。
    Ip(SocketAddr),
    /// Unix 域地址族；客户端一侧常为匿名地址（`None`）。
    #[cfg(unix)]
    Unix(Option<PathBuf>),
}

impl EndpointAddr {
    /// 以 IP 套接字地址视图读取，非 IP 地址族返回 `None`。
    pub fn as_ip(&self) -> Option<SocketAddr> {
        match self {
            EndpointAddr::Ip(addr) => Some(*addr),
            #[cfg(unix)]
            EndpointAddr::Unix(_) => None,
        }
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointAddr::Ip(addr) => addr.fmt(f),
            #[cfg(unix)]
            EndpointAddr::Unix(Some(path)) => write!(f, "unix:{}", path.display()),
            #[cfg(unix)]
            EndpointAddr::Unix(None) => f.write_str("unix:(anonymous)"),
        }
    }
}

impl From<SocketAddr> for EndpointAddr {
    fn from(addr: SocketAddr) -> Self {
        EndpointAddr::Ip(addr)
    }
}

/// 服务端监听配置，引导开始后即不可变。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 把监听积压、套接字选项、批量读上限与流控阈值集中为一份快照，
///   在引导阶段整体移交，避免运行期出现半更新的配置视图；
/// - 构造采用 `with_*` 链式风格，未显式指定的字段落在与内核及生态
///   惯例一致的默认值上。
///
/// ## 契约 (What)
/// - `backlog` 默认 256；`reuse_address`、`no_delay` 默认开启；
/// - `max_messages_per_read` 默认 16，限制单次就绪事件内的连续读次数，
///   保证批量刷新与公平调度；
/// - `recv_buffer` 为自适应接收缓冲策略，`write_watermarks` 为出站
///   高/低水位线；
/// - **后置条件**：配置移交引导后不再被任何组件修改。
#[derive(Clone, Debug)]
pub struct ServerConfig {
    bind: BindTarget,
    backlog: u32,
    reuse_address: bool,
    no_delay: bool,
    max_messages_per_read: usize,
    recv_buffer: RecvBufferConfig,
    write_watermarks: WriteWatermarks,
}

impl ServerConfig {
    /// 以默认选项构造指向给定绑定目标的配置。
    pub fn new(bind: BindTarget) -> Self {
        Self {
            bind,
            backlog: 256,
            reuse_address: true,
            no_delay: true,
            max_messages_per_read: 16,
            recv_buffer: RecvBufferConfig::default(),
            write_watermarks: WriteWatermarks::default(),
        }
    }

    /// 设置监听积压长度。
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// 设置是否在监听套接字上启用 `SO_REUSEADDR`。
    pub fn with_reuse_address(mut self, enabled: bool) -> Self {
        self.reuse_address = enabled;
        self
    }

    /// 设置是否在被接受的套接字上启用 `TCP_NODELAY`。
    pub fn with_no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }

    /// 设置单次就绪事件内允许的最大连续读次数。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：`limit` 必须大于 0，否则连接将永远读不到数据；
    ///   传入 0 时按 1 处理。
    pub fn with_max_messages_per_read(mut self, limit: usize) -> Self {
        self.max_messages_per_read = limit.max(1);
        self
    }

    /// 替换自适应接收缓冲策略。
    pub fn with_recv_buffer(mut self, config: RecvBufferConfig) -> Self {
        self.recv_buffer = config;
        self
    }

    /// 替换出站高/低水位线。
    pub fn with_write_watermarks(mut self, watermarks: WriteWatermarks) -> Self {
        self.write_watermarks = watermarks;
        self
    }

    /// 绑定目标。
    pub fn bind(&self) -> &BindTarget {
        &self.bind
    }

    /// 监听积压长度。
    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    /// 是否启用 `SO_REUSEADDR`。
    pub fn reuse_address(&self) -> bool {
        self.reuse_address
    }

    /// 是否在被接受的套接字上启用 `TCP_NODELAY`。
    pub fn no_delay(&self) -> bool {
        self.no_delay
    }

    /// 单次就绪事件内的最大连续读次数。
    pub fn max_messages_per_read(&self) -> usize {
        self.max_messages_per_read
    }

    /// 自适应接收缓冲策略。
    pub fn recv_buffer(&self) -> RecvBufferConfig {
        self.recv_buffer
    }

    /// 出站高/低水位线。
    pub fn write_watermarks(&self) -> WriteWatermarks {
        self.write_watermarks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 默认值必须与监听契约一致：backlog 256、REUSEADDR/NODELAY 开启、
    /// 单轮最多 16 次读。
    #[test]
    fn defaults_follow_the_listener_contract() {
        let config = ServerConfig::new(BindTarget::ip("127.0.0.1", 0));
        assert_eq!(config.backlog(), 256);
        assert!(config.reuse_address());
        assert!(config.no_delay());
        assert_eq!(config.max_messages_per_read(), 16);
    }

    /// `with_max_messages_per_read(0)` 会被钳制到 1，避免配置出读饥饿。
    #[test]
    fn zero_read_budget_is_clamped() {
        let config =
            ServerConfig::new(BindTarget::ip("", 0)).with_max_messages_per_read(0);
        assert_eq!(config.max_messages_per_read(), 1);
    }

    /// 绑定目标的显示文本：空主机名渲染为通配符，Unix 路径带前缀。
    #[test]
    fn bind_target_display_is_stable() {
        assert_eq!(BindTarget::ip("", 8080).to_string(), "*:8080");
        assert_eq!(
            BindTarget::ip("example.com", 443).to_string(),
            "example.com:443"
        );
        #[cfg(unix)]
        assert_eq!(
            BindTarget::unix("/tmp/beacon.sock").to_string(),
            "unix:/tmp/beacon.sock"
        );
    }
}
