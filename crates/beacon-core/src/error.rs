//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义服务端对外暴露的两类错误域：绑定期的 [`ServerError`] 与
//!   单连接范围的 [`ConnectionError`]，确保传播边界清晰；
//! - 每个变体携带稳定错误码（`beacon.tcp.<域>.<语义>`），方便日志、
//!   指标与告警系统做精确分类。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error` 以兼容 `std::error::Error`；
//! - 绑定错误只经由 `listen()` 的启动 Future 返回，永不自动重试；
//! - 连接错误只经由注册的 `on_error` 回调观测，绝不波及监听器或
//!   同级连接。
//!
//! ## 扩展建议（How）
//! - 新增变体时同步更新 [`ServerError::code`] / [`ConnectionError::code`]
//!   的码表，保持 `<域>.<语义>` 命名规范；
//! - IO 层的 `io::ErrorKind` → 变体归类集中在 [`classify_bind_error`]
//!   与 [`classify_connection_error`]，传输实现不应自行散落判断。

use std::io;

use thiserror::Error;

/// 绑定尝试范围内的致命错误，对应一次 `listen()` 调用的失败路径。
///
/// # 教案式说明
/// - **意图 (Why)**：将“地址被占用 / 权限不足 / 地址非法 / 解析失败 /
///   运行时资源耗尽”等启动期故障合流为统一错误域，经启动 Future 一次性
///   交付调用方；
/// - **契约 (What)**：
///   - 所有变体 `Send + Sync + 'static`，可安全跨任务传播；
///   - 变体携带失败的绑定目标文本与底层 `io::Error`（若存在），
///     `source()` 暴露完整根因链路；
///   - 该错误域永不触发自动重试，是否重新 `listen()` 由调用方决定。
/// - **风险 (Trade-offs)**：使用 `String` 保存目标地址文本，牺牲少量堆
///   分配换取排障信息的完整性。
#[derive(Debug, Error)]
pub enum ServerError {
    /// 目标地址已被其他监听器占用。
    #[error("address `{addr}` is already in use")]
    AddrInUse {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 绑定该地址需要更高权限（如特权端口）。
    #[error("binding `{addr}` was denied by the operating system")]
    PermissionDenied {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 地址或端口不合法，内核拒绝绑定。
    #[error("`{addr}` is not a bindable address")]
    InvalidAddress {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 主机名解析失败，或解析结果为空。
    #[error("hostname `{host}` did not resolve to a usable address")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// 同一门面上的重复 `listen()` 调用。
    ///
    /// - **契约 (What)**：门面保证每次成功绑定对应唯一监听通道，不存在
    ///   隐式重绑；后续调用一律以本变体拒绝。
    #[error("server is already listening")]
    AlreadyListening,

    /// 引导期间运行时资源耗尽（文件描述符、内存等）。
    ///
    /// 归入绑定错误域处理：经启动 Future 交付，不自动重试。
    #[error("runtime resources exhausted during bootstrap: {reason}")]
    Reactor { reason: String },

    /// 其余未归类的启动期 IO 故障。
    #[error("{op} failed during bootstrap")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    /// 返回稳定错误码，遵循 `<域>.<语义>` 命名规范。
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::AddrInUse { .. } => "beacon.tcp.bind.addr_in_use",
            ServerError::PermissionDenied { .. } => "beacon.tcp.bind.permission_denied",
            ServerError::InvalidAddress { .. } => "beacon.tcp.bind.invalid_address",
            ServerError::Resolve { .. } => "beacon.tcp.bind.resolve_failed",
            ServerError::AlreadyListening => "beacon.tcp.bind.already_listening",
            ServerError::Reactor { .. } => "beacon.tcp.bind.reactor_exhausted",
            ServerError::Io { .. } => "beacon.tcp.bind.io_failed",
        }
    }
}

/// 单连接范围的错误，经 `on_error` 回调观测后连接被无条件关闭。
///
/// # 教案式说明
/// - **意图 (Why)**：把对端重置、读写故障与消费方主动抛出的解码失败
///   收敛为同一错误域，保证“连接错误不静默吞掉、也不悬挂连接”；
/// - **契约 (What)**：
///   - 错误只影响所属连接，监听器与同级连接不受波及；
///   - [`ConnectionError::Decode`] 预留给消费方的 `on_read` 回调，用于
///     表达协议层解码失败等业务判定；
///   - 变体均可跨线程传播（`Send + Sync + 'static`）。
/// - **风险 (Trade-offs)**：`Decode` 以 `String` 承载原因文本，避免泛型
///   渗透回调签名；若未来需要结构化上下文，可追加字段而不破坏码表。
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// 对端重置或中断了连接。
    #[error("peer reset the connection")]
    Reset {
        #[source]
        source: io::Error,
    },

    /// 入站读取失败。
    #[error("connection read failed")]
    Read {
        #[source]
        source: io::Error,
    },

    /// 出站刷新失败。
    #[error("connection write failed")]
    Write {
        #[source]
        source: io::Error,
    },

    /// 消费方回调拒绝了入站数据（典型为协议解码失败）。
    #[error("inbound data rejected by consumer: {reason}")]
    Decode { reason: String },

    /// 对已关闭的连接执行写入。
    #[error("connection is closed")]
    Closed,
}

impl ConnectionError {
    /// 构造一条消费方解码失败错误。
    pub fn decode(reason: impl Into<String>) -> Self {
        ConnectionError::Decode {
            reason: reason.into(),
        }
    }

    /// 返回稳定错误码，遵循 `<域>.<语义>` 命名规范。
    pub fn code(&self) -> &'static str {
        match self {
            ConnectionError::Reset { .. } => "beacon.tcp.conn.reset",
            ConnectionError::Read { .. } => "beacon.tcp.conn.read_failed",
            ConnectionError::Write { .. } => "beacon.tcp.conn.write_failed",
            ConnectionError::Decode { .. } => "beacon.tcp.conn.decode_rejected",
            ConnectionError::Closed => "beacon.tcp.conn.closed",
        }
    }
}

/// 将绑定路径上的 IO 错误归类为 [`ServerError`] 变体。
///
/// # 契约说明（What）
/// - `op`：失败的操作名（`"bind"`、`"listen"` 等），进入 `Io` 变体的文案；
/// - `addr`：人类可读的绑定目标文本；
/// - 归类规则：`AddrInUse` / `PermissionDenied` / `AddrNotAvailable` 与
///   `InvalidInput` / `OutOfMemory` 分别映射到专属变体，其余保留原始
///   `io::Error` 作为根因。
pub fn classify_bind_error(op: &'static str, addr: &str, source: io::Error) -> ServerError {
    use io::ErrorKind;
    match source.kind() {
        ErrorKind::AddrInUse => ServerError::AddrInUse {
            addr: addr.to_owned(),
            source,
        },
        ErrorKind::PermissionDenied => ServerError::PermissionDenied {
            addr: addr.to_owned(),
            source,
        },
        ErrorKind::AddrNotAvailable | ErrorKind::InvalidInput => ServerError::InvalidAddress {
            addr: addr.to_owned(),
            source,
        },
        ErrorKind::OutOfMemory => ServerError::Reactor {
            reason: source.to_string(),
        },
        _ => ServerError::Io { op, source },
    }
}

/// 将连接路径上的 IO 错误归类为 [`ConnectionError`] 变体。
///
/// `write` 为真表示错误发生在出站刷新路径，否则视为入站读取路径；
/// 对端断开类错误（重置、中止、管道破裂）统一归入 `Reset`。
pub fn classify_connection_error(write: bool, source: io::Error) -> ConnectionError {
    use io::ErrorKind;
    match source.kind() {
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            ConnectionError::Reset { source }
        }
        _ if write => ConnectionError::Write { source },
        _ => ConnectionError::Read { source },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 验证绑定错误归类与码表的稳定性。
    ///
    /// # 测试目标（Why）
    /// - 保证 `io::ErrorKind` 到变体的映射不随重构漂移；
    /// - 码表是外部告警系统的契约，一旦变更必须显式回归。
    #[test]
    fn bind_error_classification_matches_code_table() {
        let err = classify_bind_error(
            "bind",
            "127.0.0.1:80",
            io::Error::new(io::ErrorKind::AddrInUse, "occupied"),
        );
        assert!(matches!(err, ServerError::AddrInUse { .. }), "AddrInUse 必须映射到专属变体");
        assert_eq!(err.code(), "beacon.tcp.bind.addr_in_use");

        let err = classify_bind_error(
            "bind",
            "127.0.0.1:80",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.code(), "beacon.tcp.bind.permission_denied");

        let err = classify_bind_error(
            "listen",
            "256.0.0.1:0",
            io::Error::new(io::ErrorKind::InvalidInput, "bad addr"),
        );
        assert_eq!(err.code(), "beacon.tcp.bind.invalid_address");

        let err = classify_bind_error(
            "listen",
            "127.0.0.1:0",
            io::Error::other("unexpected"),
        );
        assert_eq!(err.code(), "beacon.tcp.bind.io_failed");
    }

    /// 验证连接错误归类：对端断开类统一为 `Reset`，其余按读写路径拆分。
    #[test]
    fn connection_error_classification_splits_reset_from_io() {
        let err = classify_connection_error(
            false,
            io::Error::new(io::ErrorKind::ConnectionReset, "rst"),
        );
        assert!(matches!(err, ConnectionError::Reset { .. }), "读路径上的重置应归入 Reset");

        let err = classify_connection_error(
            true,
            io::Error::new(io::ErrorKind::BrokenPipe, "epipe"),
        );
        assert!(matches!(err, ConnectionError::Reset { .. }), "写路径上的管道破裂同样视为对端断开");

        let err = classify_connection_error(true, io::Error::other("boom"));
        assert_eq!(err.code(), "beacon.tcp.conn.write_failed");

        let err = classify_connection_error(false, io::Error::other("boom"));
        assert_eq!(err.code(), "beacon.tcp.conn.read_failed");
    }

    /// `Decode` 变体保留消费方给出的原因文本，便于排障。
    #[test]
    fn decode_error_keeps_consumer_reason() {
        let err = ConnectionError::decode("frame length exceeds limit");
        assert_eq!(err.code(), "beacon.tcp.conn.decode_rejected");
        assert!(err.to_string().contains("frame length exceeds limit"));
    }
}
