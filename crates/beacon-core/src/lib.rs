#![doc = r#"
# beacon-core

## 设计动机（Why）
- **定位**：该 crate 承载最小异步 TCP 服务端的运行时无关契约：监听
  配置、回调面、错误域与每连接的流控/缓冲状态机。
- **架构角色**：作为契约层被具体传输实现（`beacon-transport-tcp`）
  消费；核心不触碰套接字，也不绑定任何异步运行时。
- **设计理念**：强调“构造期固化、运行期只读”——配置与回调在引导前
  聚合为不可变快照，之后经 `Arc` 在全部连接间共享。

## 核心契约（What）
- **配置**：[`ServerConfig`] / [`BindTarget`]（IP 与 Unix 域互斥）、
  监听积压、套接字选项、批量读上限、自适应接收缓冲与出站水位线；
- **回调面**：[`ServerCallbacks`]，`on_read` 必选、`on_write` 信息性、
  `on_error` 缺省为记日志并继续；
- **错误域**：[`ServerError`]（绑定期，经启动 Future 交付）与
  [`ConnectionError`]（单连接范围，经 `on_error` 观测），均附带稳定
  错误码；
- **流控**：[`BackpressureGuard`] 的 {Reading, Throttled} 状态机与
  [`AdaptiveRecvBuffer`] 的容量伸缩策略，纯逻辑、可单元测试。

## 风险与考量（Trade-offs）
- 契约层以 `&dyn Connection` 暴露连接句柄，牺牲单态化换取对象层
  共享与运行时无关；
- 水位线与缓冲参数是配置而非正确性要求，默认值按常见内核缓冲
  数量级选取。
"#]

pub mod backpressure;
pub mod callbacks;
pub mod config;
pub mod connection;
pub mod error;
pub mod recv_buffer;

pub use backpressure::{BackpressureGuard, FlowState, WriteWatermarks};
pub use callbacks::{OnError, OnRead, OnWrite, ServerCallbacks};
pub use config::{BindTarget, EndpointAddr, ServerConfig};
pub use connection::{Connection, ConnectionId};
pub use error::{
    ConnectionError, ServerError, classify_bind_error, classify_connection_error,
};
pub use recv_buffer::{AdaptiveRecvBuffer, RecvBufferConfig};
