#![doc = r#"
# beacon-transport-tcp

## 设计动机（Why）
- **定位**：该 crate 提供 beacon 契约在 Tokio 运行时上的最小 TCP
  服务端实现，封装绑定、接受、每连接链路装配与批量读写。
- **架构角色**：消费 `beacon-core` 的配置、回调与流控契约；事件
  驱动的多路复用（epoll/kqueue）、缓冲分配与套接字系统调用全部
  交给 Tokio 与 `socket2`，本 crate 不重造反应器。
- **设计理念**：强调“批次边界”与“错误归类”——入站按就绪事件批量
  读取、出站在批次收尾统一刷新（聚集写）；全部失败路径映射为
  `beacon-core` 的稳定错误域。

## 核心契约（What）
- **引导**：[`ServerBootstrap::bind`] 解析目标（IP/DNS/Unix 域）、
  应用 `SO_REUSEADDR` 与监听积压、接受侧落地 `TCP_NODELAY`，成功
  后返回 [`ListeningChannel`]；
- **门面**：[`TcpServer::listen`] 把引导调度到后台任务，返回恰好
  解析一次的 [`StartFuture`]；服务器停止由监听通道的完成信号单独
  表达；
- **流控**：出站积压越过高水位即暂停入站读取，排水至低水位之下
  恢复；内核接收缓冲在暂停期间兜住未读字节，数据不丢失；
- **连接**：[`TcpConnection`] 句柄与套接字资源分离，回调在所属
  IO 任务上串行执行，单连接内保持到达序。

## 风险与考量（Trade-offs）
- **单任务连接模型**：每连接一个任务换取无锁的回调串行化；回调内
  禁止阻塞 IO，否则会饿死该任务上的后续批次；
- **关闭语义**：监听通道关闭只停止接受新连接，既有连接独立存续；
  全部通道句柄被丢弃时接受循环同样退出，避免无主监听器。
"#]

mod bootstrap;
mod channel;
mod pipeline;
mod server;
mod util;

pub use bootstrap::ServerBootstrap;
pub use channel::{ListeningChannel, TcpConnection};
pub use server::{StartFuture, StartResult, TcpServer};
