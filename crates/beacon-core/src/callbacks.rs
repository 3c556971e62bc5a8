use std::sync::Arc;

use bytes::Bytes;

use crate::connection::Connection;
use crate::error::ConnectionError;

/// 入站数据回调：消费方处理一段原始字节，返回 `Err` 表示协议层判定
/// 失败（如解码错误），连接将被关闭。
pub type OnRead =
    Arc<dyn Fn(&dyn Connection, Bytes) -> Result<(), ConnectionError> + Send + Sync>;

/// 出站观测回调：每段出站字节刷新落盘后通知一次，纯信息性。
pub type OnWrite = Arc<dyn Fn(&dyn Connection, &Bytes) + Send + Sync>;

/// 连接错误回调：连接级故障的唯一观测点。
pub type OnError = Arc<dyn Fn(&ConnectionError) + Send + Sync>;

/// 服务端回调面：构造后不可变，经 `Arc` 在全部连接间只读共享。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 取代“门面对象上的可变回调字段”：回调在构造期一次性聚合为不可
///   变结构，随引导移交并以引用共享，既无全局单例，也杜绝运行期
///   改写竞态；
/// - `on_error` 未设置时落在“记日志并继续”的默认策略上，保证连接级
///   故障永远有观测出口。
///
/// ## 契约 (What)
/// - `on_read` 必选：每段入站字节在所属连接的任务上按到达序调用；
/// - `on_write` 可选：纯信息性，落盘后通知；
/// - `on_error` 可选：缺省为 `tracing::error!` 诊断策略；
/// - **前置条件**：回调不得执行阻塞 IO，否则会饿死共享该任务的
///   连接处理；
/// - **后置条件**：结构体构造后字段不再变更，跨连接只读共享。
///
/// ## 注意事项 (Trade-offs)
/// - 回调签名使用 `&dyn Connection` 保持对象层共享，牺牲单态化换取
///   核心 crate 的运行时无关性。
pub struct ServerCallbacks {
    on_read: OnRead,
    on_write: Option<OnWrite>,
    on_error: OnError,
}

impl ServerCallbacks {
    /// 以必选的 `on_read` 回调构造，其余回调落在默认策略上。
    pub fn new(
        on_read: impl Fn(&dyn Connection, Bytes) -> Result<(), ConnectionError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            on_read: Arc::new(on_read),
            on_write: None,
            on_error: Arc::new(default_on_error),
        }
    }

    /// 挂载出站观测回调。
    pub fn with_on_write(
        mut self,
        on_write: impl Fn(&dyn Connection, &Bytes) + Send + Sync + 'static,
    ) -> Self {
        self.on_write = Some(Arc::new(on_write));
        self
    }

    /// 替换连接错误回调。
    pub fn with_on_error(
        mut self,
        on_error: impl Fn(&ConnectionError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Arc::new(on_error);
        self
    }

    /// 入站数据回调。
    pub fn on_read(&self) -> &OnRead {
        &self.on_read
    }

    /// 出站观测回调（若挂载）。
    pub fn on_write(&self) -> Option<&OnWrite> {
        self.on_write.as_ref()
    }

    /// 连接错误回调。
    pub fn on_error(&self) -> &OnError {
        &self.on_error
    }
}

/// 默认错误策略：结构化日志记录后继续运行，不中断进程。
fn default_on_error(error: &ConnectionError) {
    tracing::error!(
        code = error.code(),
        error = %error,
        "connection error reached the default handler"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 自定义 `on_error` 必须取代默认策略并收到原始错误。
    #[test]
    fn custom_on_error_replaces_default_policy() {
        static SEEN: AtomicUsize = AtomicUsize::new(0);
        let callbacks = ServerCallbacks::new(|_, _| Ok(()))
            .with_on_error(|err| {
                assert_eq!(err.code(), "beacon.tcp.conn.decode_rejected");
                SEEN.fetch_add(1, Ordering::SeqCst);
            });

        (callbacks.on_error())(&ConnectionError::decode("bad frame"));
        assert_eq!(SEEN.load(Ordering::SeqCst), 1, "回调应恰好触发一次");
    }

    /// 未挂载 `on_write` 时读取为 `None`，挂载后可见。
    #[test]
    fn on_write_is_optional() {
        let callbacks = ServerCallbacks::new(|_, _| Ok(()));
        assert!(callbacks.on_write().is_none());

        let callbacks = callbacks.with_on_write(|_, _| {});
        assert!(callbacks.on_write().is_some());
    }
}
