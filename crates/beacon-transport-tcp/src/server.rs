use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use beacon_core::callbacks::ServerCallbacks;
use beacon_core::config::ServerConfig;
use beacon_core::error::ServerError;
use tokio::sync::oneshot;

use crate::bootstrap::ServerBootstrap;
use crate::channel::ListeningChannel;

/// 一次 `listen()` 的最终结果：绑定成功的监听通道，或归类后的
/// 绑定错误。
pub type StartResult = Result<ListeningChannel, ServerError>;

/// `listen()` 返回的启动 Future，恰好解析一次。
///
/// # 教案式注释
///
/// ## 契约 (What)
/// - 成功：套接字已绑定并在接受连接，携带 [`ListeningChannel`]；
/// - 失败：携带绑定失败的根因；
/// - 服务器随后的停止由监听通道自身的完成信号表达，启动 Future
///   与之刻意解耦，**不会**在服务器停止时再次解析。
pub struct StartFuture {
    rx: oneshot::Receiver<StartResult>,
}

impl Future for StartFuture {
    type Output = StartResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                // 引导任务在报告前消亡（运行时关闭等），按资源类失败交付
                Err(ServerError::Reactor {
                    reason: "bootstrap task vanished before reporting".to_owned(),
                })
            })
        })
    }
}

enum ServerState {
    Idle(ServerConfig),
    Starting,
    Bound(ListeningChannel),
}

struct ServerInner {
    callbacks: Arc<ServerCallbacks>,
    state: Mutex<ServerState>,
}

/// 协议无关 TCP 服务端的门面：聚合配置与回调，异步发起引导。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 为调用方提供“构造 → `listen()` → 等待启动结果”的最小操作面，
///   引导工作全部调度到运行时后台任务，调用方线程永不被绑定过程
///   阻塞；
/// - 配置与回调在构造期固化：回调面经 `Arc` 在全部连接间只读共享，
///   不存在运行期可变的全局回调状态。
///
/// ## 逻辑 (How)
/// - `listen()` 取走 `Idle` 态中的配置并 spawn 引导任务，结果经
///   `oneshot` 回送并恰好解析一次；
/// - 成功后门面缓存监听通道（`Bound`），后续 `listen()` 一律以
///   [`ServerError::AlreadyListening`] 拒绝——成功绑定的门面不存在
///   隐式重绑；
/// - 失败后状态回退 `Idle`，调用方可修正环境后重试。
///
/// ## 契约 (What)
/// - 每次 `listen()` 至多对应一次引导尝试；
/// - 门面可克隆，克隆共享同一状态机；
/// - **前置条件**：在 Tokio 运行时内调用 `listen()`。
#[derive(Clone)]
pub struct TcpServer {
    inner: Arc<ServerInner>,
}

impl TcpServer {
    /// 聚合配置与回调面，构造尚未监听的门面。
    pub fn new(config: ServerConfig, callbacks: ServerCallbacks) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                callbacks: Arc::new(callbacks),
                state: Mutex::new(ServerState::Idle(config)),
            }),
        }
    }

    /// 发起引导，返回恰好解析一次的启动 Future。
    pub fn listen(&self) -> StartFuture {
        let (tx, rx) = oneshot::channel();

        let config = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *state, ServerState::Starting) {
                ServerState::Idle(config) => config,
                other => {
                    // 已在引导或已绑定：恢复状态并立即拒绝
                    *state = other;
                    let _ = tx.send(Err(ServerError::AlreadyListening));
                    return StartFuture { rx };
                }
            }
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let retry_config = config.clone();
            let bootstrap = ServerBootstrap::new(config, Arc::clone(&inner.callbacks));
            let result = bootstrap.bind().await;

            {
                let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
                *state = match &result {
                    Ok(channel) => ServerState::Bound(channel.clone()),
                    Err(err) => {
                        tracing::warn!(code = err.code(), error = %err, "bootstrap failed");
                        ServerState::Idle(retry_config)
                    }
                };
            }

            let _ = tx.send(result);
        });

        StartFuture { rx }
    }

    /// 绑定成功后缓存的监听通道。
    pub fn channel(&self) -> Option<ListeningChannel> {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &*state {
            ServerState::Bound(channel) => Some(channel.clone()),
            _ => None,
        }
    }

    /// 是否已经成功绑定。
    pub fn is_listening(&self) -> bool {
        self.channel().is_some()
    }
}
