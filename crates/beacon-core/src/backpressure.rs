use std::fmt;

/// 出站缓冲的高/低水位线。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 以两条阈值描述“何时暂停读、何时恢复读”，把慢消费方场景下的
///   内存增长约束为有界值；
/// - 阈值是配置而非正确性要求：任意满足前置条件的组合都保持流控
///   语义成立。
///
/// ## 契约 (What)
/// - `low`：排水至低于该字节数时恢复读取；
/// - `high`：排队达到该字节数时暂停读取；
/// - **前置条件**：`0 < low <= high`，[`WriteWatermarks::new`] 负责校验。
///
/// ## 注意事项 (Trade-offs)
/// - 阈值过近会造成状态频繁抖动，过远则放大暂停窗口内的延迟；
///   默认值取 32 KiB / 64 KiB，与常见内核发送缓冲同数量级。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteWatermarks {
    low: usize,
    high: usize,
}

impl WriteWatermarks {
    /// 创建新的水位线组合。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：`0 < low <= high`；违反时 panic，属配置期编程错误。
    pub fn new(low: usize, high: usize) -> Self {
        assert!(low > 0 && low <= high, "watermarks require 0 < low <= high");
        Self { low, high }
    }

    /// 低水位线（字节）。
    pub fn low(&self) -> usize {
        self.low
    }

    /// 高水位线（字节）。
    pub fn high(&self) -> usize {
        self.high
    }
}

impl Default for WriteWatermarks {
    fn default() -> Self {
        Self {
            low: 32 * 1024,
            high: 64 * 1024,
        }
    }
}

/// 连接的流控状态：正常读取或已被节流。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    /// 正常接收入站数据。
    Reading,
    /// 出站积压越过高水位，入站读取已暂停。
    Throttled,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::Reading => f.write_str("reading"),
            FlowState::Throttled => f.write_str("throttled"),
        }
    }
}

/// 每连接的背压守卫：跟踪出站积压字节并驱动 {Reading, Throttled} 状态机。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 当写路径尚未排空时扣住后续读取，防止慢消费方导致无界缓冲；
/// - 状态机保持纯逻辑、无 IO，使读暂停/恢复的触发点可以被单元测试
///   完整覆盖。
///
/// ## 逻辑 (How)
/// - `on_queued` 在回调写入排队时累加积压字节，积压达到高水位且当前
///   处于 `Reading` 时切换为 `Throttled`；
/// - `on_drained` 在刷新完成后扣减积压字节，积压降至低水位之下且当前
///   处于 `Throttled` 时切换回 `Reading`；
/// - 两个方法都返回 `Option<FlowState>`，仅在状态发生切换时为 `Some`，
///   便于调用方只在边沿上打日志或唤醒。
///
/// ## 契约 (What)
/// - **前置条件**：方法调用由所属连接的单一 IO 任务串行化，无并发竞态；
/// - **后置条件**：`queued_bytes` 永不下溢（饱和减），状态切换成对出现；
/// - 初始态为 `Reading`；连接关闭时随连接状态一并丢弃，无显式终止态。
///
/// ## 注意事项 (Trade-offs)
/// - 守卫只统计“已排队、未落盘”的字节；内核发送缓冲里的存量不在
///   视野内，阈值选取需把这部分余量考虑在内。
#[derive(Debug)]
pub struct BackpressureGuard {
    watermarks: WriteWatermarks,
    queued: usize,
    state: FlowState,
}

impl BackpressureGuard {
    /// 以给定水位线创建初始处于 `Reading` 态的守卫。
    pub fn new(watermarks: WriteWatermarks) -> Self {
        Self {
            watermarks,
            queued: 0,
            state: FlowState::Reading,
        }
    }

    /// 当前流控状态。
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// 是否处于节流态。
    pub fn is_throttled(&self) -> bool {
        self.state == FlowState::Throttled
    }

    /// 当前排队的出站字节数。
    pub fn queued_bytes(&self) -> usize {
        self.queued
    }

    /// 记录一次出站排队，返回状态切换（若发生）。
    pub fn on_queued(&mut self, bytes: usize) -> Option<FlowState> {
        self.queued = self.queued.saturating_add(bytes);
        if self.state == FlowState::Reading && self.queued >= self.watermarks.high() {
            self.state = FlowState::Throttled;
            return Some(self.state);
        }
        None
    }

    /// 记录一次排水（刷新落盘），返回状态切换（若发生）。
    pub fn on_drained(&mut self, bytes: usize) -> Option<FlowState> {
        self.queued = self.queued.saturating_sub(bytes);
        if self.state == FlowState::Throttled && self.queued < self.watermarks.low() {
            self.state = FlowState::Reading;
            return Some(self.state);
        }
        None
    }
}
