/// 自适应接收缓冲策略的静态参数。
///
/// 默认值 `min = 64`、`initial = 2048`、`max = 64 KiB`，与主流事件驱动
/// 框架的自适应分配器同数量级。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecvBufferConfig {
    min: usize,
    initial: usize,
    max: usize,
}

impl RecvBufferConfig {
    /// 创建新的缓冲参数组合。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：`0 < min <= initial <= max`；违反时 panic，属配置期
    ///   编程错误。
    pub fn new(min: usize, initial: usize, max: usize) -> Self {
        assert!(
            min > 0 && min <= initial && initial <= max,
            "recv buffer requires 0 < min <= initial <= max"
        );
        Self { min, initial, max }
    }

    /// 容量下界（字节）。
    pub fn min(&self) -> usize {
        self.min
    }

    /// 初始容量（字节）。
    pub fn initial(&self) -> usize {
        self.initial
    }

    /// 容量上界（字节）。
    pub fn max(&self) -> usize {
        self.max
    }
}

impl Default for RecvBufferConfig {
    fn default() -> Self {
        Self {
            min: 64,
            initial: 2048,
            max: 64 * 1024,
        }
    }
}

/// 每连接的自适应接收缓冲：按实际读量伸缩下一次的租借容量。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 小流量连接不应常驻大缓冲，大流量连接不应被小缓冲逼出多轮系统
///   调用；按读量反馈伸缩，在两端之间自动寻衡；
/// - 策略保持纯状态机、无分配行为，租借动作由 IO 任务依据
///   [`AdaptiveRecvBuffer::next_capacity`] 自行执行。
///
/// ## 逻辑 (How)
/// - 一次读取填满当前容量 → 下一次容量翻倍（不超过 `max`）；
/// - 连续两次读取不足当前容量一半 → 容量减半（不低于 `min`）；
/// - 介于两者之间的读量维持现状并清零缩容连击计数。
///
/// ## 契约 (What)
/// - **前置条件**：`record` 的 `read` 为单次读取的实际字节数，由所属
///   连接的 IO 任务串行调用；
/// - **后置条件**：`next_capacity` 恒落在 `[min, max]` 区间内。
///
/// ## 注意事项 (Trade-offs)
/// - 缩容要求“连续”两次小读，避免偶发小包造成容量抖动；
/// - 翻倍/减半的粒度换取实现简单，牺牲了按直方图精确逼近的能力。
#[derive(Debug)]
pub struct AdaptiveRecvBuffer {
    config: RecvBufferConfig,
    next: usize,
    small_streak: u8,
}

impl AdaptiveRecvBuffer {
    /// 以给定参数创建，初始容量为 `config.initial()`。
    pub fn new(config: RecvBufferConfig) -> Self {
        Self {
            config,
            next: config.initial(),
            small_streak: 0,
        }
    }

    /// 下一次读取应租借的缓冲容量。
    pub fn next_capacity(&self) -> usize {
        self.next
    }

    /// 反馈一次读取的实际字节数，驱动容量伸缩。
    pub fn record(&mut self, read: usize) {
        if read >= self.next {
            self.next = (self.next.saturating_mul(2)).min(self.config.max());
            self.small_streak = 0;
        } else if read < self.next / 2 {
            self.small_streak += 1;
            if self.small_streak >= 2 {
                self.next = (self.next / 2).max(self.config.min());
                self.small_streak = 0;
            }
        } else {
            self.small_streak = 0;
        }
    }
}
