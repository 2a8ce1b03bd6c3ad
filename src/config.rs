//! 定义了定时器调度的可配置参数。
//! Defines configurable parameters for timer scheduling.

use std::time::Duration;

/// The default upper bound for a single uninterrupted sleep.
///
/// Some platforms reject or misbehave on very long single waits; 3 456 000
/// seconds (40 days) is the clamp historically applied by asyncio-based
/// event loops, kept here as a safe cross-platform ceiling.
///
/// 单次不间断睡眠的默认上限。某些平台会拒绝非常长的单次等待或在其上行为异常；
/// 3 456 000 秒（40天）是基于asyncio的事件循环历史上采用的钳制值，
/// 在此保留作为安全的跨平台上限。
pub const DEFAULT_MAX_SLEEP_CHUNK: Duration = Duration::from_secs(3_456_000);

/// A structure containing all configurable parameters for the scheduler.
///
/// 包含调度器所有可配置参数的结构体。
#[derive(Debug, Clone)]
pub struct TimerConfig {
    /// The maximum length of a single sleep chunk. Requested waits longer
    /// than this are decomposed into a sequence of chunks that sum to the
    /// requested duration exactly. Must be non-zero.
    ///
    /// 单个睡眠分片的最大长度。超过该值的等待请求会被分解为
    /// 总和恰好等于请求时长的分片序列。必须为非零值。
    pub max_sleep_chunk: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            max_sleep_chunk: DEFAULT_MAX_SLEEP_CHUNK,
        }
    }
}
