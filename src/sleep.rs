//! 分片睡眠
//! Chunked sleeping
//!
//! 把任意非负时长分解为有界分片的序列：除最后一个分片外，每个分片都
//! 等于允许的最大值，且所有分片之和恰好等于请求的时长。等待在每个
//! 分片边界处以及分片内部都可以通过整任务取消来中止。
//!
//! Decomposes an arbitrary non-negative duration into a sequence of bounded
//! chunks: every chunk except possibly the last equals the allowed maximum,
//! and the chunks sum to the requested duration exactly. The wait is
//! abortable via whole-task cancellation at chunk boundaries and mid-chunk.

use std::time::Duration;
use tokio::time::sleep;

/// A lazy, finite sequence of sleep chunk durations.
/// 惰性、有限的睡眠分片时长序列。
#[derive(Debug, Clone)]
pub struct SleepChunks {
    remaining: Duration,
    max_chunk: Duration,
}

impl Iterator for SleepChunks {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining.is_zero() {
            return None;
        }

        let chunk = if self.max_chunk.is_zero() {
            // 零上限退化为单个分片，避免死循环
            // A zero maximum degenerates to a single chunk, avoiding a livelock
            self.remaining
        } else {
            self.remaining.min(self.max_chunk)
        };

        self.remaining -= chunk;
        Some(chunk)
    }
}

/// Splits `total` into chunks of at most `max_chunk`.
///
/// The sequence is empty for a zero `total`, contains exactly one element
/// equal to `total` when `total <= max_chunk`, and never contains a
/// zero-length chunk.
///
/// 将 `total` 分解为不超过 `max_chunk` 的分片。`total` 为零时序列为空；
/// `total <= max_chunk` 时序列恰好包含一个等于 `total` 的元素；
/// 序列永远不包含零长度分片。
pub fn chunks(total: Duration, max_chunk: Duration) -> SleepChunks {
    SleepChunks {
        remaining: total,
        max_chunk,
    }
}

/// Sleeps for `total`, one chunk at a time.
/// 按分片逐个睡眠，总计 `total`。
pub async fn chunked_sleep(total: Duration, max_chunk: Duration) {
    for chunk in chunks(total, max_chunk) {
        sleep(chunk).await;
    }
}
