//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use thiserror::Error;

/// The primary error type for the timer scheduling library.
/// 定时器调度库的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// A keyword argument key on the type-erased input path was not a string.
    /// 类型擦除输入路径上的关键字参数键不是字符串。
    #[error("kwargs keys must all be strings")]
    InvalidKwargsKey,

    /// The expiry input was NaN, infinite, or past the end of the
    /// monotonic clock's representable range.
    /// 到期时间输入为NaN、无穷大，或超出单调时钟的可表示范围。
    #[error("expires must be finite and within the representable time range")]
    InvalidExpiry,

    /// `start` was called on a timer that already owns a task.
    /// 对已拥有任务的定时器调用了 `start`。
    #[error("timer was already started")]
    AlreadyStarted,

    /// The operation requires a started timer.
    /// 该操作要求定时器已启动。
    #[error("timer was never started")]
    NeverStarted,

    /// The timer's task has already finished.
    /// 定时器的任务已经完成。
    #[error("timer is already done")]
    AlreadyDone,

    /// The manager's polling task has already finished.
    /// 管理器的轮询任务已经完成。
    #[error("the manager is already done")]
    ManagerDone,

    /// The awaited task was cancelled before it could dispatch.
    /// 被等待的任务在派发之前已被取消。
    #[error("timer task was cancelled")]
    Cancelled,

    /// An internal channel for communication between tasks was closed unexpectedly.
    /// 用于任务间通信的内部通道意外关闭。
    #[error("internal channel is broken")]
    ChannelClosed,

    /// The dispatch sink reported a failure; fatal for the loop instance that hit it.
    /// 派发接收端报告了失败；对遇到它的循环实例而言是致命的。
    #[error("dispatch sink failed: {0}")]
    Dispatch(String),
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;
