//! 自管理的单次定时器
//! Self-managed single-shot timer
//!
//! 一个完全绕过管理器的轻量变体：它拥有自己的单个等待任务，到期后
//! 恰好派发一次，除非先被取消。只有两个状态：运行中，以及
//! 已完成或已取消。
//!
//! A lightweight variant that bypasses the manager entirely: it owns its own
//! single wait task and dispatches exactly once on completion, unless
//! cancelled first. It has only two states: Running, and
//! Finished-or-Cancelled.

use crate::config::TimerConfig;
use crate::error::{Error, Result};
use crate::record::{Args, Expiry, Kwargs, TimerRecord};
use crate::sink::DispatchSink;
use crate::sleep::chunked_sleep;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::error;

/// A single-shot timer that spawns its own wait task.
/// 生成自己等待任务的单次定时器。
pub struct Timer<S: DispatchSink> {
    record: TimerRecord,
    sink: Arc<S>,
    max_sleep_chunk: Duration,
    task: Option<JoinHandle<()>>,
}

impl<S: DispatchSink> Timer<S> {
    /// Validates the inputs and constructs a not-yet-started timer.
    /// 校验输入并构造一个尚未启动的定时器。
    pub fn new(
        sink: Arc<S>,
        name: impl Into<String>,
        expires: impl Into<Expiry>,
        args: Option<Args>,
        kwargs: Option<Kwargs>,
    ) -> Result<Self> {
        Ok(Self {
            record: TimerRecord::new(name, expires, args, kwargs)?,
            sink,
            max_sleep_chunk: TimerConfig::default().max_sleep_chunk,
            task: None,
        })
    }

    /// 覆盖睡眠分片上限
    /// Override the sleep chunk ceiling
    pub fn with_config(mut self, config: &TimerConfig) -> Self {
        self.max_sleep_chunk = config.max_sleep_chunk;
        self
    }

    /// 底层记录
    /// The underlying record
    pub fn record(&self) -> &TimerRecord {
        &self.record
    }

    /// Spawns the wait task: sleep out the remaining duration in chunks,
    /// then dispatch exactly once.
    ///
    /// 生成等待任务：按分片睡完剩余时长，然后恰好派发一次。
    pub fn start(&mut self) -> Result<&mut Self> {
        if self.task.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let record = self.record.clone();
        let sink = self.sink.clone();
        let max_sleep_chunk = self.max_sleep_chunk;

        self.task = Some(tokio::spawn(async move {
            let remaining = record.deadline().saturating_duration_since(Instant::now());
            chunked_sleep(remaining, max_sleep_chunk).await;

            if let Err(err) = sink
                .emit(record.name(), record.args(), record.kwargs())
                .await
            {
                error!(name = record.name(), error = %err, "Dispatch sink failed");
            }
        }));

        Ok(self)
    }

    fn running_task(&self) -> Result<&JoinHandle<()>> {
        match &self.task {
            None => Err(Error::NeverStarted),
            Some(task) if task.is_finished() => Err(Error::AlreadyDone),
            Some(task) => Ok(task),
        }
    }

    /// Cancels the timer before it fires.
    ///
    /// Fails with an invalid-state error if the timer was never started or
    /// is already done.
    ///
    /// 在触发前取消定时器。若定时器从未启动或已经完成，
    /// 则返回无效状态错误。
    pub fn cancel(&self) -> Result<()> {
        self.running_task()?.abort();
        Ok(())
    }

    /// Waits until the timer has dispatched.
    ///
    /// Fails like [`cancel`](Timer::cancel) on a never-started or finished
    /// timer; yields [`Error::Cancelled`] if the timer is cancelled while
    /// being joined.
    ///
    /// 等待定时器完成派发。对从未启动或已完成的定时器，失败行为同
    /// [`cancel`](Timer::cancel)；若在等待期间定时器被取消，
    /// 则返回 [`Error::Cancelled`]。
    pub async fn join(&mut self) -> Result<()> {
        self.running_task()?;

        let Some(task) = self.task.as_mut() else {
            return Err(Error::NeverStarted);
        };

        match task.await {
            Ok(()) => Ok(()),
            Err(join_err) if join_err.is_cancelled() => Err(Error::Cancelled),
            Err(join_err) => Err(Error::Dispatch(join_err.to_string())),
        }
    }

    /// 定时器是否已完成（派发完毕或已取消）
    /// Whether the timer is done (dispatched or cancelled)
    pub fn done(&self) -> bool {
        self.task.as_ref().is_some_and(|task| task.is_finished())
    }

    /// Seconds until the deadline; negative once the deadline has passed.
    /// 距截止时间的秒数；截止时间已过则为负数。
    pub fn remaining(&self) -> f64 {
        self.record.remaining()
    }
}
