//! 定时器管理器：单一消费循环与重调度协议
//! Timer manager: the single consumer loop and the rescheduling protocol
//!
//! 管理器拥有队列的消费侧：一个轮询任务总是睡到最早的截止时间，
//! 然后把触发的记录交给派发接收端。进行中的分片睡眠没有更细粒度的
//! 唤醒机制，因此抢占通过"取消整个任务并重启"实现，循环被建模为
//! 完全可重启的任务。
//!
//! The manager owns the consumer side of the queue: one polling task always
//! sleeps until the earliest deadline, then hands the fired record to the
//! dispatch sink. The in-flight chunked sleep has no finer-grained wake
//! mechanism, so preemption is "cancel the whole task and restart" and the
//! loop is modeled as a fully restartable task.

use crate::config::TimerConfig;
use crate::error::{Error, Result};
use crate::queue::OrderedWaitQueue;
use crate::record::{Args, Expiry, Kwargs, TimerRecord};
use crate::sink::DispatchSink;
use crate::sleep::chunked_sleep;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

/// 管理器与其轮询任务共享的状态
/// State shared between the manager and its polling task
struct Shared<S: DispatchSink> {
    queue: OrderedWaitQueue,
    sink: S,
    config: TimerConfig,
}

/// The polling task: Idle (blocked in `pop_earliest`) or Waiting (blocked in
/// the chunked sleep). An aborted instance is always replaced by a fresh one
/// spawned on the same shared state.
///
/// 轮询任务：要么空闲（阻塞在 `pop_earliest`），要么等待中（阻塞在
/// 分片睡眠里）。被中止的实例总是由在同一共享状态上生成的新实例替代。
async fn poll_timers<S: DispatchSink>(shared: Arc<Shared<S>>) {
    info!("Timer polling task started");

    loop {
        let popped = shared.queue.pop_earliest().await;
        let remaining = popped
            .record
            .deadline()
            .saturating_duration_since(Instant::now());

        trace!(
            name = popped.record.name(),
            remaining_secs = remaining.as_secs_f64(),
            "Waiting on earliest timer"
        );

        chunked_sleep(remaining, shared.config.max_sleep_chunk).await;

        // 认领检查：睡眠结束与派发之间，抢占者可能已取回该记录。
        // 此时新的循环任务已拥有队列，本实例直接退出。
        // Claim check: between the end of the sleep and the dispatch, a
        // preemptor may have taken the record back. A fresh loop task owns
        // the queue then; this instance just exits.
        if !shared.queue.complete_current(popped.seq) {
            return;
        }

        shared.queue.mark_processed();

        trace!(name = popped.record.name(), "Dispatching timer event");
        if let Err(err) = shared
            .sink
            .emit(
                popped.record.name(),
                popped.record.args(),
                popped.record.kwargs(),
            )
            .await
        {
            // 接收端失败对本循环实例是致命的；不自动重启。
            // A sink failure is fatal for this loop instance; no automatic restart.
            error!(
                name = popped.record.name(),
                error = %err,
                "Dispatch sink failed, stopping polling task"
            );
            return;
        }
    }
}

/// A deadline-ordered timer scheduler with a single consumer task.
///
/// Producers may call [`schedule`](TimerManager::schedule) from any
/// concurrent context; the preemption decision and the abort-and-restart
/// sequence are serialized under one lock, so exactly one caller at a time
/// observes and mutates the "current wait" state.
///
/// 带单一消费任务的截止时间有序定时器调度器。生产者可以在任意并发
/// 上下文中调用 [`schedule`](TimerManager::schedule)；抢占判断与
/// "中止并重启"序列在同一把锁下串行化，因此任一时刻恰有一个调用者
/// 能观察并变更"当前等待"状态。
pub struct TimerManager<S: DispatchSink> {
    shared: Arc<Shared<S>>,
    task: Mutex<JoinHandle<()>>,
}

impl<S: DispatchSink> TimerManager<S> {
    /// Creates a manager with the default configuration and immediately
    /// spawns its polling task.
    ///
    /// 以默认配置创建管理器，并立即生成其轮询任务。
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, TimerConfig::default())
    }

    /// 以指定配置创建管理器
    /// Create a manager with the given configuration
    pub fn with_config(sink: S, config: TimerConfig) -> Self {
        let shared = Arc::new(Shared {
            queue: OrderedWaitQueue::new(),
            sink,
            config,
        });
        let task = tokio::spawn(poll_timers(shared.clone()));
        info!("Timer manager started");

        Self {
            shared,
            task: Mutex::new(task),
        }
    }

    fn task_lock(&self) -> MutexGuard<'_, JoinHandle<()>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates the inputs, constructs a record and queues it for dispatch.
    /// All validation happens before any queue mutation.
    ///
    /// 校验输入、构造记录并将其入队等待派发。
    /// 所有校验都发生在任何队列变更之前。
    pub fn schedule(
        &self,
        name: impl Into<String>,
        expires: impl Into<Expiry>,
        args: Option<Args>,
        kwargs: Option<Kwargs>,
    ) -> Result<()> {
        let record = TimerRecord::new(name, expires, args, kwargs)?;
        self.schedule_record(record);
        Ok(())
    }

    /// The producer side of the rescheduling protocol. If the new record's
    /// deadline is strictly earlier than the one currently being waited on,
    /// the current record is re-queued, the in-flight wait is aborted and a
    /// fresh polling task is spawned; the re-queue is ordered before the
    /// abort can take effect, so the interrupted record is never lost.
    ///
    /// 重调度协议的生产者侧。若新记录的截止时间严格早于当前正被等待的
    /// 记录，则当前记录被重新入队、进行中的等待被中止，并生成新的轮询
    /// 任务；重新入队先于中止生效，因此被打断的记录绝不会丢失。
    pub fn schedule_record(&self, record: TimerRecord) {
        // 同一把锁串行化并发的抢占判断与任务替换
        // One lock serializes concurrent preemption decisions and task swaps
        let mut task = self.task_lock();

        let name = record.name().to_string();
        if self.shared.queue.insert_or_preempt(record) {
            debug!(
                name = %name,
                "New timer preempts the current wait, restarting polling task"
            );
            task.abort();
            *task = tokio::spawn(poll_timers(self.shared.clone()));
        } else {
            trace!(name = %name, "Timer queued");
        }
    }

    /// Stops the polling task. No further dispatch occurs until
    /// [`clear`](TimerManager::clear) starts a fresh one.
    ///
    /// 停止轮询任务。在 [`clear`](TimerManager::clear) 重新启动之前
    /// 不会再有任何派发。
    pub fn cancel(&self) -> Result<()> {
        let task = self.task_lock();
        if task.is_finished() {
            return Err(Error::ManagerDone);
        }

        task.abort();
        debug!("Timer manager cancelled");
        Ok(())
    }

    /// Drops all queued and current work, then restarts the polling task
    /// fresh.
    ///
    /// 丢弃所有排队中与当前的工作，然后重新启动轮询任务。
    pub fn clear(&self) {
        let mut task = self.task_lock();
        task.abort();
        self.shared.queue.clear();
        *task = tokio::spawn(poll_timers(self.shared.clone()));
        debug!("Timer manager cleared and restarted");
    }

    /// Suspends until every scheduled record has been processed. Pure
    /// barrier; does not stop new schedules.
    ///
    /// 挂起直到所有已调度记录处理完毕。纯屏障；不阻止新的调度。
    pub async fn join(&self) {
        self.shared.queue.join().await;
    }

    /// 轮询任务是否已经结束
    /// Whether the polling task has finished
    pub fn done(&self) -> bool {
        self.task_lock().is_finished()
    }

    /// 排队中的记录数（不含正被等待的记录）
    /// Number of queued records (excluding the one being waited on)
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// 已调度但尚未处理完成的记录数
    /// Number of records scheduled but not yet processed
    pub fn outstanding(&self) -> usize {
        self.shared.queue.outstanding()
    }
}

impl<S: DispatchSink> Drop for TimerManager<S> {
    fn drop(&mut self) {
        self.task_lock().abort();
    }
}
