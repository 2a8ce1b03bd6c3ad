//! 截止时间有序的等待队列
//! Deadline-ordered wait queue
//!
//! 本模块实现调度器的核心集合：按 `(截止时间, 插入序号)` 排序的待处理
//! 记录集合，外加一个支持阻塞式 `join` 的未完成计数器，以及供单一消费者
//! 与抢占者原子交互的"当前记录"标记。
//!
//! This module implements the scheduler's core collection: a pending-record
//! set ordered by `(deadline, insertion sequence)`, an outstanding-work
//! counter backing a blocking `join`, and the "current record" marker that
//! the single consumer and preemptors interact with atomically.

use crate::record::TimerRecord;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// 队列中的一个条目：记录加上其插入序号。
/// One queue entry: a record plus its insertion sequence number.
#[derive(Clone)]
struct QueueEntry {
    /// Tie-break among equal deadlines: strict FIFO by insertion. The
    /// sequence number is assigned once and survives re-queueing after a
    /// preemption.
    ///
    /// 相同截止时间之间的平局裁决：按插入顺序严格FIFO。
    /// 序号只分配一次，并在抢占后的重新入队中保持不变。
    seq: u64,
    record: TimerRecord,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.record
            .deadline()
            .cmp(&other.record.deadline())
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// A record removed from the queue and marked as currently being waited on.
/// 从队列中取出并被标记为"正在等待"的记录。
pub struct PoppedTimer {
    pub(crate) seq: u64,
    /// 取出的记录
    /// The popped record
    pub record: TimerRecord,
}

struct Inner {
    entries: BinaryHeap<Reverse<QueueEntry>>,
    /// The one entry being waited on, if any. Lives between pop and
    /// completion; taken back by a preemptor that decided to restart the
    /// consumer.
    ///
    /// 正在被等待的唯一条目（如果有）。存在于取出与完成之间；
    /// 决定重启消费者的抢占者会将其取回。
    current: Option<QueueEntry>,
    outstanding: usize,
    next_seq: u64,
}

/// A mutable collection of timer records ordered by deadline, owned by the
/// manager. Producers only touch its thread-safe insert/wake primitives;
/// `pop_earliest` is exclusive to the single consumer loop.
///
/// 按截止时间排序的定时器记录可变集合，由管理器拥有。生产者只接触其
/// 线程安全的插入/唤醒原语；`pop_earliest` 专属于唯一的消费循环。
pub struct OrderedWaitQueue {
    inner: Mutex<Inner>,
    /// 有记录可取时唤醒消费者
    /// Wakes the consumer when a record is available
    available: Notify,
    /// 未完成计数归零时释放所有joiner
    /// Releases all joiners when the outstanding count reaches zero
    drained: Notify,
}

impl OrderedWaitQueue {
    /// 创建空队列
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: BinaryHeap::new(),
                current: None,
                outstanding: 0,
                next_seq: 0,
            }),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a record, restores the ordering invariant and increments the
    /// outstanding count. Never fails for a well-formed record.
    ///
    /// 添加一条记录，恢复排序不变量并递增未完成计数。
    /// 对合法记录永不失败。
    pub fn insert(&self, record: TimerRecord) {
        {
            let mut inner = self.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.push(Reverse(QueueEntry { seq, record }));
            inner.outstanding += 1;
        }
        self.available.notify_one();
    }

    /// Removes and returns the earliest-deadline record, suspending the
    /// caller while the queue is empty. Pop and current-marking happen under
    /// one lock, so a concurrent preemption decision always observes the
    /// record the consumer is about to wait on.
    ///
    /// 移除并返回截止时间最早的记录，队列为空时挂起调用者。取出与
    /// "当前"标记在同一把锁下完成，因此并发的抢占判断总能观察到
    /// 消费者即将等待的那条记录。
    pub async fn pop_earliest(&self) -> PoppedTimer {
        loop {
            // 先登记唤醒，再检查队列，避免丢失插入通知
            // Register for wakeup before checking, to avoid a missed insert
            let notified = self.available.notified();

            {
                let mut inner = self.lock();
                if let Some(Reverse(entry)) = inner.entries.pop() {
                    inner.current = Some(entry.clone());
                    return PoppedTimer {
                        seq: entry.seq,
                        record: entry.record,
                    };
                }
            }

            notified.await;
        }
    }

    /// Decrements the outstanding count and releases joiners at zero.
    /// Calling it more often than records were inserted is a programming
    /// error; the count saturates rather than corrupting state.
    ///
    /// 递减未完成计数，归零时释放joiner。调用次数超过插入次数属于
    /// 编程错误；计数饱和而不是破坏状态。
    pub fn mark_processed(&self) {
        let drained = {
            let mut inner = self.lock();
            inner.outstanding = inner.outstanding.saturating_sub(1);
            inner.outstanding == 0
        };

        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Suspends until the outstanding count is zero. Multiple concurrent
    /// joiners are all released together. Pure synchronization barrier; does
    /// not stop new inserts.
    ///
    /// 挂起直到未完成计数为零。多个并发joiner会被一起释放。
    /// 纯同步屏障；不会阻止新的插入。
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();

            if self.lock().outstanding == 0 {
                return;
            }

            notified.await;
        }
    }

    /// Discards all queued records, drops the current marker and resets the
    /// outstanding count to zero. Any in-flight wait must be aborted by the
    /// caller first.
    ///
    /// 丢弃所有排队记录，清除当前标记并将未完成计数归零。
    /// 进行中的等待必须先由调用者中止。
    pub fn clear(&self) {
        {
            let mut inner = self.lock();
            inner.entries.clear();
            inner.current = None;
            inner.outstanding = 0;
        }
        self.drained.notify_waiters();
    }

    /// 排队中的记录数（不含当前记录）
    /// Number of queued records (excluding the current one)
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已插入但尚未标记处理完成的记录数
    /// Number of records inserted but not yet marked processed
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// The atomic decision-and-mutate step of the rescheduling protocol.
    ///
    /// If a current record exists and its deadline is strictly later than
    /// the new record's, the current entry is taken back and re-queued (with
    /// its original sequence number and without touching the outstanding
    /// count, since it was never marked processed), the new record is
    /// inserted, and `true` is returned: the caller must restart the
    /// consumer loop. Otherwise the new record is simply inserted.
    ///
    /// 重调度协议中原子的"判断并变更"步骤。若存在当前记录且其截止时间
    /// 严格晚于新记录，则取回当前条目并重新入队（保留原序号且不动
    /// 未完成计数，因为它从未被标记处理完成），插入新记录并返回
    /// `true`：调用者必须重启消费循环。否则仅插入新记录。
    pub(crate) fn insert_or_preempt(&self, record: TimerRecord) -> bool {
        let preempted = {
            let mut inner = self.lock();

            let preempt = inner
                .current
                .as_ref()
                .is_some_and(|current| current.record.deadline() > record.deadline());

            if preempt {
                if let Some(current) = inner.current.take() {
                    inner.entries.push(Reverse(current));
                }
            }

            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.push(Reverse(QueueEntry { seq, record }));
            inner.outstanding += 1;

            preempt
        };

        self.available.notify_one();
        preempted
    }

    /// The consumer's post-wait claim check: clears the current marker if it
    /// still refers to the given pop. Returns `false` when a preemptor took
    /// the record back in the meantime; the caller must not dispatch it.
    ///
    /// 消费者等待结束后的认领检查：若当前标记仍指向给定的取出结果则
    /// 将其清除。返回 `false` 表示抢占者已在此期间取回该记录 ——
    /// 调用者不得派发它。
    pub(crate) fn complete_current(&self, seq: u64) -> bool {
        let mut inner = self.lock();
        if inner.current.as_ref().is_some_and(|c| c.seq == seq) {
            inner.current = None;
            true
        } else {
            false
        }
    }
}

impl Default for OrderedWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
