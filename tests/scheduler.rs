//! 定时器管理器集成测试
//! Timer manager integration tests
//!
//! 所有测试都在暂停的虚拟时间下运行：tokio会在运行时空闲时
//! 自动推进到最早的定时器，使长等待瞬间完成且完全确定。
//!
//! All tests run under paused virtual time: tokio auto-advances to the
//! earliest timer whenever the runtime is idle, making long waits instant
//! and fully deterministic.

mod common;

use kestrel_timers::{arg, Args, ChannelSink, Error, Kwargs, TimerManager};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// 让轮询任务有机会取出最早的记录并进入等待状态
/// Give the polling task a chance to pop the earliest record and start waiting
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_urgent_timer_preempts_current_wait() {
    common::init_tracing();
    let (sink, mut event_rx) = ChannelSink::new(16);
    let manager = TimerManager::new(sink);
    let start = Instant::now();

    manager.schedule("ping", 10u64, None, None).unwrap();

    // 确保循环已经在等待ping，随后的调度才会走抢占路径
    // Make sure the loop is already waiting on ping, so the next schedule
    // takes the preemption path
    settle().await;

    manager.schedule("urgent", 2u64, None, None).unwrap();

    let first = event_rx.recv().await.unwrap();
    assert_eq!(first.name, "urgent");
    let urgent_at = start.elapsed();
    assert!(urgent_at >= Duration::from_secs(2), "urgent fired at {:?}", urgent_at);
    assert!(urgent_at < Duration::from_millis(2500));

    // 被抢占的ping仍按它自己原本的期限派发，恰好一次
    // The preempted ping still fires at its own original deadline, exactly once
    let second = event_rx.recv().await.unwrap();
    assert_eq!(second.name, "ping");
    let ping_at = start.elapsed();
    assert!(ping_at >= Duration::from_secs(10), "ping fired at {:?}", ping_at);
    assert!(ping_at < Duration::from_millis(10500));

    let extra = timeout(Duration::from_secs(30), event_rx.recv()).await;
    assert!(extra.is_err(), "no record may be dispatched twice");
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_order_follows_deadlines() {
    let (sink, mut event_rx) = ChannelSink::new(16);
    let manager = TimerManager::new(sink);

    manager.schedule("third", 9u64, None, None).unwrap();
    manager.schedule("first", 3u64, None, None).unwrap();
    manager.schedule("fourth", 12u64, None, None).unwrap();
    manager.schedule("second", 6u64, None, None).unwrap();

    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(event_rx.recv().await.unwrap().name);
    }
    assert_eq!(order, vec!["first", "second", "third", "fourth"]);
}

#[tokio::test(start_paused = true)]
async fn test_payload_round_trip_and_lower_bound() {
    let (sink, mut event_rx) = ChannelSink::new(16);
    let manager = TimerManager::new(sink);
    let start = Instant::now();

    let mut args = Args::new();
    args.push(42u32);
    args.push(String::from("reminder"));

    let mut kwargs = Kwargs::new();
    kwargs.insert("channel", 1234u64);
    kwargs.insert("message", String::from("hello"));

    manager
        .schedule("remind", 5.0, Some(args), Some(kwargs))
        .unwrap();

    let event = event_rx.recv().await.unwrap();

    // 相对S秒的调度不得早于 now + S 派发
    // A schedule of S relative seconds must not dispatch before now + S
    assert!(start.elapsed() >= Duration::from_secs(5));

    assert_eq!(event.name, "remind");
    assert_eq!(event.args.get_as::<u32>(0), Some(&42));
    assert_eq!(
        event.args.get_as::<String>(1).map(String::as_str),
        Some("reminder")
    );
    assert_eq!(event.kwargs.get_as::<u64>("channel"), Some(&1234));
    assert_eq!(
        event.kwargs.get_as::<String>("message").map(String::as_str),
        Some("hello")
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_blocks_until_processed_then_blocks_again() {
    let (sink, mut event_rx) = ChannelSink::new(16);
    let manager = TimerManager::new(sink);

    manager.schedule("one", 2u64, None, None).unwrap();

    let blocked = timeout(Duration::from_millis(100), manager.join()).await;
    assert!(blocked.is_err(), "join must block while work is outstanding");

    timeout(Duration::from_secs(5), manager.join()).await.unwrap();
    assert_eq!(event_rx.recv().await.unwrap().name, "one");

    // join之后的新调度让下一次join重新阻塞
    // A schedule after join makes the next join block again
    manager.schedule("two", 2u64, None, None).unwrap();
    let blocked = timeout(Duration::from_millis(100), manager.join()).await;
    assert!(blocked.is_err());

    timeout(Duration::from_secs(5), manager.join()).await.unwrap();
    assert_eq!(event_rx.recv().await.unwrap().name, "two");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_leaves_pending_record_undispatched() {
    let (sink, mut event_rx) = ChannelSink::new(16);
    let manager = TimerManager::new(sink);

    manager.schedule("never", 5u64, None, None).unwrap();
    settle().await;

    manager.cancel().unwrap();
    sleep(Duration::from_secs(10)).await;

    assert!(manager.done());
    assert!(event_rx.try_recv().is_err(), "cancelled manager must not dispatch");

    // 第二次cancel以无效状态失败
    // A second cancel fails with an invalid-state error
    assert!(matches!(manager.cancel(), Err(Error::ManagerDone)));
}

#[tokio::test(start_paused = true)]
async fn test_clear_drops_all_work_and_restarts() {
    let (sink, mut event_rx) = ChannelSink::new(16);
    let manager = TimerManager::new(sink);

    manager.schedule("dropped-a", 5u64, None, None).unwrap();
    manager.schedule("dropped-b", 7u64, None, None).unwrap();
    settle().await;

    manager.clear();
    assert_eq!(manager.pending(), 0);
    assert_eq!(manager.outstanding(), 0);
    assert!(!manager.done(), "clear restarts the polling task");

    // 清除后的新调度照常派发；被清除的记录永不出现
    // Schedules after clear dispatch normally; cleared records never surface
    manager.schedule("kept", 1u64, None, None).unwrap();
    let event = timeout(Duration::from_secs(20), event_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.name, "kept");

    let extra = timeout(Duration::from_secs(20), event_rx.recv()).await;
    assert!(extra.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_validation_happens_before_any_queue_mutation() {
    let (sink, _event_rx) = ChannelSink::new(16);
    let manager = TimerManager::new(sink);

    // 非字符串键在构造期被拒绝，记录从未触及队列
    // A non-string key is rejected at construction; no record ever touches the queue
    let kwargs = Kwargs::from_pairs(vec![(arg(1i64), arg("a"))]);
    assert!(matches!(kwargs, Err(Error::InvalidKwargsKey)));

    let scheduled = manager.schedule("bad", f64::NAN, None, None);
    assert!(matches!(scheduled, Err(Error::InvalidExpiry)));

    assert_eq!(manager.outstanding(), 0);
    assert_eq!(manager.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_is_fatal_for_the_loop() {
    let (sink, event_rx) = ChannelSink::new(4);
    drop(event_rx);

    let manager = TimerManager::new(sink);
    manager.schedule("doomed", 0u64, None, None).unwrap();

    sleep(Duration::from_secs(1)).await;
    assert!(manager.done(), "a sink failure must stop the polling task");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_producers_each_dispatch_once() {
    let (sink, mut event_rx) = ChannelSink::new(32);
    let manager = std::sync::Arc::new(TimerManager::new(sink));

    let producers: Vec<_> = (0..5u64)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .schedule(format!("timer-{i}"), 5 - i, None, None)
                    .unwrap();
            })
        })
        .collect();
    futures::future::join_all(producers).await;

    let mut names = Vec::new();
    for _ in 0..5 {
        names.push(event_rx.recv().await.unwrap().name);
    }
    // 截止时间越早越先派发
    // Earlier deadlines dispatch first
    assert_eq!(
        names,
        vec!["timer-4", "timer-3", "timer-2", "timer-1", "timer-0"]
    );

    let extra = timeout(Duration::from_secs(30), event_rx.recv()).await;
    assert!(extra.is_err());
}
