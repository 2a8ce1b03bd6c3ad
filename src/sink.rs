//! 派发接收端定义
//! Dispatch sink definitions
//!
//! 调度器自身不路由事件；它只把 `(name, args, kwargs)` 交给一个
//! 外部接收端。本模块定义该接收端的trait，以及一个基于mpsc通道的
//! 适配器实现，便于把派发结果转发给任意消费任务。
//!
//! The scheduler does not route events itself; it hands `(name, args,
//! kwargs)` to an external sink. This module defines the sink trait plus an
//! mpsc-channel-backed adapter that forwards dispatches to any consumer task.

use crate::error::{Error, Result};
use crate::record::{Args, Kwargs};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// The consumed capability that receives a timer's event when it fires.
///
/// Implementations are expected to be non-blocking enough not to stall the
/// polling loop. A returned error is fatal for the loop instance that hit it.
///
/// 定时器触发时接收其事件的外部能力。实现应当足够不阻塞，
/// 以免拖住轮询循环。返回错误对遇到它的循环实例而言是致命的。
#[async_trait]
pub trait DispatchSink: Send + Sync + 'static {
    /// 派发一个已触发的定时器事件
    /// Dispatch one fired timer event
    async fn emit(&self, name: &str, args: &Args, kwargs: &Kwargs) -> Result<()>;
}

/// One fired timer event, as forwarded by [`ChannelSink`].
/// 一次已触发的定时器事件，由 [`ChannelSink`] 转发。
#[derive(Debug, Clone)]
pub struct DispatchedEvent {
    /// 事件名称
    /// Event name
    pub name: String,
    /// 位置参数
    /// Positional arguments
    pub args: Args,
    /// 关键字参数
    /// Keyword arguments
    pub kwargs: Kwargs,
}

/// A sink that forwards every dispatch over a bounded mpsc channel.
/// 通过有界mpsc通道转发每次派发的接收端。
pub struct ChannelSink {
    event_tx: mpsc::Sender<DispatchedEvent>,
}

impl ChannelSink {
    /// 创建通道接收端及其对应的接收句柄
    /// Create a channel sink together with its receiving handle
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<DispatchedEvent>) {
        let (event_tx, event_rx) = mpsc::channel(buffer_size);
        (Self { event_tx }, event_rx)
    }
}

#[async_trait]
impl DispatchSink for ChannelSink {
    async fn emit(&self, name: &str, args: &Args, kwargs: &Kwargs) -> Result<()> {
        let event = DispatchedEvent {
            name: name.to_string(),
            args: args.clone(),
            kwargs: kwargs.clone(),
        };

        self.event_tx
            .send(event)
            .await
            .map_err(|_| Error::ChannelClosed)
    }
}
