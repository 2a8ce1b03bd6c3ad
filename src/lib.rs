#![deny(clippy::expect_used, clippy::unwrap_used)]

//! 截止时间有序的单消费者定时器调度库的根。
//! The root of the deadline-ordered, single-consumer timer scheduling library.

pub mod config;
pub mod error;
pub mod manager;
pub mod queue;
pub mod record;
pub mod sink;
pub mod sleep;
pub mod timer;

pub use config::TimerConfig;
pub use error::{Error, Result};
pub use manager::TimerManager;
pub use queue::{OrderedWaitQueue, PoppedTimer};
pub use record::{arg, ArgValue, Args, Expiry, Kwargs, TimerRecord};
pub use sink::{ChannelSink, DispatchSink, DispatchedEvent};
pub use sleep::{chunked_sleep, chunks, SleepChunks};
pub use timer::Timer;
