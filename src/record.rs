//! 定时器记录与载荷定义
//! Timer record and payload definitions
//!
//! 本模块定义了调度系统的数据载体：不可变的 `TimerRecord`、
//! 到期时间输入 `Expiry`，以及类型擦除的位置参数和关键字参数载荷。
//!
//! This module defines the data carriers of the scheduling system: the
//! immutable `TimerRecord`, the expiry input `Expiry`, and the type-erased
//! positional/keyword argument payloads.

use crate::error::{Error, Result};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// A single type-erased payload value.
/// 单个类型擦除的载荷值。
pub type ArgValue = Arc<dyn Any + Send + Sync>;

/// Boxes a value into an [`ArgValue`].
/// 将一个值装箱为 [`ArgValue`]。
pub fn arg<T: Send + Sync + 'static>(value: T) -> ArgValue {
    Arc::new(value)
}

/// An ordered sequence of type-erased positional arguments, possibly empty.
/// 有序的类型擦除位置参数序列，可以为空。
#[derive(Clone, Default)]
pub struct Args(Vec<ArgValue>);

impl Args {
    /// 创建空的位置参数序列
    /// Create an empty positional argument sequence
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// 追加一个参数
    /// Append one argument
    pub fn push<T: Send + Sync + 'static>(&mut self, value: T) {
        self.0.push(arg(value));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按位置取出参数并向下转型
    /// Fetch an argument by position and downcast it
    pub fn get_as<T: 'static>(&self, index: usize) -> Option<&T> {
        self.0.get(index).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgValue> {
        self.0.iter()
    }
}

impl FromIterator<ArgValue> for Args {
    fn from_iter<I: IntoIterator<Item = ArgValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Args(len: {})", self.0.len())
    }
}

/// A string-keyed mapping of type-erased keyword arguments, possibly empty.
///
/// String keys are a construction-time invariant: the typed API makes
/// non-string keys unrepresentable, and the dynamic input path
/// ([`Kwargs::from_pairs`]) rejects them before any scheduling side effect.
///
/// 字符串为键的类型擦除关键字参数映射，可以为空。字符串键是构造期不变量：
/// 类型化API使非字符串键无法表示，而动态输入路径（[`Kwargs::from_pairs`]）
/// 会在产生任何调度副作用之前拒绝它们。
#[derive(Clone, Default)]
pub struct Kwargs(HashMap<String, ArgValue>);

impl Kwargs {
    /// 创建空的关键字参数映射
    /// Create an empty keyword argument mapping
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// 插入一个键值对
    /// Insert one key-value pair
    pub fn insert<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.0.insert(key.into(), arg(value));
    }

    /// Builds a mapping from fully type-erased pairs, validating that every
    /// key is a string (`String` or `&'static str`).
    ///
    /// 从完全类型擦除的键值对构建映射，校验每个键都是字符串
    /// （`String` 或 `&'static str`）。
    pub fn from_pairs<I: IntoIterator<Item = (ArgValue, ArgValue)>>(pairs: I) -> Result<Self> {
        let mut map = HashMap::new();
        for (key, value) in pairs {
            let key = if let Some(s) = key.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = key.downcast_ref::<&'static str>() {
                (*s).to_string()
            } else {
                return Err(Error::InvalidKwargsKey);
            };
            map.insert(key, value);
        }
        Ok(Self(map))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按键取出参数并向下转型
    /// Fetch an argument by key and downcast it
    pub fn get_as<T: 'static>(&self, key: &str) -> Option<&T> {
        self.0.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Debug for Kwargs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_unstable();
        write!(f, "Kwargs(keys: {:?})", keys)
    }
}

/// A schedule-time expiry input, normalized to an absolute deadline at
/// record construction.
///
/// 调度时刻的到期时间输入，在记录构造时被归一化为绝对截止时间。
#[derive(Debug, Clone, Copy)]
pub enum Expiry {
    /// Relative seconds from now. Must be finite and representable as a
    /// duration; negative means already due.
    /// 相对当前时刻的秒数。必须是有限值且可表示为时长；负数表示已经到期。
    Seconds(f64),
    /// Relative duration from now.
    /// 相对当前时刻的时长。
    After(Duration),
    /// Absolute monotonic instant, used as-is.
    /// 绝对单调时间点，原样使用。
    At(Instant),
    /// Absolute wall-clock timestamp; past timestamps mean already due.
    /// 绝对挂钟时间戳；过去的时间戳表示已经到期。
    AtWallClock(SystemTime),
}

impl Expiry {
    /// Normalizes the input into an absolute monotonic deadline. Inputs that
    /// cannot be represented as an instant (NaN, infinities, or durations
    /// past the end of the monotonic clock's range) are validation errors,
    /// never panics.
    ///
    /// 将输入归一化为绝对单调截止时间。无法表示为时间点的输入
    /// （NaN、无穷大、或超出单调时钟可表示范围的时长）是校验错误，
    /// 绝不会panic。
    pub fn into_deadline(self, now: Instant) -> Result<Instant> {
        match self {
            Expiry::Seconds(secs) => {
                if !secs.is_finite() {
                    return Err(Error::InvalidExpiry);
                }
                if secs <= 0.0 {
                    return Ok(now);
                }

                let ahead =
                    Duration::try_from_secs_f64(secs).map_err(|_| Error::InvalidExpiry)?;
                now.checked_add(ahead).ok_or(Error::InvalidExpiry)
            }
            Expiry::After(duration) => now.checked_add(duration).ok_or(Error::InvalidExpiry),
            Expiry::At(instant) => Ok(instant),
            Expiry::AtWallClock(timestamp) => {
                // 挂钟时间只在构造时参与一次换算，之后全程使用单调时钟。
                // Wall-clock time takes part in exactly one conversion at
                // construction; everything after runs on the monotonic clock.
                match timestamp.duration_since(SystemTime::now()) {
                    Ok(ahead) => now.checked_add(ahead).ok_or(Error::InvalidExpiry),
                    Err(_) => Ok(now),
                }
            }
        }
    }
}

impl From<f64> for Expiry {
    fn from(secs: f64) -> Self {
        Expiry::Seconds(secs)
    }
}

impl From<u64> for Expiry {
    fn from(secs: u64) -> Self {
        // 整数秒走无损的Duration路径，不经过浮点换算
        // Integer seconds take the lossless Duration path, no float conversion
        Expiry::After(Duration::from_secs(secs))
    }
}

impl From<Duration> for Expiry {
    fn from(duration: Duration) -> Self {
        Expiry::After(duration)
    }
}

impl From<Instant> for Expiry {
    fn from(instant: Instant) -> Self {
        Expiry::At(instant)
    }
}

impl From<SystemTime> for Expiry {
    fn from(timestamp: SystemTime) -> Self {
        Expiry::AtWallClock(timestamp)
    }
}

/// An immutable record describing one pending dispatch: fire at `deadline`,
/// then emit the event `name` with the stored payload.
///
/// 描述一次待处理派发的不可变记录：在 `deadline` 触发，
/// 然后携带存储的载荷发出名为 `name` 的事件。
#[derive(Clone)]
pub struct TimerRecord {
    name: String,
    deadline: Instant,
    args: Args,
    kwargs: Kwargs,
}

impl TimerRecord {
    /// Validates the inputs and constructs a record. All validation happens
    /// here, synchronously, before the record can reach any queue.
    ///
    /// 校验输入并构造记录。所有校验都在此同步完成，
    /// 早于记录进入任何队列之前。
    pub fn new(
        name: impl Into<String>,
        expires: impl Into<Expiry>,
        args: Option<Args>,
        kwargs: Option<Kwargs>,
    ) -> Result<Self> {
        let deadline = expires.into().into_deadline(Instant::now())?;

        Ok(Self {
            name: name.into(),
            deadline,
            args: args.unwrap_or_default(),
            kwargs: kwargs.unwrap_or_default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Seconds until the deadline; negative once the deadline has passed.
    /// 距截止时间的秒数；截止时间已过则为负数。
    pub fn remaining(&self) -> f64 {
        let now = Instant::now();
        if self.deadline >= now {
            (self.deadline - now).as_secs_f64()
        } else {
            -((now - self.deadline).as_secs_f64())
        }
    }
}

impl fmt::Debug for TimerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimerRecord(name: {:?}, deadline: {:?}, args: {}, kwargs: {})",
            self.name,
            self.deadline,
            self.args.len(),
            self.kwargs.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seconds_expiry_is_relative() {
        let now = Instant::now();
        let record = TimerRecord::new("tick", 5.0, None, None).unwrap();
        let remaining = record.deadline() - now;
        assert!(remaining >= Duration::from_secs_f64(4.9));
        assert!(remaining <= Duration::from_secs_f64(5.1));
    }

    #[tokio::test]
    async fn test_negative_seconds_clamp_to_now() {
        let record = TimerRecord::new("tick", -3.0, None, None).unwrap();
        assert!(record.deadline() <= Instant::now());
        assert!(record.remaining() <= 0.0);
    }

    #[tokio::test]
    async fn test_non_finite_seconds_rejected() {
        assert!(matches!(
            TimerRecord::new("tick", f64::NAN, None, None),
            Err(Error::InvalidExpiry)
        ));
        assert!(matches!(
            TimerRecord::new("tick", f64::INFINITY, None, None),
            Err(Error::InvalidExpiry)
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_rejected() {
        // 有限但无法表示的输入同样返回校验错误，而不是panic
        // Finite but unrepresentable inputs also yield a validation error, never a panic
        assert!(matches!(
            TimerRecord::new("huge", 1e30f64, None, None),
            Err(Error::InvalidExpiry)
        ));
        assert!(matches!(
            TimerRecord::new("huge", Duration::MAX, None, None),
            Err(Error::InvalidExpiry)
        ));
        assert!(matches!(
            TimerRecord::new("huge", u64::MAX, None, None),
            Err(Error::InvalidExpiry)
        ));
    }

    #[tokio::test]
    async fn test_u64_expiry_is_lossless() {
        // 超过2^53的整数秒在浮点路径上会丢失精度；u64必须走Duration路径
        // Integer seconds above 2^53 lose precision as floats; u64 must take
        // the Duration path
        let now = Instant::now();
        let secs = (1u64 << 53) + 1;
        let deadline = Expiry::from(secs).into_deadline(now).unwrap();
        assert_eq!(deadline, now + Duration::from_secs(secs));
    }

    #[tokio::test]
    async fn test_duration_and_instant_expiry() {
        let target = Instant::now() + Duration::from_secs(30);
        let by_instant = TimerRecord::new("a", target, None, None).unwrap();
        assert_eq!(by_instant.deadline(), target);

        let by_duration = TimerRecord::new("b", Duration::from_secs(30), None, None).unwrap();
        let diff = if by_duration.deadline() > target {
            by_duration.deadline() - target
        } else {
            target - by_duration.deadline()
        };
        assert!(diff < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_past_wall_clock_clamps_to_now() {
        let past = SystemTime::now() - Duration::from_secs(60);
        let record = TimerRecord::new("tick", past, None, None).unwrap();
        assert!(record.deadline() <= Instant::now());
    }

    #[test]
    fn test_kwargs_from_pairs_accepts_string_keys() {
        let kwargs = Kwargs::from_pairs(vec![
            (arg(String::from("alpha")), arg(1u32)),
            (arg("beta"), arg(2u32)),
        ])
        .unwrap();

        assert_eq!(kwargs.len(), 2);
        assert_eq!(kwargs.get_as::<u32>("alpha"), Some(&1));
        assert_eq!(kwargs.get_as::<u32>("beta"), Some(&2));
    }

    #[test]
    fn test_kwargs_from_pairs_rejects_non_string_key() {
        // 非字符串键必须在构造期被拒绝
        // Non-string keys must be rejected at construction time
        let result = Kwargs::from_pairs(vec![(arg(1i64), arg("a"))]);
        assert!(matches!(result, Err(Error::InvalidKwargsKey)));
    }

    #[test]
    fn test_args_round_trip() {
        let mut args = Args::new();
        args.push(7u8);
        args.push(String::from("payload"));

        assert_eq!(args.len(), 2);
        assert_eq!(args.get_as::<u8>(0), Some(&7));
        assert_eq!(args.get_as::<String>(1).map(String::as_str), Some("payload"));
        assert_eq!(args.get_as::<u8>(1), None);
    }
}
