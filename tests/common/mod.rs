//! 测试辅助工具模块
//! Test utilities module

#![allow(dead_code)]

use tracing_subscriber::EnvFilter;

/// 按环境变量初始化日志订阅者，重复调用安全
/// Initialize the tracing subscriber from the environment, safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
