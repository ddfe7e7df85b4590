#![allow(dead_code)]

use stencil::Value;

/// 测试日志输出到 cargo test 捕获的缓冲区，RUST_LOG 控制级别
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn ctx(json: serde_json::Value) -> Value {
    Value::from(json)
}
