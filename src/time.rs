//! 墙钟时间工具，过期时间统一用 Unix 毫秒时间戳

use std::time::{SystemTime, UNIX_EPOCH};

/// 当前 Unix 时间（毫秒）
#[inline]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// 剩余毫秒数，已过期返回 0
#[inline]
pub fn remaining_ms(expire_at_ms: i64) -> i64 {
    (expire_at_ms - now_ms()).max(0)
}

/// 毫秒换算成秒，四舍五入
#[inline]
pub fn round_secs(ms: i64) -> i64 {
    (ms as f64 / 1000.0).round() as i64
}
