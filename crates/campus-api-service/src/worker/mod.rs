//! 后台 Worker 模块

mod push_worker;

pub use push_worker::{HttpPushSender, LogPushSender, PushSender, PushWorker};
