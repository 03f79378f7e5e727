//! 过期上传密钥的后台清理任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::KEY_PRUNE_INTERVAL_SECS;
use crate::keys::KeyStore;

/// 启动后台任务；未配置密钥有效期时不启动。
pub fn spawn_background_tasks(keys: Arc<KeyStore>) {
    let Some(ttl) = keys.ttl() else {
        debug!("upload keys never expire, prune task disabled");
        return;
    };
    let period = ttl.min(Duration::from_secs(KEY_PRUNE_INTERVAL_SECS));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let pruned = keys.prune_expired();
            if pruned > 0 {
                info!(pruned, remaining = keys.len(), "pruned expired upload keys");
            }
        }
    });
}
