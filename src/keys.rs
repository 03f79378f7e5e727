//! 一次性上传密钥的内存存储。
//!
//! 上传开始时密钥被“租出”：从有效集合移入占用集合，同一密钥的并发请求
//! 因此只能有一个通过校验。上传成功后租约被消费；失败或请求被中途丢弃时，
//! 密钥回到有效集合，可再次使用。

use rand::Rng;
use rand::distr::Alphanumeric;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::ACCESS_KEY_LEN;

#[derive(Debug)]
pub struct KeyStore {
    state: Mutex<KeyState>,
    ttl: Option<Duration>,
}

#[derive(Debug, Default)]
struct KeyState {
    valid: HashMap<String, Instant>,
    leased: HashSet<String>,
}

impl KeyStore {
    /// 创建密钥存储；`ttl` 为零表示密钥永不过期。
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(KeyState::default()),
            ttl: (!ttl.is_zero()).then_some(ttl),
        }
    }

    fn state(&self) -> MutexGuard<'_, KeyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 生成并登记一个新的访问密钥。
    pub fn issue(&self) -> String {
        let mut state = self.state();
        let key = loop {
            let candidate = generate_key();
            if !state.valid.contains_key(&candidate) && !state.leased.contains(&candidate) {
                break candidate;
            }
        };
        state.valid.insert(key.clone(), Instant::now());
        key
    }

    /// 原子地占用密钥。密钥无效、已过期或已被其他请求占用时返回 `None`。
    pub fn lease(self: &Arc<Self>, key: &str) -> Option<KeyLease> {
        let mut state = self.state();
        let issued_at = state.valid.remove(key)?;
        if self.is_expired(issued_at, Instant::now()) {
            debug!("upload key expired");
            return None;
        }
        state.leased.insert(key.to_string());
        Some(KeyLease {
            store: Arc::clone(self),
            key: key.to_string(),
            issued_at,
            consumed: false,
        })
    }

    /// 有效（未占用）密钥数量。
    pub fn len(&self) -> usize {
        self.state().valid.len()
    }

    /// 清理过期密钥，返回清理数量。
    pub fn prune_expired(&self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let now = Instant::now();
        let mut state = self.state();
        let before = state.valid.len();
        state
            .valid
            .retain(|_, issued_at| now.duration_since(*issued_at) < ttl);
        before - state.valid.len()
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn is_expired(&self, issued_at: Instant, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.duration_since(issued_at) >= ttl)
    }

    fn release(&self, key: &str, issued_at: Instant) {
        let mut state = self.state();
        if state.leased.remove(key) {
            state.valid.insert(key.to_string(), issued_at);
        }
    }

    fn finish(&self, key: &str) {
        self.state().leased.remove(key);
    }
}

#[cfg(test)]
impl KeyStore {
    /// 判断密钥当前是否可用（未被占用且未过期）。
    pub fn contains(&self, key: &str) -> bool {
        let state = self.state();
        match state.valid.get(key) {
            Some(issued_at) => !self.is_expired(*issued_at, Instant::now()),
            None => false,
        }
    }
}

/// 已占用的密钥。未调用 [`KeyLease::consume`] 就被丢弃时，密钥归还给存储。
#[derive(Debug)]
pub struct KeyLease {
    store: Arc<KeyStore>,
    key: String,
    issued_at: Instant,
    consumed: bool,
}

impl KeyLease {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 上传成功：永久作废该密钥。
    pub fn consume(mut self) {
        self.consumed = true;
        self.store.finish(&self.key);
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        if !self.consumed {
            self.store.release(&self.key, self.issued_at);
        }
    }
}

fn generate_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ACCESS_KEY_LEN)
        .map(char::from)
        .collect()
}
