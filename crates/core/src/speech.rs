//! Spoken output: the player seam, a status notifier with explicit lifecycle,
//! and the text cleanup applied before synthesis.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Plays assistant text aloud. Starting a new utterance stops the current one.
#[async_trait]
pub trait SpeechPlayer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<()>;

    fn stop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechStatus {
    pub is_loading: bool,
    pub is_speaking: bool,
}

impl SpeechStatus {
    pub const IDLE: Self = Self {
        is_loading: false,
        is_speaking: false,
    };
    pub const LOADING: Self = Self {
        is_loading: true,
        is_speaking: false,
    };
    pub const SPEAKING: Self = Self {
        is_loading: false,
        is_speaking: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct Subscription {
    pub id: SubscriptionId,
    pub updates: UnboundedReceiver<SpeechStatus>,
}

#[derive(Default)]
struct NotifierInner {
    status: SpeechStatus,
    next_id: u64,
    subscribers: HashMap<SubscriptionId, UnboundedSender<SpeechStatus>>,
    shut_down: bool,
}

/// Shared speech status. Owned by whoever builds the player and handed out by
/// reference, so its lifetime is explicit: after `shutdown` every subscriber's
/// stream ends and new subscriptions are refused.
#[derive(Default)]
pub struct SpeechNotifier {
    inner: Mutex<NotifierInner>,
}

impl SpeechNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NotifierInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a listener. The current status is delivered immediately.
    pub fn subscribe(&self) -> Option<Subscription> {
        let mut inner = self.lock();
        if inner.shut_down {
            return None;
        }
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(inner.status);
        inner.subscribers.insert(id, tx);
        Some(Subscription { id, updates: rx })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().subscribers.remove(&id);
    }

    pub fn set(&self, status: SpeechStatus) {
        let mut inner = self.lock();
        if inner.shut_down {
            return;
        }
        inner.status = status;
        // drop listeners whose receiver is gone
        inner.subscribers.retain(|_, tx| tx.send(status).is_ok());
    }

    pub fn status(&self) -> SpeechStatus {
        self.lock().status
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn shutdown(&self) {
        let mut inner = self.lock();
        inner.shut_down = true;
        inner.status = SpeechStatus::IDLE;
        inner.subscribers.clear();
        tracing::debug!("Speech notifier shut down");
    }
}

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid pattern {pattern}: {e}")),
        replacement,
    }
}

// Code blocks go before inline code, otherwise the backtick rule eats the fences.
static CLEANUP_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"\$\$[\s\S]*?\$\$", " math expression "),
        rule(r"\$[^$]*?\$", " math "),
        rule(r"```[\s\S]*?```", " code block "),
        rule(r"\*\*(.*?)\*\*", "${1}"),
        rule(r"\*(.*?)\*", "${1}"),
        rule(r"`(.*?)`", "${1}"),
        rule(r"#{1,6}\s+(.*)", "${1}"),
        rule(r"\s+", " "),
    ]
});

/// Strips LaTeX and markdown so the synthesizer reads prose.
pub fn clean_text_for_speech(text: &str) -> String {
    let mut cleaned = text.to_string();
    for rule in CLEANUP_RULES.iter() {
        cleaned = rule
            .pattern
            .replace_all(&cleaned, rule.replacement)
            .into_owned();
    }
    cleaned.trim().to_string()
}
