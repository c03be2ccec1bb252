use crate::clock::Clock;
use lru::LruCache;
use serenity::all::UserId;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

struct Session {
    history: Vec<ChatTurn>,
    expires_at: Instant,
}

/// Per-user AI conversation history. Idle sessions expire after `ttl`;
/// the least recently used session is dropped once `capacity` is reached.
pub struct ChatSessions {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    max_turns: usize,
    sessions: Mutex<LruCache<UserId, Session>>,
}

impl ChatSessions {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration, max_turns: usize, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            clock,
            ttl,
            max_turns,
            sessions: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Returns the live history for `user_id` and extends its expiry.
    pub fn history(&self, user_id: UserId) -> Vec<ChatTurn> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        match sessions.get_mut(&user_id) {
            Some(session) if session.expires_at > now => {
                session.expires_at = now + self.ttl;
                session.history.clone()
            }
            Some(_) => {
                sessions.pop(&user_id);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Appends one exchange, keeping only the most recent `max_turns` exchanges.
    pub fn record(&self, user_id: UserId, question: &str, answer: &str) {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        let expired = sessions
            .peek(&user_id)
            .is_some_and(|s| s.expires_at <= now);
        if expired {
            sessions.pop(&user_id);
        }

        let session = sessions.get_or_insert_mut(user_id, || Session {
            history: Vec::new(),
            expires_at: now,
        });
        session.history.push(ChatTurn {
            role: Role::User,
            content: question.to_string(),
        });
        session.history.push(ChatTurn {
            role: Role::Assistant,
            content: answer.to_string(),
        });

        let keep = self.max_turns.saturating_mul(2);
        if session.history.len() > keep {
            let excess = session.history.len() - keep;
            session.history.drain(..excess);
        }
        session.expires_at = now + self.ttl;
    }

    /// Clears the session. Returns false when there was no live session.
    pub fn reset(&self, user_id: UserId) -> bool {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .pop(&user_id)
            .is_some_and(|s| s.expires_at > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn sessions(clock: Arc<ManualClock>) -> ChatSessions {
        ChatSessions::new(clock, Duration::from_secs(7200), 2, 10)
    }

    #[test]
    fn test_history_accumulates() {
        let clock = Arc::new(ManualClock::new());
        let sessions = sessions(clock);
        let user = UserId::new(1);

        assert!(sessions.history(user).is_empty());
        sessions.record(user, "hi", "hello");

        let history = sessions.history(user);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "hello");
    }

    #[test]
    fn test_history_is_trimmed() {
        let clock = Arc::new(ManualClock::new());
        let sessions = sessions(clock);
        let user = UserId::new(1);

        for i in 0..3 {
            sessions.record(user, &format!("q{}", i), &format!("a{}", i));
        }
        let history = sessions.history(user);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "q1");
    }

    #[test]
    fn test_session_expires_when_idle() {
        let clock = Arc::new(ManualClock::new());
        let sessions = sessions(clock.clone());
        let user = UserId::new(1);

        sessions.record(user, "hi", "hello");
        clock.advance(Duration::from_secs(7000));
        // Reading extends the session.
        assert_eq!(sessions.history(user).len(), 2);

        clock.advance(Duration::from_secs(7000));
        assert_eq!(sessions.history(user).len(), 2);

        clock.advance(Duration::from_secs(7201));
        assert!(sessions.history(user).is_empty());
    }

    #[test]
    fn test_reset() {
        let clock = Arc::new(ManualClock::new());
        let sessions = sessions(clock);
        let user = UserId::new(1);

        assert!(!sessions.reset(user));
        sessions.record(user, "hi", "hello");
        assert!(sessions.reset(user));
        assert!(sessions.history(user).is_empty());
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let clock = Arc::new(ManualClock::new());
        let sessions = ChatSessions::new(clock, Duration::from_secs(60), 5, 2);

        sessions.record(UserId::new(1), "a", "b");
        sessions.record(UserId::new(2), "a", "b");
        sessions.history(UserId::new(1));
        sessions.record(UserId::new(3), "a", "b");

        assert!(sessions.history(UserId::new(2)).is_empty());
        assert_eq!(sessions.history(UserId::new(1)).len(), 2);
    }
}
