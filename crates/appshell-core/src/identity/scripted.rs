//! In-process identity service that replays queued replies.
//!
//! Used by tests and by the daemon's offline mode. Replies are consumed in
//! FIFO order; once the queue is empty the fallback reply is returned. A
//! successful logout switches the fallback to a rejected reply, the way a
//! real backend forgets the session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::error::IdentityError;
use super::types::{CurrentUserResponse, Identity};
use super::IdentityService;

type CurrentUserReply = Result<CurrentUserResponse, IdentityError>;

struct Scripted<T> {
    reply: T,
    delay: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ScriptedIdentityService {
    current_user: Mutex<VecDeque<Scripted<CurrentUserReply>>>,
    fallback: Mutex<CurrentUserReply>,
    logout: Mutex<VecDeque<Scripted<Result<(), IdentityError>>>>,
    current_user_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl ScriptedIdentityService {
    /// A service with no session: every lookup is rejected.
    pub fn new() -> Self {
        Self::with_fallback(Ok(CurrentUserResponse::rejected()))
    }

    /// A service that reports `identity` as signed in until logout.
    pub fn signed_in(identity: Identity) -> Self {
        Self::with_fallback(Ok(CurrentUserResponse::authenticated(identity)))
    }

    fn with_fallback(fallback: CurrentUserReply) -> Self {
        Self {
            current_user: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            logout: Mutex::new(VecDeque::new()),
            current_user_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    /// Queue the reply for the next current-user lookup.
    pub fn push_current_user(&self, reply: CurrentUserReply) -> &Self {
        lock(&self.current_user).push_back(Scripted { reply, delay: None });
        self
    }

    /// Queue a reply that takes `delay` to arrive.
    pub fn push_current_user_delayed(&self, reply: CurrentUserReply, delay: Duration) -> &Self {
        lock(&self.current_user).push_back(Scripted {
            reply,
            delay: Some(delay),
        });
        self
    }

    /// Queue the outcome of the next logout call.
    pub fn push_logout(&self, result: Result<(), IdentityError>) -> &Self {
        lock(&self.logout).push_back(Scripted {
            reply: result,
            delay: None,
        });
        self
    }

    /// Queue a logout outcome that takes `delay` to arrive.
    pub fn push_logout_delayed(
        &self,
        result: Result<(), IdentityError>,
        delay: Duration,
    ) -> &Self {
        lock(&self.logout).push_back(Scripted {
            reply: result,
            delay: Some(delay),
        });
        self
    }

    pub fn current_user_calls(&self) -> usize {
        self.current_user_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityService for ScriptedIdentityService {
    async fn get_current_user(&self) -> Result<CurrentUserResponse, IdentityError> {
        self.current_user_calls.fetch_add(1, Ordering::SeqCst);

        let next = lock(&self.current_user).pop_front();
        match next {
            Some(Scripted { reply, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                reply
            }
            None => lock(&self.fallback).clone(),
        }
    }

    async fn logout(&self) -> Result<(), IdentityError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);

        let next = lock(&self.logout).pop_front();
        let result = match next {
            Some(Scripted { reply, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                reply
            }
            None => Ok(()),
        };

        if result.is_ok() {
            *lock(&self.fallback) = Ok(CurrentUserResponse::rejected());
        }
        result
    }
}
