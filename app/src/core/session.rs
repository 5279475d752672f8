//! Session context: the current user plus auth loading/error state.
//!
//! Every write to the user slot goes through one channel to a single
//! applier task. Writes are stamped from a monotonic counter when their
//! backend response (or pushed event) is received; the applier drops any
//! write stamped older than the last one it applied. A sign-in that
//! resolves late therefore cannot clobber a newer pushed sign-out, and
//! vice versa.

use crate::core::backend::{AuthEvent, Backend, BackendError, Credentials};
use crate::core::guard::{Navigation, ROOT_PATH};
use crate::core::models::{Session, User};
use crate::core::status::{Status, StatusTracker};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Where confirmation emails send new accounts.
    pub email_redirect_to: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: Option<User>,
    pub session: Option<Session>,
    pub needs_email_confirmation: bool,
}

/// What the user slot holds. `resolved` stays false until the first write,
/// which distinguishes "not yet known" from "anonymous".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentUser {
    user: Option<User>,
    stamp: u64,
    resolved: bool,
}

impl CurrentUser {
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

#[derive(Debug, Clone, Copy)]
enum UpdateSource {
    Initialize,
    SignIn,
    SignOut,
    Fetch,
    Event,
}

struct UserUpdate {
    stamp: u64,
    user: Option<User>,
    source: UpdateSource,
    ack: Option<oneshot::Sender<bool>>,
}

#[derive(Clone)]
struct Writer {
    tx: mpsc::UnboundedSender<UserUpdate>,
    stamps: Arc<AtomicU64>,
}

impl Writer {
    fn stamp(&self) -> u64 {
        self.stamps.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct SessionStore {
    backend: Arc<dyn Backend>,
    current: Arc<watch::Sender<CurrentUser>>,
    writer: Writer,
    status: StatusTracker<AuthError>,
    listening: AtomicBool,
    options: SessionOptions,
}

impl SessionStore {
    /// Spawns the applier task, so this must run inside a Tokio runtime.
    pub fn new(backend: Arc<dyn Backend>, options: SessionOptions) -> Self {
        let (current, _rx) = watch::channel(CurrentUser::default());
        let current = Arc::new(current);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(apply_updates(rx, Arc::clone(&current)));

        Self {
            backend,
            current,
            writer: Writer {
                tx,
                stamps: Arc::new(AtomicU64::new(0)),
            },
            status: StatusTracker::new(),
            listening: AtomicBool::new(false),
            options,
        }
    }

    /// Resolves the persisted session and starts following backend auth
    /// events. Runs once; later calls return the current user unchanged.
    pub async fn initialize(&self) -> Option<User> {
        if self.listening.swap(true, Ordering::SeqCst) {
            warn!("session store already initialized");
            return self.user();
        }

        let op = self.status.begin();

        // Subscribe first so nothing pushed during the fetch is missed.
        let events = self.backend.on_auth_state_change();
        tokio::spawn(forward_events(events, self.writer.clone()));

        let user = match self.backend.get_session().await {
            Ok(session) => session.map(|s| s.user),
            Err(e) => {
                error!(error = %e, "Error initializing auth");
                op.fail(&AuthError::from(e));
                None
            }
        };

        if let Err(e) = self.commit(user, UpdateSource::Initialize).await {
            op.fail(&e);
        }

        let user = self.user();
        info!(authenticated = user.is_some(), "session initialized");
        user
    }

    /// Creates an account. The store's user is left alone: an account
    /// waiting for email confirmation is not signed in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let op = self.status.begin();
        let credentials = Credentials::new(email, password);

        let result = self
            .backend
            .sign_up(&credentials, self.options.email_redirect_to.as_deref())
            .await
            .map(|resp| SignUpOutcome {
                needs_email_confirmation: resp.session.is_none(),
                user: resp.user,
                session: resp.session,
            })
            .map_err(|e| {
                error!(error = %e, "Error signing up");
                AuthError::from(e)
            });

        op.finish(result)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let op = self.status.begin();
        let credentials = Credentials::new(email, password);

        let result: Result<User, AuthError> = async {
            let session = self.backend.sign_in_with_password(&credentials).await?;
            let user = session.user;
            self.commit(Some(user.clone()), UpdateSource::SignIn).await?;
            Ok(user)
        }
        .await;

        if let Err(e) = &result {
            error!(error = %e, "Error signing in");
        }
        op.finish(result)
    }

    /// Ends the session and asks for a full reload of the root page.
    pub async fn sign_out(&self) -> Result<Navigation, AuthError> {
        let op = self.status.begin();

        let result: Result<Navigation, AuthError> = async {
            self.backend.sign_out().await?;
            self.commit(None, UpdateSource::SignOut).await?;
            Ok(Navigation::reload(ROOT_PATH))
        }
        .await;

        if let Err(e) = &result {
            error!(error = %e, "Error signing out");
        }
        op.finish(result)
    }

    /// Re-fetches the user from the backend and stores the answer.
    /// Transport failures leave the current user in place.
    pub async fn get_user(&self) -> Result<Option<User>, AuthError> {
        let op = self.status.begin();

        let result: Result<Option<User>, AuthError> = async {
            let user = self.backend.get_user().await?;
            self.commit(user.clone(), UpdateSource::Fetch).await?;
            Ok(user)
        }
        .await;

        if let Err(e) = &result {
            warn!(error = %e, "Error fetching user");
        }
        op.finish(result)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.borrow().user.is_some()
    }

    pub fn user(&self) -> Option<User> {
        self.current.borrow().user.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.current.borrow().resolved
    }

    pub fn status(&self) -> Status<AuthError> {
        self.status.snapshot()
    }

    pub fn loading(&self) -> bool {
        self.status.loading()
    }

    pub fn error(&self) -> Option<AuthError> {
        self.status.error()
    }

    pub fn subscribe(&self) -> watch::Receiver<CurrentUser> {
        self.current.subscribe()
    }

    /// Stamps `user` now and waits for the applier's verdict.
    async fn commit(&self, user: Option<User>, source: UpdateSource) -> Result<bool, AuthError> {
        let stamp = self.writer.stamp();
        self.submit(stamp, user, source).await
    }

    async fn submit(
        &self,
        stamp: u64,
        user: Option<User>,
        source: UpdateSource,
    ) -> Result<bool, AuthError> {
        let (ack, verdict) = oneshot::channel();
        let update = UserUpdate {
            stamp,
            user,
            source,
            ack: Some(ack),
        };
        self.writer
            .tx
            .send(update)
            .map_err(|_| AuthError::Unavailable("session applier stopped".into()))?;
        verdict
            .await
            .map_err(|_| AuthError::Unavailable("session applier dropped update".into()))
    }
}

async fn apply_updates(
    mut rx: mpsc::UnboundedReceiver<UserUpdate>,
    current: Arc<watch::Sender<CurrentUser>>,
) {
    while let Some(update) = rx.recv().await {
        let UserUpdate {
            stamp,
            user,
            source,
            ack,
        } = update;

        let mut accepted = false;
        current.send_if_modified(|slot| {
            if stamp < slot.stamp {
                return false;
            }
            accepted = true;
            let changed = !slot.resolved || slot.user != user;
            slot.stamp = stamp;
            slot.user = user;
            slot.resolved = true;
            changed
        });

        if accepted {
            debug!(stamp, ?source, "session user updated");
        } else {
            debug!(stamp, ?source, "dropping stale session update");
        }
        if let Some(ack) = ack {
            let _ = ack.send(accepted);
        }
    }
}

async fn forward_events(mut events: broadcast::Receiver<AuthEvent>, writer: Writer) {
    loop {
        match events.recv().await {
            Ok(event) => {
                debug!(kind = ?event.kind, "auth state change");
                let update = UserUpdate {
                    stamp: writer.stamp(),
                    user: event.user(),
                    source: UpdateSource::Event,
                    ack: None,
                };
                if writer.tx.send(update).is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "auth events lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
