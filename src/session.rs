//! Explicitly passed session context and route guards.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::cache::PersistentCache;

/// Cache key the session is persisted under.
const SESSION_KEY: &str = "session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
  #[serde(rename = "Менеджер", alias = "manager")]
  Manager,
  #[serde(rename = "Сотрудник", alias = "employee")]
  Employee,
}

impl Role {
  pub fn label(self) -> &'static str {
    match self {
      Self::Manager => "manager",
      Self::Employee => "employee",
    }
  }
}

/// Credentials obtained at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub token: String,
  #[serde(default)]
  pub role: Option<Role>,
  #[serde(default)]
  pub username: Option<String>,
}

impl Session {
  pub fn is_manager(&self) -> bool {
    self.role == Some(Role::Manager)
  }
}

/// What a view needs from the session before it may be shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
  Authenticated,
  Manager,
}

/// Where a guard sends the user instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
  Login { session_expired: bool },
  Forbidden,
}

struct SessionInner {
  current: RwLock<Option<Session>>,
  expired: AtomicBool,
  store: Option<PersistentCache>,
}

/// Shared handle to the current session.
///
/// Handed to the API client and the view guards instead of being read from
/// ambient state.
#[derive(Clone)]
pub struct SessionContext {
  inner: Arc<SessionInner>,
}

impl SessionContext {
  /// In-memory session that is never persisted.
  pub fn new(session: Option<Session>) -> Self {
    Self::build(session, None)
  }

  /// Load the persisted session, if any, and persist future changes.
  pub fn persisted(store: PersistentCache) -> Self {
    let session = match store.get::<Session>(SESSION_KEY) {
      Ok(session) => session,
      Err(e) => {
        warn!(error = %e, "failed to load persisted session");
        None
      }
    };
    Self::build(session, Some(store))
  }

  fn build(session: Option<Session>, store: Option<PersistentCache>) -> Self {
    Self {
      inner: Arc::new(SessionInner {
        current: RwLock::new(session),
        expired: AtomicBool::new(false),
        store,
      }),
    }
  }

  pub fn current(&self) -> Option<Session> {
    self.inner.current.read().ok().and_then(|s| s.clone())
  }

  pub fn token(&self) -> Option<String> {
    self.current().map(|s| s.token)
  }

  pub fn role(&self) -> Option<Role> {
    self.current().and_then(|s| s.role)
  }

  pub fn username(&self) -> Option<String> {
    self.current().and_then(|s| s.username)
  }

  pub fn is_manager(&self) -> bool {
    self.current().is_some_and(|s| s.is_manager())
  }

  pub fn is_expired(&self) -> bool {
    self.inner.expired.load(Ordering::SeqCst)
  }

  /// Install a freshly obtained session and persist it.
  pub fn establish(&self, session: Session) {
    info!(username = ?session.username, "session established");
    if let Some(store) = &self.inner.store {
      if let Err(e) = store.set(SESSION_KEY, &session) {
        warn!(error = %e, "failed to persist session");
      }
    }
    if let Ok(mut current) = self.inner.current.write() {
      *current = Some(session);
    }
    self.inner.expired.store(false, Ordering::SeqCst);
  }

  /// Tear the session down after the server rejected it.
  ///
  /// Only the first caller performs the teardown and gets `true`; concurrent
  /// 401 responses racing here are no-ops.
  pub fn expire(&self) -> bool {
    if self
      .inner
      .expired
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      return false;
    }

    warn!("session expired, clearing credentials");
    self.clear();
    true
  }

  /// Forget the session voluntarily.
  pub fn logout(&self) {
    info!("logging out");
    self.clear();
  }

  fn clear(&self) {
    if let Ok(mut current) = self.inner.current.write() {
      *current = None;
    }
    if let Some(store) = &self.inner.store {
      if let Err(e) = store.remove(SESSION_KEY) {
        warn!(error = %e, "failed to remove persisted session");
      }
    }
  }

  /// Check whether the current session grants `access`.
  pub fn authorize(&self, access: Access) -> Result<(), Redirect> {
    let Some(session) = self.current() else {
      return Err(Redirect::Login {
        session_expired: self.is_expired(),
      });
    };

    match access {
      Access::Authenticated => Ok(()),
      Access::Manager if session.is_manager() => Ok(()),
      Access::Manager => Err(Redirect::Forbidden),
    }
  }
}

impl std::fmt::Debug for SessionContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SessionContext")
      .field("username", &self.username())
      .field("role", &self.role())
      .field("expired", &self.is_expired())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;

  fn manager() -> Session {
    Session {
      token: "t0k3n".to_string(),
      role: Some(Role::Manager),
      username: Some("boss".to_string()),
    }
  }

  #[test]
  fn test_role_wire_names() {
    let role: Role = serde_json::from_str(r#""Менеджер""#).unwrap();
    assert_eq!(role, Role::Manager);
    let role: Role = serde_json::from_str(r#""employee""#).unwrap();
    assert_eq!(role, Role::Employee);
  }

  #[test]
  fn test_expire_clears_exactly_once() {
    let ctx = SessionContext::new(Some(manager()));
    let handles: Vec<_> = (0..8)
      .map(|_| {
        let ctx = ctx.clone();
        std::thread::spawn(move || ctx.expire())
      })
      .collect();

    let winners = handles
      .into_iter()
      .map(|h| h.join().unwrap())
      .filter(|won| *won)
      .count();

    assert_eq!(winners, 1);
    assert!(ctx.is_expired());
    assert!(ctx.token().is_none());
  }

  #[test]
  fn test_establish_resets_expiry() {
    let ctx = SessionContext::new(Some(manager()));
    assert!(ctx.expire());
    ctx.establish(manager());
    assert!(!ctx.is_expired());
    assert!(ctx.expire());
  }

  #[test]
  fn test_guards() {
    let ctx = SessionContext::new(None);
    assert_eq!(
      ctx.authorize(Access::Authenticated),
      Err(Redirect::Login {
        session_expired: false
      })
    );

    ctx.establish(Session {
      token: "t".to_string(),
      role: Some(Role::Employee),
      username: None,
    });
    assert_eq!(ctx.authorize(Access::Authenticated), Ok(()));
    assert_eq!(ctx.authorize(Access::Manager), Err(Redirect::Forbidden));

    ctx.establish(manager());
    assert_eq!(ctx.authorize(Access::Manager), Ok(()));

    ctx.expire();
    assert_eq!(
      ctx.authorize(Access::Authenticated),
      Err(Redirect::Login {
        session_expired: true
      })
    );
  }

  #[test]
  fn test_session_is_persisted_and_cleared() {
    let store = PersistentCache::new(SqliteStorage::open_in_memory().unwrap());
    let ctx = SessionContext::persisted(store.clone());
    assert_eq!(ctx.current(), None);

    ctx.establish(manager());
    let reloaded = SessionContext::persisted(store.clone());
    assert_eq!(reloaded.current(), Some(manager()));

    reloaded.expire();
    assert_eq!(store.get::<Session>(SESSION_KEY).unwrap(), None);
  }
}
