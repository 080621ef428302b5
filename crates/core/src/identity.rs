//! Identity provider seam
//!
//! Authentication lives outside the engine; it only needs to know who is
//! acting.

use std::sync::{PoisonError, RwLock};

use uuid::Uuid;

use crate::error::{Error, Result};

pub trait Identity: Send + Sync {
    /// The signed-in user, `NotAuthenticated` without a session
    fn current_user_id(&self) -> Result<Uuid>;
}

/// A client-local session holding the signed-in user
#[derive(Debug, Default)]
pub struct LocalSession {
    user_id: RwLock<Option<Uuid>>,
}

impl LocalSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: Uuid) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id)),
        }
    }

    pub fn sign_in(&self, user_id: Uuid) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = Some(user_id);
    }

    pub fn sign_out(&self) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Identity for LocalSession {
    fn current_user_id(&self) -> Result<Uuid> {
        let slot = *self.user_id.read().unwrap_or_else(PoisonError::into_inner);
        slot.ok_or(Error::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let session = LocalSession::new();
        assert!(matches!(
            session.current_user_id(),
            Err(Error::NotAuthenticated)
        ));

        let user = Uuid::new_v4();
        session.sign_in(user);
        assert_eq!(session.current_user_id().unwrap(), user);

        session.sign_out();
        assert!(session.current_user_id().is_err());
    }

    #[test]
    fn test_poisoned_session_still_signs_out() {
        let session = std::sync::Arc::new(LocalSession::signed_in(Uuid::new_v4()));

        let holder = session.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.user_id.write().unwrap();
            panic!("poison the session lock");
        })
        .join();
        assert!(session.user_id.is_poisoned());

        session.sign_out();
        assert!(matches!(
            session.current_user_id(),
            Err(Error::NotAuthenticated)
        ));

        let user = Uuid::new_v4();
        session.sign_in(user);
        assert_eq!(session.current_user_id().unwrap(), user);
    }
}
