//! The single definition of who may act on an owned resource.

use crate::error::{Error, Result};
use crate::model::{common::PersonId, mongodb::Id};

/// Is `requester_id` allowed to act on a resource owned by `owner_id`?
///
/// Administrators may act on anything; everyone else only on what they own.
pub fn authorize(requester_id: PersonId, owner_id: PersonId, acting_as_admin: bool) -> bool {
    acting_as_admin || requester_id == owner_id
}

/// An already-authenticated requester.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Requester {
    pub id: PersonId,
    pub admin: bool,
}

impl Requester {
    pub fn user(id: PersonId) -> Self {
        Self { id, admin: false }
    }

    pub fn admin(id: PersonId) -> Self {
        Self { id, admin: true }
    }

    /// The reconciler itself. It acts system-wide, so it has admin rights.
    pub fn system() -> Self {
        Self::admin(Id::nil())
    }

    pub fn may_access(&self, owner_id: PersonId) -> bool {
        authorize(self.id, owner_id, self.admin)
    }

    /// Fail with [`Error::AccessDenied`] unless the requester may access `what`.
    pub fn ensure_access(&self, owner_id: PersonId, what: &str) -> Result<()> {
        if self.may_access(owner_id) {
            Ok(())
        } else {
            Err(Error::AccessDenied(format!(
                "{} may not access {what}",
                self.id
            )))
        }
    }
}
