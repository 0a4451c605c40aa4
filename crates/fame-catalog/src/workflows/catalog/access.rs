use std::collections::BTreeSet;

use super::domain::UserId;

/// Caller is not on the admin allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("user {0} is not an administrator")]
pub struct Unauthorized(pub UserId);

/// Proof that an identity passed the admin check. Only [`AdminRoster::authorize`] creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminCapability {
    admin: UserId,
}

impl AdminCapability {
    pub fn admin(&self) -> UserId {
        self.admin
    }
}

/// Static allow-list of admin identities.
#[derive(Debug, Clone, Default)]
pub struct AdminRoster {
    admins: BTreeSet<UserId>,
}

impl AdminRoster {
    pub fn new(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, id: UserId) -> bool {
        self.admins.contains(&id)
    }

    pub fn authorize(&self, id: UserId) -> Result<AdminCapability, Unauthorized> {
        if self.is_admin(id) {
            Ok(AdminCapability { admin: id })
        } else {
            Err(Unauthorized(id))
        }
    }

    pub fn admins(&self) -> impl Iterator<Item = UserId> + '_ {
        self.admins.iter().copied()
    }
}
