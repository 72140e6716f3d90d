//! Authorization policy
//!
//! Every control command is checked through [`evaluate`]. The handler never
//! branches on roles itself.

use herald_common::{CompanyId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    SuperAdmin,
    Manager,
    Employee,
}

/// The identity a control request acts on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user: UserId,
    pub role: Role,
    pub company: Option<CompanyId>,
}

impl Requester {
    #[must_use]
    pub fn new(user: impl Into<UserId>, role: Role, company: Option<&str>) -> Self {
        Self {
            user: user.into(),
            role,
            company: company.map(CompanyId::from),
        }
    }

    fn same_company(&self, company: Option<&CompanyId>) -> bool {
        self.company.is_some() && self.company.as_ref() == company
    }
}

/// Something a requester wants to act on
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    /// An existing delivery record
    Delivery {
        created_by: &'a UserId,
        company: Option<&'a CompanyId>,
    },
    /// The delivery collection as a whole: creating, sweeping
    DeliveryQueue,
    /// One user's notification inbox
    Inbox { owner: &'a UserId },
    /// Sending notifications to other users
    Broadcast,
}

/// What a requester may do with a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    Denied,
    View,
    Manage,
}

impl Capability {
    #[must_use]
    pub const fn can_view(self) -> bool {
        matches!(self, Self::View | Self::Manage)
    }

    #[must_use]
    pub const fn can_manage(self) -> bool {
        matches!(self, Self::Manage)
    }
}

/// Decide what `requester` may do with `resource`
///
/// - A super-admin manages everything.
/// - A manager manages deliveries of their own company, and may broadcast.
/// - Creators manage their own deliveries; colleagues in the same company
///   may view them.
/// - Inboxes belong to their owner.
#[must_use]
pub fn evaluate(requester: &Requester, resource: Resource<'_>) -> Capability {
    if requester.role == Role::SuperAdmin {
        return Capability::Manage;
    }

    match resource {
        Resource::Delivery {
            created_by,
            company,
        } => {
            if created_by == &requester.user
                || (requester.role == Role::Manager && requester.same_company(company))
            {
                Capability::Manage
            } else if requester.same_company(company) {
                Capability::View
            } else {
                Capability::Denied
            }
        }
        Resource::DeliveryQueue => match requester.role {
            Role::Manager => Capability::Manage,
            _ => Capability::View,
        },
        Resource::Inbox { owner } if owner == &requester.user => Capability::Manage,
        Resource::Broadcast if requester.role == Role::Manager => Capability::Manage,
        Resource::Inbox { .. } | Resource::Broadcast => Capability::Denied,
    }
}

/// Which deliveries a requester can see in listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Company(CompanyId),
    Own(UserId),
}

#[must_use]
pub fn scope(requester: &Requester) -> Scope {
    match (requester.role, &requester.company) {
        (Role::SuperAdmin, _) => Scope::All,
        (_, Some(company)) => Scope::Company(company.clone()),
        (_, None) => Scope::Own(requester.user.clone()),
    }
}
