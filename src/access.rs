//! Role and ownership checks shared by every route handler.
//!
//! Handlers first resolve the target record (a missing record is `NotFound`),
//! then call into this module before any store mutation or image upload.

use uuid::Uuid;

use crate::{auth::AuthUser, error::AppError, models::Car, models::Role};

/// A resource with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> Uuid;
}

impl Owned for Car {
    fn owner_id(&self) -> Uuid {
        self.seller_id
    }
}

/// Actions on an owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Replace fields and append images.
    Edit,
    /// Remove the record and its images.
    Delete,
    /// Change only the lifecycle status (sold, pending, ...).
    ModerateStatus,
}

/// Whether `identity` may perform `capability` on `resource`.
pub fn permits<R: Owned>(identity: &AuthUser, capability: Capability, resource: &R) -> bool {
    let is_owner = identity.id == resource.owner_id();

    match (identity.role, capability) {
        (Role::Seller, _) => is_owner,
        // Moderation: admins may change status only.
        (Role::Admin, Capability::ModerateStatus) => true,
        (Role::Admin, Capability::Edit | Capability::Delete) => false,
        (Role::Buyer, _) => false,
    }
}

/// Fails with `Forbidden` unless `permits` holds.
pub fn authorize<R: Owned>(
    identity: &AuthUser,
    capability: Capability,
    resource: &R,
) -> Result<(), AppError> {
    if permits(identity, capability, resource) {
        Ok(())
    } else {
        tracing::info!(
            user_id = %identity.id,
            role = %identity.role,
            ?capability,
            "Denied access to resource owned by {}",
            resource.owner_id()
        );
        Err(AppError::Forbidden("User not authorized".to_string()))
    }
}

/// Fails with `Forbidden` unless the identity holds exactly `required`.
pub fn require_role(identity: &AuthUser, required: Role) -> Result<(), AppError> {
    if identity.role == required {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Access denied: {} role required",
            required
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_owned_by(owner: Uuid) -> Car {
        Car {
            seller_id: owner,
            ..Car::default()
        }
    }

    fn identity(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_owner_seller_has_every_capability() {
        let seller = identity(Role::Seller);
        let car = listing_owned_by(seller.id);

        for cap in [Capability::Edit, Capability::Delete, Capability::ModerateStatus] {
            assert!(permits(&seller, cap, &car), "{cap:?}");
        }
    }

    #[test]
    fn test_other_seller_is_forbidden() {
        let owner = identity(Role::Seller);
        let other = identity(Role::Seller);
        let car = listing_owned_by(owner.id);

        for cap in [Capability::Edit, Capability::Delete, Capability::ModerateStatus] {
            assert!(matches!(
                authorize(&other, cap, &car),
                Err(AppError::Forbidden(_))
            ));
        }
    }

    #[test]
    fn test_admin_moderates_but_never_edits_or_deletes() {
        let admin = identity(Role::Admin);
        let car = listing_owned_by(Uuid::new_v4());

        assert!(permits(&admin, Capability::ModerateStatus, &car));
        assert!(!permits(&admin, Capability::Delete, &car));
        assert!(!permits(&admin, Capability::Edit, &car));
    }

    #[test]
    fn test_buyer_owning_nothing_is_denied() {
        // A buyer id that happens to match the seller column still has no rights.
        let buyer = identity(Role::Buyer);
        let car = listing_owned_by(buyer.id);
        assert!(!permits(&buyer, Capability::Edit, &car));
    }

    #[test]
    fn test_require_role() {
        assert!(require_role(&identity(Role::Admin), Role::Admin).is_ok());
        assert!(require_role(&identity(Role::Seller), Role::Admin).is_err());
        assert!(require_role(&identity(Role::Seller), Role::Seller).is_ok());
        assert!(require_role(&identity(Role::Buyer), Role::Seller).is_err());
    }
}
