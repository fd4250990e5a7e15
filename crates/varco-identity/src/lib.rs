//! Varco Identity - mapping IdP claims onto local accounts
//!
//! The reconciler is the decision core of the login flow: it resolves a
//! validated claim set to exactly one local user, creating links and
//! accounts under the configured policy, or fails the login with no
//! partial state.

pub mod claims;
pub mod reconciler;

#[cfg(test)]
mod tests;

pub use claims::{map_claims, MappedClaims};
pub use reconciler::{IdentityReconciler, LinkMethod, ReconciledLogin};
