//! Reconciliation tests against the in-memory stores

use chrono::Utc;
use std::sync::Arc;

use varco_core::{
    ClaimSet, IdentityLinkStore, LocalUser, ReconcilerSettings, UserId, UserStore, VarcoError,
    PROVIDER_NAME,
};
use varco_db::memory_stores;

use crate::reconciler::{IdentityReconciler, LinkMethod};

fn claims(pairs: &[(&str, &str)]) -> ClaimSet {
    let mut set = ClaimSet::new();
    for (k, v) in pairs {
        set.insert(*k, serde_json::json!(v));
    }
    set
}

fn existing_user(username: &str, email: &str) -> LocalUser {
    let now = Utc::now();
    LocalUser {
        id: UserId::new(),
        username: username.to_string(),
        email: email.to_string(),
        given_name: None,
        family_name: None,
        fiscal_code: None,
        mobile_phone: None,
        roles: vec![],
        active: true,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_auto_registration_creates_linked_user() {
    let (users, links) = memory_stores();
    let reconciler = IdentityReconciler::new(
        ReconcilerSettings::default(),
        users.clone(),
        links.clone(),
    );

    let login = reconciler
        .reconcile(&claims(&[
            ("sub", "X1"),
            ("email", "a@b.it"),
            ("preferred_username", "mrossi"),
            ("given_name", "Mario"),
        ]))
        .await
        .unwrap();

    assert_eq!(login.method, LinkMethod::Registered);
    assert_eq!(login.user.username, "mrossi");
    assert_eq!(login.user.email, "a@b.it");
    assert_eq!(login.user.given_name.as_deref(), Some("Mario"));
    assert!(login.user.last_login_at.is_some());
    assert_eq!(users.count().await, 1);

    let linked = links.find_user(PROVIDER_NAME, "X1").await.unwrap();
    assert_eq!(linked, Some(login.user.id));
}

#[tokio::test]
async fn test_username_collision_gets_numeric_suffix() {
    let (users, links) = memory_stores();
    users.insert(existing_user("jdoe", "other@b.it")).await;

    let reconciler =
        IdentityReconciler::new(ReconcilerSettings::default(), users.clone(), links);

    let login = reconciler
        .reconcile(&claims(&[
            ("sub", "X2"),
            ("email", "j@b.it"),
            ("preferred_username", "jdoe"),
        ]))
        .await
        .unwrap();

    assert_eq!(login.method, LinkMethod::Registered);
    assert_eq!(login.user.username, "jdoe_1");
    // The original account is untouched
    let original = users.find_by_username("jdoe").await.unwrap().unwrap();
    assert_eq!(original.email, "other@b.it");
}

#[tokio::test]
async fn test_username_fallback_derives_from_external_id() {
    let (users, links) = memory_stores();
    let reconciler = IdentityReconciler::new(ReconcilerSettings::default(), users, links);

    let login = reconciler
        .reconcile(&claims(&[("sub", "0123456789abcdef")]))
        .await
        .unwrap();

    assert_eq!(login.user.username, "wso2_01234567");
}

#[tokio::test]
async fn test_default_role_assigned_on_registration() {
    let (users, links) = memory_stores();
    let settings = ReconcilerSettings {
        default_role: Some("citizen".to_string()),
        ..Default::default()
    };
    let reconciler = IdentityReconciler::new(settings, users, links);

    let login = reconciler
        .reconcile(&claims(&[("sub", "X3"), ("preferred_username", "anna")]))
        .await
        .unwrap();

    assert_eq!(login.user.roles, vec!["citizen".to_string()]);
}

#[tokio::test]
async fn test_registration_disabled_fails_without_match() {
    let (users, links) = memory_stores();
    let settings = ReconcilerSettings {
        auto_register: false,
        ..Default::default()
    };
    let reconciler = IdentityReconciler::new(settings, users.clone(), links);

    let err = reconciler
        .reconcile(&claims(&[("sub", "X4"), ("email", "nobody@b.it")]))
        .await
        .unwrap_err();

    assert!(matches!(err, VarcoError::Reconciliation { .. }));
    assert_eq!(users.count().await, 0);
}

#[tokio::test]
async fn test_missing_user_id_claim_fails() {
    let (users, links) = memory_stores();
    let reconciler = IdentityReconciler::new(ReconcilerSettings::default(), users, links);

    let err = reconciler
        .reconcile(&claims(&[("email", "a@b.it")]))
        .await
        .unwrap_err();
    assert!(matches!(err, VarcoError::Reconciliation { .. }));
}

// =============================================================================
// Existing-account paths
// =============================================================================

#[tokio::test]
async fn test_existing_link_reuses_account() {
    let (users, links) = memory_stores();
    let user = existing_user("mrossi", "a@b.it");
    let user_id = user.id;
    users.insert(user).await;
    links.link(PROVIDER_NAME, "X1", user_id).await.unwrap();

    let reconciler =
        IdentityReconciler::new(ReconcilerSettings::default(), users.clone(), links);

    let login = reconciler
        .reconcile(&claims(&[("sub", "X1"), ("email", "changed@b.it")]))
        .await
        .unwrap();

    assert_eq!(login.method, LinkMethod::ExternalId);
    assert_eq!(login.user.id, user_id);
    assert_eq!(users.count().await, 1);
}

#[tokio::test]
async fn test_email_match_links_and_syncs_fields() {
    let (users, links) = memory_stores();
    let user = existing_user("mrossi", "a@b.it");
    let user_id = user.id;
    users.insert(user).await;

    let reconciler = IdentityReconciler::new(
        ReconcilerSettings::default(),
        users.clone(),
        links.clone(),
    );

    let login = reconciler
        .reconcile(&claims(&[
            ("sub", "X1"),
            ("email", "a@b.it"),
            ("family_name", "Rossi"),
        ]))
        .await
        .unwrap();

    assert_eq!(login.method, LinkMethod::EmailMatch);
    assert_eq!(login.user.id, user_id);
    assert_eq!(login.user.family_name.as_deref(), Some("Rossi"));
    assert_eq!(
        links.find_user(PROVIDER_NAME, "X1").await.unwrap(),
        Some(user_id)
    );
}

#[tokio::test]
async fn test_ambiguous_email_match_is_a_hard_failure() {
    let (users, links) = memory_stores();
    users.insert(existing_user("one", "shared@b.it")).await;
    users.insert(existing_user("two", "shared@b.it")).await;

    let settings = ReconcilerSettings {
        auto_register: false,
        ..Default::default()
    };
    let reconciler = IdentityReconciler::new(settings, users.clone(), links.clone());

    let err = reconciler
        .reconcile(&claims(&[("sub", "X9"), ("email", "shared@b.it")]))
        .await
        .unwrap_err();

    assert!(matches!(err, VarcoError::Reconciliation { .. }));
    assert_eq!(links.find_user(PROVIDER_NAME, "X9").await.unwrap(), None);
}

#[tokio::test]
async fn test_username_match_requires_opt_in() {
    let (users, links) = memory_stores();
    users.insert(existing_user("mrossi", "a@b.it")).await;

    // Opted out: the claim set has no email, so registration kicks in
    let reconciler = IdentityReconciler::new(
        ReconcilerSettings::default(),
        users.clone(),
        links.clone(),
    );
    let login = reconciler
        .reconcile(&claims(&[("sub", "X5"), ("preferred_username", "mrossi")]))
        .await
        .unwrap();
    assert_eq!(login.method, LinkMethod::Registered);
    assert_eq!(login.user.username, "mrossi_1");

    // Opted in: the same claims link to the existing account
    let (users2, links2) = memory_stores();
    users2.insert(existing_user("mrossi", "a@b.it")).await;
    let settings = ReconcilerSettings {
        link_by_username: true,
        ..Default::default()
    };
    let reconciler = IdentityReconciler::new(settings, users2, links2);
    let login = reconciler
        .reconcile(&claims(&[("sub", "X5"), ("preferred_username", "mrossi")]))
        .await
        .unwrap();
    assert_eq!(login.method, LinkMethod::UsernameMatch);
}

#[tokio::test]
async fn test_excluded_role_blocks_default_role_on_link() {
    let (users, links) = memory_stores();
    let mut user = existing_user("op", "op@b.it");
    user.roles = vec!["operator".to_string()];
    users.insert(user).await;

    let settings = ReconcilerSettings {
        default_role: Some("citizen".to_string()),
        excluded_roles: vec!["operator".to_string()],
        ..Default::default()
    };
    let reconciler = IdentityReconciler::new(settings, users.clone(), links);

    let login = reconciler
        .reconcile(&claims(&[("sub", "X6"), ("email", "op@b.it")]))
        .await
        .unwrap();

    assert_eq!(login.user.roles, vec!["operator".to_string()]);
}
