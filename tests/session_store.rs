use anyhow::{Context, Result};
use tempfile::tempdir;

use hr_console::authz::{default_permissions, has_permission, permissions, Identity, PermissionTree};
use hr_console::db::SqliteSessionStore;
use hr_console::events::{self, AppEvent, DomainEvent, PermissionsUpdated, RoleChange, RolesUpdated};
use hr_console::models::rbac::Role;
use hr_console::{MemoryDirectory, SessionManager, SessionStore};

async fn sqlite_store(dir: &tempfile::TempDir) -> Result<SqliteSessionStore> {
    let url = format!("sqlite://{}", dir.path().join("session.db").display());
    SqliteSessionStore::connect(&url)
        .await
        .context("failed to open session store")
}

async fn directory() -> MemoryDirectory {
    let directory = MemoryDirectory::new();
    let mut tree = PermissionTree::new();
    tree.set("hiring", "candidate", "view", true);
    directory
        .add_account(
            "password123",
            Identity::new("u-1", "riley@example.com")
                .with_name("Riley", "Stone")
                .with_role("Recruiter")
                .with_permissions(tree),
        )
        .await;
    directory
}

#[tokio::test]
async fn session_survives_a_restart() -> Result<()> {
    let dir = tempdir().context("failed to create tempdir")?;
    let directory = directory().await;

    {
        let mut session = SessionManager::new(sqlite_store(&dir).await?);
        let identity = session.login(&directory, "Riley@Example.com ", "password123").await?;
        assert_eq!(identity.display_name(), "Riley Stone");
    }

    let mut session = SessionManager::new(sqlite_store(&dir).await?);
    let identity = session.restore().await?.context("session should be restored")?;
    assert_eq!(identity.id, "u-1");
    assert!(has_permission(Some(identity), permissions::CANDIDATE_VIEW));
    assert!(!has_permission(Some(identity), permissions::CANDIDATE_DELETE));

    // every catalogue leaf is present after the merge
    let leaves = identity.permissions.leaves().count();
    assert_eq!(leaves, default_permissions().leaves().count());
    assert_eq!(session.token(), Some("token-u-1"));
    Ok(())
}

#[tokio::test]
async fn malformed_content_is_discarded() -> Result<()> {
    let dir = tempdir()?;
    let store = sqlite_store(&dir).await?;
    store.save(r#"{"token": 42, "user": "nobody"}"#).await?;

    let mut session = SessionManager::new(store);
    assert!(session.restore().await?.is_none());
    assert!(session.store().load().await?.is_none(), "stored data cleared");
    Ok(())
}

#[tokio::test]
async fn logout_clears_the_store() -> Result<()> {
    let dir = tempdir()?;
    let directory = directory().await;
    let mut session = SessionManager::new(sqlite_store(&dir).await?);
    session.login(&directory, "riley@example.com", "password123").await?;

    directory.fail_next(503, "gateway down").await;
    session.logout(&directory).await?;

    assert!(session.identity().is_none());
    assert!(session.store().load().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn permission_broadcast_only_touches_matching_role() -> Result<()> {
    let dir = tempdir()?;
    let directory = directory().await;
    let mut session = SessionManager::new(sqlite_store(&dir).await?);
    session.login(&directory, "riley@example.com", "password123").await?;

    let (bus, mut rx) = events::init_event_bus();
    let mut grant = PermissionTree::new();
    grant.set("hiring", "job", "create", true);

    events::publish(
        &bus,
        None,
        AppEvent::PermissionsUpdated(PermissionsUpdated {
            role_id: "r-2".into(),
            role_name: "Payroll".into(),
            previous_name: None,
            permissions: grant.clone(),
        }),
    );
    events::publish(
        &bus,
        None,
        AppEvent::PermissionsUpdated(PermissionsUpdated {
            role_id: "r-1".into(),
            role_name: "RECRUITER".into(),
            previous_name: None,
            permissions: grant,
        }),
    );

    assert!(!session.handle_event(&rx.try_recv()?).await?);
    assert!(!has_permission(session.identity(), permissions::JOB_CREATE));

    assert!(session.handle_event(&rx.try_recv()?).await?);
    assert!(has_permission(session.identity(), permissions::JOB_CREATE));
    // the broadcast tree replaces the previous grants
    assert!(!has_permission(session.identity(), permissions::CANDIDATE_VIEW));

    let mut restored = SessionManager::new(sqlite_store(&dir).await?);
    restored.restore().await?;
    assert!(has_permission(restored.identity(), permissions::JOB_CREATE));
    Ok(())
}

#[tokio::test]
async fn assignment_to_the_current_user_switches_role() -> Result<()> {
    let dir = tempdir()?;
    let directory = directory().await;
    let mut session = SessionManager::new(sqlite_store(&dir).await?);
    session.login(&directory, "riley@example.com", "password123").await?;

    let role = Role::new("r-9", "Interviewer").with_permissions(&[permissions::INTERVIEW_VIEW, permissions::INTERVIEW_EDIT]);
    let assigned = |user_id: &str| {
        DomainEvent::new(
            "rolesUpdated",
            None,
            Some(role.id.clone()),
            AppEvent::RolesUpdated(RolesUpdated {
                change: RoleChange::Assigned,
                role_id: role.id.clone(),
                role_name: role.name.clone(),
                user_id: Some(user_id.to_string()),
                permissions: Some(role.permission_tree()),
            }),
        )
    };

    assert!(!session.handle_event(&assigned("u-2")).await?);
    assert!(session.handle_event(&assigned("u-1")).await?);

    let identity = session.identity().context("still logged in")?;
    assert_eq!(identity.role, "Interviewer");
    assert!(has_permission(Some(identity), permissions::INTERVIEW_EDIT));
    assert!(!has_permission(Some(identity), permissions::CANDIDATE_VIEW));

    let mut restored = SessionManager::new(sqlite_store(&dir).await?);
    restored.restore().await?;
    assert_eq!(restored.identity().map(|identity| identity.role.as_str()), Some("Interviewer"));
    Ok(())
}
