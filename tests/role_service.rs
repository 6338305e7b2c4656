use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;

use hr_console::authz::{has_permission, permissions, Identity};
use hr_console::events::{self, AppEvent, DomainEvent, RoleChange};
use hr_console::models::rbac::{Role, RoleDraft, RoleUpdate};
use hr_console::notify::{self, AutoConfirm, Level, Notification, Notifier};
use hr_console::{AppError, MemoryDirectory, MemorySessionStore, RoleService, SessionManager};

struct Harness {
    directory: Arc<MemoryDirectory>,
    service: RoleService,
    events: broadcast::Receiver<DomainEvent<AppEvent>>,
    notifications: broadcast::Receiver<Notification>,
}

fn seeded_roles() -> Vec<Role> {
    vec![
        Role::new("r-admin", "ADMIN").with_permissions(permissions::ALL),
        Role::new("r-rec", "Recruiter").with_permissions(&[permissions::CANDIDATE_VIEW, permissions::CANDIDATE_EDIT]),
    ]
}

async fn harness(confirm: bool) -> Result<Harness> {
    let directory = Arc::new(MemoryDirectory::new().with_roles(seeded_roles()));
    let (bus, events) = events::init_event_bus();
    let (notifier, notifications) = Notifier::channel();

    let mut service = RoleService::new(directory.clone(), bus, notifier, Arc::new(AutoConfirm(confirm)))
        .with_actor("u-admin");
    service.try_refresh().await?;

    Ok(Harness {
        directory,
        service,
        events,
        notifications,
    })
}

fn drain_events(rx: &mut broadcast::Receiver<DomainEvent<AppEvent>>) -> Vec<DomainEvent<AppEvent>> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn protected_role_is_never_deleted() -> Result<()> {
    let mut h = harness(true).await?;
    let calls_before = h.directory.calls();

    for key in ["ADMIN", "admin", "Admin", "r-admin"] {
        let deleted = h.service.delete_role(key).await?;
        assert!(!deleted, "{key} should be refused");
    }

    assert_eq!(h.directory.calls(), calls_before, "no remote call for protected roles");
    assert_eq!(h.service.roles().len(), 2);
    assert_eq!(h.directory.roles_snapshot().await.len(), 2);

    let notes = notify::drain(&mut h.notifications);
    assert_eq!(notes.len(), 4);
    assert!(notes.iter().all(|note| note.level == Level::Error && note.message.contains("ADMIN")));
    assert!(drain_events(&mut h.events).is_empty());
    Ok(())
}

#[tokio::test]
async fn create_refetches_and_broadcasts() -> Result<()> {
    let mut h = harness(true).await?;

    h.service
        .create_role(RoleDraft {
            name: "  Interviewer ".into(),
            description: Some("Runs interviews".into()),
            permissions: vec![permissions::INTERVIEW_VIEW.into(), "NOT_A_FLAG".into()],
        })
        .await?;

    let created = h.service.find("interviewer").expect("role present after refetch");
    assert!(!created.id.is_empty());
    assert_eq!(created.permissions.iter().collect::<Vec<_>>(), vec![permissions::INTERVIEW_VIEW]);

    let events = drain_events(&mut h.events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "rolesUpdated");
    assert_eq!(events[0].actor_id.as_deref(), Some("u-admin"));
    match &events[0].payload {
        AppEvent::RolesUpdated(updated) => {
            assert_eq!(updated.change, RoleChange::Created);
            assert_eq!(updated.role_name, "Interviewer");
            assert_eq!(updated.role_id, created.id);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let notes = notify::drain(&mut h.notifications);
    assert_eq!(notes.last().map(|note| note.level), Some(Level::Success));
    Ok(())
}

#[tokio::test]
async fn duplicate_and_empty_names_are_refused_locally() -> Result<()> {
    let mut h = harness(true).await?;
    let mutations = h.directory.mutations();

    let err = h
        .service
        .create_role(RoleDraft {
            name: "RECRUITER".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = h.service.create_role(RoleDraft::default()).await.unwrap_err();
    assert!(err.is_validation());

    assert_eq!(h.directory.mutations(), mutations);
    Ok(())
}

#[tokio::test]
async fn backend_failure_is_notified_and_rethrown() -> Result<()> {
    let mut h = harness(true).await?;
    h.directory.fail_next(409, "Role name taken upstream").await;

    let err = h
        .service
        .create_role(RoleDraft {
            name: "Auditor".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Remote { status: 409, .. }));

    let notes = notify::drain(&mut h.notifications);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, Level::Error);
    assert!(notes[0].message.contains("Role name taken upstream"));

    assert_eq!(h.service.roles().len(), 2, "cache untouched on failure");
    assert!(drain_events(&mut h.events).is_empty());
    Ok(())
}

#[tokio::test]
async fn refresh_failure_keeps_last_list() -> Result<()> {
    let mut h = harness(true).await?;
    h.directory.fail_next(503, "maintenance").await;

    h.service.refresh().await;
    assert_eq!(h.service.roles().len(), 2);
    Ok(())
}

#[tokio::test]
async fn roles_without_id_fail_before_any_call() -> Result<()> {
    let mut h = harness(true).await?;
    let calls = h.directory.calls();

    let err = h.service.update_role("  ", RoleUpdate::default()).await.unwrap_err();
    assert!(matches!(err, AppError::RoleIdMissing));

    let err = h.service.assign_role_to_user("u-7", "").await.unwrap_err();
    assert!(matches!(err, AppError::RoleIdMissing));

    assert_eq!(h.directory.calls(), calls);
    let notes = notify::drain(&mut h.notifications);
    assert!(notes.iter().all(|note| note.message == "Role id is missing"));
    Ok(())
}

#[tokio::test]
async fn declined_delete_sends_nothing() -> Result<()> {
    let mut h = harness(false).await?;
    let calls = h.directory.calls();

    assert!(!h.service.delete_role("Recruiter").await?);
    assert_eq!(h.directory.calls(), calls);
    assert!(h.service.find("r-rec").is_some());
    Ok(())
}

#[tokio::test]
async fn delete_by_name_removes_the_role() -> Result<()> {
    let mut h = harness(true).await?;

    assert!(h.service.delete_role("recruiter").await?);
    assert!(h.service.find("r-rec").is_none());
    assert_eq!(h.directory.roles_snapshot().await.len(), 1);

    let events = drain_events(&mut h.events);
    assert!(matches!(
        &events[0].payload,
        AppEvent::RolesUpdated(updated) if updated.change == RoleChange::Deleted && updated.role_id == "r-rec"
    ));
    Ok(())
}

#[tokio::test]
async fn permission_updates_reach_the_session() -> Result<()> {
    let mut h = harness(true).await?;

    let directory = MemoryDirectory::new();
    directory
        .add_account(
            "pw",
            Identity::new("u-9", "rec@example.com").with_role("Recruiter"),
        )
        .await;
    let mut session = SessionManager::new(MemorySessionStore::new());
    session.login(&directory, "rec@example.com", "pw").await?;
    assert!(!has_permission(session.identity(), permissions::INTERVIEW_VIEW));

    h.service
        .update_role(
            "r-rec",
            RoleUpdate {
                permissions: Some(vec![permissions::CANDIDATE_VIEW.into(), permissions::INTERVIEW_VIEW.into()]),
                ..Default::default()
            },
        )
        .await?;

    let events = drain_events(&mut h.events);
    let names: Vec<&str> = events.iter().map(|event| event.name.as_str()).collect();
    assert_eq!(names, vec!["permissionsUpdated", "rolesUpdated"]);

    let mut changed = false;
    for event in &events {
        changed |= session.handle_event(event).await?;
    }
    assert!(changed);
    assert!(has_permission(session.identity(), permissions::INTERVIEW_VIEW));
    assert!(!has_permission(session.identity(), permissions::CANDIDATE_EDIT));

    let role = h.service.find("r-rec").expect("role kept");
    assert!(role.permissions.contains(permissions::INTERVIEW_VIEW));
    Ok(())
}

#[tokio::test]
async fn assignment_is_broadcast_with_the_user() -> Result<()> {
    let mut h = harness(true).await?;

    h.service.assign_role_to_user("u-7", "r-rec").await?;
    assert!(h.directory.assigned_roles("u-7").await.contains("r-rec"));

    h.service.unassign_role_from_user("u-7", "r-rec").await?;
    assert!(h.directory.assigned_roles("u-7").await.is_empty());

    let changes: Vec<(RoleChange, Option<String>)> = drain_events(&mut h.events)
        .into_iter()
        .filter_map(|event| match event.payload {
            AppEvent::RolesUpdated(updated) => Some((updated.change, updated.user_id)),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            (RoleChange::Assigned, Some("u-7".to_string())),
            (RoleChange::Unassigned, Some("u-7".to_string())),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn cold_cache_still_protects_admin() -> Result<()> {
    let directory = Arc::new(MemoryDirectory::new().with_roles(seeded_roles()));
    let (bus, mut events) = events::init_event_bus();
    let (notifier, mut notifications) = Notifier::channel();
    let mut service = RoleService::new(directory.clone(), bus, notifier, Arc::new(AutoConfirm(true)));
    assert!(service.roles().is_empty());

    assert!(!service.delete_role("r-admin").await?);
    assert_eq!(directory.mutations(), 0, "no DELETE for the protected role");
    assert_eq!(directory.roles_snapshot().await.len(), 2);

    let err = service.delete_role("r-ghost").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(directory.mutations(), 0, "unknown roles are never sent");

    let notes = notify::drain(&mut notifications);
    let messages: Vec<&str> = notes.iter().map(|note| note.message.as_str()).collect();
    assert_eq!(
        messages,
        vec!["The ADMIN role is protected and cannot be deleted", "Role r-ghost was not found"]
    );
    assert!(drain_events(&mut events).is_empty());
    Ok(())
}

#[tokio::test]
async fn cold_cache_deletes_by_id_after_refetch() -> Result<()> {
    let directory = Arc::new(MemoryDirectory::new().with_roles(seeded_roles()));
    let (bus, _events) = events::init_event_bus();
    let (notifier, _notifications) = Notifier::channel();
    let mut service = RoleService::new(directory.clone(), bus, notifier, Arc::new(AutoConfirm(true)));

    assert!(service.delete_role("r-rec").await?);
    assert_eq!(directory.roles_snapshot().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn rename_onto_an_existing_name_is_refused() -> Result<()> {
    let mut h = harness(true).await?;
    let mutations = h.directory.mutations();

    let err = h
        .service
        .update_role(
            "r-rec",
            RoleUpdate {
                name: Some(" admin ".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(h.directory.mutations(), mutations);
    assert_eq!(h.service.find("r-rec").map(|role| role.name.as_str()), Some("Recruiter"));

    // keeping its own name is not a collision
    h.service
        .update_role(
            "r-rec",
            RoleUpdate {
                name: Some("RECRUITER".into()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(h.directory.mutations(), mutations + 1);
    Ok(())
}

async fn session_for(user_id: &str, role: &str) -> Result<SessionManager<MemorySessionStore>> {
    let accounts = MemoryDirectory::new();
    accounts
        .add_account("pw", Identity::new(user_id, "member@example.com").with_role(role))
        .await;
    let mut session = SessionManager::new(MemorySessionStore::new());
    session.login(&accounts, "member@example.com", "pw").await?;
    Ok(session)
}

#[tokio::test]
async fn assignment_reaches_the_assigned_session() -> Result<()> {
    let mut h = harness(true).await?;
    let mut session = session_for("u-7", "EMPLOYEE").await?;
    let mut bystander = session_for("u-8", "EMPLOYEE").await?;
    assert!(!has_permission(session.identity(), permissions::CANDIDATE_EDIT));

    h.service.assign_role_to_user("u-7", "r-rec").await?;
    let mut changed = false;
    for event in drain_events(&mut h.events) {
        changed |= session.handle_event(&event).await?;
        assert!(!bystander.handle_event(&event).await?);
    }
    assert!(changed);
    assert_eq!(session.identity().map(|identity| identity.role.as_str()), Some("Recruiter"));
    assert!(has_permission(session.identity(), permissions::CANDIDATE_EDIT));

    h.service.unassign_role_from_user("u-7", "r-rec").await?;
    for event in drain_events(&mut h.events) {
        session.handle_event(&event).await?;
    }
    assert_eq!(session.identity().map(|identity| identity.role.as_str()), Some("EMPLOYEE"));
    assert!(!has_permission(session.identity(), permissions::CANDIDATE_EDIT));
    assert!(has_permission(session.identity(), permissions::ATTENDANCE_CREATE));
    Ok(())
}

#[tokio::test]
async fn renamed_role_follows_its_holders() -> Result<()> {
    let mut h = harness(true).await?;
    let mut session = session_for("u-9", "Recruiter").await?;

    h.service
        .update_role(
            "r-rec",
            RoleUpdate {
                name: Some("Talent".into()),
                ..Default::default()
            },
        )
        .await?;

    let events = drain_events(&mut h.events);
    match &events[0].payload {
        AppEvent::PermissionsUpdated(updated) => {
            assert_eq!(updated.role_name, "Talent");
            assert_eq!(updated.previous_name.as_deref(), Some("Recruiter"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    let mut changed = false;
    for event in &events {
        changed |= session.handle_event(event).await?;
    }
    assert!(changed);
    assert_eq!(session.identity().map(|identity| identity.role.as_str()), Some("Talent"));
    assert!(has_permission(session.identity(), permissions::CANDIDATE_EDIT));
    Ok(())
}
