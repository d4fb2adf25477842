//! User registration and role assignment tests.

mod common;

use backoffice_service::error::WorkflowError;
use backoffice_service::models::{ActivityAction, ActivityTarget, NewUser, Role};
use common::setup;
use uuid::Uuid;

fn new_user(user_name: &str, email: &str) -> NewUser {
    NewUser {
        user_name: user_name.to_string(),
        name: "Robin Reyes".to_string(),
        email: email.to_string(),
    }
}

#[tokio::test]
async fn registered_users_start_as_plain_users() {
    let ctx = setup();

    let user = ctx
        .users
        .register_user(new_user("rreyes", "robin@example.com"), &ctx.admin)
        .await
        .unwrap();
    assert_eq!(user.role, Role::User);
    assert_eq!(ctx.users.get_user(user.user_id).await.unwrap(), user);

    let err = ctx
        .users
        .register_user(new_user("rreyes", "other@example.com"), &ctx.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));

    let err = ctx
        .users
        .register_user(new_user("rr", "nope"), &ctx.admin)
        .await
        .unwrap_err();
    assert_eq!(err.problems().len(), 2, "{:?}", err.problems());

    let history = ctx
        .catalog
        .activity_for(ActivityTarget::User(user.user_id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ActivityAction::Created);
}

#[tokio::test]
async fn admins_change_roles_and_it_is_logged() {
    let ctx = setup();
    let user_id = ctx.user("jlee", Role::User).await;

    let promoted = ctx
        .users
        .change_role(user_id, "admin", &ctx.admin)
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Admin);
    assert_eq!(ctx.users.get_user(user_id).await.unwrap().role, Role::Admin);

    // Same role again writes nothing.
    ctx.users
        .change_role(user_id, "admin", &ctx.admin)
        .await
        .unwrap();

    let history = ctx
        .catalog
        .activity_for(ActivityTarget::User(user_id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ActivityAction::RoleChange);
    assert_eq!(history[0].user_id, ctx.admin.user_id);
    assert_eq!(
        history[0].description,
        "Role of jlee changed from user to admin"
    );
}

#[tokio::test]
async fn role_changes_are_gated_and_validated() {
    let ctx = setup();
    let user_id = ctx.user("jlee", Role::User).await;

    let err = ctx
        .users
        .change_role(user_id, "admin", &ctx.clerk)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Unauthorized(_)));

    for role in ["superuser", "Admin", ""] {
        let err = ctx
            .users
            .change_role(user_id, role, &ctx.admin)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::BadRequest { .. }), "{}", role);
    }

    let err = ctx
        .users
        .change_role(Uuid::new_v4(), "user", &ctx.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    assert_eq!(ctx.users.get_user(user_id).await.unwrap().role, Role::User);
    assert!(ctx
        .catalog
        .activity_for(ActivityTarget::User(user_id))
        .await
        .unwrap()
        .is_empty());
}
