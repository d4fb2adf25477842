//! Back-office users and role assignment.

use crate::error::WorkflowError;
use crate::models::{ActivityAction, ActivityTarget, Identity, NewUser, Role, User};
use crate::services::activity_log::ActivityLog;
use crate::services::metrics::record_outcome;
use crate::services::store::{finish, Store, StoreTx};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

pub struct UserDirectory<S> {
    store: Arc<S>,
}

impl<S> Clone for UserDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> UserDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, input, actor), fields(user_name = %input.user_name, user_id = %actor.user_id))]
    pub async fn register_user(
        &self,
        input: NewUser,
        actor: &Identity,
    ) -> Result<User, WorkflowError> {
        let result = self.register(input, actor).await;
        record_outcome("register_user", &result);
        result
    }

    async fn register(&self, input: NewUser, actor: &Identity) -> Result<User, WorkflowError> {
        input.validate()?;

        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4(),
            user_name: input.user_name.trim().to_string(),
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            role: Role::User,
            created_utc: now,
            updated_utc: now,
        };

        let mut tx = self.store.begin().await?;
        let outcome = async {
            tx.insert_user(&user).await?;
            ActivityLog::record(
                &mut tx,
                ActivityTarget::User(user.user_id),
                actor,
                ActivityAction::Created,
                format!("User {} registered", user.user_name),
            )
            .await?;
            Ok::<_, WorkflowError>(())
        }
        .await;
        finish(tx, outcome).await?;

        info!(new_user_id = %user.user_id, "User registered");

        Ok(user)
    }

    /// Set a user's role. Administrators only. `role` must be `admin` or
    /// `user`.
    #[instrument(skip(self, actor), fields(target_user_id = %user_id, user_id = %actor.user_id))]
    pub async fn change_role(
        &self,
        user_id: Uuid,
        role: &str,
        actor: &Identity,
    ) -> Result<User, WorkflowError> {
        let result = self.set_role(user_id, role, actor).await;
        record_outcome("change_role", &result);
        result
    }

    async fn set_role(&self, user_id: Uuid, role: &str, actor: &Identity) -> Result<User, WorkflowError> {
        if !actor.is_admin() {
            return Err(WorkflowError::Unauthorized(
                "Only administrators can change roles".to_string(),
            ));
        }
        let role = role
            .parse::<Role>()
            .map_err(|e| WorkflowError::bad_request(e.to_string()))?;

        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut user = tx
                .lock_user(user_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("User {} not found", user_id)))?;

            if user.role == role {
                debug!(role = %role, "Role unchanged");
                return Ok::<_, WorkflowError>(user);
            }

            let previous = user.role;
            user.role = role;
            user.updated_utc = Utc::now();
            tx.update_user_role(&user).await?;
            ActivityLog::record(
                &mut tx,
                ActivityTarget::User(user_id),
                actor,
                ActivityAction::RoleChange,
                format!("Role of {} changed from {} to {}", user.user_name, previous, role),
            )
            .await?;
            Ok(user)
        }
        .await;
        let user = finish(tx, outcome).await?;

        info!(target_user_id = %user_id, role = %user.role, "User role set");

        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<User, WorkflowError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("User {} not found", user_id)))
    }
}
