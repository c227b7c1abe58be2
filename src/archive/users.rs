use std::sync::Arc;

use async_trait::async_trait;

use super::ArchiveService;
use crate::auth::{self, Caller};
use crate::error::{ArchiveError, Result};
use crate::model::{
    CreateUserRequest, DeleteUserRequest, GetUserRequest, ListUsersRequest, ListUsersResponse,
    UpdateUserRequest, User,
};
use crate::slug;
use crate::store::{StoreError, UserRecord, UserStore};

/// User account operations. Callers may only see and change themselves.
pub struct Users {
    inner: Arc<dyn ArchiveService>,
    store: Arc<dyn UserStore>,
}

impl Users {
    pub fn new(inner: Arc<dyn ArchiveService>, store: Arc<dyn UserStore>) -> Self {
        Self { inner, store }
    }
}

fn to_user(record: &UserRecord) -> User {
    User {
        path: slug::user_path(&record.name),
        id: record.name.clone(),
        password: String::new(),
    }
}

fn ensure_self(caller: &Caller, path: &str) -> Result<()> {
    if path == caller.path() {
        Ok(())
    } else {
        Err(ArchiveError::permission_denied(format!(
            "{} may not access {path}",
            caller.path()
        )))
    }
}

/// Hashes on a blocking thread.
async fn hash(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|err| ArchiveError::internal(format!("hash password: {err}")))?
}

#[async_trait]
impl ArchiveService for Users {
    fn inner(&self) -> Option<&dyn ArchiveService> {
        Some(self.inner.as_ref())
    }

    async fn create_user(&self, _caller: &Caller, req: CreateUserRequest) -> Result<User> {
        let user = req
            .user
            .ok_or_else(|| ArchiveError::invalid_argument("user is required"))?;
        let record = UserRecord {
            id: 0,
            name: req.user_id,
            password_hash: hash(user.password).await?,
        };
        let created = self.store.upsert_user(&record).await.map_err(|err| match err {
            StoreError::AlreadyExists => {
                ArchiveError::already_exists(format!("user {:?} already exists", record.name))
            }
            other => other.into(),
        })?;
        tracing::info!(user = %created.name, "created user");
        Ok(to_user(&created))
    }

    async fn list_users(
        &self,
        _caller: &Caller,
        _req: ListUsersRequest,
    ) -> Result<ListUsersResponse> {
        Err(ArchiveError::permission_denied("listing users is not permitted"))
    }

    async fn get_user(&self, caller: &Caller, req: GetUserRequest) -> Result<User> {
        ensure_self(caller, &req.path)?;
        let record = self.store.get_user(caller.id()).await?;
        Ok(to_user(&record))
    }

    async fn update_user(&self, caller: &Caller, req: UpdateUserRequest) -> Result<User> {
        ensure_self(caller, &req.path)?;
        let user = req
            .user
            .ok_or_else(|| ArchiveError::invalid_argument("user is required"))?;
        req.update_mask.check(User::FIELDS)?;
        if let Some(field) = req
            .update_mask
            .paths
            .iter()
            .find(|field| !field.eq_ignore_ascii_case("password"))
        {
            return Err(ArchiveError::invalid_argument(format!(
                "field {field:?} cannot be updated"
            )));
        }

        let mut record = self.store.get_user(caller.id()).await?;
        record.password_hash = hash(user.password).await?;
        let updated = self.store.upsert_user(&record).await?;
        tracing::info!(user = %updated.name, "updated user password");
        Ok(to_user(&updated))
    }

    async fn delete_user(&self, caller: &Caller, req: DeleteUserRequest) -> Result<()> {
        ensure_self(caller, &req.path)?;
        match self.store.delete_user(caller.id()).await {
            Ok(()) | Err(StoreError::NotFound) => {
                tracing::info!(user = caller.name(), "deleted user");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fake::{Canned, store_with_caller};
    use crate::error::Code;
    use crate::model::FieldMask;
    use crate::store::SqliteStore;

    async fn layer() -> (Users, Arc<SqliteStore>, Caller) {
        let (store, caller) = store_with_caller("alice").await;
        let users = Users::new(Arc::new(Canned::default()), store.clone());
        (users, store, caller)
    }

    fn with_password(password: &str) -> Option<User> {
        Some(User {
            password: password.into(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn creates_users() {
        let (users, store, caller) = layer().await;
        let created = users
            .create_user(
                &caller,
                CreateUserRequest {
                    user_id: "bob_2".into(),
                    user: with_password("hunter2hunter2"),
                },
            )
            .await
            .unwrap();
        assert_eq!(created.path, "users/bob_2");
        assert_eq!(created.id, "bob_2");
        assert!(created.password.is_empty());

        let stored = store.get_user_by_name("bob_2").await.unwrap();
        assert!(auth::verify_password("hunter2hunter2", &stored.password_hash));

        let err = users
            .create_user(
                &caller,
                CreateUserRequest {
                    user_id: "bob_2".into(),
                    user: with_password("another-password"),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::AlreadyExists);
    }

    #[tokio::test]
    async fn callers_only_reach_themselves() {
        let (users, _store, caller) = layer().await;

        let me = users
            .get_user(&caller, GetUserRequest { path: "users/alice".into() })
            .await
            .unwrap();
        assert_eq!(me.id, "alice");

        let err = users
            .get_user(&caller, GetUserRequest { path: "users/mallory".into() })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);

        let err = users
            .delete_user(&caller, DeleteUserRequest { path: "users/mallory".into() })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);

        let err = users
            .list_users(&caller, ListUsersRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);
    }

    #[tokio::test]
    async fn updates_only_the_password() {
        let (users, store, caller) = layer().await;
        let update = |mask: &str| UpdateUserRequest {
            path: "users/alice".into(),
            user: with_password("brand-new-secret"),
            update_mask: FieldMask::new([mask]),
        };

        users.update_user(&caller, update("password")).await.unwrap();
        let stored = store.get_user_by_name("alice").await.unwrap();
        assert!(auth::verify_password("brand-new-secret", &stored.password_hash));
        assert_eq!(stored.id, caller.id());

        let err = users.update_user(&caller, update("id")).await.unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn deleting_twice_succeeds() {
        let (users, store, caller) = layer().await;
        let req = DeleteUserRequest { path: "users/alice".into() };
        users.delete_user(&caller, req.clone()).await.unwrap();
        users.delete_user(&caller, req).await.unwrap();
        assert!(matches!(
            store.get_user_by_name("alice").await,
            Err(StoreError::NotFound)
        ));
    }
}
