//! The archive resource service, built as a chain of layers that each
//! implement [`ArchiveService`].
//!
//! Requests enter at the outermost layer and travel inward; every layer
//! overrides the operations it cares about and forwards the rest to the
//! layer it wraps. The default chain, from the outside in:
//!
//! 1. [`Validator`] rejects malformed requests and flags malformed responses.
//! 2. [`Paginator`] applies page tokens, filters and page sizes.
//! 3. [`Users`] implements the user account operations.
//! 4. [`Interactivity`] persists per-user resource updates.
//! 5. [`Hydrator`] joins stored interaction state onto scraped resources.
//! 6. [`Scraper`] reads structure and content from the upstream site.
//!
//! An operation that reaches a layer with nothing beneath it fails with
//! `Unimplemented`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::Caller;
use crate::config::Config;
use crate::error::{ArchiveError, Result};
use crate::model::{
    Category, Chapter, CreateUserRequest, DeleteUserRequest, Entry, GetCategoryRequest,
    GetChapterRequest, GetEntryRequest, GetUserRequest, ListCategoriesRequest,
    ListCategoriesResponse, ListChaptersRequest, ListChaptersResponse, ListEntriesRequest,
    ListEntriesResponse, ListUsersRequest, ListUsersResponse, ReadChapterRequest,
    ReadContentResponse, ReadEntryRequest, UpdateCategoryRequest, UpdateChapterRequest,
    UpdateEntryRequest, UpdateUserRequest, User,
};
use crate::store::Store;

#[cfg(test)]
mod fake;
mod hydrator;
mod interactivity;
mod paginator;
mod scraper;
mod users;
mod validator;

pub use hydrator::Hydrator;
pub use interactivity::Interactivity;
pub use paginator::Paginator;
pub use self::scraper::{Scraper, parse_row_time};
pub use users::Users;
pub use validator::{Validate, Validator, Violation};

#[async_trait]
pub trait ArchiveService: Send + Sync {
    /// The layer this one wraps, if any.
    fn inner(&self) -> Option<&dyn ArchiveService>;

    fn next(&self, operation: &'static str) -> Result<&dyn ArchiveService> {
        self.inner()
            .ok_or_else(|| ArchiveError::unimplemented(format!("{operation} is not implemented")))
    }

    async fn list_categories(
        &self,
        caller: &Caller,
        req: ListCategoriesRequest,
    ) -> Result<ListCategoriesResponse> {
        self.next("ListCategories")?.list_categories(caller, req).await
    }

    async fn get_category(&self, caller: &Caller, req: GetCategoryRequest) -> Result<Category> {
        self.next("GetCategory")?.get_category(caller, req).await
    }

    async fn update_category(
        &self,
        caller: &Caller,
        req: UpdateCategoryRequest,
    ) -> Result<Category> {
        self.next("UpdateCategory")?.update_category(caller, req).await
    }

    async fn list_entries(
        &self,
        caller: &Caller,
        req: ListEntriesRequest,
    ) -> Result<ListEntriesResponse> {
        self.next("ListEntries")?.list_entries(caller, req).await
    }

    async fn get_entry(&self, caller: &Caller, req: GetEntryRequest) -> Result<Entry> {
        self.next("GetEntry")?.get_entry(caller, req).await
    }

    async fn update_entry(&self, caller: &Caller, req: UpdateEntryRequest) -> Result<Entry> {
        self.next("UpdateEntry")?.update_entry(caller, req).await
    }

    async fn read_entry(
        &self,
        caller: &Caller,
        req: ReadEntryRequest,
    ) -> Result<ReadContentResponse> {
        self.next("ReadEntry")?.read_entry(caller, req).await
    }

    async fn list_chapters(
        &self,
        caller: &Caller,
        req: ListChaptersRequest,
    ) -> Result<ListChaptersResponse> {
        self.next("ListChapters")?.list_chapters(caller, req).await
    }

    async fn get_chapter(&self, caller: &Caller, req: GetChapterRequest) -> Result<Chapter> {
        self.next("GetChapter")?.get_chapter(caller, req).await
    }

    async fn update_chapter(&self, caller: &Caller, req: UpdateChapterRequest) -> Result<Chapter> {
        self.next("UpdateChapter")?.update_chapter(caller, req).await
    }

    async fn read_chapter(
        &self,
        caller: &Caller,
        req: ReadChapterRequest,
    ) -> Result<ReadContentResponse> {
        self.next("ReadChapter")?.read_chapter(caller, req).await
    }

    async fn create_user(&self, caller: &Caller, req: CreateUserRequest) -> Result<User> {
        self.next("CreateUser")?.create_user(caller, req).await
    }

    async fn list_users(&self, caller: &Caller, req: ListUsersRequest) -> Result<ListUsersResponse> {
        self.next("ListUsers")?.list_users(caller, req).await
    }

    async fn get_user(&self, caller: &Caller, req: GetUserRequest) -> Result<User> {
        self.next("GetUser")?.get_user(caller, req).await
    }

    async fn update_user(&self, caller: &Caller, req: UpdateUserRequest) -> Result<User> {
        self.next("UpdateUser")?.update_user(caller, req).await
    }

    async fn delete_user(&self, caller: &Caller, req: DeleteUserRequest) -> Result<()> {
        self.next("DeleteUser")?.delete_user(caller, req).await
    }
}

/// Builds the default chain over `store`.
pub fn default_chain<S>(config: &Config, store: Arc<S>) -> anyhow::Result<Arc<dyn ArchiveService>>
where
    S: Store + 'static,
{
    let scraper = Arc::new(Scraper::new(config)?);
    let hydrator = Arc::new(Hydrator::new(scraper, store.clone()));
    let interactivity = Arc::new(Interactivity::new(hydrator, store.clone()));
    let users = Arc::new(Users::new(interactivity, store));
    let paginator = Arc::new(Paginator::new(users));
    Ok(Arc::new(Validator::new(paginator)))
}
