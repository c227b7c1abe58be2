//! An in-memory innermost layer for exercising the outer layers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::ArchiveService;
use crate::auth::Caller;
use crate::error::{ArchiveError, Result};
use crate::model::{
    Category, Chapter, Entry, GetCategoryRequest, GetChapterRequest, GetEntryRequest,
    ListCategoriesRequest, ListCategoriesResponse, ListChaptersRequest, ListChaptersResponse,
    ListEntriesRequest, ListEntriesResponse,
};
use crate::store::{SqliteStore, UserRecord, UserStore as _};

#[derive(Default)]
pub(super) struct Canned {
    pub categories: Vec<Category>,
    pub entries: Vec<Entry>,
    pub chapters: Vec<Chapter>,
    /// Returned as the next page token of every entry listing.
    pub entries_token: String,
    pub calls: AtomicUsize,
}

impl Canned {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn called(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn find<T: Clone>(items: &[T], path: &str, path_of: impl Fn(&T) -> &str) -> Result<T> {
    items
        .iter()
        .find(|item| path_of(item) == path)
        .cloned()
        .ok_or_else(|| ArchiveError::not_found(format!("{path} not found")))
}

#[async_trait]
impl ArchiveService for Canned {
    fn inner(&self) -> Option<&dyn ArchiveService> {
        None
    }

    async fn list_categories(
        &self,
        _caller: &Caller,
        _req: ListCategoriesRequest,
    ) -> Result<ListCategoriesResponse> {
        self.called();
        Ok(ListCategoriesResponse {
            results: self.categories.clone(),
            next_page_token: String::new(),
        })
    }

    async fn get_category(&self, _caller: &Caller, req: GetCategoryRequest) -> Result<Category> {
        self.called();
        find(&self.categories, &req.path, |c| &c.path)
    }

    async fn list_entries(
        &self,
        _caller: &Caller,
        _req: ListEntriesRequest,
    ) -> Result<ListEntriesResponse> {
        self.called();
        Ok(ListEntriesResponse {
            results: self.entries.clone(),
            next_page_token: self.entries_token.clone(),
        })
    }

    async fn get_entry(&self, _caller: &Caller, req: GetEntryRequest) -> Result<Entry> {
        self.called();
        find(&self.entries, &req.path, |e| &e.path)
    }

    async fn list_chapters(
        &self,
        _caller: &Caller,
        _req: ListChaptersRequest,
    ) -> Result<ListChaptersResponse> {
        self.called();
        Ok(ListChaptersResponse {
            results: self.chapters.clone(),
            next_page_token: String::new(),
        })
    }

    async fn get_chapter(&self, _caller: &Caller, req: GetChapterRequest) -> Result<Chapter> {
        self.called();
        find(&self.chapters, &req.path, |c| &c.path)
    }
}

/// An in-memory store holding one user, and that user as a caller.
pub(super) async fn store_with_caller(name: &str) -> (Arc<SqliteStore>, Caller) {
    let store = SqliteStore::in_memory().unwrap();
    let user = store
        .upsert_user(&UserRecord {
            id: 0,
            name: name.to_owned(),
            password_hash: crate::auth::hash_password("correct-horse").unwrap(),
        })
        .await
        .unwrap();
    (Arc::new(store), Caller::new(user))
}
