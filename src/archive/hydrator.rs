use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::ArchiveService;
use crate::auth::Caller;
use crate::error::Result;
use crate::model::{
    Category, Chapter, Entry, GetCategoryRequest, GetChapterRequest, GetEntryRequest,
    ListCategoriesRequest, ListCategoriesResponse, ListChaptersRequest, ListChaptersResponse,
    ListEntriesRequest, ListEntriesResponse, Resource,
};
use crate::store::{ResourceRecord, ResourceStore, StoreError};

/// Joins the caller's stored interaction state onto resources returned by the
/// inner layer.
pub struct Hydrator {
    inner: Arc<dyn ArchiveService>,
    store: Arc<dyn ResourceStore>,
}

impl Hydrator {
    pub fn new(inner: Arc<dyn ArchiveService>, store: Arc<dyn ResourceStore>) -> Self {
        Self { inner, store }
    }

    async fn lookup(&self, caller: &Caller, path: &str) -> Result<ResourceRecord> {
        load_record(self.store.as_ref(), caller, path).await
    }

    async fn records(
        &self,
        caller: &Caller,
        paths: Vec<String>,
    ) -> Result<HashMap<String, ResourceRecord>> {
        if paths.is_empty() {
            return Ok(HashMap::new());
        }
        let records = self.store.list_resources(caller.id(), &paths).await?;
        Ok(records
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect())
    }
}

/// The caller's record for `path`, or a zero-valued one if they never
/// touched it.
pub(super) async fn load_record(
    store: &dyn ResourceStore,
    caller: &Caller,
    path: &str,
) -> Result<ResourceRecord> {
    match store.get_resource(caller.id(), path).await {
        Ok(record) => Ok(record),
        Err(StoreError::NotFound) => Ok(ResourceRecord::empty(caller.id(), path)),
        Err(err) => Err(err.into()),
    }
}

fn paths<R: Resource>(items: &[R]) -> Vec<String> {
    items.iter().map(|item| item.path().to_owned()).collect()
}

fn hydrate_category(category: &mut Category, record: &ResourceRecord) {
    category.hidden = record.hidden;
}

fn hydrate_entry(entry: &mut Entry, record: &ResourceRecord) {
    entry.hidden = record.hidden;
    entry.starred = record.starred;
    entry.view_time = record.view_time;
    entry.read_time = record.read_time;
}

fn hydrate_chapter(chapter: &mut Chapter, record: &ResourceRecord) {
    chapter.view_time = record.view_time;
    chapter.read_time = record.read_time;
}

fn hydrate_all<R: Resource>(
    items: &mut [R],
    records: &HashMap<String, ResourceRecord>,
    hydrate: fn(&mut R, &ResourceRecord),
) {
    for item in items {
        if let Some(record) = records.get(item.path()) {
            hydrate(item, record);
        }
    }
}

#[async_trait]
impl ArchiveService for Hydrator {
    fn inner(&self) -> Option<&dyn ArchiveService> {
        Some(self.inner.as_ref())
    }

    async fn list_categories(
        &self,
        caller: &Caller,
        req: ListCategoriesRequest,
    ) -> Result<ListCategoriesResponse> {
        let mut res = self.inner.list_categories(caller, req).await?;
        let records = self.records(caller, paths(&res.results)).await?;
        hydrate_all(&mut res.results, &records, hydrate_category);
        Ok(res)
    }

    async fn get_category(&self, caller: &Caller, req: GetCategoryRequest) -> Result<Category> {
        let path = req.path.clone();
        let (mut category, record) = tokio::try_join!(
            self.inner.get_category(caller, req),
            self.lookup(caller, &path)
        )?;
        hydrate_category(&mut category, &record);
        Ok(category)
    }

    async fn list_entries(
        &self,
        caller: &Caller,
        req: ListEntriesRequest,
    ) -> Result<ListEntriesResponse> {
        let mut res = self.inner.list_entries(caller, req).await?;
        let records = self.records(caller, paths(&res.results)).await?;
        hydrate_all(&mut res.results, &records, hydrate_entry);
        Ok(res)
    }

    async fn get_entry(&self, caller: &Caller, req: GetEntryRequest) -> Result<Entry> {
        let path = req.path.clone();
        let (mut entry, record) = tokio::try_join!(
            self.inner.get_entry(caller, req),
            self.lookup(caller, &path)
        )?;
        hydrate_entry(&mut entry, &record);
        Ok(entry)
    }

    async fn list_chapters(
        &self,
        caller: &Caller,
        req: ListChaptersRequest,
    ) -> Result<ListChaptersResponse> {
        let mut res = self.inner.list_chapters(caller, req).await?;
        let records = self.records(caller, paths(&res.results)).await?;
        hydrate_all(&mut res.results, &records, hydrate_chapter);
        Ok(res)
    }

    async fn get_chapter(&self, caller: &Caller, req: GetChapterRequest) -> Result<Chapter> {
        let path = req.path.clone();
        let (mut chapter, record) = tokio::try_join!(
            self.inner.get_chapter(caller, req),
            self.lookup(caller, &path)
        )?;
        hydrate_chapter(&mut chapter, &record);
        Ok(chapter)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};

    use super::*;
    use crate::archive::fake::{Canned, store_with_caller};
    use crate::error::Code;
    use crate::model::EntryKind;

    fn entry(path: &str) -> Entry {
        Entry {
            path: path.into(),
            display_name: "Story".into(),
            kind: EntryKind::Story,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn joins_stored_state_onto_listings() {
        let (store, caller) = store_with_caller("alice").await;
        let read = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        store
            .upsert_resource(&ResourceRecord {
                user_id: caller.id(),
                path: "categories/fiction/entries/b".into(),
                hidden: true,
                starred: true,
                view_time: None,
                read_time: Some(read),
            })
            .await
            .unwrap();

        let canned = Canned {
            entries: vec![
                entry("categories/fiction/entries/a"),
                entry("categories/fiction/entries/b"),
            ],
            ..Default::default()
        };
        let hydrator = Hydrator::new(Arc::new(canned), store);

        let res = hydrator
            .list_entries(&caller, ListEntriesRequest::default())
            .await
            .unwrap();
        assert!(!res.results[0].starred);
        assert!(res.results[1].starred);
        assert!(res.results[1].hidden);
        assert_eq!(res.results[1].read_time, Some(read));
    }

    #[tokio::test]
    async fn untouched_resources_get_zero_state() {
        let (store, caller) = store_with_caller("alice").await;
        let canned = Canned {
            chapters: vec![Chapter {
                path: "categories/fiction/entries/a/chapters/one".into(),
                display_name: "One".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let hydrator = Hydrator::new(Arc::new(canned), store);

        let chapter = hydrator
            .get_chapter(
                &caller,
                GetChapterRequest {
                    path: "categories/fiction/entries/a/chapters/one".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(chapter.view_time, None);
        assert_eq!(chapter.read_time, None);
    }

    #[tokio::test]
    async fn inner_errors_pass_through() {
        let (store, caller) = store_with_caller("alice").await;
        let hydrator = Hydrator::new(Arc::new(Canned::default()), store);
        let err = hydrator
            .get_category(
                &caller,
                GetCategoryRequest {
                    path: "categories/missing".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }
}
