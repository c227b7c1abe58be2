use std::sync::Arc;

use async_trait::async_trait;

use super::ArchiveService;
use super::hydrator::load_record;
use crate::auth::Caller;
use crate::error::{ArchiveError, Result};
use crate::model::{
    Category, Chapter, Entry, FieldMask, GetCategoryRequest, GetChapterRequest, GetEntryRequest,
    UpdateCategoryRequest, UpdateChapterRequest, UpdateEntryRequest,
};
use crate::store::{ResourceRecord, ResourceStore};

/// Persists the caller's per-resource state for the update operations.
pub struct Interactivity {
    inner: Arc<dyn ArchiveService>,
    store: Arc<dyn ResourceStore>,
}

impl Interactivity {
    pub fn new(inner: Arc<dyn ArchiveService>, store: Arc<dyn ResourceStore>) -> Self {
        Self { inner, store }
    }

    /// Loads the caller's record for `path`, lets `apply` change it, and
    /// stores the result.
    async fn update_record(
        &self,
        caller: &Caller,
        path: &str,
        apply: impl FnOnce(&mut ResourceRecord) -> Result<()> + Send,
    ) -> Result<()> {
        let mut record = load_record(self.store.as_ref(), caller, path).await?;
        apply(&mut record)?;
        self.store.upsert_resource(&record).await?;
        tracing::debug!(user = caller.name(), path, "updated resource state");
        Ok(())
    }
}

fn not_updatable(field: &str) -> ArchiveError {
    ArchiveError::invalid_argument(format!("field {field:?} cannot be updated"))
}

fn required<T>(resource: Option<T>, name: &str) -> Result<T> {
    resource.ok_or_else(|| ArchiveError::invalid_argument(format!("{name} is required")))
}

fn apply_category(record: &mut ResourceRecord, category: &Category, mask: &FieldMask) -> Result<()> {
    for field in &mask.paths {
        match field.to_ascii_lowercase().as_str() {
            "hidden" => record.hidden = category.hidden,
            _ => return Err(not_updatable(field)),
        }
    }
    Ok(())
}

fn apply_entry(record: &mut ResourceRecord, entry: &Entry, mask: &FieldMask) -> Result<()> {
    for field in &mask.paths {
        match field.to_ascii_lowercase().as_str() {
            "hidden" => record.hidden = entry.hidden,
            "starred" => record.starred = entry.starred,
            "view_time" => record.view_time = entry.view_time,
            "read_time" => record.read_time = entry.read_time,
            _ => return Err(not_updatable(field)),
        }
    }
    Ok(())
}

fn apply_chapter(record: &mut ResourceRecord, chapter: &Chapter, mask: &FieldMask) -> Result<()> {
    for field in &mask.paths {
        match field.to_ascii_lowercase().as_str() {
            "view_time" => record.view_time = chapter.view_time,
            "read_time" => record.read_time = chapter.read_time,
            _ => return Err(not_updatable(field)),
        }
    }
    Ok(())
}

#[async_trait]
impl ArchiveService for Interactivity {
    fn inner(&self) -> Option<&dyn ArchiveService> {
        Some(self.inner.as_ref())
    }

    async fn update_category(
        &self,
        caller: &Caller,
        req: UpdateCategoryRequest,
    ) -> Result<Category> {
        let category = required(req.category, "category")?;
        req.update_mask.check(Category::FIELDS)?;
        self.update_record(caller, &req.path, |record| {
            apply_category(record, &category, &req.update_mask)
        })
        .await?;
        self.get_category(caller, GetCategoryRequest { path: req.path })
            .await
    }

    async fn update_entry(&self, caller: &Caller, req: UpdateEntryRequest) -> Result<Entry> {
        let entry = required(req.entry, "entry")?;
        req.update_mask.check(Entry::FIELDS)?;
        self.update_record(caller, &req.path, |record| {
            apply_entry(record, &entry, &req.update_mask)
        })
        .await?;
        self.get_entry(caller, GetEntryRequest { path: req.path }).await
    }

    async fn update_chapter(
        &self,
        caller: &Caller,
        req: UpdateChapterRequest,
    ) -> Result<Chapter> {
        let chapter = required(req.chapter, "chapter")?;
        req.update_mask.check(Chapter::FIELDS)?;
        self.update_record(caller, &req.path, |record| {
            apply_chapter(record, &chapter, &req.update_mask)
        })
        .await?;
        self.get_chapter(caller, GetChapterRequest { path: req.path })
            .await
    }
}
