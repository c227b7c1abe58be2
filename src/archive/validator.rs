use std::sync::Arc;

use async_trait::async_trait;

use super::ArchiveService;
use crate::auth::Caller;
use crate::error::{ArchiveError, Result};
use crate::model::{
    Category, Chapter, CreateUserRequest, DeleteUserRequest, Entry, EntryKind, GetCategoryRequest,
    GetChapterRequest, GetEntryRequest, GetUserRequest, ListCategoriesRequest,
    ListCategoriesResponse, ListChaptersRequest, ListChaptersResponse, ListEntriesRequest,
    ListEntriesResponse, ListUsersRequest, ListUsersResponse, MimeType, ReadChapterRequest,
    ReadContentResponse, ReadEntryRequest, UpdateCategoryRequest, UpdateChapterRequest,
    UpdateEntryRequest, UpdateUserRequest, User,
};
use crate::slug::{self, ResourceKind};
use crate::store::valid_username;

const MAX_PAGE_SIZE: i32 = 1000;
const MAX_FILTER_BYTES: usize = 1024;
const MAX_TOKEN_BYTES: usize = 512;
const PASSWORD_BYTES: std::ops::RangeInclusive<usize> = 8..=72;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct Violation {
    field: &'static str,
    reason: String,
}

impl Violation {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    pub fn field(&self) -> &str {
        self.field
    }
}

/// Structural checks on a message.
pub trait Validate {
    fn validate(&self) -> Result<(), Violation>;
}

fn resource_path(field: &'static str, kind: ResourceKind, value: &str) -> Result<(), Violation> {
    if slug::is_path(kind, value) {
        Ok(())
    } else {
        Err(Violation::new(field, format!("{value:?} is not a {kind} path")))
    }
}

fn user_path(field: &'static str, value: &str) -> Result<(), Violation> {
    if slug::is_user_path(value) {
        Ok(())
    } else {
        Err(Violation::new(field, format!("{value:?} is not a user path")))
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), Violation> {
    if value.is_empty() {
        Err(Violation::new(field, "must not be empty"))
    } else {
        Ok(())
    }
}

fn present<T>(field: &'static str, value: &Option<T>) -> Result<(), Violation> {
    match value {
        Some(_) => Ok(()),
        None => Err(Violation::new(field, "is required")),
    }
}

fn list_request(filter: &str, max_page_size: i32, page_token: &str) -> Result<(), Violation> {
    if !(0..=MAX_PAGE_SIZE).contains(&max_page_size) {
        return Err(Violation::new(
            "max_page_size",
            format!("must be between 0 and {MAX_PAGE_SIZE}"),
        ));
    }
    if filter.len() > MAX_FILTER_BYTES {
        return Err(Violation::new(
            "filter",
            format!("must be at most {MAX_FILTER_BYTES} bytes"),
        ));
    }
    if page_token.len() > MAX_TOKEN_BYTES {
        return Err(Violation::new(
            "page_token",
            format!("must be at most {MAX_TOKEN_BYTES} bytes"),
        ));
    }
    if !page_token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(Violation::new("page_token", "must be base64url"));
    }
    Ok(())
}

fn mime_type(value: MimeType) -> Result<(), Violation> {
    if value == MimeType::Unspecified {
        return Err(Violation::new("mime_type", "must be specified"));
    }
    Ok(())
}

/// A resource carried by an update must name the request's path, if anything.
fn same_path(field: &'static str, resource_path: &str, path: &str) -> Result<(), Violation> {
    if resource_path.is_empty() || resource_path == path {
        Ok(())
    } else {
        Err(Violation::new(field, format!("does not match path {path:?}")))
    }
}

impl Validate for ListCategoriesRequest {
    fn validate(&self) -> Result<(), Violation> {
        list_request(&self.filter, self.max_page_size, &self.page_token)
    }
}

impl Validate for GetCategoryRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Category, &self.path)
    }
}

impl Validate for UpdateCategoryRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Category, &self.path)?;
        present("category", &self.category)?;
        let category = self.category.as_ref().map_or("", |c| c.path.as_str());
        same_path("category.path", category, &self.path)
    }
}

impl Validate for ListEntriesRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("parent", ResourceKind::Category, &self.parent)?;
        list_request(&self.filter, self.max_page_size, &self.page_token)
    }
}

impl Validate for GetEntryRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Entry, &self.path)
    }
}

impl Validate for UpdateEntryRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Entry, &self.path)?;
        present("entry", &self.entry)?;
        let entry = self.entry.as_ref().map_or("", |e| e.path.as_str());
        same_path("entry.path", entry, &self.path)
    }
}

impl Validate for ReadEntryRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Entry, &self.path)?;
        mime_type(self.mime_type)
    }
}

impl Validate for ListChaptersRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("parent", ResourceKind::Entry, &self.parent)?;
        list_request(&self.filter, self.max_page_size, &self.page_token)
    }
}

impl Validate for GetChapterRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Chapter, &self.path)
    }
}

impl Validate for UpdateChapterRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Chapter, &self.path)?;
        present("chapter", &self.chapter)?;
        let chapter = self.chapter.as_ref().map_or("", |c| c.path.as_str());
        same_path("chapter.path", chapter, &self.path)
    }
}

impl Validate for ReadChapterRequest {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Chapter, &self.path)?;
        mime_type(self.mime_type)
    }
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), Violation> {
        if !valid_username(&self.user_id) {
            return Err(Violation::new(
                "user_id",
                "must be 3-64 letters, digits or underscores",
            ));
        }
        let Some(user) = &self.user else {
            return Err(Violation::new("user", "is required"));
        };
        if !PASSWORD_BYTES.contains(&user.password.len()) {
            return Err(Violation::new(
                "user.password",
                format!(
                    "must be {} to {} bytes",
                    PASSWORD_BYTES.start(),
                    PASSWORD_BYTES.end()
                ),
            ));
        }
        Ok(())
    }
}

impl Validate for ListUsersRequest {
    fn validate(&self) -> Result<(), Violation> {
        list_request(&self.filter, self.max_page_size, &self.page_token)
    }
}

impl Validate for GetUserRequest {
    fn validate(&self) -> Result<(), Violation> {
        user_path("path", &self.path)
    }
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), Violation> {
        user_path("path", &self.path)?;
        present("user", &self.user)
    }
}

impl Validate for DeleteUserRequest {
    fn validate(&self) -> Result<(), Violation> {
        user_path("path", &self.path)
    }
}

impl Validate for Category {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Category, &self.path)?;
        non_empty("display_name", &self.display_name)
    }
}

impl Validate for Entry {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Entry, &self.path)?;
        non_empty("display_name", &self.display_name)?;
        if self.kind == EntryKind::Unspecified {
            return Err(Violation::new("kind", "must be specified"));
        }
        Ok(())
    }
}

impl Validate for Chapter {
    fn validate(&self) -> Result<(), Violation> {
        resource_path("path", ResourceKind::Chapter, &self.path)?;
        non_empty("display_name", &self.display_name)
    }
}

impl Validate for User {
    fn validate(&self) -> Result<(), Violation> {
        user_path("path", &self.path)?;
        non_empty("id", &self.id)
    }
}

impl Validate for ReadContentResponse {
    fn validate(&self) -> Result<(), Violation> {
        Ok(())
    }
}

impl Validate for () {
    fn validate(&self) -> Result<(), Violation> {
        Ok(())
    }
}

macro_rules! validate_results {
    ($($res:ty),+) => {$(
        impl Validate for $res {
            fn validate(&self) -> Result<(), Violation> {
                self.results.iter().try_for_each(Validate::validate)
            }
        }
    )+};
}

validate_results!(
    ListCategoriesResponse,
    ListEntriesResponse,
    ListChaptersResponse,
    ListUsersResponse
);

/// Outermost layer: refuses malformed requests before anything else sees
/// them and logs responses that come back malformed.
pub struct Validator {
    inner: Arc<dyn ArchiveService>,
}

impl Validator {
    pub fn new(inner: Arc<dyn ArchiveService>) -> Self {
        Self { inner }
    }
}

fn check_request(handler: &'static str, req: &impl Validate) -> Result<()> {
    req.validate().map_err(|violation| {
        tracing::debug!(handler, %violation, "rejected request");
        ArchiveError::invalid_argument(violation.to_string())
    })
}

fn check_response<T: Validate>(handler: &'static str, res: Result<T>) -> Result<T> {
    if let Ok(message) = &res {
        if let Err(violation) = message.validate() {
            tracing::warn!(handler, %violation, "response failed validation");
        }
    }
    res
}

#[async_trait]
impl ArchiveService for Validator {
    fn inner(&self) -> Option<&dyn ArchiveService> {
        Some(self.inner.as_ref())
    }

    async fn list_categories(
        &self,
        caller: &Caller,
        req: ListCategoriesRequest,
    ) -> Result<ListCategoriesResponse> {
        check_request("ListCategories", &req)?;
        check_response(
            "ListCategories",
            self.inner.list_categories(caller, req).await,
        )
    }

    async fn get_category(&self, caller: &Caller, req: GetCategoryRequest) -> Result<Category> {
        check_request("GetCategory", &req)?;
        check_response("GetCategory", self.inner.get_category(caller, req).await)
    }

    async fn update_category(
        &self,
        caller: &Caller,
        req: UpdateCategoryRequest,
    ) -> Result<Category> {
        check_request("UpdateCategory", &req)?;
        check_response(
            "UpdateCategory",
            self.inner.update_category(caller, req).await,
        )
    }

    async fn list_entries(
        &self,
        caller: &Caller,
        req: ListEntriesRequest,
    ) -> Result<ListEntriesResponse> {
        check_request("ListEntries", &req)?;
        check_response("ListEntries", self.inner.list_entries(caller, req).await)
    }

    async fn get_entry(&self, caller: &Caller, req: GetEntryRequest) -> Result<Entry> {
        check_request("GetEntry", &req)?;
        check_response("GetEntry", self.inner.get_entry(caller, req).await)
    }

    async fn update_entry(&self, caller: &Caller, req: UpdateEntryRequest) -> Result<Entry> {
        check_request("UpdateEntry", &req)?;
        check_response("UpdateEntry", self.inner.update_entry(caller, req).await)
    }

    async fn read_entry(
        &self,
        caller: &Caller,
        req: ReadEntryRequest,
    ) -> Result<ReadContentResponse> {
        check_request("ReadEntry", &req)?;
        check_response("ReadEntry", self.inner.read_entry(caller, req).await)
    }

    async fn list_chapters(
        &self,
        caller: &Caller,
        req: ListChaptersRequest,
    ) -> Result<ListChaptersResponse> {
        check_request("ListChapters", &req)?;
        check_response("ListChapters", self.inner.list_chapters(caller, req).await)
    }

    async fn get_chapter(&self, caller: &Caller, req: GetChapterRequest) -> Result<Chapter> {
        check_request("GetChapter", &req)?;
        check_response("GetChapter", self.inner.get_chapter(caller, req).await)
    }

    async fn update_chapter(&self, caller: &Caller, req: UpdateChapterRequest) -> Result<Chapter> {
        check_request("UpdateChapter", &req)?;
        check_response(
            "UpdateChapter",
            self.inner.update_chapter(caller, req).await,
        )
    }

    async fn read_chapter(
        &self,
        caller: &Caller,
        req: ReadChapterRequest,
    ) -> Result<ReadContentResponse> {
        check_request("ReadChapter", &req)?;
        check_response("ReadChapter", self.inner.read_chapter(caller, req).await)
    }

    async fn create_user(&self, caller: &Caller, req: CreateUserRequest) -> Result<User> {
        check_request("CreateUser", &req)?;
        check_response("CreateUser", self.inner.create_user(caller, req).await)
    }

    async fn list_users(&self, caller: &Caller, req: ListUsersRequest) -> Result<ListUsersResponse> {
        check_request("ListUsers", &req)?;
        check_response("ListUsers", self.inner.list_users(caller, req).await)
    }

    async fn get_user(&self, caller: &Caller, req: GetUserRequest) -> Result<User> {
        check_request("GetUser", &req)?;
        check_response("GetUser", self.inner.get_user(caller, req).await)
    }

    async fn update_user(&self, caller: &Caller, req: UpdateUserRequest) -> Result<User> {
        check_request("UpdateUser", &req)?;
        check_response("UpdateUser", self.inner.update_user(caller, req).await)
    }

    async fn delete_user(&self, caller: &Caller, req: DeleteUserRequest) -> Result<()> {
        check_request("DeleteUser", &req)?;
        check_response("DeleteUser", self.inner.delete_user(caller, req).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fake::Canned;
    use crate::error::Code;
    use crate::model::FieldMask;
    use crate::store::UserRecord;

    const ENTRY: &str = "categories/fiction/entries/the-long-road";

    fn caller() -> Caller {
        Caller::new(UserRecord::default())
    }

    fn field_of(err: Violation) -> String {
        err.field().to_owned()
    }

    #[test]
    fn list_requests_are_bounded() {
        let mut req = ListEntriesRequest {
            parent: "categories/fiction".into(),
            max_page_size: MAX_PAGE_SIZE,
            ..Default::default()
        };
        assert!(req.validate().is_ok());

        req.max_page_size = -1;
        assert_eq!(field_of(req.validate().unwrap_err()), "max_page_size");
        req.max_page_size = MAX_PAGE_SIZE + 1;
        assert_eq!(field_of(req.validate().unwrap_err()), "max_page_size");

        req.max_page_size = 10;
        req.filter = "x".repeat(MAX_FILTER_BYTES + 1);
        assert_eq!(field_of(req.validate().unwrap_err()), "filter");

        req.filter.clear();
        req.page_token = "abc+/=".into();
        assert_eq!(field_of(req.validate().unwrap_err()), "page_token");

        req.page_token.clear();
        req.parent = "categories/fiction/entries/x".into();
        assert_eq!(field_of(req.validate().unwrap_err()), "parent");
    }

    #[test]
    fn create_user_rules() {
        let req = |user_id: &str, password: &str| CreateUserRequest {
            user_id: user_id.into(),
            user: Some(User {
                password: password.into(),
                ..Default::default()
            }),
        };
        assert!(req("alice_1", "correct-horse").validate().is_ok());
        assert_eq!(field_of(req("al", "correct-horse").validate().unwrap_err()), "user_id");
        assert_eq!(
            field_of(req("alice", "short").validate().unwrap_err()),
            "user.password"
        );
        assert_eq!(
            field_of(req("alice", &"p".repeat(73)).validate().unwrap_err()),
            "user.password"
        );
        let missing = CreateUserRequest {
            user_id: "alice".into(),
            user: None,
        };
        assert_eq!(field_of(missing.validate().unwrap_err()), "user");
    }

    #[test]
    fn update_requests_need_the_resource() {
        let mut req = UpdateEntryRequest {
            path: ENTRY.into(),
            entry: None,
            update_mask: FieldMask::new(["starred"]),
        };
        assert_eq!(field_of(req.validate().unwrap_err()), "entry");

        req.entry = Some(Entry {
            path: "categories/fiction/entries/other".into(),
            ..Default::default()
        });
        assert_eq!(field_of(req.validate().unwrap_err()), "entry.path");

        req.entry = Some(Entry::default());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn reads_need_a_target_format() {
        let mut req = ReadEntryRequest {
            path: ENTRY.into(),
            mime_type: MimeType::Unspecified,
        };
        assert_eq!(field_of(req.validate().unwrap_err()), "mime_type");
        req.mime_type = MimeType::Markdown;
        assert!(req.validate().is_ok());
    }

    #[tokio::test]
    async fn invalid_requests_stop_here() {
        let canned = Arc::new(Canned::default());
        let validator = Validator::new(canned.clone());

        let err = validator
            .get_entry(&caller(), GetEntryRequest { path: "entries/x".into() })
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(err.message().starts_with("path:"));
        assert_eq!(canned.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_responses_still_return() {
        let canned = Arc::new(Canned {
            entries: vec![Entry {
                path: ENTRY.into(),
                ..Default::default()
            }],
            ..Default::default()
        });
        let validator = Validator::new(canned.clone());

        let entry = validator
            .get_entry(&caller(), GetEntryRequest { path: ENTRY.into() })
            .await
            .unwrap();
        assert_eq!(entry.kind, EntryKind::Unspecified);
        assert_eq!(canned.calls(), 1);
    }
}
