//! Resource, request and response messages exchanged with the archive
//! service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    #[default]
    Unspecified,
    Story,
    Anthology,
}

impl EntryKind {
    pub const VARIANTS: &'static [&'static str] = &["KIND_UNSPECIFIED", "STORY", "ANTHOLOGY"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "KIND_UNSPECIFIED",
            Self::Story => "STORY",
            Self::Anthology => "ANTHOLOGY",
        }
    }
}

/// Target format for content reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeType {
    #[default]
    Unspecified,
    Markdown,
    Html,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub path: String,
    pub display_name: String,
    pub description: String,
    pub hidden: bool,
}

impl Category {
    pub const FIELDS: &'static [&'static str] = &["path", "display_name", "description", "hidden"];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entry {
    pub path: String,
    pub display_name: String,
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    pub hidden: bool,
    pub starred: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_time: Option<DateTime<Utc>>,
}

impl Entry {
    pub const FIELDS: &'static [&'static str] = &[
        "path",
        "display_name",
        "kind",
        "update_time",
        "hidden",
        "starred",
        "view_time",
        "read_time",
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chapter {
    pub path: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_time: Option<DateTime<Utc>>,
}

impl Chapter {
    pub const FIELDS: &'static [&'static str] =
        &["path", "display_name", "update_time", "view_time", "read_time"];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub path: String,
    pub id: String,
    /// Accepted on create and update, never returned.
    #[serde(skip_serializing)]
    pub password: String,
}

impl User {
    pub const FIELDS: &'static [&'static str] = &["path", "id", "password"];
}

/// Names the resource fields an update applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMask {
    pub paths: Vec<String>,
}

impl FieldMask {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Rejects an empty mask and any path that does not name one of `fields`.
    pub fn check(&self, fields: &[&str]) -> Result<()> {
        if self.paths.is_empty() {
            return Err(ArchiveError::invalid_argument("update_mask must not be empty"));
        }
        for path in &self.paths {
            if !fields.iter().any(|field| field.eq_ignore_ascii_case(path)) {
                return Err(ArchiveError::invalid_argument(format!(
                    "update_mask path {path:?} is not a field of the resource"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListCategoriesRequest {
    pub filter: String,
    pub max_page_size: i32,
    pub page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListCategoriesResponse {
    pub results: Vec<Category>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetCategoryRequest {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateCategoryRequest {
    pub path: String,
    pub category: Option<Category>,
    pub update_mask: FieldMask,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListEntriesRequest {
    pub parent: String,
    pub filter: String,
    pub max_page_size: i32,
    pub page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListEntriesResponse {
    pub results: Vec<Entry>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetEntryRequest {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateEntryRequest {
    pub path: String,
    pub entry: Option<Entry>,
    pub update_mask: FieldMask,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadEntryRequest {
    pub path: String,
    pub mime_type: MimeType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListChaptersRequest {
    pub parent: String,
    pub filter: String,
    pub max_page_size: i32,
    pub page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListChaptersResponse {
    pub results: Vec<Chapter>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetChapterRequest {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateChapterRequest {
    pub path: String,
    pub chapter: Option<Chapter>,
    pub update_mask: FieldMask,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadChapterRequest {
    pub path: String,
    pub mime_type: MimeType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadContentResponse {
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateUserRequest {
    /// The user name; becomes the last segment of the user path.
    pub user_id: String,
    pub user: Option<User>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListUsersRequest {
    pub filter: String,
    pub max_page_size: i32,
    pub page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListUsersResponse {
    pub results: Vec<User>,
    pub next_page_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetUserRequest {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub path: String,
    pub user: Option<User>,
    pub update_mask: FieldMask,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteUserRequest {
    pub path: String,
}

/// A message addressed by a resource path.
pub trait Resource {
    fn path(&self) -> &str;
}

/// A paged list request.
pub trait ListRequest {
    fn filter(&self) -> &str;
    fn max_page_size(&self) -> i32;
    fn page_token(&self) -> &str;
}

/// A paged list response.
pub trait ListResponse {
    type Item: Resource;

    fn results(&self) -> &[Self::Item];
    fn results_mut(&mut self) -> &mut Vec<Self::Item>;
    fn next_page_token(&self) -> &str;
    fn set_next_page_token(&mut self, token: String);
}

macro_rules! resource {
    ($($ty:ty),+) => {$(
        impl Resource for $ty {
            fn path(&self) -> &str {
                &self.path
            }
        }
    )+};
}

resource!(Category, Entry, Chapter, User);

macro_rules! list_messages {
    ($($req:ty => $res:ty [$item:ty]),+ $(,)?) => {$(
        impl ListRequest for $req {
            fn filter(&self) -> &str {
                &self.filter
            }

            fn max_page_size(&self) -> i32 {
                self.max_page_size
            }

            fn page_token(&self) -> &str {
                &self.page_token
            }
        }

        impl ListResponse for $res {
            type Item = $item;

            fn results(&self) -> &[$item] {
                &self.results
            }

            fn results_mut(&mut self) -> &mut Vec<$item> {
                &mut self.results
            }

            fn next_page_token(&self) -> &str {
                &self.next_page_token
            }

            fn set_next_page_token(&mut self, token: String) {
                self.next_page_token = token;
            }
        }
    )+};
}

list_messages!(
    ListCategoriesRequest => ListCategoriesResponse [Category],
    ListEntriesRequest => ListEntriesResponse [Entry],
    ListChaptersRequest => ListChaptersResponse [Chapter],
    ListUsersRequest => ListUsersResponse [User],
);
