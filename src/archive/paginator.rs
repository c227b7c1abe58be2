use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::ArchiveService;
use crate::auth::Caller;
use crate::error::{ArchiveError, Result};
use crate::filter::{Fields, FilterEnv, Filterable, Program};
use crate::model::{
    Category, Chapter, Entry, ListCategoriesRequest, ListCategoriesResponse, ListChaptersRequest,
    ListChaptersResponse, ListEntriesRequest, ListEntriesResponse, ListRequest, ListResponse,
    ListUsersRequest, ListUsersResponse, Resource, User,
};
use crate::token::{
    self, ListCategoriesPageToken, ListChaptersPageToken, ListEntriesPageToken,
    ListUsersPageToken, PageToken,
};

/// Applies page tokens, filters and page sizes to every list operation.
///
/// The inner layers always return everything they have for a request; this
/// layer resumes after the token's cursor, drops elements the filter
/// rejects and cuts the rest down to `max_page_size`, handing out a token
/// that points at the last element kept.
pub struct Paginator {
    inner: Arc<dyn ArchiveService>,
    categories: FilterEnv<Category>,
    entries: FilterEnv<Entry>,
    chapters: FilterEnv<Chapter>,
    users: FilterEnv<User>,
}

impl Paginator {
    pub fn new(inner: Arc<dyn ArchiveService>) -> Self {
        Self {
            inner,
            categories: FilterEnv::new(),
            entries: FilterEnv::new(),
            chapters: FilterEnv::new(),
            users: FilterEnv::new(),
        }
    }
}

/// How one list operation resumes from and hands out page tokens.
trait Pages: ListResponse {
    type Token: PageToken;

    /// Drops the results a previous page already returned.
    fn resume(results: &mut Vec<Self::Item>, cursor: &Self::Token);

    /// The token for a page cut short after `last`.
    fn after(last: &Self::Item, cursor: Option<&Self::Token>) -> Self::Token;

    /// The token for a page returned whole, if the inner layer has more.
    fn next(&self, _cursor: Option<&Self::Token>) -> Option<Self::Token> {
        None
    }
}

impl Pages for ListCategoriesResponse {
    type Token = ListCategoriesPageToken;

    fn resume(results: &mut Vec<Category>, cursor: &Self::Token) {
        resume_categories(results, &cursor.after_category);
    }

    fn after(last: &Category, _cursor: Option<&Self::Token>) -> Self::Token {
        ListCategoriesPageToken {
            after_category: last.path.clone(),
        }
    }
}

impl Pages for ListEntriesResponse {
    type Token = ListEntriesPageToken;

    fn resume(results: &mut Vec<Entry>, cursor: &Self::Token) {
        let start = cursor
            .start_update_time
            .as_ref()
            .and_then(token::from_timestamp);
        resume_entries(results, &cursor.after_entry, start);
    }

    fn after(last: &Entry, cursor: Option<&Self::Token>) -> Self::Token {
        ListEntriesPageToken {
            page: upstream_page(cursor),
            after_entry: last.path.clone(),
            start_update_time: last.update_time.map(token::to_timestamp),
        }
    }

    // This upstream page is used up; continue at the start of the next.
    fn next(&self, cursor: Option<&Self::Token>) -> Option<Self::Token> {
        (!self.next_page_token.is_empty()).then(|| ListEntriesPageToken {
            page: upstream_page(cursor) + 1,
            after_entry: String::new(),
            start_update_time: None,
        })
    }
}

impl Pages for ListChaptersResponse {
    type Token = ListChaptersPageToken;

    fn resume(results: &mut Vec<Chapter>, cursor: &Self::Token) {
        resume_exact(results, &cursor.after_chapter);
    }

    fn after(last: &Chapter, _cursor: Option<&Self::Token>) -> Self::Token {
        ListChaptersPageToken {
            after_chapter: last.path.clone(),
        }
    }
}

impl Pages for ListUsersResponse {
    type Token = ListUsersPageToken;

    fn resume(results: &mut Vec<User>, cursor: &Self::Token) {
        resume_exact(results, &cursor.after_user);
    }

    fn after(last: &User, _cursor: Option<&Self::Token>) -> Self::Token {
        ListUsersPageToken {
            after_user: last.path.clone(),
        }
    }
}

fn upstream_page(cursor: Option<&ListEntriesPageToken>) -> u32 {
    cursor.map_or(1, |cursor| cursor.page)
}

/// Runs one list operation through `list` and pages its results.
async fn paginate<Req, Res, F, Fut>(env: &FilterEnv<Res::Item>, req: Req, list: F) -> Result<Res>
where
    Req: ListRequest,
    Res: Pages,
    Res::Item: Filterable,
    F: FnOnce(Req) -> Fut,
    Fut: Future<Output = Result<Res>>,
{
    let cursor = token::decode_optional::<Res::Token>(req.page_token())?;
    // A bad filter fails here, before the inner layer runs.
    let program = compile(env, req.filter())?;
    let max_page_size = req.max_page_size();

    let mut res = list(req).await?;
    if let Some(cursor) = &cursor {
        Res::resume(res.results_mut(), cursor);
    }
    let next = filter_and_slice(res.results_mut(), program.as_ref(), max_page_size)
        .map(|last| Res::after(last, cursor.as_ref()))
        .or_else(|| res.next(cursor.as_ref()));
    let next_page_token = match next {
        Some(next) => encode(&next)?,
        None => String::new(),
    };
    res.set_next_page_token(next_page_token);
    Ok(res)
}

fn compile<T: Filterable>(env: &FilterEnv<T>, filter: &str) -> Result<Option<Program>> {
    if filter.is_empty() {
        return Ok(None);
    }
    Ok(Some(env.compile(filter)?))
}

fn encode<T: PageToken>(token: &T) -> Result<String> {
    token::encode(token).map_err(|err| ArchiveError::internal(format!("encode page token: {err}")))
}

/// Filters `results` and cuts them to `max_page_size`. Returns the last
/// element kept when the page was cut short.
fn filter_and_slice<'a, T: Fields>(
    results: &'a mut Vec<T>,
    program: Option<&Program>,
    max_page_size: i32,
) -> Option<&'a T> {
    if let Some(program) = program {
        results.retain(|item| program.matches(item));
    }
    let size = usize::try_from(max_page_size).ok().filter(|&size| size > 0)?;
    if results.len() <= size {
        return None;
    }
    results.truncate(size);
    results.last()
}

/// Drops everything up to and including `after`. When `after` is gone,
/// resumes from the first category sorting after it.
fn resume_categories(results: &mut Vec<Category>, after: &str) {
    let start = match results.iter().position(|c| c.path == after) {
        Some(index) => index + 1,
        None => results
            .iter()
            .position(|c| c.path.as_str() > after)
            .unwrap_or(results.len()),
    };
    results.drain(..start);
}

/// Drops everything up to and including the entry at `after` last updated
/// at `start`. When that entry is gone, resumes from the first entry updated
/// at or after `start`.
fn resume_entries(results: &mut Vec<Entry>, after: &str, start: Option<DateTime<Utc>>) {
    if after.is_empty() {
        return;
    }
    let start_index = match results
        .iter()
        .position(|e| e.path == after && e.update_time == start)
    {
        Some(index) => index + 1,
        None => results
            .iter()
            .position(|e| e.update_time >= start)
            .unwrap_or(results.len()),
    };
    results.drain(..start_index);
}

/// Drops everything up to and including `after`, if present.
fn resume_exact<T: Resource>(results: &mut Vec<T>, after: &str) {
    if let Some(index) = results.iter().position(|item| item.path() == after) {
        results.drain(..=index);
    }
}

#[async_trait]
impl ArchiveService for Paginator {
    fn inner(&self) -> Option<&dyn ArchiveService> {
        Some(self.inner.as_ref())
    }

    async fn list_categories(
        &self,
        caller: &Caller,
        req: ListCategoriesRequest,
    ) -> Result<ListCategoriesResponse> {
        paginate(&self.categories, req, |req| self.inner.list_categories(caller, req)).await
    }

    async fn list_entries(
        &self,
        caller: &Caller,
        req: ListEntriesRequest,
    ) -> Result<ListEntriesResponse> {
        paginate(&self.entries, req, |req| self.inner.list_entries(caller, req)).await
    }

    async fn list_chapters(
        &self,
        caller: &Caller,
        req: ListChaptersRequest,
    ) -> Result<ListChaptersResponse> {
        paginate(&self.chapters, req, |req| self.inner.list_chapters(caller, req)).await
    }

    async fn list_users(&self, caller: &Caller, req: ListUsersRequest) -> Result<ListUsersResponse> {
        paginate(&self.users, req, |req| self.inner.list_users(caller, req)).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;
    use crate::archive::fake::Canned;
    use crate::error::Code;
    use crate::model::EntryKind;
    use crate::store::UserRecord;

    fn at(hour: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 4, 1, hour, 0, 0).unwrap())
    }

    fn entry(name: &str, kind: EntryKind, hour: u32) -> Entry {
        Entry {
            path: format!("categories/fiction/entries/{name}"),
            display_name: name.to_owned(),
            kind,
            update_time: at(hour),
            ..Default::default()
        }
    }

    fn category(name: &str) -> Category {
        Category {
            path: format!("categories/{name}"),
            display_name: name.to_owned(),
            ..Default::default()
        }
    }

    fn names<T: Resource>(items: &[T]) -> Vec<&str> {
        items
            .iter()
            .map(|item| item.path().rsplit('/').next().unwrap_or_default())
            .collect()
    }

    fn caller() -> Caller {
        Caller::new(UserRecord::default())
    }

    #[test]
    fn categories_resume_after_cursor_or_next_in_order() {
        let all = || vec![category("a"), category("c"), category("e")];

        let mut results = all();
        resume_categories(&mut results, "categories/c");
        assert_eq!(names(&results), ["e"]);

        let mut results = all();
        resume_categories(&mut results, "categories/b");
        assert_eq!(names(&results), ["c", "e"]);

        let mut results = all();
        resume_categories(&mut results, "categories/z");
        assert!(results.is_empty());
    }

    #[test]
    fn entries_resume_by_path_and_time() {
        let all = || {
            vec![
                entry("a", EntryKind::Story, 1),
                entry("b", EntryKind::Story, 2),
                entry("c", EntryKind::Story, 3),
            ]
        };

        let mut results = all();
        resume_entries(&mut results, "categories/fiction/entries/b", at(2));
        assert_eq!(names(&results), ["c"]);

        // Same path, different time: the entry moved, so resume by time.
        let mut results = all();
        resume_entries(&mut results, "categories/fiction/entries/c", at(2));
        assert_eq!(names(&results), ["b", "c"]);

        let mut results = all();
        resume_entries(&mut results, "categories/fiction/entries/gone", at(9));
        assert!(results.is_empty());

        let mut results = all();
        resume_entries(&mut results, "", None);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn exact_resume_leaves_results_when_cursor_is_gone() {
        let mut results = vec![category("a"), category("b")];
        resume_exact(&mut results, "categories/a");
        assert_eq!(names(&results), ["b"]);
        resume_exact(&mut results, "categories/zzz");
        assert_eq!(names(&results), ["b"]);
    }

    #[test]
    fn slicing_only_cuts_oversized_pages() {
        let mut results = vec![category("a"), category("b")];
        assert!(filter_and_slice(&mut results, None, 2).is_none());
        assert!(filter_and_slice(&mut results, None, 0).is_none());
        let last = filter_and_slice(&mut results, None, 1).map(|c| c.path.clone());
        assert_eq!(last.as_deref(), Some("categories/a"));
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn filtered_pages_walk_every_match_once() {
        let canned = Canned {
            entries: vec![
                entry("one", EntryKind::Story, 5),
                entry("two", EntryKind::Anthology, 4),
                entry("three", EntryKind::Story, 3),
                entry("four", EntryKind::Anthology, 2),
                entry("five", EntryKind::Story, 1),
            ],
            ..Default::default()
        };
        let paginator = Paginator::new(Arc::new(canned));
        let caller = caller();

        let mut seen = Vec::new();
        let mut page_token = String::new();
        for _ in 0..3 {
            let res = paginator
                .list_entries(
                    &caller,
                    ListEntriesRequest {
                        parent: "categories/fiction".into(),
                        filter: "this.kind == STORY".into(),
                        max_page_size: 1,
                        page_token: page_token.clone(),
                    },
                )
                .await
                .unwrap();
            assert_eq!(res.results.len(), 1);
            seen.push(res.results[0].display_name.clone());
            page_token = res.next_page_token;
        }
        assert_eq!(seen, ["one", "three", "five"]);
        assert!(page_token.is_empty());
    }

    #[tokio::test]
    async fn exhausted_upstream_pages_advance() {
        let canned = Canned {
            entries: vec![entry("one", EntryKind::Story, 1)],
            entries_token: "more".into(),
            ..Default::default()
        };
        let paginator = Paginator::new(Arc::new(canned));

        let res = paginator
            .list_entries(&caller(), ListEntriesRequest::default())
            .await
            .unwrap();
        let next: ListEntriesPageToken = token::decode(&res.next_page_token).unwrap();
        assert_eq!(next.page, 2);
        assert!(next.after_entry.is_empty());
        assert!(next.start_update_time.is_none());
    }

    /// Serves `pages` as successive upstream listing pages.
    struct Paged {
        pages: Vec<Vec<Entry>>,
    }

    #[async_trait]
    impl ArchiveService for Paged {
        fn inner(&self) -> Option<&dyn ArchiveService> {
            None
        }

        async fn list_entries(
            &self,
            _caller: &Caller,
            req: ListEntriesRequest,
        ) -> Result<ListEntriesResponse> {
            let page = token::decode_optional::<ListEntriesPageToken>(&req.page_token)?
                .map_or(1, |cursor| cursor.page);
            let index = usize::try_from(page).unwrap() - 1;
            Ok(ListEntriesResponse {
                results: self.pages.get(index).cloned().unwrap_or_default(),
                next_page_token: if index + 1 < self.pages.len() {
                    "more".into()
                } else {
                    String::new()
                },
            })
        }
    }

    fn paged_archive() -> Vec<Vec<Entry>> {
        vec![
            vec![
                entry("a", EntryKind::Story, 23),
                entry("b", EntryKind::Anthology, 22),
                entry("c", EntryKind::Story, 21),
                entry("d", EntryKind::Story, 20),
            ],
            vec![
                entry("e", EntryKind::Anthology, 19),
                entry("f", EntryKind::Anthology, 18),
            ],
            vec![entry("g", EntryKind::Anthology, 17)],
            vec![
                entry("h", EntryKind::Story, 16),
                entry("i", EntryKind::Anthology, 15),
                entry("j", EntryKind::Story, 14),
            ],
        ]
    }

    async fn walk(paginator: &Paginator, filter: &str, max_page_size: i32) -> Vec<String> {
        let mut seen = Vec::new();
        let mut page_token = String::new();
        for _ in 0..50 {
            let res = paginator
                .list_entries(
                    &caller(),
                    ListEntriesRequest {
                        parent: "categories/fiction".into(),
                        filter: filter.into(),
                        max_page_size,
                        page_token,
                    },
                )
                .await
                .unwrap();
            if max_page_size > 0 {
                assert!(res.results.len() <= usize::try_from(max_page_size).unwrap());
            }
            seen.extend(res.results.into_iter().map(|e| e.display_name));
            page_token = res.next_page_token;
            if page_token.is_empty() {
                return seen;
            }
        }
        panic!("{filter:?} at page size {max_page_size} never ran out of pages");
    }

    #[tokio::test]
    async fn following_tokens_rebuilds_the_filtered_set() {
        let paginator = Paginator::new(Arc::new(Paged {
            pages: paged_archive(),
        }));
        let all: Vec<Entry> = paged_archive().into_iter().flatten().collect();

        let filters: [(&str, fn(&Entry) -> bool); 4] = [
            ("", |_| true),
            ("this.kind == STORY", |e| e.kind == EntryKind::Story),
            ("this.kind == ANTHOLOGY", |e| e.kind == EntryKind::Anthology),
            ("this.display_name == \"g\"", |e| e.display_name == "g"),
        ];
        for (filter, keep) in filters {
            let expected: Vec<String> = all
                .iter()
                .filter(|e| keep(e))
                .map(|e| e.display_name.clone())
                .collect();
            for max_page_size in [1, 2, 3, 20, 0] {
                assert_eq!(
                    walk(&paginator, filter, max_page_size).await,
                    expected,
                    "filter {filter:?}, page size {max_page_size}"
                );
            }
        }
    }

    #[tokio::test]
    async fn bad_tokens_and_filters_never_reach_inner() {
        let canned = Arc::new(Canned {
            categories: vec![category("a")],
            ..Default::default()
        });
        let paginator = Paginator::new(canned.clone());

        for req in [
            ListCategoriesRequest {
                page_token: "!!!".into(),
                ..Default::default()
            },
            ListCategoriesRequest {
                filter: "this.nope == 1".into(),
                ..Default::default()
            },
        ] {
            let err = paginator.list_categories(&caller(), req).await.unwrap_err();
            assert_eq!(err.code(), Code::InvalidArgument);
        }
        assert_eq!(canned.calls(), 0);
    }
}
