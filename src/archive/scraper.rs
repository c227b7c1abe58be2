//! Innermost layer: scrapes categories, entries and chapters from the
//! upstream directory listings and reads their content.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Datelike as _, NaiveDate, TimeZone as _, Utc};
use chrono_tz::Tz;
use scraper::{ElementRef, Html, Selector};

use super::ArchiveService;
use crate::auth::Caller;
use crate::config::Config;
use crate::content;
use crate::error::{ArchiveError, Result};
use crate::model::{
    Category, Chapter, Entry, EntryKind, GetCategoryRequest, GetChapterRequest, GetEntryRequest,
    ListCategoriesRequest, ListCategoriesResponse, ListChaptersRequest, ListChaptersResponse,
    ListEntriesRequest, ListEntriesResponse, MimeType, ReadChapterRequest, ReadContentResponse,
    ReadEntryRequest,
};
use crate::slug;
use crate::token::{self, ListEntriesPageToken};
use crate::upstream::{Page, Upstream, UpstreamError};

const ROW_SELECTOR: &str = "div.ftr,tr:not(:first-child)";
const CATEGORY_SELECTOR: &str = ".list-group-item";
const PAGINATION_SELECTOR: &str = "#scroll";

struct Selectors {
    rows: Selector,
    categories: Selector,
    anchor: Selector,
    pagination: Selector,
}

impl Selectors {
    fn new() -> anyhow::Result<Self> {
        Ok(Self {
            rows: selector(ROW_SELECTOR)?,
            categories: selector(CATEGORY_SELECTOR)?,
            anchor: selector("a")?,
            pagination: selector(PAGINATION_SELECTOR)?,
        })
    }
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("parse selector {css:?}: {err:?}"))
}

pub struct Scraper {
    upstream: Upstream,
    time_zone: Tz,
    selectors: Selectors,
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized listing timestamp {0:?}")]
pub struct RowTimeError(String);

#[derive(Debug, thiserror::Error)]
enum RowError {
    #[error("row has no {0} cell")]
    MissingCell(&'static str),
    #[error("row has no link")]
    MissingLink,
    #[error(transparent)]
    Time(#[from] RowTimeError),
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq)]
struct Row {
    kind: EntryKind,
    update_time: DateTime<Utc>,
    slug: String,
    title: String,
}

struct Listing {
    rows: Vec<Row>,
    paginated: bool,
}

impl Scraper {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let base = config.root_url()?;
        Ok(Self {
            upstream: Upstream::new(&base, &config.http)?,
            time_zone: config.time_zone()?,
            selectors: Selectors::new()?,
        })
    }

    fn parse_categories(&self, html: &str) -> Vec<Category> {
        let document = Html::parse_document(html);
        let base_path = self.upstream.base().path();

        document
            .select(&self.selectors.categories)
            .filter_map(|item| {
                let anchor = item.select(&self.selectors.anchor).next();
                let href = anchor
                    .and_then(|a| a.value().attr("href"))
                    .unwrap_or_default();
                let category_slug = href.strip_prefix(base_path).unwrap_or(href);
                let path = match slug::category_path(category_slug) {
                    Ok(path) => path,
                    Err(err) => {
                        tracing::warn!(href, %err, "skipping unparseable category");
                        return None;
                    }
                };

                let display_name = anchor.map(element_text).unwrap_or_default();
                let description = item
                    .children()
                    .filter_map(|node| node.value().as_text())
                    .map(|text| text.trim())
                    .find(|text| !text.is_empty())
                    .map(|text| text.trim_start_matches(['-', ' ']).trim().to_owned())
                    .unwrap_or_default();

                Some(Category {
                    path,
                    display_name,
                    description,
                    hidden: false,
                })
            })
            .collect()
    }

    fn parse_listing(&self, page: &Page, parent_slug: &str) -> Listing {
        let now = Utc::now();
        let parent_time = page.last_modified_time().unwrap_or(now);
        let document = Html::parse_document(&page.text());
        let paginated = document.select(&self.selectors.pagination).next().is_some();

        let rows = document
            .select(&self.selectors.rows)
            .filter_map(
                |row| match self.parse_row(row, parent_slug, parent_time, now) {
                    Ok(row) => Some(row),
                    Err(err) => {
                        tracing::warn!(url = %page.url, %err, "skipping unparseable listing row");
                        None
                    }
                },
            )
            .collect();

        Listing { rows, paginated }
    }

    fn parse_row(
        &self,
        row: ElementRef<'_>,
        parent_slug: &str,
        parent_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> std::result::Result<Row, RowError> {
        let mut cells = row.children().filter_map(ElementRef::wrap);

        let kind_cell = cells.next().ok_or(RowError::MissingCell("kind"))?;
        let kind = if element_text(kind_cell) == "Dir" {
            EntryKind::Anthology
        } else {
            EntryKind::Story
        };

        let time_cell = cells.next().ok_or(RowError::MissingCell("timestamp"))?;
        let update_time = parse_row_time(
            &element_text(time_cell),
            parent_time,
            now,
            self.time_zone,
        )?;

        let link_cell = cells.next().ok_or(RowError::MissingCell("link"))?;
        let href = link_cell
            .select(&self.selectors.anchor)
            .next()
            .and_then(|a| a.value().attr("href"))
            .filter(|href| !href.trim_matches('/').is_empty())
            .ok_or(RowError::MissingLink)?;

        Ok(Row {
            kind,
            update_time,
            slug: join_slug(parent_slug, href),
            title: slug::to_title(href),
        })
    }

    fn has_rows(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        document.select(&self.selectors.rows).next().is_some()
    }

    async fn read_content(&self, slug: &str, mime_type: MimeType) -> Result<ReadContentResponse> {
        let page = self
            .upstream
            .fetch_slug(slug)
            .await
            .map_err(content_fetch_error)?;
        let content_type = page.content_type.as_deref().unwrap_or_default();
        let content = content::transform(content_type, mime_type, &page.body)?;
        Ok(ReadContentResponse { content })
    }
}

/// Content reads report any upstream status failure as a missing resource.
fn content_fetch_error(err: UpstreamError) -> ArchiveError {
    match err {
        UpstreamError::Status { .. } => ArchiveError::not_found(err.to_string()),
        other => other.into(),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

fn join_slug(parent: &str, href: &str) -> String {
    let href = href.trim_start_matches("./").trim_matches('/');
    format!("{}/{href}", parent.trim_end_matches('/'))
}

fn encode_token(token: &ListEntriesPageToken) -> Result<String> {
    token::encode(token).map_err(|err| ArchiveError::internal(format!("encode page token: {err}")))
}

/// Resolves a listing timestamp into an instant.
///
/// Listings print either `Mon DD YYYY` for older rows or `Mon DD HH:MM` for
/// recent ones, the latter without a year. The year of a recent row is
/// inferred from the parent page's modification time and `now`: a row can
/// never be newer than the page listing it, so a month later than the
/// parent's belongs to the year before.
pub fn parse_row_time(
    text: &str,
    parent_time: DateTime<Utc>,
    now: DateTime<Utc>,
    time_zone: Tz,
) -> std::result::Result<DateTime<Utc>, RowTimeError> {
    let invalid = || RowTimeError(text.to_owned());

    let mut parts = text.split_whitespace();
    let (Some(month), Some(day), Some(tail), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    let month = month_number(month).ok_or_else(invalid)?;
    let day = parse_digits(day, 1..=2).ok_or_else(invalid)?;

    let (year, hour, minute) = match tail.split_once(':') {
        Some((hour, minute)) => {
            let hour = parse_digits(hour, 1..=2).ok_or_else(invalid)?;
            let minute = parse_digits(minute, 2..=2).ok_or_else(invalid)?;
            let parent = parent_time.with_timezone(&time_zone);
            let now = now.with_timezone(&time_zone);
            let year = if parent.year() < now.year() {
                if parent.month() < month {
                    parent.year() - 1
                } else {
                    parent.year()
                }
            } else if now.month() < month {
                now.year() - 1
            } else {
                now.year()
            };
            (year, hour, minute)
        }
        None => {
            let year = parse_digits(tail, 4..=4).ok_or_else(invalid)?;
            (i32::try_from(year).map_err(|_| invalid())?, 0, 0)
        }
    };

    let local = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .ok_or_else(invalid)?;
    time_zone
        .from_local_datetime(&local)
        .earliest()
        .map(|time| time.with_timezone(&Utc))
        .ok_or_else(invalid)
}

fn parse_digits(text: &str, len: std::ops::RangeInclusive<usize>) -> Option<u32> {
    if !len.contains(&text.len()) || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn month_number(abbrev: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let index = MONTHS
        .iter()
        .position(|month| month.eq_ignore_ascii_case(abbrev))?;
    u32::try_from(index + 1).ok()
}

#[async_trait]
impl ArchiveService for Scraper {
    fn inner(&self) -> Option<&dyn ArchiveService> {
        None
    }

    async fn list_categories(
        &self,
        _caller: &Caller,
        _req: ListCategoriesRequest,
    ) -> Result<ListCategoriesResponse> {
        let page = self.upstream.fetch(self.upstream.base()).await?;
        let results = self.parse_categories(&page.text());
        Ok(ListCategoriesResponse {
            results,
            next_page_token: String::new(),
        })
    }

    async fn get_category(&self, caller: &Caller, req: GetCategoryRequest) -> Result<Category> {
        slug::category_slug(&req.path)?;
        let listing = self
            .list_categories(caller, ListCategoriesRequest::default())
            .await?;
        listing
            .results
            .into_iter()
            .find(|category| category.path == req.path)
            .ok_or_else(|| ArchiveError::not_found(format!("category {:?} not found", req.path)))
    }

    async fn list_entries(
        &self,
        _caller: &Caller,
        req: ListEntriesRequest,
    ) -> Result<ListEntriesResponse> {
        let parent_slug = slug::category_slug(&req.parent)?;
        let page_number = token::decode_optional::<ListEntriesPageToken>(&req.page_token)?
            .map_or(1, |token| token.page);

        let listing_slug = if page_number > 1 {
            format!("{parent_slug}/index{}.html", page_number - 1)
        } else {
            format!("{parent_slug}/")
        };
        let page = match self.upstream.fetch_slug(&listing_slug).await {
            Ok(page) => page,
            Err(err) if page_number > 1 && err.is_not_found() => {
                tracing::debug!(parent = %req.parent, page_number, "upstream listing exhausted");
                return Ok(ListEntriesResponse::default());
            }
            Err(err) => return Err(err.into()),
        };

        let listing = self.parse_listing(&page, &parent_slug);
        let paginated = listing.paginated || page_number > 1;
        let results: Vec<Entry> = listing
            .rows
            .into_iter()
            .filter_map(|row| match slug::entry_path(&row.slug) {
                Ok(path) => Some(Entry {
                    path,
                    display_name: row.title,
                    kind: row.kind,
                    update_time: Some(row.update_time),
                    ..Default::default()
                }),
                Err(err) => {
                    tracing::warn!(slug = %row.slug, %err, "skipping unaddressable entry");
                    None
                }
            })
            .collect();

        let next_page_token = match results.last() {
            Some(last) if paginated => encode_token(&ListEntriesPageToken {
                page: page_number,
                after_entry: last.path.clone(),
                start_update_time: last.update_time.map(token::to_timestamp),
            })?,
            _ => String::new(),
        };

        Ok(ListEntriesResponse {
            results,
            next_page_token,
        })
    }

    async fn get_entry(&self, _caller: &Caller, req: GetEntryRequest) -> Result<Entry> {
        let entry_slug = slug::entry_slug(&req.path)?;
        let page = self.upstream.fetch_slug(&entry_slug).await?;
        let kind = if self.has_rows(&page.text()) {
            EntryKind::Anthology
        } else {
            EntryKind::Story
        };
        Ok(Entry {
            display_name: slug::to_title(&entry_slug),
            kind,
            update_time: page.last_modified_time(),
            path: req.path,
            ..Default::default()
        })
    }

    async fn read_entry(
        &self,
        _caller: &Caller,
        req: ReadEntryRequest,
    ) -> Result<ReadContentResponse> {
        let entry_slug = slug::entry_slug(&req.path)?;
        self.read_content(&entry_slug, req.mime_type).await
    }

    async fn list_chapters(
        &self,
        _caller: &Caller,
        req: ListChaptersRequest,
    ) -> Result<ListChaptersResponse> {
        let parent_slug = slug::entry_slug(&req.parent)?;
        let page = self.upstream.fetch_slug(&format!("{parent_slug}/")).await?;
        let listing = self.parse_listing(&page, &parent_slug);

        let results = listing
            .rows
            .into_iter()
            .filter_map(|row| match slug::chapter_path(&row.slug) {
                Ok(path) => Some(Chapter {
                    path,
                    display_name: row.title,
                    update_time: Some(row.update_time),
                    ..Default::default()
                }),
                Err(err) => {
                    tracing::warn!(slug = %row.slug, %err, "skipping unaddressable chapter");
                    None
                }
            })
            .collect();

        Ok(ListChaptersResponse {
            results,
            next_page_token: String::new(),
        })
    }

    async fn get_chapter(&self, _caller: &Caller, req: GetChapterRequest) -> Result<Chapter> {
        let chapter_slug = slug::chapter_slug(&req.path)?;
        let page = self.upstream.fetch_slug(&chapter_slug).await?;
        Ok(Chapter {
            display_name: slug::to_title(&chapter_slug),
            update_time: page.last_modified_time(),
            path: req.path,
            ..Default::default()
        })
    }

    async fn read_chapter(
        &self,
        _caller: &Caller,
        req: ReadChapterRequest,
    ) -> Result<ReadContentResponse> {
        let chapter_slug = slug::chapter_slug(&req.path)?;
        self.read_content(&chapter_slug, req.mime_type).await
    }
}
