//! JSON over HTTP surface for the archive service.

use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::{Extension, Router};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::archive::{self, ArchiveService};
use crate::auth::{self, Caller};
use crate::config::Config;
use crate::error::{ArchiveError, Code};
use crate::model::{
    Category, Chapter, CreateUserRequest, DeleteUserRequest, Entry, GetCategoryRequest,
    GetChapterRequest, GetEntryRequest, GetUserRequest, ListCategoriesRequest,
    ListCategoriesResponse, ListChaptersRequest, ListChaptersResponse, ListEntriesRequest,
    ListEntriesResponse, ListUsersRequest, ListUsersResponse, MimeType, ReadChapterRequest,
    ReadContentResponse, ReadEntryRequest, UpdateCategoryRequest, UpdateChapterRequest,
    UpdateEntryRequest, UpdateUserRequest, User,
};
use crate::store::{SqliteStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub archive: Arc<dyn ArchiveService>,
    pub users: Arc<dyn UserStore>,
}

type ApiResult<T> = Result<Json<T>, ArchiveError>;

impl IntoResponse for ArchiveError {
    fn into_response(self) -> Response {
        let status = match self.code() {
            Code::InvalidArgument => StatusCode::BAD_REQUEST,
            Code::Unauthenticated => StatusCode::UNAUTHORIZED,
            Code::PermissionDenied => StatusCode::FORBIDDEN,
            Code::NotFound => StatusCode::NOT_FOUND,
            Code::AlreadyExists => StatusCode::CONFLICT,
            Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
            Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(code = %self.code(), message = self.message(), "request failed");
        }

        let body = Json(serde_json::json!({
            "code": self.code(),
            "message": self.message(),
        }));
        let mut resp = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            resp.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Basic realm="archivist""#),
            );
        }
        resp
    }
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/categories", get(list_categories))
        .route(
            "/categories/:category",
            get(get_category).patch(update_category),
        )
        .route("/categories/:category/entries", get(list_entries))
        .route(
            "/categories/:category/entries/:entry",
            get(get_entry).patch(update_entry),
        )
        .route(
            "/categories/:category/entries/:entry/content",
            get(read_entry),
        )
        .route(
            "/categories/:category/entries/:entry/chapters",
            get(list_chapters),
        )
        .route(
            "/categories/:category/entries/:entry/chapters/:chapter",
            get(get_chapter).patch(update_chapter),
        )
        .route(
            "/categories/:category/entries/:entry/chapters/:chapter/content",
            get(read_chapter),
        )
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:user",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .nest("/v1", v1)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Builds the archive chain from `config` and serves it until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(
        SqliteStore::open(&config.db_filepath)
            .with_context(|| format!("open database {}", config.db_filepath.display()))?,
    );
    let archive = archive::default_chain(&config, store.clone()).context("build archive chain")?;
    tracing::info!(upstream = %config.root_uri, db = %config.db_filepath.display(), "archive chain ready");

    let app = router(AppState {
        archive,
        users: store,
    });
    let listener = tokio::net::TcpListener::bind(config.listen_address)
        .await
        .map_err(|err| anyhow!("bind {}: {err}", config.listen_address))?;
    tracing::info!(addr = %config.listen_address, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(%err, "cannot listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    match auth::authenticate(state.users.as_ref(), header.as_deref()).await {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListQuery {
    filter: String,
    max_page_size: i32,
    page_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReadQuery {
    mime_type: MimeType,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateUserQuery {
    user_id: String,
}

fn category_path(category: &str) -> String {
    format!("categories/{category}")
}

fn entry_path(category: &str, entry: &str) -> String {
    format!("categories/{category}/entries/{entry}")
}

fn chapter_path(category: &str, entry: &str, chapter: &str) -> String {
    format!("categories/{category}/entries/{entry}/chapters/{chapter}")
}

async fn list_categories(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<ListQuery>,
) -> ApiResult<ListCategoriesResponse> {
    let req = ListCategoriesRequest {
        filter: q.filter,
        max_page_size: q.max_page_size,
        page_token: q.page_token,
    };
    Ok(Json(state.archive.list_categories(&caller, req).await?))
}

async fn get_category(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(category): Path<String>,
) -> ApiResult<Category> {
    let req = GetCategoryRequest {
        path: category_path(&category),
    };
    Ok(Json(state.archive.get_category(&caller, req).await?))
}

async fn update_category(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(category): Path<String>,
    Json(mut req): Json<UpdateCategoryRequest>,
) -> ApiResult<Category> {
    req.path = category_path(&category);
    Ok(Json(state.archive.update_category(&caller, req).await?))
}

async fn list_entries(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(category): Path<String>,
    Query(q): Query<ListQuery>,
) -> ApiResult<ListEntriesResponse> {
    let req = ListEntriesRequest {
        parent: category_path(&category),
        filter: q.filter,
        max_page_size: q.max_page_size,
        page_token: q.page_token,
    };
    Ok(Json(state.archive.list_entries(&caller, req).await?))
}

async fn get_entry(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((category, entry)): Path<(String, String)>,
) -> ApiResult<Entry> {
    let req = GetEntryRequest {
        path: entry_path(&category, &entry),
    };
    Ok(Json(state.archive.get_entry(&caller, req).await?))
}

async fn update_entry(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((category, entry)): Path<(String, String)>,
    Json(mut req): Json<UpdateEntryRequest>,
) -> ApiResult<Entry> {
    req.path = entry_path(&category, &entry);
    Ok(Json(state.archive.update_entry(&caller, req).await?))
}

async fn read_entry(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((category, entry)): Path<(String, String)>,
    Query(q): Query<ReadQuery>,
) -> ApiResult<ReadContentResponse> {
    let req = ReadEntryRequest {
        path: entry_path(&category, &entry),
        mime_type: q.mime_type,
    };
    Ok(Json(state.archive.read_entry(&caller, req).await?))
}

async fn list_chapters(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((category, entry)): Path<(String, String)>,
    Query(q): Query<ListQuery>,
) -> ApiResult<ListChaptersResponse> {
    let req = ListChaptersRequest {
        parent: entry_path(&category, &entry),
        filter: q.filter,
        max_page_size: q.max_page_size,
        page_token: q.page_token,
    };
    Ok(Json(state.archive.list_chapters(&caller, req).await?))
}

async fn get_chapter(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((category, entry, chapter)): Path<(String, String, String)>,
) -> ApiResult<Chapter> {
    let req = GetChapterRequest {
        path: chapter_path(&category, &entry, &chapter),
    };
    Ok(Json(state.archive.get_chapter(&caller, req).await?))
}

async fn update_chapter(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((category, entry, chapter)): Path<(String, String, String)>,
    Json(mut req): Json<UpdateChapterRequest>,
) -> ApiResult<Chapter> {
    req.path = chapter_path(&category, &entry, &chapter);
    Ok(Json(state.archive.update_chapter(&caller, req).await?))
}

async fn read_chapter(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path((category, entry, chapter)): Path<(String, String, String)>,
    Query(q): Query<ReadQuery>,
) -> ApiResult<ReadContentResponse> {
    let req = ReadChapterRequest {
        path: chapter_path(&category, &entry, &chapter),
        mime_type: q.mime_type,
    };
    Ok(Json(state.archive.read_chapter(&caller, req).await?))
}

async fn create_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<CreateUserQuery>,
    Json(user): Json<User>,
) -> ApiResult<User> {
    let req = CreateUserRequest {
        user_id: q.user_id,
        user: Some(user),
    };
    Ok(Json(state.archive.create_user(&caller, req).await?))
}

async fn list_users(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<ListQuery>,
) -> ApiResult<ListUsersResponse> {
    let req = ListUsersRequest {
        filter: q.filter,
        max_page_size: q.max_page_size,
        page_token: q.page_token,
    };
    Ok(Json(state.archive.list_users(&caller, req).await?))
}

async fn get_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user): Path<String>,
) -> ApiResult<User> {
    let req = GetUserRequest {
        path: format!("users/{user}"),
    };
    Ok(Json(state.archive.get_user(&caller, req).await?))
}

async fn update_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user): Path<String>,
    Json(mut req): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    req.path = format!("users/{user}");
    Ok(Json(state.archive.update_user(&caller, req).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user): Path<String>,
) -> Result<StatusCode, ArchiveError> {
    let req = DeleteUserRequest {
        path: format!("users/{user}"),
    };
    state.archive.delete_user(&caller, req).await?;
    Ok(StatusCode::NO_CONTENT)
}
