use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

/// A canned upstream response.
#[derive(Debug, Clone)]
pub struct StubPage {
    pub content_type: &'static str,
    pub last_modified: Option<&'static str>,
    pub body: String,
}

impl StubPage {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/html; charset=utf-8",
            last_modified: None,
            body: body.into(),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/plain; charset=utf-8",
            ..Self::html(body)
        }
    }

    pub fn modified(mut self, last_modified: &'static str) -> Self {
        self.last_modified = Some(last_modified);
        self
    }
}

/// Serves a fixed set of pages; anything else is a 404. Trailing slashes
/// are ignored when matching paths.
pub struct UpstreamStub {
    pub base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

fn normalize(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        trimmed.to_owned()
    }
}

impl UpstreamStub {
    pub fn spawn(pages: Vec<(&str, StubPage)>) -> Self {
        let pages: HashMap<String, StubPage> = pages
            .into_iter()
            .map(|(path, page)| (normalize(path), page))
            .collect();
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start upstream stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/");

        let hits = Arc::new(Mutex::new(Vec::new()));
        let thread_hits = Arc::clone(&hits);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = normalize(request.url());
                thread_hits.lock().unwrap().push(path.clone());

                let Some(page) = pages.get(&path) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                };

                let mut response = tiny_http::Response::from_string(page.body.clone())
                    .with_header(
                        tiny_http::Header::from_bytes(&b"Content-Type"[..], page.content_type)
                            .expect("content type header"),
                    );
                if let Some(last_modified) = page.last_modified {
                    response = response.with_header(
                        tiny_http::Header::from_bytes(&b"Last-Modified"[..], last_modified)
                            .expect("last modified header"),
                    );
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Normalized paths requested so far, in order.
    #[allow(dead_code)]
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

impl Drop for UpstreamStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn listing(rows: &[(&str, &str, &str)], paginated: bool) -> String {
    let mut html = String::from(
        "<html><body>\n<table>\n<tr><th>Type</th><th>Modified</th><th>Name</th></tr>\n",
    );
    for (kind, time, href) in rows {
        html.push_str(&format!(
            "<tr><td>{kind}</td><td>{time}</td><td><a href=\"{href}\">{href}</a></td></tr>\n"
        ));
    }
    html.push_str("</table>\n");
    if paginated {
        html.push_str("<div id=\"scroll\"><a href=\"index1.html\">Next</a></div>\n");
    }
    html.push_str("</body></html>\n");
    html
}

const LISTING_MODIFIED: &str = "Mon, 01 Jan 2024 00:00:00 GMT";

/// A small archive: two categories, one spread over two listing pages, and
/// an anthology with two chapters.
#[allow(dead_code)]
pub fn archive_site() -> Vec<(&'static str, StubPage)> {
    vec![
        (
            "/",
            StubPage::html(
                r#"<html><body><div class="list-group">
<div class="list-group-item"><a href="/fiction/">Fiction</a> - Short and long stories</div>
<div class="list-group-item"><a href="/serials/">Serials</a> - Stories told in parts</div>
<div class="list-group-item"><a href="/Bad Name/">Broken</a></div>
</div></body></html>"#,
            ),
        ),
        (
            "/fiction/",
            StubPage::html(listing(
                &[
                    ("File", "Mar 15 2023", "story-one.html"),
                    ("Dir", "Feb 10 2023", "the-long-road/"),
                    ("File", "Jan 20 2023", "story-two.html"),
                    ("Dir", "Dec 05 2022", "collected-tales/"),
                    ("File", "yesterday", "broken.html"),
                    ("File", "Nov 11 2022", "story-three.html"),
                ],
                false,
            ))
            .modified(LISTING_MODIFIED),
        ),
        (
            "/fiction/story-one.html",
            StubPage::text("Once upon a time.   \r\n\r\n\r\n\r\nThe end.\r\n")
                .modified("Wed, 15 Mar 2023 09:00:00 GMT"),
        ),
        (
            "/fiction/story-two.html",
            StubPage::html("<html><body><p>A second story.</p></body></html>")
                .modified("Fri, 20 Jan 2023 09:00:00 GMT"),
        ),
        (
            "/fiction/the-long-road/",
            StubPage::html(listing(
                &[
                    ("File", "Feb 10 2023", "chapter-one.html"),
                    ("File", "Feb 11 2023", "chapter-two.html"),
                ],
                false,
            ))
            .modified("Sat, 11 Feb 2023 12:00:00 GMT"),
        ),
        (
            "/fiction/the-long-road/chapter-one.html",
            StubPage::html(
                r#"<html><head><style>body { color: red; }</style></head>
<body><h1>Chapter One</h1><p>It was a dark night.</p><script>alert(1)</script></body></html>"#,
            )
            .modified("Fri, 10 Feb 2023 10:00:00 GMT"),
        ),
        (
            "/fiction/the-long-road/chapter-two.html",
            StubPage::html("<html><body><h1>Chapter Two</h1><p>Morning came.</p></body></html>")
                .modified("Sat, 11 Feb 2023 10:00:00 GMT"),
        ),
        (
            "/serials/",
            StubPage::html(listing(
                &[
                    ("File", "Jan 05 2023", "part-one.html"),
                    ("Dir", "Jan 04 2023", "part-two/"),
                    ("File", "Jan 03 2023", "part-three.html"),
                ],
                true,
            ))
            .modified(LISTING_MODIFIED),
        ),
        (
            "/serials/index1.html",
            StubPage::html(listing(
                &[
                    ("File", "Jan 02 2023", "part-four.html"),
                    ("Dir", "Jan 01 2023", "part-five/"),
                ],
                false,
            ))
            .modified(LISTING_MODIFIED),
        ),
    ]
}
