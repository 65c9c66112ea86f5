//! End-to-end search tests: a Definition goes in, releases come out, with
//! every wire interaction served by the mock transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use trawler_core::categories::StandardCategory;
use trawler_core::testing::{fixtures, MockHttpClient};
use trawler_core::{from_toml_str, IndexerSettings, SearchQuery, SiteIndexer};

const TRACKER_DEF: &str = r#"
id = "haven"
name = "Haven"
language = "en-US"
links = ["https://mock.example/"]

[caps]

[[caps.categories]]
tracker = "41"
standard = "Movies/HD"

[[caps.categories]]
tracker = "18"
standard = "TV/HD"

[search]

[[search.paths]]
path = "browse.php"

[search.inputs]
q = "{{ .Keywords }}"

[search.rows]
selector = "table#torrents > tbody > tr"

[search.fields.title]
selector = "a.name"

[search.fields.details]
selector = "a.name"
attribute = "href"

[search.fields.download]
selector = "a.down"
attribute = "href"

[search.fields.category]
selector = "td.cat"

[search.fields.size]
selector = "td.size"

[search.fields.seeders]
selector = "span.se"

[search.fields.peers]
selector = "span.pe"

[search.fields.date]
selector = "td.added"
"#;

/// Three result rows; the middle one lost its title anchor.
const TRACKER_PAGE: &str = r#"<html><body>
<table id="torrents"><tbody>
<tr>
  <td class="cat">41</td>
  <td><a class="name" href="/details.php?id=101">Horizon 2024 1080p BluRay</a></td>
  <td><a class="down" href="/take.php?id=101">dl</a></td>
  <td class="size">700 MB</td>
  <td><span class="se">12</span> / <span class="pe">30</span></td>
  <td class="added">2024-03-01T10:00:00Z</td>
</tr>
<tr>
  <td class="cat">41</td>
  <td>deleted by moderator</td>
  <td><a class="down" href="/take.php?id=102">dl</a></td>
  <td class="size">1 GB</td>
  <td><span class="se">3</span> / <span class="pe">4</span></td>
  <td class="added">2024-03-02T10:00:00Z</td>
</tr>
<tr>
  <td class="cat">99</td>
  <td><a class="name" href="/details.php?id=103">Skyline S02E04 720p WEB</a></td>
  <td><a class="down" href="/take.php?id=103">dl</a></td>
  <td class="size">350 MB</td>
  <td><span class="se">5</span> / <span class="pe">9</span></td>
  <td class="added">2024-02-11T08:30:00Z</td>
</tr>
</tbody></table>
</body></html>"#;

fn tracker(http: Arc<MockHttpClient>) -> SiteIndexer {
    let def = Arc::new(from_toml_str(TRACKER_DEF).unwrap());
    SiteIndexer::new(def, IndexerSettings::default(), http)
}

#[tokio::test]
async fn test_full_search_drops_only_the_broken_row() {
    let http = Arc::new(MockHttpClient::new());
    http.queue_response(fixtures::html_response(TRACKER_PAGE))
        .await;
    let indexer = tracker(Arc::clone(&http));

    let records = indexer
        .search(&SearchQuery::generic("horizon"))
        .await
        .unwrap();

    assert_eq!(records.len(), 2, "middle row lacks a title and is dropped");

    let first = &records[0];
    assert_eq!(first.title, "Horizon 2024 1080p BluRay");
    assert_eq!(first.indexer, "haven");
    assert_eq!(first.guid, "https://mock.example/details.php?id=101");
    assert_eq!(
        first.details_url.as_deref(),
        Some("https://mock.example/details.php?id=101")
    );
    assert_eq!(
        first.download_url.as_deref(),
        Some("https://mock.example/take.php?id=101")
    );
    assert_eq!(first.size, Some(700 * 1024 * 1024));
    assert_eq!(first.seeders, Some(12));
    assert_eq!(first.leechers, Some(18), "peers minus seeders");
    assert_eq!(first.categories, vec![StandardCategory::MoviesHd]);
    let date = first.publish_date.expect("date parsed");
    assert!(date.to_rfc3339().starts_with("2024-03-01"));

    let second = &records[1];
    assert_eq!(second.title, "Skyline S02E04 720p WEB");
    assert_eq!(
        second.categories,
        vec![StandardCategory::Other],
        "tracker category 99 is unmapped and falls back"
    );

    let requests = http.recorded_requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://mock.example/browse.php?q=horizon");
}

const CATEGORY_DEF: &str = r#"
id = "catty"
name = "Catty"
links = ["https://mock.example/"]

[caps]
default_categories = ["1", "2"]

[[caps.categories]]
tracker = "9"
standard = "Movies"

[search]

[[search.paths]]
path = "torrents.php"

[search.inputs]
"$raw" = "{{ range .Categories }}cat[]={{.}}&{{ end }}"
q = "{{ .Keywords }}"

[search.rows]
selector = "tr.t"

[search.fields.title]
selector = "a.n"

[search.fields.download]
selector = "a.n"
attribute = "href"
"#;

#[tokio::test]
async fn test_mapped_category_lands_in_the_query() {
    let http = Arc::new(MockHttpClient::new());
    http.queue_response(fixtures::html_response("<html><table></table></html>"))
        .await;
    let def = Arc::new(from_toml_str(CATEGORY_DEF).unwrap());
    let indexer = SiteIndexer::new(def, IndexerSettings::default(), http.clone());

    let query = SearchQuery::generic("stuff").with_categories(vec![StandardCategory::Movies]);
    indexer.search(&query).await.unwrap();

    let requests = http.recorded_requests().await;
    assert_eq!(
        requests[0].url,
        "https://mock.example/torrents.php?cat[]=9&q=stuff"
    );
}

#[tokio::test]
async fn test_unmapped_category_uses_the_default_list() {
    let http = Arc::new(MockHttpClient::new());
    http.queue_response(fixtures::html_response("<html><table></table></html>"))
        .await;
    let def = Arc::new(from_toml_str(CATEGORY_DEF).unwrap());
    let indexer = SiteIndexer::new(def, IndexerSettings::default(), http.clone());

    let query = SearchQuery::generic("stuff").with_categories(vec![StandardCategory::Tv]);
    let records = indexer.search(&query).await.unwrap();
    assert!(records.is_empty());

    let requests = http.recorded_requests().await;
    assert_eq!(
        requests[0].url,
        "https://mock.example/torrents.php?cat[]=1&cat[]=2&q=stuff"
    );
}

const API_DEF: &str = r#"
id = "api-haven"
name = "Api Haven"
links = ["https://mock.example/"]

[caps]

[search]

[[search.paths]]
path = "api/search"
response = "json"

[search.inputs]
q = "{{ .Keywords }}"

[search.rows]
selector = "results"

[search.fields.title]
selector = "name"

[search.fields.download]
selector = "link"

[search.fields.size]
selector = "size_bytes"

[search.fields.infohash]
selector = "hash"
"#;

#[tokio::test]
async fn test_json_api_definition_works_end_to_end() {
    let body = r#"{
  "results": [
    {"name": "Alpha", "link": "https://mock.example/dl/1", "size_bytes": "123456",
     "hash": "AA97B1779BB2C9B41C4E4E2EDED8C2AF4A4A4A4A"},
    {"name": "Beta", "link": "https://mock.example/dl/2", "size_bytes": "99"}
  ]
}"#;
    let http = Arc::new(MockHttpClient::new());
    http.queue_response(fixtures::json_response(body)).await;
    let def = Arc::new(from_toml_str(API_DEF).unwrap());
    let indexer = SiteIndexer::new(def, IndexerSettings::default(), http.clone());

    let records = indexer.search(&SearchQuery::generic("alpha")).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].title, "Alpha");
    assert_eq!(records[0].size, Some(123_456));
    assert_eq!(
        records[0].info_hash.as_deref(),
        Some("aa97b1779bb2c9b41c4e4e2eded8c2af4a4a4a4a")
    );
    assert_eq!(records[1].info_hash, None);
}

#[tokio::test]
async fn test_request_delay_spaces_consecutive_searches() {
    let toml = format!("request_delay_secs = 0.15\n{}", TRACKER_DEF.trim_start());
    let def = Arc::new(from_toml_str(&toml).unwrap());
    let http = Arc::new(MockHttpClient::new());
    http.queue_response(fixtures::html_response(TRACKER_PAGE))
        .await;
    http.queue_response(fixtures::html_response(TRACKER_PAGE))
        .await;
    let indexer = SiteIndexer::new(def, IndexerSettings::default(), http.clone());

    let started = Instant::now();
    indexer.search(&SearchQuery::generic("a")).await.unwrap();
    indexer.search(&SearchQuery::generic("b")).await.unwrap();
    let elapsed = started.elapsed();

    assert!(
        elapsed >= Duration::from_millis(150),
        "second request must wait out the spacing, elapsed {elapsed:?}"
    );
    assert_eq!(http.request_count().await, 2);
}

const GET_LOGIN_DEF: &str = r#"
id = "keyed"
name = "Keyed"
links = ["https://mock.example/"]

[caps]

[login]
method = "get"
path = "take_login.php"

[login.inputs]
username = "{{ .Config.username }}"
password = "{{ .Config.password }}"

[login.test]
path = "my.php"
selector = "a[href=\"logout.php\"]"

[[settings]]
name = "username"
label = "Username"

[[settings]]
name = "password"
label = "Password"
kind = "password"

[search]

[[search.paths]]
path = "browse.php"

[search.inputs]
q = "{{ .Keywords }}"

[search.rows]
selector = "tr.t"

[search.fields.title]
selector = "a.n"

[search.fields.download]
selector = "a.n"
attribute = "href"
"#;

const KEYED_RESULTS: &str = r#"<html><body><a href="logout.php">bye</a>
<table><tr class="t"><td><a class="n" href="/t/1">Found It</a></td></tr></table>
</body></html>"#;

fn keyed_handler(
) -> impl Fn(
    &trawler_core::http::WebRequest,
) -> Option<Result<trawler_core::http::WebResponse, trawler_core::http::HttpError>>
       + Send
       + Sync
       + 'static {
    |request| {
        let response = if request.url.contains("take_login.php") {
            fixtures::html_response_with_cookies("<html>in</html>", &[("uid", "7")])
        } else if request.url.contains("my.php") {
            fixtures::html_response(r#"<html><a href="logout.php">bye</a></html>"#)
        } else if request.url.contains("browse.php") {
            fixtures::html_response(KEYED_RESULTS)
        } else {
            return None;
        };
        Some(Ok(response))
    }
}

#[tokio::test]
async fn test_get_login_carries_credentials_in_the_query_string() {
    let http = Arc::new(MockHttpClient::new());
    http.set_handler(keyed_handler()).await;
    let def = Arc::new(from_toml_str(GET_LOGIN_DEF).unwrap());
    let settings = IndexerSettings::default()
        .with_value("username", "bob")
        .with_value("password", "pw1");
    let indexer = SiteIndexer::new(def, settings, http.clone());

    let records = indexer.search(&SearchQuery::generic("it")).await.unwrap();
    assert_eq!(records.len(), 1);

    let requests = http.recorded_requests().await;
    assert_eq!(
        requests[0].url,
        "https://mock.example/take_login.php?password=pw1&username=bob"
    );
}

#[tokio::test]
async fn test_second_search_reuses_the_session() {
    let http = Arc::new(MockHttpClient::new());
    http.set_handler(keyed_handler()).await;
    let def = Arc::new(from_toml_str(GET_LOGIN_DEF).unwrap());
    let settings = IndexerSettings::default()
        .with_value("username", "bob")
        .with_value("password", "pw1");
    let indexer = SiteIndexer::new(def, settings, http.clone());

    indexer.search(&SearchQuery::generic("it")).await.unwrap();
    assert_eq!(http.request_count().await, 3, "login, probe, search");

    indexer.search(&SearchQuery::generic("it")).await.unwrap();
    assert_eq!(
        http.request_count().await,
        4,
        "an authenticated session adds only the search itself"
    );

    let requests = http.recorded_requests().await;
    assert!(requests[3].url.contains("browse.php"));
    assert!(requests[3].cookies.iter().any(|c| c.name == "uid"));
}
