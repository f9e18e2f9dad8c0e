use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{Mode, fallback_title};
use crate::clean::MarkupFormat;
use crate::config::Settings;
use crate::error::{SkillError, is_page_not_found};

const MAX_REDIRECT_HOPS: usize = 3;
const NOT_FOUND_CODES: &[&str] = &["missingtitle", "missing", "invalidtitle"];

/// Source of raw page markup.
pub trait WikiApi: Send + Sync {
    fn fetch_page(&self, title: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub format: MarkupFormat,
}

impl MediaWikiClientConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_url: settings.wiki_api_url.clone(),
            user_agent: settings.user_agent.clone(),
            timeout_ms: settings.timeout_ms,
            format: settings.markup_format,
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build MediaWiki HTTP client")?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: MediaWikiClientConfig) -> Self {
        Self { client, config }
    }

    pub fn format(&self) -> MarkupFormat {
        self.config.format
    }

    fn request_parse(&self, title: &str) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;
        let params = [
            ("action", "parse"),
            ("page", title),
            ("prop", self.config.format.parse_prop()),
            ("redirects", "1"),
            ("format", "json"),
            ("formatversion", "2"),
        ];

        let response = self
            .client
            .get(base_url)
            .header("User-Agent", self.config.user_agent.clone())
            .query(&params)
            .send()
            .map_err(|error| SkillError::RemoteService(format!("failed to call wiki API: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SkillError::RemoteService(format!(
                "wiki API request for {title} failed with HTTP {status}"
            ))
            .into());
        }
        response.json::<Value>().map_err(|error| {
            SkillError::RemoteService(format!("failed to decode wiki API JSON response: {error}"))
                .into()
        })
    }
}

impl WikiApi for MediaWikiClient {
    fn fetch_page(&self, title: &str) -> Result<String> {
        let mut current = title.to_string();
        for hop in 0..=MAX_REDIRECT_HOPS {
            let payload = self.request_parse(&current)?;
            let markup = extract_page_markup(&payload, &current, self.config.format)?;
            match redirect_target(&markup, self.config.format) {
                Some(target) if hop < MAX_REDIRECT_HOPS => {
                    debug!(from = %current, to = %target, "following wiki redirect");
                    current = target;
                }
                _ => return Ok(markup),
            }
        }
        Err(SkillError::RemoteService(format!("too many redirects starting at {title}")).into())
    }
}

/// Pulls the markup out of an `action=parse` envelope. Accepts both the
/// formatversion=2 string shape and the legacy `{"*": ...}` object.
pub fn extract_page_markup(payload: &Value, title: &str, format: MarkupFormat) -> Result<String> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        if NOT_FOUND_CODES.contains(&code) {
            return Err(SkillError::PageNotFound {
                title: title.to_string(),
            })
            .with_context(|| format!("wiki API error [{code}]: {info}"));
        }
        return Err(SkillError::RemoteService(format!("wiki API error [{code}]: {info}")).into());
    }

    let field = payload
        .get("parse")
        .and_then(|parse| parse.get(format.parse_prop()));
    let markup = match field {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Object(object)) => object
            .get("*")
            .and_then(Value::as_str)
            .map(ToString::to_string),
        _ => None,
    };
    markup.ok_or_else(|| {
        SkillError::RemoteService(format!("invalid wiki API response shape for {title}")).into()
    })
}

/// Target page of a redirect stub, if the markup is one.
pub fn redirect_target(markup: &str, format: MarkupFormat) -> Option<String> {
    match format {
        MarkupFormat::Html => {
            if !markup.contains("redirectMsg") {
                return None;
            }
            let document = Html::parse_fragment(markup);
            let selector = Selector::parse(".redirectMsg a").ok()?;
            document
                .select(&selector)
                .next()
                .map(|link| link.text().collect::<String>().trim().to_string())
                .filter(|target| !target.is_empty())
        }
        MarkupFormat::Wikitext => {
            let trimmed = markup.trim();
            if !trimmed.to_ascii_uppercase().starts_with("#REDIRECT") {
                return None;
            }
            let start = trimmed.find("[[")?;
            let end = trimmed[start + 2..].find("]]")?;
            let target = trimmed[start + 2..start + 2 + end].trim();
            let target = target.split('|').next().unwrap_or(target).trim();
            if target.is_empty() {
                None
            } else {
                Some(target.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPage {
    pub title: String,
    pub markup: String,
    pub used_fallback: bool,
}

/// Fetches `page`; when it does not exist, retries once with `<skill>_training`.
pub fn fetch_with_fallback<A: WikiApi + ?Sized>(
    api: &A,
    skill: &str,
    mode: Mode,
    page: &str,
) -> Result<ResolvedPage> {
    match api.fetch_page(page) {
        Ok(markup) => Ok(ResolvedPage {
            title: page.to_string(),
            markup,
            used_fallback: false,
        }),
        Err(error) if is_page_not_found(&error) => {
            let fallback = fallback_title(skill);
            warn!(skill, %mode, page, fallback = %fallback, "primary page missing, falling back");
            let markup = api
                .fetch_page(&fallback)
                .with_context(|| format!("fallback page {fallback} failed for {skill} ({mode})"))?;
            Ok(ResolvedPage {
                title: fallback,
                markup,
                used_fallback: true,
            })
        }
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::error::{ErrorKind, error_kind};

    #[derive(Default)]
    struct MockApi {
        pages: BTreeMap<String, String>,
        requests: Mutex<Vec<String>>,
    }

    impl MockApi {
        fn with_page(mut self, title: &str, markup: &str) -> Self {
            self.pages.insert(title.to_string(), markup.to_string());
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().expect("lock").clone()
        }
    }

    impl WikiApi for MockApi {
        fn fetch_page(&self, title: &str) -> Result<String> {
            self.requests.lock().expect("lock").push(title.to_string());
            self.pages.get(title).cloned().ok_or_else(|| {
                SkillError::PageNotFound {
                    title: title.to_string(),
                }
                .into()
            })
        }
    }

    #[test]
    fn extracts_formatversion_2_text() {
        let payload = json!({"parse": {"title": "Test", "text": "<div><p>Test HTML</p></div>"}});
        let markup = extract_page_markup(&payload, "Test_Page", MarkupFormat::Html).expect("markup");
        assert_eq!(markup, "<div><p>Test HTML</p></div>");
    }

    #[test]
    fn extracts_legacy_star_envelope() {
        let payload = json!({"parse": {"wikitext": {"*": "== Heading =="}}});
        let markup =
            extract_page_markup(&payload, "Test_Page", MarkupFormat::Wikitext).expect("markup");
        assert_eq!(markup, "== Heading ==");
    }

    #[test]
    fn missing_title_error_is_page_not_found() {
        let payload = json!({"error": {"code": "missingtitle", "info": "The page you specified doesn't exist."}});
        let error = extract_page_markup(&payload, "Bad_Page", MarkupFormat::Html)
            .expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::PageNotFound);
        assert!(format!("{error:#}").contains("Bad_Page"));
    }

    #[test]
    fn other_api_errors_are_remote_service_errors() {
        let payload = json!({"error": {"code": "ratelimited", "info": "slow down"}});
        let error =
            extract_page_markup(&payload, "Page", MarkupFormat::Html).expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::RemoteService);

        let error = extract_page_markup(&json!({"parse": {}}), "Page", MarkupFormat::Html)
            .expect_err("must fail");
        assert!(error.to_string().contains("invalid wiki API response shape"));
    }

    #[test]
    fn redirect_target_reads_html_and_wikitext_stubs() {
        let html = r#"<div class="mw-parser-output"><div class="redirectMsg"><p>Redirect to:</p><ul class="redirectText"><li><a href="/w/Target_Page">Target_Page</a></li></ul></div></div>"#;
        assert_eq!(
            redirect_target(html, MarkupFormat::Html).as_deref(),
            Some("Target_Page")
        );
        assert_eq!(redirect_target("<p>Plain</p>", MarkupFormat::Html), None);
        assert_eq!(
            redirect_target("#REDIRECT [[Mining training|x]]", MarkupFormat::Wikitext).as_deref(),
            Some("Mining training")
        );
        assert_eq!(redirect_target("Just text", MarkupFormat::Wikitext), None);
    }

    #[test]
    fn fallback_uses_training_title_when_primary_is_missing() {
        let api = MockApi::default().with_page("Attack_training", "<p>Good content</p>");
        let resolved = fetch_with_fallback(&api, "Attack", Mode::F2p, "Bad_Page").expect("resolve");
        assert!(resolved.used_fallback);
        assert_eq!(resolved.title, "Attack_training");
        assert!(resolved.markup.contains("Good content"));
        assert_eq!(api.requests(), vec!["Bad_Page", "Attack_training"]);
    }

    #[test]
    fn primary_page_is_used_when_present() {
        let api = MockApi::default().with_page("Mining_page", "<p>Rocks</p>");
        let resolved = fetch_with_fallback(&api, "Mining", Mode::P2p, "Mining_page").expect("resolve");
        assert!(!resolved.used_fallback);
        assert_eq!(api.requests(), vec!["Mining_page"]);
    }

    #[test]
    fn fallback_failure_propagates() {
        let api = MockApi::default();
        let error = fetch_with_fallback(&api, "Sailing", Mode::P2p, "Sailing_guide")
            .expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::PageNotFound);
        assert_eq!(api.requests(), vec!["Sailing_guide", "Sailing_training"]);
    }

    struct BrokenApi;

    impl WikiApi for BrokenApi {
        fn fetch_page(&self, _title: &str) -> Result<String> {
            Err(SkillError::RemoteService("connection refused".to_string()).into())
        }
    }

    fn loopback_client(base_url: &str, format: MarkupFormat) -> MediaWikiClient {
        MediaWikiClient::with_client(
            crate::test_support::direct_client(),
            MediaWikiClientConfig {
                api_url: format!("{base_url}/w/api.php"),
                user_agent: "osrs-simplified-tests/1.0".to_string(),
                timeout_ms: 5_000,
                format,
            },
        )
    }

    #[test]
    fn client_sends_parse_query_and_user_agent() {
        let body = json!({"parse": {"title": "Mining training", "text": "<p>Iron ore</p>"}});
        let (base_url, server) =
            crate::test_support::serve_responses(vec![(200, body.to_string())]);
        let client = loopback_client(&base_url, MarkupFormat::Html);

        let markup = client.fetch_page("Mining training").expect("fetch");
        assert_eq!(markup, "<p>Iron ore</p>");

        let requests = server.join().expect("server thread");
        let request = &requests[0];
        assert!(request.starts_with("get /w/api.php?"));
        for param in [
            "action=parse",
            "page=mining+training",
            "prop=text",
            "redirects=1",
            "format=json",
            "formatversion=2",
        ] {
            assert!(request.contains(param), "missing {param} in {request}");
        }
        assert!(request.contains("user-agent: osrs-simplified-tests/1.0"));
    }

    #[test]
    fn client_requests_wikitext_prop_in_wikitext_mode() {
        let body = json!({"parse": {"wikitext": "== Levels 1-20 =="}});
        let (base_url, server) =
            crate::test_support::serve_responses(vec![(200, body.to_string())]);
        let client = loopback_client(&base_url, MarkupFormat::Wikitext);

        let markup = client.fetch_page("Attack_training").expect("fetch");
        assert_eq!(markup, "== Levels 1-20 ==");
        let requests = server.join().expect("server thread");
        assert!(requests[0].contains("prop=wikitext"));
    }

    #[test]
    fn client_maps_http_failure_to_remote_service() {
        let (base_url, server) = crate::test_support::serve_responses(vec![(
            503,
            r#"{"error":"maintenance"}"#.to_string(),
        )]);
        let client = loopback_client(&base_url, MarkupFormat::Html);

        let error = client.fetch_page("Attack_training").expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::RemoteService);
        assert!(error.to_string().contains("HTTP 503"));
        server.join().expect("server thread");
    }

    #[test]
    fn client_maps_undecodable_body_to_remote_service() {
        let (base_url, server) = crate::test_support::serve_responses(vec![(
            200,
            "<html>maintenance page</html>".to_string(),
        )]);
        let client = loopback_client(&base_url, MarkupFormat::Html);

        let error = client.fetch_page("Attack_training").expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::RemoteService);
        assert!(
            error
                .to_string()
                .contains("failed to decode wiki API JSON response")
        );
        server.join().expect("server thread");
    }

    #[test]
    fn client_follows_redirect_stub() {
        let stub = json!({"parse": {"text": r#"<div class="redirectMsg"><ul class="redirectText"><li><a href="/w/Target_Page">Target_Page</a></li></ul></div>"#}});
        let target = json!({"parse": {"text": "<p>Real guide</p>"}});
        let (base_url, server) = crate::test_support::serve_responses(vec![
            (200, stub.to_string()),
            (200, target.to_string()),
        ]);
        let client = loopback_client(&base_url, MarkupFormat::Html);

        let markup = client.fetch_page("Old_Page").expect("fetch");
        assert_eq!(markup, "<p>Real guide</p>");
        let requests = server.join().expect("server thread");
        assert_eq!(requests.len(), 2);
        assert!(requests[0].contains("page=old_page"));
        assert!(requests[1].contains("page=target_page"));
    }

    #[test]
    fn client_maps_missing_title_to_page_not_found() {
        let body = json!({"error": {"code": "missingtitle", "info": "The page you specified doesn't exist."}});
        let (base_url, server) =
            crate::test_support::serve_responses(vec![(200, body.to_string())]);
        let client = loopback_client(&base_url, MarkupFormat::Html);

        let error = client.fetch_page("Bad_Page").expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::PageNotFound);
        server.join().expect("server thread");
    }

    #[test]
    fn non_missing_errors_skip_fallback() {
        let error = fetch_with_fallback(&BrokenApi, "Attack", Mode::F2p, "Page")
            .expect_err("must fail");
        assert_eq!(error_kind(&error), ErrorKind::RemoteService);
    }
}
