//! Direct Newznab indexer backend.
//!
//! Speaks the RSS-style Newznab search API. Parsing is deliberately
//! permissive: items keep whatever subset of title / enclosure / link /
//! guid / attributes the indexer managed to emit, and the client picks
//! the best download URL and size from what is there.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::NewznabConfig;

use super::retry::with_retry;
use super::types::{IndexerClient, Release, SearchError, SearchPlan, SourceType};

/// HTTP timeout for one Newznab call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Direct Newznab client for one configured endpoint.
pub struct NewznabClient {
    client: Client,
    config: NewznabConfig,
    /// Drop results whose URL does not look like an NZB download.
    filter_nzb_only: bool,
}

impl NewznabClient {
    pub fn new(config: NewznabConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            filter_nzb_only: true,
        }
    }

    fn display_name(&self) -> String {
        if !self.config.name.is_empty() {
            self.config.name.clone()
        } else {
            self.config.dedupe_key()
        }
    }

    fn build_search_url(&self, plan: &SearchPlan) -> String {
        let mut url = format!(
            "{}{}?t={}&apikey={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.api_path,
            plan.plan_type.newznab_t(),
            urlencoding::encode(&self.config.api_key)
        );

        if !plan.query.is_empty() {
            url.push_str(&format!("&q={}", urlencoding::encode(&plan.query)));
        }
        if let Some(imdb) = &plan.tokens.imdb_id {
            // Newznab wants the numeric part without the tt prefix.
            url.push_str(&format!("&imdbid={}", imdb.trim_start_matches("tt")));
        }
        if let Some(tvdb) = plan.tokens.tvdb_id {
            url.push_str(&format!("&tvdbid={tvdb}"));
        }
        if let Some(season) = plan.tokens.season {
            url.push_str(&format!("&season={season}"));
        }
        if let Some(episode) = plan.tokens.episode {
            url.push_str(&format!("&ep={episode}"));
        }

        url
    }

    async fn search_once(&self, plan: &SearchPlan) -> Result<Vec<Release>, SearchError> {
        let url = self.build_search_url(plan);
        debug!(indexer = %self.display_name(), "Searching Newznab endpoint");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout
            } else if e.is_connect() {
                SearchError::ConnectionFailed(e.to_string())
            } else {
                SearchError::ApiError(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(SearchError::AuthFailed(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(SearchError::ApiError(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::ApiError(e.to_string()))?;

        let items = parse_newznab_rss(&body)?;

        let releases = items
            .into_iter()
            .filter_map(|item| self.normalize(item))
            .collect::<Vec<_>>();

        debug!(
            indexer = %self.display_name(),
            results = releases.len(),
            "Newznab search complete"
        );
        Ok(releases)
    }

    fn normalize(&self, item: RssItem) -> Option<Release> {
        let download_url = item
            .enclosure_url
            .or(item.link)
            .or(item.guid)
            .filter(|u| !u.is_empty())?;

        if self.filter_nzb_only && !looks_like_nzb_url(&download_url) {
            return None;
        }

        let size = item
            .attr_size
            .or(item.enclosure_length)
            .or(item.size_element)
            .unwrap_or(0);

        let publish_date = item.pub_date.as_deref().and_then(parse_pub_date);
        let indexer_name = item.attr_indexer.unwrap_or_else(|| self.display_name());

        Some(Release::new(
            item.title?,
            download_url,
            indexer_name,
            self.config.dedupe_key(),
            size,
            publish_date,
            SourceType::Direct,
            self.config.paid,
        ))
    }
}

#[async_trait]
impl IndexerClient for NewznabClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn search(&self, plan: &SearchPlan) -> Result<Vec<Release>, SearchError> {
        let result = with_retry(|| self.search_once(plan)).await;
        if let Err(e) = &result {
            warn!(indexer = %self.display_name(), error = %e, "Newznab search failed");
        }
        result
    }
}

/// An `<item>` as extracted from the RSS payload.
#[derive(Debug, Default)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    enclosure_url: Option<String>,
    enclosure_length: Option<u64>,
    pub_date: Option<String>,
    size_element: Option<u64>,
    attr_size: Option<u64>,
    attr_indexer: Option<String>,
}

/// Walk the RSS XML and collect items. An `<error code= description=>`
/// payload surfaces as a hard error.
fn parse_newznab_rss(xml: &str) -> Result<Vec<RssItem>, SearchError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<RssItem> = None;
    let mut text_target: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "error" => return Err(payload_error(&e)),
                    "item" => current = Some(RssItem::default()),
                    "title" | "link" | "guid" | "pubdate" | "size" if current.is_some() => {
                        text_target = Some(match name.as_str() {
                            "title" => "title",
                            "link" => "link",
                            "guid" => "guid",
                            "pubdate" => "pubdate",
                            _ => "size",
                        });
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "error" => return Err(payload_error(&e)),
                    "enclosure" => {
                        if let Some(item) = current.as_mut() {
                            for attr in e.attributes().flatten() {
                                let key = local_name(attr.key.as_ref());
                                let value = attr.unescape_value().unwrap_or_default().to_string();
                                match key.as_str() {
                                    "url" => item.enclosure_url = Some(value),
                                    "length" => {
                                        item.enclosure_length = value.parse::<u64>().ok();
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                    "attr" => {
                        if let Some(item) = current.as_mut() {
                            let mut attr_name = String::new();
                            let mut attr_value = String::new();
                            for attr in e.attributes().flatten() {
                                let key = local_name(attr.key.as_ref());
                                let value = attr.unescape_value().unwrap_or_default().to_string();
                                match key.as_str() {
                                    "name" => attr_name = value,
                                    "value" => attr_value = value,
                                    _ => {}
                                }
                            }
                            match attr_name.as_str() {
                                "size" => item.attr_size = attr_value.parse::<u64>().ok(),
                                "hydraindexername" | "indexer" => {
                                    item.attr_indexer = Some(attr_value)
                                }
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(item), Some(target)) = (current.as_mut(), text_target) {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match target {
                        "title" => item.title = Some(text),
                        "link" => item.link = Some(text),
                        "guid" => item.guid = Some(text),
                        "pubdate" => item.pub_date = Some(text),
                        "size" => item.size_element = text.parse::<u64>().ok(),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "item" {
                    if let Some(item) = current.take() {
                        items.push(item);
                    }
                }
                text_target = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SearchError::PayloadError(format!("Malformed RSS: {e}")));
            }
            _ => {}
        }
    }

    Ok(items)
}

fn payload_error(e: &quick_xml::events::BytesStart<'_>) -> SearchError {
    let mut code = String::new();
    let mut description = String::new();
    for attr in e.attributes().flatten() {
        let key = local_name(attr.key.as_ref());
        let value = attr.unescape_value().unwrap_or_default().to_string();
        match key.as_str() {
            "code" => code = value,
            "description" => description = value,
            _ => {}
        }
    }
    SearchError::ApiError(format!("Indexer error {code}: {description}"))
}

/// Strip any namespace prefix and lowercase the tag name.
fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw).to_lowercase();
    name.rsplit(':').next().unwrap_or(&name).to_string()
}

/// Whether a URL plausibly points at an NZB file.
fn looks_like_nzb_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains(".nzb")
        || lower.contains("mode=getnzb")
        || lower.contains("t=getnzb")
        || lower.contains("/getnzb")
        || lower.contains("/api?")
        || lower.contains("/download/")
}

/// Newznab emits RFC 2822 pub dates; some indexers use ISO 8601.
fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::types::{PlanTokens, PlanType};
    use chrono::Datelike;

    const SAMPLE_RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/">
  <channel>
    <title>indexer</title>
    <item>
      <title>Movie.2023.1080p.BluRay.x264</title>
      <guid>https://indexer.example/details/abc</guid>
      <link>https://indexer.example/getnzb/abc.nzb&amp;i=1</link>
      <pubDate>Sat, 15 Jun 2024 10:30:00 +0000</pubDate>
      <enclosure url="https://indexer.example/getnzb/abc.nzb" length="5000000000" type="application/x-nzb"/>
      <newznab:attr name="size" value="5368709120"/>
      <newznab:attr name="category" value="2040"/>
    </item>
    <item>
      <title>Movie.2023.720p.WEB</title>
      <link>https://indexer.example/getnzb/def.nzb</link>
      <pubDate>Sat, 01 Jun 2024 08:00:00 +0000</pubDate>
      <size>2147483648</size>
    </item>
  </channel>
</rss>"#;

    fn make_config() -> NewznabConfig {
        NewznabConfig {
            slot: 1,
            endpoint: "https://indexer.example".to_string(),
            api_key: "apikey1".to_string(),
            api_path: "/api".to_string(),
            name: "Indexer One".to_string(),
            enabled: true,
            paid: true,
        }
    }

    fn make_plan() -> SearchPlan {
        SearchPlan {
            plan_type: PlanType::Movie,
            query: "movie 2023".to_string(),
            tokens: PlanTokens {
                imdb_id: Some("tt0111161".to_string()),
                ..Default::default()
            },
            strict_phrase: None,
        }
    }

    #[test]
    fn test_parse_rss_items() {
        let items = parse_newznab_rss(SAMPLE_RSS).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title.as_deref(), Some("Movie.2023.1080p.BluRay.x264"));
        assert_eq!(
            first.enclosure_url.as_deref(),
            Some("https://indexer.example/getnzb/abc.nzb")
        );
        assert_eq!(first.enclosure_length, Some(5_000_000_000));
        assert_eq!(first.attr_size, Some(5_368_709_120));

        let second = &items[1];
        assert_eq!(second.size_element, Some(2_147_483_648));
        assert!(second.enclosure_url.is_none());
    }

    #[test]
    fn test_error_payload_is_hard_error() {
        let xml = r#"<?xml version="1.0"?><error code="100" description="Incorrect user credentials"/>"#;
        let result = parse_newznab_rss(xml);
        match result {
            Err(SearchError::ApiError(msg)) => {
                assert!(msg.contains("100"));
                assert!(msg.contains("Incorrect user credentials"));
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_xml_is_payload_error() {
        let result = parse_newznab_rss("<rss><channel><item></rss>");
        assert!(matches!(result, Err(SearchError::PayloadError(_))));
    }

    #[test]
    fn test_normalize_prefers_attr_size_and_enclosure_url() {
        let client = NewznabClient::new(make_config());
        let items = parse_newznab_rss(SAMPLE_RSS).unwrap();
        let release = client.normalize(items.into_iter().next().unwrap()).unwrap();
        assert_eq!(release.download_url, "https://indexer.example/getnzb/abc.nzb");
        assert_eq!(release.size_bytes, 5_368_709_120);
        assert_eq!(release.indexer_id, "indexer-one");
        assert!(release.paid);
        assert_eq!(release.publish_date.unwrap().year(), 2024);
    }

    #[test]
    fn test_normalize_filters_non_nzb_urls() {
        let client = NewznabClient::new(make_config());
        let item = RssItem {
            title: Some("Movie".to_string()),
            link: Some("https://indexer.example/details/abc.html".to_string()),
            ..Default::default()
        };
        assert!(client.normalize(item).is_none());
    }

    #[test]
    fn test_build_search_url() {
        let client = NewznabClient::new(make_config());
        let url = client.build_search_url(&make_plan());
        assert!(url.starts_with("https://indexer.example/api?t=movie&apikey=apikey1"));
        assert!(url.contains("q=movie%202023"));
        assert!(url.contains("imdbid=0111161"), "tt prefix stripped: {url}");
    }

    #[test]
    fn test_build_series_url_with_season_episode() {
        let client = NewznabClient::new(make_config());
        let plan = SearchPlan {
            plan_type: PlanType::Series,
            query: String::new(),
            tokens: PlanTokens {
                tvdb_id: Some(121361),
                season: Some(3),
                episode: Some(9),
                ..Default::default()
            },
            strict_phrase: None,
        };
        let url = client.build_search_url(&plan);
        assert!(url.contains("t=tvsearch"));
        assert!(url.contains("tvdbid=121361"));
        assert!(url.contains("season=3"));
        assert!(url.contains("ep=9"));
        assert!(!url.contains("&q="));
    }

    #[test]
    fn test_looks_like_nzb_url() {
        assert!(looks_like_nzb_url("https://x/file.nzb"));
        assert!(looks_like_nzb_url("https://x/api?mode=getnzb&id=1"));
        assert!(looks_like_nzb_url("https://x/api?t=getnzb&id=1"));
        assert!(looks_like_nzb_url("https://x/download/abc"));
        assert!(!looks_like_nzb_url("https://x/details/abc.html"));
        assert!(!looks_like_nzb_url("magnet:?xt=urn:btih:abc"));
    }

    #[test]
    fn test_parse_pub_date_variants() {
        let rfc2822 = parse_pub_date("Sat, 15 Jun 2024 10:30:00 +0000").unwrap();
        assert_eq!(rfc2822.year(), 2024);
        assert!(parse_pub_date("2024-06-15T10:30:00Z").is_some());
        assert!(parse_pub_date("junk").is_none());
    }
}
