//! robots.txt policy per host

use reqwest::Client;
use robotstxt::DefaultMatcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Reduce a full user agent string to its product token ("blogseo/0.1 (+url)" -> "blogseo")
pub fn product_token(user_agent: &str) -> &str {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or(user_agent)
}

/// One host's robots.txt, evaluated for a single agent
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    body: String,
    agent: String,
    crawl_delay: Option<Duration>,
}

impl RobotsPolicy {
    pub fn for_agent(body: &str, user_agent: &str) -> Self {
        let agent = product_token(user_agent).to_string();
        Self {
            crawl_delay: crawl_delay_for(body, &agent),
            body: body.to_string(),
            agent,
        }
    }

    /// Policy used when a host has no readable robots.txt
    pub fn permissive(user_agent: &str) -> Self {
        Self::for_agent("", user_agent)
    }

    pub fn allows(&self, url: &str) -> bool {
        if self.body.trim().is_empty() {
            return true;
        }
        let allowed =
            DefaultMatcher::default().one_agent_allowed_by_robots(&self.body, &self.agent, url);
        if !allowed {
            debug!("robots.txt disallows {} for {}", url, self.agent);
        }
        allowed
    }

    /// `Crawl-delay` of the agent's own group, else of the `*` group
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }
}

fn crawl_delay_for(body: &str, agent: &str) -> Option<Duration> {
    let agent = agent.to_lowercase();
    let mut group: Vec<String> = Vec::new();
    let mut in_agent_lines = false;
    let mut wildcard = None;
    let mut specific = None;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "user-agent" => {
                // Consecutive user-agent lines share one group
                if !in_agent_lines {
                    group.clear();
                }
                group.push(value.to_lowercase());
                in_agent_lines = true;
            }
            "crawl-delay" => {
                in_agent_lines = false;
                let Ok(seconds) = value.parse::<f64>() else {
                    continue;
                };
                for member in &group {
                    if member == "*" {
                        wildcard = Some(seconds);
                    } else if !member.is_empty() && agent.contains(member.as_str()) {
                        specific = Some(seconds);
                    }
                }
            }
            _ => in_agent_lines = false,
        }
    }

    specific
        .or(wildcard)
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

/// robots.txt policies keyed by `scheme://host[:port]`, fetched once per origin
pub struct RobotsCache {
    user_agent: String,
    policies: RwLock<HashMap<String, Arc<RobotsPolicy>>>,
}

impl RobotsCache {
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            policies: RwLock::new(HashMap::new()),
        }
    }

    /// Policy for `scheme://host`, fetching its robots.txt on first use.
    ///
    /// http and https are separate origins with their own file. Any failure
    /// to read the file (network error, non-2xx) allows everything.
    pub async fn policy(&self, client: &Client, scheme: &str, host: &str) -> Arc<RobotsPolicy> {
        let origin = format!("{}://{}", scheme.to_ascii_lowercase(), host);
        if let Some(policy) = self.policies.read().await.get(&origin) {
            return policy.clone();
        }

        let robots_url = format!("{}/robots.txt", origin);
        debug!("Fetching {}", robots_url);

        let policy = match client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => RobotsPolicy::for_agent(&body, &self.user_agent),
                Err(_) => RobotsPolicy::permissive(&self.user_agent),
            },
            Ok(response) => {
                debug!("{} returned {}, allowing all", robots_url, response.status());
                RobotsPolicy::permissive(&self.user_agent)
            }
            Err(e) => {
                debug!("{} unreachable ({}), allowing all", robots_url, e);
                RobotsPolicy::permissive(&self.user_agent)
            }
        };

        self.policies
            .write()
            .await
            .entry(origin)
            .or_insert_with(|| Arc::new(policy))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UA: &str = "blogseo/0.1.0 (+https://github.com/sealad886/blogseo)";

    #[test]
    fn test_product_token() {
        assert_eq!(product_token(UA), "blogseo");
        assert_eq!(product_token("PlainBot"), "PlainBot");
    }

    #[test]
    fn test_groups() {
        let body = "User-agent: *\nDisallow: /admin/\n\nUser-agent: blogseo\nDisallow: /drafts/\n";

        let ours = RobotsPolicy::for_agent(body, UA);
        assert!(ours.allows("https://example.com/2024/post"));
        assert!(!ours.allows("https://example.com/drafts/wip"));
        // A specific group replaces the wildcard group
        assert!(ours.allows("https://example.com/admin/"));

        let other = RobotsPolicy::for_agent(body, "OtherBot/2.0");
        assert!(!other.allows("https://example.com/admin/"));
        assert!(other.allows("https://example.com/drafts/wip"));

        assert!(RobotsPolicy::permissive(UA).allows("https://example.com/anything"));
    }

    #[test]
    fn test_crawl_delay() {
        let body = r#"
User-agent: *
Crawl-delay: 2.5

User-agent: Googlebot
User-agent: blogseo
Crawl-delay: 1  # seconds
"#;
        assert_eq!(
            RobotsPolicy::for_agent(body, UA).crawl_delay(),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            RobotsPolicy::for_agent(body, "RandomBot").crawl_delay(),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(RobotsPolicy::permissive(UA).crawl_delay(), None);
        assert_eq!(
            RobotsPolicy::for_agent("User-agent: *\nCrawl-delay: soon\n", UA).crawl_delay(),
            None
        );
    }

    #[tokio::test]
    async fn test_cache_fetches_once_per_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/\n"))
            .expect(1)
            .mount(&server)
            .await;

        let uri = url::Url::parse(&server.uri()).unwrap();
        let host = format!("{}:{}", uri.host_str().unwrap(), uri.port().unwrap());
        let cache = RobotsCache::new(UA);
        let client = Client::new();

        let first = cache.policy(&client, "http", &host).await;
        let second = cache.policy(&client, "http", &host).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.allows(&format!("{}/private/post", server.uri())));
    }

    #[tokio::test]
    async fn test_cache_separates_schemes_on_one_host() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
            .expect(1)
            .mount(&server)
            .await;

        let uri = url::Url::parse(&server.uri()).unwrap();
        let host = format!("{}:{}", uri.host_str().unwrap(), uri.port().unwrap());
        let cache = RobotsCache::new(UA);
        let client = Client::new();

        let plain = cache.policy(&client, "http", &host).await;
        assert!(!plain.allows(&format!("{}/post", server.uri())));

        // The mock only speaks plain HTTP, so the TLS origin has no readable file
        let tls = cache.policy(&client, "https", &host).await;
        assert!(!Arc::ptr_eq(&plain, &tls));
        assert!(tls.allows(&format!("https://{}/post", host)));

        let plain_again = cache.policy(&client, "http", &host).await;
        assert!(Arc::ptr_eq(&plain, &plain_again));
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let uri = url::Url::parse(&server.uri()).unwrap();
        let host = format!("{}:{}", uri.host_str().unwrap(), uri.port().unwrap());
        let policy = RobotsCache::new(UA).policy(&Client::new(), "http", &host).await;
        assert!(policy.allows(&format!("{}/anything", server.uri())));
    }
}
