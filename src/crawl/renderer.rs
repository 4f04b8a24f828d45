//! Headless rendering of client-hydrated blog posts
//!
//! Naver SmartEditor and Medium only put the post body into the DOM after
//! their scripts run. A [`PageRenderer`] loads such pages in a browser and
//! hands back the hydrated markup.

use crate::config::CrawlConfig;
use crate::error::Result;
use crate::normalize::rules_for;
use crate::platform::PlatformVariant;
use async_trait::async_trait;
use std::sync::Arc;

/// Hydrated markup of one page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL the browser ended on
    pub final_url: String,
    pub html: String,
}

/// Loads a URL in a browser and returns the markup after scripts ran
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, platform: PlatformVariant) -> Result<RenderedPage>;

    /// Release browser resources
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Element whose presence means the post body has hydrated.
///
/// Same selectors the extraction rules read, so a page that passes the wait
/// also has something to extract.
pub fn hydration_selector(platform: PlatformVariant) -> Option<&'static str> {
    rules_for(platform).map(|rules| rules.body)
}

/// The browser renderer for this build, if it was compiled with one
pub fn default_renderer(config: &CrawlConfig) -> Option<Arc<dyn PageRenderer>> {
    #[cfg(feature = "js-rendering")]
    {
        Some(Arc::new(chromium::ChromiumRenderer::new(config)))
    }
    #[cfg(not(feature = "js-rendering"))]
    {
        let _ = config;
        None
    }
}

#[cfg(feature = "js-rendering")]
pub use chromium::ChromiumRenderer;

#[cfg(feature = "js-rendering")]
mod chromium {
    use super::*;
    use crate::error::Error;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::Page;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::sync::{Mutex, Semaphore};
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout, Instant};
    use tracing::{debug, info, warn};

    /// Open tabs at once; each hydrated post page is heavy
    const MAX_TABS: usize = 4;
    const SELECTOR_POLL: Duration = Duration::from_millis(200);

    struct Session {
        browser: Browser,
        events: JoinHandle<()>,
    }

    /// Renderer backed by one lazily launched headless Chrome
    pub struct ChromiumRenderer {
        load_timeout: Duration,
        settle: Duration,
        user_agent: String,
        sandbox: bool,
        session: Mutex<Option<Session>>,
        tabs: Semaphore,
    }

    impl ChromiumRenderer {
        pub fn new(config: &CrawlConfig) -> Self {
            Self {
                load_timeout: Duration::from_millis(config.render_timeout_ms),
                settle: Duration::from_millis(config.render_wait_ms),
                user_agent: config.user_agent.clone(),
                sandbox: !config.js_no_sandbox,
                session: Mutex::new(None),
                tabs: Semaphore::new(MAX_TABS),
            }
        }

        async fn launch(&self) -> Result<Session> {
            info!("Launching headless Chrome");

            let mut builder = BrowserConfig::builder()
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--mute-audio")
                .arg(format!("--user-agent={}", self.user_agent));
            if !self.sandbox {
                builder = builder.no_sandbox();
            }
            let config = builder
                .build()
                .map_err(|e| Error::Render(format!("Invalid browser config: {}", e)))?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| Error::Render(format!("Failed to launch browser: {}", e)))?;
            let events = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            Ok(Session { browser, events })
        }

        /// Blank tab in the shared browser, launching it first if needed
        async fn open_tab(&self) -> Result<Page> {
            let mut session = self.session.lock().await;
            if session.is_none() {
                *session = Some(self.launch().await?);
            }
            let browser = &session
                .as_ref()
                .ok_or_else(|| Error::Render("browser session missing".to_string()))?
                .browser;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| Error::Render(format!("Failed to open tab: {}", e)))
        }

        async fn load(&self, page: &Page, url: &str, platform: PlatformVariant) -> Result<RenderedPage> {
            timeout(self.load_timeout, page.goto(url))
                .await
                .map_err(|_| Error::Render(format!("Page load timeout: {}", url)))?
                .map_err(|e| Error::Render(format!("Navigation to {} failed: {}", url, e)))?;

            // The settle time doubles as the budget for the hydration wait
            match hydration_selector(platform) {
                Some(selector) => self.wait_for(page, selector).await,
                None if !self.settle.is_zero() => sleep(self.settle).await,
                None => {}
            }

            let final_url = page
                .url()
                .await
                .map_err(|e| Error::Render(format!("Failed to read page URL: {}", e)))?
                .map(|u| u.to_string())
                .unwrap_or_else(|| url.to_string());
            let html = page
                .content()
                .await
                .map_err(|e| Error::Render(format!("Failed to read page content: {}", e)))?;

            Ok(RenderedPage { final_url, html })
        }

        /// Poll for `selector` for at most the settle time
        async fn wait_for(&self, page: &Page, selector: &str) {
            let deadline = Instant::now() + self.settle;
            loop {
                if page.find_element(selector).await.is_ok() {
                    return;
                }
                if Instant::now() >= deadline {
                    debug!("Hydration selector {:?} never appeared", selector);
                    return;
                }
                sleep(SELECTOR_POLL).await;
            }
        }
    }

    #[async_trait]
    impl PageRenderer for ChromiumRenderer {
        async fn render(&self, url: &str, platform: PlatformVariant) -> Result<RenderedPage> {
            let _tab = self
                .tabs
                .acquire()
                .await
                .map_err(|_| Error::Render("renderer closed".to_string()))?;

            let page = self.open_tab().await?;
            let outcome = self.load(&page, url, platform).await;
            if let Err(e) = page.close().await {
                warn!("Failed to close tab for {}: {}", url, e);
            }
            outcome
        }

        async fn close(&self) -> Result<()> {
            if let Some(mut session) = self.session.lock().await.take() {
                if let Err(e) = session.browser.close().await {
                    warn!("Failed to close browser: {}", e);
                }
                session.events.abort();
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hydration_selector_follows_extraction_rules() {
        assert_eq!(
            hydration_selector(PlatformVariant::Brunch),
            Some(".wrap_body")
        );
        assert!(hydration_selector(PlatformVariant::Naver)
            .unwrap()
            .contains(".se-main-container"));
        assert_eq!(hydration_selector(PlatformVariant::Generic), None);
    }

    #[cfg(not(feature = "js-rendering"))]
    #[test]
    fn test_no_renderer_without_feature() {
        assert!(default_renderer(&CrawlConfig::default()).is_none());
    }
}
