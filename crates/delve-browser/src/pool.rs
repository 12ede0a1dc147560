//! Browser pool: one lazily launched browser per profile, bounded pages.

use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info};

use delve_core::config::BrowserConfig;

/// How a page is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderProfile {
    /// Plain headless render.
    Standard,
    /// Automation markers hidden, human-like scrolling, challenge wait.
    Stealth,
}

impl RenderProfile {
    pub fn is_stealth(&self) -> bool {
        matches!(self, RenderProfile::Stealth)
    }
}

/// Per-render timing.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Upper bound for the whole render.
    pub timeout: Duration,
    /// Wait after load so client-side content can appear.
    pub settle: Duration,
}

impl RenderOptions {
    fn timed_out(&self) -> anyhow::Error {
        anyhow::anyhow!("render timed out after {}ms", self.timeout.as_millis())
    }
}

/// Run `work` until `deadline`, then run `cleanup` whether the work
/// finished, failed, or ran out of time.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
async fn until_deadline_then<T, W, C>(
    deadline: Instant,
    work: W,
    cleanup: C,
) -> Result<anyhow::Result<T>, tokio::time::error::Elapsed>
where
    W: Future<Output = anyhow::Result<T>>,
    C: Future<Output = ()>,
{
    let outcome = tokio::time::timeout_at(deadline, work).await;
    cleanup.await;
    outcome
}

/// Outcome of a page render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Main document status. 200 when the browser does not report one.
    pub status: u16,
    pub html: String,
}

/// Renders pages, at most `max_pages` at a time across all profiles.
pub struct BrowserPool {
    config: BrowserConfig,
    pages: Semaphore,
    #[cfg(feature = "browser")]
    standard: tokio::sync::OnceCell<cdp::Launched>,
    #[cfg(feature = "browser")]
    stealth: tokio::sync::OnceCell<cdp::Launched>,
}

impl BrowserPool {
    pub fn new(config: BrowserConfig) -> Self {
        let pages = Semaphore::new(config.max_pages.max(1));
        Self {
            config,
            pages,
            #[cfg(feature = "browser")]
            standard: tokio::sync::OnceCell::new(),
            #[cfg(feature = "browser")]
            stealth: tokio::sync::OnceCell::new(),
        }
    }

    pub fn max_pages(&self) -> usize {
        self.config.max_pages.max(1)
    }

    /// Pages that can be opened right now.
    pub fn available_pages(&self) -> usize {
        self.pages.available_permits()
    }

    /// Whether this build can render at all.
    pub fn is_supported() -> bool {
        cfg!(feature = "browser")
    }

    /// Render `url` and return its final HTML.
    pub async fn render(
        &self,
        url: &str,
        profile: RenderProfile,
        options: RenderOptions,
    ) -> anyhow::Result<RenderedPage> {
        let _permit = self.pages.acquire().await?;
        info!(url, ?profile, "Browser render");
        // The deadline covers launch and load; an opened page is always closed.
        let deadline = Instant::now() + options.timeout;
        let page = self.render_page(url, profile, options, deadline).await?;
        debug!(url, status = page.status, bytes = page.html.len(), "Render finished");
        Ok(page)
    }

    #[cfg(feature = "browser")]
    async fn render_page(
        &self,
        url: &str,
        profile: RenderProfile,
        options: RenderOptions,
        deadline: Instant,
    ) -> anyhow::Result<RenderedPage> {
        let cell = match profile {
            RenderProfile::Standard => &self.standard,
            RenderProfile::Stealth => &self.stealth,
        };
        let launched = tokio::time::timeout_at(
            deadline,
            cell.get_or_try_init(|| cdp::Launched::start(&self.config, profile)),
        )
        .await
        .map_err(|_| options.timed_out())??;
        launched.render(url, profile, options, deadline).await
    }

    #[cfg(not(feature = "browser"))]
    async fn render_page(
        &self,
        url: &str,
        _profile: RenderProfile,
        _options: RenderOptions,
        _deadline: Instant,
    ) -> anyhow::Result<RenderedPage> {
        anyhow::bail!("cannot render {url}: built without the `browser` feature")
    }
}

#[cfg(feature = "browser")]
mod cdp {
    use std::time::Duration;

    use chromiumoxide::Page;
    use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
    use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
    use futures::StreamExt;
    use tokio::task::JoinHandle;
    use tokio::time::Instant;
    use tracing::{debug, warn};

    use delve_core::config::BrowserConfig;

    use super::{RenderOptions, RenderProfile, RenderedPage, until_deadline_then};
    use crate::stealth;

    /// Seconds to wait for a challenge interstitial to clear.
    const CHALLENGE_WAIT_SECS: u64 = 10;

    pub(super) struct Launched {
        browser: Browser,
        handler: JoinHandle<()>,
    }

    impl Launched {
        pub(super) async fn start(config: &BrowserConfig, profile: RenderProfile) -> anyhow::Result<Self> {
            let mut builder = LaunchConfig::builder().args(stealth::launch_args(profile.is_stealth()));
            if !config.headless {
                builder = builder.with_head();
            }
            if let Some(path) = &config.chrome_path {
                builder = builder.chrome_executable(path);
            }
            let launch = builder.build().map_err(|e| anyhow::anyhow!("browser config: {e}"))?;

            let (browser, mut events) = Browser::launch(launch).await?;
            let handler = tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    if let Err(e) = event {
                        debug!(%e, "Browser handler stopped");
                        break;
                    }
                }
            });
            debug!(?profile, "Browser launched");
            Ok(Self { browser, handler })
        }

        pub(super) async fn render(
            &self,
            url: &str,
            profile: RenderProfile,
            options: RenderOptions,
            deadline: Instant,
        ) -> anyhow::Result<RenderedPage> {
            let page = tokio::time::timeout_at(deadline, self.browser.new_page("about:blank"))
                .await
                .map_err(|_| options.timed_out())??;
            let cleanup = async {
                if let Err(e) = page.clone().close().await {
                    warn!(%e, url, "Failed to close page");
                }
            };
            until_deadline_then(deadline, load(&page, url, profile, options.settle), cleanup)
                .await
                .map_err(|_| options.timed_out())?
        }
    }

    impl Drop for Launched {
        fn drop(&mut self) {
            self.handler.abort();
        }
    }

    async fn load(page: &Page, url: &str, profile: RenderProfile, settle: Duration) -> anyhow::Result<RenderedPage> {
        if profile.is_stealth() {
            page.set_user_agent(stealth::STEALTH_USER_AGENT).await?;
            page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(
                stealth::HIDE_AUTOMATION_SCRIPT,
            ))
            .await?;
        }

        page.goto(url).await?;
        page.wait_for_navigation().await?;
        let status: i64 = page
            .evaluate(stealth::NAVIGATION_STATUS_SCRIPT)
            .await?
            .into_value()
            .unwrap_or(0);

        if profile.is_stealth() {
            for _ in 0..CHALLENGE_WAIT_SECS {
                let title = page.get_title().await?.unwrap_or_default();
                if !stealth::is_challenge(&title) {
                    break;
                }
                debug!(url, "Waiting for challenge page to clear");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            for step in stealth::SCROLL_STEPS {
                page.evaluate(format!("window.scrollBy(0, {step})")).await?;
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }

        tokio::time::sleep(settle).await;
        let html = page.content().await?;
        let status = u16::try_from(status).ok().filter(|s| *s > 0).unwrap_or(200);
        Ok(RenderedPage { status, html })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_pages: usize) -> BrowserConfig {
        BrowserConfig {
            chrome_path: None,
            headless: true,
            max_pages,
        }
    }

    #[test]
    fn test_page_limit_from_config() {
        let pool = BrowserPool::new(config(3));
        assert_eq!(pool.max_pages(), 3);
        assert_eq!(pool.available_pages(), 3);
        assert_eq!(BrowserPool::new(config(0)).max_pages(), 1);
    }

    #[cfg(not(feature = "browser"))]
    #[tokio::test]
    async fn test_render_without_browser_support_fails() {
        let pool = BrowserPool::new(config(2));
        let options = RenderOptions {
            timeout: Duration::from_secs(1),
            settle: Duration::ZERO,
        };
        let err = pool
            .render("https://example.com", RenderProfile::Standard, options)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("browser"));
        assert_eq!(pool.available_pages(), 2);
        assert!(!BrowserPool::is_supported());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_runs_when_render_times_out() {
        let closed = std::sync::atomic::AtomicBool::new(false);
        let deadline = Instant::now() + Duration::from_secs(2);
        let slow_load = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("never")
        };
        let cleanup = async { closed.store(true, std::sync::atomic::Ordering::SeqCst) };

        let outcome = until_deadline_then(deadline, slow_load, cleanup).await;
        assert!(outcome.is_err());
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_failed_render() {
        let closed = std::sync::atomic::AtomicBool::new(false);
        let deadline = Instant::now() + Duration::from_secs(5);
        let failing_load = async { Err::<(), _>(anyhow::anyhow!("navigation failed")) };
        let cleanup = async { closed.store(true, std::sync::atomic::Ordering::SeqCst) };

        let outcome = until_deadline_then(deadline, failing_load, cleanup).await.unwrap();
        assert!(outcome.is_err());
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
