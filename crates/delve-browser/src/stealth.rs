//! Fingerprint adjustments for the stealth profile.

/// Desktop Chrome UA presented by stealth pages.
pub const STEALTH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Injected before any page script runs.
pub const HIDE_AUTOMATION_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
"#;

/// Reads the main document's HTTP status from the Navigation Timing API;
/// 0 when the browser does not expose it.
pub const NAVIGATION_STATUS_SCRIPT: &str =
    "(performance.getEntriesByType('navigation')[0] || {}).responseStatus || 0";

/// Scroll steps (pixels) that imitate a reader skimming the page.
pub const SCROLL_STEPS: [u32; 3] = [400, 800, 300];

/// Interstitial titles shown by bot-protection challenges.
const CHALLENGE_MARKERS: [&str; 3] = ["just a moment", "checking your browser", "attention required"];

/// Launch arguments for a profile.
pub fn launch_args(stealth: bool) -> Vec<String> {
    let mut args = vec![
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-dev-shm-usage".to_string(),
    ];
    if stealth {
        args.push("--disable-blink-features=AutomationControlled".into());
        args.push("--window-size=1366,768".into());
        args.push("--lang=en-US".into());
    }
    args
}

/// Whether a page title looks like a bot-protection interstitial.
pub fn is_challenge(title: &str) -> bool {
    let title = title.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| title.contains(m))
}
