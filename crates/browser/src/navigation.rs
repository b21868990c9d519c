//! Navigation Safety Layer
//!
//! `safe_navigate` loads a URL and then decides whether what loaded is real
//! content or a bot-defense interstitial / empty shell.
//!
//! Pipeline (each failure aborts the rest unless noted):
//! 1. Seed the search-engine consent cookie (best-effort)
//! 2. Navigate, waiting for DOM-ready only
//! 3. Reject HTTP status >= 400
//! 4. Wait briefly for `<body>` (non-fatal)
//! 5. Race network-idle against a flat timer
//! 6. Take a quality snapshot in the page
//! 7. Gate on challenge markers, title phrases and word count
//!
//! A navigation timeout is tolerated: the page keeps whatever loaded.

use std::time::Duration;

use crate::error::{BrowserError, Result};
use crate::page::{Cookie, Page, QualitySnapshot};

pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(15);
pub const BODY_WAIT: Duration = Duration::from_secs(3);
pub const NETWORK_IDLE_WAIT: Duration = Duration::from_secs(5);

/// DOM markers of known bot-challenge pages
pub const CHALLENGE_SELECTORS: &[&str] = &[
    "#cf-challenge-running",
    "#challenge-running",
    "#challenge-form",
    ".cf-browser-verification",
    "#turnstile-wrapper",
    ".g-recaptcha",
    ".h-captcha",
    "#px-captcha",
    "#ddos-protection",
    "#waf-challenge",
    "iframe[src*='captcha']",
];

/// Lowercase title fragments of challenge / "please wait" interstitials
pub const SUSPICIOUS_TITLES: &[&str] = &[
    "security check",
    "ddos protection",
    "please wait",
    "just a moment",
    "attention required",
    "access denied",
    "verify you are human",
    "captcha",
];

/// Minimum visible word count a page must reach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityProfile {
    /// Article pages
    Strict,
    /// Sparse pages such as a search homepage
    Lenient,
}

impl QualityProfile {
    pub fn min_words(self) -> usize {
        match self {
            QualityProfile::Strict => 1000,
            QualityProfile::Lenient => 10,
        }
    }
}

fn consent_cookie() -> Cookie {
    Cookie {
        name: "CONSENT".to_string(),
        value: "YES+".to_string(),
        domain: ".google.com".to_string(),
        path: "/".to_string(),
    }
}

/// Navigate `page` to `url` and verify the result is usable content
pub async fn safe_navigate(page: &dyn Page, url: &str, profile: QualityProfile) -> Result<()> {
    match navigate_and_validate(page, url, profile).await {
        Err(BrowserError::NavigationTimeout(after)) => {
            tracing::warn!(
                "[Navigation] {} not DOM-ready after {:?}, continuing with partial content",
                url,
                after
            );
            Ok(())
        }
        other => other,
    }
}

async fn navigate_and_validate(page: &dyn Page, url: &str, profile: QualityProfile) -> Result<()> {
    if let Err(e) = page.set_cookie(&consent_cookie()).await {
        tracing::debug!("[Navigation] Consent cookie not set: {}", e);
    }

    tracing::debug!("[Navigation] Navigating to {}", url);
    if let Some(response) = page.goto(url, NAVIGATION_TIMEOUT).await? {
        if response.status >= 400 {
            return Err(BrowserError::HttpStatus {
                status: response.status,
                status_text: response.status_text,
            });
        }
    }

    if let Err(e) = page.wait_for_selector("body", BODY_WAIT).await {
        tracing::debug!("[Navigation] No body on {}: {}", url, e);
    }

    tokio::select! {
        idle = page.wait_for_network_idle() => {
            if let Err(e) = idle {
                tracing::debug!("[Navigation] Network idle wait failed: {}", e);
            }
        }
        _ = tokio::time::sleep(NETWORK_IDLE_WAIT) => {
            tracing::debug!("[Navigation] Network not idle after {:?}", NETWORK_IDLE_WAIT);
        }
    }

    let snapshot = page.quality_snapshot(CHALLENGE_SELECTORS).await?;
    validate_snapshot(&snapshot, profile)?;
    tracing::debug!(
        "[Navigation] {} passed quality gate ({} words)",
        url,
        snapshot.word_count
    );
    Ok(())
}

/// Content-quality gate over a page snapshot
pub fn validate_snapshot(snapshot: &QualitySnapshot, profile: QualityProfile) -> Result<()> {
    if snapshot.has_challenge {
        return Err(BrowserError::BotProtection(
            "challenge marker present on page".to_string(),
        ));
    }

    let title = snapshot.title.to_lowercase();
    if SUSPICIOUS_TITLES.iter().any(|phrase| title.contains(phrase)) {
        return Err(BrowserError::SuspiciousTitle(snapshot.title.clone()));
    }

    let min = profile.min_words();
    if snapshot.word_count < min {
        return Err(BrowserError::InsufficientContent {
            words: snapshot.word_count,
            min,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePage, FakePageSpec, GotoBehavior};
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    fn page_with_body(body: &str) -> FakePage {
        FakePage::new(FakePageSpec::default().with_html(format!(
            "<html><head><title>Article</title></head><body>{body}</body></html>"
        )))
    }

    #[tokio::test]
    async fn test_stub_page_is_insufficient() {
        let page = page_with_body("<p>only five words right here</p>");
        let err = safe_navigate(&page, "https://example.com", QualityProfile::Strict)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BrowserError::InsufficientContent { words: 5, min: 1000 }
        ));
    }

    #[tokio::test]
    async fn test_long_article_passes() {
        let page = page_with_body(&format!("<p>{}</p>", "lorem ".repeat(2000)));
        assert_ok!(safe_navigate(&page, "https://example.com", QualityProfile::Strict).await);
        assert_eq!(page.navigations(), vec!["https://example.com"]);
        assert_eq!(page.cookies()[0].name, "CONSENT");
    }

    #[tokio::test]
    async fn test_challenge_marker_beats_word_count() {
        let page = page_with_body(&format!(
            "<div id=\"cf-challenge-running\"></div><p>{}</p>",
            "lorem ".repeat(2000)
        ));
        let err = safe_navigate(&page, "https://example.com", QualityProfile::Strict)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::BotProtection(_)));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let page = FakePage::new(FakePageSpec::default().with_status(Some(404)));
        let err = safe_navigate(&page, "https://example.com/missing", QualityProfile::Lenient)
            .await
            .unwrap_err();
        match err {
            BrowserError::HttpStatus {
                status,
                status_text,
            } => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_navigation_timeout_is_tolerated() {
        let page = FakePage::new(FakePageSpec::default().with_goto(GotoBehavior::Timeout));
        assert_ok!(safe_navigate(&page, "https://slow.example.com", QualityProfile::Strict).await);
        assert_eq!(page.navigations().len(), 1);
    }

    #[tokio::test]
    async fn test_other_navigation_failure_propagates() {
        let page = FakePage::new(
            FakePageSpec::default().with_goto(GotoBehavior::Fail("net::ERR_NAME_NOT_RESOLVED".into())),
        );
        let err = safe_navigate(&page, "https://nx.invalid", QualityProfile::Lenient)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Navigation(_)));
    }

    fn article_spec() -> FakePageSpec {
        FakePageSpec::default().with_html(format!(
            "<html><head><title>Article</title></head><body><p>{}</p></body></html>",
            "lorem ".repeat(2000)
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_wins_when_network_never_settles() {
        let page = FakePage::new(article_spec().with_network_idle(false));
        let started = Instant::now();

        assert_ok!(safe_navigate(&page, "https://busy.example.com", QualityProfile::Strict).await);

        let elapsed = started.elapsed();
        assert!(elapsed >= NETWORK_IDLE_WAIT, "returned after {elapsed:?}");
        assert!(elapsed < NETWORK_IDLE_WAIT + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_body_is_waited_out() {
        let page = FakePage::new(article_spec().with_missing_selector("body"));
        let started = Instant::now();

        assert_ok!(safe_navigate(&page, "https://example.com", QualityProfile::Strict).await);

        let elapsed = started.elapsed();
        assert!(elapsed >= BODY_WAIT, "returned after {elapsed:?}");
        assert!(elapsed < BODY_WAIT + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_page_bounded_by_both_waits() {
        let page = FakePage::new(
            article_spec()
                .with_missing_selector("body")
                .with_network_idle(false),
        );
        let started = Instant::now();

        assert_ok!(safe_navigate(&page, "https://example.com", QualityProfile::Strict).await);

        let elapsed = started.elapsed();
        assert!(elapsed >= BODY_WAIT + NETWORK_IDLE_WAIT);
        assert!(elapsed < BODY_WAIT + NETWORK_IDLE_WAIT + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cookie_failure_is_not_fatal() {
        let page = FakePage::new(article_spec().with_cookie_failure());

        assert_ok!(safe_navigate(&page, "https://example.com", QualityProfile::Strict).await);

        assert!(page.cookies().is_empty());
        assert_eq!(page.navigations(), vec!["https://example.com"]);
    }

    #[test]
    fn test_suspicious_title_case_insensitive() {
        let snapshot = QualitySnapshot {
            has_challenge: false,
            word_count: 5000,
            title: "Just a Moment...".to_string(),
        };
        assert!(matches!(
            validate_snapshot(&snapshot, QualityProfile::Strict),
            Err(BrowserError::SuspiciousTitle(_))
        ));
    }

    #[test]
    fn test_lenient_profile_threshold() {
        let snapshot = QualitySnapshot {
            has_challenge: false,
            word_count: 12,
            title: "Google".to_string(),
        };
        assert_ok!(validate_snapshot(&snapshot, QualityProfile::Lenient));
        assert_err!(validate_snapshot(&snapshot, QualityProfile::Strict));
    }
}
