//! Visit a page through the safety layer and save a budgeted screenshot
//!
//! Usage: cargo run -p browser --example visit_page -- https://example.com

use browser::navigation::{safe_navigate, QualityProfile};
use browser::screenshot::{capture_bounded, DEFAULT_MAX_BYTES};
use browser::{BrowserConfig, ChromeLauncher, ResourceManager};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com".to_string());

    let config = BrowserConfig {
        no_sandbox: true,
        ..BrowserConfig::default()
    };
    let page_settings = config.page.clone();
    let manager = ResourceManager::new(Arc::new(ChromeLauncher::new(config)), page_settings);

    let page = manager.acquire_page().await?;
    println!("Visiting {}", url);

    // Example pages are short; only reject interstitials
    match safe_navigate(page.as_ref(), &url, QualityProfile::Lenient).await {
        Ok(()) => {
            println!("Title: {}", page.title().await?);
            let markdown = content::extract_markdown(&page.content().await?, None)?;
            println!("{}", markdown);

            let viewport = manager.page_settings().viewport;
            let png = capture_bounded(page.as_ref(), DEFAULT_MAX_BYTES, viewport).await?;
            std::fs::write("visit_page.png", &png)?;
            println!("Screenshot: visit_page.png ({} bytes)", png.len());
        }
        Err(e) => println!("Navigation rejected: {}", e),
    }

    manager.release_all().await;
    Ok(())
}
