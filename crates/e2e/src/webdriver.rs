//! `Page` over a W3C WebDriver session (fantoccini)

use async_trait::async_trait;
use bobqa_common::config::{BrowserConfig, BrowserEngine};
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, ClientBuilder, Locator as By};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::driver::{ConsoleEntry, Page, Query};
use crate::error::{DriverError, DriverResult, E2eError, E2eResult};

/// Kept entries in the in-page console buffer
const CONSOLE_BUFFER: usize = 500;

const BODY_TEXT_SCRIPT: &str = "return document.body ? document.body.innerText : '';";
const CONSOLE_READ_SCRIPT: &str = "return window.__bobqa_console || [];";

fn console_capture_script() -> String {
    format!(
        r#"
        (function() {{
            if (window.__bobqa_console_installed) return;
            window.__bobqa_console_installed = true;
            window.__bobqa_console = [];

            function push(level, args) {{
                const message = Array.from(args).map(function(arg) {{
                    if (typeof arg === 'object') {{
                        try {{ return JSON.stringify(arg); }} catch (e) {{ return String(arg); }}
                    }}
                    return String(arg);
                }}).join(' ');
                window.__bobqa_console.push({{
                    level: level,
                    message: message,
                    timestamp: new Date().toISOString()
                }});
                if (window.__bobqa_console.length > {limit}) {{
                    window.__bobqa_console.shift();
                }}
            }}

            ['log', 'info', 'warn', 'error'].forEach(function(level) {{
                const original = console[level];
                console[level] = function() {{
                    push(level, arguments);
                    original.apply(console, arguments);
                }};
            }});

            window.addEventListener('error', function(event) {{
                push('error', ['Uncaught ' + (event.error || event.message) + ' at ' +
                    event.filename + ':' + event.lineno + ':' + event.colno]);
            }});
            window.addEventListener('unhandledrejection', function(event) {{
                push('error', ['Unhandled Promise Rejection: ' + event.reason]);
            }});
        }})();
        "#,
        limit = CONSOLE_BUFFER
    )
}

/// W3C capabilities for the configured engine
pub fn capabilities(config: &BrowserConfig) -> Map<String, Value> {
    let mut caps = Map::new();
    let mut args: Vec<String> = Vec::new();

    match config.engine {
        BrowserEngine::Chrome => {
            args.push("--no-sandbox".to_string());
            args.push("--disable-dev-shm-usage".to_string());
            args.push("--disable-gpu".to_string());
            if config.headless {
                args.push("--headless=new".to_string());
            }
            args.push(format!("--window-size={},{}", config.window_width, config.window_height));
            args.extend(config.extra_args.iter().cloned());

            caps.insert("browserName".to_string(), json!("chrome"));
            caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
        BrowserEngine::Firefox => {
            if config.headless {
                args.push("--headless".to_string());
            }
            args.push(format!("--width={}", config.window_width));
            args.push(format!("--height={}", config.window_height));
            args.extend(config.extra_args.iter().cloned());

            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
    }

    caps
}

/// Messages of an `unknown error` that mean the browser itself is gone
const BROWSER_GONE_MARKERS: &[&str] = &["not reachable", "disconnected", "session deleted", "invalid session"];

/// Sorts a fantoccini failure into the two-tier taxonomy
pub(crate) fn classify(err: CmdError) -> DriverError {
    let message = err.to_string();
    let fatal = match &err {
        CmdError::Standard(wd) => match &wd.error {
            ErrorStatus::InvalidSessionId | ErrorStatus::SessionNotCreated | ErrorStatus::NoSuchWindow => true,
            ErrorStatus::UnknownError => {
                let lowered = wd.message.to_ascii_lowercase();
                BROWSER_GONE_MARKERS.iter().any(|m| lowered.contains(m))
            }
            _ => false,
        },
        CmdError::Lost(_)
        | CmdError::Failed(_)
        | CmdError::FailedC(_)
        | CmdError::NotJson(_)
        | CmdError::Json(_)
        | CmdError::NotW3C(_) => true,
        CmdError::BadUrl(_)
        | CmdError::InvalidArgument(..)
        | CmdError::ImageDecodeError(_)
        | CmdError::WaitTimeout => false,
    };
    if fatal {
        DriverError::Transport(message)
    } else {
        DriverError::Interaction(message)
    }
}

/// Browser page driven through a WebDriver server
pub struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    /// Start a session against `config.webdriver_url`
    pub async fn connect(config: &BrowserConfig) -> E2eResult<Self> {
        info!(
            "Starting {} session at {} (headless: {})",
            config.engine.as_str(),
            config.webdriver_url,
            config.headless
        );

        let client = ClientBuilder::native()
            .capabilities(capabilities(config))
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| E2eError::SessionStart {
                url: config.webdriver_url.clone(),
                reason: e.to_string(),
            })?;

        if let Err(e) = client
            .set_window_size(config.window_width, config.window_height)
            .await
        {
            debug!("Could not set window size: {}", e);
        }

        Ok(Self { client })
    }

    async fn install_console_capture(&self) {
        if let Err(e) = self.client.execute(&console_capture_script(), vec![]).await {
            debug!("Console capture not installed: {}", e);
        }
    }
}

#[async_trait]
impl Page for WebDriverPage {
    type Element = Element;

    async fn goto(&self, url: &str) -> DriverResult<()> {
        debug!("Navigating to {}", url);
        self.client.goto(url).await.map_err(classify)?;
        self.install_console_capture().await;
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let url = self.client.current_url().await.map_err(classify)?;
        Ok(url.to_string())
    }

    async fn find_all(&self, query: &Query) -> DriverResult<Vec<Element>> {
        let by = match query {
            Query::Css(q) => By::Css(q),
            Query::XPath(q) => By::XPath(q),
        };
        self.client.find_all(by).await.map_err(classify)
    }

    async fn click(&self, element: &Element) -> DriverResult<()> {
        element.click().await.map_err(classify)
    }

    async fn clear(&self, element: &Element) -> DriverResult<()> {
        element.clear().await.map_err(classify)
    }

    async fn send_keys(&self, element: &Element, text: &str) -> DriverResult<()> {
        element.send_keys(text).await.map_err(classify)
    }

    async fn select_by_label(&self, element: &Element, label: &str) -> DriverResult<()> {
        element.select_by_label(label).await.map_err(classify)
    }

    async fn select_by_value(&self, element: &Element, value: &str) -> DriverResult<()> {
        element.select_by_value(value).await.map_err(classify)
    }

    async fn text(&self, element: &Element) -> DriverResult<String> {
        element.text().await.map_err(classify)
    }

    async fn body_text(&self) -> DriverResult<String> {
        let value = self.evaluate(BODY_TEXT_SCRIPT).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn evaluate(&self, script: &str) -> DriverResult<Value> {
        self.client.execute(script, vec![]).await.map_err(classify)
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        self.client.screenshot().await.map_err(classify)
    }

    async fn console_entries(&self) -> DriverResult<Vec<ConsoleEntry>> {
        let value = self.evaluate(CONSOLE_READ_SCRIPT).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn close(&self) -> DriverResult<()> {
        info!("Closing browser session");
        self.client.clone().close().await.map_err(classify)
    }
}
