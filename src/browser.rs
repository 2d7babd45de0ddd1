use std::{fs, path::PathBuf, str, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams, Request as CdpRequest, RequestId,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::{sync::oneshot, task::JoinHandle, time};
use tracing::{debug, info, warn};
use url::{Url, form_urlencoded};

use crate::{
    constants,
    error::{Error, Result},
};

/// Which callback carries the result of the login flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureTarget {
    /// SAMLResponse posted to the Assertion Consumer Service URL
    Saml { acs_url: String },
    /// Role-credential JSON served by the SSO portal federation endpoint.
    ///
    /// `credentials_endpoint` is the full URL, query included, opened once
    /// the portal has loaded `user_endpoint`.
    Sso {
        user_endpoint: String,
        credentials_endpoint: String,
    },
}

/// A browser that can be pointed at an IdP and watched for its callback.
#[async_trait]
pub trait BrowserAutomation: Send {
    async fn launch(&mut self) -> Result<()>;

    /// Install the listener for `target`, then navigate to `url`.
    /// The captured value is sent once on `tx`.
    async fn start_capture(
        &mut self,
        url: &str,
        target: &CaptureTarget,
        tx: oneshot::Sender<String>,
    ) -> Result<()>;

    /// Tear the browser down; safe to call when not launched
    async fn close(&mut self);
}

/// Drive `browser` through the IdP login and wait for the callback.
///
/// The browser is closed on every path. Exceeding `timeout` yields
/// [`Error::CaptureTimeout`]; no retry happens here.
pub async fn capture<B>(
    browser: &mut B,
    url: &str,
    target: &CaptureTarget,
    timeout: Duration,
) -> Result<String>
where
    B: BrowserAutomation + ?Sized,
{
    info!("Starting browser authentication flow");

    // Launch and page setup count against the timeout too
    let flow = async {
        browser.launch().await?;

        let (tx, rx) = oneshot::channel();
        browser.start_capture(url, target, tx).await?;
        info!("Browser opened. Please complete authentication in the browser window.");

        rx.await.map_err(|_| {
            Error::Browser("browser closed before the login completed".to_string())
        })
    };
    let result = match time::timeout(timeout, flow).await {
        Ok(result) => result,
        Err(_) => Err(Error::CaptureTimeout(timeout)),
    };

    browser.close().await;
    result
}

/// Chrome driven over the DevTools protocol
pub struct ChromeBrowser {
    user_data_dir: PathBuf,
    headless: bool,
    browser: Option<Browser>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromeBrowser {
    /// `user_data_dir` is reused between runs so IdP sessions survive
    pub fn new(user_data_dir: PathBuf, headless: bool) -> Self {
        Self {
            user_data_dir,
            headless,
            browser: None,
            tasks: Vec::new(),
        }
    }

    fn browser(&self) -> Result<&Browser> {
        self.browser
            .as_ref()
            .ok_or_else(|| Error::Browser("browser not launched".to_string()))
    }
}

fn browser_error(e: impl std::fmt::Display) -> Error {
    Error::Browser(e.to_string())
}

#[async_trait]
impl BrowserAutomation for ChromeBrowser {
    async fn launch(&mut self) -> Result<()> {
        fs::create_dir_all(&self.user_data_dir)?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&self.user_data_dir)
            .viewport(None)
            .args(vec![
                "--no-first-run",
                "--no-default-browser-check",
                "--disable-blink-features=AutomationControlled", // Prevent detection of automation
                "--no-startup-window",                           // Prevent automatic new tab on startup
            ]);
        if !self.headless {
            builder = builder.with_head().arg("--start-maximized");
        }
        let config = builder.build().map_err(browser_error)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Browser(format!("failed to launch Chrome: {e}")))?;

        self.tasks
            .push(tokio::spawn(async move { while handler.next().await.is_some() {} }));
        self.browser = Some(browser);
        Ok(())
    }

    async fn start_capture(
        &mut self,
        url: &str,
        target: &CaptureTarget,
        tx: oneshot::Sender<String>,
    ) -> Result<()> {
        let page = self
            .browser()?
            .new_page("about:blank")
            .await
            .map_err(browser_error)?;
        page.execute(EnableParams::default())
            .await
            .map_err(browser_error)?;

        let listener = match target {
            CaptureTarget::Saml { acs_url } => watch_saml(&page, acs_url.clone(), tx).await?,
            CaptureTarget::Sso {
                user_endpoint,
                credentials_endpoint,
            } => {
                watch_sso(
                    &page,
                    user_endpoint.clone(),
                    credentials_endpoint.clone(),
                    tx,
                )
                .await?
            }
        };
        self.tasks.push(listener);

        info!("Navigating to identity provider login page");
        debug!("Provider URL: {}", url);
        page.goto(url).await.map_err(browser_error)?;
        Ok(())
    }

    async fn close(&mut self) {
        // The handler task relays Browser.close, so it must outlive the shutdown
        if let Some(mut browser) = self.browser.take() {
            let shutdown = async {
                browser.close().await.map_err(browser_error)?;
                browser.wait().await?;
                Ok::<_, Error>(())
            };
            let closed = match time::timeout(constants::BROWSER_CLOSE_TIMEOUT, shutdown).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!("Failed to close browser: {}", e);
                    false
                }
                Err(_) => {
                    warn!(
                        "Browser did not exit within {:?}",
                        constants::BROWSER_CLOSE_TIMEOUT
                    );
                    false
                }
            };
            if !closed {
                if let Some(Err(e)) = browser.kill().await {
                    warn!("Failed to kill browser: {}", e);
                }
            }
            debug!("Browser closed");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

async fn watch_saml(
    page: &Page,
    acs_url: String,
    tx: oneshot::Sender<String>,
) -> Result<JoinHandle<()>> {
    let mut events = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(browser_error)?;

    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let Some(saml) = extract_saml_from_request(&event, &acs_url) {
                debug!("Captured SAMLResponse from {}", event.request.url);
                let _ = tx.send(saml);
                return;
            }
        }
    }))
}

async fn watch_sso(
    page: &Page,
    user_endpoint: String,
    credentials_endpoint: String,
    tx: oneshot::Sender<String>,
) -> Result<JoinHandle<()>> {
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(browser_error)?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(browser_error)?;
    let page = page.clone();

    Ok(tokio::spawn(async move {
        let mut tx = Some(tx);
        let mut redirected = false;
        let mut pending: Vec<RequestId> = Vec::new();

        loop {
            tokio::select! {
                Some(event) = responses.next() => {
                    let url = &event.response.url;
                    if url.starts_with(&user_endpoint) && !redirected {
                        // The portal has set its client-side state, so the
                        // federation endpoint will now answer for this session
                        debug!("SSO user endpoint loaded, requesting role credentials");
                        redirected = true;
                        let page = page.clone();
                        let target = credentials_endpoint.clone();
                        tokio::spawn(async move {
                            if let Err(e) = page.goto(target).await {
                                warn!("Cannot open SSO federation endpoint: {}", e);
                            }
                        });
                    } else if url.starts_with(&credentials_endpoint) {
                        pending.push(event.request_id.clone());
                    }
                }
                Some(event) = finished.next() => {
                    let Some(pos) = pending.iter().position(|id| *id == event.request_id) else {
                        continue;
                    };
                    pending.swap_remove(pos);

                    let params = GetResponseBodyParams::new(event.request_id.clone());
                    match page.execute(params).await {
                        Ok(response) => {
                            let body = response_body(&response.result.body, response.result.base64_encoded);
                            if let (Some(body), Some(tx)) = (body, tx.take()) {
                                debug!("Captured SSO role credentials");
                                let _ = tx.send(body);
                                return;
                            }
                        }
                        Err(e) => warn!("Cannot read SSO credentials response: {}", e),
                    }
                }
                else => return,
            }
        }
    }))
}

fn extract_saml_from_request(event: &Arc<EventRequestWillBeSent>, acs_url: &str) -> Option<String> {
    let request = &event.request;
    extract_saml(
        &request.url,
        &request.method,
        post_body(request).as_deref(),
        acs_url,
    )
}

/// Concatenated POST body of an intercepted request
fn post_body(request: &CdpRequest) -> Option<String> {
    if !request.has_post_data.unwrap_or(false) {
        return None;
    }

    request.post_data_entries.as_ref().map(|entries| {
        entries
            .iter()
            .filter_map(|e| e.bytes.as_ref())
            .filter_map(|b| str::from_utf8(b.as_ref()).ok())
            .collect::<String>()
    })
}

/// SAMLResponse carried by a request to the ACS URL.
///
/// POST bodies are form-encoded, sometimes wrapped in base64 as a whole.
/// Some IdPs redirect with a GET instead, carrying it in the query.
fn extract_saml(url: &str, method: &str, body: Option<&str>, acs_url: &str) -> Option<String> {
    if !url.starts_with(acs_url) {
        return None;
    }

    match method {
        "POST" => body.and_then(|data| parse_saml_response(data).or_else(|| try_decode_and_parse(data))),
        "GET" => Url::parse(url)
            .ok()?
            .query()
            .and_then(parse_saml_response),
        _ => None,
    }
}

fn parse_saml_response(data: &str) -> Option<String> {
    form_urlencoded::parse(data.as_bytes())
        .find(|(k, _)| k == "SAMLResponse")
        .map(|(_, v)| v.to_string())
}

fn try_decode_and_parse(data: &str) -> Option<String> {
    general_purpose::STANDARD
        .decode(data)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .as_deref()
        .and_then(parse_saml_response)
}

fn response_body(body: &str, base64_encoded: bool) -> Option<String> {
    if !base64_encoded {
        return Some(body.to_string());
    }
    general_purpose::STANDARD
        .decode(body)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}
