// Management-API client
//
// Builds one curl invocation per request, runs it through a `CommandRunner`,
// and classifies the exit status. The API holds connections open after the
// response is complete, so curl routinely hits `--max-time` with the whole
// document already on stdout; `classify` treats that as success.

use std::io;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use bytes::Bytes;
use regex::Regex;
use secrecy::SecretString;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, snippet};
use crate::model::{InventoryEntry, SyncStatus};
use crate::parse::{parse_device_list, parse_sync_status};
use crate::restconf;
use crate::runner::{CommandRunner, ProcessOutput};
use crate::transport::{HttpRequest, TransportConfig, redact_argv};

// curl exit codes we distinguish.
const CURL_COULDNT_CONNECT: i32 = 7;
const CURL_HTTP_RETURNED_ERROR: i32 = 22;
const CURL_OPERATION_TIMEDOUT: i32 = 28;

static HTTP_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"error:\s*(\d{3})").expect("valid status pattern"));

/// HTTP method used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

/// Where requests go and who makes them.
#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    /// Scheme, host, and port; for tunneled targets this is `localhost`.
    pub base_url: Url,
    pub username: String,
    pub password: SecretString,
}

impl ApiEndpoint {
    pub fn new(base_url: Url, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            base_url,
            username: username.into(),
            password,
        }
    }

    /// Resolve an absolute path (optionally with a query) against the base.
    pub fn url_for(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }
}

/// How a successful response was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// curl exited cleanly.
    Complete,
    /// curl hit `--max-time`, but only after output had been captured.
    ToleratedTimeout,
}

/// Raw response bytes plus how they arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub body: Bytes,
    pub delivery: Delivery,
}

/// Classify a finished curl process.
///
/// | exit | stdout    | outcome                         |
/// |------|-----------|---------------------------------|
/// | 0    | any       | `Complete`                      |
/// | 28   | non-empty | `ToleratedTimeout`              |
/// | 28   | empty     | [`Error::Timeout`]              |
/// | 7    | any       | [`Error::ConnectionRefused`]    |
/// | 22   | any       | [`Error::Http`] / `Authentication` |
/// | else | any       | [`Error::Process`]              |
pub fn classify(
    output: ProcessOutput,
    url: &Url,
    max_time: Duration,
) -> Result<ApiResponse, Error> {
    match output.code {
        Some(0) => Ok(ApiResponse {
            body: output.stdout,
            delivery: Delivery::Complete,
        }),
        Some(CURL_OPERATION_TIMEDOUT) if !output.stdout.is_empty() => Ok(ApiResponse {
            body: output.stdout,
            delivery: Delivery::ToleratedTimeout,
        }),
        Some(CURL_OPERATION_TIMEDOUT) => Err(Error::Timeout {
            timeout_secs: max_time.as_secs(),
        }),
        Some(CURL_COULDNT_CONNECT) => Err(Error::ConnectionRefused {
            url: url.to_string(),
        }),
        Some(CURL_HTTP_RETURNED_ERROR) => {
            let status = HTTP_STATUS
                .captures(&output.stderr)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u16>().ok());
            if status == Some(401) {
                return Err(Error::Authentication {
                    message: format!("credentials rejected by {url}"),
                });
            }
            let body = if output.stdout.is_empty() {
                output.stderr
            } else {
                snippet(&output.stdout)
            };
            Err(Error::Http {
                status,
                snippet: body,
            })
        }
        code => Err(Error::Process {
            code,
            stderr: output.stderr,
        }),
    }
}

/// Client for one management endpoint.
///
/// Cheap to clone: the runner is shared, so per-device workers each hold
/// their own handle.
pub struct ManagementClient<R> {
    endpoint: ApiEndpoint,
    transport: TransportConfig,
    runner: Arc<R>,
}

impl<R> Clone for ManagementClient<R> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            transport: self.transport.clone(),
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<R: CommandRunner> ManagementClient<R> {
    pub fn new(endpoint: ApiEndpoint, transport: TransportConfig, runner: Arc<R>) -> Self {
        Self {
            endpoint,
            transport,
            runner,
        }
    }

    pub fn endpoint(&self) -> &ApiEndpoint {
        &self.endpoint
    }

    /// Issue one request against `path` (relative to the endpoint base).
    pub async fn request(
        &self,
        path: &str,
        method: Method,
        body: Option<&[u8]>,
    ) -> Result<ApiResponse, Error> {
        let url = self.endpoint.url_for(path)?;
        self.send(&url, method, body).await
    }

    async fn send(
        &self,
        url: &Url,
        method: Method,
        body: Option<&[u8]>,
    ) -> Result<ApiResponse, Error> {
        let argv = self.transport.build_argv(&HttpRequest {
            method,
            url,
            username: &self.endpoint.username,
            password: &self.endpoint.password,
            body,
        });
        debug!(%method, %url, argv = ?redact_argv(&argv), "management API request");

        let output = match self.runner.run(&argv, self.transport.process_timeout()).await {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(Error::Timeout {
                    timeout_secs: self.transport.process_timeout().as_secs(),
                });
            }
            Err(e) => return Err(Error::Spawn(e)),
        };

        let response = classify(output, url, self.transport.max_time);
        match &response {
            Ok(r) if r.delivery == Delivery::ToleratedTimeout => {
                debug!(%url, bytes = r.body.len(), "timeout exit tolerated, body already received");
            }
            Ok(r) => debug!(%url, bytes = r.body.len(), "response received"),
            Err(e) => warn!(%url, error = %e, "management API request failed"),
        }
        response
    }

    /// Fetch the name-only device inventory.
    pub async fn fetch_inventory(&self) -> Result<Vec<InventoryEntry>, Error> {
        let response = self.request(restconf::INVENTORY_PATH, Method::Get, None).await?;
        parse_device_list(&response.body)
    }

    /// Run the `check-sync` action for one device.
    ///
    /// Transport and HTTP failures are errors; a response that cannot be
    /// classified is `Ok(SyncStatus::Error(..))`.
    pub async fn check_sync(&self, device: &str) -> Result<SyncStatus, Error> {
        let url = restconf::check_sync_url(&self.endpoint.base_url, device)?;
        let response = self.send(&url, Method::Post, None).await?;
        Ok(parse_sync_status(&response.body))
    }

    /// Verify the endpoint answers with an NSO device tree.
    pub async fn test_connection(&self) -> Result<(), Error> {
        let response = self.request(restconf::DEVICES_PATH, Method::Get, None).await?;
        if restconf::looks_like_device_tree(&response.body) {
            Ok(())
        } else {
            Err(Error::Parse {
                message: "response does not contain a devices tree".into(),
                snippet: snippet(&response.body),
            })
        }
    }
}
