// Shared transport configuration for the external HTTP process.
//
// Everything that shapes a curl invocation (TLS policy, timeouts, address
// family) lives here so the client only decides *what* to request.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::client::Method;

/// Media type for RESTCONF structured data.
pub const YANG_XML: &str = "application/yang-data+xml";

/// Slack added on top of `--max-time` before the runner kills curl itself.
const PROCESS_GRACE: Duration = Duration::from_secs(2);

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (management APIs ship self-signed certs).
    #[default]
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP process invocations.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// HTTP client executable.
    pub program: String,
    pub tls: TlsMode,
    /// `--connect-timeout`
    pub connect_timeout: Duration,
    /// `--max-time`; the API keeps connections open, so this fires routinely.
    pub max_time: Duration,
    /// Force IPv4 (`-4`); `localhost` may otherwise resolve to `::1` where
    /// the tunnel is not bound.
    pub force_ipv4: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            program: "curl".into(),
            tls: TlsMode::DangerAcceptInvalid,
            connect_timeout: Duration::from_secs(5),
            max_time: Duration::from_secs(10),
            force_ipv4: true,
        }
    }
}

/// One HTTP request, described independently of how it is executed.
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub method: Method,
    pub url: &'a Url,
    pub username: &'a str,
    pub password: &'a SecretString,
    pub body: Option<&'a [u8]>,
}

impl TransportConfig {
    /// Hard bound for the whole process, a little above `--max-time`.
    pub fn process_timeout(&self) -> Duration {
        self.max_time + PROCESS_GRACE
    }

    /// Build the argv for one request.
    ///
    /// `--fail-with-body` makes HTTP errors surface as exit 22 while still
    /// capturing the error document for diagnostics.
    pub fn build_argv(&self, request: &HttpRequest<'_>) -> Vec<String> {
        let mut argv = vec![self.program.clone(), "-s".into(), "-S".into()];

        if self.force_ipv4 {
            argv.push("-4".into());
        }

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                argv.push("--cacert".into());
                argv.push(path.display().to_string());
            }
            TlsMode::DangerAcceptInvalid => argv.push("-k".into()),
        }

        argv.extend([
            "--connect-timeout".into(),
            seconds_arg(self.connect_timeout),
            "--max-time".into(),
            seconds_arg(self.max_time),
            "--fail-with-body".into(),
            "-u".into(),
            format!("{}:{}", request.username, request.password.expose_secret()),
            "-H".into(),
            format!("Accept: {YANG_XML}"),
        ]);

        if request.method == Method::Post {
            argv.extend([
                "-X".into(),
                "POST".into(),
                "-H".into(),
                format!("Content-Type: {YANG_XML}"),
                "--data-binary".into(),
                request
                    .body
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default(),
            ]);
        }

        argv.push(request.url.to_string());
        argv
    }
}

/// Copy of `argv` safe to log: the `-u` credential's secret is masked.
pub fn redact_argv(argv: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(argv.len());
    let mut mask_next = false;
    for arg in argv {
        if mask_next {
            let user = arg.split_once(':').map_or(arg.as_str(), |(u, _)| u);
            out.push(format!("{user}:***"));
            mask_next = false;
        } else {
            mask_next = arg == "-u";
            out.push(arg.clone());
        }
    }
    out
}

fn seconds_arg(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        d.as_secs().to_string()
    } else {
        format!("{:.3}", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(url: &'a Url, password: &'a SecretString, method: Method) -> HttpRequest<'a> {
        HttpRequest {
            method,
            url,
            username: "admin",
            password,
            body: None,
        }
    }

    #[test]
    fn get_argv_forces_ipv4_and_relaxes_tls() {
        let url = Url::parse("https://localhost:8888/restconf/data").expect("url");
        let pw = SecretString::from("s3cret".to_string());
        let argv = TransportConfig::default().build_argv(&request(&url, &pw, Method::Get));

        assert_eq!(argv.first().map(String::as_str), Some("curl"));
        assert!(argv.contains(&"-4".to_string()));
        assert!(argv.contains(&"-k".to_string()));
        assert!(argv.contains(&"admin:s3cret".to_string()));
        assert!(!argv.contains(&"-X".to_string()));
        assert_eq!(argv.last(), Some(&url.to_string()));
    }

    #[test]
    fn post_argv_carries_content_type_and_empty_body() {
        let url = Url::parse("http://10.0.0.1:8080/x").expect("url");
        let pw = SecretString::from("pw".to_string());
        let argv = TransportConfig::default().build_argv(&request(&url, &pw, Method::Post));

        let ct = format!("Content-Type: {YANG_XML}");
        assert!(argv.contains(&ct));
        let data_idx = argv
            .iter()
            .position(|a| a == "--data-binary")
            .expect("data flag");
        assert_eq!(argv.get(data_idx + 1).map(String::as_str), Some(""));
    }

    #[test]
    fn custom_ca_replaces_insecure_flag() {
        let url = Url::parse("https://h:1/").expect("url");
        let pw = SecretString::from("pw".to_string());
        let cfg = TransportConfig {
            tls: TlsMode::CustomCa(PathBuf::from("/etc/ca.pem")),
            ..TransportConfig::default()
        };
        let argv = cfg.build_argv(&request(&url, &pw, Method::Get));
        assert!(!argv.contains(&"-k".to_string()));
        assert!(argv.contains(&"/etc/ca.pem".to_string()));
    }

    #[test]
    fn redaction_masks_only_the_secret() {
        let argv: Vec<String> = ["curl", "-u", "admin:hunter2", "https://h/"]
            .into_iter()
            .map(String::from)
            .collect();
        let redacted = redact_argv(&argv);
        assert_eq!(redacted.get(2).map(String::as_str), Some("admin:***"));
        assert!(!redacted.join(" ").contains("hunter2"));
    }

    #[test]
    fn fractional_timeouts_keep_millis() {
        assert_eq!(seconds_arg(Duration::from_secs(5)), "5");
        assert_eq!(seconds_arg(Duration::from_millis(1500)), "1.500");
    }
}
