// Recognizing our own tunnel processes from their argument vector.
//
// Pure functions only, so ownership decisions are testable without spawning
// anything.

use std::fmt;

/// The local forward a tunnel process must carry:
/// `local_port:remote_host:remote_port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForwardSpec {
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl fmt::Display for ForwardSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.remote_host.contains(':') {
            write!(f, "{}:[{}]:{}", self.local_port, self.remote_host, self.remote_port)
        } else {
            write!(f, "{}:{}:{}", self.local_port, self.remote_host, self.remote_port)
        }
    }
}

impl ForwardSpec {
    /// Parse a `-L` argument: `[bind_address:]port:host:hostport`, with
    /// IPv6 addresses in brackets or `/`-separated.
    pub fn parse(arg: &str) -> Option<Self> {
        let parts = split_forward(arg)?;
        let [local, host, remote] = match parts.as_slice() {
            [_, local, host, remote] | [local, host, remote] => [*local, *host, *remote],
            _ => return None,
        };
        Some(Self {
            local_port: local.parse().ok()?,
            remote_host: host.trim_start_matches('[').trim_end_matches(']').to_owned(),
            remote_port: remote.parse().ok()?,
        })
    }
}

/// Split on `:` outside of `[...]`, or on `/` when the spec uses the
/// alternative syntax.
fn split_forward(arg: &str) -> Option<Vec<&str>> {
    if arg.contains('/') && !arg.contains('[') {
        return Some(arg.split('/').collect());
    }
    let mut parts = Vec::new();
    let mut depth = 0_i32;
    let mut start = 0;
    for (i, c) in arg.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ':' if depth == 0 => {
                parts.push(arg.get(start..i)?);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(arg.get(start..)?);
    Some(parts)
}

/// Whether `argv[0]` is an OpenSSH client. Both `/` and `\` count as path
/// separators whatever the host platform.
pub fn is_ssh(argv: &[String]) -> bool {
    argv.first()
        .and_then(|a| a.rsplit(['/', '\\']).next())
        .is_some_and(|n| n.eq_ignore_ascii_case("ssh") || n.eq_ignore_ascii_case("ssh.exe"))
}

/// Every `-L` forward present in `argv`, in either `-L spec` or `-Lspec` form.
pub fn local_forwards(argv: &[String]) -> Vec<ForwardSpec> {
    let mut forwards = Vec::new();
    let mut args = argv.iter().skip(1);
    while let Some(arg) = args.next() {
        let spec = if arg == "-L" {
            args.next().map(String::as_str)
        } else {
            arg.strip_prefix("-L")
        };
        if let Some(forward) = spec.and_then(ForwardSpec::parse) {
            forwards.push(forward);
        }
    }
    forwards
}

/// `argv` is an ssh process forwarding exactly the expected spec.
pub fn matches(argv: &[String], expected: &ForwardSpec) -> bool {
    is_ssh(argv) && local_forwards(argv).iter().any(|f| f == expected)
}

/// `argv` is an ssh process forwarding `port` to anywhere.
pub fn forwards_port(argv: &[String], port: u16) -> bool {
    is_ssh(argv) && local_forwards(argv).iter().any(|f| f.local_port == port)
}
