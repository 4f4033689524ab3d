//! Remote fetch resource - an object from HTTP(S) or S3 stored on the host
//!
//! The object is fetched on every check; the host file is only written when
//! the fetched bytes differ from what is already there.

use super::attrs::FileAttrs;
use super::file::{converge_file, desired_file, observe_file};
use super::validate;
use declarative::{ApplyContext, ApplyResult, Error, Resource, ResourceState, Result};
use serde::Deserialize;
use std::time::Duration;

/// Upper bound for an object fetched over HTTP
const MAX_FETCH_SIZE: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteFetch {
    /// `http://`, `https://` or `s3://bucket/key`
    pub url: String,
    pub dest: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    /// Secret reference for the S3 access key id
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret reference for the S3 secret access key
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Secret reference: bearer token for HTTP, session token for S3
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Http,
    S3,
}

fn scheme(url: &str) -> Option<Scheme> {
    match url.split_once("://")?.0 {
        "http" | "https" => Some(Scheme::Http),
        "s3" => Some(Scheme::S3),
        _ => None,
    }
}

/// Host part of a URL, for connection errors
fn url_host(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or(rest)
}

fn resolve(ctx: &ApplyContext, reference: Option<&str>) -> Result<Option<String>> {
    reference.map(|r| ctx.secret(r)).transpose()
}

/// GET `url` from the controller
pub fn http_get(url: &str, bearer: Option<&str>, timeout: Option<Duration>) -> Result<Vec<u8>> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(timeout)
        .build()
        .into();

    let mut request = agent
        .get(url)
        .header("User-Agent", concat!("deckhand/", env!("CARGO_PKG_VERSION")));
    if let Some(token) = bearer {
        request = request.header("Authorization", &format!("Bearer {token}"));
    }

    let mut response = request.call().map_err(|e| fetch_error(url, timeout, e))?;
    response
        .body_mut()
        .with_config()
        .limit(MAX_FETCH_SIZE)
        .read_to_vec()
        .map_err(|e| fetch_error(url, timeout, e))
}

fn fetch_error(url: &str, timeout: Option<Duration>, err: ureq::Error) -> Error {
    match err {
        ureq::Error::StatusCode(code) => Error::apply(format!("GET {url}: HTTP {code}")),
        ureq::Error::Timeout(_) => Error::Timeout {
            operation: format!("GET {url}"),
            timeout: timeout.unwrap_or_default(),
        },
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed | ureq::Error::Io(_) => {
            Error::Connection {
                host: url_host(url).to_string(),
                message: err.to_string(),
            }
        }
        other => Error::apply(format!("GET {url}: {other}")),
    }
}

impl RemoteFetch {
    pub fn new(url: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            owner: None,
            group: None,
            mode: None,
            access_key_id: None,
            secret_access_key: None,
            token: None,
            region: None,
        }
    }

    fn attrs(&self) -> FileAttrs {
        FileAttrs::new(&self.owner, &self.group, &self.mode)
    }

    /// Fetch the object; credentials are resolved here and nowhere else
    fn fetch(&self, ctx: &ApplyContext) -> Result<Vec<u8>> {
        match scheme(&self.url) {
            Some(Scheme::Http) => {
                log::debug!("[{}] GET {}", ctx.host.host(), self.url);
                let token = resolve(ctx, self.token.as_deref())?;
                http_get(&self.url, token.as_deref(), ctx.timeout)
            }
            Some(Scheme::S3) => {
                let mut spec = ctx
                    .command("aws")
                    .args(["s3", "cp", "--only-show-errors", self.url.as_str(), "-"]);
                if let Some(region) = &self.region {
                    spec = spec.args(["--region", region.as_str()]);
                }
                let credentials = [
                    ("AWS_ACCESS_KEY_ID", &self.access_key_id),
                    ("AWS_SECRET_ACCESS_KEY", &self.secret_access_key),
                    ("AWS_SESSION_TOKEN", &self.token),
                ];
                for (name, reference) in credentials {
                    let Some(value) = resolve(ctx, reference.as_deref())? else {
                        continue;
                    };
                    if value.contains('\n') {
                        return Err(Error::apply(format!("{name} must be a single line")));
                    }
                    spec = spec.secret_env(name, value);
                }
                Ok(ctx.run(&spec)?.stdout)
            }
            None => Err(Error::apply(format!("unsupported URL {}", self.url))),
        }
    }
}

impl Resource for RemoteFetch {
    fn id(&self) -> String {
        self.dest.clone()
    }

    fn description(&self) -> String {
        format!("Fetch {} to {}", self.url, self.dest)
    }

    fn resource_type(&self) -> &'static str {
        "remote_fetch"
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match scheme(&self.url) {
            None => problems.push(format!(
                "url: '{}' must start with http://, https:// or s3://",
                self.url
            )),
            Some(Scheme::S3) => {
                let path = self.url.trim_start_matches("s3://");
                if !path.split_once('/').is_some_and(|(b, k)| !b.is_empty() && !k.is_empty()) {
                    problems.push("url: expected s3://bucket/key".to_string());
                }
            }
            Some(Scheme::Http) => {
                if self.access_key_id.is_some() || self.secret_access_key.is_some() {
                    problems.push("access_key_id: only used with s3:// URLs".to_string());
                }
            }
        }
        validate::absolute_path(&mut problems, "dest", &self.dest);
        FileAttrs::validate(&mut problems, &self.owner, &self.group, &self.mode);
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            problems.push("secret_access_key: must be given together with access_key_id".to_string());
        }
        validate::secret_ref(&mut problems, "access_key_id", self.access_key_id.as_deref());
        validate::secret_ref(&mut problems, "secret_access_key", self.secret_access_key.as_deref());
        validate::secret_ref(&mut problems, "token", self.token.as_deref());
        problems
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        observe_file(ctx, &self.dest, &self.attrs())
    }

    fn desired_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(desired_file(&self.fetch(ctx)?, &self.attrs()))
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let content = self.fetch(ctx)?;
        converge_file(ctx, &self.dest, &content, &self.attrs())
    }
}
