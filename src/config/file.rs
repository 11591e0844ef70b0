//! Types and functions for parsing & validating patchbridge config files.
//!
//! Config is parsed in two steps, mirroring the rest of the crate's "Raw -> Validated"
//! idiom: [`RawConfig`] is the literal wire shape (deserialized with
//! `#[serde(deny_unknown_fields)]` so typos surface immediately), and [`Config`] is the
//! validated tree actually consumed by the rest of the program, built via `TryFrom`.

use std::{collections::BTreeMap, path::Path, path::PathBuf, time::Duration};

use error_stack::{Report, ResultExt};
use getset::{CopyGetters, Getters};
use regex::Regex;
use serde::Deserialize;

use crate::{
    ext::{
        error_stack::{DescribeContext, ErrorHelper, IntoContext},
        io,
        result::WrapOk,
        secrecy::ComparableSecretString,
    },
    router::RoutingTable,
};

/// The only config schema version this build of patchbridge understands.
pub const SUPPORTED_VERSION: u32 = 3;

/// Errors that are possibly surfaced parsing or validating a config file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The config file could not be read from disk.
    #[error("read config file")]
    Read,

    /// The config file's content could not be parsed as YAML matching the expected schema.
    #[error("parse config file")]
    Parse,

    /// The config declares a `version` other than [`SUPPORTED_VERSION`].
    #[error("unsupported config version: {0}")]
    UnsupportedConfigVersion(u32),

    /// The tag-to-branch routing table references a branch that isn't configured.
    #[error("tag-to-branch mapping references undefined branch '{0}'")]
    UndefinedBranch(String),

    /// A branch's `github_app_auth` block specified zero or both of `private_key` /
    /// `private_key_path`, instead of exactly one.
    #[error("branch '{0}': github_app_auth requires exactly one of private_key or private_key_path")]
    AmbiguousAppAuthKey(String),

    /// A branch specified neither `github_oauth_token` nor `github_app_auth`.
    #[error("branch '{0}': no code host credentials configured")]
    MissingCodeHostAuth(String),

    /// A `submitter_allowlist` entry was not a valid regular expression.
    #[error("invalid submitter_allowlist pattern: '{0}'")]
    InvalidAllowlistPattern(String),
}

/// Config values as parsed from disk, before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    version: u32,
    base_directory: PathBuf,
    patchwork: RawPatchwork,
    #[serde(default)]
    email: Option<RawEmail>,
    branches: serde_yaml::Mapping,
    tag_to_branch_mapping: serde_yaml::Mapping,
}

impl RawConfig {
    /// Parse config content read from disk.
    fn parse(content: &str) -> Result<Self, Report<Error>> {
        serde_yaml::from_str(content).context(Error::Parse)
    }
}

/// Load and validate the config file at the given path.
pub async fn load(path: &Path) -> Result<Config, Report<Error>> {
    let content = io::read_to_string(path)
        .await
        .change_context(Error::Read)
        .describe_lazy(|| format!("reading config file at '{}'", path.display()))?;
    let raw = RawConfig::parse(&content)?;
    Config::try_from(raw)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPatchwork {
    server: String,
    project: String,
    search_patterns: Vec<String>,
    #[serde(with = "humantime_serde")]
    lookback: Duration,
    #[serde(default)]
    api_username: Option<String>,
    #[serde(default)]
    api_token: Option<String>,
}

/// Validated configuration for the tracker client (C1).
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct PatchworkConfig {
    server: String,
    project: String,
    search_patterns: Vec<String>,
    lookback: Duration,
    api_username: Option<String>,
    api_token: Option<ComparableSecretString>,
}

impl PartialEq for PatchworkConfig {
    fn eq(&self, other: &Self) -> bool {
        self.server == other.server
            && self.project == other.project
            && self.search_patterns == other.search_patterns
            && self.lookback == other.lookback
            && self.api_username == other.api_username
    }
}
impl Eq for PatchworkConfig {}

impl From<RawPatchwork> for PatchworkConfig {
    fn from(raw: RawPatchwork) -> Self {
        Self {
            server: raw.server,
            project: raw.project,
            search_patterns: raw.search_patterns,
            lookback: raw.lookback,
            api_username: raw.api_username,
            api_token: raw.api_token.map(ComparableSecretString::from),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEmail {
    host: String,
    #[serde(default = "default_smtp_port")]
    port: u16,
    user: String,
    from: String,
    pass: String,
    #[serde(default)]
    to: Vec<String>,
    #[serde(default)]
    cc: Vec<String>,
    #[serde(default)]
    http_proxy: Option<String>,
    #[serde(default)]
    submitter_allowlist: Vec<String>,
    #[serde(default)]
    ignore_allowlist: bool,
}

fn default_smtp_port() -> u16 {
    465
}

/// Validated configuration for the email notifier (C7).
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct EmailConfig {
    #[getset(get = "pub")]
    host: String,
    #[getset(get_copy = "pub")]
    port: u16,
    #[getset(get = "pub")]
    user: String,
    #[getset(get = "pub")]
    from: String,
    #[getset(get = "pub")]
    pass: ComparableSecretString,
    #[getset(get = "pub")]
    to: Vec<String>,
    #[getset(get = "pub")]
    cc: Vec<String>,
    #[getset(get = "pub")]
    http_proxy: Option<String>,
    #[getset(get = "pub")]
    submitter_allowlist: Vec<Regex>,
    #[getset(get_copy = "pub")]
    ignore_allowlist: bool,
}

impl TryFrom<RawEmail> for EmailConfig {
    type Error = Report<Error>;

    fn try_from(raw: RawEmail) -> Result<Self, Self::Error> {
        let submitter_allowlist = raw
            .submitter_allowlist
            .iter()
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})$"))
                    .map_err(|_| Error::InvalidAllowlistPattern(pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            host: raw.host,
            port: raw.port,
            user: raw.user,
            from: raw.from,
            pass: ComparableSecretString::from(raw.pass),
            to: raw.to,
            cc: raw.cc,
            http_proxy: raw.http_proxy,
            submitter_allowlist,
            ignore_allowlist: raw.ignore_allowlist,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBranch {
    repo: String,
    upstream: String,
    #[serde(default = "default_upstream_branch")]
    upstream_branch: String,
    ci_repo: String,
    ci_branch: String,
    #[serde(default)]
    github_oauth_token: Option<String>,
    #[serde(default)]
    github_app_auth: Option<RawAppAuth>,
}

fn default_upstream_branch() -> String {
    "master".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAppAuth {
    app_id: u64,
    installation_id: u64,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    private_key_path: Option<PathBuf>,
}

/// The code host credential for one branch worker.
#[derive(Debug, Clone)]
pub enum CodeHostAuth {
    /// A plain OAuth bearer token.
    OAuth(ComparableSecretString),
    /// A GitHub App installation credential.
    App(AppAuth),
}

/// A GitHub App installation credential.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct AppAuth {
    #[getset(get_copy = "pub")]
    app_id: u64,
    #[getset(get_copy = "pub")]
    installation_id: u64,
    #[getset(get = "pub")]
    private_key: PrivateKey,
}

/// Where a GitHub App's private key material comes from.
#[derive(Debug, Clone)]
pub enum PrivateKey {
    /// The PEM content, inline in the config file.
    Inline(ComparableSecretString),
    /// A path to a PEM file on disk.
    Path(PathBuf),
}

/// Validated configuration for one `(downstream_repo, target_branch)` worker (C2).
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct BranchConfig {
    repo: String,
    upstream: String,
    upstream_branch: String,
    ci_repo: String,
    ci_branch: String,
    auth: CodeHostAuth,
}

impl BranchConfig {
    fn try_from_raw(name: &str, raw: RawBranch) -> Result<Self, Report<Error>> {
        let auth = match (raw.github_oauth_token, raw.github_app_auth) {
            (_, Some(app)) => {
                let private_key = match (app.private_key, app.private_key_path) {
                    (Some(key), None) => PrivateKey::Inline(ComparableSecretString::from(key)),
                    (None, Some(path)) => PrivateKey::Path(path),
                    _ => return Err(Error::AmbiguousAppAuthKey(name.to_string())).map_err(Report::new),
                };
                CodeHostAuth::App(AppAuth {
                    app_id: app.app_id,
                    installation_id: app.installation_id,
                    private_key,
                })
            }
            (Some(token), None) => CodeHostAuth::OAuth(ComparableSecretString::from(token)),
            (None, None) => {
                return Err(Error::MissingCodeHostAuth(name.to_string())).map_err(Report::new)
            }
        };

        Ok(Self {
            repo: raw.repo,
            upstream: raw.upstream,
            upstream_branch: raw.upstream_branch,
            ci_repo: raw.ci_repo,
            ci_branch: raw.ci_branch,
            auth,
        })
    }
}

/// The set of configured branch workers, keyed by target branch name, preserving the
/// order they were declared in the config file (workers are mirrored in this order
/// each cycle; see §4.5 step 3).
#[derive(Debug, Clone, Default)]
pub struct Branches {
    ordered: Vec<(String, BranchConfig)>,
}

impl Branches {
    /// Look up a branch's configuration by its target branch name.
    pub fn get(&self, name: &str) -> Option<&BranchConfig> {
        self.ordered.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Whether a branch with this name is configured.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate branches in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BranchConfig)> {
        self.ordered.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// The number of configured branches.
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Whether there are no configured branches.
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// Validated configuration values to use during the program runtime.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct Config {
    base_directory: PathBuf,
    patchwork: PatchworkConfig,
    email: Option<EmailConfig>,
    branches: Branches,
    routing: RoutingTable,
}

impl TryFrom<RawConfig> for Config {
    type Error = Report<Error>;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        if raw.version != SUPPORTED_VERSION {
            return Err(Error::UnsupportedConfigVersion(raw.version))
                .map_err(Report::new)
                .help("this build of patchbridge only understands config schema version 3");
        }

        let patchwork = PatchworkConfig::from(raw.patchwork);
        let email = raw.email.map(EmailConfig::try_from).transpose()?;

        let mut branches = Branches::default();
        for (key, value) in raw.branches {
            let name = yaml_key_to_string(&key).context(Error::Parse)?;
            let raw_branch: RawBranch =
                serde_yaml::from_value(value).context(Error::Parse)?;
            let branch = BranchConfig::try_from_raw(&name, raw_branch)?;
            branches.ordered.push((name, branch));
        }

        let routing = build_routing_table(raw.tag_to_branch_mapping)?;
        for branch in routing.all_referenced_branches() {
            if !branches.contains(branch) {
                return Err(Error::UndefinedBranch(branch.to_string())).map_err(Report::new);
            }
        }

        Ok(Self {
            base_directory: raw.base_directory,
            patchwork,
            email,
            branches,
            routing,
        })
    }
}

fn yaml_key_to_string(key: &serde_yaml::Value) -> Result<String, Report<serde_yaml::Error>> {
    key.as_str()
        .map(str::to_string)
        .ok_or_else(|| serde_yaml::from_str::<()>("!").unwrap_err())
        .map_err(Report::new)
}

fn build_routing_table(mapping: serde_yaml::Mapping) -> Result<RoutingTable, Report<Error>> {
    let mut entries = Vec::new();
    let mut default = Vec::new();
    for (key, value) in mapping {
        let key = yaml_key_to_string(&key).context(Error::Parse)?;
        let branches: Vec<String> = serde_yaml::from_value(value).context(Error::Parse)?;
        if key == crate::model::DEFAULT_BRANCH_KEY {
            default = branches;
        } else {
            entries.push((key, branches));
        }
    }
    RoutingTable::new(entries, default).wrap_ok()
}

/// Build a validated [`EmailConfig`] from a YAML fragment, for use by other modules'
/// tests (notably the notifier's).
#[cfg(test)]
pub(crate) fn test_email_config(yaml: &str) -> EmailConfig {
    let raw: RawEmail = serde_yaml::from_str(yaml).expect("parse test email config");
    EmailConfig::try_from(raw).expect("validate test email config")
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = indoc::indoc! {r#"
        version: 3
        base_directory: /var/lib/patchbridge
        patchwork:
          server: https://patchwork.example.com
          project: example-project
          search_patterns:
            - "[example]"
          lookback: 30d
        branches:
          bpf-next:
            repo: git@github.com:example/bpf-next.git
            upstream: https://git.kernel.org/bpf-next.git
            ci_repo: git@github.com:example/bpf-next-ci.git
            ci_branch: ci
            github_oauth_token: "token-1"
          bpf:
            repo: git@github.com:example/bpf.git
            upstream: https://git.kernel.org/bpf.git
            upstream_branch: main
            ci_repo: git@github.com:example/bpf-ci.git
            ci_branch: ci
            github_oauth_token: "token-2"
        tag_to_branch_mapping:
          bpf-next: [bpf-next]
          __DEFAULT__: [bpf]
    "#};

    #[test]
    fn parses_and_validates_minimal_config() {
        let raw = RawConfig::parse(EXAMPLE).expect("parse");
        let config = Config::try_from(raw).expect("validate");
        assert_eq!(config.branches().len(), 2);
        assert_eq!(config.patchwork().project(), "example-project");
        assert_eq!(config.patchwork().lookback(), &Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[test]
    fn rejects_unsupported_version() {
        let content = EXAMPLE.replacen("version: 3", "version: 1", 1);
        let raw = RawConfig::parse(&content).expect("parse");
        let err = Config::try_from(raw).expect_err("should reject");
        assert!(format!("{err:?}").contains("unsupported config version"));
    }

    #[test]
    fn rejects_undefined_routed_branch() {
        let content = EXAMPLE.replace("bpf-next: [bpf-next]", "bpf-next: [does-not-exist]");
        let raw = RawConfig::parse(&content).expect("parse");
        let err = Config::try_from(raw).expect_err("should reject");
        assert!(format!("{err:?}").contains("does-not-exist"));
    }

    #[test]
    fn rejects_ambiguous_app_auth() {
        let content = EXAMPLE.replace(
            "github_oauth_token: \"token-1\"",
            "github_app_auth:\n      app_id: 1\n      installation_id: 2",
        );
        let raw = RawConfig::parse(&content).expect("parse");
        let err = Config::try_from(raw).expect_err("should reject");
        assert!(format!("{err:?}").contains("github_app_auth"));
    }

    #[test]
    fn preserves_tag_iteration_order() {
        let content = EXAMPLE.replace(
            "tag_to_branch_mapping:\n  bpf-next: [bpf-next]\n  __DEFAULT__: [bpf]",
            "tag_to_branch_mapping:\n  z-tag: [bpf]\n  bpf-next: [bpf-next]\n  __DEFAULT__: [bpf]",
        );
        let raw = RawConfig::parse(&content).expect("parse");
        let config = Config::try_from(raw).expect("validate");
        let keys: Vec<_> = config
            .routing()
            .entries()
            .iter()
            .map(|(tag, _)| tag.as_str())
            .collect();
        assert_eq!(keys, vec!["z-tag", "bpf-next"]);
    }
}
