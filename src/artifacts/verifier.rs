//! Deterministic verification of claimed artifacts: a local file under
//! the artifacts root, or an allow-listed HTTPS fetch, checked against a
//! claimed SHA-256 under byte and time budgets.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::config::ProofPolicy;
use crate::domain::{ProofReason, contract::SHA256_RE};
use crate::utils::hex_lower;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub reason: ProofReason,
}

impl Verdict {
    fn verified() -> Self {
        Self {
            reason: ProofReason::None,
        }
    }

    fn rejected(reason: ProofReason) -> Self {
        Self { reason }
    }

    pub fn is_verified(&self) -> bool {
        self.reason == ProofReason::None
    }
}

pub async fn verify_claim(uri: &str, sha256: &str, policy: &ProofPolicy) -> Verdict {
    let is_file = uri.starts_with("file://");
    let is_https = uri.starts_with("https://");
    if !is_file && !is_https {
        return Verdict::rejected(ProofReason::InvalidUri);
    }
    if !SHA256_RE.is_match(sha256) {
        return Verdict::rejected(ProofReason::HashMismatch);
    }

    if is_file {
        verify_file(uri, sha256, policy).await
    } else {
        verify_https(uri, sha256, policy).await
    }
}

fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    if !rest.starts_with('/') {
        return None;
    }
    Some(PathBuf::from(rest))
}

async fn verify_file(uri: &str, expected: &str, policy: &ProofPolicy) -> Verdict {
    let Some(claimed_path) = file_uri_to_path(uri) else {
        return Verdict::rejected(ProofReason::InvalidUri);
    };

    // The artifacts root itself must be a real directory; a symlinked
    // root would make every containment check meaningless.
    let root_real = match resolve_artifacts_root(&policy.artifacts_dir).await {
        Ok(path) => path,
        Err(reason) => return Verdict::rejected(reason),
    };

    let link_meta = match fs::symlink_metadata(&claimed_path).await {
        Ok(meta) => meta,
        Err(_) => return Verdict::rejected(ProofReason::FileNotFound),
    };
    if link_meta.file_type().is_symlink() {
        return Verdict::rejected(ProofReason::FileOutsideArtifacts);
    }

    // Canonicalization resolves every intermediate symlink, so a link
    // inside the root that points outside it lands outside `root_real`
    // and is rejected here.
    let real_path = match fs::canonicalize(&claimed_path).await {
        Ok(path) => path,
        Err(_) => return Verdict::rejected(ProofReason::FileNotFound),
    };
    if !real_path.starts_with(&root_real) {
        return Verdict::rejected(ProofReason::FileOutsideArtifacts);
    }

    let meta = match fs::metadata(&real_path).await {
        Ok(meta) => meta,
        Err(_) => return Verdict::rejected(ProofReason::FileNotFound),
    };
    if !meta.is_file() {
        return Verdict::rejected(ProofReason::FileNotFound);
    }
    if meta.len() > policy.max_bytes {
        return Verdict::rejected(ProofReason::FileTooLarge);
    }

    let contents = match fs::read(&real_path).await {
        Ok(bytes) => bytes,
        Err(_) => return Verdict::rejected(ProofReason::FileNotFound),
    };
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    let computed = hex_lower(&hasher.finalize());
    if computed != expected {
        return Verdict::rejected(ProofReason::HashMismatch);
    }

    debug!(uri, "file proof verified");
    Verdict::verified()
}

async fn resolve_artifacts_root(artifacts_dir: &Path) -> Result<PathBuf, ProofReason> {
    let meta = fs::symlink_metadata(artifacts_dir)
        .await
        .map_err(|_| ProofReason::FileOutsideArtifacts)?;
    if meta.file_type().is_symlink() {
        return Err(ProofReason::FileOutsideArtifacts);
    }
    fs::canonicalize(artifacts_dir)
        .await
        .map_err(|_| ProofReason::FileOutsideArtifacts)
}

async fn verify_https(uri: &str, expected: &str, policy: &ProofPolicy) -> Verdict {
    let parsed = match reqwest::Url::parse(uri) {
        Ok(url) => url,
        Err(_) => return Verdict::rejected(ProofReason::InvalidUri),
    };
    let Some(host) = parsed.host_str() else {
        return Verdict::rejected(ProofReason::InvalidUri);
    };
    let host = host.to_lowercase();
    if !policy.https_allowlist.iter().any(|allowed| *allowed == host) {
        return Verdict::rejected(ProofReason::HostNotAllowed);
    }

    // Redirects are rejections, never transparently resolved: the policy
    // returns the 3xx response as-is and it is refused below.
    let client = match reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(policy.fetch_timeout)
        .build()
    {
        Ok(client) => client,
        Err(_) => return Verdict::rejected(ProofReason::NetworkError),
    };

    let mut response = match client.get(parsed).send().await {
        Ok(response) => response,
        Err(err) if err.is_timeout() => return Verdict::rejected(ProofReason::HttpTimeout),
        Err(_) => return Verdict::rejected(ProofReason::NetworkError),
    };

    if response.status().is_redirection() {
        return Verdict::rejected(ProofReason::HttpRedirect);
    }
    if response.status().as_u16() != 200 {
        return Verdict::rejected(ProofReason::HttpStatus);
    }
    if let Some(length) = response.content_length()
        && length > policy.max_bytes
    {
        return Verdict::rejected(ProofReason::HttpTooLarge);
    }

    // Stream and hash incrementally; abort the moment the byte budget is
    // exceeded so a misbehaving response cannot exhaust memory.
    let mut hasher = Sha256::new();
    let mut bytes_read: u64 = 0;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                bytes_read += chunk.len() as u64;
                if bytes_read > policy.max_bytes {
                    return Verdict::rejected(ProofReason::HttpTooLarge);
                }
                hasher.update(&chunk);
            }
            Ok(None) => break,
            Err(err) if err.is_timeout() => return Verdict::rejected(ProofReason::HttpTimeout),
            Err(_) => return Verdict::rejected(ProofReason::NetworkError),
        }
    }

    let computed = hex_lower(&hasher.finalize());
    if computed != expected {
        return Verdict::rejected(ProofReason::HashMismatch);
    }

    debug!(uri, "https proof verified");
    Verdict::verified()
}
