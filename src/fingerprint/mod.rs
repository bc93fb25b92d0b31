//! Browser fingerprints for upstream requests.
//!
//! The upstream expects traffic that looks like its own web client. Each
//! fingerprint bundles a user agent with header templates for the three
//! request scenarios the browser exhibits (`html` navigation, `xhr` API
//! calls, `js` resource fetches). A session is bound to one fingerprint for
//! its whole life so the upstream sees a consistent browser.

pub mod error;


pub use error::FingerprintError;

use parking_lot::RwLock;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Which header template a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Html,
    Xhr,
    Js,
}

/// Header templates per scenario.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeaderSets {
    #[serde(default)]
    pub html: HashMap<String, String>,
    #[serde(default)]
    pub xhr: HashMap<String, String>,
    #[serde(default)]
    pub js: HashMap<String, String>,
}

/// One consistent browser identity.
#[derive(Debug, Clone, Deserialize)]
pub struct Fingerprint {
    pub id: String,
    pub user_agent: String,
    #[serde(default)]
    pub headers: HeaderSets,
}

#[derive(Debug, Deserialize)]
struct FingerprintFile {
    #[serde(default)]
    #[allow(dead_code)]
    metadata: serde_json::Value,
    fingerprints: Vec<Fingerprint>,
}

/// Process-wide store with sticky session→fingerprint assignment.
pub struct FingerprintStore {
    fingerprints: Vec<Arc<Fingerprint>>,
    sessions: RwLock<HashMap<String, usize>>,
}

impl FingerprintStore {
    /// Loads the store from a JSON database file. Empty lists are rejected.
    pub fn load(path: &Path) -> Result<Self, FingerprintError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FingerprintError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let file: FingerprintFile =
            serde_json::from_str(&raw).map_err(|source| FingerprintError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let store = Self::from_fingerprints(file.fingerprints)?;
        info!(
            path = %path.display(),
            count = store.fingerprints.len(),
            "fingerprint database loaded"
        );
        Ok(store)
    }

    /// Builds a store from an in-memory fingerprint list.
    pub fn from_fingerprints(fingerprints: Vec<Fingerprint>) -> Result<Self, FingerprintError> {
        if fingerprints.is_empty() {
            return Err(FingerprintError::Empty);
        }

        Ok(Self {
            fingerprints: fingerprints.into_iter().map(Arc::new).collect(),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// The built-in fingerprint set used when no database file is configured.
    pub fn builtin() -> Self {
        Self::from_fingerprints(builtin_fingerprints())
            .expect("built-in fingerprint set is non-empty")
    }

    /// Returns the fingerprint bound to `session_id`, picking one uniformly
    /// at random on first sight. The assignment is sticky.
    pub fn for_session(&self, session_id: &str) -> Arc<Fingerprint> {
        if let Some(&index) = self.sessions.read().get(session_id) {
            return self.fingerprints[index].clone();
        }

        let mut sessions = self.sessions.write();
        // Double-check: another writer may have bound this session while we
        // waited for the write lock.
        let index = match sessions.get(session_id) {
            Some(&index) => index,
            None => {
                let index = rand::thread_rng().gen_range(0..self.fingerprints.len());
                sessions.insert(session_id.to_string(), index);
                index
            }
        };

        self.fingerprints[index].clone()
    }

    /// Returns an owned copy of the scenario's header template, with the
    /// fingerprint's user agent filled in. Callers may mutate the result
    /// freely.
    pub fn header_set(fingerprint: &Fingerprint, scenario: Scenario) -> HashMap<String, String> {
        let template = match scenario {
            Scenario::Html => &fingerprint.headers.html,
            Scenario::Xhr => &fingerprint.headers.xhr,
            Scenario::Js => &fingerprint.headers.js,
        };

        let mut headers = template.clone();
        headers
            .entry("User-Agent".to_string())
            .or_insert_with(|| fingerprint.user_agent.clone());
        headers
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.fingerprints.len()
    }
}

fn builtin_fingerprints() -> Vec<Fingerprint> {
    let chrome_ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
    let edge_ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                   (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0";
    let mac_ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

    let mk = |id: &str, ua: &str, ua_hint: &str, platform: &str| Fingerprint {
        id: id.to_string(),
        user_agent: ua.to_string(),
        headers: HeaderSets {
            html: HashMap::from([
                ("sec-ch-ua".to_string(), ua_hint.to_string()),
                ("sec-ch-ua-mobile".to_string(), "?0".to_string()),
                ("sec-ch-ua-platform".to_string(), platform.to_string()),
                ("sec-fetch-dest".to_string(), "document".to_string()),
                ("sec-fetch-mode".to_string(), "navigate".to_string()),
                ("sec-fetch-site".to_string(), "none".to_string()),
                ("upgrade-insecure-requests".to_string(), "1".to_string()),
            ]),
            xhr: HashMap::from([
                ("sec-ch-ua".to_string(), ua_hint.to_string()),
                ("sec-ch-ua-mobile".to_string(), "?0".to_string()),
                ("sec-ch-ua-platform".to_string(), platform.to_string()),
                ("sec-fetch-dest".to_string(), "empty".to_string()),
                ("sec-fetch-mode".to_string(), "cors".to_string()),
                ("sec-fetch-site".to_string(), "same-origin".to_string()),
                ("x-requested-with".to_string(), "XMLHttpRequest".to_string()),
            ]),
            js: HashMap::from([
                ("sec-ch-ua".to_string(), ua_hint.to_string()),
                ("sec-ch-ua-mobile".to_string(), "?0".to_string()),
                ("sec-ch-ua-platform".to_string(), platform.to_string()),
                ("sec-fetch-dest".to_string(), "script".to_string()),
                ("sec-fetch-mode".to_string(), "no-cors".to_string()),
                ("sec-fetch-site".to_string(), "same-origin".to_string()),
            ]),
        },
    };

    vec![
        mk(
            "chrome-131-win",
            chrome_ua,
            r#""Google Chrome";v="131", "Chromium";v="131", "Not_A Brand";v="24""#,
            r#""Windows""#,
        ),
        mk(
            "edge-131-win",
            edge_ua,
            r#""Microsoft Edge";v="131", "Chromium";v="131", "Not_A Brand";v="24""#,
            r#""Windows""#,
        ),
        mk(
            "chrome-131-mac",
            mac_ua,
            r#""Google Chrome";v="131", "Chromium";v="131", "Not_A Brand";v="24""#,
            r#""macOS""#,
        ),
    ]
}
