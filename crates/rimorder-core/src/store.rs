use std::collections::{BTreeMap, BTreeSet};
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tracing::{debug, info, warn};
use url::Url;

use crate::canonical_id;

/// RimSort community rules database, raw document.
pub const DEFAULT_RULES_URL: &str =
    "https://raw.githubusercontent.com/RimSort/Community-Rules-Database/main/communityRules.json";

/// A cached document older than this is considered stale.
pub const CACHE_EXPIRY_SECS: u64 = 24 * 60 * 60;

const CACHE_FILE: &str = "communityRules.json";
const META_FILE: &str = "communityRules_meta.json";
const USER_AGENT: &str = "rimorder/0.1";

/// Sorting rules for a single mod, all target ids canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
    /// Ids this mod must precede.
    pub load_before: BTreeSet<String>,
    /// Ids that must precede this mod.
    pub load_after: BTreeSet<String>,
    pub incompatible_with: BTreeSet<String>,
    pub load_top: bool,
    pub load_bottom: bool,
}

/// One immutable snapshot of the community rules database.
///
/// Replacement is whole-snapshot: a caller holding an `Arc<RulesDb>` keeps a
/// consistent view even while the owning store refreshes.
#[derive(Debug, Default)]
pub struct RulesDb {
    /// Timestamp claimed by the document itself.
    pub timestamp: u64,
    pub rules: BTreeMap<String, Rule>,
    /// Epoch seconds of the refresh that produced this snapshot.
    pub last_updated: u64,
    pub source_url: String,
}

impl RulesDb {
    pub fn rule(&self, package_id: &str) -> Option<&Rule> {
        self.rules.get(&canonical_id(package_id))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheMeta {
    #[serde(default)]
    last_updated: u64,
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    rule_count: usize,
    #[serde(default)]
    sha256: String,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub loaded: bool,
    pub rule_count: usize,
    pub timestamp: u64,
    pub last_updated: u64,
    pub source_url: String,
}

/// Owns the on-disk cache and the in-memory snapshot of the community rules.
#[derive(Debug)]
pub struct RuleStore {
    cache_dir: PathBuf,
    source_url: String,
    db: Option<Arc<RulesDb>>,
}

impl RuleStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_source(cache_dir, DEFAULT_RULES_URL)
    }

    pub fn with_source(cache_dir: impl Into<PathBuf>, source_url: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            source_url: source_url.into(),
            db: None,
        }
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join(CACHE_FILE)
    }

    pub fn meta_file(&self) -> PathBuf {
        self.cache_dir.join(META_FILE)
    }

    pub fn is_loaded(&self) -> bool {
        self.db.as_ref().is_some_and(|db| !db.is_empty())
    }

    pub fn rule_count(&self) -> usize {
        self.db.as_ref().map_or(0, |db| db.len())
    }

    /// The snapshot handed to resolution and audit calls. Cheap to clone;
    /// unaffected by later refreshes of this store.
    pub fn snapshot(&self) -> Option<Arc<RulesDb>> {
        self.db.clone()
    }

    pub fn get_rule(&self, package_id: &str) -> Option<Rule> {
        self.db.as_ref().and_then(|db| db.rule(package_id).cloned())
    }

    /// Install a snapshot from the cache file.
    ///
    /// `Ok(false)` means no cache exists. A cache that is unreadable, fails
    /// its recorded digest or does not parse is an error; the file is left
    /// on disk for diagnosis and the in-memory snapshot is untouched.
    pub fn load_from_cache(&mut self) -> Result<bool> {
        let cache_file = self.cache_file();
        let bytes = match std::fs::read(&cache_file) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", cache_file.display()))
            }
        };

        let meta = self.read_meta().unwrap_or_default();
        if !meta.sha256.is_empty() {
            let actual = sha256_hex(&bytes);
            if actual != meta.sha256 {
                bail!(
                    "rules cache digest mismatch for {}: expected {} got {actual}",
                    cache_file.display(),
                    meta.sha256
                );
            }
        }

        let (timestamp, rules) =
            parse_rules(&bytes).with_context(|| format!("parse {}", cache_file.display()))?;
        let db = RulesDb {
            timestamp,
            rules,
            last_updated: meta.last_updated,
            source_url: meta.source_url,
        };
        info!(rule_count = db.len(), "loaded community rules from cache");
        self.db = Some(Arc::new(db));
        Ok(true)
    }

    /// Whether the cached document is present and fresher than
    /// [`CACHE_EXPIRY_SECS`].
    pub fn is_cache_valid(&self) -> bool {
        if !self.cache_file().is_file() {
            return false;
        }
        match self.read_meta() {
            Some(meta) => meta_is_fresh(&meta, epoch_now()),
            None => false,
        }
    }

    /// Fetch the document from the source, parse it, then atomically replace
    /// both the in-memory snapshot and the on-disk cache. Any fetch or parse
    /// failure leaves memory and disk exactly as they were.
    pub fn download(&mut self, timeout: Duration) -> Result<usize> {
        let bytes = fetch_document(&self.source_url, timeout)?;
        let (timestamp, rules) = parse_rules(&bytes)
            .with_context(|| format!("parse rules document from {}", self.source_url))?;

        let now = epoch_now();
        let db = RulesDb {
            timestamp,
            rules,
            last_updated: now,
            source_url: self.source_url.clone(),
        };
        let rule_count = db.len();
        self.db = Some(Arc::new(db));

        // Cache write failure is not a download failure: memory stays
        // authoritative for the rest of the process.
        if let Err(err) = self.save_cache(&bytes, now, rule_count) {
            warn!("failed to save rules cache: {err:#}");
        }
        info!(rule_count, source = %self.source_url, "downloaded community rules");
        Ok(rule_count)
    }

    /// Caller policy: cache first, then an opportunistic refresh when stale.
    /// Every failure degrades to "fewer rules applied"; nothing propagates.
    pub fn ensure_loaded(&mut self, timeout: Duration) {
        match self.load_from_cache() {
            Ok(true) => {}
            Ok(false) => debug!("no community rules cache present"),
            Err(err) => warn!("ignoring unreadable rules cache: {err:#}"),
        }
        if self.is_loaded() && self.is_cache_valid() {
            return;
        }
        if let Err(err) = self.download(timeout) {
            warn!("community rules refresh failed: {err:#}");
        }
    }

    pub fn stats(&self) -> StoreStats {
        match self.db.as_ref() {
            Some(db) => StoreStats {
                loaded: !db.is_empty(),
                rule_count: db.len(),
                timestamp: db.timestamp,
                last_updated: db.last_updated,
                source_url: db.source_url.clone(),
            },
            None => StoreStats {
                loaded: false,
                rule_count: 0,
                timestamp: 0,
                last_updated: 0,
                source_url: self.source_url.clone(),
            },
        }
    }

    fn read_meta(&self) -> Option<CacheMeta> {
        let bytes = std::fs::read(self.meta_file()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn save_cache(&self, bytes: &[u8], last_updated: u64, rule_count: usize) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("create_dir_all {}", self.cache_dir.display()))?;

        let cache_file = self.cache_file();
        let tmp = cache_file.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
        rename_overwrite_file(&tmp, &cache_file)?;

        let meta = CacheMeta {
            last_updated,
            source_url: self.source_url.clone(),
            rule_count,
            sha256: sha256_hex(bytes),
        };
        let mut rendered = serde_json::to_vec_pretty(&meta)?;
        rendered.push(b'\n');
        let meta_file = self.meta_file();
        let tmp = meta_file.with_extension("json.tmp");
        std::fs::write(&tmp, &rendered).with_context(|| format!("write {}", tmp.display()))?;
        rename_overwrite_file(&tmp, &meta_file)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct WireDoc {
    #[serde(default)]
    timestamp: u64,
    #[serde(default)]
    rules: BTreeMap<String, WireRule>,
}

#[derive(Debug, Deserialize)]
struct WireRule {
    #[serde(default, rename = "loadBefore")]
    load_before: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "loadAfter")]
    load_after: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "incompatibleWith")]
    incompatible_with: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "loadTop")]
    load_top: serde_json::Value,
    #[serde(default, rename = "loadBottom")]
    load_bottom: serde_json::Value,
}

/// Flags ship as `{"value": true}`; anything else (absent, non-object,
/// non-true) reads as unset.
fn flag_is_set(value: &serde_json::Value) -> bool {
    matches!(value.get("value"), Some(serde_json::Value::Bool(true)))
}

fn parse_rules(bytes: &[u8]) -> Result<(u64, BTreeMap<String, Rule>)> {
    let doc: WireDoc =
        serde_json::from_slice(bytes).context("parse community rules document")?;
    let mut rules = BTreeMap::new();
    for (package_id, wire) in doc.rules {
        let mut rule = Rule::default();
        for target in wire.load_before.keys() {
            rule.load_before.insert(canonical_id(target));
        }
        for target in wire.load_after.keys() {
            rule.load_after.insert(canonical_id(target));
        }
        for target in wire.incompatible_with.keys() {
            rule.incompatible_with.insert(canonical_id(target));
        }
        rule.load_top = flag_is_set(&wire.load_top);
        rule.load_bottom = flag_is_set(&wire.load_bottom);
        rules.insert(canonical_id(&package_id), rule);
    }
    Ok((doc.timestamp, rules))
}

fn fetch_document(source_url: &str, timeout: Duration) -> Result<Vec<u8>> {
    let url =
        Url::parse(source_url).with_context(|| format!("invalid rules url: {source_url:?}"))?;
    match url.scheme() {
        "file" => {
            let path = url.to_file_path().map_err(|_| {
                anyhow::anyhow!("file url could not be converted to a path: {:?}", url)
            })?;
            std::fs::read(&path).with_context(|| format!("read {}", path.display()))
        }
        "http" | "https" => {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build()
                .into();
            let resp = agent
                .get(url.as_str())
                .header("User-Agent", USER_AGENT)
                .header("Accept", "application/json")
                .call()
                .map_err(|e| anyhow::anyhow!("http GET {}: {e}", url))?;
            let mut reader = resp.into_body().into_reader();
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).context("read http response")?;
            Ok(buf)
        }
        other => bail!("unsupported url scheme {other:?} for {}", url.as_str()),
    }
}

fn meta_is_fresh(meta: &CacheMeta, now: u64) -> bool {
    now.saturating_sub(meta.last_updated) < CACHE_EXPIRY_SECS
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    let digest = h.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn rename_overwrite_file(src: &Path, dst: &Path) -> Result<()> {
    if dst.exists() && dst.is_dir() {
        bail!("refusing to overwrite directory: {}", dst.display());
    }
    #[cfg(windows)]
    {
        if dst.exists() {
            std::fs::remove_file(dst).with_context(|| format!("remove {}", dst.display()))?;
        }
    }
    std::fs::rename(src, dst)
        .with_context(|| format!("rename {} -> {}", src.display(), dst.display()))?;
    Ok(())
}
