//! File-system backed store of the query workloads replayed against an
//! OpenSearch cluster.
//!
//! The store is a directory tree of static, curated query files:
//!
//! ```text
//! workloads/
//!   ppl/<log_type>/*.ppl    one pipeline query per file
//!   dsl/<log_type>/*.json   one search request body per file
//! ```
//!
//! [`QueryStore::load`] scans the tree for a [`Selection`] (log types plus
//! query languages) and produces a [`QuerySet`]: a non-empty, name-ordered,
//! immutable sequence of [`Query`] values that the load driver picks from
//! uniformly at random. Loading is strict: an empty selection, a duplicate
//! query name, or a pipeline file that does not start with the `source`
//! keyword all fail instead of being silently dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod path;

/// Leading keyword every piped-processing-language query must start with.
pub const PPL_SOURCE_KEYWORD: &str = "source";

/// Path of the cluster's PPL endpoint.
pub const PPL_ENDPOINT: &str = "/_plugins/_ppl";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown log type {0:?}, expected one of vpc, nfw, cloudtrail, waf, big5, all")]
    UnknownLogType(String),

    #[error("unknown query language {0:?}, expected one of ppl, dsl, both")]
    UnknownQueryLanguage(String),

    #[error("could not locate a query store at {0:?}")]
    StoreNotFound(PathBuf),

    #[error("no queries found under {root:?} for log type {log_types} and language {languages}")]
    NoQueriesFound {
        root: PathBuf,
        log_types: LogTypeSelector,
        languages: LanguageSelector,
    },

    #[error("duplicate query name {name:?}: {first:?} and {second:?}")]
    DuplicateQueryName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{path:?}: PPL queries must begin with the {PPL_SOURCE_KEYWORD:?} keyword")]
    MalformedQuery { path: PathBuf },

    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path:?}: invalid JSON query body")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A category of ingested AWS log data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// VPC Flow Logs.
    Vpc,
    /// Network Firewall logs.
    Nfw,
    /// CloudTrail audit logs.
    Cloudtrail,
    /// WAF request logs.
    Waf,
    /// The Big5 reference corpus.
    Big5,
}

impl LogType {
    pub const ALL: [LogType; 5] = [
        LogType::Vpc,
        LogType::Nfw,
        LogType::Cloudtrail,
        LogType::Waf,
        LogType::Big5,
    ];

    /// Subdirectory name inside the store, also the name prefix of every
    /// query of this log type.
    pub fn dir_name(&self) -> &'static str {
        match self {
            LogType::Vpc => "vpc",
            LogType::Nfw => "nfw",
            LogType::Cloudtrail => "cloudtrail",
            LogType::Waf => "waf",
            LogType::Big5 => "big5",
        }
    }

    /// Default index the log type's documents live in.
    pub fn index_name(&self) -> &'static str {
        match self {
            LogType::Vpc => "vpc_flow_logs",
            LogType::Nfw => "network_firewall_logs",
            LogType::Cloudtrail => "cloudtrail_logs",
            LogType::Waf => "waf_logs",
            LogType::Big5 => "big5",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for LogType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vpc" => Ok(LogType::Vpc),
            "nfw" | "networkfirewall" => Ok(LogType::Nfw),
            "cloudtrail" => Ok(LogType::Cloudtrail),
            "waf" => Ok(LogType::Waf),
            "big5" => Ok(LogType::Big5),
            other => Err(StoreError::UnknownLogType(other.to_owned())),
        }
    }
}

/// One log type, or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogTypeSelector {
    All,
    One(LogType),
}

impl LogTypeSelector {
    pub fn log_types(&self) -> Vec<LogType> {
        match self {
            LogTypeSelector::All => LogType::ALL.to_vec(),
            LogTypeSelector::One(t) => vec![*t],
        }
    }
}

impl fmt::Display for LogTypeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTypeSelector::All => f.write_str("all"),
            LogTypeSelector::One(t) => fmt::Display::fmt(t, f),
        }
    }
}

impl FromStr for LogTypeSelector {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(LogTypeSelector::All)
        } else {
            Ok(LogTypeSelector::One(s.parse()?))
        }
    }
}

/// The two query flavors the cluster accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum QueryLanguage {
    /// Piped Processing Language, sent to the PPL plugin endpoint.
    Ppl,
    /// The native JSON query DSL, sent to a per-index search endpoint.
    Dsl,
}

impl QueryLanguage {
    /// Subdirectory name inside the store.
    pub fn dir_name(&self) -> &'static str {
        match self {
            QueryLanguage::Ppl => "ppl",
            QueryLanguage::Dsl => "dsl",
        }
    }

    fn file_extension(&self) -> &'static str {
        match self {
            QueryLanguage::Ppl => "ppl",
            QueryLanguage::Dsl => "json",
        }
    }
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for QueryLanguage {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ppl" => Ok(QueryLanguage::Ppl),
            "dsl" => Ok(QueryLanguage::Dsl),
            other => Err(StoreError::UnknownQueryLanguage(other.to_owned())),
        }
    }
}

/// One query language, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguageSelector {
    Both,
    One(QueryLanguage),
}

impl LanguageSelector {
    pub fn languages(&self) -> Vec<QueryLanguage> {
        match self {
            LanguageSelector::Both => vec![QueryLanguage::Ppl, QueryLanguage::Dsl],
            LanguageSelector::One(l) => vec![*l],
        }
    }
}

impl fmt::Display for LanguageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageSelector::Both => f.write_str("both"),
            LanguageSelector::One(l) => fmt::Display::fmt(l, f),
        }
    }
}

impl FromStr for LanguageSelector {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("both") {
            Ok(LanguageSelector::Both)
        } else {
            Ok(LanguageSelector::One(s.parse()?))
        }
    }
}

/// Which slice of the store to load. Built once at startup from the
/// environment/CLI and passed by reference from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub log_types: LogTypeSelector,
    pub languages: LanguageSelector,
}

impl Selection {
    pub fn new(log_types: LogTypeSelector, languages: LanguageSelector) -> Self {
        Self {
            log_types,
            languages,
        }
    }
}

/// The body of a loaded query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryBody {
    /// Raw pipeline text, e.g. `source=waf_logs | stats count()`.
    Ppl(String),
    /// A parsed JSON search request body.
    Dsl(serde_json::Value),
}

/// A single immutable query loaded from the store, identified by
/// `<log_type>/<file_stem>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    name: String,
    log_type: LogType,
    language: QueryLanguage,
    body: QueryBody,
}

impl Query {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_type(&self) -> LogType {
        self.log_type
    }

    pub fn language(&self) -> QueryLanguage {
        self.language
    }

    pub fn body(&self) -> &QueryBody {
        &self.body
    }

    /// The endpoint path the query must be POSTed to. PPL queries all share
    /// the plugin endpoint; DSL queries go to the search endpoint of their
    /// log type's index unless an override is given.
    pub fn endpoint_path(&self, index_override: Option<&str>) -> String {
        match self.language {
            QueryLanguage::Ppl => PPL_ENDPOINT.to_owned(),
            QueryLanguage::Dsl => {
                let index = index_override.unwrap_or_else(|| self.log_type.index_name());
                format!("/{index}/_search")
            }
        }
    }

    /// The JSON request body to send: a `{"query": …}` envelope for PPL, the
    /// stored body as-is for DSL.
    pub fn request_body(&self) -> serde_json::Value {
        match &self.body {
            QueryBody::Ppl(text) => serde_json::json!({ "query": text }),
            QueryBody::Dsl(body) => body.clone(),
        }
    }

    /// The query source as a single line of text, for exports.
    pub fn display_text(&self) -> String {
        match &self.body {
            QueryBody::Ppl(text) => text.clone(),
            QueryBody::Dsl(body) => body.to_string(),
        }
    }
}

/// A non-empty, name-ordered set of loaded queries.
#[derive(Debug, Clone)]
pub struct QuerySet {
    queries: Vec<Query>,
}

impl QuerySet {
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Query> {
        self.queries.iter()
    }

    /// Picks one query uniformly at random.
    pub fn pick(&self, rng: &mut impl Rng) -> (usize, &Query) {
        let idx = rng.gen_range(0..self.queries.len());
        (idx, &self.queries[idx])
    }

    pub fn get(&self, name: &str) -> Option<&Query> {
        self.queries
            .binary_search_by(|q| q.name().cmp(name))
            .ok()
            .map(|idx| &self.queries[idx])
    }
}

/// Handle to a query store root on disk.
#[derive(Debug, Clone)]
pub struct QueryStore {
    root: PathBuf,
}

impl QueryStore {
    /// Resolves `root` (see [`path::store_path`]) and verifies it exists.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path::store_path(root.as_ref())?;
        if !root.is_dir() {
            return Err(StoreError::StoreNotFound(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads every query matching `selection`.
    ///
    /// Names must be unique across the whole selection; the first colliding
    /// pair of files is reported. A selection matching no files at all is a
    /// configuration error, never an empty set.
    pub fn load(&self, selection: &Selection) -> Result<QuerySet, StoreError> {
        let mut loaded: BTreeMap<String, (Query, PathBuf)> = BTreeMap::new();

        for language in selection.languages.languages() {
            for log_type in selection.log_types.log_types() {
                let dir = self
                    .root
                    .join(language.dir_name())
                    .join(log_type.dir_name());
                if !dir.is_dir() {
                    continue;
                }

                for path in query_files(&dir, language.file_extension())? {
                    let query = read_query(&path, log_type, language)?;
                    if let Some((_, first)) = loaded.get(query.name()) {
                        return Err(StoreError::DuplicateQueryName {
                            name: query.name().to_owned(),
                            first: first.clone(),
                            second: path,
                        });
                    }
                    loaded.insert(query.name().to_owned(), (query, path));
                }
            }
        }

        if loaded.is_empty() {
            return Err(StoreError::NoQueriesFound {
                root: self.root.clone(),
                log_types: selection.log_types,
                languages: selection.languages,
            });
        }

        Ok(QuerySet {
            queries: loaded.into_values().map(|(query, _)| query).collect(),
        })
    }
}

fn query_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, StoreError> {
    let entries = fs::read_dir(dir).map_err(|source| StoreError::Io {
        path: dir.to_owned(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn read_query(path: &Path, log_type: LogType, language: QueryLanguage) -> Result<Query, StoreError> {
    let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_owned(),
        source,
    })?;

    let body = match language {
        QueryLanguage::Ppl => {
            let text = raw.trim().to_owned();
            if !text.starts_with(PPL_SOURCE_KEYWORD) {
                return Err(StoreError::MalformedQuery {
                    path: path.to_owned(),
                });
            }
            QueryBody::Ppl(text)
        }
        QueryLanguage::Dsl => {
            QueryBody::Dsl(serde_json::from_str(&raw).map_err(|source| StoreError::Json {
                path: path.to_owned(),
                source,
            })?)
        }
    };

    let stem = path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();

    Ok(Query {
        name: format!("{}/{}", log_type.dir_name(), stem),
        log_type,
        language,
        body,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use temp_dir::TempDir;

    use super::*;

    fn store() -> QueryStore {
        QueryStore::open("workloads").unwrap()
    }

    fn ppl(log_types: LogTypeSelector) -> Selection {
        Selection::new(log_types, LanguageSelector::One(QueryLanguage::Ppl))
    }

    #[test]
    fn documented_ppl_counts() {
        let store = store();
        for (log_type, expected) in [
            (LogType::Vpc, 15),
            (LogType::Nfw, 37),
            (LogType::Cloudtrail, 16),
            (LogType::Waf, 9),
        ] {
            let set = store.load(&ppl(LogTypeSelector::One(log_type))).unwrap();
            assert_eq!(set.len(), expected, "log type {log_type}");
        }

        let all = store.load(&ppl(LogTypeSelector::All)).unwrap();
        assert_eq!(all.len(), 77);
    }

    #[test]
    fn queries_are_name_ordered_and_unique() {
        let set = store()
            .load(&Selection::new(LogTypeSelector::All, LanguageSelector::Both))
            .unwrap();
        let names: Vec<_> = set.iter().map(Query::name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[test]
    fn unknown_log_type_is_rejected() {
        let err = "cloudwatch".parse::<LogTypeSelector>().unwrap_err();
        assert!(matches!(err, StoreError::UnknownLogType(_)));
    }

    #[test]
    fn unknown_language_is_rejected() {
        let err = "sql".parse::<LanguageSelector>().unwrap_err();
        assert!(matches!(err, StoreError::UnknownQueryLanguage(_)));
    }

    #[test]
    fn empty_selection_is_an_error() {
        // No DSL workloads exist for VPC.
        let err = store()
            .load(&Selection::new(
                LogTypeSelector::One(LogType::Vpc),
                LanguageSelector::One(QueryLanguage::Dsl),
            ))
            .unwrap_err();
        assert!(matches!(err, StoreError::NoQueriesFound { .. }));
    }

    #[test]
    fn ppl_queries_must_start_with_source_keyword() {
        let dir = TempDir::new().unwrap();
        let ppl_dir = dir.path().join("ppl").join("vpc");
        fs::create_dir_all(&ppl_dir).unwrap();
        fs::write(ppl_dir.join("bad.ppl"), "search index=vpc_flow_logs").unwrap();

        let err = QueryStore::open(dir.path())
            .unwrap()
            .load(&ppl(LogTypeSelector::One(LogType::Vpc)))
            .unwrap_err();
        assert!(matches!(err, StoreError::MalformedQuery { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let ppl_dir = dir.path().join("ppl").join("waf");
        let dsl_dir = dir.path().join("dsl").join("waf");
        fs::create_dir_all(&ppl_dir).unwrap();
        fs::create_dir_all(&dsl_dir).unwrap();
        fs::write(ppl_dir.join("01_count.ppl"), "source=waf_logs | stats count()").unwrap();
        fs::write(dsl_dir.join("01_count.json"), r#"{"query":{"match_all":{}}}"#).unwrap();

        let err = QueryStore::open(dir.path())
            .unwrap()
            .load(&Selection::new(
                LogTypeSelector::One(LogType::Waf),
                LanguageSelector::Both,
            ))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateQueryName { .. }));
    }

    #[test]
    fn endpoint_paths_per_language() {
        let store = store();
        let ppl_set = store.load(&ppl(LogTypeSelector::One(LogType::Vpc))).unwrap();
        let query = &ppl_set.queries()[0];
        assert_eq!(query.endpoint_path(None), "/_plugins/_ppl");

        let dsl_set = store
            .load(&Selection::new(
                LogTypeSelector::One(LogType::Big5),
                LanguageSelector::One(QueryLanguage::Dsl),
            ))
            .unwrap();
        let query = &dsl_set.queries()[0];
        assert_eq!(query.endpoint_path(None), "/big5/_search");
        assert_eq!(query.endpoint_path(Some("big5_v2")), "/big5_v2/_search");
    }

    #[test]
    fn ppl_body_is_wrapped_in_an_envelope() {
        let set = store().load(&ppl(LogTypeSelector::One(LogType::Vpc))).unwrap();
        let query = set.get("vpc/01_count_all").unwrap();
        assert_eq!(
            query.request_body(),
            serde_json::json!({ "query": "source=vpc_flow_logs | stats count()" })
        );
    }

    #[test]
    fn dsl_body_is_sent_verbatim() {
        let set = store()
            .load(&Selection::new(
                LogTypeSelector::One(LogType::Big5),
                LanguageSelector::One(QueryLanguage::Dsl),
            ))
            .unwrap();
        let query = set.get("big5/01_default_match_all").unwrap();
        assert_eq!(query.request_body()["size"], 50);
    }

    #[test]
    fn pick_covers_the_whole_set() {
        let set = store().load(&ppl(LogTypeSelector::One(LogType::Waf))).unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        let mut seen = vec![false; set.len()];
        for _ in 0..1_000 {
            let (idx, query) = set.pick(&mut rng);
            assert_eq!(set.queries()[idx].name(), query.name());
            seen[idx] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
