//! Document cache loader: reconciles local policy PDFs against the remote
//! file listing and uploads only what is missing.
//!
//! The cache is built exactly once per process. The file basename is the
//! join key between local files and remote handles; duplicate names on
//! either side resolve first-match-wins.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gemini::{GeminiError, RemoteFile, RemoteInference};

pub const PDF_MIME: &str = "application/pdf";

/// Pause between consecutive uploads to stay under provider rate limits.
const UPLOAD_THROTTLE: Duration = Duration::from_millis(500);

/// A PDF found in the docs directory. Enumerated once per cache build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDocument {
    pub path: PathBuf,
    pub display_name: String,
}

/// How a single document ended up in (or out of) the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// A handle with this display name already existed remotely.
    Reused,
    /// The document was uploaded this build.
    Uploaded,
    /// The document could not be loaded and is excluded from the cache.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub display_name: String,
    pub status: LoadStatus,
}

/// One step of the reconciliation plan for a local document.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    Reuse(RemoteFile),
    Upload(LocalDocument),
}

/// Enumerate `*.pdf` files in `dir`, sorted by file name so scan order is
/// deterministic. Missing or unreadable directories yield an empty list.
pub fn scan_documents(dir: &Path) -> Vec<LocalDocument> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    let mut documents = Vec::new();
    for path in paths {
        let display_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        // First match wins when two paths share a basename.
        if seen.insert(display_name.clone()) {
            documents.push(LocalDocument { path, display_name });
        }
    }
    documents
}

/// Decide, per local document in scan order, whether to reuse an existing
/// remote handle or upload. Duplicate remote display names resolve to the
/// first listing entry.
pub fn reconcile(local: &[LocalDocument], remote: &[RemoteFile]) -> Vec<PlanStep> {
    let mut by_name: HashMap<&str, &RemoteFile> = HashMap::new();
    for handle in remote {
        by_name.entry(handle.display_name.as_str()).or_insert(handle);
    }

    local
        .iter()
        .map(|doc| match by_name.get(doc.display_name.as_str()) {
            Some(handle) => PlanStep::Reuse((*handle).clone()),
            None => PlanStep::Upload(doc.clone()),
        })
        .collect()
}

/// Ordered remote handles plus per-document load reports, built once per
/// process lifetime.
#[derive(Debug, Default)]
pub struct DocumentCache {
    handles: Vec<RemoteFile>,
    reports: Vec<DocumentReport>,
    list_warning: Option<String>,
    loaded: bool,
    throttle: Duration,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self {
            throttle: UPLOAD_THROTTLE,
            ..Self::default()
        }
    }

    #[cfg(test)]
    fn without_throttle() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_handles(handles: Vec<RemoteFile>) -> Self {
        Self {
            handles,
            loaded: true,
            ..Self::default()
        }
    }

    /// Build the cache: scan, reconcile, upload what is missing. Later
    /// calls are no-ops; the memoized result stays available through
    /// [`Self::handles`] with no further network calls.
    ///
    /// An empty docs directory is non-fatal: the cache stays empty and
    /// question answering is reported disabled via [`Self::is_enabled`].
    pub async fn build(&mut self, client: &dyn RemoteInference, docs_dir: &Path) {
        if self.loaded {
            return;
        }
        self.loaded = true;

        let local = scan_documents(docs_dir);
        if local.is_empty() {
            return;
        }

        // A failed listing degrades to uploading everything.
        let remote = match client.list_files().await {
            Ok(remote) => remote,
            Err(err) => {
                self.list_warning = Some(err.to_string());
                Vec::new()
            }
        };

        for step in reconcile(&local, &remote) {
            match step {
                PlanStep::Reuse(handle) => {
                    self.reports.push(DocumentReport {
                        display_name: handle.display_name.clone(),
                        status: LoadStatus::Reused,
                    });
                    self.handles.push(handle);
                }
                PlanStep::Upload(doc) => match self.upload(client, &doc).await {
                    Ok(handle) => {
                        self.reports.push(DocumentReport {
                            display_name: doc.display_name,
                            status: LoadStatus::Uploaded,
                        });
                        self.handles.push(handle);
                        tokio::time::sleep(self.throttle).await;
                    }
                    Err(err) => {
                        self.reports.push(DocumentReport {
                            display_name: doc.display_name,
                            status: LoadStatus::Failed(err.to_string()),
                        });
                    }
                },
            }
        }
    }

    async fn upload(
        &self,
        client: &dyn RemoteInference,
        doc: &LocalDocument,
    ) -> Result<RemoteFile, GeminiError> {
        let bytes = tokio::fs::read(&doc.path)
            .await
            .map_err(|e| GeminiError::UploadFailed {
                name: doc.display_name.clone(),
                message: e.to_string(),
            })?;
        client.upload_file(bytes, &doc.display_name, PDF_MIME).await
    }

    /// Remote handles in local scan order, one per distinct display name.
    pub fn handles(&self) -> &[RemoteFile] {
        &self.handles
    }

    pub fn reports(&self) -> &[DocumentReport] {
        &self.reports
    }

    pub fn list_warning(&self) -> Option<&str> {
        self.list_warning.as_deref()
    }

    /// Question answering is disabled when no documents loaded.
    pub fn is_enabled(&self) -> bool {
        !self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::Part;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn remote(name: &str, display_name: &str) -> RemoteFile {
        RemoteFile {
            name: format!("files/{}", name),
            display_name: display_name.to_string(),
            mime_type: PDF_MIME.to_string(),
            uri: format!("u://{}", name),
        }
    }

    fn local(name: &str) -> LocalDocument {
        LocalDocument {
            path: PathBuf::from(format!("docs/{}", name)),
            display_name: name.to_string(),
        }
    }

    #[derive(Default)]
    struct StubClient {
        remote: Vec<RemoteFile>,
        fail_list: bool,
        fail_upload_of: Option<String>,
        list_calls: Mutex<usize>,
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteInference for StubClient {
        async fn list_files(&self) -> Result<Vec<RemoteFile>, GeminiError> {
            *self.list_calls.lock().unwrap() += 1;
            if self.fail_list {
                return Err(GeminiError::ListFailed("listing unavailable".to_string()));
            }
            Ok(self.remote.clone())
        }

        async fn upload_file(
            &self,
            _bytes: Vec<u8>,
            display_name: &str,
            _mime_type: &str,
        ) -> Result<RemoteFile, GeminiError> {
            self.uploads.lock().unwrap().push(display_name.to_string());
            if self.fail_upload_of.as_deref() == Some(display_name) {
                return Err(GeminiError::UploadFailed {
                    name: display_name.to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(remote("fresh", display_name))
        }

        async fn generate(&self, _model: &str, _parts: Vec<Part>) -> Result<String, GeminiError> {
            unreachable!("cache build never generates")
        }
    }

    fn docs_dir(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            std::fs::write(dir.path().join(name), b"%PDF-1.4").unwrap();
        }
        dir
    }

    #[test]
    fn scan_filters_and_sorts_by_name() {
        let dir = docs_dir(&["b.pdf", "a.pdf", "notes.txt"]);
        let docs = scan_documents(dir.path());
        let names: Vec<&str> = docs.iter().map(|d| d.display_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn scan_of_missing_directory_is_empty() {
        assert!(scan_documents(Path::new("/no/such/dir")).is_empty());
    }

    #[test]
    fn reconcile_reuses_listed_and_uploads_the_rest() {
        let plan = reconcile(&[local("a.pdf"), local("b.pdf")], &[remote("a1", "a.pdf")]);
        assert_eq!(
            plan,
            vec![
                PlanStep::Reuse(remote("a1", "a.pdf")),
                PlanStep::Upload(local("b.pdf")),
            ]
        );
    }

    #[test]
    fn reconcile_duplicate_remote_names_first_match_wins() {
        let plan = reconcile(
            &[local("a.pdf")],
            &[remote("old", "a.pdf"), remote("stale", "a.pdf")],
        );
        assert_eq!(plan, vec![PlanStep::Reuse(remote("old", "a.pdf"))]);
    }

    #[tokio::test]
    async fn build_uploads_only_missing_and_keeps_scan_order() {
        let dir = docs_dir(&["a.pdf", "b.pdf"]);
        let client = StubClient {
            remote: vec![remote("a1", "a.pdf")],
            ..StubClient::default()
        };
        let mut cache = DocumentCache::without_throttle();

        cache.build(&client, dir.path()).await;

        assert_eq!(*client.uploads.lock().unwrap(), vec!["b.pdf".to_string()]);
        let names: Vec<&str> = cache
            .handles()
            .iter()
            .map(|h| h.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
        assert_eq!(cache.reports()[0].status, LoadStatus::Reused);
        assert_eq!(cache.reports()[1].status, LoadStatus::Uploaded);
        assert!(cache.is_enabled());
    }

    #[tokio::test]
    async fn build_is_memoized_with_no_further_network_calls() {
        let dir = docs_dir(&["a.pdf"]);
        let client = StubClient::default();
        let mut cache = DocumentCache::without_throttle();

        cache.build(&client, dir.path()).await;
        let first: Vec<RemoteFile> = cache.handles().to_vec();

        cache.build(&client, dir.path()).await;

        assert_eq!(cache.handles(), first.as_slice());
        assert_eq!(*client.list_calls.lock().unwrap(), 1);
        assert_eq!(client.uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_corpus_disables_question_answering_without_network() {
        let dir = docs_dir(&[]);
        let client = StubClient::default();
        let mut cache = DocumentCache::without_throttle();

        cache.build(&client, dir.path()).await;

        assert!(!cache.is_enabled());
        assert!(cache.handles().is_empty());
        assert_eq!(*client.list_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn listing_failure_degrades_to_uploading_everything() {
        let dir = docs_dir(&["a.pdf", "b.pdf"]);
        let client = StubClient {
            fail_list: true,
            ..StubClient::default()
        };
        let mut cache = DocumentCache::without_throttle();

        cache.build(&client, dir.path()).await;

        assert!(cache.list_warning().is_some());
        assert_eq!(
            *client.uploads.lock().unwrap(),
            vec!["a.pdf".to_string(), "b.pdf".to_string()]
        );
        assert_eq!(cache.handles().len(), 2);
    }

    #[tokio::test]
    async fn single_upload_failure_is_excluded_and_loader_continues() {
        let dir = docs_dir(&["a.pdf", "b.pdf"]);
        let client = StubClient {
            fail_upload_of: Some("a.pdf".to_string()),
            ..StubClient::default()
        };
        let mut cache = DocumentCache::without_throttle();

        cache.build(&client, dir.path()).await;

        let names: Vec<&str> = cache
            .handles()
            .iter()
            .map(|h| h.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["b.pdf"]);
        assert!(matches!(cache.reports()[0].status, LoadStatus::Failed(_)));
        assert_eq!(cache.reports()[1].status, LoadStatus::Uploaded);
    }
}
