use std::collections::BTreeSet;

use crate::cache::DirectoryCache;
use crate::gateway::{self, is_directory_or_false, FsGateway, TransferMode};
use crate::graph::{Edge, EdgeId};
use crate::path::CanonicalPath;

/// Why one edge of a batch did not transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub edge: EdgeId,
    pub from: CanonicalPath,
    pub to: CanonicalPath,
    pub reason: String,
}

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub mode: TransferMode,
    pub success: usize,
    pub failed: usize,
    /// Source parents and destinations of successful transfers; panels
    /// showing these are refreshed.
    pub touched: BTreeSet<CanonicalPath>,
    /// Paths created by successful transfers.
    pub transferred: Vec<CanonicalPath>,
    pub failures: Vec<TransferFailure>,
}

impl TransferReport {
    fn new(mode: TransferMode) -> Self {
        Self {
            mode,
            success: 0,
            failed: 0,
            touched: BTreeSet::new(),
            transferred: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, edge: &Edge, reason: String) {
        self.failed += 1;
        self.failures.push(TransferFailure {
            edge: edge.id,
            from: edge.from_path().clone(),
            to: edge.to_path().clone(),
            reason,
        });
    }

    pub fn attempted(&self) -> usize {
        self.success + self.failed
    }

    /// One-line summary for the notification.
    pub fn message(&self) -> String {
        if self.attempted() == 0 {
            return String::from("nothing to transfer");
        }
        let verb = match self.mode {
            TransferMode::Copy => "Copied",
            TransferMode::Move => "Moved",
        };
        if self.failed == 0 {
            format!("{verb} {} item(s)", self.success)
        } else {
            format!("{verb} {} item(s), {} failed", self.success, self.failed)
        }
    }
}

/// Runs a drained edge set against the gateway.
pub struct TransferExecutor;

impl TransferExecutor {
    /// Transfer every edge in order. A failing edge is counted and skipped;
    /// the batch always runs to the end.
    ///
    /// On success the cache loses the source's parent, the destination and the
    /// new path (and a moved folder's own listing). Failures leave the cache
    /// untouched.
    pub async fn execute<G: FsGateway>(
        edges: &[Edge],
        mode: TransferMode,
        gateway: &G,
        cache: &DirectoryCache,
    ) -> TransferReport {
        let mut report = TransferReport::new(mode);
        if edges.is_empty() {
            tracing::info!("nothing to transfer");
            return report;
        }
        tracing::info!(count = edges.len(), mode = mode.verb(), "transfer batch started");

        for edge in edges {
            let (from, to) = (edge.from_path(), edge.to_path());
            let src_is_dir = is_directory_or_false(gateway, from).await;
            if !is_directory_or_false(gateway, to).await {
                tracing::warn!(id = %edge.id, %to, "destination is no longer a folder");
                report.fail(edge, String::from("destination is not a folder"));
                continue;
            }
            match gateway::transfer(gateway, mode, src_is_dir, from, to).await {
                Ok(new_path) => {
                    let parent = from.parent();
                    if let Some(parent) = &parent {
                        cache.invalidate(parent);
                    }
                    cache.invalidate(to);
                    cache.invalidate(&new_path);
                    if src_is_dir && mode == TransferMode::Move {
                        cache.invalidate(from);
                    }
                    tracing::debug!(id = %edge.id, %from, %new_path, "transferred");

                    report.success += 1;
                    report.touched.extend(parent);
                    report.touched.insert(to.clone());
                    report.transferred.push(new_path);
                }
                Err(err) => {
                    tracing::warn!(id = %edge.id, %from, %to, %err, "transfer failed");
                    report.fail(edge, err.to_string());
                }
            }
        }

        tracing::info!(
            success = report.success,
            failed = report.failed,
            mode = mode.verb(),
            "transfer batch finished"
        );
        report
    }
}

/// Paths created by recent transfers, for row highlighting.
#[derive(Debug, Default, Clone)]
pub struct TransferHistory {
    paths: BTreeSet<CanonicalPath>,
}

impl TransferHistory {
    pub fn mark(&mut self, path: CanonicalPath) {
        self.paths.insert(path);
    }

    pub fn extend(&mut self, paths: impl IntoIterator<Item = CanonicalPath>) {
        self.paths.extend(paths);
    }

    /// True for a transferred path and anything inside it.
    pub fn is_transferred(&self, path: &CanonicalPath) -> bool {
        self.paths.iter().any(|p| path.is_same_or_descendant_of(p))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::memory::GatewayOp;
    use crate::gateway::MemoryGateway;
    use crate::graph::AnchorRef;
    use crate::panel::PanelId;

    fn p(s: &str) -> CanonicalPath {
        CanonicalPath::new(s)
    }

    fn edge(id: u64, from: &str, to: &str) -> Edge {
        Edge {
            id: EdgeId(id),
            from: AnchorRef::new(PanelId(0), from),
            to: AnchorRef::new(PanelId(1), to),
        }
    }

    async fn warm(cache: &DirectoryCache, gw: &MemoryGateway, paths: &[&str]) {
        for path in paths {
            cache.list(gw, &p(path)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_partial_failure_counts_and_invalidation() {
        let gw = MemoryGateway::with_entries(["/src/a.txt", "/src/b.txt", "/dst/", "/other/o.txt"]);
        gw.fail(GatewayOp::CopyFile, "/src/b.txt");
        let cache = DirectoryCache::new();
        warm(&cache, &gw, &["/src", "/dst", "/other"]).await;

        let edges = vec![edge(1, "/src/a.txt", "/dst"), edge(2, "/src/b.txt", "/dst")];
        let report = TransferExecutor::execute(&edges, TransferMode::Copy, &gw, &cache).await;

        assert_eq!((report.success, report.failed), (1, 1));
        assert_eq!(report.failures[0].edge, EdgeId(2));
        assert_eq!(report.transferred, vec![p("/dst/a.txt")]);
        assert_eq!(report.touched.iter().cloned().collect::<Vec<_>>(), vec![p("/dst"), p("/src")]);
        assert!(!cache.contains(&p("/src")));
        assert!(!cache.contains(&p("/dst")));
        assert!(cache.contains(&p("/other")));
        assert!(gw.exists("/dst/a.txt"));
        assert!(!gw.exists("/dst/b.txt"));
        assert_eq!(report.message(), "Copied 1 item(s), 1 failed");
    }

    #[tokio::test]
    async fn test_failure_leaves_cache_untouched() {
        let gw = MemoryGateway::with_entries(["/src/a.txt", "/dst/"]);
        gw.fail(GatewayOp::MoveFile, "/src/a.txt");
        let cache = DirectoryCache::new();
        warm(&cache, &gw, &["/src", "/dst"]).await;

        let report = TransferExecutor::execute(&[edge(1, "/src/a.txt", "/dst")], TransferMode::Move, &gw, &cache).await;
        assert_eq!(report.failed, 1);
        assert!(report.touched.is_empty());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_vanished_destination_is_a_failure() {
        let gw = MemoryGateway::with_entries(["/src/a.txt", "/dst/"]);
        let cache = DirectoryCache::new();
        gw.delete_item(&p("/dst")).await.unwrap();

        let report = TransferExecutor::execute(&[edge(1, "/src/a.txt", "/dst")], TransferMode::Copy, &gw, &cache).await;
        assert_eq!((report.success, report.failed), (0, 1));
        assert_eq!(report.failures[0].reason, "destination is not a folder");
        assert_eq!(gw.call_count(GatewayOp::CopyFile), 0);
    }

    #[tokio::test]
    async fn test_folder_source_uses_folder_variant() {
        let gw = MemoryGateway::with_entries(["/src/sub/inner.txt", "/dst/"]);
        let cache = DirectoryCache::new();
        warm(&cache, &gw, &["/src/sub"]).await;

        let report = TransferExecutor::execute(&[edge(1, "/src/sub", "/dst")], TransferMode::Move, &gw, &cache).await;
        assert_eq!(report.success, 1);
        assert_eq!(gw.call_count(GatewayOp::MoveFolder), 1);
        assert!(gw.exists("/dst/sub/inner.txt"));
        assert!(!cache.contains(&p("/src/sub")));
        assert_eq!(report.message(), "Moved 1 item(s)");
    }

    #[tokio::test]
    async fn test_empty_batch_has_no_side_effects() {
        let gw = MemoryGateway::new();
        let cache = DirectoryCache::new();
        let report = TransferExecutor::execute(&[], TransferMode::Copy, &gw, &cache).await;
        assert_eq!(report.attempted(), 0);
        assert_eq!(report.message(), "nothing to transfer");
        assert!(gw.calls().is_empty());
    }

    #[test]
    fn test_history_matches_descendants() {
        let mut history = TransferHistory::default();
        history.mark(p("/dst/sub"));
        assert!(history.is_transferred(&p("/dst/sub")));
        assert!(history.is_transferred(&p("/dst/sub/inner.txt")));
        assert!(!history.is_transferred(&p("/dst/subway")));
        assert!(!history.is_transferred(&p("/dst")));
        history.clear();
        assert!(history.is_empty());
    }
}
