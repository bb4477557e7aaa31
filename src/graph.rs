//! Connection graph: pending transfer edges between anchors.
//!
//! Anchors are addressed by `(PanelId, CanonicalPath)` and never held as
//! references to rendered rows. An edge therefore survives collapse and
//! re-expansion of the folders around its endpoints; geometry re-resolves the
//! keys on every pass and hides what it cannot find.
//!
//! Completing a drop takes one gateway call. [`ConnectionGraph::complete_edge`]
//! does it inline; a UI thread that cannot block uses the two synchronous
//! halves around its own background call:
//!
//! 1. [`ConnectionGraph::resolve_drop`] rejects the trivial cases and hands out
//!    a [`DropToken`],
//! 2. the caller runs `is_directory` on the token's candidate,
//! 3. [`ConnectionGraph::finish_drop`] validates and commits, or does nothing
//!    if the gesture was cancelled or replaced in the meantime.

use glam::Vec2;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConnectError;
use crate::gateway::{is_directory_or_false, FsGateway};
use crate::panel::PanelId;
use crate::path::CanonicalPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub u64);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable key of a connector: the owning panel and the entry it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorRef {
    pub panel: PanelId,
    pub path: CanonicalPath,
}

impl AnchorRef {
    pub fn new(panel: PanelId, path: impl Into<CanonicalPath>) -> Self {
        Self {
            panel,
            path: path.into(),
        }
    }
}

/// "Transfer `from.path` into `to.path`". Paths are snapshots taken when the
/// edge was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub from: AnchorRef,
    pub to: AnchorRef,
}

impl Edge {
    pub fn from_path(&self) -> &CanonicalPath {
        &self.from.path
    }

    pub fn to_path(&self) -> &CanonicalPath {
        &self.to.path
    }

    pub fn summary_key(&self) -> Option<SummaryKey> {
        SummaryKey::new(self.from.panel, self.to.panel)
    }

    pub fn touches(&self, panel: PanelId) -> bool {
        self.from.panel == panel || self.to.panel == panel
    }
}

/// Order-independent panel pair. Same-panel pairs have no key.
///
/// Ids are ordered numerically, so `panel-2` sorts before `panel-10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SummaryKey(PanelId, PanelId);

impl SummaryKey {
    pub fn new(a: PanelId, b: PanelId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self(a, b)),
            std::cmp::Ordering::Greater => Some(Self(b, a)),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn panels(&self) -> (PanelId, PanelId) {
        (self.0, self.1)
    }

    pub fn contains(&self, panel: PanelId) -> bool {
        self.0 == panel || self.1 == panel
    }
}

impl fmt::Display for SummaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.0, self.1)
    }
}

/// The single in-flight drag. `pointer` is in screen space.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingGesture {
    pub from: AnchorRef,
    pub pointer: Vec2,
    /// Panel of a drop whose directory check is in flight.
    target: Option<PanelId>,
    generation: u64,
}

/// A drop that passed the synchronous checks and awaits the directory check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropToken {
    pub candidate: AnchorRef,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct ConnectionGraph {
    edges: BTreeMap<EdgeId, Edge>,
    summaries: BTreeMap<SummaryKey, usize>,
    pending: Option<PendingGesture>,
    next_id: u64,
    generation: u64,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // --- gesture protocol ---

    /// Start dragging from `from`, replacing any gesture in progress.
    pub fn begin_edge(&mut self, from: AnchorRef, pointer: Vec2) {
        self.generation += 1;
        tracing::debug!(panel = %from.panel, path = %from.path, "connection gesture started");
        self.pending = Some(PendingGesture {
            from,
            pointer,
            target: None,
            generation: self.generation,
        });
    }

    /// Move the free end of the pending line. False when nothing is pending.
    pub fn update_pending_geometry(&mut self, pointer: Vec2) -> bool {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.pointer = pointer;
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> Option<&PendingGesture> {
        self.pending.as_ref()
    }

    /// Drop the pending gesture. Returns whether one existed.
    pub fn cancel_pending(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Cancel the gesture if its source anchor lives in `panel` strictly below
    /// `folder`, i.e. the anchor is destroyed by collapsing `folder`.
    pub fn cancel_pending_under(&mut self, panel: PanelId, folder: &CanonicalPath) -> bool {
        let hit = self
            .pending
            .as_ref()
            .is_some_and(|p| p.from.panel == panel && p.from.path.is_descendant_of(folder));
        if hit {
            tracing::debug!(%panel, %folder, "pending gesture source collapsed away");
            self.pending = None;
        }
        hit
    }

    /// First half of a drop. Consumes the gesture when there is no candidate or
    /// the candidate is the source itself; otherwise keeps it pending and
    /// returns the candidate to check.
    pub fn resolve_drop(&mut self, candidate: Option<AnchorRef>) -> Option<DropToken> {
        let pending = self.pending.as_mut()?;
        match candidate {
            Some(candidate) if candidate != pending.from => {
                pending.target = Some(candidate.panel);
                Some(DropToken {
                    candidate,
                    generation: pending.generation,
                })
            }
            _ => {
                self.pending = None;
                None
            }
        }
    }

    /// Second half of a drop, given whether the candidate is a directory.
    ///
    /// `Ok(None)` when the token's gesture is no longer the pending one. Any
    /// other outcome consumes the gesture.
    pub fn finish_drop(&mut self, token: DropToken, candidate_is_dir: bool) -> Result<Option<EdgeId>, ConnectError> {
        if self.pending.as_ref().map(|p| p.generation) != Some(token.generation) {
            tracing::debug!("stale drop ignored");
            return Ok(None);
        }
        let Some(pending) = self.pending.take() else {
            return Ok(None);
        };
        let to = token.candidate;
        if !candidate_is_dir {
            tracing::warn!(to = %to.path, "drop rejected: destination is not a folder");
            return Err(ConnectError::NotAFolder);
        }
        if to.path.is_same_or_descendant_of(&pending.from.path) {
            tracing::warn!(from = %pending.from.path, to = %to.path, "drop rejected: target inside source");
            return Err(ConnectError::IntoOwnSubtree);
        }
        Ok(Some(self.insert_edge(pending.from, to)))
    }

    /// Complete the pending gesture on `candidate`, checking the destination
    /// through `gateway`. A failed directory check counts as "not a folder".
    pub async fn complete_edge<G: FsGateway>(
        &mut self,
        candidate: Option<AnchorRef>,
        gateway: &G,
    ) -> Result<Option<EdgeId>, ConnectError> {
        let Some(token) = self.resolve_drop(candidate) else {
            return Ok(None);
        };
        let is_dir = is_directory_or_false(gateway, &token.candidate.path).await;
        self.finish_drop(token, is_dir)
    }

    fn insert_edge(&mut self, from: AnchorRef, to: AnchorRef) -> EdgeId {
        self.next_id += 1;
        let id = EdgeId(self.next_id);
        let edge = Edge { id, from, to };
        if let Some(key) = edge.summary_key() {
            *self.summaries.entry(key).or_insert(0) += 1;
        }
        tracing::info!(%id, from = %edge.from.path, to = %edge.to.path, "connection added");
        self.edges.insert(id, edge);
        id
    }

    // --- edge set ---

    pub fn delete_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.remove(&id)?;
        if let Some(key) = edge.summary_key() {
            self.decrement(key);
        }
        tracing::debug!(%id, "connection deleted");
        Some(edge)
    }

    fn decrement(&mut self, key: SummaryKey) {
        if let Some(count) = self.summaries.get_mut(&key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.summaries.remove(&key);
            }
        }
    }

    /// Delete every edge between the pair. Returns the ids removed.
    pub fn delete_summary(&mut self, key: SummaryKey) -> Vec<EdgeId> {
        let ids: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.summary_key() == Some(key))
            .map(|e| e.id)
            .collect();
        for id in &ids {
            self.edges.remove(id);
        }
        self.summaries.remove(&key);
        ids
    }

    /// Cascade for a closed panel: its edges, its summaries and a gesture
    /// that started in it or whose drop onto it is still being checked.
    pub fn remove_panel(&mut self, panel: PanelId) -> Vec<EdgeId> {
        let ids: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.touches(panel))
            .map(|e| e.id)
            .collect();
        for id in &ids {
            self.edges.remove(id);
        }
        self.summaries.retain(|key, _| !key.contains(panel));
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.from.panel == panel || p.target == Some(panel))
        {
            tracing::debug!(%panel, "pending gesture dropped with its panel");
            self.pending = None;
        }
        ids
    }

    pub fn clear(&mut self) {
        self.edges.clear();
        self.summaries.clear();
        self.pending = None;
    }

    /// Take every edge, in creation order, leaving the graph empty. Draining
    /// an empty graph leaves the pending gesture alone.
    pub fn drain(&mut self) -> Vec<Edge> {
        if self.edges.is_empty() {
            return Vec::new();
        }
        let edges = std::mem::take(&mut self.edges).into_values().collect();
        self.summaries.clear();
        self.pending = None;
        edges
    }

    // --- queries ---

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn summaries(&self) -> impl Iterator<Item = (SummaryKey, usize)> + '_ {
        self.summaries.iter().map(|(k, c)| (*k, *c))
    }

    pub fn summary_count(&self, key: SummaryKey) -> usize {
        self.summaries.get(&key).copied().unwrap_or(0)
    }

    /// Ids of edges with an endpoint at `anchor`, for row labels.
    pub fn edges_at(&self, anchor: &AnchorRef) -> Vec<EdgeId> {
        self.edges
            .values()
            .filter(|e| &e.from == anchor || &e.to == anchor)
            .map(|e| e.id)
            .collect()
    }
}
