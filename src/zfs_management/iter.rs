// zfs_management/iter.rs
// Depth-first dataset walker over the callback iteration primitives

use super::types::{DatasetInfo, DatasetType};
use crate::backend::{Backend, BackendResult, DatasetObject, Visit};
use crate::errors::{Result, ZfsError};
use std::collections::HashMap;

/// Receives every object the walker reaches
pub trait DatasetVisitor {
    /// Returning an error stops the walk; the error is what the walk returns
    fn visit(&mut self, info: DatasetInfo) -> Result<()>;
}

impl<F> DatasetVisitor for F
where
    F: FnMut(DatasetInfo) -> Result<()>,
{
    fn visit(&mut self, info: DatasetInfo) -> Result<()> {
        self(info)
    }
}

pub fn describe<D: DatasetObject>(ds: &D) -> DatasetInfo {
    DatasetInfo {
        name: ds.name(),
        kind: ds.kind(),
        guid: ds.guid(),
    }
}

/// Walk state: the visitor plus the first error seen
struct Walker<'v, V: DatasetVisitor> {
    op: &'static str,
    visitor: &'v mut V,
    recursive: bool,
    error: Option<ZfsError>,
}

impl<V: DatasetVisitor> Walker<'_, V> {
    fn walk<D: DatasetObject>(&mut self, ds: D) -> Visit {
        let info = describe(&ds);
        let name = info.name.clone();
        let descend = self.recursive && info.kind != DatasetType::Snapshot;

        if let Err(e) = self.visitor.visit(info) {
            self.error = Some(e);
            return Visit::Abort;
        }
        if !descend {
            return Visit::Continue;
        }

        // children first (snapshots included by the native primitive), then snapshots
        let children = ds.iter_children(&mut |child| self.walk(child));
        if self.settle(&name, children) == Visit::Abort {
            return Visit::Abort;
        }
        let snapshots = ds.iter_snapshots(&mut |snap| self.walk(snap));
        self.settle(&name, snapshots)
    }

    /// Fold a primitive's result into the walk state
    fn settle(&mut self, name: &str, result: BackendResult<Visit>) -> Visit {
        match result {
            Ok(visit) => visit,
            Err(failure) => {
                if self.error.is_none() {
                    self.error = Some(ZfsError::from_backend(self.op, name, failure));
                }
                Visit::Abort
            }
        }
    }

    fn finish(self, result: BackendResult<Visit>, resource: &str) -> Result<()> {
        if let Some(e) = self.error {
            return Err(e);
        }
        match result {
            Ok(_) => Ok(()),
            Err(failure) => Err(ZfsError::from_backend(self.op, resource, failure)),
        }
    }
}

/// Visit every root dataset, and everything below it when `recursive`
pub fn walk_all<B, V>(
    backend: &mut B,
    op: &'static str,
    recursive: bool,
    visitor: &mut V,
) -> Result<()>
where
    B: Backend,
    V: DatasetVisitor,
{
    let mut walker = Walker {
        op,
        visitor,
        recursive,
        error: None,
    };
    let result = backend.iter_root_datasets(&mut |ds| walker.walk(ds));
    walker.finish(result, "")
}

/// Visit one dataset, and everything below it when `recursive`
pub fn walk_from<D, V>(root: D, op: &'static str, recursive: bool, visitor: &mut V) -> Result<()>
where
    D: DatasetObject,
    V: DatasetVisitor,
{
    let name = root.name();
    let mut walker = Walker {
        op,
        visitor,
        recursive,
        error: None,
    };
    walker.walk(root);
    walker.finish(Ok(Visit::Continue), &name)
}

/// Name-keyed accumulator; repeated sightings collapse to one entry
#[derive(Debug, Default)]
pub struct Collector {
    seen: HashMap<String, DatasetInfo>,
}

impl Collector {
    pub fn new() -> Self {
        Collector::default()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Flatten, apply the optional type filter, order by name
    pub fn finish(self, filter: Option<DatasetType>) -> Vec<DatasetInfo> {
        let mut out: Vec<DatasetInfo> = self
            .seen
            .into_values()
            .filter(|info| filter.map_or(true, |kind| info.kind == kind))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl DatasetVisitor for Collector {
    fn visit(&mut self, info: DatasetInfo) -> Result<()> {
        self.seen.insert(info.name.clone(), info);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::errors::{op, ErrorKind};

    fn backend() -> MockBackend {
        let backend = MockBackend::new().with_pool("tank", 42);
        backend.add_dataset("tank/data", DatasetType::Filesystem);
        backend.add_dataset("tank/data@snap1", DatasetType::Snapshot);
        backend.add_dataset("tank/data/child", DatasetType::Filesystem);
        backend.add_dataset("tank/vol", DatasetType::Volume);
        backend
    }

    /// Test: snapshots reached as children and as snapshots appear once
    #[test]
    fn test_snapshot_seen_twice_collected_once() {
        let mut backend = backend();
        let mut sightings: Vec<String> = Vec::new();
        let mut collector = Collector::new();
        let mut visitor = |info: DatasetInfo| {
            sightings.push(info.name.clone());
            collector.visit(info)
        };
        walk_all(&mut backend, op::LIST_DATASETS, true, &mut visitor).unwrap();

        let snap_hits = sightings.iter().filter(|n| *n == "tank/data@snap1").count();
        assert_eq!(snap_hits, 2);

        let all = collector.finish(None);
        let names: Vec<&str> = all.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["tank", "tank/data", "tank/data/child", "tank/data@snap1", "tank/vol"]
        );
    }

    /// Test: non-recursive walks stop at the roots
    #[test]
    fn test_non_recursive_roots_only() {
        let mut backend = backend();
        let mut collector = Collector::new();
        walk_all(&mut backend, op::LIST_DATASETS, false, &mut collector).unwrap();
        let all = collector.finish(None);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "tank");
    }

    /// Test: the type filter runs after de-duplication
    #[test]
    fn test_type_filter() {
        let mut backend = backend();
        let mut collector = Collector::new();
        walk_all(&mut backend, op::LIST_DATASETS, true, &mut collector).unwrap();
        let snaps = collector.finish(Some(DatasetType::Snapshot));
        assert_eq!(snaps.len(), 1);
        assert!(snaps[0].is_snapshot());
    }

    /// Test: the first visitor error aborts the walk and is returned
    #[test]
    fn test_visitor_error_short_circuits() {
        let mut backend = backend();
        let mut visited = 0;
        let mut visitor = |info: DatasetInfo| {
            visited += 1;
            if info.name == "tank/data" {
                Err(ZfsError::new(op::LIST_DATASETS, ErrorKind::Busy, "stop here"))
            } else {
                Ok(())
            }
        };
        let err = walk_all(&mut backend, op::LIST_DATASETS, true, &mut visitor).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Busy);
        assert_eq!(visited, 2);
    }

    /// Test: a failing primitive surfaces as a structured error
    #[test]
    fn test_backend_failure_propagates() {
        let mut backend = backend();
        backend.probe().fail_next("iter_children", libc::EIO);
        let mut collector = Collector::new();
        let err = walk_all(&mut backend, op::LIST_DATASETS, true, &mut collector).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IoError);
        assert_eq!(err.op, op::LIST_DATASETS);
    }

    /// Test: every opened handle is closed once the walk returns
    #[test]
    fn test_walk_releases_handles() {
        let mut backend = backend();
        let probe = backend.probe();
        let mut collector = Collector::new();
        walk_all(&mut backend, op::LIST_DATASETS, true, &mut collector).unwrap();
        assert_eq!(probe.open_handles(), 0);
    }
}
