#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index for zone assignment.
//!
//! Builds an R-tree over zone bounding boxes once, then answers "which
//! zones does this geometry intersect?" with a bounding-box pre-filter
//! followed by an exact intersection test. Zones may overlap, so a
//! geometry can be assigned to several zones at once.

use std::collections::BTreeSet;

use geo::{BoundingRect, Geometry, Intersects, MultiPolygon, Rect};
use prelev_models::Zone;
use rstar::{AABB, RTree, RTreeObject};

/// Position of a zone in the collection the index was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoneId(pub usize);

/// A zone envelope stored in the R-tree.
struct ZoneEntry {
    id: ZoneId,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for ZoneEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial index over a fixed set of zones.
///
/// Read-only once built, so it can be shared across threads and reused by
/// several passes within one session.
pub struct ZoneIndex {
    zones: Vec<Zone>,
    tree: RTree<ZoneEntry>,
}

impl std::fmt::Debug for ZoneIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneIndex")
            .field("zones", &self.zones.len())
            .field("indexed", &self.tree.size())
            .finish()
    }
}

impl ZoneIndex {
    /// Builds the R-tree from a zone collection.
    ///
    /// Zones with an empty geometry are kept (they still appear in
    /// [`Self::zones`]) but are never matched.
    #[must_use]
    pub fn new(zones: Vec<Zone>) -> Self {
        let mut entries = Vec::with_capacity(zones.len());

        for (i, zone) in zones.iter().enumerate() {
            let Some(envelope) = compute_envelope(&zone.geometry) else {
                log::warn!("Zone '{}' has an empty geometry and will never match", zone.label);
                continue;
            };
            entries.push(ZoneEntry {
                id: ZoneId(i),
                envelope,
            });
        }

        let tree = RTree::bulk_load(entries);
        log::debug!("Indexed {} of {} zones", tree.size(), zones.len());

        Self { zones, tree }
    }

    /// Whether no zone can ever match. Such an index disables spatial
    /// filtering instead of rejecting everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Number of zones, including those with an empty geometry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Zones in their original order.
    #[must_use]
    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Looks up a zone by id.
    #[must_use]
    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(id.0)
    }

    /// Zones whose bounding box intersects `bbox`.
    #[must_use]
    pub fn candidates(&self, bbox: Rect<f64>) -> BTreeSet<ZoneId> {
        let query = rect_to_aabb(bbox);
        self.tree
            .locate_in_envelope_intersecting(&query)
            .map(|entry| entry.id)
            .collect()
    }

    /// Ids of every zone whose polygon intersects `geometry`.
    ///
    /// Empty when the geometry is absent, empty, or touches no zone.
    #[must_use]
    pub fn assign_ids(&self, geometry: Option<&Geometry<f64>>) -> BTreeSet<ZoneId> {
        let Some(geometry) = geometry else {
            return BTreeSet::new();
        };
        let Some(bbox) = geometry.bounding_rect() else {
            return BTreeSet::new();
        };

        self.candidates(bbox)
            .into_iter()
            .filter(|id| self.zones[id.0].geometry.0.iter().any(|p| geometry.intersects(p)))
            .collect()
    }

    /// Labels of every zone whose polygon intersects `geometry`.
    ///
    /// Containment and partial overlap both count as a match.
    #[must_use]
    pub fn assign(&self, geometry: Option<&Geometry<f64>>) -> BTreeSet<&str> {
        self.assign_ids(geometry)
            .into_iter()
            .map(|id| self.zones[id.0].label.as_str())
            .collect()
    }

    /// Whether `geometry` intersects at least one zone. Stops at the
    /// first hit.
    #[must_use]
    pub fn intersects_any(&self, geometry: &Geometry<f64>) -> bool {
        let Some(bbox) = geometry.bounding_rect() else {
            return false;
        };
        self.tree
            .locate_in_envelope_intersecting(&rect_to_aabb(bbox))
            .any(|entry| {
                self.zones[entry.id.0]
                    .geometry
                    .0
                    .iter()
                    .any(|p| geometry.intersects(p))
            })
    }
}

/// Narrows a geometry to a [`MultiPolygon`], if it is areal.
#[must_use]
pub fn multipolygon_from_geometry(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::MultiPolygon(mp) => Some(mp),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        Geometry::Rect(r) => Some(MultiPolygon(vec![r.to_polygon()])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect().map(rect_to_aabb)
}

fn rect_to_aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}
