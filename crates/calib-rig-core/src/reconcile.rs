//! Cross-view reconciliation for stereo calibration.
//!
//! Both cameras observe the pattern independently, so each image pair holds
//! two differently sized correspondence lists. The stereo solver needs them
//! index-aligned on the object points visible in *both* views.

use crate::{Correspondence, ViewCorrespondences};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Point accounting of one reconciliation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Points kept in each view.
    pub shared: usize,
    /// Points of view A without a partner in view B.
    pub dropped_a: usize,
    /// Points of view B that no point of view A consumed.
    pub dropped_b: usize,
}

impl ReconcileStats {
    #[inline]
    pub fn dropped(&self) -> usize {
        self.dropped_a + self.dropped_b
    }

    fn add(&mut self, other: ReconcileStats) {
        self.shared += other.shared;
        self.dropped_a += other.dropped_a;
        self.dropped_b += other.dropped_b;
    }
}

/// Two index-aligned views plus point accounting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub a: ViewCorrespondences,
    pub b: ViewCorrespondences,
    pub stats: ReconcileStats,
    /// Per-image accounting, same indexing as the views.
    pub per_image: Vec<ReconcileStats>,
}

/// Intersect one image's correspondence lists.
///
/// Every element of `a` is matched against the first not-yet-consumed
/// element of `b` describing the same object point. Outputs keep the order
/// of `a`; each side carries its own image points.
pub fn reconcile_image(
    a: &[Correspondence],
    b: &[Correspondence],
) -> (Vec<Correspondence>, Vec<Correspondence>, ReconcileStats) {
    let mut consumed = vec![false; b.len()];
    let mut out_a = Vec::with_capacity(a.len().min(b.len()));
    let mut out_b = Vec::with_capacity(a.len().min(b.len()));

    for ca in a {
        let hit = b
            .iter()
            .enumerate()
            .find(|(k, cb)| !consumed[*k] && ca.same_object(cb))
            .map(|(k, _)| k);
        if let Some(k) = hit {
            consumed[k] = true;
            out_a.push(*ca);
            out_b.push(b[k]);
        }
    }

    let stats = ReconcileStats {
        shared: out_a.len(),
        dropped_a: a.len() - out_a.len(),
        dropped_b: b.len() - out_b.len(),
    };
    (out_a, out_b, stats)
}

/// Restrict two views to their common object points, image by image.
///
/// Images present in only one view reconcile against an empty list.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(a, b), fields(images = a.image_count().max(b.image_count())))
)]
pub fn reconcile(a: &ViewCorrespondences, b: &ViewCorrespondences) -> ReconcileOutcome {
    let count = a.image_count().max(b.image_count());
    let mut out_a = Vec::with_capacity(count);
    let mut out_b = Vec::with_capacity(count);
    let mut per_image = Vec::with_capacity(count);
    let mut stats = ReconcileStats::default();

    for i in 0..count {
        let (sa, sb, s) = reconcile_image(a.image(i), b.image(i));
        out_a.push(sa);
        out_b.push(sb);
        per_image.push(s);
        stats.add(s);
    }

    ReconcileOutcome {
        a: ViewCorrespondences::from_images(out_a),
        b: ViewCorrespondences::from_images(out_b),
        stats,
        per_image,
    }
}
