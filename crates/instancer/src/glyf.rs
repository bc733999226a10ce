//! Applying tuple deltas to TrueType outlines.
//!
//! The base outline comes from the font binding; decoded tuples are scaled
//! by their region scalar and accumulated in `f64`, with untouched points
//! filled in by interpolation first. Coordinates round half-to-even once,
//! at the very end.

use read_fonts::tables::glyf::{
    Anchor as ReadAnchor, CompositeGlyph as ReadCompositeGlyph, CurvePoint,
    SimpleGlyph as ReadSimpleGlyph,
};
use write_fonts::tables::glyf::{
    Anchor, Bbox, Component, ComponentFlags, CompositeGlyph, Contour, Glyph as WriteGlyph,
    SimpleGlyph, Transform,
};

use crate::{gvar::TupleDeltas, iup};

/// Two phantom points for horizontal side bearings, two for vertical.
pub(crate) const PHANTOM_POINTS: usize = 4;

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn round_coord(value: f64) -> i16 {
    clamp_i16(value.round_ties_even() as i32)
}

/// A glyph after delta application, plus its accumulated phantom deltas.
///
/// The advance-width phantom (index 1) feeds metric variation when the
/// font has no HVAR table.
pub(crate) struct VariedGlyph {
    pub glyph: WriteGlyph,
    pub bbox: Option<Bbox>,
    pub phantom: [(f64, f64); PHANTOM_POINTS],
}

impl VariedGlyph {
    pub(crate) fn empty(phantom: [(f64, f64); PHANTOM_POINTS]) -> Self {
        Self {
            glyph: WriteGlyph::Empty,
            bbox: None,
            phantom,
        }
    }

    /// The rounded advance-width delta carried by the second phantom point.
    pub(crate) fn advance_delta(&self) -> i32 {
        self.phantom[1].0.round_ties_even() as i32
    }
}

/// Accumulates `scalar * delta` for every surviving tuple into a dense
/// `f64` array of `num_points + 4` positions.
fn accumulate(
    tuples: &[TupleDeltas],
    scalars: &[f64],
    base: &[(i32, i32)],
    end_points: &[usize],
    total: usize,
) -> Vec<(f64, f64)> {
    let mut accum = vec![(0.0, 0.0); total];
    for (tuple, scalar) in tuples.iter().zip(scalars) {
        if *scalar == 0.0 {
            continue;
        }
        if tuple.all_points || end_points.is_empty() {
            for (i, slot) in accum.iter_mut().enumerate() {
                if tuple.touched[i] {
                    slot.0 += scalar * f64::from(tuple.dx[i]);
                    slot.1 += scalar * f64::from(tuple.dy[i]);
                }
            }
        } else {
            let expanded = iup::expand(&tuple.dx, &tuple.dy, &tuple.touched, base, end_points);
            for (slot, (ex, ey)) in accum.iter_mut().zip(expanded) {
                slot.0 += scalar * ex;
                slot.1 += scalar * ey;
            }
        }
    }
    accum
}

fn phantom_tail(accum: &[(f64, f64)]) -> [(f64, f64); PHANTOM_POINTS] {
    let mut phantom = [(0.0, 0.0); PHANTOM_POINTS];
    let start = accum.len() - PHANTOM_POINTS;
    phantom.copy_from_slice(&accum[start..]);
    phantom
}

/// Applies surviving tuples to a simple glyph and rebuilds its contours.
pub(crate) fn apply_simple(
    simple: &ReadSimpleGlyph,
    tuples: &[TupleDeltas],
    scalars: &[f64],
) -> VariedGlyph {
    let num_points = simple.num_points();
    if num_points == 0 {
        return VariedGlyph::empty([(0.0, 0.0); PHANTOM_POINTS]);
    }

    let end_points: Vec<usize> = simple
        .end_pts_of_contours()
        .iter()
        .map(|x| x.get() as usize)
        .collect();

    let mut base: Vec<(i32, i32)> = Vec::with_capacity(num_points + PHANTOM_POINTS);
    let mut on_curve: Vec<bool> = Vec::with_capacity(num_points);
    for point in simple.points() {
        base.push((i32::from(point.x), i32::from(point.y)));
        on_curve.push(point.on_curve);
    }
    base.extend(std::iter::repeat_n((0, 0), PHANTOM_POINTS));

    let accum = accumulate(tuples, scalars, &base, &end_points, base.len());

    let mut contours = Vec::with_capacity(end_points.len());
    let mut start = 0;
    for &end in &end_points {
        if end >= num_points {
            break;
        }
        let contour_points: Vec<CurvePoint> = (start..=end)
            .map(|i| {
                CurvePoint::new(
                    round_coord(f64::from(base[i].0) + accum[i].0),
                    round_coord(f64::from(base[i].1) + accum[i].1),
                    on_curve[i],
                )
            })
            .collect();
        contours.push(Contour::from(contour_points));
        start = end + 1;
    }

    let mut glyph = SimpleGlyph {
        bbox: Bbox::default(),
        contours,
        instructions: simple.instructions().to_vec(),
    };
    glyph.recompute_bounding_box();
    let bbox = glyph.bbox;

    VariedGlyph {
        glyph: WriteGlyph::Simple(glyph),
        bbox: Some(bbox),
        phantom: phantom_tail(&accum),
    }
}

/// Applies surviving tuples to a composite glyph's component offsets.
/// Untouched components simply keep their offsets; interpolation never
/// applies to composites.
pub(crate) fn apply_composite(
    composite: &ReadCompositeGlyph,
    tuples: &[TupleDeltas],
    scalars: &[f64],
) -> VariedGlyph {
    let components: Vec<_> = composite.components().collect();
    if components.is_empty() {
        return VariedGlyph::empty([(0.0, 0.0); PHANTOM_POINTS]);
    }

    let total = components.len() + PHANTOM_POINTS;
    let accum = accumulate(tuples, scalars, &[], &[], total);

    let mut new_components = components.iter().enumerate().map(|(i, comp)| {
        let anchor = match comp.anchor {
            ReadAnchor::Offset { x, y } => Anchor::Offset {
                x: round_coord(f64::from(x) + accum[i].0),
                y: round_coord(f64::from(y) + accum[i].1),
            },
            ReadAnchor::Point { base, component } => Anchor::Point { base, component },
        };
        let t = comp.transform;
        let transform = Transform {
            xx: t.xx,
            yx: t.yx,
            xy: t.xy,
            yy: t.yy,
        };
        Component::new(comp.glyph, anchor, transform, ComponentFlags::default())
    });

    let Some(first) = new_components.next() else {
        return VariedGlyph::empty(phantom_tail(&accum));
    };
    let bbox = kurbo::Rect::new(
        composite.x_min() as f64,
        composite.y_min() as f64,
        composite.x_max() as f64,
        composite.y_max() as f64,
    );
    let mut new_composite = CompositeGlyph::new(first, bbox);
    for comp in new_components {
        new_composite.add_component(comp, kurbo::Rect::ZERO);
    }

    VariedGlyph {
        glyph: WriteGlyph::Composite(new_composite),
        // Resolved from varied component bboxes in a later pass.
        bbox: None,
        phantom: phantom_tail(&accum),
    }
}

/// Applies phantom-only tuples for a glyph with no outline.
pub(crate) fn apply_empty(tuples: &[TupleDeltas], scalars: &[f64]) -> VariedGlyph {
    let accum = accumulate(tuples, scalars, &[], &[], PHANTOM_POINTS);
    VariedGlyph::empty(phantom_tail(&accum))
}

/// Resolves composite bounding boxes from their (already varied) component
/// bboxes, iterating so nested composites settle.
pub(crate) fn recompute_composite_bboxes(glyphs: &mut [WriteGlyph], bboxes: &mut [Option<Bbox>]) {
    let mut changed = true;
    while changed {
        changed = false;
        for glyph_id in 0..glyphs.len() {
            if bboxes[glyph_id].is_some() {
                continue;
            }
            let WriteGlyph::Composite(composite) = &glyphs[glyph_id] else {
                continue;
            };
            if let Some(new_bbox) = compute_composite_bbox(composite, bboxes) {
                bboxes[glyph_id] = Some(new_bbox);
                if let WriteGlyph::Composite(c) = &mut glyphs[glyph_id] {
                    c.bbox = new_bbox;
                }
                changed = true;
            }
        }
    }
}

/// Computes a composite bbox by transforming each component's bbox corners.
/// Returns `None` while some non-empty component is still unresolved.
fn compute_composite_bbox(composite: &CompositeGlyph, bboxes: &[Option<Bbox>]) -> Option<Bbox> {
    let mut x_min = i16::MAX;
    let mut y_min = i16::MAX;
    let mut x_max = i16::MIN;
    let mut y_max = i16::MIN;
    let mut has_content = false;

    for comp in composite.components() {
        let component_gid = comp.glyph.to_u32() as usize;
        let component_bbox = match bboxes.get(component_gid) {
            Some(Some(bbox)) => bbox,
            Some(None) => continue, // empty glyph, contributes nothing
            None => return None,    // not yet resolved, retry later
        };
        if component_bbox.x_min == 0
            && component_bbox.x_max == 0
            && component_bbox.y_min == 0
            && component_bbox.y_max == 0
        {
            continue;
        }

        let (offset_x, offset_y) = match comp.anchor {
            Anchor::Offset { x, y } => (f64::from(x), f64::from(y)),
            Anchor::Point { .. } => (0.0, 0.0),
        };
        let t = &comp.transform;
        let (xx, xy) = (t.xx.to_f32() as f64, t.xy.to_f32() as f64);
        let (yx, yy) = (t.yx.to_f32() as f64, t.yy.to_f32() as f64);

        let corners = [
            (f64::from(component_bbox.x_min), f64::from(component_bbox.y_min)),
            (f64::from(component_bbox.x_min), f64::from(component_bbox.y_max)),
            (f64::from(component_bbox.x_max), f64::from(component_bbox.y_min)),
            (f64::from(component_bbox.x_max), f64::from(component_bbox.y_max)),
        ];
        for (cx, cy) in corners {
            let tx = xx * cx + xy * cy + offset_x;
            let ty = yx * cx + yy * cy + offset_y;
            let ix = tx.round() as i16;
            let iy = ty.round() as i16;
            x_min = x_min.min(ix);
            y_min = y_min.min(iy);
            x_max = x_max.max(ix);
            y_max = y_max.max(iy);
            has_content = true;
        }
    }

    if !has_content {
        return Some(Bbox {
            x_min: 0,
            y_min: 0,
            x_max: 0,
            y_max: 0,
        });
    }
    Some(Bbox {
        x_min,
        y_min,
        x_max,
        y_max,
    })
}

/// The xMin of a varied glyph, which becomes its left side bearing.
pub(crate) fn glyph_x_min(glyph: &WriteGlyph) -> Option<i16> {
    match glyph {
        WriteGlyph::Simple(s) => Some(s.bbox.x_min),
        WriteGlyph::Composite(c) => Some(c.bbox.x_min),
        WriteGlyph::Empty => None,
    }
}

/// Font-wide bounds and extents accumulated over every varied glyph.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FontBounds {
    pub x_min: i16,
    pub x_max: i16,
    pub y_min: i16,
    pub y_max: i16,
    pub min_left_side_bearing: i16,
    pub min_right_side_bearing: i16,
    pub x_max_extent: i16,
    pub advance_width_max: u16,
}

impl FontBounds {
    pub(crate) fn new() -> Self {
        FontBounds {
            x_min: i16::MAX,
            x_max: i16::MIN,
            y_min: i16::MAX,
            y_max: i16::MIN,
            min_left_side_bearing: i16::MAX,
            min_right_side_bearing: i16::MAX,
            x_max_extent: i16::MIN,
            advance_width_max: 0,
        }
    }

    pub(crate) fn update(&mut self, glyph: &WriteGlyph, advance: u16) {
        self.advance_width_max = self.advance_width_max.max(advance);

        let bbox = match glyph {
            WriteGlyph::Simple(s) => s.bbox,
            WriteGlyph::Composite(c) => c.bbox,
            WriteGlyph::Empty => return,
        };
        if bbox.x_min == 0 && bbox.x_max == 0 && bbox.y_min == 0 && bbox.y_max == 0 {
            return;
        }

        self.x_min = self.x_min.min(bbox.x_min);
        self.x_max = self.x_max.max(bbox.x_max);
        self.y_min = self.y_min.min(bbox.y_min);
        self.y_max = self.y_max.max(bbox.y_max);

        let lsb = bbox.x_min;
        self.min_left_side_bearing = self.min_left_side_bearing.min(lsb);

        let glyph_width = bbox.x_max.saturating_sub(bbox.x_min);
        let rsb = (advance as i16)
            .saturating_sub(lsb)
            .saturating_sub(glyph_width);
        self.min_right_side_bearing = self.min_right_side_bearing.min(rsb);

        let extent = lsb.saturating_add(glyph_width);
        self.x_max_extent = self.x_max_extent.max(extent);
    }

    pub(crate) fn finalize(&mut self) {
        for field in [
            &mut self.x_min,
            &mut self.y_min,
            &mut self.min_left_side_bearing,
            &mut self.min_right_side_bearing,
        ] {
            if *field == i16::MAX {
                *field = 0;
            }
        }
        for field in [&mut self.x_max, &mut self.y_max, &mut self.x_max_extent] {
            if *field == i16::MIN {
                *field = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    fn tuple(dx: Vec<i32>, dy: Vec<i32>, touched: Vec<bool>, all: bool) -> TupleDeltas {
        TupleDeltas {
            region: Region::from_peaks(&[1.0]),
            dx,
            dy,
            touched,
            all_points: all,
            shared_peak_index: None,
        }
    }

    #[test]
    fn rounding_is_half_to_even() {
        assert_eq!(round_coord(2.5), 2);
        assert_eq!(round_coord(3.5), 4);
        assert_eq!(round_coord(-2.5), -2);
        assert_eq!(round_coord(104.4), 104);
        assert_eq!(round_coord(40000.0), i16::MAX);
    }

    #[test]
    fn phantom_advance_delta_scales() {
        // four phantom points only (an empty glyph), advance phantom moved
        let t = tuple(
            vec![0, 40, 0, 0],
            vec![0, 0, 0, 0],
            vec![true; 4],
            true,
        );
        let varied = apply_empty(&[t], &[0.5]);
        assert_eq!(varied.advance_delta(), 20);
    }

    #[test]
    fn accumulate_sums_scaled_tuples() {
        let base = [(100, 0), (200, 0)];
        let t1 = tuple(vec![10, 0], vec![0, 0], vec![true, true], true);
        let t2 = tuple(vec![4, 4], vec![0, 2], vec![true, true], true);
        let accum = accumulate(&[t1, t2], &[0.5, 1.0], &base, &[1], 2);
        assert_eq!(accum[0], (9.0, 0.0));
        assert_eq!(accum[1], (4.0, 2.0));
    }

    #[test]
    fn partial_tuple_interpolates_untouched() {
        // three points on a line; only the ends are touched
        let base = [(0, 0), (100, 0), (200, 0)];
        let t = tuple(
            vec![0, 0, 20],
            vec![0, 0, 0],
            vec![true, false, true],
            false,
        );
        let accum = accumulate(&[t], &[1.0], &base, &[2], 3);
        assert_eq!(accum[1], (10.0, 0.0));
    }

    #[test]
    fn bounds_track_extents() {
        let mut bounds = FontBounds::new();
        let glyph = SimpleGlyph {
            bbox: Bbox {
                x_min: 10,
                y_min: -20,
                x_max: 110,
                y_max: 180,
            },
            contours: vec![],
            instructions: vec![],
        };
        bounds.update(&WriteGlyph::Simple(glyph), 150);
        bounds.finalize();
        assert_eq!(bounds.x_min, 10);
        assert_eq!(bounds.advance_width_max, 150);
        assert_eq!(bounds.min_left_side_bearing, 10);
        // rsb = 150 - 10 - 100 = 40
        assert_eq!(bounds.min_right_side_bearing, 40);
        assert_eq!(bounds.x_max_extent, 110);
    }

    #[test]
    fn empty_bounds_finalize_to_zero() {
        let mut bounds = FontBounds::new();
        bounds.finalize();
        assert_eq!(bounds.x_min, 0);
        assert_eq!(bounds.x_max, 0);
        assert_eq!(bounds.x_max_extent, 0);
    }
}
