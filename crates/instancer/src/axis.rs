//! User-to-normalized coordinate mapping.
//!
//! Each fvar axis maps its user range onto `[-1, 1]` through a piecewise
//! linear curve anchored at `(min, -1)`, `(default, 0)`, `(max, 1)`. When an
//! avar table is present its per-axis segment maps are applied on top.

use font_types::{F2Dot14, Tag};
use read_fonts::tables::fvar::VariationAxisRecord;
use read_fonts::types::NameId;

use crate::{
    error::Diagnostic,
    reader::{Cursor, UnexpectedEnd},
};

const AXIS_HIDDEN_FLAG: u16 = 0x1;

/// A design axis from fvar.
///
/// Created once when a font is bound to an evaluator and never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Axis {
    pub tag: Tag,
    pub min: f64,
    pub default: f64,
    pub max: f64,
    pub hidden: bool,
    pub name_id: NameId,
}

impl Axis {
    pub(crate) fn from_record(record: &VariationAxisRecord) -> Self {
        Self {
            tag: record.axis_tag(),
            min: record.min_value().to_f64(),
            default: record.default_value().to_f64(),
            max: record.max_value().to_f64(),
            hidden: record.flags() & AXIS_HIDDEN_FLAG != 0,
            name_id: record.axis_name_id(),
        }
    }

    /// Maps a user value onto `[-1, 1]`, clamping to the axis range first.
    pub fn normalize(&self, value: f64) -> f64 {
        let v = value.clamp(self.min, self.max);
        if v == self.default {
            0.0
        } else if v < self.default {
            let range = self.default - self.min;
            if range == 0.0 {
                -1.0
            } else {
                (v - self.default) / range
            }
        } else {
            let range = self.max - self.default;
            if range == 0.0 {
                1.0
            } else {
                (v - self.default) / range
            }
        }
    }
}

/// Axis location specification (tag + user-space value).
///
/// The value is in user-space coordinates (design units), matching what
/// you'd see in font variation settings. For example, `wght=700` for Bold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLocation {
    pub tag: Tag,
    pub value: f64,
}

impl AxisLocation {
    /// Create a new axis location. Tags shorter than four characters are
    /// padded with spaces.
    pub fn new(tag: &str, value: f64) -> Self {
        let mut tag_bytes = [b' '; 4];
        for (dst, src) in tag_bytes.iter_mut().zip(tag.as_bytes().iter()) {
            *dst = *src;
        }
        Self {
            tag: Tag::new(&tag_bytes),
            value,
        }
    }
}

impl From<(&str, f64)> for AxisLocation {
    fn from((tag, value): (&str, f64)) -> Self {
        Self::new(tag, value)
    }
}

impl From<(Tag, f64)> for AxisLocation {
    fn from((tag, value): (Tag, f64)) -> Self {
        Self { tag, value }
    }
}

/// A point in normalized design space, in fvar axis order.
///
/// Coordinates are quantized to F2Dot14 the way they would be stored in a
/// font, so equal user inputs always produce bit-equal normalized points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLocation {
    coords: Vec<F2Dot14>,
}

impl NormalizedLocation {
    pub(crate) fn new(coords: Vec<F2Dot14>) -> Self {
        Self { coords }
    }

    pub fn coords(&self) -> &[F2Dot14] {
        &self.coords
    }

    pub(crate) fn to_f64(&self) -> Vec<f64> {
        self.coords.iter().map(|c| c.to_f32() as f64).collect()
    }

    /// True when every coordinate sits at the axis default.
    pub fn is_default(&self) -> bool {
        self.coords.iter().all(|c| *c == F2Dot14::default())
    }
}

/// The full set of axes for a bound font, plus optional avar remapping.
#[derive(Debug, Clone, Default)]
pub(crate) struct Normalizer {
    axes: Vec<Axis>,
    segment_maps: Option<SegmentMaps>,
}

impl Normalizer {
    pub(crate) fn new(axes: Vec<Axis>, segment_maps: Option<SegmentMaps>) -> Self {
        Self { axes, segment_maps }
    }

    pub(crate) fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub(crate) fn axis_index(&self, tag: Tag) -> Option<usize> {
        self.axes.iter().position(|a| a.tag == tag)
    }

    /// Normalizes a user location. Unknown tags are silently ignored and
    /// missing tags default to zero; out-of-range values are clamped with a
    /// diagnostic.
    pub(crate) fn normalize(
        &self,
        location: &[AxisLocation],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> NormalizedLocation {
        let mut coords = vec![F2Dot14::default(); self.axes.len()];
        for loc in location {
            let Some(index) = self.axis_index(loc.tag) else {
                continue;
            };
            let axis = &self.axes[index];
            let clamped = loc.value.clamp(axis.min, axis.max);
            if clamped != loc.value {
                diagnostics.push(Diagnostic::OutOfRangeCoordinate {
                    tag: loc.tag,
                    value: loc.value,
                    clamped,
                });
            }
            let mut f = axis.normalize(clamped);
            if let Some(maps) = &self.segment_maps {
                f = maps.apply(index, f);
            }
            coords[index] = F2Dot14::from_f32(f as f32);
        }
        NormalizedLocation::new(coords)
    }

    /// Returns the tag of the first location entry that names no fvar axis.
    pub(crate) fn unknown_tag(&self, location: &[AxisLocation]) -> Option<Tag> {
        location
            .iter()
            .map(|loc| loc.tag)
            .find(|tag| self.axis_index(*tag).is_none())
    }
}

/// Parsed avar segment maps, one per axis in fvar order.
#[derive(Debug, Clone, Default)]
pub(crate) struct SegmentMaps {
    maps: Vec<Vec<(f64, f64)>>,
}

impl SegmentMaps {
    /// Parses an avar version 1.x table. Returns `None` (identity) for any
    /// other major version or for a map whose axis count disagrees with fvar.
    pub(crate) fn parse(data: &[u8], axis_count: usize) -> Option<Self> {
        match Self::parse_impl(data, axis_count) {
            Ok(maps) => Some(maps),
            Err(UnexpectedEnd) => {
                log::warn!("truncated avar table ignored");
                None
            }
        }
    }

    fn parse_impl(data: &[u8], axis_count: usize) -> Result<Self, UnexpectedEnd> {
        let mut cursor = Cursor::new(data);
        let major = cursor.read_u16()?;
        let _minor = cursor.read_u16()?;
        if major != 1 {
            return Ok(Self::default());
        }
        let _reserved = cursor.read_u16()?;
        let table_axis_count = cursor.read_u16()? as usize;
        if table_axis_count != axis_count {
            return Ok(Self::default());
        }
        let mut maps = Vec::with_capacity(axis_count);
        for _ in 0..axis_count {
            let count = cursor.read_u16()? as usize;
            let mut map = Vec::with_capacity(count);
            for _ in 0..count {
                let from = F2Dot14::from_bits(cursor.read_i16()?).to_f32() as f64;
                let to = F2Dot14::from_bits(cursor.read_i16()?).to_f32() as f64;
                map.push((from, to));
            }
            maps.push(map);
        }
        Ok(Self { maps })
    }

    /// Applies the piecewise linear segment map for one axis.
    pub(crate) fn apply(&self, axis_index: usize, coord: f64) -> f64 {
        let Some(map) = self.maps.get(axis_index) else {
            return coord;
        };
        if map.len() < 2 {
            return coord;
        }
        let mut prev = (0.0, 0.0);
        for (i, &(from, to)) in map.iter().enumerate() {
            if from == coord {
                return to;
            }
            if from > coord {
                if i == 0 {
                    return coord;
                }
                let (prev_from, prev_to) = prev;
                return prev_to + (to - prev_to) * (coord - prev_from) / (from - prev_from);
            }
            prev = (from, to);
        }
        coord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wght() -> Axis {
        Axis {
            tag: Tag::new(b"wght"),
            min: 100.0,
            default: 400.0,
            max: 900.0,
            hidden: false,
            name_id: NameId::new(256),
        }
    }

    #[test]
    fn normalize_anchors() {
        let axis = wght();
        assert_eq!(axis.normalize(400.0), 0.0);
        assert_eq!(axis.normalize(100.0), -1.0);
        assert_eq!(axis.normalize(900.0), 1.0);
    }

    #[test]
    fn normalize_interpolates_each_side() {
        let axis = wght();
        assert_eq!(axis.normalize(650.0), 0.5);
        assert_eq!(axis.normalize(250.0), -0.5);
    }

    #[test]
    fn normalize_clamps() {
        let axis = wght();
        assert_eq!(axis.normalize(9999.0), 1.0);
        assert_eq!(axis.normalize(-5.0), -1.0);
    }

    #[test]
    fn normalize_stays_in_bounds() {
        let axis = wght();
        for v in [-1000.0, 0.0, 100.0, 123.4, 400.0, 555.5, 900.0, 2000.0] {
            let f = axis.normalize(v);
            assert!((-1.0..=1.0).contains(&f), "normalize({v}) = {f}");
        }
    }

    #[test]
    fn degenerate_ranges() {
        let axis = Axis {
            tag: Tag::new(b"TEST"),
            min: 400.0,
            default: 400.0,
            max: 400.0,
            hidden: false,
            name_id: NameId::new(256),
        };
        assert_eq!(axis.normalize(400.0), 0.0);
        assert_eq!(axis.normalize(1000.0), 0.0);
    }

    #[test]
    fn normalizer_ignores_unknown_and_flags_clamping() {
        let normalizer = Normalizer::new(vec![wght()], None);
        let mut diags = Vec::new();
        let loc = normalizer.normalize(
            &[AxisLocation::new("zzzz", 1.0), AxisLocation::new("wght", 950.0)],
            &mut diags,
        );
        assert_eq!(loc.coords(), &[F2Dot14::from_f32(1.0)]);
        assert_eq!(diags.len(), 1);
        assert!(matches!(
            diags[0],
            Diagnostic::OutOfRangeCoordinate { value, .. } if value == 950.0
        ));
    }

    #[test]
    fn unknown_tag_detection() {
        let normalizer = Normalizer::new(vec![wght()], None);
        assert_eq!(
            normalizer.unknown_tag(&[AxisLocation::new("slnt", 0.0)]),
            Some(Tag::new(b"slnt"))
        );
        assert_eq!(normalizer.unknown_tag(&[AxisLocation::new("wght", 0.0)]), None);
    }

    #[test]
    fn segment_map_remaps_between_anchors() {
        // from/to pairs: (-1,-1) (0,0) (0.5,0.25) (1,1)
        let maps = SegmentMaps {
            maps: vec![vec![(-1.0, -1.0), (0.0, 0.0), (0.5, 0.25), (1.0, 1.0)]],
        };
        assert_eq!(maps.apply(0, 0.5), 0.25);
        assert_eq!(maps.apply(0, 0.0), 0.0);
        // halfway between 0.5 and 1.0 maps halfway between 0.25 and 1.0
        assert!((maps.apply(0, 0.75) - 0.625).abs() < 1e-9);
    }

    #[test]
    fn segment_map_parse_round_trip() {
        // avar with one axis and the identity-breaking map above
        let mut data = vec![0, 1, 0, 0, 0, 0, 0, 1, 0, 4];
        for (from, to) in [(-1.0f32, -1.0f32), (0.0, 0.0), (0.5, 0.25), (1.0, 1.0)] {
            data.extend_from_slice(&F2Dot14::from_f32(from).to_bits().to_be_bytes());
            data.extend_from_slice(&F2Dot14::from_f32(to).to_bits().to_be_bytes());
        }
        let maps = SegmentMaps::parse(&data, 1).unwrap();
        assert_eq!(maps.apply(0, 0.5), 0.25);
    }
}
