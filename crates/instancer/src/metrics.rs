//! Metric deltas from HVAR, VVAR and MVAR, and the static metric tables
//! rebuilt from them.

use font_types::Tag;
use read_fonts::tables::{hhea::Hhea, os2::Os2, post::Post, vhea::Vhea};
use write_fonts::{
    from_obj::ToOwnedTable,
    tables::{
        hhea::Hhea as WriteHhea,
        hmtx::{Hmtx as WriteHmtx, LongMetric},
        os2::Os2 as WriteOs2,
        post::Post as WritePost,
        vhea::Vhea as WriteVhea,
        vmtx::Vmtx as WriteVmtx,
    },
};

use crate::{
    axis::AxisLocation,
    glyf::FontBounds,
    ivs::{DeltaSetIndexMap, ItemVariationStore},
    reader::{Cursor, UnexpectedEnd},
};

/// MVAR value tags for the metrics rewritten here.
pub(crate) mod tags {
    use font_types::Tag;

    pub const HASC: Tag = Tag::new(b"hasc");
    pub const HDSC: Tag = Tag::new(b"hdsc");
    pub const HLGP: Tag = Tag::new(b"hlgp");
    pub const HCRS: Tag = Tag::new(b"hcrs");
    pub const HCRN: Tag = Tag::new(b"hcrn");
    pub const HCOF: Tag = Tag::new(b"hcof");
    pub const VASC: Tag = Tag::new(b"vasc");
    pub const VDSC: Tag = Tag::new(b"vdsc");
    pub const VLGP: Tag = Tag::new(b"vlgp");
    pub const VCRS: Tag = Tag::new(b"vcrs");
    pub const VCRN: Tag = Tag::new(b"vcrn");
    pub const VCOF: Tag = Tag::new(b"vcof");
    pub const STRS: Tag = Tag::new(b"strs");
    pub const STRO: Tag = Tag::new(b"stro");
    pub const SBXS: Tag = Tag::new(b"sbxs");
    pub const SBYS: Tag = Tag::new(b"sbys");
    pub const SBXO: Tag = Tag::new(b"sbxo");
    pub const SBYO: Tag = Tag::new(b"sbyo");
    pub const SPXS: Tag = Tag::new(b"spxs");
    pub const SPYS: Tag = Tag::new(b"spys");
    pub const SPXO: Tag = Tag::new(b"spxo");
    pub const SPYO: Tag = Tag::new(b"spyo");
    pub const XHGT: Tag = Tag::new(b"xhgt");
    pub const CPHT: Tag = Tag::new(b"cpht");
    pub const UNDS: Tag = Tag::new(b"unds");
    pub const UNDO: Tag = Tag::new(b"undo");
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Per-glyph metric variations: the HVAR layout, which VVAR shares with one
/// extra (ignored) vertical-origin mapping.
#[derive(Debug, Clone, Default)]
pub(crate) struct MetricVariations {
    pub store: ItemVariationStore,
    advance_map: Option<DeltaSetIndexMap>,
    leading_map: Option<DeltaSetIndexMap>,
    trailing_map: Option<DeltaSetIndexMap>,
}

impl MetricVariations {
    pub(crate) fn parse_hvar(data: &[u8]) -> Result<Self, UnexpectedEnd> {
        Self::parse(data, false)
    }

    pub(crate) fn parse_vvar(data: &[u8]) -> Result<Self, UnexpectedEnd> {
        Self::parse(data, true)
    }

    fn parse(data: &[u8], vertical: bool) -> Result<Self, UnexpectedEnd> {
        let mut cursor = Cursor::new(data);
        let major = cursor.read_u16()?;
        if major != 1 {
            return Err(UnexpectedEnd);
        }
        let _minor = cursor.read_u16()?;
        let store_offset = cursor.read_u32()? as usize;
        let advance_offset = cursor.read_u32()? as usize;
        let leading_offset = cursor.read_u32()? as usize;
        let trailing_offset = cursor.read_u32()? as usize;
        if vertical {
            // vertical-origin mapping; origin deltas are not rewritten
            let _vorg_offset = cursor.read_u32()?;
        }

        let store = ItemVariationStore::parse(data.get(store_offset..).ok_or(UnexpectedEnd)?)?;
        let map_at = |offset: usize| -> Result<Option<DeltaSetIndexMap>, UnexpectedEnd> {
            if offset == 0 {
                return Ok(None);
            }
            DeltaSetIndexMap::parse(data.get(offset..).ok_or(UnexpectedEnd)?).map(Some)
        };

        Ok(Self {
            store,
            advance_map: map_at(advance_offset)?,
            leading_map: map_at(leading_offset)?,
            trailing_map: map_at(trailing_offset)?,
        })
    }

    /// The advance delta for a glyph. Without a mapping, glyph id indexes
    /// the first subtable directly.
    pub(crate) fn advance_delta(&self, gid: u32, scalars: &[f64]) -> f64 {
        let (outer, inner) = match &self.advance_map {
            Some(map) => match map.get(gid) {
                Some(entry) => entry,
                None => return 0.0,
            },
            None => (0, gid as u16),
        };
        self.store.delta(outer, inner, scalars)
    }

    /// The side-bearing delta on the leading edge (lsb / tsb), present only
    /// when the font carries the optional mapping.
    pub(crate) fn leading_delta(&self, gid: u32, scalars: &[f64]) -> Option<f64> {
        let (outer, inner) = self.leading_map.as_ref()?.get(gid)?;
        Some(self.store.delta(outer, inner, scalars))
    }

    /// The trailing-edge (rsb / bsb) delta, when its mapping is present.
    pub(crate) fn trailing_delta(&self, gid: u32, scalars: &[f64]) -> Option<f64> {
        let (outer, inner) = self.trailing_map.as_ref()?.get(gid)?;
        Some(self.store.delta(outer, inner, scalars))
    }
}

/// The MVAR table: font-wide metric deltas addressed by 4-byte tags.
#[derive(Debug, Clone, Default)]
pub(crate) struct Mvar {
    pub store: ItemVariationStore,
    records: Vec<(Tag, u16, u16)>,
}

impl Mvar {
    pub(crate) fn parse(data: &[u8]) -> Result<Self, UnexpectedEnd> {
        let mut cursor = Cursor::new(data);
        let major = cursor.read_u16()?;
        if major != 1 {
            return Err(UnexpectedEnd);
        }
        let _minor = cursor.read_u16()?;
        let _reserved = cursor.read_u16()?;
        let record_size = cursor.read_u16()? as usize;
        let record_count = cursor.read_u16()? as usize;
        let store_offset = cursor.read_u16()? as usize;
        if record_size < 8 {
            return Err(UnexpectedEnd);
        }

        let mut records = Vec::with_capacity(record_count);
        for _ in 0..record_count {
            let mut record = Cursor::new(cursor.read_slice(record_size)?);
            let tag_bytes = record.read_slice(4)?;
            let tag = Tag::new(&[tag_bytes[0], tag_bytes[1], tag_bytes[2], tag_bytes[3]]);
            let outer = record.read_u16()?;
            let inner = record.read_u16()?;
            records.push((tag, outer, inner));
        }

        let store = if store_offset == 0 {
            ItemVariationStore::default()
        } else {
            ItemVariationStore::parse(data.get(store_offset..).ok_or(UnexpectedEnd)?)?
        };

        Ok(Self { store, records })
    }

    fn delta(&self, tag: Tag, scalars: &[f64]) -> f64 {
        match self.records.iter().find(|(t, _, _)| *t == tag) {
            Some((_, outer, inner)) => self.store.delta(*outer, *inner, scalars),
            None => 0.0,
        }
    }
}

/// An MVAR delta rounded to font units; zero when the table is absent or
/// the tag unmapped.
pub(crate) fn mvar_delta(ctx: Option<(&Mvar, &[f64])>, tag: Tag) -> i32 {
    match ctx {
        Some((mvar, scalars)) => mvar.delta(tag, scalars).round_ties_even() as i32,
        None => 0,
    }
}

/// Rebuilds hmtx, trimming the trailing run of equal advances into
/// bare side bearings. Returns the table and the long-metric count that
/// must be written back into hhea.
pub(crate) fn build_hmtx(advances: &[u16], side_bearings: &[i16]) -> (WriteHmtx, u16) {
    let mut num_long = advances.len();
    while num_long > 1 && advances[num_long - 1] == advances[num_long - 2] {
        num_long -= 1;
    }

    let mut h_metrics = Vec::with_capacity(num_long);
    let mut left_side_bearings = Vec::with_capacity(advances.len() - num_long);
    for gid in 0..advances.len() {
        if gid < num_long {
            h_metrics.push(LongMetric {
                advance: advances[gid],
                side_bearing: side_bearings[gid],
            });
        } else {
            left_side_bearings.push(side_bearings[gid]);
        }
    }

    (
        WriteHmtx {
            h_metrics,
            left_side_bearings,
        },
        num_long as u16,
    )
}

/// vmtx gets the same trailing-run treatment as hmtx.
pub(crate) fn build_vmtx(advances: &[u16], side_bearings: &[i16]) -> (WriteVmtx, u16) {
    let mut num_long = advances.len();
    while num_long > 1 && advances[num_long - 1] == advances[num_long - 2] {
        num_long -= 1;
    }

    let mut v_metrics = Vec::with_capacity(num_long);
    let mut top_side_bearings = Vec::with_capacity(advances.len() - num_long);
    for gid in 0..advances.len() {
        if gid < num_long {
            v_metrics.push(write_fonts::tables::vmtx::LongMetric {
                advance: advances[gid],
                side_bearing: side_bearings[gid],
            });
        } else {
            top_side_bearings.push(side_bearings[gid]);
        }
    }

    (
        WriteVmtx {
            v_metrics,
            top_side_bearings,
        },
        num_long as u16,
    )
}

pub(crate) fn build_hhea(
    original: &Hhea,
    bounds: &FontBounds,
    mvar: Option<(&Mvar, &[f64])>,
    num_h_metrics: u16,
) -> WriteHhea {
    WriteHhea::new(
        clamp_i16(i32::from(original.ascender().to_i16()) + mvar_delta(mvar, tags::HASC)).into(),
        clamp_i16(i32::from(original.descender().to_i16()) + mvar_delta(mvar, tags::HDSC)).into(),
        clamp_i16(i32::from(original.line_gap().to_i16()) + mvar_delta(mvar, tags::HLGP)).into(),
        bounds.advance_width_max.into(),
        bounds.min_left_side_bearing.into(),
        bounds.min_right_side_bearing.into(),
        bounds.x_max_extent.into(),
        clamp_i16(i32::from(original.caret_slope_rise()) + mvar_delta(mvar, tags::HCRS)),
        clamp_i16(i32::from(original.caret_slope_run()) + mvar_delta(mvar, tags::HCRN)),
        clamp_i16(i32::from(original.caret_offset()) + mvar_delta(mvar, tags::HCOF)),
        num_h_metrics,
    )
}

pub(crate) fn build_vhea(
    original: &Vhea,
    mvar: Option<(&Mvar, &[f64])>,
    num_v_metrics: u16,
) -> WriteVhea {
    WriteVhea {
        ascender: font_types::FWord::new(clamp_i16(
            i32::from(original.ascender().to_i16()) + mvar_delta(mvar, tags::VASC),
        )),
        descender: font_types::FWord::new(clamp_i16(
            i32::from(original.descender().to_i16()) + mvar_delta(mvar, tags::VDSC),
        )),
        line_gap: font_types::FWord::new(clamp_i16(
            i32::from(original.line_gap().to_i16()) + mvar_delta(mvar, tags::VLGP),
        )),
        advance_height_max: original.advance_height_max(),
        min_top_side_bearing: original.min_top_side_bearing(),
        min_bottom_side_bearing: original.min_bottom_side_bearing(),
        y_max_extent: original.y_max_extent(),
        caret_slope_rise: clamp_i16(
            i32::from(original.caret_slope_rise()) + mvar_delta(mvar, tags::VCRS),
        ),
        caret_slope_run: clamp_i16(
            i32::from(original.caret_slope_run()) + mvar_delta(mvar, tags::VCRN),
        ),
        caret_offset: clamp_i16(i32::from(original.caret_offset()) + mvar_delta(mvar, tags::VCOF)),
        number_of_long_ver_metrics: num_v_metrics,
    }
}

/// Converts a wdth axis percentage to the nine-step usWidthClass scale.
fn wdth_to_width_class(wdth: f64) -> u16 {
    match wdth {
        w if w <= 56.25 => 1,
        w if w <= 68.75 => 2,
        w if w <= 81.25 => 3,
        w if w <= 93.75 => 4,
        w if w <= 106.25 => 5,
        w if w <= 118.75 => 6,
        w if w <= 137.5 => 7,
        w if w <= 175.0 => 8,
        _ => 9,
    }
}

pub(crate) fn build_os2(
    original: &Os2,
    mvar: Option<(&Mvar, &[f64])>,
    location: &[AxisLocation],
) -> WriteOs2 {
    let mut os2: WriteOs2 = original.to_owned_table();

    if let Some(wght) = location.iter().find(|loc| loc.tag == Tag::new(b"wght")) {
        os2.us_weight_class = wght.value.round() as u16;
    }
    if let Some(wdth) = location.iter().find(|loc| loc.tag == Tag::new(b"wdth")) {
        os2.us_width_class = wdth_to_width_class(wdth.value);
    }

    os2.y_strikeout_size =
        clamp_i16(i32::from(original.y_strikeout_size()) + mvar_delta(mvar, tags::STRS));
    os2.y_strikeout_position =
        clamp_i16(i32::from(original.y_strikeout_position()) + mvar_delta(mvar, tags::STRO));
    os2.s_typo_ascender =
        clamp_i16(i32::from(original.s_typo_ascender()) + mvar_delta(mvar, tags::HASC));
    os2.s_typo_descender =
        clamp_i16(i32::from(original.s_typo_descender()) + mvar_delta(mvar, tags::HDSC));
    os2.s_typo_line_gap =
        clamp_i16(i32::from(original.s_typo_line_gap()) + mvar_delta(mvar, tags::HLGP));

    os2.y_subscript_x_offset =
        clamp_i16(i32::from(original.y_subscript_x_offset()) + mvar_delta(mvar, tags::SBXO));
    os2.y_subscript_y_offset =
        clamp_i16(i32::from(original.y_subscript_y_offset()) + mvar_delta(mvar, tags::SBYO));
    os2.y_subscript_x_size =
        clamp_i16(i32::from(original.y_subscript_x_size()) + mvar_delta(mvar, tags::SBXS));
    os2.y_subscript_y_size =
        clamp_i16(i32::from(original.y_subscript_y_size()) + mvar_delta(mvar, tags::SBYS));

    os2.y_superscript_x_offset =
        clamp_i16(i32::from(original.y_superscript_x_offset()) + mvar_delta(mvar, tags::SPXO));
    os2.y_superscript_y_offset =
        clamp_i16(i32::from(original.y_superscript_y_offset()) + mvar_delta(mvar, tags::SPYO));
    os2.y_superscript_x_size =
        clamp_i16(i32::from(original.y_superscript_x_size()) + mvar_delta(mvar, tags::SPXS));
    os2.y_superscript_y_size =
        clamp_i16(i32::from(original.y_superscript_y_size()) + mvar_delta(mvar, tags::SPYS));

    if let Some(sx_height) = original.sx_height() {
        os2.sx_height = Some(clamp_i16(i32::from(sx_height) + mvar_delta(mvar, tags::XHGT)));
    }
    if let Some(s_cap_height) = original.s_cap_height() {
        os2.s_cap_height = Some(clamp_i16(
            i32::from(s_cap_height) + mvar_delta(mvar, tags::CPHT),
        ));
    }

    os2
}

pub(crate) fn build_post(original: &Post, mvar: Option<(&Mvar, &[f64])>) -> WritePost {
    let mut post: WritePost = original.to_owned_table();
    post.underline_position = clamp_i16(
        i32::from(original.underline_position().to_i16()) + mvar_delta(mvar, tags::UNDO),
    )
    .into();
    post.underline_thickness = clamp_i16(
        i32::from(original.underline_thickness().to_i16()) + mvar_delta(mvar, tags::UNDS),
    )
    .into();
    post
}
