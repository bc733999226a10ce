//! Building static instances.
//!
//! The evaluator binds a variable font once, then produces one instance
//! bundle per design-space point: outline tables rewritten from gvar or
//! CFF2, metric tables rewritten from HVAR/VVAR/MVAR, everything else
//! copied through, and every variation-only table removed.

use std::collections::BTreeMap;

use font_types::{Fixed, Tag};
use log::debug;
use read_fonts::{
    FontRef, TableProvider,
    tables::{fvar::Fvar, glyf::Glyph},
    types::GlyphId,
};
use write_fonts::{
    FontBuilder, FontWrite, dump_table, validate::Validate,
    tables::{
        glyf::{GlyfLocaBuilder, Glyph as WriteGlyph},
        head::Head as WriteHead,
        loca::LocaFormat,
        stat::{AxisRecord, AxisValue, AxisValueTableFlags, Stat},
    },
    types::NameId,
};

use crate::{
    axis::{Axis, AxisLocation, NormalizedLocation, Normalizer},
    binding::{FontBinding, NamedInstance},
    cff2::CFF2,
    error::{Diagnostic, Error, Result},
    glyf::{self, FontBounds, PHANTOM_POINTS},
    gvar::GVAR,
    metrics,
};

/// Tables that only describe variation and never survive instancing.
const VARIATION_TABLES: [Tag; 8] = [
    Tag::new(b"fvar"),
    Tag::new(b"gvar"),
    Tag::new(b"avar"),
    Tag::new(b"cvar"),
    Tag::new(b"HVAR"),
    Tag::new(b"MVAR"),
    Tag::new(b"VVAR"),
    Tag::new(b"STAT"),
];

const REMOVED_TABLES: [Tag; 1] = [Tag::new(b"DSIG")];

/// Serializes one rebuilt table, tagging failures with the table they
/// belong to.
fn dump<T: FontWrite + Validate>(tag: Tag, table: &T) -> Result<Vec<u8>> {
    dump_table(table).map_err(|source| Error::TableRewrite {
        table: tag,
        reason: source.to_string(),
    })
}

/// The static tables produced for one design-space point: a mapping from
/// table tag to rebuilt (or copied) bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceBundle {
    tables: BTreeMap<Tag, Vec<u8>>,
}

impl InstanceBundle {
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.tables.keys().copied()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.tables.contains_key(&tag)
    }

    pub fn table(&self, tag: Tag) -> Option<&[u8]> {
        self.tables.get(&tag).map(|data| data.as_slice())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Serializes the bundle as an sfnt: directory, per-table checksums and
    /// the head checksum adjustment.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut builder = FontBuilder::new();
        for (tag, data) in &self.tables {
            builder.add_raw(*tag, data.as_slice());
        }
        Ok(builder.build())
    }
}

/// One evaluated instance: the resolved location, the table bundle, and
/// every recoverable condition hit along the way.
#[derive(Debug, Clone)]
pub struct Instance {
    pub location: Vec<AxisLocation>,
    pub normalized: NormalizedLocation,
    pub bundle: InstanceBundle,
    pub diagnostics: Vec<Diagnostic>,
}

/// A variable font bound for evaluation.
///
/// Binding parses the axes, the variation stores and the outline format
/// once; every call to [`Evaluator::evaluate`] then works from immutable
/// state, so one evaluator can serve many threads.
pub struct Evaluator<'a> {
    binding: FontBinding<'a>,
    normalizer: Normalizer,
    named: Vec<NamedInstance>,
}

impl<'a> Evaluator<'a> {
    /// Binds a variable font. Fails if the font has no fvar axes or a
    /// variation table is malformed.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let font = FontRef::new(data)?;
        let binding = FontBinding::new(font)?;
        let axes = binding.axes()?;
        if axes.is_empty() {
            return Err(Error::NotVariableFont);
        }
        let segment_maps = binding.segment_maps(axes.len());
        let named = binding.named_instances(&axes);
        let normalizer = Normalizer::new(axes, segment_maps);
        Ok(Self {
            binding,
            normalizer,
            named,
        })
    }

    pub fn axes(&self) -> &[Axis] {
        self.normalizer.axes()
    }

    pub fn named_instances(&self) -> &[NamedInstance] {
        &self.named
    }

    pub(crate) fn binding(&self) -> &FontBinding<'a> {
        &self.binding
    }

    /// Normalizes a user location. Unknown tags are ignored here; the
    /// strict check happens in [`Self::evaluate`].
    pub fn normalize(&self, location: &[AxisLocation]) -> (NormalizedLocation, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let normalized = self.normalizer.normalize(location, &mut diagnostics);
        (normalized, diagnostics)
    }

    /// Evaluates a static instance at the given user location.
    pub fn evaluate(&self, location: &[AxisLocation]) -> Result<Instance> {
        if let Some(tag) = self.normalizer.unknown_tag(location) {
            return Err(Error::UnknownAxis(tag));
        }
        for loc in location {
            if !loc.value.is_finite() {
                return Err(Error::InvalidCoordinate {
                    tag: loc.tag,
                    value: loc.value,
                });
            }
        }

        let mut diagnostics = Vec::new();
        let normalized = self.normalizer.normalize(location, &mut diagnostics);
        let coords = normalized.to_f64();
        debug!("evaluating instance at {normalized:?}");

        let tables = if self.binding.has_glyf {
            self.build_truetype(&coords, location, &mut diagnostics)?
        } else if self.binding.cff2.is_some() {
            self.build_cff2(&coords, location, &mut diagnostics)?
        } else {
            return Err(Error::MissingVariationTable(GVAR));
        };

        Ok(Instance {
            location: location.to_vec(),
            normalized,
            bundle: InstanceBundle { tables },
            diagnostics,
        })
    }

    /// Evaluates the named instance at `index` in fvar order.
    pub fn evaluate_named(&self, index: usize) -> Result<Instance> {
        let named = self
            .named
            .get(index)
            .ok_or(Error::NoSuchInstance(index))?
            .clone();
        self.evaluate(&named.location)
    }

    fn build_truetype(
        &self,
        coords: &[f64],
        location: &[AxisLocation],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<BTreeMap<Tag, Vec<u8>>> {
        let font = &self.binding.font;
        let gvar = self
            .binding
            .gvar
            .as_ref()
            .ok_or(Error::MissingVariationTable(GVAR))?;
        let glyf = font.glyf()?;
        let loca = font.loca(None)?;
        let num_glyphs = font.maxp()?.num_glyphs() as usize;
        let hmtx = font.hmtx()?;

        let shared_scalars = gvar.shared_scalars(coords);
        let hvar_scalars = self
            .binding
            .hvar
            .as_ref()
            .map(|hvar| hvar.store.scalars(coords));
        let mvar_scalars = self
            .binding
            .mvar
            .as_ref()
            .map(|mvar| mvar.store.scalars(coords));
        let mvar_ctx = self
            .binding
            .mvar
            .as_ref()
            .zip(mvar_scalars.as_deref());

        let mut glyphs: Vec<WriteGlyph> = Vec::with_capacity(num_glyphs);
        let mut bboxes = Vec::with_capacity(num_glyphs);
        let mut advances: Vec<u16> = Vec::with_capacity(num_glyphs);
        let mut fallback_lsbs: Vec<i16> = Vec::with_capacity(num_glyphs);

        for gid in 0..num_glyphs {
            let glyph_id = GlyphId::new(gid as u32);
            let glyph = match loca.get_glyf(glyph_id, &glyf) {
                Ok(glyph) => glyph,
                Err(_) => {
                    diagnostics.push(Diagnostic::MissingGlyph { glyph: glyph_id });
                    None
                }
            };
            let outline_points = match &glyph {
                Some(Glyph::Simple(simple)) => simple.num_points(),
                Some(Glyph::Composite(composite)) => composite.components().count(),
                None => 0,
            };

            let tuples = gvar.decode_glyph(glyph_id, outline_points + PHANTOM_POINTS, diagnostics);
            let scalars: Vec<f64> = tuples
                .iter()
                .map(|tuple| match tuple.shared_peak_index {
                    Some(index) => shared_scalars.get(index as usize).copied().unwrap_or(0.0),
                    None => tuple.region.scalar_at(coords),
                })
                .collect();

            let varied = match &glyph {
                Some(Glyph::Simple(simple)) => glyf::apply_simple(simple, &tuples, &scalars),
                Some(Glyph::Composite(composite)) => {
                    glyf::apply_composite(composite, &tuples, &scalars)
                }
                None => glyf::apply_empty(&tuples, &scalars),
            };

            // HVAR wins over phantom points when both are present.
            let advance_delta = match (&self.binding.hvar, &hvar_scalars) {
                (Some(hvar), Some(scalars)) => hvar
                    .advance_delta(glyph_id.to_u32(), scalars)
                    .round_ties_even() as i32,
                _ => varied.advance_delta(),
            };
            let orig_advance = hmtx.advance(glyph_id).unwrap_or(0);
            advances.push((i32::from(orig_advance) + advance_delta).max(0) as u16);
            fallback_lsbs.push(hmtx.side_bearing(glyph_id).unwrap_or(0));

            bboxes.push(varied.bbox);
            glyphs.push(varied.glyph);
        }

        glyf::recompute_composite_bboxes(&mut glyphs, &mut bboxes);

        let mut glyf_builder = GlyfLocaBuilder::new();
        let mut bounds = FontBounds::new();
        let mut lsbs: Vec<i16> = Vec::with_capacity(num_glyphs);
        for (i, glyph) in glyphs.iter().enumerate() {
            // LSB equals the varied glyph's xMin.
            let lsb = glyf::glyph_x_min(glyph).unwrap_or(fallback_lsbs[i]);
            lsbs.push(lsb);
            bounds.update(glyph, advances[i]);
            glyf_builder.add_glyph(glyph)?;
        }
        bounds.finalize();

        let (new_glyf, new_loca, loca_format) = glyf_builder.build();
        let (new_hmtx, num_h_metrics) = metrics::build_hmtx(&advances, &lsbs);

        let mut tables = BTreeMap::new();
        tables.insert(Tag::new(b"glyf"), dump(Tag::new(b"glyf"), &new_glyf)?);
        tables.insert(Tag::new(b"loca"), dump(Tag::new(b"loca"), &new_loca)?);
        tables.insert(Tag::new(b"hmtx"), dump(Tag::new(b"hmtx"), &new_hmtx)?);

        if let Ok(head) = font.head() {
            let new_head = WriteHead::new(
                head.font_revision(),
                head.checksum_adjustment(),
                head.flags(),
                head.units_per_em(),
                head.created(),
                head.modified(),
                bounds.x_min,
                bounds.y_min,
                bounds.x_max,
                bounds.y_max,
                head.mac_style(),
                head.lowest_rec_ppem(),
                match loca_format {
                    LocaFormat::Short => 0,
                    LocaFormat::Long => 1,
                },
            );
            tables.insert(Tag::new(b"head"), dump(Tag::new(b"head"), &new_head)?);
        }

        if let Ok(hhea) = font.hhea() {
            let new_hhea = metrics::build_hhea(&hhea, &bounds, mvar_ctx, num_h_metrics);
            tables.insert(Tag::new(b"hhea"), dump(Tag::new(b"hhea"), &new_hhea)?);
        }
        if let Ok(os2) = font.os2() {
            let new_os2 = metrics::build_os2(&os2, mvar_ctx, location);
            tables.insert(Tag::new(b"OS/2"), dump(Tag::new(b"OS/2"), &new_os2)?);
        }
        if let Ok(post) = font.post() {
            let new_post = metrics::build_post(&post, mvar_ctx);
            tables.insert(Tag::new(b"post"), dump(Tag::new(b"post"), &new_post)?);
        }

        self.vertical_tables(coords, mvar_ctx, &mut tables)?;

        if let Ok(fvar) = font.fvar() {
            let stat = build_stat(&fvar, location);
            tables.insert(Tag::new(b"STAT"), dump(Tag::new(b"STAT"), &stat)?);
        }

        self.copy_remaining(&mut tables, &[]);
        Ok(tables)
    }

    fn build_cff2(
        &self,
        coords: &[f64],
        location: &[AxisLocation],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<BTreeMap<Tag, Vec<u8>>> {
        let font = &self.binding.font;
        let Some(cff2) = self.binding.cff2.as_ref() else {
            return Err(Error::MissingVariationTable(CFF2));
        };
        let num_glyphs = font.maxp()?.num_glyphs() as usize;
        let hmtx = font.hmtx()?;
        let hhea = font.hhea()?;
        let head = font.head()?;

        let hvar_scalars = self
            .binding
            .hvar
            .as_ref()
            .map(|hvar| hvar.store.scalars(coords));
        let mvar_scalars = self
            .binding
            .mvar
            .as_ref()
            .map(|mvar| mvar.store.scalars(coords));
        let mvar_ctx = self
            .binding
            .mvar
            .as_ref()
            .zip(mvar_scalars.as_deref());

        let mut advances: Vec<u16> = Vec::with_capacity(num_glyphs);
        let mut lsbs: Vec<i16> = Vec::with_capacity(num_glyphs);
        for gid in 0..num_glyphs {
            let glyph_id = GlyphId::new(gid as u32);
            let orig_advance = hmtx.advance(glyph_id).unwrap_or(0);
            let orig_lsb = hmtx.side_bearing(glyph_id).unwrap_or(0);
            let (advance_delta, lsb_delta) = match (&self.binding.hvar, &hvar_scalars) {
                (Some(hvar), Some(scalars)) => (
                    hvar.advance_delta(glyph_id.to_u32(), scalars)
                        .round_ties_even() as i32,
                    hvar.leading_delta(glyph_id.to_u32(), scalars)
                        .map(|delta| delta.round_ties_even() as i32)
                        .unwrap_or(0),
                ),
                _ => (0, 0),
            };
            advances.push((i32::from(orig_advance) + advance_delta).max(0) as u16);
            lsbs.push((i32::from(orig_lsb) + lsb_delta).clamp(i16::MIN as i32, i16::MAX as i32)
                as i16);
        }

        let font_name = self
            .binding
            .postscript_name()
            .unwrap_or_else(|| "Instance".to_string());
        let bbox = [
            i32::from(head.x_min()),
            i32::from(head.y_min()),
            i32::from(head.x_max()),
            i32::from(head.y_max()),
        ];
        let cff = cff2.instantiate(
            coords,
            &advances,
            &font_name,
            head.units_per_em(),
            bbox,
            diagnostics,
        )?;

        let mut tables = BTreeMap::new();
        tables.insert(Tag::new(b"CFF "), cff);

        let (new_hmtx, num_h_metrics) = metrics::build_hmtx(&advances, &lsbs);
        tables.insert(Tag::new(b"hmtx"), dump(Tag::new(b"hmtx"), &new_hmtx)?);

        // Outline bounds are not recomputed on this path; carry the source
        // extents and refresh only what the advances determine.
        let mut bounds = FontBounds {
            x_min: head.x_min(),
            x_max: head.x_max(),
            y_min: head.y_min(),
            y_max: head.y_max(),
            min_left_side_bearing: hhea.min_left_side_bearing().to_i16(),
            min_right_side_bearing: hhea.min_right_side_bearing().to_i16(),
            x_max_extent: hhea.x_max_extent().to_i16(),
            advance_width_max: 0,
        };
        bounds.advance_width_max = advances.iter().copied().max().unwrap_or(0);

        let new_hhea = metrics::build_hhea(&hhea, &bounds, mvar_ctx, num_h_metrics);
        tables.insert(Tag::new(b"hhea"), dump(Tag::new(b"hhea"), &new_hhea)?);

        if let Ok(os2) = font.os2() {
            tables.insert(
                Tag::new(b"OS/2"),
                dump(Tag::new(b"OS/2"), &metrics::build_os2(&os2, mvar_ctx, location))?,
            );
        }
        if let Ok(post) = font.post() {
            tables.insert(
                Tag::new(b"post"),
                dump(Tag::new(b"post"), &metrics::build_post(&post, mvar_ctx))?,
            );
        }

        self.vertical_tables(coords, mvar_ctx, &mut tables)?;

        if let Ok(fvar) = font.fvar() {
            let stat = build_stat(&fvar, location);
            tables.insert(Tag::new(b"STAT"), dump(Tag::new(b"STAT"), &stat)?);
        }

        self.copy_remaining(&mut tables, &[CFF2]);
        Ok(tables)
    }

    /// Rebuilds vmtx/vhea with VVAR deltas when the font carries them.
    fn vertical_tables(
        &self,
        coords: &[f64],
        mvar_ctx: Option<(&metrics::Mvar, &[f64])>,
        tables: &mut BTreeMap<Tag, Vec<u8>>,
    ) -> Result<()> {
        if !self.binding.has_vmtx {
            return Ok(());
        }
        let font = &self.binding.font;
        let vmtx = font.vmtx()?;
        let vhea = font.vhea()?;
        let num_glyphs = font.maxp()?.num_glyphs() as usize;
        let num_v_metrics = vhea.number_of_long_ver_metrics() as usize;

        let vvar_scalars = self
            .binding
            .vvar
            .as_ref()
            .map(|vvar| vvar.store.scalars(coords));

        let mut advances = Vec::with_capacity(num_glyphs);
        let mut bearings = Vec::with_capacity(num_glyphs);
        for gid in 0..num_glyphs {
            let (orig_advance, orig_tsb) = if gid < num_v_metrics {
                match vmtx.v_metrics().get(gid) {
                    Some(metric) => (metric.advance.get(), metric.side_bearing.get()),
                    None => (0, 0),
                }
            } else {
                let last_advance = vmtx
                    .v_metrics()
                    .get(num_v_metrics.saturating_sub(1))
                    .map(|metric| metric.advance.get())
                    .unwrap_or(0);
                let tsb = vmtx
                    .top_side_bearings()
                    .get(gid - num_v_metrics)
                    .map(|bearing| bearing.get())
                    .unwrap_or(0);
                (last_advance, tsb)
            };

            let (advance_delta, tsb_delta) = match (&self.binding.vvar, &vvar_scalars) {
                (Some(vvar), Some(scalars)) => (
                    vvar.advance_delta(gid as u32, scalars).round_ties_even() as i32,
                    vvar.leading_delta(gid as u32, scalars)
                        .map(|delta| delta.round_ties_even() as i32)
                        .unwrap_or(0),
                ),
                _ => (0, 0),
            };
            advances.push((i32::from(orig_advance) + advance_delta).max(0) as u16);
            bearings.push(
                (i32::from(orig_tsb) + tsb_delta).clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            );
        }

        let (new_vmtx, num_long) = metrics::build_vmtx(&advances, &bearings);
        tables.insert(Tag::new(b"vmtx"), dump(Tag::new(b"vmtx"), &new_vmtx)?);
        tables.insert(
            Tag::new(b"vhea"),
            dump(Tag::new(b"vhea"), &metrics::build_vhea(&vhea, mvar_ctx, num_long))?,
        );
        Ok(())
    }

    /// Copies every remaining table through unchanged, skipping variation
    /// tables, removed tables, and anything already rebuilt.
    fn copy_remaining(&self, tables: &mut BTreeMap<Tag, Vec<u8>>, extra_skip: &[Tag]) {
        for record in self.binding.font.table_directory.table_records() {
            let tag = record.tag();
            if VARIATION_TABLES.contains(&tag)
                || REMOVED_TABLES.contains(&tag)
                || extra_skip.contains(&tag)
                || tables.contains_key(&tag)
            {
                continue;
            }
            if let Some(data) = self.binding.table(tag) {
                tables.insert(tag, data.to_vec());
            }
        }
    }
}

/// A STAT table describing the chosen static location.
fn build_stat(fvar: &Fvar, location: &[AxisLocation]) -> Stat {
    let Ok(axis_arrays) = fvar.axis_instance_arrays() else {
        return Stat::new(vec![], vec![], NameId::new(2));
    };
    let axes = axis_arrays.axes();

    let design_axes: Vec<AxisRecord> = axes
        .iter()
        .enumerate()
        .map(|(i, axis)| AxisRecord::new(axis.axis_tag(), axis.axis_name_id(), i as u16))
        .collect();

    let axis_values: Vec<AxisValue> = location
        .iter()
        .filter_map(|loc| {
            let axis_index = axes.iter().position(|a| a.axis_tag() == loc.tag)?;
            let axis = axes.get(axis_index)?;
            let mut flags = AxisValueTableFlags::empty();
            if loc.value == axis.default_value().to_f64() {
                flags |= AxisValueTableFlags::ELIDABLE_AXIS_VALUE_NAME;
            }
            Some(AxisValue::format_1(
                axis_index as u16,
                flags,
                axis.axis_name_id(),
                Fixed::from_f64(loc.value),
            ))
        })
        .collect();

    Stat::new(design_axes, axis_values, NameId::new(2))
}

/// Instantiate a variable font at the given axis locations.
///
/// The one-call form: binds the font, evaluates one instance, serializes
/// the bundle.
///
/// # Example
///
/// ```no_run
/// use varstance_instancer::{AxisLocation, instantiate};
///
/// let vf_data = std::fs::read("variable.ttf").unwrap();
/// let location = [AxisLocation::new("wght", 700.0)];
/// let static_font = instantiate(&vf_data, &location).unwrap();
/// std::fs::write("static.ttf", static_font).unwrap();
/// ```
pub fn instantiate(data: &[u8], location: &[AxisLocation]) -> Result<Vec<u8>> {
    let evaluator = Evaluator::new(data)?;
    evaluator.evaluate(location)?.bundle.to_bytes()
}
