//! The read-only view of a bound source font.
//!
//! read-fonts supplies the sfnt directory and the parsed structural tables;
//! the variation payloads the evaluator decodes itself (gvar, HVAR, VVAR,
//! MVAR, CFF2, avar) are pulled out as raw slices here and parsed once.
//! Optional tables surface as `Option` views rather than probing calls.

use font_types::Tag;
use read_fonts::{FontRef, TableProvider};

use crate::{
    axis::{Axis, AxisLocation, SegmentMaps},
    cff2::{CFF2, Cff2Font},
    error::{Error, Result},
    gvar::{GVAR, GvarTable},
    metrics::{MetricVariations, Mvar},
};

pub(crate) const HVAR: Tag = Tag::new(b"HVAR");
pub(crate) const VVAR: Tag = Tag::new(b"VVAR");
pub(crate) const MVAR: Tag = Tag::new(b"MVAR");
pub(crate) const AVAR: Tag = Tag::new(b"avar");

/// A named instance from fvar, with coordinates resolved to user space.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedInstance {
    pub index: usize,
    pub name_id: u16,
    pub postscript_name_id: Option<u16>,
    pub location: Vec<AxisLocation>,
}

/// Parsed views of everything the evaluator consumes from a source font.
pub(crate) struct FontBinding<'a> {
    pub font: FontRef<'a>,
    pub has_glyf: bool,
    pub gvar: Option<GvarTable<'a>>,
    pub cff2: Option<Cff2Font<'a>>,
    pub hvar: Option<MetricVariations>,
    pub vvar: Option<MetricVariations>,
    pub mvar: Option<Mvar>,
    pub has_vmtx: bool,
}

impl<'a> FontBinding<'a> {
    pub(crate) fn new(font: FontRef<'a>) -> Result<Self> {
        let has_glyf = font.glyf().is_ok();

        let gvar = match Self::raw(&font, GVAR) {
            Some(data) => Some(GvarTable::parse(data)?),
            None => None,
        };
        let cff2 = match Self::raw(&font, CFF2) {
            Some(data) => Some(Cff2Font::parse(data)?),
            None => None,
        };
        let hvar = Self::raw(&font, HVAR)
            .map(|data| MetricVariations::parse_hvar(data).map_err(|_| malformed(HVAR)))
            .transpose()?;
        let vvar = Self::raw(&font, VVAR)
            .map(|data| MetricVariations::parse_vvar(data).map_err(|_| malformed(VVAR)))
            .transpose()?;
        let mvar = Self::raw(&font, MVAR)
            .map(|data| Mvar::parse(data).map_err(|_| malformed(MVAR)))
            .transpose()?;
        let has_vmtx = font.vmtx().is_ok() && font.vhea().is_ok();

        Ok(Self {
            font,
            has_glyf,
            gvar,
            cff2,
            hvar,
            vvar,
            mvar,
            has_vmtx,
        })
    }

    fn raw(font: &FontRef<'a>, tag: Tag) -> Option<&'a [u8]> {
        font.table_data(tag).map(|data| data.as_bytes())
    }

    pub(crate) fn has_table(&self, tag: Tag) -> bool {
        self.font.table_data(tag).is_some()
    }

    pub(crate) fn table(&self, tag: Tag) -> Option<&'a [u8]> {
        Self::raw(&self.font, tag)
    }

    /// The fvar axes in table order.
    pub(crate) fn axes(&self) -> Result<Vec<Axis>> {
        let fvar = self.font.fvar().map_err(|_| Error::NotVariableFont)?;
        let records = fvar.axes()?;
        Ok(records.iter().map(Axis::from_record).collect())
    }

    /// avar segment maps when the table is present and sane.
    pub(crate) fn segment_maps(&self, axis_count: usize) -> Option<SegmentMaps> {
        SegmentMaps::parse(self.table(AVAR)?, axis_count)
    }

    /// fvar named instances with user-space coordinates.
    pub(crate) fn named_instances(&self, axes: &[Axis]) -> Vec<NamedInstance> {
        let Ok(fvar) = self.font.fvar() else {
            return Vec::new();
        };
        let Ok(arrays) = fvar.axis_instance_arrays() else {
            return Vec::new();
        };
        arrays
            .instances()
            .iter()
            .filter_map(|record| record.ok())
            .enumerate()
            .map(|(index, record)| {
                let location = record
                    .coordinates
                    .iter()
                    .zip(axes)
                    .map(|(value, axis)| AxisLocation {
                        tag: axis.tag,
                        value: value.get().to_f64(),
                    })
                    .collect();
                NamedInstance {
                    index,
                    name_id: record.subfamily_name_id.to_u16(),
                    postscript_name_id: record.post_script_name_id.map(|id| id.to_u16()),
                    location,
                }
            })
            .collect()
    }

    /// A name-table string by id, preferring Unicode records.
    pub(crate) fn name_string(&self, name_id: u16) -> Option<String> {
        let name = self.font.name().ok()?;
        let data = name.string_data();
        name.name_record()
            .iter()
            .filter(|record| record.name_id().to_u16() == name_id)
            .filter_map(|record| record.string(data).ok())
            .map(|s| s.to_string())
            .next()
    }

    /// The PostScript name (name ID 6) for CFF naming.
    pub(crate) fn postscript_name(&self) -> Option<String> {
        self.name_string(6)
    }
}

fn malformed(tag: Tag) -> Error {
    Error::MalformedTable {
        table: tag,
        reason: "truncated table".to_string(),
    }
}
