//! The gvar tuple-variation store and its packed delta encoding.
//!
//! read-fonts locates the table; the byte-level decoding lives here because
//! the evaluator needs the raw material of each tuple: the point selection,
//! the touched mask for interpolation, and the unscaled integer deltas.
//!
//! Serialized layout per glyph: a tuple-variation count (high bits carry
//! flags), an offset to the serialized data block, one header per tuple
//! (peak/intermediate coordinates, shared-tuple index, data size), then the
//! data block of optional shared point numbers followed by each tuple's
//! packed points and packed deltas.

use font_types::{F2Dot14, Tag};
use read_fonts::types::GlyphId;

use crate::{
    error::{Diagnostic, Error, Result},
    reader::{Cursor, UnexpectedEnd},
    region::Region,
};

pub(crate) const GVAR: Tag = Tag::new(b"gvar");

/// Flag: the store carries shared point numbers ahead of the tuple data.
const SHARED_POINT_NUMBERS: u16 = 0x8000;
/// Mask for the tuple-variation count.
const COUNT_MASK: u16 = 0x0FFF;

/// Flag: the header embeds its own peak tuple.
const EMBEDDED_PEAK_TUPLE: u16 = 0x8000;
/// Flag: the header embeds intermediate start and end tuples.
const INTERMEDIATE_REGION: u16 = 0x4000;
/// Flag: the tuple carries private point numbers.
const PRIVATE_POINT_NUMBERS: u16 = 0x2000;
/// Mask for the shared-tuple index.
const TUPLE_INDEX_MASK: u16 = 0x0FFF;

/// Packed point runs: high bit selects 16-bit values, low 7 bits are the
/// run length minus one.
const POINTS_ARE_WORDS: u8 = 0x80;
const POINT_RUN_COUNT_MASK: u8 = 0x7F;

/// Packed delta runs: bit 7 marks an all-zero run, bit 6 16-bit values,
/// low 6 bits the run length minus one.
const DELTAS_ARE_ZERO: u8 = 0x80;
const DELTAS_ARE_WORDS: u8 = 0x40;
const DELTA_RUN_COUNT_MASK: u8 = 0x3F;

/// One decoded tuple variation: a region plus dense per-point deltas.
///
/// `dx`/`dy`/`touched` all have the glyph's full point count (phantom
/// points included); unselected positions hold zero and stay untouched.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TupleDeltas {
    pub region: Region,
    pub dx: Vec<i32>,
    pub dy: Vec<i32>,
    pub touched: Vec<bool>,
    /// True when the tuple supplied deltas for every point, which makes
    /// interpolation unnecessary.
    pub all_points: bool,
    /// Set when the region came from a shared peak with no intermediate
    /// record, so its scalar can be taken from the precomputed shared list.
    pub shared_peak_index: Option<u16>,
}

/// The parsed gvar container: header, shared tuples, per-glyph data slices.
pub(crate) struct GvarTable<'a> {
    axis_count: usize,
    shared_peaks: Vec<Vec<f64>>,
    glyph_count: usize,
    offsets: Vec<u32>,
    array: &'a [u8],
}

#[derive(Debug)]
enum DecodeFail {
    End,
    Bad(&'static str),
}

impl From<UnexpectedEnd> for DecodeFail {
    fn from(_: UnexpectedEnd) -> Self {
        DecodeFail::End
    }
}

impl DecodeFail {
    fn reason(&self) -> String {
        match self {
            DecodeFail::End => "truncated delta stream".to_string(),
            DecodeFail::Bad(msg) => (*msg).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PointNumbers {
    All,
    Specific(Vec<u16>),
}

struct TupleHeader {
    data_size: usize,
    region: Region,
    private_points: bool,
    shared_peak_index: Option<u16>,
}

impl<'a> GvarTable<'a> {
    pub(crate) fn parse(data: &'a [u8]) -> Result<Self> {
        Self::parse_impl(data).map_err(|fail| Error::MalformedTable {
            table: GVAR,
            reason: fail.reason(),
        })
    }

    fn parse_impl(data: &'a [u8]) -> std::result::Result<Self, DecodeFail> {
        let mut cursor = Cursor::new(data);
        let major = cursor.read_u16()?;
        if major != 1 {
            return Err(DecodeFail::Bad("unsupported version"));
        }
        let _minor = cursor.read_u16()?;
        let axis_count = cursor.read_u16()? as usize;
        let shared_tuple_count = cursor.read_u16()? as usize;
        let shared_tuples_offset = cursor.read_u32()? as usize;
        let glyph_count = cursor.read_u16()? as usize;
        let flags = cursor.read_u16()?;
        let array_offset = cursor.read_u32()? as usize;

        // Offsets are stored halved when the long-offset flag is clear.
        let mut offsets = Vec::with_capacity(glyph_count + 1);
        if flags & 0x1 == 0 {
            for _ in 0..=glyph_count {
                offsets.push(u32::from(cursor.read_u16()?) * 2);
            }
        } else {
            for _ in 0..=glyph_count {
                offsets.push(cursor.read_u32()?);
            }
        }

        let mut shared = Cursor::new(data.get(shared_tuples_offset..).ok_or(DecodeFail::End)?);
        let mut shared_peaks = Vec::with_capacity(shared_tuple_count);
        for _ in 0..shared_tuple_count {
            let mut peak = Vec::with_capacity(axis_count);
            for _ in 0..axis_count {
                peak.push(F2Dot14::from_bits(shared.read_i16()?).to_f32() as f64);
            }
            shared_peaks.push(peak);
        }

        let array = data.get(array_offset..).ok_or(DecodeFail::End)?;

        Ok(Self {
            axis_count,
            shared_peaks,
            glyph_count,
            offsets,
            array,
        })
    }

    pub(crate) fn axis_count(&self) -> usize {
        self.axis_count
    }

    pub(crate) fn glyph_count(&self) -> usize {
        self.glyph_count
    }

    pub(crate) fn shared_tuple_count(&self) -> usize {
        self.shared_peaks.len()
    }

    /// Scalars for every shared peak tuple at a normalized point, computed
    /// once per instance and consulted by tuples that reference them.
    pub(crate) fn shared_scalars(&self, coords: &[f64]) -> Vec<f64> {
        self.shared_peaks
            .iter()
            .map(|peak| Region::from_peaks(peak).scalar_at(coords))
            .collect()
    }

    fn glyph_data(&self, gid: GlyphId) -> Option<&'a [u8]> {
        let index = gid.to_u32() as usize;
        if index >= self.glyph_count {
            return None;
        }
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        if end <= start {
            return None;
        }
        self.array.get(start..end)
    }

    /// Decodes every tuple variation for a glyph into dense delta arrays.
    ///
    /// `num_points` is the glyph's point count including the four phantom
    /// points. Malformed tuples are dropped with a diagnostic; the rest of
    /// the glyph continues.
    pub(crate) fn decode_glyph(
        &self,
        gid: GlyphId,
        num_points: usize,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<TupleDeltas> {
        let Some(data) = self.glyph_data(gid) else {
            return Vec::new();
        };
        match self.decode_store(data, num_points, gid, diagnostics) {
            Ok(tuples) => tuples,
            Err(fail) => {
                diagnostics.push(Diagnostic::MalformedDeltas {
                    glyph: gid,
                    reason: fail.reason(),
                });
                Vec::new()
            }
        }
    }

    fn decode_store(
        &self,
        data: &[u8],
        num_points: usize,
        gid: GlyphId,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> std::result::Result<Vec<TupleDeltas>, DecodeFail> {
        let mut cursor = Cursor::new(data);
        let flags_and_count = cursor.read_u16()?;
        let tuple_count = (flags_and_count & COUNT_MASK) as usize;
        let data_offset = cursor.read_u16()? as usize;

        let mut headers = Vec::with_capacity(tuple_count);
        for _ in 0..tuple_count {
            headers.push(self.read_tuple_header(&mut cursor)?);
        }

        let mut serialized = Cursor::new(data.get(data_offset..).ok_or(DecodeFail::End)?);
        let shared_points = if flags_and_count & SHARED_POINT_NUMBERS != 0 {
            Some(read_packed_points(&mut serialized, num_points)?)
        } else {
            None
        };

        let mut tuples = Vec::with_capacity(tuple_count);
        for header in &headers {
            let tuple_data = match serialized.read_slice(header.data_size) {
                Ok(slice) => slice,
                Err(_) => {
                    diagnostics.push(Diagnostic::MalformedDeltas {
                        glyph: gid,
                        reason: "tuple data extends past the store".to_string(),
                    });
                    break;
                }
            };
            if header.region.is_neutral() {
                // A tuple peaking at the default contributes nothing and
                // must not appear; drop it.
                diagnostics.push(Diagnostic::MalformedDeltas {
                    glyph: gid,
                    reason: "tuple peaks at the default instance".to_string(),
                });
                continue;
            }
            match decode_tuple(header, tuple_data, shared_points.as_ref(), num_points) {
                Ok(tuple) => tuples.push(tuple),
                Err(fail) => diagnostics.push(Diagnostic::MalformedDeltas {
                    glyph: gid,
                    reason: fail.reason(),
                }),
            }
        }
        Ok(tuples)
    }

    fn read_tuple_header(
        &self,
        cursor: &mut Cursor<'_>,
    ) -> std::result::Result<TupleHeader, DecodeFail> {
        let data_size = cursor.read_u16()? as usize;
        let flags_and_index = cursor.read_u16()?;

        let mut shared_peak_index = None;
        let peaks = if flags_and_index & EMBEDDED_PEAK_TUPLE != 0 {
            self.read_coords(cursor)?
        } else {
            let index = flags_and_index & TUPLE_INDEX_MASK;
            shared_peak_index = Some(index);
            self.shared_peaks
                .get(index as usize)
                .cloned()
                .ok_or(DecodeFail::Bad("shared tuple index out of range"))?
        };

        let region = if flags_and_index & INTERMEDIATE_REGION != 0 {
            let starts = self.read_coords(cursor)?;
            let ends = self.read_coords(cursor)?;
            shared_peak_index = None;
            Region::from_tuples(&starts, &peaks, &ends)
        } else {
            Region::from_peaks(&peaks)
        };

        Ok(TupleHeader {
            data_size,
            region,
            private_points: flags_and_index & PRIVATE_POINT_NUMBERS != 0,
            shared_peak_index,
        })
    }

    fn read_coords(&self, cursor: &mut Cursor<'_>) -> std::result::Result<Vec<f64>, DecodeFail> {
        let mut coords = Vec::with_capacity(self.axis_count);
        for _ in 0..self.axis_count {
            coords.push(F2Dot14::from_bits(cursor.read_i16()?).to_f32() as f64);
        }
        Ok(coords)
    }
}

fn decode_tuple(
    header: &TupleHeader,
    data: &[u8],
    shared_points: Option<&PointNumbers>,
    num_points: usize,
) -> std::result::Result<TupleDeltas, DecodeFail> {
    let mut cursor = Cursor::new(data);

    let points = if header.private_points {
        read_packed_points(&mut cursor, num_points)?
    } else {
        shared_points.cloned().unwrap_or(PointNumbers::All)
    };

    let selected = match &points {
        PointNumbers::All => num_points,
        PointNumbers::Specific(list) => list.len(),
    };
    let raw = read_packed_deltas(&mut cursor, selected * 2)?;
    let (x_run, y_run) = raw.split_at(selected);

    let mut dx = vec![0i32; num_points];
    let mut dy = vec![0i32; num_points];
    let mut touched = vec![false; num_points];
    match &points {
        PointNumbers::All => {
            dx.copy_from_slice(x_run);
            dy.copy_from_slice(y_run);
            touched.fill(true);
        }
        PointNumbers::Specific(list) => {
            for (i, point) in list.iter().enumerate() {
                let index = *point as usize;
                if index >= num_points {
                    return Err(DecodeFail::Bad("point index out of range"));
                }
                dx[index] = x_run[i];
                dy[index] = y_run[i];
                touched[index] = true;
            }
        }
    }

    Ok(TupleDeltas {
        region: header.region.clone(),
        dx,
        dy,
        touched,
        all_points: matches!(points, PointNumbers::All),
        shared_peak_index: header.shared_peak_index,
    })
}

/// Reads the one- or two-byte packed point count.
fn read_count(cursor: &mut Cursor<'_>) -> std::result::Result<usize, DecodeFail> {
    let first = cursor.read_u8()?;
    if first & 0x80 != 0 {
        let second = cursor.read_u8()?;
        Ok((usize::from(first & 0x7F) << 8) | usize::from(second))
    } else {
        Ok(usize::from(first))
    }
}

/// Reads a packed point-number set. A zero count selects every point.
fn read_packed_points(
    cursor: &mut Cursor<'_>,
    num_points: usize,
) -> std::result::Result<PointNumbers, DecodeFail> {
    let count = read_count(cursor)?;
    if count == 0 {
        return Ok(PointNumbers::All);
    }
    if count > num_points {
        return Err(DecodeFail::Bad("point count exceeds glyph point count"));
    }

    let mut numbers: Vec<u16> = Vec::with_capacity(count);
    let mut previous = 0u32;
    while numbers.len() < count {
        let control = cursor.read_u8()?;
        let run_len = usize::from(control & POINT_RUN_COUNT_MASK) + 1;
        for _ in 0..run_len {
            if numbers.len() == count {
                return Err(DecodeFail::Bad("point run overflows declared count"));
            }
            let diff = if control & POINTS_ARE_WORDS != 0 {
                u32::from(cursor.read_u16()?)
            } else {
                u32::from(cursor.read_u8()?)
            };
            previous += diff;
            if previous > u32::from(u16::MAX) {
                return Err(DecodeFail::Bad("point number overflow"));
            }
            numbers.push(previous as u16);
        }
    }
    Ok(PointNumbers::Specific(numbers))
}

/// Reads `count` packed deltas. Runs may straddle the X/Y boundary, so the
/// caller reads both coordinate arrays as one stream and splits after.
fn read_packed_deltas(
    cursor: &mut Cursor<'_>,
    count: usize,
) -> std::result::Result<Vec<i32>, DecodeFail> {
    let mut deltas = Vec::with_capacity(count);
    while deltas.len() < count {
        let control = cursor.read_u8()?;
        let run_len = usize::from(control & DELTA_RUN_COUNT_MASK) + 1;
        if deltas.len() + run_len > count {
            return Err(DecodeFail::Bad("delta run overflows declared count"));
        }
        if control & DELTAS_ARE_ZERO != 0 {
            deltas.extend(std::iter::repeat_n(0, run_len));
        } else if control & DELTAS_ARE_WORDS != 0 {
            for _ in 0..run_len {
                deltas.push(i32::from(cursor.read_i16()?));
            }
        } else {
            for _ in 0..run_len {
                deltas.push(i32::from(cursor.read_i8()?));
            }
        }
    }
    Ok(deltas)
}
