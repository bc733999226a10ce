//! CFF2 blend evaluation and static CFF emission.
//!
//! The container layer here is deliberately small: header, INDEX
//! structures, the handful of DICT operators that locate CharStrings,
//! subroutines and the variation store. The interesting work happens in
//! [`charstring`], which resolves `blend` operators against region
//! scalars, and [`writer`], which assembles the replacement CFF table.

mod charstring;
mod writer;

use std::collections::HashMap;

use font_types::Tag;
use read_fonts::types::GlyphId;

use crate::{
    error::{Diagnostic, Error, Result},
    ivs::ItemVariationStore,
    reader::{Cursor, UnexpectedEnd},
};

pub(crate) use charstring::subtable_scalars;

pub(crate) const CFF2: Tag = Tag::new(b"CFF2");

/// Top DICT: CharStrings INDEX offset.
const OP_CHAR_STRINGS: u16 = 17;
/// Top DICT: VariationStore offset.
const OP_VSTORE: u16 = 24;
/// Top DICT: FDArray offset (escaped).
const OP_FD_ARRAY: u16 = 0x0c24;
/// Top DICT: FDSelect offset (escaped).
const OP_FD_SELECT: u16 = 0x0c25;
/// Font DICT: Private DICT size and offset.
const OP_PRIVATE: u16 = 18;
/// Private DICT: local Subrs offset, relative to the private DICT.
const OP_SUBRS: u16 = 19;
/// Private DICT: default vsindex for the font DICT's glyphs.
const OP_VSINDEX: u16 = 22;
/// Private DICT: blend operator.
const OP_BLEND: u16 = 23;

/// A CFF-style INDEX: a list of byte objects.
#[derive(Debug, Clone, Default)]
pub(crate) struct Index<'a> {
    offsets: Vec<u32>,
    data: &'a [u8],
}

impl<'a> Index<'a> {
    /// Parses a CFF2 INDEX (32-bit count) at the cursor, leaving the cursor
    /// positioned after it.
    fn parse(cursor: &mut Cursor<'a>) -> std::result::Result<Self, UnexpectedEnd> {
        let count = cursor.read_u32()? as usize;
        if count == 0 {
            return Ok(Self::default());
        }
        let off_size = cursor.read_u8()?;
        if !(1..=4).contains(&off_size) {
            return Err(UnexpectedEnd);
        }
        let mut offsets = Vec::with_capacity(count + 1);
        for _ in 0..=count {
            let mut value = 0u32;
            for _ in 0..off_size {
                value = (value << 8) | u32::from(cursor.read_u8()?);
            }
            if value == 0 {
                return Err(UnexpectedEnd);
            }
            offsets.push(value);
        }
        let data_len = (*offsets.last().unwrap() - 1) as usize;
        let data = cursor.read_slice(data_len)?;
        Ok(Self { offsets, data })
    }

    pub(crate) fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&'a [u8]> {
        let start = (*self.offsets.get(index)? - 1) as usize;
        let end = (*self.offsets.get(index + 1)? - 1) as usize;
        self.data.get(start..end)
    }
}

/// Which font DICT applies to each glyph.
#[derive(Debug, Clone)]
enum FdSelect {
    /// Every glyph uses font DICT zero (no FDSelect present).
    Uniform,
    Format0(Vec<u8>),
    Ranges(Vec<(u32, u16)>, u32),
}

impl FdSelect {
    fn parse(data: &[u8], num_glyphs: usize) -> std::result::Result<Self, UnexpectedEnd> {
        let mut cursor = Cursor::new(data);
        match cursor.read_u8()? {
            0 => {
                let map = data.get(1..1 + num_glyphs).ok_or(UnexpectedEnd)?;
                Ok(Self::Format0(map.to_vec()))
            }
            3 => {
                let n_ranges = cursor.read_u16()? as usize;
                let mut ranges = Vec::with_capacity(n_ranges);
                for _ in 0..n_ranges {
                    let first = u32::from(cursor.read_u16()?);
                    let fd = u16::from(cursor.read_u8()?);
                    ranges.push((first, fd));
                }
                let sentinel = u32::from(cursor.read_u16()?);
                Ok(Self::Ranges(ranges, sentinel))
            }
            4 => {
                let n_ranges = cursor.read_u32()? as usize;
                let mut ranges = Vec::with_capacity(n_ranges);
                for _ in 0..n_ranges {
                    let first = cursor.read_u32()?;
                    let fd = cursor.read_u16()?;
                    ranges.push((first, fd));
                }
                let sentinel = cursor.read_u32()?;
                Ok(Self::Ranges(ranges, sentinel))
            }
            _ => Err(UnexpectedEnd),
        }
    }

    fn font_dict_index(&self, gid: GlyphId) -> u16 {
        let gid = gid.to_u32();
        match self {
            Self::Uniform => 0,
            Self::Format0(map) => map.get(gid as usize).copied().map(u16::from).unwrap_or(0),
            Self::Ranges(ranges, sentinel) => {
                if gid >= *sentinel {
                    return 0;
                }
                let mut fd = 0;
                for (first, range_fd) in ranges {
                    if gid >= *first {
                        fd = *range_fd;
                    } else {
                        break;
                    }
                }
                fd
            }
        }
    }
}

/// One font DICT's worth of CharString context.
#[derive(Debug, Clone, Default)]
struct FontDictEntry<'a> {
    local_subrs: Option<Index<'a>>,
    vsindex: u16,
}

/// A parsed CFF2 table, ready for CharString rewriting.
pub(crate) struct Cff2Font<'a> {
    char_strings: Index<'a>,
    global_subrs: Index<'a>,
    fd_select: FdSelect,
    fonts: Vec<FontDictEntry<'a>>,
    pub(crate) store: ItemVariationStore,
}

fn malformed(reason: &str) -> Error {
    Error::MalformedTable {
        table: CFF2,
        reason: reason.to_string(),
    }
}

impl<'a> Cff2Font<'a> {
    pub(crate) fn parse(data: &'a [u8]) -> Result<Self> {
        Self::parse_impl(data).map_err(|_| malformed("truncated table"))
    }

    fn parse_impl(data: &'a [u8]) -> std::result::Result<Self, UnexpectedEnd> {
        let mut cursor = Cursor::new(data);
        let major = cursor.read_u8()?;
        if major != 2 {
            return Err(UnexpectedEnd);
        }
        let _minor = cursor.read_u8()?;
        let header_size = cursor.read_u8()? as usize;
        let top_dict_len = cursor.read_u16()? as usize;

        let top_dict_data = data
            .get(header_size..header_size + top_dict_len)
            .ok_or(UnexpectedEnd)?;
        let top_dict = parse_dict(top_dict_data)?;

        let mut global_cursor = Cursor::new(data.get(header_size + top_dict_len..).ok_or(UnexpectedEnd)?);
        let global_subrs = Index::parse(&mut global_cursor)?;

        let char_strings_offset = dict_offset(&top_dict, OP_CHAR_STRINGS).ok_or(UnexpectedEnd)?;
        let mut cs_cursor = Cursor::new(data.get(char_strings_offset..).ok_or(UnexpectedEnd)?);
        let char_strings = Index::parse(&mut cs_cursor)?;

        let store = match dict_offset(&top_dict, OP_VSTORE) {
            Some(offset) => {
                let mut vs_cursor = Cursor::new(data.get(offset..).ok_or(UnexpectedEnd)?);
                let length = vs_cursor.read_u16()? as usize;
                let body = vs_cursor.read_slice(length)?;
                ItemVariationStore::parse(body)?
            }
            None => ItemVariationStore::default(),
        };

        let fonts = match dict_offset(&top_dict, OP_FD_ARRAY) {
            Some(offset) => {
                let mut fd_cursor = Cursor::new(data.get(offset..).ok_or(UnexpectedEnd)?);
                let fd_array = Index::parse(&mut fd_cursor)?;
                let mut fonts = Vec::with_capacity(fd_array.len());
                for i in 0..fd_array.len() {
                    let font_dict = parse_dict(fd_array.get(i).ok_or(UnexpectedEnd)?)?;
                    fonts.push(parse_private(data, &font_dict)?);
                }
                fonts
            }
            None => vec![FontDictEntry::default()],
        };

        let fd_select = match dict_offset(&top_dict, OP_FD_SELECT) {
            Some(offset) => {
                FdSelect::parse(data.get(offset..).ok_or(UnexpectedEnd)?, char_strings.len())?
            }
            None => FdSelect::Uniform,
        };

        Ok(Self {
            char_strings,
            global_subrs,
            fd_select,
            fonts,
            store,
        })
    }

    pub(crate) fn num_glyphs(&self) -> usize {
        self.char_strings.len()
    }

    /// Rewrites every CharString into a static (blend-free) form and
    /// assembles the replacement CFF table.
    ///
    /// `advances` supplies the final per-glyph advance widths so the CFF
    /// widths agree with the rebuilt hmtx.
    pub(crate) fn instantiate(
        &self,
        coords: &[f64],
        advances: &[u16],
        font_name: &str,
        units_per_em: u16,
        bbox: [i32; 4],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Vec<u8>> {
        let scalars = subtable_scalars(&self.store, coords);
        let (default_width, nominal_width) = writer::pick_widths(advances);

        let num_glyphs = self.num_glyphs();
        let mut rewritten = Vec::with_capacity(num_glyphs);
        for gid in 0..num_glyphs {
            let glyph = GlyphId::new(gid as u32);
            let advance = advances.get(gid).copied().unwrap_or(default_width);
            let width = (advance != default_width)
                .then(|| f64::from(advance) - f64::from(nominal_width));

            let Some(char_string) = self.char_strings.get(gid) else {
                diagnostics.push(Diagnostic::MissingGlyph { glyph });
                rewritten.push(charstring::empty_charstring(width));
                continue;
            };

            let fd = self.fd_select.font_dict_index(glyph) as usize;
            let entry = self.fonts.get(fd);
            let rewriter = charstring::Rewriter::new(
                &self.global_subrs,
                entry.and_then(|e| e.local_subrs.as_ref()),
                &scalars,
                entry.map(|e| e.vsindex).unwrap_or(0),
            );
            match rewriter.rewrite(char_string, width) {
                Ok(bytes) => rewritten.push(bytes),
                Err(fail) => {
                    diagnostics.push(fail.into_diagnostic(glyph));
                    rewritten.push(charstring::empty_charstring(width));
                }
            }
        }

        Ok(writer::build_cff(
            font_name,
            &rewritten,
            default_width,
            nominal_width,
            units_per_em,
            bbox,
        ))
    }
}

fn parse_private<'a>(
    data: &'a [u8],
    font_dict: &HashMap<u16, Vec<f64>>,
) -> std::result::Result<FontDictEntry<'a>, UnexpectedEnd> {
    let Some(operands) = font_dict.get(&OP_PRIVATE) else {
        return Ok(FontDictEntry::default());
    };
    if operands.len() < 2 {
        return Err(UnexpectedEnd);
    }
    let size = operands[0] as usize;
    let offset = operands[1] as usize;
    let private_data = data.get(offset..offset + size).ok_or(UnexpectedEnd)?;
    let private = parse_dict(private_data)?;

    let vsindex = private
        .get(&OP_VSINDEX)
        .and_then(|ops| ops.first())
        .map(|v| *v as u16)
        .unwrap_or(0);

    let local_subrs = match private.get(&OP_SUBRS).and_then(|ops| ops.first()) {
        Some(rel) => {
            let subrs_offset = offset + *rel as usize;
            let mut cursor = Cursor::new(data.get(subrs_offset..).ok_or(UnexpectedEnd)?);
            Some(Index::parse(&mut cursor)?)
        }
        None => None,
    };

    Ok(FontDictEntry {
        local_subrs,
        vsindex,
    })
}

fn dict_offset(dict: &HashMap<u16, Vec<f64>>, op: u16) -> Option<usize> {
    dict.get(&op)?.last().map(|v| *v as usize)
}

/// Parses a CFF2 DICT into operator -> operands. Blended operands are
/// collapsed to their default values, which is all the container layer
/// ever needs.
fn parse_dict(data: &[u8]) -> std::result::Result<HashMap<u16, Vec<f64>>, UnexpectedEnd> {
    let mut dict = HashMap::new();
    let mut operands: Vec<f64> = Vec::new();
    let mut cursor = Cursor::new(data);
    while cursor.remaining() > 0 {
        let b0 = cursor.read_u8()?;
        match b0 {
            28 => operands.push(f64::from(cursor.read_i16()?)),
            29 => operands.push(f64::from(cursor.read_i32()?)),
            30 => operands.push(read_real(&mut cursor)?),
            32..=246 => operands.push(f64::from(i16::from(b0) - 139)),
            247..=250 => {
                let b1 = cursor.read_u8()?;
                operands.push(f64::from(
                    (i16::from(b0) - 247) * 256 + i16::from(b1) + 108,
                ));
            }
            251..=254 => {
                let b1 = cursor.read_u8()?;
                operands.push(f64::from(
                    -(i16::from(b0) - 251) * 256 - i16::from(b1) - 108,
                ));
            }
            255 => {
                let raw = cursor.read_i32()?;
                operands.push(f64::from(raw) / 65536.0);
            }
            12 => {
                let b1 = cursor.read_u8()?;
                let op = 0x0c00 | u16::from(b1);
                dict.insert(op, std::mem::take(&mut operands));
            }
            _ => {
                let op = u16::from(b0);
                if op == OP_BLEND {
                    // Blended dict values: keep only the defaults we already
                    // collected; the deltas are irrelevant to layout.
                    operands.clear();
                    continue;
                }
                dict.insert(op, std::mem::take(&mut operands));
            }
        }
    }
    Ok(dict)
}

/// CFF real number: packed BCD nibbles terminated by 0xF.
fn read_real(cursor: &mut Cursor<'_>) -> std::result::Result<f64, UnexpectedEnd> {
    let mut text = String::new();
    'outer: loop {
        let byte = cursor.read_u8()?;
        for nibble in [byte >> 4, byte & 0x0F] {
            match nibble {
                0..=9 => text.push((b'0' + nibble) as char),
                0xA => text.push('.'),
                0xB => text.push('E'),
                0xC => text.push_str("E-"),
                0xE => text.push('-'),
                0xF => break 'outer,
                _ => return Err(UnexpectedEnd),
            }
        }
    }
    text.parse().map_err(|_| UnexpectedEnd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip() {
        // CFF2 INDEX: 2 objects, offSize 1, offsets 1,3,6; data "ab cde"
        let data = [0, 0, 0, 2, 1, 1, 3, 6, b'a', b'b', b'c', b'd', b'e'];
        let mut cursor = Cursor::new(&data);
        let index = Index::parse(&mut cursor).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(0), Some(&b"ab"[..]));
        assert_eq!(index.get(1), Some(&b"cde"[..]));
        assert_eq!(index.get(2), None);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn empty_index_is_four_bytes() {
        let data = [0, 0, 0, 0, 0xAA];
        let mut cursor = Cursor::new(&data);
        let index = Index::parse(&mut cursor).unwrap();
        assert_eq!(index.len(), 0);
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn dict_operand_encodings() {
        // 28 (i16 300), op 17; 139 -> 0, op 24
        let data = [28, 0x01, 0x2C, 17, 139, 24];
        let dict = parse_dict(&data).unwrap();
        assert_eq!(dict.get(&OP_CHAR_STRINGS), Some(&vec![300.0]));
        assert_eq!(dict.get(&OP_VSTORE), Some(&vec![0.0]));
    }

    #[test]
    fn dict_escaped_operator() {
        // 29 (i32 1000) followed by 12 36 (FDArray)
        let data = [29, 0, 0, 0x03, 0xE8, 12, 36];
        let dict = parse_dict(&data).unwrap();
        assert_eq!(dict_offset(&dict, OP_FD_ARRAY), Some(1000));
    }

    #[test]
    fn real_number_nibbles() {
        // -2.25 encoded as e2a25f
        let mut cursor = Cursor::new(&[0xE2, 0xA2, 0x5F]);
        assert_eq!(read_real(&mut cursor).unwrap(), -2.25);
    }

    #[test]
    fn fd_select_ranges() {
        let data = [3, 0, 2, 0, 0, 0, 0, 10, 1, 0, 20];
        let fd = FdSelect::parse(&data, 20).unwrap();
        assert_eq!(fd.font_dict_index(GlyphId::new(0)), 0);
        assert_eq!(fd.font_dict_index(GlyphId::new(9)), 0);
        assert_eq!(fd.font_dict_index(GlyphId::new(10)), 1);
        assert_eq!(fd.font_dict_index(GlyphId::new(19)), 1);
        assert_eq!(fd.font_dict_index(GlyphId::new(25)), 0);
    }
}
