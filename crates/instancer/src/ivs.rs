//! ItemVariationStore evaluation.
//!
//! The store holds a region list plus subtables of per-item delta rows; a
//! metric is addressed by an outer (subtable) index and an inner (item)
//! index. Scalars are computed once per instance and reused across every
//! lookup against the same store.

use font_types::F2Dot14;

use crate::{
    reader::{Cursor, UnexpectedEnd},
    region::{AxisTent, Region},
};

/// Flag on `word_delta_count`: word deltas are 32-bit, bytes are 16-bit.
const LONG_WORDS: u16 = 0x8000;
const WORD_DELTA_COUNT_MASK: u16 = 0x7FFF;

/// One subtable of delta rows, all referencing the same region subset.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VariationSubtable {
    pub region_indexes: Vec<u16>,
    /// `deltas[item][region-in-subtable]`
    pub deltas: Vec<Vec<i32>>,
}

/// A parsed, owned ItemVariationStore.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ItemVariationStore {
    pub regions: Vec<Region>,
    pub subtables: Vec<VariationSubtable>,
}

impl ItemVariationStore {
    /// Parses a format-1 store from the byte slice beginning at its header.
    pub(crate) fn parse(data: &[u8]) -> Result<Self, UnexpectedEnd> {
        let mut cursor = Cursor::new(data);
        let format = cursor.read_u16()?;
        if format != 1 {
            return Err(UnexpectedEnd);
        }
        let region_list_offset = cursor.read_u32()? as usize;
        let subtable_count = cursor.read_u16()? as usize;
        let mut subtable_offsets = Vec::with_capacity(subtable_count);
        for _ in 0..subtable_count {
            subtable_offsets.push(cursor.read_u32()? as usize);
        }

        let regions = parse_region_list(data.get(region_list_offset..).ok_or(UnexpectedEnd)?)?;
        let mut subtables = Vec::with_capacity(subtable_count);
        for offset in subtable_offsets {
            subtables.push(parse_subtable(data.get(offset..).ok_or(UnexpectedEnd)?)?);
        }

        Ok(Self { regions, subtables })
    }

    /// Computes the scalar of every region at a normalized point.
    pub(crate) fn scalars(&self, coords: &[f64]) -> Vec<f64> {
        self.regions.iter().map(|r| r.scalar_at(coords)).collect()
    }

    /// Evaluates one delta-set item against precomputed region scalars.
    /// Out-of-range addresses read as zero.
    pub(crate) fn delta(&self, outer: u16, inner: u16, scalars: &[f64]) -> f64 {
        let Some(subtable) = self.subtables.get(outer as usize) else {
            return 0.0;
        };
        let Some(row) = subtable.deltas.get(inner as usize) else {
            return 0.0;
        };
        let mut delta = 0.0;
        for (region_index, raw) in subtable.region_indexes.iter().zip(row.iter()) {
            let scalar = scalars.get(*region_index as usize).copied().unwrap_or(0.0);
            if scalar != 0.0 {
                delta += scalar * f64::from(*raw);
            }
        }
        delta
    }

    /// A delta rounded to integer font units, half to even.
    pub(crate) fn rounded_delta(&self, outer: u16, inner: u16, scalars: &[f64]) -> i32 {
        self.delta(outer, inner, scalars).round_ties_even() as i32
    }
}

fn parse_region_list(data: &[u8]) -> Result<Vec<Region>, UnexpectedEnd> {
    let mut cursor = Cursor::new(data);
    let axis_count = cursor.read_u16()? as usize;
    let region_count = cursor.read_u16()? as usize;
    if region_count >= 0x8000 {
        // High bit is reserved and must be clear.
        return Err(UnexpectedEnd);
    }
    let mut regions = Vec::with_capacity(region_count);
    for _ in 0..region_count {
        let mut tents = Vec::with_capacity(axis_count);
        for _ in 0..axis_count {
            let start = F2Dot14::from_bits(cursor.read_i16()?).to_f32() as f64;
            let peak = F2Dot14::from_bits(cursor.read_i16()?).to_f32() as f64;
            let end = F2Dot14::from_bits(cursor.read_i16()?).to_f32() as f64;
            tents.push(AxisTent::new(start, peak, end));
        }
        regions.push(Region::new(tents));
    }
    Ok(regions)
}

fn parse_subtable(data: &[u8]) -> Result<VariationSubtable, UnexpectedEnd> {
    let mut cursor = Cursor::new(data);
    let item_count = cursor.read_u16()? as usize;
    let word_delta_count = cursor.read_u16()?;
    let region_index_count = cursor.read_u16()? as usize;
    let mut region_indexes = Vec::with_capacity(region_index_count);
    for _ in 0..region_index_count {
        region_indexes.push(cursor.read_u16()?);
    }

    let long = word_delta_count & LONG_WORDS != 0;
    let word_count = (word_delta_count & WORD_DELTA_COUNT_MASK) as usize;
    let word_count = word_count.min(region_index_count);

    let mut deltas = Vec::with_capacity(item_count);
    for _ in 0..item_count {
        let mut row = Vec::with_capacity(region_index_count);
        for i in 0..region_index_count {
            let value = match (i < word_count, long) {
                (true, true) => cursor.read_i32()?,
                (true, false) => i32::from(cursor.read_i16()?),
                (false, true) => i32::from(cursor.read_i16()?),
                (false, false) => i32::from(cursor.read_i8()?),
            };
            row.push(value);
        }
        deltas.push(row);
    }

    Ok(VariationSubtable {
        region_indexes,
        deltas,
    })
}

/// An fvar-adjacent index map from item (usually glyph id) to a delta-set
/// address in the owning store.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct DeltaSetIndexMap {
    entries: Vec<(u16, u16)>,
}

impl DeltaSetIndexMap {
    const INNER_INDEX_BIT_COUNT_MASK: u8 = 0x0F;
    const MAP_ENTRY_SIZE_MASK: u8 = 0x30;

    pub(crate) fn parse(data: &[u8]) -> Result<Self, UnexpectedEnd> {
        let mut cursor = Cursor::new(data);
        let format = cursor.read_u8()?;
        let entry_format = cursor.read_u8()?;
        let map_count = match format {
            0 => u32::from(cursor.read_u16()?),
            1 => cursor.read_u32()?,
            _ => return Err(UnexpectedEnd),
        };
        let entry_size = ((entry_format & Self::MAP_ENTRY_SIZE_MASK) >> 4) + 1;
        let inner_bits = u32::from(entry_format & Self::INNER_INDEX_BIT_COUNT_MASK) + 1;

        let mut entries = Vec::with_capacity(map_count as usize);
        for _ in 0..map_count {
            let mut entry = 0u32;
            for _ in 0..entry_size {
                entry = (entry << 8) | u32::from(cursor.read_u8()?);
            }
            let outer = (entry >> inner_bits) as u16;
            let inner = (entry & ((1 << inner_bits) - 1)) as u16;
            entries.push((outer, inner));
        }
        Ok(Self { entries })
    }

    /// Looks up the delta-set address for an item. Indices past the end of
    /// the map repeat the last entry, matching how sparse maps are stored.
    pub(crate) fn get(&self, index: u32) -> Option<(u16, u16)> {
        self.entries
            .get(index as usize)
            .or(self.entries.last())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a store with one single-axis region (tent 0/1/1) and one
    /// subtable with two items: deltas [40] and [-80].
    fn sample_store() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_be_bytes()); // format
        data.extend_from_slice(&16u32.to_be_bytes()); // region list offset
        data.extend_from_slice(&1u16.to_be_bytes()); // subtable count
        data.extend_from_slice(&26u32.to_be_bytes()); // subtable 0 offset
        assert_eq!(data.len(), 12);
        data.extend_from_slice(&[0; 4]); // padding up to the region list
        // region list: 1 axis, 1 region, tent (0, 1, 1)
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        for v in [0.0f32, 1.0, 1.0] {
            data.extend_from_slice(&F2Dot14::from_f32(v).to_bits().to_be_bytes());
        }
        assert_eq!(data.len(), 26);
        // subtable: 2 items, 1 word delta, 1 region index
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes()); // region index 0
        data.extend_from_slice(&40i16.to_be_bytes());
        data.extend_from_slice(&(-80i16).to_be_bytes());
        data
    }

    #[test]
    fn parses_regions_and_rows() {
        let store = ItemVariationStore::parse(&sample_store()).unwrap();
        assert_eq!(store.regions.len(), 1);
        assert_eq!(store.subtables.len(), 1);
        assert_eq!(store.subtables[0].deltas, vec![vec![40], vec![-80]]);
    }

    #[test]
    fn scalar_weighted_delta() {
        let store = ItemVariationStore::parse(&sample_store()).unwrap();
        let scalars = store.scalars(&[0.25]);
        assert_eq!(scalars, vec![0.25]);
        assert_eq!(store.delta(0, 0, &scalars), 10.0);
        assert_eq!(store.rounded_delta(0, 0, &scalars), 10);
        assert_eq!(store.delta(0, 1, &scalars), -20.0);
    }

    #[test]
    fn out_of_range_address_reads_zero() {
        let store = ItemVariationStore::parse(&sample_store()).unwrap();
        let scalars = store.scalars(&[1.0]);
        assert_eq!(store.delta(3, 0, &scalars), 0.0);
        assert_eq!(store.delta(0, 99, &scalars), 0.0);
    }

    #[test]
    fn byte_deltas_after_words() {
        // subtable alone: 1 item, 1 word of 2 region deltas
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_be_bytes()); // items
        data.extend_from_slice(&1u16.to_be_bytes()); // word delta count
        data.extend_from_slice(&2u16.to_be_bytes()); // region index count
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&300i16.to_be_bytes()); // word delta
        data.push((-5i8) as u8); // byte delta
        let subtable = parse_subtable(&data).unwrap();
        assert_eq!(subtable.deltas, vec![vec![300, -5]]);
    }

    #[test]
    fn long_word_deltas() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&(LONG_WORDS | 1).to_be_bytes());
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&100_000i32.to_be_bytes());
        data.extend_from_slice(&(-42i16).to_be_bytes());
        let subtable = parse_subtable(&data).unwrap();
        assert_eq!(subtable.deltas, vec![vec![100_000, -42]]);
    }

    #[test]
    fn index_map_entries() {
        // format 0, entry format: 1 byte entries, 4 inner bits
        let data = [0u8, 0x03, 0x00, 0x02, 0x12, 0x21];
        let map = DeltaSetIndexMap::parse(&data).unwrap();
        assert_eq!(map.get(0), Some((1, 2)));
        assert_eq!(map.get(1), Some((2, 1)));
        // past the end: repeats the final entry
        assert_eq!(map.get(9), Some((2, 1)));
    }

    #[test]
    fn index_map_wide_entries() {
        // format 0, 2-byte entries, 8 inner bits
        let data = [0u8, 0x17, 0x00, 0x01, 0x01, 0x05];
        let map = DeltaSetIndexMap::parse(&data).unwrap();
        assert_eq!(map.get(0), Some((1, 5)));
    }

    #[test]
    fn empty_index_map() {
        let data = [0u8, 0x00, 0x00, 0x00];
        let map = DeltaSetIndexMap::parse(&data).unwrap();
        assert_eq!(map.get(0), None);
    }

    #[test]
    fn index_map_format_1() {
        let data = [1u8, 0x03, 0x00, 0x00, 0x00, 0x01, 0x12];
        let map = DeltaSetIndexMap::parse(&data).unwrap();
        assert_eq!(map.get(0), Some((1, 2)));
    }
}
