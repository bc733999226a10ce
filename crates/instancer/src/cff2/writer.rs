//! Assembles a static, CID-keyed CFF (version 1) table from rewritten
//! CharStrings.
//!
//! Layout: header, Name INDEX, Top DICT INDEX, String INDEX ("Adobe",
//! "Identity" for the ROS), empty Global Subr INDEX, charset, FDSelect,
//! CharStrings INDEX, FDArray with a single font DICT, and one Private
//! DICT holding the width defaults. Every offset operand is written as a
//! fixed five-byte integer so section positions can be computed up front.

/// First SID after the standard strings.
const CUSTOM_SID_BASE: i32 = 391;

/// DICT operator bytes.
const OP_FONT_BBOX: u8 = 5;
const OP_CHARSET: u8 = 15;
const OP_CHAR_STRINGS: u8 = 17;
const OP_PRIVATE: u8 = 18;
const OP_DEFAULT_WIDTH_X: u8 = 20;
const OP_NOMINAL_WIDTH_X: u8 = 21;
const OP2_FONT_MATRIX: u8 = 7;
const OP2_ROS: u8 = 30;
const OP2_CID_COUNT: u8 = 34;
const OP2_FD_ARRAY: u8 = 36;
const OP2_FD_SELECT: u8 = 37;

/// Picks defaultWidthX/nominalWidthX for the Private DICT: the most common
/// advance, so most glyphs carry no width operand at all.
pub(crate) fn pick_widths(advances: &[u16]) -> (u16, u16) {
    let mut counts = std::collections::HashMap::new();
    for advance in advances {
        *counts.entry(*advance).or_insert(0usize) += 1;
    }
    let mode = counts
        .into_iter()
        .max_by_key(|(advance, count)| (*count, u32::MAX - u32::from(*advance)))
        .map(|(advance, _)| advance)
        .unwrap_or(0);
    (mode, mode)
}

fn encode_int(value: i32, out: &mut Vec<u8>) {
    out.push(29);
    out.extend_from_slice(&value.to_be_bytes());
}

/// CFF real-number operand: packed BCD nibbles, 0xF terminated.
fn encode_real(value: f64, out: &mut Vec<u8>) {
    let text = format!("{value}");
    let mut nibbles = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '0'..='9' => nibbles.push(c as u8 - b'0'),
            '.' => nibbles.push(0xA),
            '-' => nibbles.push(0xE),
            'e' | 'E' => {
                if chars.peek() == Some(&'-') {
                    chars.next();
                    nibbles.push(0xC);
                } else {
                    nibbles.push(0xB);
                }
            }
            _ => {}
        }
    }
    nibbles.push(0xF);
    if nibbles.len() % 2 != 0 {
        nibbles.push(0xF);
    }
    out.push(30);
    for pair in nibbles.chunks(2) {
        out.push((pair[0] << 4) | pair[1]);
    }
}

/// A CFF1 INDEX: u16 count, offSize, 1-based offsets, object data.
fn cff1_index<'a>(objects: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let objects: Vec<&[u8]> = objects.into_iter().collect();
    if objects.is_empty() {
        return vec![0, 0];
    }
    let total: usize = objects.iter().map(|o| o.len()).sum::<usize>() + 1;
    let off_size: u8 = match total {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    };

    let mut out = Vec::new();
    out.extend_from_slice(&(objects.len() as u16).to_be_bytes());
    out.push(off_size);
    let mut offset = 1u32;
    let mut push_offset = |out: &mut Vec<u8>, value: u32| {
        let bytes = value.to_be_bytes();
        out.extend_from_slice(&bytes[4 - off_size as usize..]);
    };
    push_offset(&mut out, offset);
    for object in &objects {
        offset += object.len() as u32;
        push_offset(&mut out, offset);
    }
    for object in &objects {
        out.extend_from_slice(object);
    }
    out
}

fn charset(num_glyphs: usize) -> Vec<u8> {
    if num_glyphs > 1 {
        // format 2, one range: CIDs 1..num_glyphs-1 follow glyph order
        let mut out = vec![2];
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&((num_glyphs - 2) as u16).to_be_bytes());
        out
    } else {
        vec![0]
    }
}

fn fd_select(num_glyphs: usize) -> Vec<u8> {
    let mut out = vec![3];
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.push(0);
    out.extend_from_slice(&(num_glyphs as u16).to_be_bytes());
    out
}

fn sanitize_name(name: &str) -> Vec<u8> {
    let cleaned: Vec<u8> = name
        .bytes()
        .filter(|b| b.is_ascii_graphic() && !b"[](){}<>/%".contains(b))
        .take(127)
        .collect();
    if cleaned.is_empty() {
        b"Instance".to_vec()
    } else {
        cleaned
    }
}

fn font_matrix(units_per_em: u16) -> Option<Vec<u8>> {
    if units_per_em == 1000 || units_per_em == 0 {
        return None;
    }
    let scale = 1.0 / f64::from(units_per_em);
    let mut out = Vec::new();
    for value in [scale, 0.0, 0.0, scale, 0.0, 0.0] {
        encode_real(value, &mut out);
    }
    out.push(12);
    out.push(OP2_FONT_MATRIX);
    Some(out)
}

fn top_dict(
    num_glyphs: usize,
    matrix: Option<&[u8]>,
    bbox: [i32; 4],
    charset_off: i32,
    fd_select_off: i32,
    char_strings_off: i32,
    fd_array_off: i32,
) -> Vec<u8> {
    let mut out = Vec::new();
    // ROS: Adobe-Identity-0
    encode_int(CUSTOM_SID_BASE, &mut out);
    encode_int(CUSTOM_SID_BASE + 1, &mut out);
    encode_int(0, &mut out);
    out.push(12);
    out.push(OP2_ROS);

    encode_int(num_glyphs as i32, &mut out);
    out.push(12);
    out.push(OP2_CID_COUNT);

    if let Some(matrix) = matrix {
        out.extend_from_slice(matrix);
    }

    for value in bbox {
        encode_int(value, &mut out);
    }
    out.push(OP_FONT_BBOX);

    encode_int(charset_off, &mut out);
    out.push(OP_CHARSET);

    encode_int(fd_select_off, &mut out);
    out.push(12);
    out.push(OP2_FD_SELECT);

    encode_int(char_strings_off, &mut out);
    out.push(OP_CHAR_STRINGS);

    encode_int(fd_array_off, &mut out);
    out.push(12);
    out.push(OP2_FD_ARRAY);

    out
}

/// Length of the top DICT before offsets are known; every operand uses the
/// five-byte form, so the length never shifts.
fn top_dict_len(matrix: Option<&[u8]>) -> usize {
    let ros = 3 * 5 + 2;
    let cid_count = 5 + 2;
    let bbox = 4 * 5 + 1;
    let offsets = (5 + 1) + (5 + 2) + (5 + 1) + (5 + 2);
    ros + cid_count + matrix.map_or(0, |m| m.len()) + bbox + offsets
}

fn private_dict(default_width: u16, nominal_width: u16) -> Vec<u8> {
    let mut out = Vec::new();
    encode_int(i32::from(default_width), &mut out);
    out.push(OP_DEFAULT_WIDTH_X);
    encode_int(i32::from(nominal_width), &mut out);
    out.push(OP_NOMINAL_WIDTH_X);
    out
}

fn font_dict(private_size: usize, private_off: i32) -> Vec<u8> {
    let mut out = Vec::new();
    encode_int(private_size as i32, &mut out);
    encode_int(private_off, &mut out);
    out.push(OP_PRIVATE);
    out
}

/// Builds the complete CFF table.
pub(crate) fn build_cff(
    font_name: &str,
    char_strings: &[Vec<u8>],
    default_width: u16,
    nominal_width: u16,
    units_per_em: u16,
    bbox: [i32; 4],
) -> Vec<u8> {
    let num_glyphs = char_strings.len();
    let name = sanitize_name(font_name);
    let name_index = cff1_index([name.as_slice()]);
    let string_index = cff1_index([&b"Adobe"[..], &b"Identity"[..]]);
    let global_subr_index = cff1_index([]);
    let matrix = font_matrix(units_per_em);

    let top_len = top_dict_len(matrix.as_deref());
    // Top DICT INDEX overhead for a single object of known size.
    let top_index_len = {
        let probe = cff1_index([vec![0u8; top_len].as_slice()]);
        probe.len()
    };

    let charset_bytes = charset(num_glyphs);
    let fd_select_bytes = fd_select(num_glyphs);
    let char_strings_index = cff1_index(char_strings.iter().map(|cs| cs.as_slice()));
    let private = private_dict(default_width, nominal_width);

    let header: [u8; 4] = [1, 0, 4, 4];
    let base = header.len() + name_index.len() + top_index_len + string_index.len()
        + global_subr_index.len();
    let charset_off = base;
    let fd_select_off = charset_off + charset_bytes.len();
    let char_strings_off = fd_select_off + fd_select_bytes.len();
    let fd_array_off = char_strings_off + char_strings_index.len();
    // FDArray INDEX wraps one 11-byte font DICT.
    let font_dict_bytes_len = 11;
    let fd_array_len = 2 + 1 + 2 + font_dict_bytes_len;
    let private_off = fd_array_off + fd_array_len;

    let dict = top_dict(
        num_glyphs,
        matrix.as_deref(),
        bbox,
        charset_off as i32,
        fd_select_off as i32,
        char_strings_off as i32,
        fd_array_off as i32,
    );
    debug_assert_eq!(dict.len(), top_len);
    let top_index = cff1_index([dict.as_slice()]);
    debug_assert_eq!(top_index.len(), top_index_len);

    let fd = font_dict(private.len(), private_off as i32);
    debug_assert_eq!(fd.len(), font_dict_bytes_len);
    let fd_array = cff1_index([fd.as_slice()]);
    debug_assert_eq!(fd_array.len(), fd_array_len);

    let mut out = Vec::new();
    out.extend_from_slice(&header);
    out.extend_from_slice(&name_index);
    out.extend_from_slice(&top_index);
    out.extend_from_slice(&string_index);
    out.extend_from_slice(&global_subr_index);
    out.extend_from_slice(&charset_bytes);
    out.extend_from_slice(&fd_select_bytes);
    out.extend_from_slice(&char_strings_index);
    out.extend_from_slice(&fd_array);
    out.extend_from_slice(&private);
    out
}
