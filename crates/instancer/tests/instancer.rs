//! Integration tests over real variable fonts.

use font_types::Tag;
use read_fonts::{FontRef, TableProvider, tables::glyf::Glyph, types::GlyphId};
use varstance_instancer::{AxisLocation, Error, Evaluator, instantiate, introspect};

fn get_glyph_coords(font: &FontRef, glyph_id: u32) -> Option<Vec<(i16, i16)>> {
    let glyf = font.glyf().ok()?;
    let loca = font.loca(None).ok()?;
    let glyph = loca.get_glyf(GlyphId::new(glyph_id), &glyf).ok()??;
    match glyph {
        Glyph::Simple(simple) => Some(simple.points().map(|p| (p.x, p.y)).collect()),
        Glyph::Composite(_) => None,
    }
}

fn get_advance_width(font: &FontRef, glyph_id: u32) -> Option<u16> {
    font.hmtx().ok()?.advance(GlyphId::new(glyph_id))
}

#[test]
fn instantiate_at_default() {
    let data = font_test_data::VAZIRMATN_VAR;
    let result = instantiate(data, &[AxisLocation::new("wght", 400.0)]).unwrap();

    let output = FontRef::new(&result).unwrap();
    assert!(output.fvar().is_err());
    assert!(output.gvar().is_err());
    assert!(output.glyf().is_ok());
    assert!(output.hmtx().is_ok());
}

#[test]
fn default_instance_matches_source() {
    let data = font_test_data::VAZIRMATN_VAR;
    let source = FontRef::new(data).unwrap();
    let result = instantiate(data, &[AxisLocation::new("wght", 400.0)]).unwrap();
    let output = FontRef::new(&result).unwrap();

    let num_glyphs = source.maxp().unwrap().num_glyphs();
    for gid in 0..num_glyphs as u32 {
        assert_eq!(
            get_advance_width(&source, gid),
            get_advance_width(&output, gid),
            "advance of glyph {gid}"
        );
        if let Some(source_coords) = get_glyph_coords(&source, gid) {
            assert_eq!(
                Some(source_coords),
                get_glyph_coords(&output, gid),
                "outline of glyph {gid}"
            );
        }
    }
}

#[test]
fn instantiate_at_min() {
    let data = font_test_data::VAZIRMATN_VAR;
    let result = instantiate(data, &[AxisLocation::new("wght", 100.0)]).unwrap();

    let output = FontRef::new(&result).unwrap();
    assert!(output.fvar().is_err());
    assert!(get_glyph_coords(&output, 1).is_some());
}

#[test]
fn instantiate_at_max() {
    let data = font_test_data::VAZIRMATN_VAR;
    let result = instantiate(data, &[AxisLocation::new("wght", 900.0)]).unwrap();

    let output = FontRef::new(&result).unwrap();
    assert!(output.fvar().is_err());
    assert!(get_glyph_coords(&output, 1).is_some());
}

#[test]
fn preserves_glyph_count() {
    let data = font_test_data::VAZIRMATN_VAR;
    let input = FontRef::new(data).unwrap();
    let input_count = input.maxp().unwrap().num_glyphs();

    let result = instantiate(data, &[AxisLocation::new("wght", 700.0)]).unwrap();
    let output = FontRef::new(&result).unwrap();
    let output_count = output.maxp().unwrap().num_glyphs();

    assert_eq!(input_count, output_count);
}

#[test]
fn updates_advance_widths() {
    let data = font_test_data::VAZIRMATN_VAR;

    let result_min = instantiate(data, &[AxisLocation::new("wght", 100.0)]).unwrap();
    let result_max = instantiate(data, &[AxisLocation::new("wght", 900.0)]).unwrap();

    let font_min = FontRef::new(&result_min).unwrap();
    let font_max = FontRef::new(&result_max).unwrap();

    let aw_min = get_advance_width(&font_min, 1).unwrap();
    let aw_max = get_advance_width(&font_max, 1).unwrap();

    assert_ne!(aw_min, aw_max);
}

#[test]
fn coordinates_differ_at_extremes() {
    let data = font_test_data::VAZIRMATN_VAR;

    let result_min = instantiate(data, &[AxisLocation::new("wght", 100.0)]).unwrap();
    let result_max = instantiate(data, &[AxisLocation::new("wght", 900.0)]).unwrap();

    let font_min = FontRef::new(&result_min).unwrap();
    let font_max = FontRef::new(&result_max).unwrap();

    let coords_min = get_glyph_coords(&font_min, 1).unwrap();
    let coords_max = get_glyph_coords(&font_max, 1).unwrap();

    assert_eq!(coords_min.len(), coords_max.len());
    assert_ne!(coords_min, coords_max);
}

#[test]
fn lsb_equals_glyph_xmin() {
    let data = font_test_data::VAZIRMATN_VAR;

    // an interpolated position, away from any master
    let result = instantiate(data, &[AxisLocation::new("wght", 500.0)]).unwrap();
    let font = FontRef::new(&result).unwrap();

    let glyf = font.glyf().unwrap();
    let loca = font.loca(None).unwrap();
    let hmtx = font.hmtx().unwrap();

    for gid in 1..font.maxp().unwrap().num_glyphs().min(20) {
        let glyph_id = GlyphId::new(gid as u32);
        let lsb = hmtx.side_bearing(glyph_id).unwrap_or(0);

        if let Some(Glyph::Simple(simple)) = loca.get_glyf(glyph_id, &glyf).ok().flatten() {
            if simple.num_points() > 0 {
                let x_min = simple.points().map(|p| p.x).min().unwrap_or(0);
                assert_eq!(lsb, x_min, "glyph {gid}: LSB should equal xMin");
            }
        }
    }
}

#[test]
fn unknown_axis_is_rejected() {
    let data = font_test_data::VAZIRMATN_VAR;
    let evaluator = Evaluator::new(data).unwrap();
    let result = evaluator.evaluate(&[AxisLocation::new("zzzz", 1.0)]);
    assert!(matches!(result, Err(Error::UnknownAxis(tag)) if tag == Tag::new(b"zzzz")));
}

#[test]
fn out_of_range_coordinate_clamps_with_warning() {
    let data = font_test_data::VAZIRMATN_VAR;
    let evaluator = Evaluator::new(data).unwrap();

    let clamped = evaluator
        .evaluate(&[AxisLocation::new("wght", 2000.0)])
        .unwrap();
    assert!(clamped
        .diagnostics
        .iter()
        .any(|d| matches!(d, varstance_instancer::Diagnostic::OutOfRangeCoordinate { .. })));

    // the clamped instance carries the same outlines as the axis maximum
    let at_max = evaluator
        .evaluate(&[AxisLocation::new("wght", 900.0)])
        .unwrap();
    assert_eq!(
        clamped.bundle.table(Tag::new(b"glyf")),
        at_max.bundle.table(Tag::new(b"glyf"))
    );
}

#[test]
fn named_instances_are_resolvable() {
    let data = font_test_data::VAZIRMATN_VAR;
    let evaluator = Evaluator::new(data).unwrap();
    let count = evaluator.named_instances().len();
    if count == 0 {
        assert!(matches!(
            evaluator.evaluate_named(0),
            Err(Error::NoSuchInstance(0))
        ));
    } else {
        let instance = evaluator.evaluate_named(0).unwrap();
        assert!(!instance.bundle.is_empty());
        assert!(matches!(
            evaluator.evaluate_named(count),
            Err(Error::NoSuchInstance(_))
        ));
    }
}

#[test]
fn handles_empty_locations() {
    let data = font_test_data::VAZIRMATN_VAR;
    let result = instantiate(data, &[]).unwrap();

    let output = FontRef::new(&result).unwrap();
    assert!(output.fvar().is_err());
}

#[test]
fn rejects_non_variable_font() {
    let data = font_test_data::SIMPLE_GLYF;
    let result = instantiate(data, &[AxisLocation::new("wght", 400.0)]);
    assert!(matches!(result, Err(Error::NotVariableFont)));
}

#[test]
fn cff2_font_produces_static_cff() {
    let data = font_test_data::CANTARELL_VF_TRIMMED;
    let result = instantiate(data, &[AxisLocation::new("wght", 700.0)]).unwrap();

    let output = FontRef::new(&result).unwrap();
    assert!(output.fvar().is_err());
    assert!(output.table_data(Tag::new(b"CFF2")).is_none());
    let cff = output.table_data(Tag::new(b"CFF ")).expect("CFF table");
    // CFF version 1 header
    assert_eq!(cff.as_bytes()[0], 1);
    assert!(output.hmtx().is_ok());
}

#[test]
fn cff2_instances_differ_across_weights() {
    let data = font_test_data::CANTARELL_VF_TRIMMED;
    let light = instantiate(data, &[AxisLocation::new("wght", 100.0)]).unwrap();
    let bold = instantiate(data, &[AxisLocation::new("wght", 700.0)]).unwrap();

    let light_font = FontRef::new(&light).unwrap();
    let bold_font = FontRef::new(&bold).unwrap();
    let light_cff = light_font.table_data(Tag::new(b"CFF ")).unwrap();
    let bold_cff = bold_font.table_data(Tag::new(b"CFF ")).unwrap();
    assert_ne!(light_cff.as_bytes(), bold_cff.as_bytes());
}

#[test]
fn report_lists_axes_and_serializes() {
    let data = font_test_data::VAZIRMATN_VAR;
    let evaluator = Evaluator::new(data).unwrap();
    let report = introspect::describe(&evaluator, None);

    assert!(report.axes.iter().any(|axis| axis.tag == "wght"));
    let json = report.to_json().unwrap();
    assert!(json.contains("\"wght\""));
}

#[test]
fn validation_passes_on_well_formed_font() {
    let data = font_test_data::VAZIRMATN_VAR;
    let evaluator = Evaluator::new(data).unwrap();
    let findings = introspect::validate(&evaluator);
    assert!(findings.is_empty(), "{findings:?}");
}
