//! The introspection read model and structural validation.
//!
//! [`describe`] summarizes a bound font (axes, named instances, region
//! counts, optional cache statistics) as a serializable report; [`validate`]
//! runs structural checks and returns findings instead of failing.

use std::collections::BTreeMap;

use read_fonts::TableProvider;
use serde::Serialize;

use crate::{cache::CacheStats, instance::Evaluator};

#[derive(Debug, Clone, Serialize)]
pub struct AxisInfo {
    pub tag: String,
    pub min: f64,
    pub default: f64,
    pub max: f64,
    pub hidden: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    pub index: usize,
    pub name: Option<String>,
    pub coordinates: BTreeMap<String, f64>,
}

/// How many delta regions each variation source carries.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RegionSummary {
    pub gvar_shared_tuples: usize,
    pub cff2_regions: usize,
    pub hvar_regions: usize,
    pub vvar_regions: usize,
    pub mvar_regions: usize,
}

/// The serializable read model for a bound variable font.
#[derive(Debug, Clone, Serialize)]
pub struct FontReport {
    pub axes: Vec<AxisInfo>,
    pub instances: Vec<InstanceInfo>,
    pub regions: RegionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<CacheStats>,
}

impl FontReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Builds the read model for a bound font.
pub fn describe(evaluator: &Evaluator<'_>, statistics: Option<CacheStats>) -> FontReport {
    let binding = evaluator.binding();

    let axes = evaluator
        .axes()
        .iter()
        .map(|axis| AxisInfo {
            tag: axis.tag.to_string(),
            min: axis.min,
            default: axis.default,
            max: axis.max,
            hidden: axis.hidden,
            name: binding.name_string(axis.name_id.to_u16()),
        })
        .collect();

    let instances = evaluator
        .named_instances()
        .iter()
        .map(|instance| InstanceInfo {
            index: instance.index,
            name: binding.name_string(instance.name_id),
            coordinates: instance
                .location
                .iter()
                .map(|loc| (loc.tag.to_string(), loc.value))
                .collect(),
        })
        .collect();

    let regions = RegionSummary {
        gvar_shared_tuples: binding
            .gvar
            .as_ref()
            .map(|gvar| gvar.shared_tuple_count())
            .unwrap_or(0),
        cff2_regions: binding
            .cff2
            .as_ref()
            .map(|cff2| cff2.store.regions.len())
            .unwrap_or(0),
        hvar_regions: binding
            .hvar
            .as_ref()
            .map(|hvar| hvar.store.regions.len())
            .unwrap_or(0),
        vvar_regions: binding
            .vvar
            .as_ref()
            .map(|vvar| vvar.store.regions.len())
            .unwrap_or(0),
        mvar_regions: binding
            .mvar
            .as_ref()
            .map(|mvar| mvar.store.regions.len())
            .unwrap_or(0),
    };

    FontReport {
        axes,
        instances,
        regions,
        statistics,
    }
}

/// Structural checks over the bound font. Returns human-readable findings;
/// an empty list means nothing suspicious was found.
pub fn validate(evaluator: &Evaluator<'_>) -> Vec<String> {
    let binding = evaluator.binding();
    let mut findings = Vec::new();

    let mut seen = std::collections::HashSet::new();
    for axis in evaluator.axes() {
        if !(axis.min <= axis.default && axis.default <= axis.max) {
            findings.push(format!(
                "axis {}: range {} .. {} does not bracket default {}",
                axis.tag, axis.min, axis.max, axis.default
            ));
        }
        if !seen.insert(axis.tag) {
            findings.push(format!("axis {}: duplicate tag", axis.tag));
        }
    }

    if let Some(gvar) = &binding.gvar {
        if gvar.axis_count() != evaluator.axes().len() {
            findings.push(format!(
                "gvar declares {} axes, fvar has {}",
                gvar.axis_count(),
                evaluator.axes().len()
            ));
        }
        if let Ok(maxp) = binding.font.maxp() {
            if gvar.glyph_count() != maxp.num_glyphs() as usize {
                findings.push(format!(
                    "gvar covers {} glyphs, maxp has {}",
                    gvar.glyph_count(),
                    maxp.num_glyphs()
                ));
            }
        }
    }

    for (label, store) in [
        ("HVAR", binding.hvar.as_ref().map(|v| &v.store)),
        ("VVAR", binding.vvar.as_ref().map(|v| &v.store)),
        ("MVAR", binding.mvar.as_ref().map(|v| &v.store)),
        ("CFF2", binding.cff2.as_ref().map(|v| &v.store)),
    ] {
        let Some(store) = store else {
            continue;
        };
        for (index, region) in store.regions.iter().enumerate() {
            for tent in region.axes() {
                let ordered = tent.start <= tent.peak && tent.peak <= tent.end;
                let bounded = (-1.0..=1.0).contains(&tent.start) && (-1.0..=1.0).contains(&tent.end);
                if !ordered || !bounded {
                    findings.push(format!(
                        "{label} region {index}: malformed tent ({}, {}, {})",
                        tent.start, tent.peak, tent.end
                    ));
                    break;
                }
            }
        }
    }

    findings
}
