//! Unit parameters: declared specs and their live, lock-free values.
//!
//! A module declares its parameters as a JSON array of [`ParamSpec`]. When a
//! unit is instantiated every spec becomes an [`AudioParam`]: an `f32` stored
//! as bits in an `AtomicU32`, written from the control thread and read by the
//! render thread once per block (k-rate).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// How often a parameter value is sampled by the render thread.
///
/// The host samples both rates once per render quantum; `a-rate` is accepted
/// for compatibility but not sample-accurate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutomationRate {
    /// One value per block.
    #[default]
    #[serde(rename = "k-rate")]
    KRate,
    /// Declared per-sample; sampled per block.
    #[serde(rename = "a-rate")]
    ARate,
}

fn default_min() -> f32 {
    -f32::MAX
}

fn default_max() -> f32 {
    f32::MAX
}

/// Declared parameter of a unit module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    /// Name used by `parameters.<name>` in the script.
    pub name: String,
    /// Initial value.
    #[serde(default)]
    pub default_value: f32,
    /// Lower bound (inclusive).
    #[serde(default = "default_min")]
    pub min_value: f32,
    /// Upper bound (inclusive).
    #[serde(default = "default_max")]
    pub max_value: f32,
    /// Sampling rate of the parameter.
    #[serde(default)]
    pub automation_rate: AutomationRate,
}

/// Checks a declared parameter list, returning a description of the first problem.
///
/// Rejects empty or duplicate names, non-finite or inverted ranges, and
/// defaults outside their range.
pub fn validate_specs(specs: &[ParamSpec]) -> Result<(), String> {
    for (i, spec) in specs.iter().enumerate() {
        if spec.name.is_empty() {
            return Err(format!("parameter #{i} has an empty name"));
        }
        if specs[..i].iter().any(|s| s.name == spec.name) {
            return Err(format!("duplicate parameter '{}'", spec.name));
        }
        if spec.min_value.is_nan() || spec.max_value.is_nan() {
            return Err(format!("parameter '{}' has a NaN bound", spec.name));
        }
        if spec.min_value > spec.max_value {
            return Err(format!(
                "parameter '{}' has minValue {} > maxValue {}",
                spec.name, spec.min_value, spec.max_value
            ));
        }
        if !(spec.min_value..=spec.max_value).contains(&spec.default_value) {
            return Err(format!(
                "parameter '{}' default {} is outside [{}, {}]",
                spec.name, spec.default_value, spec.min_value, spec.max_value
            ));
        }
    }
    Ok(())
}

/// A live parameter value shared between control and render threads.
///
/// Control thread writes, render thread reads. No locks, no allocations.
#[derive(Debug)]
pub struct AudioParam {
    name: String,
    value: AtomicU32,
    min: f32,
    max: f32,
    default: f32,
}

impl AudioParam {
    /// Creates a parameter initialised to the spec's default.
    pub fn from_spec(spec: &ParamSpec) -> Self {
        Self {
            name: spec.name.clone(),
            value: AtomicU32::new(spec.default_value.to_bits()),
            min: spec.min_value,
            max: spec.max_value,
            default: spec.default_value,
        }
    }

    /// Parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the value, clamped to the declared range. NaN is ignored.
    #[inline]
    pub fn set(&self, v: f32) {
        if v.is_nan() {
            return;
        }
        let clamped = v.max(self.min).min(self.max);
        self.value.store(clamped.to_bits(), Ordering::Release);
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Lower bound.
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Declared default.
    pub fn default(&self) -> f32 {
        self.default
    }

    /// Resets to the declared default.
    pub fn reset(&self) {
        self.set(self.default);
    }
}

/// The parameters of one unit instance, in declaration order.
#[derive(Debug, Default)]
pub struct ParamSet {
    params: Vec<AudioParam>,
}

impl ParamSet {
    /// Builds a set from validated specs.
    pub fn from_specs(specs: &[ParamSpec]) -> Self {
        Self {
            params: specs.iter().map(AudioParam::from_spec).collect(),
        }
    }

    /// Looks a parameter up by name.
    pub fn get(&self, name: &str) -> Option<&AudioParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Parameter at a declaration index.
    #[inline]
    pub fn at(&self, index: usize) -> Option<&AudioParam> {
        self.params.get(index)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the unit declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterates parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &AudioParam> {
        self.params.iter()
    }

    /// Copies current values into `out`, one slot per parameter.
    pub fn snapshot_into(&self, out: &mut [f32]) {
        for (slot, param) in out.iter_mut().zip(&self.params) {
            *slot = param.get();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, default: f32, min: f32, max: f32) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            default_value: default,
            min_value: min,
            max_value: max,
            automation_rate: AutomationRate::KRate,
        }
    }

    #[test]
    fn deserialize_camel_case_with_defaults() {
        let specs: Vec<ParamSpec> =
            serde_json::from_str(r#"[{"name":"gain","defaultValue":1,"automationRate":"k-rate"}]"#)
                .unwrap();
        assert_eq!(specs[0].name, "gain");
        assert_eq!(specs[0].default_value, 1.0);
        assert_eq!(specs[0].min_value, -f32::MAX);
        assert_eq!(specs[0].max_value, f32::MAX);
        assert_eq!(specs[0].automation_rate, AutomationRate::KRate);
    }

    #[test]
    fn a_rate_parses() {
        let specs: Vec<ParamSpec> =
            serde_json::from_str(r#"[{"name":"x","automationRate":"a-rate"}]"#).unwrap();
        assert_eq!(specs[0].automation_rate, AutomationRate::ARate);
    }

    #[test]
    fn validate_rejects_bad_specs() {
        assert!(validate_specs(&[spec("a", 0.0, 0.0, 1.0)]).is_ok());
        assert!(validate_specs(&[spec("a", 0.0, 0.0, 1.0), spec("a", 0.0, 0.0, 1.0)]).is_err());
        assert!(validate_specs(&[spec("a", 0.5, 1.0, 0.0)]).is_err());
        assert!(validate_specs(&[spec("a", 2.0, 0.0, 1.0)]).is_err());
        assert!(validate_specs(&[spec("", 0.0, 0.0, 1.0)]).is_err());
        assert!(validate_specs(&[spec("a", 0.0, f32::NAN, 1.0)]).is_err());
    }

    #[test]
    fn audio_param_clamps_and_ignores_nan() {
        let p = AudioParam::from_spec(&spec("gain", 1.0, 0.0, 2.0));
        p.set(5.0);
        assert_eq!(p.get(), 2.0);
        p.set(-1.0);
        assert_eq!(p.get(), 0.0);
        p.set(f32::NAN);
        assert_eq!(p.get(), 0.0);
        p.reset();
        assert_eq!(p.get(), 1.0);
    }

    #[test]
    fn param_set_lookup_and_snapshot() {
        let set = ParamSet::from_specs(&[spec("a", 0.25, 0.0, 1.0), spec("b", 0.5, 0.0, 1.0)]);
        assert_eq!(set.len(), 2);
        assert!(set.get("missing").is_none());
        set.get("b").unwrap().set(0.75);
        let mut out = [0.0; 2];
        set.snapshot_into(&mut out);
        assert_eq!(out, [0.25, 0.75]);
    }
}
