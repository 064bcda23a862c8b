//! Parameter descriptors for user-supplied processing code.
//!
//! A descriptor names one k-rate control and bounds it. The raw default is
//! never trusted: [`ParameterDescriptor::effective_default`] clamps it into
//! `[min_value, max_value]` before it reaches a generated module.

use livefx_host::{AutomationRate, ParamSpec};
use serde::{Deserialize, Serialize};

fn default_min() -> f32 {
    -f32::MAX
}

fn default_max() -> f32 {
    f32::MAX
}

/// A named, range-bounded numeric control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    /// Identifier used as `parameters.<name>` in user code.
    pub name: String,
    /// Requested initial value.
    #[serde(default)]
    pub default_value: f32,
    /// Lower bound (inclusive).
    #[serde(default = "default_min")]
    pub min_value: f32,
    /// Upper bound (inclusive).
    #[serde(default = "default_max")]
    pub max_value: f32,
}

impl ParameterDescriptor {
    /// Creates a descriptor.
    pub fn new(name: impl Into<String>, default_value: f32, min_value: f32, max_value: f32) -> Self {
        Self {
            name: name.into(),
            default_value,
            min_value,
            max_value,
        }
    }

    /// `clamp(default_value, min_value, max_value)`.
    ///
    /// Never panics: a NaN default becomes `min_value`, and inverted bounds
    /// are passed through for the host to reject.
    pub fn effective_default(&self) -> f32 {
        self.default_value.max(self.min_value).min(self.max_value)
    }

    /// The host declaration for this parameter, with the clamped default.
    pub fn to_spec(&self) -> ParamSpec {
        ParamSpec {
            name: self.name.clone(),
            default_value: self.effective_default(),
            min_value: self.min_value,
            max_value: self.max_value,
            automation_rate: AutomationRate::KRate,
        }
    }
}

/// Parses a JSON array of descriptors.
pub fn parse_descriptors(json: &str) -> Result<Vec<ParameterDescriptor>, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clamps_default_into_range() {
        assert_eq!(ParameterDescriptor::new("g", 1.0, 0.0, 2.0).effective_default(), 1.0);
        assert_eq!(ParameterDescriptor::new("g", -3.0, 0.0, 2.0).effective_default(), 0.0);
        assert_eq!(ParameterDescriptor::new("g", 9.0, 0.0, 2.0).effective_default(), 2.0);
    }

    #[test]
    fn nan_default_becomes_min() {
        assert_eq!(ParameterDescriptor::new("g", f32::NAN, -1.0, 1.0).effective_default(), -1.0);
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        let d = ParameterDescriptor::new("g", 0.5, 2.0, 1.0);
        assert!(d.effective_default().is_finite());
    }

    #[test]
    fn spec_is_k_rate_with_clamped_default() {
        let spec = ParameterDescriptor::new("gain", 5.0, 0.0, 2.0).to_spec();
        assert_eq!(spec.default_value, 2.0);
        assert_eq!(spec.automation_rate, AutomationRate::KRate);
    }

    #[test]
    fn parses_camel_case_json() {
        let params = parse_descriptors(
            r#"[{"name":"gain","defaultValue":1,"minValue":0,"maxValue":2},{"name":"mix"}]"#,
        )
        .unwrap();
        assert_eq!(params[0], ParameterDescriptor::new("gain", 1.0, 0.0, 2.0));
        assert_eq!(params[1].default_value, 0.0);
        assert_eq!(params[1].min_value, -f32::MAX);
        assert_eq!(params[1].max_value, f32::MAX);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(512))]

        /// Within a valid range the effective default is the clamp.
        #[test]
        fn effective_default_is_clamp(
            default in -1e6f32..1e6,
            a in -1e6f32..1e6,
            b in -1e6f32..1e6,
        ) {
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            let d = ParameterDescriptor::new("p", default, min, max);
            let eff = d.effective_default();
            prop_assert_eq!(eff, default.clamp(min, max));
            prop_assert!(eff >= min && eff <= max);
            if default < min {
                prop_assert_eq!(eff, min);
            }
            if default > max {
                prop_assert_eq!(eff, max);
            }
        }

        /// Arbitrary bounds, NaN included, never panic.
        #[test]
        fn effective_default_never_panics(default in any::<f32>(), min in any::<f32>(), max in any::<f32>()) {
            let _ = ParameterDescriptor::new("p", default, min, max).effective_default();
        }
    }
}
