//! Data/simulation ratio of calibration curves.

use lc_core::{Error, Result};
use lc_hist::{BinnedDistribution, StoredObject};
use serde::{Deserialize, Serialize};

use crate::curve::{CalibrationCurve, ProfilePoint};

/// One slice of a curve ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioPoint {
    /// Lower edge of the slice.
    pub low: f64,
    /// Upper edge of the slice.
    pub high: f64,
    /// Numerator (data) estimate.
    pub data: f64,
    /// Denominator (simulation) estimate.
    pub mc: f64,
    /// `data / mc` (0 when skipped).
    pub value: f64,
    /// Propagated uncertainty on `value` (0 when skipped).
    pub uncertainty: f64,
    /// Why the slice has no ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// Bin-by-bin `data / mc` of two curves with identical slices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveRatio {
    /// Profile axis index shared by both curves.
    pub profile_axis: usize,
    /// Projection axis index shared by both curves.
    pub projection_axis: usize,
    /// Ratio as a binned distribution (content = ratio, error = uncertainty).
    pub distribution: BinnedDistribution,
    /// Per-slice diagnostics, in axis order.
    pub points: Vec<RatioPoint>,
}

impl CurveRatio {
    /// Number of slices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// No slices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Slices without a ratio.
    pub fn n_skipped(&self) -> usize {
        self.points.iter().filter(|p| p.skipped.is_some()).count()
    }
}

impl StoredObject for CurveRatio {
    const CLASS_NAME: &'static str = "CurveRatio";
}

fn skip_reason(d: &ProfilePoint, m: &ProfilePoint) -> Option<String> {
    if let Some(r) = &d.skipped {
        return Some(format!("data slice skipped: {r}"));
    }
    if let Some(r) = &m.skipped {
        return Some(format!("mc slice skipped: {r}"));
    }
    if !d.value.is_finite() || !d.uncertainty.is_finite() {
        return Some(format!("data value {} is not finite", d.value));
    }
    if !m.value.is_finite() || !m.uncertainty.is_finite() {
        return Some(format!("mc value {} is not finite", m.value));
    }
    if m.value == 0.0 {
        return Some("mc value is zero".into());
    }
    None
}

/// Divide `data` by `mc` slice by slice.
///
/// Both curves must profile the same axes with identical edges, otherwise
/// `ShapeMismatch`. The uncertainty is
/// `sqrt(ed^2 m^2 + em^2 d^2) / m^2`, i.e. relative errors in quadrature.
/// Slices skipped in either curve, or with a zero or non-finite
/// denominator, are kept with a reason and zero content.
pub fn curve_ratio(data: &CalibrationCurve, mc: &CalibrationCurve) -> Result<CurveRatio> {
    if data.profile_axis != mc.profile_axis || data.projection_axis != mc.projection_axis {
        return Err(Error::ShapeMismatch(format!(
            "curve dim{}_{} cannot be divided by curve dim{}_{}",
            data.profile_axis, data.projection_axis, mc.profile_axis, mc.projection_axis
        )));
    }
    if !data.distribution.same_binning(&mc.distribution) {
        return Err(Error::ShapeMismatch(format!(
            "data curve has {} slices, mc curve has {}, or their edges differ",
            data.distribution.n_bins(),
            mc.distribution.n_bins()
        )));
    }
    let n = data.distribution.n_bins();
    if data.points.len() != n || mc.points.len() != n {
        return Err(Error::Validation(format!(
            "curve diagnostics do not match {n} slices ({} data, {} mc)",
            data.points.len(),
            mc.points.len()
        )));
    }

    let mut distribution = BinnedDistribution::new(data.distribution.edges().to_vec())?;
    let mut points = Vec::with_capacity(n);
    for (i, (d, m)) in data.points.iter().zip(&mc.points).enumerate() {
        let mut p = RatioPoint {
            low: d.low,
            high: d.high,
            data: d.value,
            mc: m.value,
            value: 0.0,
            uncertainty: 0.0,
            skipped: skip_reason(d, m),
        };
        if p.skipped.is_none() {
            let m2 = m.value * m.value;
            p.value = d.value / m.value;
            let var = d.uncertainty.powi(2) * m2 + m.uncertainty.powi(2) * d.value.powi(2);
            p.uncertainty = var.sqrt() / m2;
            distribution.set_bin(i, p.value, p.uncertainty);
        }
        points.push(p);
    }
    let skipped = points.iter().filter(|p| p.skipped.is_some()).count();
    if skipped > 0 {
        tracing::debug!(
            profile_axis = data.profile_axis,
            projection_axis = data.projection_axis,
            skipped,
            "ratio slices without an estimate"
        );
    }

    Ok(CurveRatio {
        profile_axis: data.profile_axis,
        projection_axis: data.projection_axis,
        distribution,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve(edges: &[f64], values: &[(f64, f64)]) -> CalibrationCurve {
        let mut distribution = BinnedDistribution::new(edges.to_vec()).unwrap();
        let mut points = Vec::new();
        for (i, &(v, e)) in values.iter().enumerate() {
            distribution.set_bin(i, v, e);
            let mut p = ProfilePoint::empty(i + 1, i + 1, edges[i], edges[i + 1], 100.0);
            p.value = v;
            p.uncertainty = e;
            p.converged = true;
            points.push(p);
        }
        CalibrationCurve { profile_axis: 0, projection_axis: 1, distribution, points }
    }

    #[test]
    fn divides_with_relative_errors_in_quadrature() {
        let data = curve(&[0.0, 1.0, 3.0], &[(60.0, 3.0), (45.0, 0.9)]);
        let mc = curve(&[0.0, 1.0, 3.0], &[(50.0, 2.0), (50.0, 1.0)]);
        let r = curve_ratio(&data, &mc).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.n_skipped(), 0);
        assert_relative_eq!(r.points[0].value, 1.2, epsilon = 1e-12);
        // 1.2 * sqrt(0.05^2 + 0.04^2)
        assert_relative_eq!(r.points[0].uncertainty, 1.2 * (0.0025f64 + 0.0016).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(r.distribution.content(1), 0.9, epsilon = 1e-12);
        assert_relative_eq!(r.distribution.error(1), 0.9 * (0.0004f64 + 0.0004).sqrt(), epsilon = 1e-12);
        assert_eq!(r.distribution.edges(), &[0.0, 1.0, 3.0]);
    }

    #[test]
    fn zero_numerator_keeps_the_data_error() {
        let data = curve(&[0.0, 1.0], &[(0.0, 2.0)]);
        let mc = curve(&[0.0, 1.0], &[(40.0, 1.0)]);
        let r = curve_ratio(&data, &mc).unwrap();
        assert_eq!(r.points[0].value, 0.0);
        assert_relative_eq!(r.points[0].uncertainty, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn skipped_and_empty_denominators_are_reported() {
        let data = curve(&[0.0, 1.0, 2.0, 3.0], &[(50.0, 1.0), (50.0, 1.0), (50.0, 1.0)]);
        let mut mc = curve(&[0.0, 1.0, 2.0, 3.0], &[(0.0, 0.0), (50.0, 1.0), (50.0, 1.0)]);
        mc.points[1].value = 0.0;
        mc.points[1].skipped = Some("empty slice".into());
        mc.distribution.set_bin(1, 0.0, 0.0);

        let r = curve_ratio(&data, &mc).unwrap();
        assert_eq!(r.n_skipped(), 2);
        assert_eq!(r.points[0].skipped.as_deref(), Some("mc value is zero"));
        assert!(r.points[1].skipped.as_deref().unwrap().contains("empty slice"));
        assert_eq!(r.distribution.content(0), 0.0);
        assert_eq!(r.distribution.content(1), 0.0);
        assert_relative_eq!(r.distribution.content(2), 1.0, epsilon = 1e-12);
        assert!(r.points.iter().all(|p| p.value.is_finite() && p.uncertainty.is_finite()));
    }

    #[test]
    fn different_slices_are_a_shape_mismatch() {
        let data = curve(&[0.0, 1.0, 3.0], &[(50.0, 1.0), (50.0, 1.0)]);
        let mc = curve(&[0.0, 2.0, 3.0], &[(50.0, 1.0), (50.0, 1.0)]);
        let err = curve_ratio(&data, &mc).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));
        assert!(err.is_recoverable());

        let mut other_axis = data.clone();
        other_axis.projection_axis = 2;
        assert!(matches!(curve_ratio(&data, &other_axis), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn ratio_survives_the_object_file() {
        let data = curve(&[0.0, 1.0], &[(55.0, 1.0)]);
        let mc = curve(&[0.0, 1.0], &[(50.0, 1.0)]);
        let r = curve_ratio(&data, &mc).unwrap();
        let mut f = lc_hist::ObjectFile::new();
        f.put("group_0/ratio_dim0_1", &r).unwrap();
        assert_eq!(f.get::<CurveRatio>("group_0/ratio_dim0_1").unwrap(), r);
        assert!(f.get::<CalibrationCurve>("group_0/ratio_dim0_1").is_err());
    }
}
