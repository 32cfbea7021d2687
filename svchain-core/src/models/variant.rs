use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::models::breakend::Breakend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SvType {
    Bnd,
    Del,
    Dup,
    Ins,
    Inv,
    Sgl,
    Inf,
}

impl SvType {
    /// Single-ended types carry only a start breakend.
    pub fn is_single_ended(&self) -> bool {
        matches!(self, SvType::Sgl | SvType::Inf)
    }
}

impl FromStr for SvType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BND" => Ok(SvType::Bnd),
            "DEL" => Ok(SvType::Del),
            "DUP" => Ok(SvType::Dup),
            "INS" => Ok(SvType::Ins),
            "INV" => Ok(SvType::Inv),
            "SGL" => Ok(SvType::Sgl),
            "INF" => Ok(SvType::Inf),
            _ => Err(format!("Unknown SV type: {}", s)),
        }
    }
}

impl Display for SvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SvType::Bnd => "BND",
            SvType::Del => "DEL",
            SvType::Dup => "DUP",
            SvType::Ins => "INS",
            SvType::Inv => "INV",
            SvType::Sgl => "SGL",
            SvType::Inf => "INF",
        };
        write!(f, "{}", s)
    }
}

///
/// A structural variant as seen by the chainer: up to two breakends plus its
/// junction copy number estimate.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvVarData {
    /// External id, used in reports.
    pub id: u32,
    pub sv_type: SvType,
    pub start: Breakend,
    pub end: Option<Breakend>,
    pub jcn: f64,
    pub jcn_uncertainty: f64,
    pub jcn_min: f64,
    pub jcn_max: f64,
    pub is_foldback: bool,
    pub is_complex_dup: bool,
    pub is_line_element: bool,
}

impl SvVarData {
    pub fn new(id: u32, sv_type: SvType, start: Breakend, end: Option<Breakend>, jcn: f64) -> Self {
        Self {
            id,
            sv_type,
            start,
            end,
            jcn,
            jcn_uncertainty: 0.0,
            jcn_min: jcn,
            jcn_max: jcn,
            is_foldback: false,
            is_complex_dup: false,
            is_line_element: false,
        }
    }

    /// Set the uncertainty and derive min/max bounds from it.
    pub fn with_jcn_uncertainty(mut self, uncertainty: f64) -> Self {
        self.jcn_uncertainty = uncertainty;
        self.jcn_min = (self.jcn - uncertainty).max(0.0);
        self.jcn_max = self.jcn + uncertainty;
        self
    }

    pub fn with_foldback(mut self) -> Self {
        self.is_foldback = true;
        self
    }

    pub fn with_complex_dup(mut self) -> Self {
        self.is_complex_dup = true;
        self
    }

    pub fn with_line_element(mut self) -> Self {
        self.is_line_element = true;
        self
    }

    pub fn is_single_ended(&self) -> bool {
        self.sv_type.is_single_ended() || self.end.is_none()
    }

    pub fn breakend(&self, is_start: bool) -> Option<&Breakend> {
        if is_start {
            Some(&self.start)
        } else {
            self.end.as_ref()
        }
    }

    /// Reference length spanned by an intra-chromosomal variant, 0 otherwise.
    pub fn length(&self) -> i64 {
        match &self.end {
            Some(end) if end.chromosome == self.start.chromosome => {
                (end.position - self.start.position).abs()
            }
            _ => 0,
        }
    }

    pub fn is_simple_type(&self) -> bool {
        matches!(self.sv_type, SvType::Del | SvType::Dup | SvType::Ins)
    }

    pub fn breakend_count(&self) -> usize {
        if self.is_single_ended() { 1 } else { 2 }
    }
}

impl Display for SvVarData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.end {
            Some(end) => write!(f, "{}:{} {} {}", self.id, self.sv_type, self.start, end),
            None => write!(f, "{}:{} {}", self.id, self.sv_type, self.start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_single_ended_variants() {
        let sgl = SvVarData::new(1, SvType::Sgl, Breakend::new("1", 100, 1), None, 1.0);
        assert!(sgl.is_single_ended());
        assert_eq!(sgl.breakend_count(), 1);
        assert!(sgl.breakend(false).is_none());

        let del = SvVarData::new(
            2,
            SvType::Del,
            Breakend::new("1", 100, 1),
            Some(Breakend::new("1", 400, -1)),
            1.0,
        );
        assert!(!del.is_single_ended());
        assert_eq!(del.length(), 300);
        assert!(del.is_simple_type());
    }

    #[rstest]
    fn test_jcn_bounds_follow_uncertainty() {
        let sv = SvVarData::new(1, SvType::Bnd, Breakend::new("1", 100, 1), None, 0.4)
            .with_jcn_uncertainty(0.5);
        assert_eq!(sv.jcn_min, 0.0);
        assert_eq!(sv.jcn_max, 0.9);
    }

    #[rstest]
    #[case("del", SvType::Del)]
    #[case("BND", SvType::Bnd)]
    #[case("Inf", SvType::Inf)]
    fn test_sv_type_parsing(#[case] input: &str, #[case] expected: SvType) {
        assert_eq!(input.parse::<SvType>().unwrap(), expected);
    }

    #[rstest]
    fn test_sv_type_parsing_rejects_unknown() {
        assert!("TRA".parse::<SvType>().is_err());
    }
}
