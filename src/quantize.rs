//! Fixed-point contracts for the lookup tables of a hardware implementation.
//!
//! Every division and power in the pipeline is replaced by a table in
//! hardware. A [`LutContract`] fixes the index domain and the unsigned `Qm.n`
//! formats of one such table, and [`Lut::tabulate`] produces its entries.
//! Tables on 8-bit inputs index by the raw code, so their closed forms are on
//! the 0..255 scale. Tables on fractional inputs take the coarsest input
//! format whose step keeps every lookup within one output ULP.

use crate::{config::DehazeConfig, error::DehazeError, saturation::SaturationMode};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unsigned fixed-point format with `int_bits` integer and `frac_bits`
/// fractional bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct QFormat {
    pub int_bits: u32,
    pub frac_bits: u32,
}

impl QFormat {
    pub const fn new(int_bits: u32, frac_bits: u32) -> Self {
        Self {
            int_bits,
            frac_bits,
        }
    }

    /// Smallest format of `word_bits` bits whose integer part holds `max`.
    ///
    /// Returns an error if `max` is not finite and non-negative or needs more
    /// than `word_bits` integer bits.
    pub fn fitting(max: f64, word_bits: u32) -> Result<Self, DehazeError> {
        if !(max.is_finite() && max >= 0.0) {
            return Err(DehazeError::config(
                "output_format",
                format!("cannot fit a format around {max}"),
            ));
        }

        (0..=word_bits)
            .find(|&m| max < 2f64.powi(m as i32))
            .map(|m| Self::new(m, word_bits - m))
            .ok_or_else(|| {
                DehazeError::config(
                    "output_format",
                    format!("{max} does not fit in a {word_bits} bit word"),
                )
            })
    }

    pub fn word_bits(&self) -> u32 {
        self.int_bits + self.frac_bits
    }

    /// Value of one unit in the last place.
    pub fn ulp(&self) -> f64 {
        2f64.powi(-(self.frac_bits as i32))
    }

    pub fn max_code(&self) -> u64 {
        (1u64 << self.word_bits()) - 1
    }

    /// Round `value` to the nearest code, saturating outside the representable range.
    pub fn quantize(&self, value: f64) -> u64 {
        match value.is_nan() {
            true => 0,
            false => (value / self.ulp())
                .round()
                .clamp(0.0, self.max_code() as f64) as u64,
        }
    }

    pub fn dequantize(&self, code: u64) -> f64 {
        code as f64 * self.ulp()
    }
}

impl fmt::Display for QFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}.{}", self.int_bits, self.frac_bits)
    }
}

/// A division or power that needs a table in hardware.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "operation", rename_all = "snake_case"))]
pub enum Operation {
    /// `omega / a` for an 8-bit atmospheric light code `a`.
    AtmosphericReciprocal { omega: f64 },

    /// `1 / (v + eps)` for the guide variance `v` of the guided filter.
    GuidedDenominatorReciprocal { eps: f64 },

    /// `1 / (1 - x)` for the haze term `x = 1 - t` of the transmission.
    TransmissionReciprocal,

    /// `a^exponent` for an 8-bit atmospheric light code `a`.
    AtmosphericPower { exponent: f64 },

    /// `j^exponent` for an 8-bit recovered radiance code `j`.
    RadiancePower { exponent: f64 },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AtmosphericReciprocal { .. } => "atmospheric_reciprocal",
            Self::GuidedDenominatorReciprocal { .. } => "guided_denominator_reciprocal",
            Self::TransmissionReciprocal => "transmission_reciprocal",
            Self::AtmosphericPower { .. } => "atmospheric_power",
            Self::RadiancePower { .. } => "radiance_power",
        }
    }

    /// Evaluate the closed form at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        match *self {
            Self::AtmosphericReciprocal { omega } => omega / x,
            Self::GuidedDenominatorReciprocal { eps } => 1.0 / (x + eps),
            Self::TransmissionReciprocal => 1.0 / (1.0 - x),
            Self::AtmosphericPower { exponent } | Self::RadiancePower { exponent } => {
                x.powf(exponent)
            }
        }
    }

    /// Magnitude of the derivative of the closed form at `x`.
    pub fn slope(&self, x: f64) -> f64 {
        match *self {
            Self::AtmosphericReciprocal { omega } => omega / (x * x),
            Self::GuidedDenominatorReciprocal { eps } => 1.0 / ((x + eps) * (x + eps)),
            Self::TransmissionReciprocal => 1.0 / ((1.0 - x) * (1.0 - x)),
            Self::AtmosphericPower { exponent } | Self::RadiancePower { exponent } => {
                (exponent * x.powf(exponent - 1.0)).abs()
            }
        }
    }
}

/// The `(domain, Qm.n, table size)` triple of one lookup table.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LutContract {
    pub operation: Operation,

    /// Inputs the table reproduces within one output ULP. Codes below the
    /// domain saturate.
    pub domain: (f64, f64),

    pub input: QFormat,
    pub output: QFormat,

    /// Number of table entries, indexed by input code from zero.
    pub entries: usize,
}

impl LutContract {
    /// Fit the smallest output format of `output_bits` bits around
    /// `operation` evaluated over `domain`.
    ///
    /// Every closed form is monotonic, so its maximum sits at an end of the domain.
    pub fn new(
        operation: Operation,
        domain: (f64, f64),
        input: QFormat,
        output_bits: u32,
    ) -> Result<Self, DehazeError> {
        let max = operation
            .evaluate(domain.0)
            .max(operation.evaluate(domain.1));

        Ok(Self {
            operation,
            domain,
            input,
            output: QFormat::fitting(max, output_bits)?,
            entries: input.quantize(domain.1) as usize + 1,
        })
    }

    /// Like [`LutContract::new`], but picks the input format with the fewest
    /// fractional bits that keeps every lookup over `domain` within one output
    /// ULP.
    ///
    /// Rounding an input moves it by at most half an input ULP, which moves
    /// the closed form by at most `slope * ulp_in / 2`. Adding the half ULP of
    /// output rounding, the table holds when `slope * ulp_in <= ulp_out`.
    /// Every slope is monotonic, so its maximum sits at an end of the domain.
    ///
    /// Returns an error if no input word of up to [`MAX_INPUT_BITS`] bits is
    /// fine enough or the outputs do not fit in `output_bits`.
    pub fn fractional(
        operation: Operation,
        domain: (f64, f64),
        output_bits: u32,
    ) -> Result<Self, DehazeError> {
        let int_bits = QFormat::fitting(domain.1, MAX_INPUT_BITS)?.int_bits;

        for frac_bits in 0..=MAX_INPUT_BITS - int_bits {
            let input = QFormat::new(int_bits, frac_bits);

            // The last code may round past the end of the domain.
            let hi = domain.1.max(input.dequantize(input.quantize(domain.1)));
            let max = operation.evaluate(domain.0).max(operation.evaluate(hi));
            let output = QFormat::fitting(max, output_bits)?;

            let steepest = operation.slope(domain.0).max(operation.slope(hi));
            if steepest * input.ulp() <= output.ulp() {
                return Ok(Self {
                    operation,
                    domain,
                    input,
                    output,
                    entries: input.quantize(domain.1) as usize + 1,
                });
            }
        }

        Err(DehazeError::config(
            "input_format",
            format!(
                "{} needs more than {MAX_INPUT_BITS} fractional input bits over [{}, {}]",
                operation.name(),
                domain.0,
                domain.1
            ),
        ))
    }
}

impl fmt::Display for LutContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: domain [{}, {}], input {}, output {}, {} entries",
            self.operation.name(),
            self.domain.0,
            self.domain.1,
            self.input,
            self.output,
            self.entries
        )
    }
}

const CODE: QFormat = QFormat::new(8, 0);

/// Widest input word a fractional table may use.
pub const MAX_INPUT_BITS: u32 = 32;

/// Returns the contract of every table `config` needs.
///
/// The guided filter table is only needed when the refinement runs the guided
/// filter and the power tables only for power-law saturation.
pub fn contracts(config: &DehazeConfig) -> Result<Vec<LutContract>, DehazeError> {
    config.validate()?;

    let mut contracts = vec![LutContract::new(
        Operation::AtmosphericReciprocal {
            omega: config.omega,
        },
        (1.0, 255.0),
        CODE,
        10,
    )?];

    if let Some(eps) = config.refinement.guided_eps() {
        // The variance of a guide in [0, 1] never exceeds 1/4.
        contracts.push(LutContract::fractional(
            Operation::GuidedDenominatorReciprocal { eps },
            (0.0, 0.25),
            16,
        )?);
    }

    contracts.push(LutContract::fractional(
        Operation::TransmissionReciprocal,
        (0.0, 1.0 - config.transmission_floor),
        10,
    )?);

    if config.saturation_mode == SaturationMode::PowerLaw {
        let beta = config.saturation_beta;
        contracts.push(LutContract::new(
            Operation::AtmosphericPower { exponent: beta },
            (0.0, 255.0),
            CODE,
            12,
        )?);
        contracts.push(LutContract::new(
            Operation::RadiancePower {
                exponent: 1.0 - beta,
            },
            (0.0, 255.0),
            CODE,
            12,
        )?);
    }

    Ok(contracts)
}

/// The integer entries of one lookup table.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Lut {
    contract: LutContract,
    entries: Vec<u64>,
}

impl Lut {
    /// Evaluate the closed form of `contract` at every input code.
    pub fn tabulate(contract: &LutContract) -> Self {
        let entries = (0..contract.entries as u64)
            .map(|code| {
                let x = contract.input.dequantize(code);
                contract.output.quantize(contract.operation.evaluate(x))
            })
            .collect();

        Self {
            contract: *contract,
            entries,
        }
    }

    pub fn contract(&self) -> &LutContract {
        &self.contract
    }

    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    /// Look up `x` the way the hardware does, returning the dequantized entry.
    ///
    /// Inputs past the end of the table use the last entry.
    pub fn lookup(&self, x: f64) -> f64 {
        let index = (self.contract.input.quantize(x) as usize).min(self.entries.len() - 1);
        self.contract.output.dequantize(self.entries[index])
    }
}
