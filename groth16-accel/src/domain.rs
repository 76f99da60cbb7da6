use crate::ProverError;
use ark_ff::FftField;
use ark_poly::{EvaluationDomain, Radix2EvaluationDomain};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

/// Evaluation domain of the constraint system
///
/// `coset_generator` is a primitive root of unity of order `2n`, so `coset_generator^n = -1` and
/// the vanishing polynomial `x^n - 1` is the constant `-2` on the coset it generates.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct FftDomain<F: FftField> {
    pub cardinality: u64,
    pub cardinality_inv: F,
    pub generator: F,
    pub generator_inv: F,
    pub coset_generator: F,
    pub multiplicative_generator: F,
}

impl<F: FftField> FftDomain<F> {
    /// Smallest power of two domain holding `num_constraints` evaluations
    pub fn new(num_constraints: usize) -> Result<Self, ProverError> {
        let domain = Radix2EvaluationDomain::<F>::new(num_constraints.max(1)).ok_or_else(|| {
            ProverError::Config(format!(
                "no power of two evaluation domain of size {num_constraints}"
            ))
        })?;
        let coset_generator = F::get_root_of_unity(2 * domain.size).ok_or_else(|| {
            ProverError::Config(format!(
                "the scalar field has no root of unity of order {}",
                2 * domain.size
            ))
        })?;

        Ok(Self {
            cardinality: domain.size,
            cardinality_inv: domain.size_inv,
            generator: domain.group_gen,
            generator_inv: domain.group_gen_inv,
            coset_generator,
            multiplicative_generator: F::GENERATOR,
        })
    }

    pub fn size(&self) -> usize {
        self.cardinality as usize
    }

    pub fn evaluation_domain(&self) -> Result<Radix2EvaluationDomain<F>, ProverError> {
        Radix2EvaluationDomain::new(self.size())
            .ok_or_else(|| ProverError::Config("invalid evaluation domain".into()))
    }

    /// `1 / (g^n - 1)`, the inverse of the vanishing polynomial on the coset of `g`
    pub fn coset_denominator(&self, g: F) -> Result<F, ProverError> {
        (g.pow([self.cardinality]) - F::ONE)
            .inverse()
            .ok_or_else(|| ProverError::Config("coset generator lies in the domain".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bn254::Fr;
    use ark_ff::Field;

    #[test]
    fn domain_parameters() {
        let domain = FftDomain::<Fr>::new(5).unwrap();
        assert_eq!(domain.size(), 8);
        assert_eq!(domain.generator.pow([8u64]), Fr::ONE);
        assert_eq!(domain.generator * domain.generator_inv, Fr::ONE);
        assert_eq!(domain.cardinality_inv * Fr::from(8u64), Fr::ONE);
        assert_eq!(domain.coset_generator.pow([8u64]), -Fr::ONE);

        let den = domain.coset_denominator(domain.coset_generator).unwrap();
        assert_eq!(den, -Fr::from(2u64).inverse().unwrap());
        assert!(domain.coset_denominator(domain.generator).is_err());
    }

    #[test]
    fn tiny_and_oversized_domains() {
        assert_eq!(FftDomain::<Fr>::new(0).unwrap().size(), 1);
        assert_eq!(FftDomain::<Fr>::new(1).unwrap().size(), 1);
        // BN254 has a two-adicity of 28, the coset needs one more bit
        assert!(FftDomain::<Fr>::new(1 << 28).is_err());
    }
}
