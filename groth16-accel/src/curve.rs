//! Curve profiles
//!
//! The pipeline is written once against [`CurveProfile`] and instantiated for every supported
//! pairing-friendly curve.

use ark_ec::pairing::Pairing;
use ark_ec::short_weierstrass::{Affine, Projective, SWCurveConfig};
use ark_ff::{FftField, Field, PrimeField};
use std::fmt::Debug;
use zk_device_backend::DeviceRepr;

/// Everything the prover needs to know about a curve
pub trait CurveProfile:
    Copy + Clone + Debug + PartialEq + Eq + Default + Send + Sync + 'static
{
    const NAME: &'static str;

    type ScalarField: PrimeField + FftField + DeviceRepr;
    type BaseField: PrimeField + DeviceRepr;
    type G2BaseField: Field + DeviceRepr;

    type G1Config: SWCurveConfig<ScalarField = Self::ScalarField, BaseField = Self::BaseField>;
    type G2Config: SWCurveConfig<ScalarField = Self::ScalarField, BaseField = Self::G2BaseField>;

    type Engine: Pairing<
        ScalarField = Self::ScalarField,
        G1 = Projective<Self::G1Config>,
        G1Affine = Affine<Self::G1Config>,
        G2 = Projective<Self::G2Config>,
        G2Affine = Affine<Self::G2Config>,
    >;
}

pub type Fr<C> = <C as CurveProfile>::ScalarField;
pub type G1Affine<C> = Affine<<C as CurveProfile>::G1Config>;
pub type G1Projective<C> = Projective<<C as CurveProfile>::G1Config>;
pub type G2Affine<C> = Affine<<C as CurveProfile>::G2Config>;
pub type G2Projective<C> = Projective<<C as CurveProfile>::G2Config>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Bn254;

impl CurveProfile for Bn254 {
    const NAME: &'static str = "bn254";

    type ScalarField = ark_bn254::Fr;
    type BaseField = ark_bn254::Fq;
    type G2BaseField = ark_bn254::Fq2;

    type G1Config = ark_bn254::g1::Config;
    type G2Config = ark_bn254::g2::Config;

    type Engine = ark_bn254::Bn254;
}

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Bls12_377;

impl CurveProfile for Bls12_377 {
    const NAME: &'static str = "bls12-377";

    type ScalarField = ark_bls12_377::Fr;
    type BaseField = ark_bls12_377::Fq;
    type G2BaseField = ark_bls12_377::Fq2;

    type G1Config = ark_bls12_377::g1::Config;
    type G2Config = ark_bls12_377::g2::Config;

    type Engine = ark_bls12_377::Bls12_377;
}

/// BW6-761, the outer curve of BLS12-377, its G2 is defined over the base field
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Bw6_761;

impl CurveProfile for Bw6_761 {
    const NAME: &'static str = "bw6-761";

    type ScalarField = ark_bw6_761::Fr;
    type BaseField = ark_bw6_761::Fq;
    type G2BaseField = ark_bw6_761::Fq;

    type G1Config = ark_bw6_761::g1::Config;
    type G2Config = ark_bw6_761::g2::Config;

    type Engine = ark_bw6_761::BW6_761;
}
