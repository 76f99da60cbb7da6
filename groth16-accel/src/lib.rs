//! Groth16 prover with an accelerated proof pipeline
//!
//! The quotient polynomial and the five multi-scalar multiplications of a proof run concurrently,
//! on the CPU or on the devices of [`zk_device_backend`]. Both paths prove against the same keys
//! and produce proofs accepted by [`verify`].
//!
//! ```rust,no_run
//! use groth16_accel::{setup, verify, Bn254, ConstraintSystem, Fr, Prover, ProverConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cs = ConstraintSystem::<Fr<Bn254>>::new();
//! let n = cs.public_input();
//! let p = cs.secret_input();
//! let q = cs.secret_input();
//! let pq = cs.mul(p, q);
//! cs.assert_equal(pq, n);
//!
//! let (pk, vk) = setup::<Bn254, _>(&cs, &mut rand::thread_rng())?;
//! let prover = Prover::new(ProverConfig::default())?;
//! let public = [Fr::<Bn254>::from(15u64)];
//! let proof = prover.prove(&cs, &pk, &public, &[3u64.into(), 5u64.into()])?;
//! verify(&proof, &vk, &public)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod curve;
pub mod device_key;
pub mod domain;
pub mod error;
mod executor;
pub mod h_poly;
pub mod keys;
pub mod pedersen;
pub mod proof;
pub mod prover;
pub mod r1cs;
pub mod setup;
pub mod verifier;

pub use config::{Backend, ProverConfig};
pub use curve::{Bls12_377, Bn254, Bw6_761, CurveProfile, Fr};
pub use device_key::{DeviceProvingKey, StageDevices};
pub use domain::FftDomain;
pub use error::{ProverError, Stage, VerifyError};
pub use keys::{KeyPoints, ProvingKey, VerifyingKey};
pub use proof::Proof;
pub use prover::Prover;
pub use r1cs::{ConstraintSystem, LinearCombination, SolveError, Variable};
pub use setup::setup;
pub use verifier::verify;

#[cfg(test)]
pub(crate) mod test_utils {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .with_file(false)
            .with_line_number(false)
            .without_time()
            .try_init();
    }

    pub fn seeded_rng() -> StdRng {
        let seed = std::env::var("GROTH16_ACCEL_TEST_SEED")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0x6a0_16);
        StdRng::seed_from_u64(seed)
    }
}
