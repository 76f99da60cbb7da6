#![allow(dead_code)]

use ark_ff::PrimeField;
use groth16_accel::{ConstraintSystem, ProverConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use zk_device_backend::DeviceConfig;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_file(false)
        .with_line_number(false)
        .without_time()
        .try_init();
}

/// Deterministic rng, the seed can be overridden with `GROTH16_ACCEL_TEST_SEED`
pub fn seeded_rng() -> StdRng {
    let seed = std::env::var("GROTH16_ACCEL_TEST_SEED")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0x6a0_16);
    StdRng::seed_from_u64(seed)
}

/// `P·Q = N` with `N` public, secrets in the order `[P, Q]`
pub fn pq_circuit<F: PrimeField>() -> ConstraintSystem<F> {
    let mut cs = ConstraintSystem::new();
    let n = cs.public_input();
    let p = cs.secret_input();
    let q = cs.secret_input();
    let pq = cs.mul(p, q);
    cs.assert_equal(pq, n);
    cs
}

/// `X·Z = Y` with `Y` public, and a commitment to `[X, Y]` used in a product with `Z`
///
/// Secrets in the order `[X, Z]`.
pub fn commitment_circuit<F: PrimeField>() -> ConstraintSystem<F> {
    let mut cs = ConstraintSystem::new();
    let y = cs.public_input();
    let x = cs.secret_input();
    let z = cs.secret_input();
    let xz = cs.mul(x, z);
    cs.assert_equal(xz, y);
    let cmt = cs.commit(&[x, y]);
    cs.mul(cmt, z);
    cs
}

/// `nb_constraints` constraints computing `x^nb_constraints`
///
/// Returns the system with its public and secret inputs for `x = 3`.
pub fn power_circuit<F: PrimeField>(
    nb_constraints: usize,
) -> (ConstraintSystem<F>, Vec<F>, Vec<F>) {
    let mut cs = ConstraintSystem::new();
    let out = cs.public_input();
    let x = cs.secret_input();
    let mut acc = x;
    for _ in 1..nb_constraints {
        acc = cs.mul(acc, x);
    }
    cs.assert_equal(acc, out);

    let x_value = F::from(3u64);
    let out_value = x_value.pow([nb_constraints as u64]);
    (cs, vec![out_value], vec![x_value])
}

pub fn cpu_config() -> ProverConfig {
    ProverConfig::cpu()
}

pub fn emulated_config() -> ProverConfig {
    ProverConfig::default()
}

/// Accelerated stages spread over `devices` devices
pub fn multi_device_config(devices: usize, krs2_split: bool) -> ProverConfig {
    ProverConfig {
        device_ids: (0..devices).collect(),
        krs2_split,
        device: DeviceConfig {
            devices,
            ..DeviceConfig::default()
        },
        ..ProverConfig::default()
    }
}

/// Emulated device with a memory budget of `memory_bytes`
pub fn small_memory_config(memory_bytes: usize) -> ProverConfig {
    ProverConfig {
        device: DeviceConfig {
            memory_bytes,
            ..DeviceConfig::default()
        },
        ..ProverConfig::default()
    }
}
