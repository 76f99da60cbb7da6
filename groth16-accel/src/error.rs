use crate::pedersen::PedersenError;
use crate::r1cs::SolveError;
use ark_serialize::SerializationError;
use std::fmt;
use thiserror::Error;
use zk_device_backend::DeviceError;

/// Steps of a proof request, used to give errors and timings their context
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    MsmAr1,
    MsmBs1,
    MsmBs2,
    MsmKrs,
    MsmKrs2,
    HComputation,
    DeviceKeySetup,
    CommitmentPok,
    ProofAssembly,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MsmAr1 => "MSM Ar1",
            Self::MsmBs1 => "MSM Bs1",
            Self::MsmBs2 => "MSM Bs2 G2",
            Self::MsmKrs => "MSM Krs",
            Self::MsmKrs2 => "MSM Krs2",
            Self::HComputation => "H computation",
            Self::DeviceKeySetup => "device key setup",
            Self::CommitmentPok => "commitment PoK",
            Self::ProofAssembly => "proof assembly",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ProverError {
    #[error("backend `{0}` is not available")]
    UnavailableBackend(String),

    #[error("invalid prover configuration: {0}")]
    Config(String),

    #[error("{stage}: device allocation failed: {source}")]
    Allocation { stage: Stage, source: DeviceError },

    #[error("{stage} failed: {source}")]
    Stage { stage: Stage, source: DeviceError },

    #[error("{stage}: {detail}")]
    Invariant { stage: Stage, detail: String },

    #[error("solver: {0}")]
    Solver(#[from] SolveError),

    #[error("commitment: {0}")]
    Commitment(#[from] PedersenError),

    #[error("the host copy of the proving key points has been released")]
    HostPointsReleased,

    #[error("cancelled after a sibling stage failed")]
    Cancelled,

    #[error("serialization: {0}")]
    Serialization(#[from] SerializationError),
}

impl ProverError {
    /// Attach a stage to a device error, out of memory conditions are kept apart
    pub fn device(stage: Stage, source: DeviceError) -> Self {
        match source {
            DeviceError::OutOfMemory { .. } => Self::Allocation { stage, source },
            source => Self::Stage { stage, source },
        }
    }

    pub(crate) fn invariant(stage: Stage, detail: impl Into<String>) -> Self {
        Self::Invariant {
            stage,
            detail: detail.into(),
        }
    }

    /// Stage the error is attributed to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Allocation { stage, .. }
            | Self::Stage { stage, .. }
            | Self::Invariant { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub(crate) trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T, ProverError>;
}

impl<T> StageContext<T> for Result<T, DeviceError> {
    fn stage(self, stage: Stage) -> Result<T, ProverError> {
        self.map_err(|err| ProverError::device(stage, err))
    }
}

/// Fail fast when a scalar vector and its point vector are not paired one to one
pub(crate) fn check_len(
    stage: Stage,
    what: &str,
    scalars: usize,
    points: usize,
) -> Result<(), ProverError> {
    if scalars == points {
        Ok(())
    } else {
        Err(ProverError::invariant(
            stage,
            format!("{what}: {scalars} scalars for {points} points"),
        ))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VerifyError {
    #[error("proof points are not in the prime order subgroup")]
    MalformedProof,

    #[error("expected {expected} public inputs, got {found}")]
    PublicInputCount { expected: usize, found: usize },

    #[error("expected {expected} commitments, got {found}")]
    CommitmentCount { expected: usize, found: usize },

    #[error("commitment proof of knowledge: {0}")]
    Commitment(#[from] PedersenError),

    #[error("pairing check failed")]
    PairingCheck,
}
