//! Prover configuration
//! Provide mechanism to load it from Toml-file

use crate::ProverError;
use zk_device_backend::DeviceConfig;

/// Execution backend selected by [`ProverConfig::backend`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// CPU FFT and multi-exponentiation only
    Cpu,
    /// NTT and MSM stages on the emulated accelerator
    Emulated,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ProverConfig {
    /// Named backend: `cpu`/`none` or `emulated`/`device`
    pub backend: String,
    /// Run on the CPU when the device can not be initialized instead of failing
    pub fallback_to_cpu: bool,
    /// Devices used by the accelerated stages, assigned round-robin
    pub device_ids: Vec<usize>,
    /// Compute Krs2 as two half-range MSMs on two streams
    pub krs2_split: bool,
    /// Drop the host copy of the key points once they are resident on the devices
    pub free_host_points: bool,
    /// Number of chunks a CPU MSM is split into, defaults to the rayon thread count
    pub nb_tasks: Option<usize>,
    pub device: DeviceConfig,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            backend: "emulated".to_string(),
            fallback_to_cpu: false,
            device_ids: vec![0],
            krs2_split: true,
            free_host_points: false,
            nb_tasks: None,
            device: DeviceConfig::default(),
        }
    }
}

impl ProverConfig {
    /// CPU only configuration
    pub fn cpu() -> Self {
        Self {
            backend: "cpu".to_string(),
            ..Self::default()
        }
    }

    /// Provide Serde mechanisms from TOML file
    pub fn from_toml(file: &str) -> Result<Self, ProverError> {
        let file_str = std::fs::read_to_string(file)
            .map_err(|err| ProverError::Config(format!("`{file}`: {err}")))?;
        Self::from_toml_str(&file_str)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ProverError> {
        toml::from_str(content).map_err(|err| ProverError::Config(format!("toml: {err}")))
    }

    /// Resolve the backend name
    ///
    /// Names of backends this build does not provide are reported as unavailable, they never
    /// select another backend silently.
    pub fn backend(&self) -> Result<Backend, ProverError> {
        match self.backend.to_ascii_lowercase().as_str() {
            "cpu" | "none" => Ok(Backend::Cpu),
            "emulated" | "device" => Ok(Backend::Emulated),
            _ => Err(ProverError::UnavailableBackend(self.backend.clone())),
        }
    }

    pub fn nb_tasks(&self) -> usize {
        self.nb_tasks
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }

    /// Check the device list against the device configuration
    pub fn validate_devices(&self) -> Result<(), ProverError> {
        if self.device_ids.is_empty() {
            return Err(ProverError::Config("device_ids must not be empty".into()));
        }
        if let Some(id) = self
            .device_ids
            .iter()
            .find(|&&id| id >= self.device.devices)
        {
            return Err(ProverError::Config(format!(
                "device id {id} is out of range, {} device(s) configured",
                self.device.devices
            )));
        }
        Ok(())
    }
}
