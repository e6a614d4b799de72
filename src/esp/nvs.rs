use anyhow::Result;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

use crate::config::FramebufferConfig;

const CONFIG_NAMESPACE: &str = "lcdfb";
const CONFIG_KEY: &str = "config";
const MAX_CONFIG_SIZE: usize = 1024;

/// Load the stored framebuffer config, falling back to (and storing) defaults.
pub fn load_or_default(partition: EspDefaultNvsPartition) -> Result<FramebufferConfig> {
    match load(partition.clone()) {
        Ok(config) => {
            log::info!("Loaded framebuffer configuration from NVS");
            Ok(config)
        }
        Err(e) => {
            log::warn!("Failed to load framebuffer config from NVS: {:?}, using defaults", e);
            let config = FramebufferConfig::default();
            if let Err(save_err) = save(partition, &config) {
                log::warn!("Failed to save default framebuffer config: {:?}", save_err);
            }
            Ok(config)
        }
    }
}

pub fn load(partition: EspDefaultNvsPartition) -> Result<FramebufferConfig> {
    let nvs = open(partition, true)?;
    let mut buf = vec![0u8; MAX_CONFIG_SIZE];
    let data = nvs
        .get_blob(CONFIG_KEY, &mut buf)?
        .ok_or_else(|| anyhow::anyhow!("Framebuffer config not found in NVS"))?;
    FramebufferConfig::from_json(data)
}

pub fn save(partition: EspDefaultNvsPartition, config: &FramebufferConfig) -> Result<()> {
    config.validate()?;
    let mut nvs = open(partition, false)?;
    nvs.set_blob(CONFIG_KEY, &config.to_json()?)?;
    log::info!("Framebuffer configuration saved to NVS");
    Ok(())
}

fn open(partition: EspDefaultNvsPartition, read_only: bool) -> Result<EspNvs<NvsDefault>> {
    Ok(EspNvs::new(partition, CONFIG_NAMESPACE, !read_only)?)
}
