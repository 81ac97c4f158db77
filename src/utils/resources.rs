use crate::error::Result;
use std::path::Path;
use tracing::{debug, info};

/// Создать каталог ресурсов, если его нет. `true` если каталог был создан.
pub fn ensure_resource_dir(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        debug!("Каталог ресурсов: {}", dir.display());
        return Ok(false);
    }

    std::fs::create_dir_all(dir)?;
    info!("Создан каталог ресурсов: {}", dir.display());
    Ok(true)
}
