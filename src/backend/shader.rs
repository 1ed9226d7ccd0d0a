// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The engine reads pre-compiled .spv files
// (see build.rs) and turns them into shader modules.

use ash::vk;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use super::VulkanDevice;
use crate::error::{EngineError, EngineResult};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a SPIR-V binary into 32-bit words.
///
/// Unlike a bare file read this never hands back an empty buffer: missing,
/// truncated and non-SPIR-V files are errors.
pub fn load_spirv(path: &Path) -> EngineResult<Vec<u32>> {
    let shader_error = |reason: String| EngineError::Shader {
        path: path.to_path_buf(),
        reason,
    };

    let mut file = File::open(path).map_err(|e| shader_error(format!("cannot open: {e}")))?;
    let words =
        ash::util::read_spv(&mut file).map_err(|e| shader_error(format!("cannot read: {e}")))?;

    match words.first() {
        None => Err(shader_error("file is empty".to_string())),
        Some(&magic) if magic != SPIRV_MAGIC => {
            Err(shader_error(format!("bad SPIR-V magic {magic:#010x}")))
        }
        Some(_) => Ok(words),
    }
}

/// Shader module that is destroyed with its owner.
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    device: Arc<VulkanDevice>,
}

impl ShaderModule {
    pub fn from_file(device: Arc<VulkanDevice>, path: &Path) -> EngineResult<Self> {
        let code = load_spirv(path)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .map_err(EngineError::creation("shader module"))?;

        log::debug!("Loaded shader module {:?} ({} words)", path, code.len());

        Ok(Self { module, device })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "triangle-engine-{}-{}",
            std::process::id(),
            name
        ));
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_load_spirv_missing_file() {
        let err = load_spirv(Path::new("definitely/not/here.spv")).unwrap_err();
        assert!(matches!(err, EngineError::Shader { .. }));
        assert!(err.to_string().contains("cannot open"));
    }

    #[test]
    fn test_load_spirv_rejects_empty_file() {
        let path = write_temp("empty.spv", &[]);
        let err = load_spirv(&path).unwrap_err();
        assert!(err.to_string().contains("empty"), "{err}");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_spirv_rejects_misaligned_file() {
        let path = write_temp("misaligned.spv", &[0x03, 0x02, 0x23, 0x07, 0x00]);
        let err = load_spirv(&path).unwrap_err();
        assert!(err.to_string().contains("cannot read"), "{err}");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_spirv_rejects_wrong_magic() {
        let path = write_temp("magic.spv", &[0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0]);
        let err = load_spirv(&path).unwrap_err();
        assert!(err.to_string().contains("magic"), "{err}");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_spirv_accepts_header() {
        let mut bytes = Vec::new();
        for word in [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let path = write_temp("header.spv", &bytes);

        let words = load_spirv(&path).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
        let _ = std::fs::remove_file(path);
    }
}
